//! The glyph request protocol object.

use serde::{Deserialize, Deserializer, Serialize};

use crate::BundleError;

/// The JSON body the transport layer hands to the assembler:
/// `{"name": "...", "weight": "...", "arr": [codepoints...]}`.
///
/// Clients send the weight as either a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphRequest {
    pub name: String,
    #[serde(deserialize_with = "string_or_number", default)]
    pub weight: String,
    pub arr: Vec<u32>,
}

impl GlyphRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, BundleError> {
        Ok(serde_json::from_slice(body)?)
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Weight {
        Text(String),
        Number(u32),
    }
    Ok(match Weight::deserialize(deserializer)? {
        Weight::Text(text) => text,
        Weight::Number(number) => number.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_weight() {
        let request =
            GlyphRequest::from_json(br#"{"name":"NotoSans","weight":"400","arr":[97,98]}"#)
                .unwrap();
        assert_eq!(request.name, "NotoSans");
        assert_eq!(request.weight, "400");
        assert_eq!(request.arr, vec![97, 98]);
    }

    #[test]
    fn parses_numeric_weight() {
        let request =
            GlyphRequest::from_json(br#"{"name":"Arimo","weight":700,"arr":[]}"#).unwrap();
        assert_eq!(request.weight, "700");
        assert!(request.arr.is_empty());
    }

    #[test]
    fn missing_array_is_an_error() {
        assert!(GlyphRequest::from_json(br#"{"name":"Arimo"}"#).is_err());
    }
}
