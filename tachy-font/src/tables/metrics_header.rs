//! The `hhea` and `vhea` tables, which share a layout.

use crate::{FontData, FontRef, ReadError, Tag};

pub const HHEA: Tag = Tag::new(b"hhea");
pub const VHEA: Tag = Tag::new(b"vhea");

const NUMBER_OF_METRICS_OFFSET: usize = 34;

/// The metric-count header backing `hmtx` (via `hhea`) or `vmtx` (via
/// `vhea`). `numberOfHMetrics` and `numOfLongVerMetrics` sit at the same
/// byte offset in both tables.
pub struct MetricsHeader<'a> {
    data: FontData<'a>,
}

impl<'a> MetricsHeader<'a> {
    pub fn hhea(font: &FontRef<'a>) -> Result<Self, ReadError> {
        Ok(MetricsHeader {
            data: font.expect_table_data(HHEA)?,
        })
    }

    pub fn vhea(font: &FontRef<'a>) -> Option<Self> {
        font.table_data(VHEA).map(|data| MetricsHeader { data })
    }

    pub fn number_of_metrics(&self) -> Result<u16, ReadError> {
        self.data.read_u16_at(NUMBER_OF_METRICS_OFFSET)
    }
}
