//! Bandwidth-limited response writing.
//!
//! The transport layer may declare a client bandwidth in Kbps; the
//! writer then paces the payload out in small chunks. Pacing keeps no
//! reference to the artifact set and never blocks other requests.

use std::io::{self, Write};
use std::time::{Duration, Instant};

const CHUNK_SIZE: usize = 512;

/// An `io::Write` adapter that delay-chunks at a declared rate.
pub struct ThrottledWriter<W> {
    inner: W,
    /// Bytes per second; `None` writes straight through.
    rate: Option<f64>,
    started: Option<Instant>,
    bytes_sent: u64,
}

impl<W: Write> ThrottledWriter<W> {
    /// `kbps` of zero (or anything unparseable upstream mapped to zero)
    /// disables pacing. When the payload will be content-encoded
    /// downstream, `post_delay_compression` halves the delay.
    pub fn new(inner: W, kbps: f64, post_delay_compression: bool) -> Self {
        let rate = (kbps > 0.0).then(|| {
            let mut bytes_per_sec = kbps * 1024.0 / 8.0;
            if post_delay_compression {
                bytes_per_sec *= 2.0;
            }
            bytes_per_sec
        });
        ThrottledWriter {
            inner,
            rate,
            started: None,
            bytes_sent: 0,
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ThrottledWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(rate) = self.rate else {
            return self.inner.write(buf);
        };
        let started = *self.started.get_or_insert_with(Instant::now);
        for chunk in buf.chunks(CHUNK_SIZE) {
            self.inner.write_all(chunk)?;
            self.bytes_sent += chunk.len() as u64;
            let delay = required_delay(self.bytes_sent, rate, started.elapsed());
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// How long to sleep so that `bytes_sent` stays at or under the rate.
fn required_delay(bytes_sent: u64, bytes_per_sec: f64, elapsed: Duration) -> Duration {
    let expected = Duration::from_secs_f64(bytes_sent as f64 / bytes_per_sec);
    expected.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_tracks_the_declared_rate() {
        // 1024 bytes at 1024 B/s should take one second
        let delay = required_delay(1024, 1024.0, Duration::from_millis(250));
        assert_eq!(delay, Duration::from_millis(750));
        // already behind schedule: no sleep
        assert_eq!(
            required_delay(512, 1024.0, Duration::from_secs(2)),
            Duration::ZERO
        );
    }

    #[test]
    fn zero_bandwidth_is_a_straight_pipe() {
        let mut writer = ThrottledWriter::new(Vec::new(), 0.0, false);
        writer.write_all(&[7u8; 2000]).unwrap();
        assert_eq!(writer.into_inner().len(), 2000);
    }

    #[test]
    fn compression_halves_the_delay() {
        let plain = ThrottledWriter::new(Vec::new(), 8.0, false);
        let compressed = ThrottledWriter::new(Vec::new(), 8.0, true);
        assert_eq!(plain.rate, Some(1024.0));
        assert_eq!(compressed.rate, Some(2048.0));
    }

    #[test]
    fn throttled_write_delivers_everything() {
        // high rate so the test does not actually sleep measurably
        let mut writer = ThrottledWriter::new(Vec::new(), 1e9, true);
        let payload: Vec<u8> = (0..3000u32).map(|i| i as u8).collect();
        writer.write_all(&payload).unwrap();
        assert_eq!(writer.into_inner(), payload);
    }
}
