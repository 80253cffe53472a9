//! FFmpeg `-progress` output parsing.
//!
//! With `-progress pipe:1` ffmpeg writes key=value lines to stdout, one
//! block per update, terminated by a `progress=continue` or `progress=end`
//! line. The parser accumulates a block and yields one sample per
//! terminator.

use std::time::Duration;

/// Parse a time string in HH:MM:SS.ms format to seconds.
///
/// Returns `None` for invalid or negative values (ffmpeg emits a bogus
/// negative `out_time` before the first frame on some inputs).
pub fn parse_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    if total.is_finite() && total >= 0.0 {
        Some(total)
    } else {
        None
    }
}

/// One completed progress block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Position within the output timeline.
    pub position: Duration,
    /// Encoding speed multiplier, when reported.
    pub speed: Option<f64>,
    /// True for the final `progress=end` block.
    pub end: bool,
}

/// Accumulates `-progress` key=value lines into [`ProgressSample`]s.
#[derive(Debug, Default)]
pub struct ProgressBlockParser {
    position: Option<Duration>,
    speed: Option<f64>,
}

impl ProgressBlockParser {
    /// Feed one stdout line. Returns a sample when a block terminator
    /// (`progress=...`) arrives and a position has been seen.
    pub fn feed(&mut self, line: &str) -> Option<ProgressSample> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key {
            // `out_time_us` and `out_time_ms` are both microseconds.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>()
                    && us >= 0
                {
                    self.position = Some(Duration::from_micros(us as u64));
                }
            }
            "out_time" => {
                if let Some(secs) = parse_time(value) {
                    self.position = Some(Duration::from_secs_f64(secs));
                }
            }
            "speed" => {
                self.speed = value.strip_suffix('x').and_then(|s| s.trim().parse().ok());
            }
            "progress" => {
                let position = self.position?;
                return Some(ProgressSample {
                    position,
                    speed: self.speed,
                    end: value == "end",
                });
            }
            _ => {}
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_time_valid() {
        assert_eq!(parse_time("00:00:10.50"), Some(10.5));
        assert_eq!(parse_time("01:30:00.00"), Some(5400.0));
        assert_eq!(parse_time("00:01:30.50"), Some(90.5));
        assert_eq!(parse_time("10:00:00.00"), Some(36000.0));
    }

    #[test]
    fn test_parse_time_invalid() {
        assert_eq!(parse_time("invalid"), None);
        assert_eq!(parse_time("00:00"), None);
        assert_eq!(parse_time(""), None);
        assert_eq!(parse_time("00:00:00:00"), None);
        assert_eq!(parse_time("-577014:32:22.77"), None);
    }

    #[test]
    fn test_block_yields_sample_on_terminator() {
        let mut parser = ProgressBlockParser::default();

        assert_eq!(parser.feed("frame=120"), None);
        assert_eq!(parser.feed("fps=29.97"), None);
        assert_eq!(parser.feed("out_time_us=4000000"), None);
        assert_eq!(parser.feed("speed=1.25x"), None);

        let sample = parser.feed("progress=continue").unwrap();
        assert_eq!(sample.position, Duration::from_secs(4));
        assert_eq!(sample.speed, Some(1.25));
        assert!(!sample.end);
    }

    #[test]
    fn test_end_block() {
        let mut parser = ProgressBlockParser::default();
        parser.feed("out_time=00:00:10.000000");
        let sample = parser.feed("progress=end").unwrap();
        assert_eq!(sample.position, Duration::from_secs(10));
        assert!(sample.end);
    }

    #[test]
    fn test_terminator_without_position_is_skipped() {
        let mut parser = ProgressBlockParser::default();
        assert_eq!(parser.feed("frame=0"), None);
        assert_eq!(parser.feed("progress=continue"), None);
    }

    #[test]
    fn test_negative_out_time_ignored() {
        let mut parser = ProgressBlockParser::default();
        parser.feed("out_time_us=-9223372036854775808");
        assert_eq!(parser.feed("progress=continue"), None);
    }

    #[test]
    fn test_position_carries_across_blocks() {
        let mut parser = ProgressBlockParser::default();
        parser.feed("out_time_us=1000000");
        parser.feed("progress=continue");

        // Next block omits out_time; the last known position is reused.
        let sample = parser.feed("progress=continue").unwrap();
        assert_eq!(sample.position, Duration::from_secs(1));
    }

    #[test]
    fn test_non_progress_lines_ignored() {
        let mut parser = ProgressBlockParser::default();
        assert_eq!(parser.feed("random noise"), None);
        assert_eq!(parser.feed(""), None);
        assert_eq!(parser.feed("bitrate=2097.2kbits/s"), None);
    }
}
