use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::signal::FrameReading;

/// Parse a bare brightness series. Values may be separated by whitespace or
/// commas; anything after `#` on a line is ignored.
pub fn parse_brightness_series(text: &str) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let content = line.split('#').next().unwrap_or("");
        for token in content
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: f64 = token
                .parse()
                .with_context(|| format!("line {}: {:?} is not a number", line_no + 1, token))?;
            if !value.is_finite() {
                bail!("line {}: brightness must be finite, got {}", line_no + 1, token);
            }
            values.push(value);
        }
    }
    if values.is_empty() {
        bail!("series contains no brightness values");
    }
    Ok(values)
}

pub fn read_brightness_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading brightness series {}", path.display()))?;
    parse_brightness_series(&text).with_context(|| format!("in {}", path.display()))
}

/// Stamp a bare brightness series at a fixed frame rate.
pub fn frames_from_series(values: &[f64], fps: f64) -> Vec<FrameReading> {
    let dt_ms = 1000.0 / fps.max(1e-3);
    values
        .iter()
        .enumerate()
        .map(|(i, &brightness)| FrameReading {
            timestamp_ms: (i as f64 * dt_ms).round() as i64,
            brightness,
            finger_detected: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_comments_and_blanks() {
        let series = parse_brightness_series("# header\n1.5\n\n2.5 # trailing\n").unwrap();
        assert_eq!(series, vec![1.5, 2.5]);
        assert!(parse_brightness_series("# only comments\n").is_err());
    }

    #[test]
    fn accepts_comma_and_space_separated_values() {
        let series = parse_brightness_series("120.5, 121\n122 123.25\t124\n").unwrap();
        assert_eq!(series, vec![120.5, 121.0, 122.0, 123.25, 124.0]);
    }

    #[test]
    fn rejects_non_finite_and_garbage() {
        let err = parse_brightness_series("120\nNaN\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
        assert!(parse_brightness_series("120\ninf\n").is_err());
        assert!(parse_brightness_series("120\nbright\n").is_err());
    }

    #[test]
    fn stamps_frames_at_fixed_rate() {
        let frames = frames_from_series(&[1.0, 2.0, 3.0, 4.0], 30.0);
        let ts: Vec<i64> = frames.iter().map(|f| f.timestamp_ms).collect();
        assert_eq!(ts, vec![0, 33, 67, 100]);
    }
}
