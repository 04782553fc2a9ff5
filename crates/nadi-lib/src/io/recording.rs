use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

use crate::signal::FrameReading;

/// CSV row of a recorded capture: `timestamp_ms,brightness[,finger]`.
#[derive(Debug, Deserialize, Serialize)]
struct RecordingRow {
    timestamp_ms: i64,
    brightness: f64,
    #[serde(default)]
    finger: Option<u8>,
}

impl From<RecordingRow> for FrameReading {
    fn from(row: RecordingRow) -> Self {
        FrameReading {
            timestamp_ms: row.timestamp_ms,
            brightness: row.brightness,
            // recordings without the column were captured with a finger on the lens
            finger_detected: row.finger.map(|f| f != 0).unwrap_or(true),
        }
    }
}

pub fn parse_recording<R: Read>(reader: R) -> Result<Vec<FrameReading>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(reader);
    let mut frames = Vec::new();
    for (idx, row) in reader.deserialize::<RecordingRow>().enumerate() {
        let row = row.with_context(|| format!("parsing recording row {}", idx + 1))?;
        frames.push(row.into());
    }
    if frames.is_empty() {
        anyhow::bail!("recording contains no frames");
    }
    Ok(frames)
}

pub fn read_recording(path: &Path) -> Result<Vec<FrameReading>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening recording {}", path.display()))?;
    parse_recording(file).with_context(|| format!("in {}", path.display()))
}

pub fn write_recording<W: Write>(writer: W, frames: &[FrameReading]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(writer);
    for frame in frames {
        writer.serialize(RecordingRow {
            timestamp_ms: frame.timestamp_ms,
            brightness: frame.brightness,
            finger: Some(u8::from(frame.finger_detected)),
        })?;
    }
    writer.flush()?;
    Ok(())
}
