//! Output of query results: JSON on stdout or CSV files.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Writes `value` as pretty-printed JSON to `writer`, followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    Ok(())
}

/// Prints `value` as pretty-printed JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    write_json(std::io::stdout().lock(), value)
}

/// Writes `records` to a CSV file at `path`, replacing any previous content.
/// The header row is derived from the record's field names.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    debug!(path = %path.display(), rows = records.len(), "Writing CSV");

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = records.len(), "CSV written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DistributionPoint, TimeSeriesPoint};
    use chrono::{TimeZone, Utc};
    use std::fs;

    fn distribution() -> Vec<DistributionPoint> {
        vec![
            DistributionPoint {
                time: "08:00".to_string(),
                mechanical: 2.5,
                electric: 1.0,
            },
            DistributionPoint {
                time: "08:10".to_string(),
                mechanical: 3.0,
                electric: 0.0,
            },
        ]
    }

    #[test]
    fn test_write_json() {
        let mut buf = Vec::new();
        write_json(&mut buf, &distribution()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed[1]["time"], "08:10");
    }

    #[test]
    fn test_write_records_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distribution.csv");

        write_records(&path, &distribution()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec!["time,mechanical,electric", "08:00,2.5,1.0", "08:10,3.0,0.0"]);
    }

    #[test]
    fn test_write_records_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        let point = TimeSeriesPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
            mechanical: 4,
            electric: 2,
        };

        write_records(&path, &[point.clone(), point.clone()]).unwrap();
        write_records(&path, &[point]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("2024-05-01T08:00:00Z,4,2"));
    }
}
