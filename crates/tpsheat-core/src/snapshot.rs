use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::{Context, anyhow};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::sample::{Sample, first_out_of_order};

/// Reads a JSON Lines sample snapshot and returns it ordered by timestamp.
#[tracing::instrument(skip(path), fields(file = %path.display()))]
pub fn load_samples(path: &Path) -> anyhow::Result<Vec<Sample>> {
    let file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let sample: Sample = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        if !sample.value.is_finite() {
            return Err(anyhow!(
                "non-finite value in {} line {}",
                path.display(),
                idx + 1
            ));
        }
        out.push(sample);
    }

    if let Some(index) = first_out_of_order(&out) {
        warn!(first_unordered = index, "snapshot is not time ordered; sorting");
        out.sort_by_key(|sample| sample.timestamp);
    }

    info!(count = out.len(), "loaded samples");
    Ok(out)
}

#[tracing::instrument(skip(path, samples), fields(file = %path.display()))]
pub fn save_samples(path: &Path, samples: &[Sample]) -> anyhow::Result<()> {
    debug!(count = samples.len(), "saving samples atomically");
    let mut temp = temp_beside(path)?;
    for sample in samples {
        let serialized = serde_json::to_string(sample)?;
        writeln!(temp, "{serialized}")?;
    }
    persist(temp, path)
}

/// Writes `value` as pretty JSON, replacing `path` only once fully written.
#[tracing::instrument(skip(path, value), fields(file = %path.display()))]
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let mut temp = temp_beside(path)?;
    serde_json::to_writer_pretty(&mut temp, value)
        .with_context(|| format!("failed serializing {}", path.display()))?;
    writeln!(temp)?;
    persist(temp, path)
}

fn temp_beside(path: &Path) -> anyhow::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).with_context(|| format!("failed to create temp file in {}", dir.display()))
}

fn persist(mut temp: NamedTempFile, path: &Path) -> anyhow::Result<()> {
    temp.flush()?;
    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn accepts_mixed_timestamp_forms_and_sorts() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("samples.jsonl");
        fs::write(
            &path,
            "{\"timestamp\": \"2024-01-02T00:00:05Z\", \"value\": 2.0}\n\
             \n\
             {\"timestamp\": \"20240102T000001Z\", \"value\": 1.0}\n\
             {\"timestamp\": 1704153610, \"value\": 3.0}\n",
        )
        .expect("write snapshot");

        let samples = load_samples(&path).expect("load");
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn reports_line_of_bad_record() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("samples.jsonl");
        fs::write(
            &path,
            "{\"timestamp\": \"2024-01-02T00:00:05Z\", \"value\": 2.0}\n\
             {\"timestamp\": \"soon\", \"value\": 1.0}\n",
        )
        .expect("write snapshot");

        let err = load_samples(&path).expect_err("bad timestamp");
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn save_then_load_keeps_samples() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("samples.jsonl");
        let start = Utc
            .with_ymd_and_hms(2024, 1, 2, 3, 4, 5)
            .single()
            .expect("valid start");
        let samples = vec![
            Sample::new(start, 0.5),
            Sample::new(start + Duration::milliseconds(1500), 7.25),
        ];

        save_samples(&path, &samples).expect("save");
        assert_eq!(load_samples(&path).expect("load"), samples);
    }
}
