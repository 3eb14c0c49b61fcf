//! Dataset format detection and loading.
//!
//! Records are read from JSONL (`.jsonl`, `.ndjson`), JSON arrays (`.json`)
//! or Parquet files. Parquet rows are serialized to JSON objects through
//! arrow's JSON writer so every container feeds the same per-format parsers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rayon::prelude::*;
use serde_json::Value;

use crate::error::{FtlintError, Result};

use super::formats::{parse_record, sniff_record};
use super::{Dataset, DatasetFormat, Sample};

/// Physical layout of a dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    JsonLines,
    JsonDocument,
    Parquet,
}

impl Container {
    fn for_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Container::JsonDocument,
            Some("parquet") | Some("pq") => Container::Parquet,
            _ => Container::JsonLines,
        }
    }
}

/// One serialized record read from a dataset file.
#[derive(Debug, Clone)]
struct RawRecord {
    /// 1-based line (JSONL) or element/row number.
    position: usize,
    raw: String,
}

/// Auto-detects the format of a dataset file.
///
/// Parquet files are recognized by extension. JSON files are sniffed from
/// the first parseable record; the first decisive key wins.
///
/// # Errors
///
/// Returns [`FtlintError::FormatDetection`] when no known shape matches and
/// [`FtlintError::DatasetLoad`] when the file cannot be read.
pub fn detect_format(path: impl AsRef<Path>) -> Result<DatasetFormat> {
    let path = path.as_ref();
    let container = Container::for_path(path);
    if container == Container::Parquet {
        return Ok(DatasetFormat::Parquet);
    }

    let first = match container {
        Container::JsonLines => first_jsonl_record(path)?,
        Container::JsonDocument => read_json_document(path)?.into_iter().next(),
        Container::Parquet => None,
    };

    first
        .and_then(|record| serde_json::from_str::<Value>(&record.raw).ok())
        .as_ref()
        .and_then(sniff_record)
        .ok_or_else(|| FtlintError::FormatDetection {
            path: path.display().to_string(),
        })
}

/// Loads a dataset, normalizing every record into a [`Sample`].
///
/// When `format` is `None` the format is detected from the first record.
/// Sample indices are assigned sequentially from 0 in file order.
///
/// # Errors
///
/// - [`FtlintError::DatasetLoad`] if the file is unreadable or any record is
///   malformed, naming the record position.
/// - [`FtlintError::EmptyDataset`] if no samples result.
/// - [`FtlintError::UnsupportedFormat`] for formats that cannot be loaded
///   from a local file.
pub fn load_dataset(path: impl AsRef<Path>, format: Option<DatasetFormat>) -> Result<Dataset> {
    let path = path.as_ref();
    let display_path = path.display().to_string();

    if format == Some(DatasetFormat::HfDataset) {
        return Err(FtlintError::UnsupportedFormat {
            format: DatasetFormat::HfDataset.to_string(),
        });
    }

    let container = if format == Some(DatasetFormat::Parquet) {
        Container::Parquet
    } else {
        Container::for_path(path)
    };
    let records = match container {
        Container::JsonLines => read_jsonl(path)?,
        Container::JsonDocument => read_json_document(path)?,
        Container::Parquet => read_parquet(path)?,
    };

    if records.is_empty() {
        return Err(FtlintError::EmptyDataset { path: display_path });
    }

    let values = records
        .par_iter()
        .map(|record| {
            serde_json::from_str::<Value>(&record.raw).map_err(|e| {
                FtlintError::load(&display_path, format!("record {}: {}", record.position, e))
            })
        })
        .collect::<Result<Vec<Value>>>()?;

    let declared = match format {
        Some(format) => format,
        None if container == Container::Parquet => DatasetFormat::Parquet,
        None => sniff_record(&values[0]).ok_or_else(|| FtlintError::FormatDetection {
            path: display_path.clone(),
        })?,
    };

    // Containers carry no record shape of their own; the rows decide.
    let record_format = if declared == DatasetFormat::Parquet {
        sniff_record(&values[0]).ok_or_else(|| FtlintError::FormatDetection {
            path: display_path.clone(),
        })?
    } else {
        declared
    };

    let samples = records
        .par_iter()
        .zip(values.par_iter())
        .enumerate()
        .map(|(index, (record, value))| {
            parse_record(record_format, value, &record.raw, index).map_err(|e| {
                FtlintError::load(&display_path, format!("record {}: {}", record.position, e))
            })
        })
        .collect::<Result<Vec<Sample>>>()?;

    tracing::info!(
        path = %display_path,
        format = %declared,
        samples = samples.len(),
        "Dataset loaded"
    );

    Ok(Dataset::new(samples, declared, Some(path.to_path_buf())))
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| FtlintError::load(path.display().to_string(), e))
}

fn read_jsonl(path: &Path) -> Result<Vec<RawRecord>> {
    let reader = BufReader::new(open(path)?);
    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| FtlintError::load(path.display().to_string(), e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        records.push(RawRecord {
            position: number + 1,
            raw: trimmed.to_string(),
        });
    }
    Ok(records)
}

fn first_jsonl_record(path: &Path) -> Result<Option<RawRecord>> {
    let reader = BufReader::new(open(path)?);
    for (number, line) in reader.lines().enumerate() {
        let Ok(line) = line else {
            // Binary or non-UTF-8 content: nothing parseable here.
            return Ok(None);
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || serde_json::from_str::<Value>(trimmed).is_err() {
            continue;
        }
        return Ok(Some(RawRecord {
            position: number + 1,
            raw: trimmed.to_string(),
        }));
    }
    Ok(None)
}

/// Reads a `.json` file holding an array of records, an object with a
/// `data` array, or a single record object.
///
/// Each record's `raw_content` is its compact re-serialization, not the
/// bytes on disk: whitespace and escapes are normalized, so content hashes
/// of a `.json` dataset can differ from the same records in JSONL.
fn read_json_document(path: &Path) -> Result<Vec<RawRecord>> {
    let display_path = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| FtlintError::load(&display_path, e))?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: Value = serde_json::from_str(&text).map_err(|e| FtlintError::load(&display_path, e))?;

    let elements = match document {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                object.insert("data".to_string(), other);
                vec![Value::Object(object)]
            }
            None => vec![Value::Object(object)],
        },
        other => {
            return Err(FtlintError::load(
                &display_path,
                format!("expected an array or object, found {}", json_kind(&other)),
            ))
        }
    };

    elements
        .iter()
        .enumerate()
        .map(|(i, element)| {
            serde_json::to_string(element)
                .map(|raw| RawRecord {
                    position: i + 1,
                    raw,
                })
                .map_err(|e| FtlintError::load(&display_path, e))
        })
        .collect()
}

fn read_parquet(path: &Path) -> Result<Vec<RawRecord>> {
    let display_path = path.display().to_string();
    let file = open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|e| FtlintError::load(&display_path, e))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| FtlintError::load(&display_path, e))?;
        let mut buffer = Vec::new();
        {
            let mut writer = arrow::json::LineDelimitedWriter::new(&mut buffer);
            writer
                .write_batches(&[&batch])
                .and_then(|_| writer.finish())
                .map_err(|e| FtlintError::load(&display_path, e))?;
        }
        let text = String::from_utf8(buffer).map_err(|e| FtlintError::load(&display_path, e))?;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            records.push(RawRecord {
                position: records.len() + 1,
                raw: line.to_string(),
            });
        }
    }

    tracing::debug!(path = %display_path, rows = records.len(), "Parquet rows read");
    Ok(records)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
