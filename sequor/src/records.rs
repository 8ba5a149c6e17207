use crate::errors::Result;
use crate::traits::RecordSink;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// One scored step of a sequential run. Traces are ordered by `step`
/// and append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub step: usize,
    pub nll: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ece: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f32>,
}

impl RecordSink for Vec<EvalRecord> {
    fn append(&mut self, record: &EvalRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Swallows records, for callers that only want the returned trace
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn append(&mut self, _record: &EvalRecord) -> Result<()> {
        Ok(())
    }
}

/// JSON Lines sink, one record per line; `.gz` paths are
/// gzip-compressed on the way out
pub struct JsonlSink {
    writer: Box<dyn Write + Send>,
}

impl JsonlSink {
    /// Create or truncate `path`
    pub fn create(path: &str) -> Result<Self> {
        Self::open(path, false)
    }

    /// Keep what `path` already holds; a resumed run appends after
    /// the existing records (for `.gz`, as a fresh gzip member)
    pub fn append_to(path: &str) -> Result<Self> {
        Self::open(path, true)
    }

    fn open(path: &str, append: bool) -> Result<Self> {
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };
        let ext = Path::new(path).extension().and_then(|x| x.to_str());
        let writer: Box<dyn Write + Send> = match ext {
            Some("gz") => Box::new(BufWriter::new(GzEncoder::new(
                file,
                Compression::default(),
            ))),
            _ => Box::new(BufWriter::new(file)),
        };
        Ok(Self { writer })
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }
}

impl RecordSink for JsonlSink {
    fn append(&mut self, record: &EvalRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Load a trace back from a JSON Lines file, gzipped or not
pub fn read_jsonl(path: &str) -> Result<Vec<EvalRecord>> {
    let file = File::open(path)?;
    let ext = Path::new(path).extension().and_then(|x| x.to_str());
    let reader: Box<dyn BufRead> = match ext {
        Some("gz") => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        _ => Box::new(BufReader::new(file)),
    };

    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
