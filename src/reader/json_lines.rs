use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde_json::Value as JsonValue;

use super::{Chunk, ChunkIter, Reader};
use crate::error::EtlError;
use crate::record::record_from_json_object;

/// JSON-lines reader: one non-blank line is one JSON object. Malformed lines
/// are fatal to the chunk boundary (a parse error, not a per-record
/// quarantine) -- blank/whitespace-only lines are simply skipped.
#[derive(Debug, Clone)]
pub struct JsonLinesReader {
    source_path: PathBuf,
    chunk_size: usize,
}

impl JsonLinesReader {
    pub fn new(source_path: impl AsRef<Path>, chunk_size: usize) -> Result<Self, EtlError> {
        if chunk_size == 0 {
            return Err(EtlError::Setup("chunk_size must be >= 1".to_string()));
        }
        Ok(Self {
            source_path: source_path.as_ref().to_path_buf(),
            chunk_size,
        })
    }
}

impl Reader for JsonLinesReader {
    fn chunks(&self) -> Result<ChunkIter, EtlError> {
        let file = File::open(&self.source_path)?;
        let lines = BufReader::new(file).lines();

        let iter = JsonLinesChunkIter {
            lines,
            chunk_size: self.chunk_size,
            next_row_index: 0,
            done: false,
            builder: super::ChunkBuilder::new(self.chunk_size),
        };

        Ok(ChunkIter::new(iter))
    }
}

struct JsonLinesChunkIter {
    lines: Lines<BufReader<File>>,
    chunk_size: usize,
    next_row_index: u64,
    done: bool,
    builder: super::ChunkBuilder,
}

impl Iterator for JsonLinesChunkIter {
    type Item = Result<Chunk, EtlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    let parsed: JsonValue = match serde_json::from_str(&line) {
                        Ok(v) => v,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(EtlError::from(e)));
                        }
                    };

                    let object = match parsed.as_object() {
                        Some(o) => o,
                        None => {
                            self.done = true;
                            return Some(Err(EtlError::Reader(
                                "JSON-lines record must be an object".to_string(),
                            )));
                        }
                    };

                    let record = record_from_json_object(object);
                    let row_index = self.next_row_index;
                    self.next_row_index += 1;

                    if let Some(chunk) = self.builder.push(row_index, record) {
                        return Some(Ok(chunk));
                    }
                    // keep accumulating
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(EtlError::from(e)));
                }
                None => {
                    self.done = true;
                    let builder = std::mem::replace(
                        &mut self.builder,
                        super::ChunkBuilder::new(self.chunk_size.max(1)),
                    );
                    return builder.finish().map(Ok);
                }
            }
        }
    }
}
