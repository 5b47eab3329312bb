use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use super::{Chunk, ChunkIter, Reader};
use crate::error::EtlError;
use crate::record::record_from_csv_row;

/// Header-driven delimited (CSV/TSV) reader. The header defines the field
/// names; fields absent from a short row become empty `Text`, never `Absent`.
#[derive(Debug, Clone)]
pub struct DelimitedReader {
    source_path: PathBuf,
    chunk_size: usize,
}

impl DelimitedReader {
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

impl Reader for DelimitedReader {
    fn chunks(&self) -> Result<ChunkIter, EtlError> {
        let file = File::open(&self.source_path)?;
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
        let header = csv_reader.headers()?.clone();

        let iter = DelimitedChunkIter {
            csv_reader,
            header,
            chunk_size: self.chunk_size,
            next_row_index: 0,
            done: false,
            builder: super::ChunkBuilder::new(self.chunk_size),
        };

        Ok(ChunkIter::new(iter))
    }
}

struct DelimitedChunkIter {
    csv_reader: csv::Reader<File>,
    header: StringRecord,
    #[allow(dead_code)]
    chunk_size: usize,
    next_row_index: u64,
    done: bool,
    builder: super::ChunkBuilder,
}

impl Iterator for DelimitedChunkIter {
    type Item = Result<Chunk, EtlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut row = StringRecord::new();
        loop {
            match self.csv_reader.read_record(&mut row) {
                Ok(true) => {
                    let record = record_from_csv_row(&self.header, &row);
                    let row_index = self.next_row_index;
                    self.next_row_index += 1;

                    if let Some(chunk) = self.builder.push(row_index, record) {
                        return Some(Ok(chunk));
                    }
                    // keep accumulating
                }
                Ok(false) => {
                    self.done = true;
                    let builder = std::mem::replace(
                        &mut self.builder,
                        super::ChunkBuilder::new(self.chunk_size.max(1)),
                    );
                    return builder.finish().map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(EtlError::from(e)));
                }
            }
        }
    }
}
