use std::io::Write;

use chunked_etl::{DelimitedReader, JsonLinesReader, Reader, Value};
use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create temp file");
    file.write_all(contents.as_bytes()).expect("failed to write temp file");
    file
}

#[test]
fn delimited_reader_emits_chunks_with_correct_row_ranges() {
    let file = write_temp(
        "external_id,amount,country_code,created_at\n\
         a,10,VN,2024-01-01T00:00:00Z\n\
         b,20,,2024-01-02T00:00:00Z\n\
         c,30,US,2024-01-03T00:00:00Z\n",
    );

    let reader = DelimitedReader::new(file.path(), 2).expect("valid reader");
    let chunks: Vec<_> = reader
        .chunks()
        .expect("open")
        .collect::<Result<_, _>>()
        .expect("no reader errors");

    assert_eq!(chunks.len(), 2);

    assert_eq!(chunks[0].chunk_id, 0);
    assert_eq!(chunks[0].row_start, 0);
    assert_eq!(chunks[0].row_end, 1);
    assert_eq!(chunks[0].records.len(), 2);

    assert_eq!(chunks[1].chunk_id, 1);
    assert_eq!(chunks[1].row_start, 2);
    assert_eq!(chunks[1].row_end, 2);
    assert_eq!(chunks[1].records.len(), 1);

    // A field blank in the source row maps to empty Text, not Absent.
    let row_b = &chunks[0].records[1];
    assert_eq!(row_b.get("country_code"), Some(&Value::Text(String::new())));
}

#[test]
fn delimited_reader_is_restartable() {
    let file = write_temp("id\n1\n2\n3\n");
    let reader = DelimitedReader::new(file.path(), 10).expect("valid reader");

    let first: Vec<_> = reader.chunks().unwrap().collect::<Result<_, _>>().unwrap();
    let second: Vec<_> = reader.chunks().unwrap().collect::<Result<_, _>>().unwrap();

    assert_eq!(first, second);
}

#[test]
fn delimited_reader_rejects_zero_chunk_size() {
    let file = write_temp("id\n1\n");
    assert!(DelimitedReader::new(file.path(), 0).is_err());
}

#[test]
fn delimited_reader_fails_fast_on_missing_file() {
    let reader = DelimitedReader::new("/no/such/file.csv", 10).expect("construction validates chunk_size only");
    assert!(reader.chunks().is_err());
}

#[test]
fn empty_delimited_input_yields_zero_chunks() {
    let file = write_temp("external_id,amount\n");
    let reader = DelimitedReader::new(file.path(), 10).expect("valid reader");
    let chunks: Vec<_> = reader.chunks().unwrap().collect::<Result<_, _>>().unwrap();
    assert!(chunks.is_empty());
}

#[test]
fn json_lines_reader_skips_blank_lines_and_chunks_correctly() {
    let file = write_temp(
        "{\"external_id\": \"a\", \"amount\": 10}\n\
         \n\
         {\"external_id\": \"b\", \"amount\": 20}\n\
         \n\
         {\"external_id\": \"c\", \"amount\": 30}\n",
    );

    let reader = JsonLinesReader::new(file.path(), 2).expect("valid reader");
    let chunks: Vec<_> = reader.chunks().unwrap().collect::<Result<_, _>>().unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].records.len(), 2);
    assert_eq!(chunks[1].records.len(), 1);
    // Row indices count only non-blank lines.
    assert_eq!(chunks[0].row_start, 0);
    assert_eq!(chunks[0].row_end, 1);
    assert_eq!(chunks[1].row_start, 2);
    assert_eq!(chunks[1].row_end, 2);
}

#[test]
fn json_lines_reader_fails_on_malformed_line() {
    let file = write_temp("{\"external_id\": \"a\"}\nnot json\n{\"external_id\": \"b\"}\n");
    let reader = JsonLinesReader::new(file.path(), 10).expect("valid reader");

    let results: Vec<_> = reader.chunks().unwrap().collect();
    // The malformed line terminates the sequence with an error; no partial
    // chunk is emitted for the buffered first record.
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}
