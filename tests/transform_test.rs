use std::collections::HashMap;

use chunked_etl::{
    CleanStep, Chunk, EnrichStep, NormalizeStep, Record, TransformStep, TransformerPipeline, Value,
};

fn record(pairs: &[(&str, Value)]) -> Record {
    pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

fn chunk(records: Vec<Record>, row_start: u64) -> Chunk {
    let row_end = row_start + records.len() as u64 - 1;
    Chunk {
        chunk_id: 0,
        records,
        row_start,
        row_end,
    }
}

fn country_map() -> HashMap<String, String> {
    HashMap::from([("VN".to_string(), "Vietnam".to_string())])
}

fn reference_pipeline() -> TransformerPipeline {
    let steps: Vec<Box<dyn TransformStep>> = vec![
        Box::new(CleanStep),
        Box::new(NormalizeStep),
        Box::new(EnrichStep::new(country_map())),
    ];
    TransformerPipeline::new(steps)
}

#[test]
fn s1_happy_path_two_records() {
    let pipeline = reference_pipeline();
    let input = chunk(
        vec![
            record(&[
                ("external_id", text("a")),
                ("amount", text("10")),
                ("country_code", text("VN")),
                ("created_at", text("2024-01-01T00:00:00Z")),
            ]),
            record(&[
                ("external_id", text("b")),
                ("amount", text("20")),
                ("country_code", text("")),
                ("created_at", text("2024-01-01T00:00:00Z")),
            ]),
        ],
        0,
    );

    let out = pipeline.process_chunk(&input);

    assert_eq!(out.records.len(), 2);
    assert!(out.errors.is_empty());
    assert_eq!(out.records[0].get("amount"), Some(&Value::Number(10.0)));
    assert_eq!(
        out.records[0].get("country_name"),
        Some(&Value::Text("Vietnam".to_string()))
    );
    // blank country_code was dropped by Clean, so Enrich never saw it.
    assert_eq!(out.records[1].get("country_name"), None);
}

#[test]
fn s2_partial_transform_failure_quarantines_middle_row() {
    let pipeline = reference_pipeline();
    let input = chunk(
        vec![
            record(&[("external_id", text("a")), ("country_code", text("VN"))]),
            record(&[("external_id", text("b")), ("country_code", text("ZZ"))]),
            record(&[("external_id", text("c")), ("country_code", text("VN"))]),
        ],
        0,
    );

    let out = pipeline.process_chunk(&input);

    assert_eq!(out.records.len(), 2);
    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].row_index, 1);
    assert!(out.errors[0].reason.contains("ZZ"));
}

#[test]
fn s6_empty_after_clean_is_quarantined_with_expected_reason() {
    let pipeline = reference_pipeline();
    let input = chunk(
        vec![record(&[
            ("external_id", text("   ")),
            ("amount", text("")),
        ])],
        5,
    );

    let out = pipeline.process_chunk(&input);

    assert!(out.records.is_empty());
    assert_eq!(out.errors.len(), 1);
    assert_eq!(out.errors[0].row_index, 5);
    assert_eq!(out.errors[0].reason, "Empty record after cleaning");
}

#[test]
fn transformed_chunk_record_and_error_counts_always_sum_to_input_length() {
    let pipeline = reference_pipeline();
    let input = chunk(
        vec![
            record(&[("external_id", text("a")), ("amount", text("not-a-number"))]),
            record(&[("external_id", text("b")), ("amount", text("5"))]),
            record(&[("external_id", text("c")), ("created_at", text("not-a-date"))]),
        ],
        0,
    );

    let out = pipeline.process_chunk(&input);

    assert_eq!(out.records.len() + out.errors.len(), input.records.len());
}

#[test]
fn clean_step_trims_whitespace_and_drops_blank_fields() {
    let step = CleanStep;
    let input = record(&[
        ("external_id", text("  a  ")),
        ("note", text("   ")),
        ("flag", Value::Absent),
    ]);

    let out = step.process(&input).expect("non-empty after clean");

    assert_eq!(out.get("external_id"), Some(&text("a")));
    assert_eq!(out.get("note"), None);
    assert_eq!(out.get("flag"), None);
}

#[test]
fn normalize_step_parses_timestamp_and_coerces_amount() {
    let step = NormalizeStep;
    let input = record(&[
        ("amount", text("12.5")),
        ("created_at", text("2024-06-01T12:00:00Z")),
    ]);

    let out = step.process(&input).expect("valid record");

    assert_eq!(out.get("amount"), Some(&Value::Number(12.5)));
    assert!(matches!(out.get("created_at"), Some(Value::Timestamp(_))));
}

#[test]
fn normalize_step_rejects_unparseable_timestamp() {
    let step = NormalizeStep;
    let input = record(&[("created_at", text("not-a-date"))]);
    assert!(step.process(&input).is_err());
}

#[test]
fn enrich_step_passes_through_records_without_country_code() {
    let step = EnrichStep::new(country_map());
    let input = record(&[("external_id", text("a"))]);
    let out = step.process(&input).expect("pass-through");
    assert_eq!(out.get("country_name"), None);
}

#[test]
fn enrich_step_fails_on_unknown_code() {
    let step = EnrichStep::new(country_map());
    let input = record(&[("country_code", text("ZZ"))]);
    assert!(step.process(&input).is_err());
}
