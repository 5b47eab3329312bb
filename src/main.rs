use chunked_etl::{
    CleanStep, Database, DelimitedReader, EnrichStep, EtlConfig, JsonLinesReader, Loader,
    NormalizeStep, Orchestrator, Reader, TargetTable, TransformStep, TransformerPipeline,
};
use log::{error, info};

#[tokio::main]
async fn main() {
    env_logger::init();

    match run().await {
        Ok(()) => info!("ETL run completed"),
        Err(e) => {
            error!("ETL run failed during setup: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<(), chunked_etl::EtlError> {
    let config = EtlConfig::from_env()?;
    let run_id = config.resolved_run_id();

    info!("starting run {}", run_id);

    let db = Database::connect(&config.dsn)?;
    let loader = Loader::new(db, TargetTable::orders_default());
    loader.ensure_schema().await?;

    let steps: Vec<Box<dyn TransformStep>> = vec![
        Box::new(CleanStep),
        Box::new(NormalizeStep),
        Box::new(EnrichStep::new(config.country_map.clone())),
    ];
    let transformer = TransformerPipeline::new(steps);

    let is_json_lines = config
        .source_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson"))
        .unwrap_or(false);

    if is_json_lines {
        let reader = JsonLinesReader::new(&config.source_path, config.chunk_size)?;
        run_with_reader(reader, transformer, loader, run_id, config.max_retries).await
    } else {
        let reader = DelimitedReader::new(&config.source_path, config.chunk_size)?;
        run_with_reader(reader, transformer, loader, run_id, config.max_retries).await
    }
}

async fn run_with_reader<R: Reader>(
    reader: R,
    transformer: TransformerPipeline,
    loader: Loader,
    run_id: String,
    max_retries: u32,
) -> Result<(), chunked_etl::EtlError> {
    let orchestrator = Orchestrator::new(reader, transformer, loader, run_id, max_retries);
    orchestrator.run().await
}
