use serde_json::json;

use crate::backend::PostgresBackend;
use crate::cli::OutputFormat;
use crate::config::{AppConfig, BackendKind};

pub async fn handle(config: AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    if config.backend.kind != BackendKind::Postgres {
        anyhow::bail!(
            "migrate needs BACKEND=postgres (configured: {})",
            config.backend.kind.as_str()
        );
    }
    config.validate()?;

    let backend = PostgresBackend::connect(&config).await?;
    backend.ensure_schema().await?;

    match output_format {
        OutputFormat::Json => println!("{}", json!({ "success": true, "data": { "migrated": true } })),
        OutputFormat::Text => println!("Schema is up to date"),
    }
    Ok(())
}
