use std::time::Instant;

use serde_json::json;

use crate::backend::Backend;
use crate::cli::OutputFormat;
use crate::config::AppConfig;

/// Validate configuration, connect, and ping the data store once
pub async fn handle(config: AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    config.validate()?;

    let started = Instant::now();
    let backend = Backend::connect(&config).await?;
    backend.store.ping().await?;
    let elapsed_ms = started.elapsed().as_millis();

    match output_format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "success": true,
                "data": { "backend": backend.kind.as_str(), "elapsed_ms": elapsed_ms }
            })
        ),
        OutputFormat::Text => println!("{} backend OK ({} ms)", backend.kind.as_str(), elapsed_ms),
    }
    Ok(())
}
