//! The `s3pt` binary: parse flags, build the storage client, run the
//! workload, and report the total elapsed time.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use s3pt::cli::Args;
use s3pt::client::{BoxedStore, S3Client};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Args = argh::from_env();
    let (run_config, client_config) = args.resolve()?;
    tracing::debug!(?run_config, ?client_config);

    let store: BoxedStore = Arc::new(S3Client::new(&client_config, &run_config.bucket));

    let stopwatch = Instant::now();
    let report = s3pt::run(run_config, store).await?;
    report.print();

    tracing::info!("total time = {} ms", stopwatch.elapsed().as_millis());

    Ok(())
}
