use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use hf_hub::api::sync::Api;
use tracing::info;

use medical_model_runner::config::{Args, Config};
use medical_model_runner::exit_err;
use medical_model_runner::inference::executor::InferenceExecutor;
use medical_model_runner::inference::models::t5::{self, T5Model};
use medical_model_runner::inference::summary_pipeline::SummaryPipelineConfig;
use medical_model_runner::routes::{summarize_router, SummarizeState};
use medical_model_runner::server::serve;
use medical_model_runner::telemetry::init_telemetry;

const SERVICE_NAME: &str = "medical_summary";

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load(Args::parse()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    };
    init_telemetry(SERVICE_NAME, config.otlp_endpoint(), config.console_log)?;
    info!(
        "Supported features: avx: {}, neon: {}, simd128: {}, f16c: {}",
        candle_core::utils::with_avx(),
        candle_core::utils::with_neon(),
        candle_core::utils::with_simd128(),
        candle_core::utils::with_f16c()
    );

    let base = T5Model::base(config.model_repo_or(t5::DEFAULT_REPO), &config.model_revision);
    let loaded = tokio::task::spawn_blocking(move || {
        let api = Api::new()?;
        T5Model::new(&api, &base, SummaryPipelineConfig::default())
    })
    .await?;
    let model = match loaded {
        Ok(model) => model,
        Err(err) => exit_err!(1, "Error loading summarization model: {:#}", err),
    };

    let executor = InferenceExecutor::from_config(&config);
    let state = SummarizeState {
        model: Arc::new(model),
        executor: executor.clone(),
        max_summary_length: config.summary_length_cap(),
    };
    serve(&config, summarize_router(state)).await?;
    executor.close();
    Ok(())
}
