use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use hf_hub::api::sync::Api;
use tracing::info;

use medical_model_runner::config::{Args, Config};
use medical_model_runner::exit_err;
use medical_model_runner::inference::executor::InferenceExecutor;
use medical_model_runner::inference::models::biobert::{self, BioBertModel};
use medical_model_runner::inference::qa_pipeline::QaPipelineConfig;
use medical_model_runner::routes::{answer_router, AnswerState};
use medical_model_runner::server::serve;
use medical_model_runner::telemetry::init_telemetry;

const SERVICE_NAME: &str = "medical_qa";

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

    let base = BioBertModel::base(
        config.model_repo_or(biobert::DEFAULT_REPO),
        &config.model_revision,
    );
    let loaded = tokio::task::spawn_blocking(move || {
        let api = Api::new()?;
        BioBertModel::new(&api, &base, &QaPipelineConfig::default())
    })
    .await?;
    let model = match loaded {
        Ok(model) => model,
        Err(err) => exit_err!(1, "Error loading question answering model: {:#}", err),
    };

    let executor = InferenceExecutor::from_config(&config);
    let state = AnswerState {
        model: Arc::new(model),
        executor: executor.clone(),
    };
    serve(&config, answer_router(state)).await?;
    executor.close();
    Ok(())
}
