use anyhow::Result;
use hf_hub::api::sync::Api;
use tracing::info;

use crate::inference::models::model::{ModelBase, TextTask};
use crate::inference::summary_pipeline::{SummarizationPipeline, SummaryPipelineConfig};
use crate::inference::task::summarize::{Summarizer, SummaryLength};

pub const DEFAULT_REPO: &str = "google-t5/t5-small";

#[derive(Clone)]
pub struct T5Model {
    pub base: ModelBase,
    generator_pipeline: SummarizationPipeline,
}

impl T5Model {
    #[tracing::instrument(level = "info", skip(api))]
    pub fn new(api: &Api, base: &ModelBase, config: SummaryPipelineConfig) -> Result<Self> {
        base.expect_task(TextTask::Summarization)?;
        let repo = base.repo(api);
        let generator_pipeline = SummarizationPipeline::with_t5_weights(&repo, config)?;
        info!("{base} loaded");

        Ok(Self {
            base: base.clone(),
            generator_pipeline,
        })
    }

    pub fn base(repo_id: &str, revision: &str) -> ModelBase {
        ModelBase {
            name: "T5".into(),
            license: "apache-2.0".into(),
            task: TextTask::Summarization,
            repo_id: repo_id.into(),
            repo_revision: revision.into(),
        }
    }
}

impl Summarizer for T5Model {
    #[tracing::instrument(level = "info", skip(self, text))]
    fn summarize(&self, text: &str, length: SummaryLength) -> Result<String> {
        // Decoding mutates the kv cache, each call works on its own copy of the shared weights
        self.generator_pipeline.clone().summarize(text, length)
    }
}
