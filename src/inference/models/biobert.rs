use anyhow::Result;
use hf_hub::api::sync::Api;
use tracing::info;

use crate::inference::models::model::{ModelBase, TextTask};
use crate::inference::qa_pipeline::{QaPipelineConfig, QuestionAnsweringPipeline};
use crate::inference::task::answer::{Answer, QuestionAnswerer};

/// BioBERT v1.1 fine-tuned on SQuAD, so the span head is trained.
pub const DEFAULT_REPO: &str = "dmis-lab/biobert-base-cased-v1.1-squad";

pub struct BioBertModel {
    pub base: ModelBase,
    pipeline: QuestionAnsweringPipeline,
}

impl BioBertModel {
    #[tracing::instrument(level = "info", skip(api))]
    pub fn new(api: &Api, base: &ModelBase, config: &QaPipelineConfig) -> Result<Self> {
        base.expect_task(TextTask::QuestionAnswering)?;
        let repo = base.repo(api);
        let pipeline = QuestionAnsweringPipeline::with_bert_weights(&repo, config)?;
        info!("{base} loaded");

        Ok(Self {
            base: base.clone(),
            pipeline,
        })
    }

    pub fn base(repo_id: &str, revision: &str) -> ModelBase {
        ModelBase {
            name: "BioBERT".into(),
            license: "apache-2.0".into(),
            task: TextTask::QuestionAnswering,
            repo_id: repo_id.into(),
            repo_revision: revision.into(),
        }
    }
}

impl QuestionAnswerer for BioBertModel {
    #[tracing::instrument(level = "info", skip(self, question, context))]
    fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        self.pipeline.answer(question, context)
    }
}
