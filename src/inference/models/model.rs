use std::fmt;
use std::path::Path;

use anyhow::{bail, ensure, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use hf_hub::api::sync::{Api, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ModelBase {
    /// The name of the model
    pub name: String,

    /// The license of the model
    pub license: String,

    /// The task the model is fine-tuned for
    pub task: TextTask,

    /// The id of the model repository
    pub repo_id: String,

    /// The revision of the model repository
    pub repo_revision: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum TextTask {
    QuestionAnswering,
    Summarization,
}

impl TextTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextTask::QuestionAnswering => "question_answering",
            TextTask::Summarization => "summarization",
        }
    }
}

impl fmt::Display for ModelBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}@{}, {}, license {})",
            self.name,
            self.repo_id,
            self.repo_revision,
            self.task.as_str(),
            self.license
        )
    }
}

impl ModelBase {
    /// Fails when the model is set up for a different task than the caller serves.
    pub fn expect_task(&self, task: TextTask) -> Result<()> {
        ensure!(
            self.task == task,
            "{} is a {} model, expected {}",
            self.name,
            self.task.as_str(),
            task.as_str()
        );
        Ok(())
    }

    pub fn repo(&self, api: &Api) -> ApiRepo {
        api.repo(Repo::with_revision(
            self.repo_id.clone(),
            RepoType::Model,
            self.repo_revision.clone(),
        ))
    }
}

/// Weight files looked up in a repository, in order of preference.
const WEIGHT_FILENAMES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

/// Downloads the first available weight file and maps it into a `VarBuilder`.
#[tracing::instrument(level = "info", skip(repo, device))]
pub fn load_weights(repo: &ApiRepo, device: &Device) -> Result<VarBuilder<'static>> {
    for filename in WEIGHT_FILENAMES {
        let Ok(path) = repo.get(filename) else {
            continue;
        };
        info!("Loading weights from {}", path.display());
        return var_builder(&path, device);
    }
    bail!("Repository has none of the weight files {:?}", WEIGHT_FILENAMES)
}

fn var_builder(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let vb = match path.extension().and_then(|ext| ext.to_str()) {
        // Safety: the file is a cached download and is not modified while mapped
        Some("safetensors") => unsafe {
            VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)?
        },
        _ => VarBuilder::from_pth(path, DType::F32, device)?,
    };
    Ok(vb)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(task: TextTask) -> ModelBase {
        ModelBase {
            name: "BioBERT".into(),
            license: "apache-2.0".into(),
            task,
            repo_id: "dmis-lab/biobert-base-cased-v1.1-squad".into(),
            repo_revision: "main".into(),
        }
    }

    #[test]
    fn display_names_repo_task_and_license() {
        assert_eq!(
            base(TextTask::QuestionAnswering).to_string(),
            "BioBERT (dmis-lab/biobert-base-cased-v1.1-squad@main, question_answering, license apache-2.0)"
        );
    }

    #[test]
    fn task_mismatch_is_an_error() {
        assert!(base(TextTask::QuestionAnswering)
            .expect_task(TextTask::QuestionAnswering)
            .is_ok());
        let err = base(TextTask::Summarization)
            .expect_task(TextTask::QuestionAnswering)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "BioBERT is a summarization model, expected question_answering"
        );
    }
}
