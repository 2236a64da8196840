use anyhow::Error;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub context: String,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct AnswerResponse {
    pub status: String,
    pub question: String,
    pub answer: String,
    pub confidence: f64,
}

/// A span extracted from the context.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Product of the start and end probabilities, in [0, 1]
    pub score: f64,
    /// Byte range of `text` inside the context
    pub start: usize,
    pub end: usize,
}

#[cfg_attr(test, mockall::automock)]
pub trait QuestionAnswerer: Send + Sync {
    fn answer(&self, question: &str, context: &str) -> Result<Answer, Error>;
}

impl AnswerRequest {
    pub fn is_valid(&self) -> bool {
        !self.question.trim().is_empty() && !self.context.trim().is_empty()
    }
}
