use anyhow::Error;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_LENGTH: usize = 150;
pub const DEFAULT_MIN_LENGTH: usize = 50;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SummarizeRequest {
    pub text: String,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct SummarizeResponse {
    pub status: String,
    pub original_text: String,
    pub summary: String,
}

/// Token bounds for a generated summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryLength {
    pub min_length: usize,
    pub max_length: usize,
}

#[cfg_attr(test, mockall::automock)]
pub trait Summarizer: Send + Sync {
    fn summarize(&self, text: &str, length: SummaryLength) -> Result<String, Error>;
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

impl SummarizeRequest {
    /// Checks the request before any model work, `length_cap` bounds `max_length` when set.
    pub fn validate(&self, length_cap: Option<usize>) -> Result<SummaryLength, String> {
        if self.text.trim().is_empty() {
            return Err("Text is required".into());
        }
        if self.max_length <= self.min_length {
            return Err("max_length must be greater than min_length".into());
        }
        if let Some(cap) = length_cap.filter(|cap| self.max_length > *cap) {
            return Err(format!("max_length must not exceed {cap}"));
        }
        Ok(SummaryLength {
            min_length: self.min_length,
            max_length: self.max_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str, max_length: usize, min_length: usize) -> SummarizeRequest {
        SummarizeRequest {
            text: text.into(),
            max_length,
            min_length,
        }
    }

    #[test]
    fn lengths_default_when_omitted() {
        let req: SummarizeRequest = serde_json::from_str(r#"{"text": "note"}"#).unwrap();
        assert_eq!(req.max_length, 150);
        assert_eq!(req.min_length, 50);
    }

    #[test]
    fn negative_lengths_do_not_deserialize() {
        let res = serde_json::from_str::<SummarizeRequest>(r#"{"text": "note", "min_length": -1}"#);
        assert!(res.is_err());
    }

    #[test]
    fn rejects_empty_text() {
        assert_eq!(request("", 100, 30).validate(Some(512)).unwrap_err(), "Text is required");
        assert_eq!(request(" \t", 100, 30).validate(Some(512)).unwrap_err(), "Text is required");
    }

    #[test]
    fn max_length_must_exceed_min_length() {
        let err = "max_length must be greater than min_length";
        assert_eq!(request("note", 10, 50).validate(Some(512)).unwrap_err(), err);
        assert_eq!(request("note", 50, 50).validate(Some(512)).unwrap_err(), err);
    }

    #[test]
    fn max_length_is_capped() {
        assert!(request("note", 600, 50).validate(Some(512)).is_err());
        assert_eq!(
            request("note", 512, 50).validate(Some(512)).unwrap(),
            SummaryLength {
                min_length: 50,
                max_length: 512
            }
        );
    }

    #[test]
    fn long_summaries_pass_without_a_cap() {
        assert_eq!(
            request("note", 4096, 50).validate(None).unwrap(),
            SummaryLength {
                min_length: 50,
                max_length: 4096
            }
        );
    }
}
