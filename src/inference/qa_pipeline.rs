use anyhow::{anyhow, Error as E, Result};
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{linear, Linear, Module};
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::ApiRepo;
use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::error::InvalidInput;
use crate::inference::models::model::load_weights;
use crate::inference::task::answer::Answer;
use crate::inference::tokenizer::{load_bert_tokenizer, token_id, CLS_TOKEN, SEP_TOKEN};

#[derive(Debug, Clone)]
pub struct QaPipelineConfig {
    /// Tokens per window, question and special tokens included
    pub max_seq_len: usize,
    /// Tokens shared between neighbouring context windows
    pub doc_stride: usize,
    /// Longest accepted question in tokens
    pub max_question_len: usize,
    /// Longest answer span in tokens
    pub max_answer_len: usize,
    pub lowercase: bool,
}

impl Default for QaPipelineConfig {
    fn default() -> Self {
        Self {
            max_seq_len: 384,
            doc_stride: 128,
            max_question_len: 64,
            max_answer_len: 15,
            lowercase: false,
        }
    }
}

/// Only the field the span head needs, the encoder reads the full config itself.
#[derive(Deserialize)]
struct HiddenSize {
    hidden_size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SpecialTokens {
    pub cls: u32,
    pub sep: u32,
}

impl SpecialTokens {
    pub fn from_tokenizer(tokenizer: &Tokenizer) -> Result<Self> {
        Ok(Self {
            cls: token_id(tokenizer, CLS_TOKEN)?,
            sep: token_id(tokenizer, SEP_TOKEN)?,
        })
    }
}

/// One model input, `[CLS] question [SEP] context tokens [SEP]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub ids: Vec<u32>,
    pub type_ids: Vec<u32>,
    /// Byte range in the context for context tokens, `None` for question and special tokens
    pub offsets: Vec<Option<(usize, usize)>>,
    /// Index of the window's first token within the whole context
    pub context_start: usize,
}

impl Window {
    pub fn context_mask(&self) -> Vec<bool> {
        self.offsets.iter().map(Option::is_some).collect()
    }
}

/// A BERT encoder with a span classification head, as used for SQuAD style extractive QA.
pub struct QuestionAnsweringPipeline {
    model: BertModel,
    qa_outputs: Linear,
    tokenizer: Tokenizer,
    special: SpecialTokens,
    device: Device,
    config: QaPipelineConfig,
}

impl QuestionAnsweringPipeline {
    pub fn with_bert_weights(repo: &ApiRepo, config: &QaPipelineConfig) -> Result<Self> {
        let device = Device::Cpu;
        let config_json = std::fs::read_to_string(repo.get("config.json")?)?;
        let bert_config: Config = serde_json::from_str(&config_json)?;
        let HiddenSize { hidden_size } = serde_json::from_str(&config_json)?;

        let vb = load_weights(repo, &device)?;
        let model = BertModel::load(vb.pp("bert"), &bert_config)?;
        let qa_outputs = linear(hidden_size, 2, vb.pp("qa_outputs"))?;

        // Windows are cut by `encode_windows`, a tokenizer.json may ship its own limits
        let mut tokenizer = load_bert_tokenizer(repo, config.lowercase)?;
        tokenizer.with_truncation(None).map_err(E::msg)?;
        tokenizer.with_padding(None);
        let special = SpecialTokens::from_tokenizer(&tokenizer)?;

        Ok(Self {
            model,
            qa_outputs,
            tokenizer,
            special,
            device,
            config: config.clone(),
        })
    }

    pub fn answer(&self, question: &str, context: &str) -> Result<Answer> {
        let windows = encode_windows(
            &self.tokenizer,
            self.special,
            question,
            context,
            &self.config,
        )?;
        debug!(windows = windows.len(), "Scoring context windows");
        best_answer(&windows, context, self.config.max_answer_len, |window| {
            self.span_logits(window)
        })
    }

    fn span_logits(&self, window: &Window) -> Result<(Vec<f32>, Vec<f32>)> {
        let input_ids = Tensor::new(window.ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(window.type_ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let attention_mask = input_ids.ones_like()?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let logits = self
            .qa_outputs
            .forward(&hidden)?
            .squeeze(0)?
            .to_dtype(DType::F32)?;

        let start_logits = logits.i((.., 0))?.to_vec1::<f32>()?;
        let end_logits = logits.i((.., 1))?.to_vec1::<f32>()?;
        Ok((start_logits, end_logits))
    }
}

/// Tokenizes the pair and splits the context into overlapping windows of at most
/// `max_seq_len` tokens. Questions over `max_question_len` tokens and contexts without
/// tokens fail with [`InvalidInput`].
pub fn encode_windows(
    tokenizer: &Tokenizer,
    special: SpecialTokens,
    question: &str,
    context: &str,
    config: &QaPipelineConfig,
) -> Result<Vec<Window>> {
    let question = tokenizer.encode(question, false).map_err(E::msg)?;
    let context = tokenizer.encode(context, false).map_err(E::msg)?;
    let question_ids = question.get_ids();
    let context_ids = context.get_ids();
    let context_offsets = context.get_offsets();

    if question_ids.len() > config.max_question_len {
        return Err(InvalidInput(format!(
            "Question must not exceed {} tokens",
            config.max_question_len
        ))
        .into());
    }
    if context_ids.is_empty() {
        return Err(InvalidInput("Context produced no tokens to answer from".into()).into());
    }
    // [CLS] and two [SEP]
    let budget = config.max_seq_len.saturating_sub(question_ids.len() + 3);
    if budget == 0 {
        return Err(InvalidInput("Question leaves no room for the context".into()).into());
    }
    // Each window has to advance by at least one token
    let stride = config.doc_stride.min(budget - 1);

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + budget).min(context_ids.len());
        let prefix = question_ids.len() + 2;

        let mut ids = Vec::with_capacity(prefix + end - start + 1);
        ids.push(special.cls);
        ids.extend_from_slice(question_ids);
        ids.push(special.sep);
        ids.extend_from_slice(&context_ids[start..end]);
        ids.push(special.sep);

        let mut type_ids = vec![0; prefix];
        type_ids.resize(ids.len(), 1);

        let mut offsets = vec![None; prefix];
        offsets.extend(context_offsets[start..end].iter().copied().map(Some));
        offsets.push(None);

        windows.push(Window {
            ids,
            type_ids,
            offsets,
            context_start: start,
        });
        if end == context_ids.len() {
            return Ok(windows);
        }
        start += budget - stride;
    }
}

/// Scores every window and maps the best span across all of them back to the context.
pub fn best_answer<F>(
    windows: &[Window],
    context: &str,
    max_answer_len: usize,
    mut span_logits: F,
) -> Result<Answer>
where
    F: FnMut(&Window) -> Result<(Vec<f32>, Vec<f32>)>,
{
    let mut best: Option<(Span, usize, usize)> = None;
    for window in windows {
        let (start_logits, end_logits) = span_logits(window)?;
        let context_mask = window.context_mask();
        let Some(span) = select_span(&start_logits, &end_logits, &context_mask, max_answer_len)
        else {
            continue;
        };
        if best.map_or(true, |(current, _, _)| span.score > current.score) {
            if let (Some((start, _)), Some((_, end))) =
                (window.offsets[span.start], window.offsets[span.end])
            {
                best = Some((span, start, end));
            }
        }
    }

    let (span, start, end) =
        best.ok_or_else(|| InvalidInput("Context produced no tokens to answer from".into()))?;
    let text = context
        .get(start..end)
        .ok_or_else(|| anyhow!("Answer offsets {start}..{end} fall outside the context"))?;
    Ok(Answer {
        text: text.to_string(),
        score: span.score,
        start,
        end,
    })
}

/// Token positions of an answer, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub score: f64,
}

/// Picks the span maximising `p_start * p_end` among context tokens with
/// `start <= end` and at most `max_answer_len` tokens.
pub fn select_span(
    start_logits: &[f32],
    end_logits: &[f32],
    context_mask: &[bool],
    max_answer_len: usize,
) -> Option<Span> {
    let start_probs = masked_softmax(start_logits, context_mask);
    let end_probs = masked_softmax(end_logits, context_mask);

    let mut best: Option<Span> = None;
    for (start, p_start) in start_probs.iter().enumerate() {
        if !context_mask[start] {
            continue;
        }
        let last = (start + max_answer_len).min(end_probs.len());
        for end in (start..last).take_while(|&end| context_mask[end]) {
            let score = p_start * end_probs[end];
            if best.map_or(true, |span| score > span.score) {
                best = Some(Span { start, end, score });
            }
        }
    }
    best
}

/// Softmax over the positions where `mask` is set, masked positions get zero.
pub fn masked_softmax(logits: &[f32], mask: &[bool]) -> Vec<f64> {
    let max = logits
        .iter()
        .zip(mask)
        .filter(|(_, keep)| **keep)
        .map(|(logit, _)| *logit as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return vec![0.0; logits.len()];
    }

    let exps: Vec<f64> = logits
        .iter()
        .zip(mask)
        .map(|(logit, keep)| if *keep { (*logit as f64 - max).exp() } else { 0.0 })
        .collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}
