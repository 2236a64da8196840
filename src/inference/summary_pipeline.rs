use anyhow::{Error as E, Result};
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::t5::{Config, T5ForConditionalGeneration};
use hf_hub::api::sync::ApiRepo;
use tokenizers::Tokenizer;

use crate::inference::models::model::load_weights;
use crate::inference::task::summarize::SummaryLength;

// Greedy decoding never draws from the rng, the seed only satisfies the processor
const GREEDY_SEED: u64 = 299792458;

#[derive(Debug, Clone)]
pub struct SummaryPipelineConfig {
    /// Task prefix T5 checkpoints expect in front of the text
    pub prefix: String,
    pub max_input_tokens: usize,
    /// Forbids repeating any n-gram of this size, 0 disables the check
    pub no_repeat_ngram_size: usize,
}

impl Default for SummaryPipelineConfig {
    fn default() -> Self {
        Self {
            prefix: "summarize: ".into(),
            max_input_tokens: 512,
            no_repeat_ngram_size: 3,
        }
    }
}

// Taken from https://github.com/huggingface/candle/blob/main/candle-examples/examples/t5/main.rs
pub struct SummarizationPipeline {
    model: T5ForConditionalGeneration,
    tokenizer: Tokenizer,
    device: Device,
    logits_processor: LogitsProcessor,
    config: SummaryPipelineConfig,
    decoder_start_token: u32,
    eos_token: u32,
    use_cache: bool,
}

impl Clone for SummarizationPipeline {
    fn clone(&self) -> SummarizationPipeline {
        SummarizationPipeline {
            model: self.model.clone(),
            tokenizer: self.tokenizer.clone(),
            device: self.device.clone(),
            logits_processor: LogitsProcessor::new(GREEDY_SEED, None, None),
            config: self.config.clone(),
            decoder_start_token: self.decoder_start_token,
            eos_token: self.eos_token,
            use_cache: self.use_cache,
        }
    }
}

impl SummarizationPipeline {
    pub fn with_t5_weights(repo: &ApiRepo, config: SummaryPipelineConfig) -> Result<Self> {
        let device = Device::Cpu;
        let t5_config: Config =
            serde_json::from_str(&std::fs::read_to_string(repo.get("config.json")?)?)?;
        let tokenizer = Tokenizer::from_file(repo.get("tokenizer.json")?).map_err(E::msg)?;

        let vb = load_weights(repo, &device)?;
        let model = T5ForConditionalGeneration::load(vb, &t5_config)?;

        Ok(Self {
            model,
            tokenizer,
            device,
            logits_processor: LogitsProcessor::new(GREEDY_SEED, None, None),
            config,
            decoder_start_token: t5_config
                .decoder_start_token_id
                .unwrap_or(t5_config.pad_token_id) as u32,
            eos_token: t5_config.eos_token_id as u32,
            use_cache: t5_config.use_cache,
        })
    }

    pub fn summarize(&mut self, text: &str, length: SummaryLength) -> Result<String> {
        self.model.clear_kv_cache();

        let prompt = format!("{}{}", self.config.prefix, text);
        let mut tokens = self
            .tokenizer
            .encode(prompt, true)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();
        if tokens.len() > self.config.max_input_tokens {
            tokens.truncate(self.config.max_input_tokens.saturating_sub(1));
            tokens.push(self.eos_token);
        }
        let input_ids = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let encoder_output = self.model.encode(&input_ids)?;

        let mut output_tokens = vec![self.decoder_start_token];
        for index in 0..length.max_length {
            let decoder_input = if index == 0 || !self.use_cache {
                Tensor::new(output_tokens.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                let last_token = output_tokens[output_tokens.len() - 1];
                Tensor::new(&[last_token], &self.device)?.unsqueeze(0)?
            };
            let logits = self
                .model
                .decode(&decoder_input, &encoder_output)?
                .squeeze(0)?
                .to_dtype(DType::F32)?;

            let mut logits = logits.to_vec1::<f32>()?;
            constrain_logits(
                &mut logits,
                &output_tokens[1..],
                self.eos_token,
                length.min_length,
                self.config.no_repeat_ngram_size,
            );
            let logits = Tensor::new(logits.as_slice(), &self.device)?;

            let next_token = self.logits_processor.sample(&logits)?;
            if next_token == self.eos_token {
                break;
            }
            output_tokens.push(next_token);
        }

        let summary = self
            .tokenizer
            .decode(&output_tokens[1..], true)
            .map_err(E::msg)?;
        Ok(summary.trim().to_string())
    }
}

/// Applies the length and repetition rules to the next-token logits.
pub fn constrain_logits(
    logits: &mut [f32],
    generated: &[u32],
    eos_token: u32,
    min_length: usize,
    no_repeat_ngram_size: usize,
) {
    if generated.len() < min_length {
        if let Some(logit) = logits.get_mut(eos_token as usize) {
            *logit = f32::NEG_INFINITY;
        }
    }
    for token in banned_ngram_tokens(generated, no_repeat_ngram_size) {
        if let Some(logit) = logits.get_mut(token as usize) {
            *logit = f32::NEG_INFINITY;
        }
    }
}

/// Tokens that would complete an n-gram already present in `generated`.
pub fn banned_ngram_tokens(generated: &[u32], ngram_size: usize) -> Vec<u32> {
    if ngram_size == 0 || generated.len() + 1 < ngram_size {
        return vec![];
    }
    let prefix = &generated[generated.len() + 1 - ngram_size..];
    generated
        .windows(ngram_size)
        .filter(|ngram| &ngram[..ngram_size - 1] == prefix)
        .map(|ngram| ngram[ngram_size - 1])
        .collect()
}
