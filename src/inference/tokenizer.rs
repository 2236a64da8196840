use std::path::Path;

use anyhow::{anyhow, Error as E, Result};
use hf_hub::api::sync::ApiRepo;
use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::processors::bert::BertProcessing;
use tokenizers::{
    ModelWrapper, NormalizerWrapper, PostProcessorWrapper, PreTokenizerWrapper, Tokenizer,
};
use tracing::info;

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
const UNK_TOKEN: &str = "[UNK]";

/// Fetches `tokenizer.json` from the repository, BERT checkpoints that only publish a
/// `vocab.txt` get a WordPiece tokenizer built from it.
#[tracing::instrument(level = "info", skip(repo))]
pub fn load_bert_tokenizer(repo: &ApiRepo, lowercase: bool) -> Result<Tokenizer> {
    if let Ok(tokenizer_file) = repo.get("tokenizer.json") {
        return Tokenizer::from_file(tokenizer_file).map_err(E::msg);
    }
    info!("No tokenizer.json in repository, building WordPiece tokenizer from vocab.txt");
    let vocab_file = repo.get("vocab.txt")?;
    bert_tokenizer_from_vocab(&vocab_file, lowercase)
}

pub fn bert_tokenizer_from_vocab(vocab_file: &Path, lowercase: bool) -> Result<Tokenizer> {
    let vocab_file = vocab_file
        .to_str()
        .ok_or_else(|| anyhow!("Vocabulary path is not valid UTF-8"))?;
    let wordpiece = WordPiece::from_file(vocab_file)
        .unk_token(UNK_TOKEN.into())
        .build()
        .map_err(E::msg)?;

    let mut tokenizer = Tokenizer::new(ModelWrapper::WordPiece(wordpiece));
    let cls_id = token_id(&tokenizer, CLS_TOKEN)?;
    let sep_id = token_id(&tokenizer, SEP_TOKEN)?;
    tokenizer
        .with_normalizer(NormalizerWrapper::BertNormalizer(BertNormalizer::new(
            true, true, None, lowercase,
        )))
        .with_pre_tokenizer(PreTokenizerWrapper::BertPreTokenizer(BertPreTokenizer))
        .with_post_processor(PostProcessorWrapper::Bert(BertProcessing::new(
            (SEP_TOKEN.into(), sep_id),
            (CLS_TOKEN.into(), cls_id),
        )));
    Ok(tokenizer)
}

pub fn token_id(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    match tokenizer.token_to_id(token) {
        None => Err(anyhow!("no token-id for {token}")),
        Some(id) => Ok(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VOCAB: &str = "[PAD]\n[UNK]\n[CLS]\n[SEP]\nWhat\ntreats\ndiabetes\n?\nMetformin\n.\n";

    fn tokenizer(name: &str) -> Tokenizer {
        let path = std::env::temp_dir().join(format!("medical_model_runner_{name}_vocab.txt"));
        std::fs::write(&path, VOCAB).unwrap();
        bert_tokenizer_from_vocab(&path, false).unwrap()
    }

    #[test]
    fn encodes_question_context_pairs() {
        let tokenizer = tokenizer("pairs");
        let encoding = tokenizer
            .encode(("What treats diabetes?", "Metformin treats diabetes."), true)
            .unwrap();

        assert_eq!(
            encoding.get_tokens(),
            &[
                "[CLS]", "What", "treats", "diabetes", "?", "[SEP]", "Metformin", "treats",
                "diabetes", ".", "[SEP]"
            ]
        );
        let sequence_ids = encoding.get_sequence_ids();
        assert_eq!(sequence_ids[1], Some(0));
        assert_eq!(sequence_ids[6], Some(1));
        assert_eq!(sequence_ids[10], None);
        // Context offsets are relative to the context string
        assert_eq!(encoding.get_offsets()[6], (0, 9));
        assert_eq!(encoding.get_type_ids()[6], 1);
    }

    #[test]
    fn unknown_words_map_to_unk() {
        let tokenizer = tokenizer("unk");
        let encoding = tokenizer.encode("insulin", false).unwrap();
        assert_eq!(encoding.get_tokens(), &["[UNK]"]);
    }
}
