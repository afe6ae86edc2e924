use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tokenizers::models::wordlevel::WordLevel;
use tokenizers::{PaddingDirection, PaddingParams, PaddingStrategy, Tokenizer};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_ID: u32 = 0;
pub const UNK_ID: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Vocabulary size including the pad and OOV slots.
    pub max_tokens: usize,
    pub sequence_length: usize,
    /// Characters per token when chunking bytecode.
    pub chunk_width: usize,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 10_000,
            sequence_length: 250,
            chunk_width: 2,
        }
    }
}

/// Chunks `text` into `length`-character pieces joined by single spaces.
/// A trailing remainder shorter than `length` becomes the last token.
pub fn split_text_into_chars(text: &str, length: usize) -> String {
    let length = length.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(length)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase, strip ASCII punctuation, split on whitespace.
struct Standardizer {
    punctuation: Regex,
}

impl Standardizer {
    fn new() -> Result<Self> {
        Ok(Self {
            punctuation: Regex::new(r##"[!"#$%&'()*+,\-./:;<=>?@\[\\\]^_`{|}~]"##)?,
        })
    }

    fn tokens(&self, sentence: &str) -> Vec<String> {
        let lowered = sentence.to_lowercase();
        self.punctuation
            .replace_all(&lowered, "")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Maps bytecode to fixed-length token id sequences.
///
/// The vocabulary is fitted once from the training split. Id 0 is padding
/// and id 1 stands in for any token the vocabulary has not seen.
pub struct Vectorizer {
    tokenizer: Tokenizer,
    standardizer: Standardizer,
    chunk_width: usize,
    sequence_length: usize,
}

impl Vectorizer {
    pub fn adapt<S: AsRef<str>>(config: &PreprocessingConfig, bytecodes: &[S]) -> Result<Self> {
        let standardizer = Standardizer::new()?;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for bytecode in bytecodes {
            let sentence = split_text_into_chars(bytecode.as_ref(), config.chunk_width);
            for token in standardizer.tokens(&sentence) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(config.max_tokens.saturating_sub(2));

        let mut vocab = HashMap::with_capacity(ranked.len() + 2);
        vocab.insert(PAD_TOKEN.to_string(), PAD_ID);
        vocab.insert(UNK_TOKEN.to_string(), UNK_ID);
        for (offset, (token, _)) in ranked.into_iter().enumerate() {
            vocab.insert(token, offset as u32 + 2);
        }

        let model = WordLevel::builder()
            .vocab(vocab)
            .unk_token(UNK_TOKEN.to_string())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build vocabulary: {}", e))?;

        let mut tokenizer = Tokenizer::new(model);
        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(config.sequence_length),
            direction: PaddingDirection::Right,
            pad_to_multiple_of: None,
            pad_id: PAD_ID,
            pad_type_id: 0,
            pad_token: PAD_TOKEN.to_string(),
        }));

        let vectorizer = Self {
            tokenizer,
            standardizer,
            chunk_width: config.chunk_width,
            sequence_length: config.sequence_length,
        };
        tracing::info!(
            vocab_size = vectorizer.vocab_size(),
            most_common = ?vectorizer.vocabulary().iter().take(5).collect::<Vec<_>>(),
            "fitted vocabulary"
        );

        Ok(vectorizer)
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Tokens ordered by id.
    pub fn vocabulary(&self) -> Vec<String> {
        let mut entries: Vec<(String, u32)> = self.tokenizer.get_vocab(true).into_iter().collect();
        entries.sort_by_key(|(_, id)| *id);
        entries.into_iter().map(|(token, _)| token).collect()
    }

    pub fn vectorize(&self, bytecode: &str) -> Result<Vec<u32>> {
        let sentence = split_text_into_chars(bytecode, self.chunk_width);
        let mut tokens = self.standardizer.tokens(&sentence);
        tokens.truncate(self.sequence_length);

        let encoding = self
            .tokenizer
            .encode(tokens, false)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        Ok(encoding.get_ids().to_vec())
    }

    /// Vectorizes every bytecode into one flat row-major buffer.
    pub fn vectorize_all<S: AsRef<str>>(&self, bytecodes: &[S]) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(bytecodes.len() * self.sequence_length);
        for bytecode in bytecodes {
            ids.extend(self.vectorize(bytecode.as_ref())?);
        }
        Ok(ids)
    }

    /// Writes the tokenizer and the chunk width as one JSON document.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tokenizer = self
            .tokenizer
            .to_string(false)
            .map_err(|e| anyhow::anyhow!("Failed to serialize vectorizer: {}", e))?;
        let artifact = VectorizerArtifact {
            chunk_width: self.chunk_width,
            tokenizer: serde_json::from_str(&tokenizer)?,
        };
        std::fs::write(path, serde_json::to_string_pretty(&artifact)?)
            .with_context(|| format!("failed to write vectorizer to {}", path.display()))?;

        tracing::info!(path = %path.display(), chunk_width = self.chunk_width, "saved vectorizer");
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vectorizer {}", path.display()))?;
        let artifact: VectorizerArtifact = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a saved vectorizer", path.display()))?;
        let tokenizer = Tokenizer::from_str(&artifact.tokenizer.to_string())
            .map_err(|e| anyhow::anyhow!("Failed to load vectorizer {}: {}", path.display(), e))?;

        let sequence_length = match tokenizer.get_padding().map(|p| &p.strategy) {
            Some(PaddingStrategy::Fixed(len)) => *len,
            _ => anyhow::bail!("{} has no fixed sequence length", path.display()),
        };

        Ok(Self {
            tokenizer,
            standardizer: Standardizer::new()?,
            chunk_width: artifact.chunk_width,
            sequence_length,
        })
    }

    pub fn chunk_width(&self) -> usize {
        self.chunk_width
    }
}

/// On-disk vectorizer: the tokenizer document plus the chunking it was fitted with.
#[derive(serde::Serialize, serde::Deserialize)]
struct VectorizerArtifact {
    chunk_width: usize,
    tokenizer: serde_json::Value,
}
