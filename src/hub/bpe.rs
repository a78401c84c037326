use std::path::Path;

use tokenizers::Tokenizer;

/// Converts raw text into space-separated subword units and back
pub trait Bpe: Send + Sync {
    /// Split a sentence into subword units joined by single spaces
    fn encode(&self, sentence: &str) -> anyhow::Result<String>;

    /// Join subword units back into text
    fn decode(&self, bpe: &str) -> anyhow::Result<String>;
}

/// Treats every whitespace-separated word as one unit. Used when a checkpoint ships no tokenizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceBpe;

impl Bpe for WhitespaceBpe {
    fn encode(&self, sentence: &str) -> anyhow::Result<String> {
        Ok(sentence.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn decode(&self, bpe: &str) -> anyhow::Result<String> {
        self.encode(bpe)
    }
}

/// A Hugging Face `tokenizer.json` model
pub struct TokenizerBpe {
    tokenizer: Tokenizer,
}

impl TokenizerBpe {
    /// Wrap an already built tokenizer
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Load a `tokenizer.json` file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let tokenizer = Tokenizer::from_file(path.as_ref())
            .map_err(|e| anyhow!("Unable to load tokenizer: {}", e))?;

        Ok(Self::new(tokenizer))
    }
}

impl Bpe for TokenizerBpe {
    fn encode(&self, sentence: &str) -> anyhow::Result<String> {
        let encoding = self
            .tokenizer
            .encode(sentence, false)
            .map_err(|e| anyhow!("Unable to tokenize {:?}: {}", sentence, e))?;

        Ok(encoding.get_tokens().join(" "))
    }

    fn decode(&self, bpe: &str) -> anyhow::Result<String> {
        let ids = bpe
            .split_whitespace()
            .filter_map(|token| self.tokenizer.token_to_id(token))
            .collect::<Vec<_>>();

        self.tokenizer
            .decode(&ids, true)
            .map_err(|e| anyhow!("Unable to decode {:?}: {}", bpe, e))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn whitespace_bpe_normalizes_spacing() {
        let bpe = WhitespaceBpe;

        assert_eq!(bpe.encode("  나는   학교에 간다 ").unwrap(), "나는 학교에 간다");
        assert_eq!(bpe.decode("나는 학교에").unwrap(), "나는 학교에");
    }
}
