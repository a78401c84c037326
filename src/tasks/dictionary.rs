use std::{collections::HashMap, path::Path};

use crate::{
    error::{Error, Result},
    utils::files::read_file,
};

/// Beginning-of-sentence marker
pub static BOS: &str = "<s>";

/// Padding marker
pub static PAD: &str = "<pad>";

/// End-of-sentence marker, also used as the separator between sentences
pub static EOS: &str = "</s>";

/// Unknown-token marker
pub static UNK: &str = "<unk>";

/// Flag allowing a dictionary file to redefine an existing symbol
static OVERWRITE_FLAG: &str = "#fairseq:overwrite";

/// A bijective mapping between symbols and integer ids.
///
/// The special symbols `<s>`, `<pad>`, `</s>` and `<unk>` always occupy the lowest ids, in that
/// order, so regular entries start at [`Dictionary::nspecial`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    symbols: Vec<String>,
    counts: Vec<usize>,
    indices: HashMap<String, usize>,
    nspecial: usize,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    /// Create a dictionary containing only the special symbols
    pub fn new() -> Self {
        let mut dictionary = Self {
            symbols: Vec::new(),
            counts: Vec::new(),
            indices: HashMap::new(),
            nspecial: 0,
        };

        for special in [BOS, PAD, EOS, UNK] {
            dictionary.add_symbol(special, 1);
        }
        dictionary.nspecial = dictionary.symbols.len();

        dictionary
    }

    /// Create a dictionary from a list of regular symbols, in id order
    pub fn from_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dictionary = Self::new();
        for symbol in symbols {
            dictionary.add_symbol(symbol.as_ref(), 1);
        }

        dictionary
    }

    /// Add a symbol (or bump its count) and return its id
    pub fn add_symbol(&mut self, word: &str, n: usize) -> usize {
        if let Some(&index) = self.indices.get(word) {
            self.counts[index] += n;
            return index;
        }

        let index = self.symbols.len();
        self.indices.insert(word.to_string(), index);
        self.symbols.push(word.to_string());
        self.counts.push(n);

        index
    }

    /// Number of symbols, specials included
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// A dictionary always holds its specials, so it is never empty
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Number of reserved special ids in front of the regular entries
    pub fn nspecial(&self) -> usize {
        self.nspecial
    }

    /// Number of regular (non-special) entries
    pub fn num_classes(&self) -> usize {
        self.len() - self.nspecial
    }

    /// Id of `<s>`
    pub fn bos(&self) -> usize {
        self.indices[BOS]
    }

    /// Id of `<pad>`
    pub fn pad(&self) -> usize {
        self.indices[PAD]
    }

    /// Id of `</s>`
    pub fn eos(&self) -> usize {
        self.indices[EOS]
    }

    /// Id of `<unk>`
    pub fn unk(&self) -> usize {
        self.indices[UNK]
    }

    /// Whether the id is one of the reserved specials
    pub fn is_special(&self, id: usize) -> bool {
        id < self.nspecial
    }

    /// Look up a symbol without growing the dictionary
    pub fn encode(&self, token: &str) -> Result<usize> {
        self.indices
            .get(token)
            .copied()
            .ok_or_else(|| Error::UnknownToken(token.to_string()))
    }

    /// Look up a symbol, falling back to `<unk>`
    pub fn index(&self, token: &str) -> usize {
        self.indices
            .get(token)
            .copied()
            .unwrap_or_else(|| self.unk())
    }

    /// The symbol for an id, or `<unk>` for ids out of range
    pub fn symbol(&self, id: usize) -> &str {
        self.symbols.get(id).map(String::as_str).unwrap_or(UNK)
    }

    /// Split a line on whitespace and map every token to its id. Never grows the dictionary.
    pub fn encode_line(&self, line: &str, append_eos: bool) -> Vec<usize> {
        let mut ids: Vec<usize> = line.split_whitespace().map(|t| self.index(t)).collect();

        if append_eos {
            ids.push(self.eos());
        }

        ids
    }

    /// Render ids back into whitespace-joined symbols
    pub fn string(&self, ids: &[usize], skip_specials: bool) -> String {
        ids.iter()
            .filter(|&&id| !(skip_specials && self.is_special(id)))
            .map(|&id| self.symbol(id))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Decode a class index predicted over the regular entries only
    pub fn decode_class(&self, class: usize) -> String {
        self.string(&[class + self.nspecial], false)
    }

    /// Parse the `<symbol> <count> [#fairseq:overwrite]` line format
    pub fn parse(lines: &[String]) -> Result<Self> {
        let mut dictionary = Self::new();

        for (number, line) in lines.iter().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let format_error = |reason: &str| Error::DictionaryFormat {
                line: number + 1,
                reason: reason.to_string(),
            };

            let (mut rest, mut field) = line
                .rsplit_once(' ')
                .ok_or_else(|| format_error("expected '<token> <cnt> [flags]'"))?;

            let overwrite = field == OVERWRITE_FLAG;
            if overwrite {
                (rest, field) = rest
                    .rsplit_once(' ')
                    .ok_or_else(|| format_error("expected '<token> <cnt> [flags]'"))?;
            }

            let count = field
                .parse::<usize>()
                .map_err(|_| format_error("count is not an integer"))?;

            if dictionary.indices.contains_key(rest) && !overwrite {
                return Err(format_error(&format!("duplicate word {rest:?}")));
            }

            if overwrite {
                // Redefinitions keep the original id but take the new count
                if let Some(&index) = dictionary.indices.get(rest) {
                    dictionary.counts[index] = count;
                    continue;
                }
            }

            dictionary.add_symbol(rest, count);
        }

        Ok(dictionary)
    }

    /// Load a dictionary file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let lines = read_file(path).await?;

        Self::parse(&lines)
    }

    /// Render the regular entries in the file format accepted by [`Dictionary::parse`]
    pub fn to_lines(&self) -> Vec<String> {
        self.symbols
            .iter()
            .zip(self.counts.iter())
            .skip(self.nspecial)
            .map(|(symbol, count)| format!("{symbol} {count}"))
            .collect()
    }

    /// Save the regular entries to a dictionary file
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut contents = self.to_lines().join("\n");
        contents.push('\n');

        tokio::fs::write(path, contents).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn pos_tags() -> Dictionary {
        Dictionary::from_symbols(["NNG", "JKS", "VV", "EF"])
    }

    #[test]
    fn reserves_specials_first() {
        let dictionary = pos_tags();

        assert_eq!(dictionary.bos(), 0);
        assert_eq!(dictionary.pad(), 1);
        assert_eq!(dictionary.eos(), 2);
        assert_eq!(dictionary.unk(), 3);
        assert_eq!(dictionary.nspecial(), 4);
        assert_eq!(dictionary.encode("NNG").unwrap(), 4);
        assert_eq!(dictionary.num_classes(), 4);
    }

    #[test]
    fn round_trips_every_regular_token() {
        let dictionary = pos_tags();

        for token in ["NNG", "JKS", "VV", "EF"] {
            let id = dictionary.encode(token).unwrap();
            assert_eq!(dictionary.string(&[id], false), token);
        }
    }

    #[test]
    fn encode_fails_for_unknown_tokens() {
        let dictionary = pos_tags();

        let err = dictionary.encode("XSN").unwrap_err();
        assert!(matches!(err, Error::UnknownToken(token) if token == "XSN"));
        assert_eq!(dictionary.index("XSN"), dictionary.unk());
        assert_eq!(dictionary.len(), 8);
    }

    #[test]
    fn encode_line_never_grows() {
        let dictionary = pos_tags();

        let ids = dictionary.encode_line("<s> NNG XSN </s>", true);

        assert_eq!(ids, vec![0, 4, 3, 2, 2]);
        assert_eq!(dictionary.len(), 8);
    }

    #[test]
    fn string_skips_specials_on_request() {
        let dictionary = pos_tags();

        assert_eq!(dictionary.string(&[0, 4, 5, 2], false), "<s> NNG JKS </s>");
        assert_eq!(dictionary.string(&[0, 4, 5, 2], true), "NNG JKS");
    }

    #[test]
    fn decode_class_offsets_by_specials() {
        let dictionary = pos_tags();

        assert_eq!(dictionary.decode_class(0), "NNG");
        assert_eq!(dictionary.decode_class(3), "EF");

        for (class, label) in dictionary.to_lines().iter().enumerate() {
            let decoded = dictionary.decode_class(class);
            assert_eq!(label.split_whitespace().next(), Some(decoded.as_str()));
        }
    }

    #[test]
    fn parses_counts_and_overwrites() {
        let lines = vec![
            "NNG 120".to_string(),
            "VV 33".to_string(),
            "NNG 7 #fairseq:overwrite".to_string(),
        ];

        let dictionary = Dictionary::parse(&lines).unwrap();

        assert_eq!(dictionary.encode("NNG").unwrap(), 4);
        assert_eq!(dictionary.to_lines(), vec!["NNG 7", "VV 33"]);
    }

    #[test]
    fn rejects_duplicates_and_bad_counts() {
        let duplicate = vec!["NNG 1".to_string(), "NNG 2".to_string()];
        let bad_count = vec!["NNG many".to_string()];

        assert!(matches!(
            Dictionary::parse(&duplicate),
            Err(Error::DictionaryFormat { line: 2, .. })
        ));
        assert!(matches!(
            Dictionary::parse(&bad_count),
            Err(Error::DictionaryFormat { line: 1, .. })
        ));
    }
}
