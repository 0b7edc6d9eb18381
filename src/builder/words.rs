//! Interning of setting-option labels into the two-level word table.

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::font::settings::BUILTIN_WORDS;

/// The word table of a font under construction: referenced built-in ids
/// (sorted) plus local words in first-seen order.
pub(crate) struct WordTable {
    pub builtin_refs: Vec<u8>,
    pub local_words: Vec<String>,
    /// label -> final word index (built-in references first).
    index_of: FxHashMap<String, u8>,
}

impl WordTable {
    pub fn word_index(&self, label: &str) -> Option<u8> {
        self.index_of.get(label).copied()
    }
}

/// Scans every setting's option labels and interns each distinct one,
/// preferring a built-in reference whenever the label matches the shared
/// dictionary. Unreferenced built-ins simply never enter the table.
pub(crate) fn intern<'a>(
    labels: impl Iterator<Item = &'a str>,
) -> Result<WordTable> {
    let mut builtin_refs: Vec<u8> = Vec::new();
    let mut local_words: Vec<String> = Vec::new();
    let mut seen: FxHashMap<&str, ()> = FxHashMap::default();
    for label in labels {
        if seen.insert(label, ()).is_some() {
            continue;
        }
        match BUILTIN_WORDS.iter().position(|&word| word == label) {
            Some(id) => {
                let id = id as u8;
                if let Err(at) = builtin_refs.binary_search(&id) {
                    builtin_refs.insert(at, id);
                }
            }
            None => local_words.push(label.to_string()),
        }
        if builtin_refs.len() + local_words.len() > 255 {
            return Err(Error::LimitExceeded("font words"));
        }
    }

    let mut index_of = FxHashMap::default();
    for (nth, &id) in builtin_refs.iter().enumerate() {
        index_of.insert(BUILTIN_WORDS[id as usize].to_string(), nth as u8);
    }
    let builtin_count = builtin_refs.len() as u8;
    for (nth, word) in local_words.iter().enumerate() {
        index_of.insert(word.clone(), builtin_count + nth as u8);
    }
    Ok(WordTable { builtin_refs, local_words, index_of })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_preferred_and_sorted() {
        let labels = ["round", "jagged-edge", "off", "round", "pixely"];
        let table = intern(labels.into_iter()).unwrap();
        // "off" (id 0) sorts before "round" (id 40)
        assert_eq!(table.builtin_refs, vec![0, 40]);
        assert_eq!(table.local_words, vec!["jagged-edge", "pixely"]);
        assert_eq!(table.word_index("off"), Some(0));
        assert_eq!(table.word_index("round"), Some(1));
        assert_eq!(table.word_index("jagged-edge"), Some(2));
        assert_eq!(table.word_index("pixely"), Some(3));
        assert_eq!(table.word_index("missing"), None);
    }
}
