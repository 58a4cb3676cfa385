//! Profanity filtering for relayed chat messages
//!
//! The relay only needs a predicate and a censor. Any word detector can be
//! plugged in through [`ProfanityFilter`]; [`WordListFilter`] is the
//! built-in one.

use std::collections::HashSet;

pub trait ProfanityFilter: Send + Sync {
    fn is_profane(&self, text: &str) -> bool;

    /// Return `text` with every profane word masked
    fn censor(&self, text: &str) -> String;
}

const DEFAULT_WORDS: &[&str] = &[
    "arse", "arsehole", "ass", "asshole", "bastard", "bitch", "bollocks", "bullshit", "cock",
    "crap", "cunt", "damn", "dick", "dickhead", "fuck", "fucker", "fucking", "motherfucker",
    "piss", "prick", "shit", "shitty", "slut", "twat", "wanker", "whore",
];

/// Whole-word, case-insensitive matcher over a fixed word list
///
/// Matching whole words keeps innocent words such as "class" or "passage"
/// untouched.
#[derive(Debug, Clone)]
pub struct WordListFilter {
    words: HashSet<String>,
}

impl Default for WordListFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS.iter().copied())
    }
}

impl WordListFilter {
    pub fn new<'a>(words: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            words: words.into_iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    fn is_listed(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    /// Byte ranges of every alphabetic run in `text`
    fn words_in(text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        let mut start = None;

        for (idx, ch) in text.char_indices() {
            match (ch.is_alphabetic(), start) {
                (true, None) => start = Some(idx),
                (false, Some(s)) => {
                    spans.push((s, idx));
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push((s, text.len()));
        }

        spans
    }
}

impl ProfanityFilter for WordListFilter {
    fn is_profane(&self, text: &str) -> bool {
        Self::words_in(text)
            .into_iter()
            .any(|(s, e)| self.is_listed(&text[s..e]))
    }

    fn censor(&self, text: &str) -> String {
        let mut censored = String::with_capacity(text.len());
        let mut last = 0;

        for (s, e) in Self::words_in(text) {
            let word = &text[s..e];
            if self.is_listed(word) {
                censored.push_str(&text[last..s]);
                censored.extend(std::iter::repeat('*').take(word.chars().count()));
                last = e;
            }
        }
        censored.push_str(&text[last..]);

        censored
    }
}
