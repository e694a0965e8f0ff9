//! Word frequencies for word clouds and keyword labels.

use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid URL regex"));

static TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,2}:\d{2}(:\d{2})?").expect("valid timestamp regex"));

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x{1F600}-\x{1F64F}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F1E0}-\x{1F1FF}\x{2600}-\x{26FF}\x{2700}-\x{27BF}]",
    )
    .expect("valid emoji regex")
});

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_\s'-]").expect("valid non-word regex"));

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "was", "are", "were", "been", "be", "have", "has", "had", "do",
        "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can",
        "need", "dare", "ought", "used", "it", "its", "this", "that", "these", "those", "i",
        "you", "he", "she", "we", "they", "me", "him", "her", "us", "them", "my", "your", "his",
        "our", "their", "mine", "yours", "hers", "ours", "theirs", "what", "which", "who",
        "whom", "whose", "where", "when", "why", "how", "all", "each", "every", "both", "few",
        "more", "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so",
        "than", "too", "very", "just", "also", "now", "here", "there", "then", "once", "if",
        "about", "after", "before", "above", "below", "up", "down", "out", "off", "over",
        "under", "again", "further", "am", "any", "because", "being", "between", "during",
        "having", "into", "through", "until", "while",
        // comment filler
        "video", "song", "like", "im", "dont", "cant", "got", "get", "one", "really", "still",
        "even", "much", "back", "go", "come", "make", "know", "think", "see", "way", "well",
        "thing", "say", "want", "give", "take", "good", "first", "new", "time", "year", "day",
        "man", "people", "going",
    ]
    .into_iter()
    .collect()
});

/// A word and how many times it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordFrequency {
    pub text: String,
    pub value: usize,
}

/// Counts content words across a set of comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordCounter {
    /// Words seen fewer times are dropped.
    pub min_count: usize,
    /// Maximum number of words returned.
    pub limit: usize,
}

impl Default for WordCounter {
    fn default() -> Self {
        Self {
            min_count: 2,
            limit: 100,
        }
    }
}

impl WordCounter {
    #[must_use]
    pub fn with_min_count(mut self, min_count: usize) -> Self {
        self.min_count = min_count;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Most frequent words, highest count first, ties alphabetical.
    pub fn count<I, S>(&self, texts: I) -> Vec<WordFrequency>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for text in texts {
            for word in tokenize(text.as_ref()) {
                *counts.entry(word).or_default() += 1;
            }
        }

        let mut frequencies: Vec<WordFrequency> = counts
            .into_iter()
            .filter(|(_, value)| *value >= self.min_count)
            .map(|(text, value)| WordFrequency { text, value })
            .collect();
        frequencies.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.text.cmp(&b.text)));
        frequencies.truncate(self.limit);
        frequencies
    }
}

/// Word frequencies with the default word-cloud settings.
pub fn word_frequencies<I, S>(texts: I) -> Vec<WordFrequency>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    WordCounter::default().count(texts)
}

fn clean_text(text: &str) -> String {
    let decoded = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let without_urls = URL.replace_all(&decoded, "");
    let without_timestamps = TIMESTAMP.replace_all(&without_urls, "");
    let without_emoji = EMOJI.replace_all(&without_timestamps, "");
    let words_only = NON_WORD.replace_all(&without_emoji, " ");

    words_only
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    clean_text(text)
        .split(' ')
        .filter(|word| word.chars().count() > 2)
        .filter(|word| !STOP_WORDS.contains(word))
        .filter(|word| !word.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}
