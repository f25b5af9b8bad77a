//! Graph-ranked extractive summarizer.
//!
//! ## Pipeline
//! 1. Normalize whitespace and strip symbols outside letters, digits and basic punctuation.
//! 2. Split into sentences, protecting single-letter initials (`J. Smith`).
//! 3. Build TF-IDF vectors per sentence and connect sentences whose cosine similarity exceeds the threshold.
//! 4. Rank sentences with PageRank and keep the top `max(1, n * ratio)` in source order.

use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use super::Summarizer;
use super::sentences::split_sentences;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{L}\p{N}\s.,!?;:\-]").unwrap());
static INITIAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\s\p{Lu})\.").unwrap());
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").unwrap());

const DOT_PLACEHOLDER: &str = "\u{2024}";

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "may", "who", "did", "get", "she",
    "too", "use", "that", "with", "have", "this", "will", "your", "from", "they", "been", "than",
    "them", "then", "were", "what", "when", "which", "while", "would", "there", "their", "these",
    "those", "into", "also", "more", "most", "some", "such", "only", "other", "over", "very",
    "just", "about", "after", "before", "because", "could", "should", "being", "each", "where",
    "does", "here", "both", "between", "through", "under", "again",
];

#[derive(Debug, Clone)]
pub struct TextRankSummarizer {
    pub similarity_threshold: f32,
    pub damping: f32,
    pub max_iterations: usize,
    pub tolerance: f32,
    stop_words: HashSet<&'static str>,
}

impl Default for TextRankSummarizer {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.1,
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-4,
            stop_words: STOP_WORDS.iter().copied().collect(),
        }
    }
}

impl TextRankSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn preprocess(text: &str) -> String {
        let text = WHITESPACE.replace_all(text, " ");
        let text = DISALLOWED.replace_all(&text, " ");
        WHITESPACE.replace_all(&text, " ").trim().to_string()
    }

    fn sentences(normalized: &str) -> Vec<String> {
        let protected = INITIAL.replace_all(normalized, format!("${{1}}{DOT_PLACEHOLDER}"));
        split_sentences(&protected)
            .into_iter()
            .map(|s| s.replace(DOT_PLACEHOLDER, "."))
            .collect()
    }

    fn tokenize(&self, sentence: &str) -> Vec<String> {
        NON_WORD
            .split(sentence)
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .filter(|w| w.chars().count() > 2 && !self.stop_words.contains(w.as_str()))
            .collect()
    }

    fn tf_idf(tokenized: &[Vec<String>]) -> Vec<BTreeMap<&str, f32>> {
        let n = tokenized.len() as f32;
        let mut document_frequency: HashMap<&str, usize> = HashMap::new();
        for sentence in tokenized {
            let unique: HashSet<&str> = sentence.iter().map(String::as_str).collect();
            for word in unique {
                *document_frequency.entry(word).or_insert(0) += 1;
            }
        }

        tokenized
            .iter()
            .map(|sentence| {
                let mut tf: BTreeMap<&str, f32> = BTreeMap::new();
                for word in sentence {
                    *tf.entry(word.as_str()).or_insert(0.0) += 1.0;
                }
                for (word, weight) in tf.iter_mut() {
                    let df = document_frequency.get(word).copied().unwrap_or(1) as f32;
                    let idf = ((n + 1.0) / (df + 1.0)).ln() + 1.0;
                    *weight *= idf;
                }
                tf
            })
            .collect()
    }

    fn cosine(a: &BTreeMap<&str, f32>, b: &BTreeMap<&str, f32>) -> f32 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let dot: f32 = a
            .iter()
            .filter_map(|(word, wa)| b.get(word).map(|wb| wa * wb))
            .sum();
        let norm_a: f32 = a.values().map(|w| w * w).sum::<f32>().sqrt();
        let norm_b: f32 = b.values().map(|w| w * w).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// Row-major similarity matrix with a zeroed diagonal.
    fn similarity_matrix(&self, tokenized: &[Vec<String>]) -> Vec<f32> {
        let n = tokenized.len();
        let vectors = Self::tf_idf(tokenized);
        let mut matrix = vec![0.0f32; n * n];

        for i in 0..n {
            for j in (i + 1)..n {
                let similarity = Self::cosine(&vectors[i], &vectors[j]);
                if similarity > self.similarity_threshold {
                    matrix[i * n + j] = similarity;
                    matrix[j * n + i] = similarity;
                }
            }
        }

        matrix
    }

    fn rank(&self, matrix: &[f32], n: usize) -> Vec<f32> {
        let out_sums: Vec<f32> = (0..n)
            .map(|j| matrix[j * n..(j + 1) * n].iter().sum())
            .collect();

        let mut scores = vec![1.0 / n as f32; n];

        for _ in 0..self.max_iterations {
            let mut next = vec![0.0f32; n];
            let mut max_delta = 0.0f32;

            for (i, slot) in next.iter_mut().enumerate() {
                let mut sum = 0.0f32;
                for j in 0..n {
                    let edge = matrix[j * n + i];
                    if edge > 0.0 && out_sums[j] > 0.0 {
                        sum += scores[j] * edge / out_sums[j];
                    }
                }
                *slot = (1.0 - self.damping) + self.damping * sum;
                max_delta = max_delta.max((*slot - scores[i]).abs());
            }

            scores = next;
            if max_delta < self.tolerance {
                break;
            }
        }

        let total: f32 = scores.iter().sum();
        if total > 0.0 {
            scores.iter_mut().for_each(|s| *s /= total);
        }
        scores
    }
}

impl Summarizer for TextRankSummarizer {
    fn summarize(&self, text: &str, ratio: f32) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        let normalized = Self::preprocess(text);
        let sentences = Self::sentences(&normalized);
        if sentences.len() <= 1 {
            return text.to_string();
        }

        let tokenized: Vec<Vec<String>> = sentences.iter().map(|s| self.tokenize(s)).collect();
        let n = sentences.len();
        let matrix = self.similarity_matrix(&tokenized);
        let scores = self.rank(&matrix, n);

        let target = ((n as f32 * ratio) as usize).clamp(1, n);

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
        let mut keep: Vec<usize> = order.into_iter().take(target).collect();
        keep.sort_unstable();

        tracing::debug!("TextRank kept {}/{} sentences", keep.len(), n);

        keep.iter()
            .map(|&i| sentences[i].as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
