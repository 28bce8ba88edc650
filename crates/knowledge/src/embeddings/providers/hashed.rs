//! Offline embedding from hashed character trigrams and whole words.

use crate::embeddings::EmbeddingProvider;
use cyclecare_core::AppResult;
use std::collections::BTreeMap;
use unicode_segmentation::UnicodeSegmentation;

const STOP_WORDS: [&str; 37] = [
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "can", "may", "not", "you", "your",
];

/// Deterministic, content-dependent vectors without any external service.
///
/// Each token contributes its character trigrams (weighted by the square root
/// of its frequency) and a whole-token bucket (weighted by frequency); the
/// result is L2-normalised. Words shorter than three characters and common
/// stop words are ignored, except CJK ideographs, which count individually.
/// Not semantic, but stable and good at lexical overlap.
#[derive(Debug)]
pub struct HashedProvider {
    dimensions: usize,
}

impl HashedProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, bytes: &[u8], multiplier: u64) -> usize {
        let hash = bytes
            .iter()
            .fold(0u64, |acc, &b| acc.wrapping_mul(multiplier).wrapping_add(b as u64));
        (hash % self.dimensions as u64) as usize
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];
        let lower = text.to_lowercase();

        // Ordered map keeps float accumulation order, and thus output, stable.
        let mut word_freq: BTreeMap<&str, u32> = BTreeMap::new();
        for word in lower.unicode_words() {
            if is_indexable(word) {
                *word_freq.entry(word).or_insert(0) += 1;
            }
        }

        for (word, freq) in &word_freq {
            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                let idx = self.bucket(trigram.as_bytes(), 37);
                embedding[idx] += (*freq as f32).sqrt();
            }

            let idx = self.bucket(word.as_bytes(), 31);
            embedding[idx] += *freq as f32;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut embedding {
                *v /= norm;
            }
        }

        embedding
    }
}

fn is_indexable(word: &str) -> bool {
    if STOP_WORDS.contains(&word) {
        return false;
    }
    word.chars().count() > 2 || word.chars().any(is_cjk)
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF)
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashedProvider {
    fn provider_name(&self) -> &str {
        "hashed"
    }

    fn model_name(&self) -> &str {
        "trigram-hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_unit_length() {
        let provider = HashedProvider::new(384);
        let embedding = provider.embed("Menstrual cycles average 28 days.").await.unwrap();
        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_deterministic() {
        let provider = HashedProvider::new(384);
        let text = "Irregular periods may indicate hormonal imbalance.";
        assert_eq!(
            provider.embed(text).await.unwrap(),
            provider.embed(text).await.unwrap()
        );
        assert_eq!(
            HashedProvider::new(384).embed(text).await.unwrap(),
            provider.embed(text).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_lexical_overlap_ranks_higher() {
        let provider = HashedProvider::new(384);
        let query = provider.embed("What is a normal cycle length?").await.unwrap();
        let cycles = provider.embed("Menstrual cycles average 28 days.").await.unwrap();
        let hormones = provider
            .embed("Irregular periods may indicate hormonal imbalance.")
            .await
            .unwrap();
        assert!(cosine(&query, &cycles) > cosine(&query, &hormones));
    }

    #[tokio::test]
    async fn test_stop_words_only_is_zero() {
        let provider = HashedProvider::new(64);
        let embedding = provider.embed("it is at the").await.unwrap();
        assert!(embedding.iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_cjk_text_is_embedded() {
        let provider = HashedProvider::new(128);
        let embedding = provider.embed("經期不規律").await.unwrap();
        assert!(embedding.iter().any(|&x| x != 0.0));
    }

    #[tokio::test]
    async fn test_punctuation_ignored() {
        let provider = HashedProvider::new(128);
        assert_eq!(
            provider.embed("cycle length").await.unwrap(),
            provider.embed("Cycle, length!").await.unwrap()
        );
    }
}
