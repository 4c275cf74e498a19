use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use rayon::prelude::*;

/// Maps text into a fixed-length vector. Implementations must be a pure
/// function of their model and the input text.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts at once, one vector per input in the same order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Like [`embed`](Self::embed), but give up once `deadline` passes.
    /// Providers that cannot be interrupted ignore the deadline.
    fn embed_until(&self, text: &str, _deadline: Option<Instant>) -> Result<Vec<f32>> {
        self.embed(text)
    }

    fn embed_batch_until(
        &self,
        texts: &[String],
        _deadline: Option<Instant>,
    ) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts)
    }
}

impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn embed_until(&self, text: &str, deadline: Option<Instant>) -> Result<Vec<f32>> {
        (**self).embed_until(text, deadline)
    }

    fn embed_batch_until(
        &self,
        texts: &[String],
        deadline: Option<Instant>,
    ) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch_until(texts, deadline)
    }
}

impl<P: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<P> {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn embed_until(&self, text: &str, deadline: Option<Instant>) -> Result<Vec<f32>> {
        (**self).embed_until(text, deadline)
    }

    fn embed_batch_until(
        &self,
        texts: &[String],
        deadline: Option<Instant>,
    ) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch_until(texts, deadline)
    }
}

/// Bag-of-tokens hashing embedder. Needs no model files, so it backs the CLI
/// when no weights are configured and keeps tests deterministic.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dim: 384 }
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dim];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            // FNV-1a
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            v[(h as usize) % self.dim] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }

        Ok(v)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.par_iter().map(|t| self.embed(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::cosine_similarity;

    #[test]
    fn hash_embedding_is_deterministic_and_normalized() {
        let p = HashEmbeddingProvider::new(64);
        let a = p.embed("What are your hours?").unwrap();
        let b = p.embed("what ARE your hours").unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let v = HashEmbeddingProvider::default().embed("!!!").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn batch_preserves_input_order() {
        let p = HashEmbeddingProvider::new(128);
        let texts = vec!["refund policy".to_string(), "opening hours".to_string()];
        let batch = p.embed_batch(&texts).unwrap();
        assert_eq!(batch.len(), 2);
        assert!((cosine_similarity(&batch[1], &p.embed("opening hours").unwrap()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn minimum_dimension_is_enforced() {
        assert_eq!(HashEmbeddingProvider::new(2).dim(), 8);
    }
}
