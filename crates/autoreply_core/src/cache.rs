use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use tracing::debug;

use crate::model::GuildId;

pub type QuestionEmbeddings = Arc<Vec<Vec<f32>>>;

struct CachedQuestions {
    questions: Vec<String>,
    embeddings: QuestionEmbeddings,
}

type Slot = Arc<Mutex<Option<CachedQuestions>>>;

/// Question embeddings per guild.
///
/// Each guild gets its own slot lock, held while embeddings are computed, so
/// concurrent lookups for one guild wait for a single computation while other
/// guilds are unaffected. A cached entry is only reused when the question list
/// is identical to the one it was built from.
#[derive(Default)]
pub struct QuestionEmbeddingCache {
    slots: Mutex<HashMap<GuildId, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QuestionEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute<F>(
        &self,
        guild: GuildId,
        questions: &[String],
        compute: F,
    ) -> Result<QuestionEmbeddings>
    where
        F: FnOnce(&[String]) -> Result<Vec<Vec<f32>>>,
    {
        let slot = self.slot(guild);
        let mut cached = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = cached.as_ref() {
            if entry.questions == questions {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.embeddings.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(guild, questions = questions.len(), "embedding guild questions");
        let embeddings: QuestionEmbeddings = Arc::new(compute(questions)?);
        *cached = Some(CachedQuestions {
            questions: questions.to_vec(),
            embeddings: embeddings.clone(),
        });
        Ok(embeddings)
    }

    pub fn invalidate(&self, guild: GuildId) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.remove(&guild).is_some() {
            debug!(guild, "question embeddings invalidated");
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    fn slot(&self, guild: GuildId) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(guild).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn qs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reuses_embeddings_for_same_questions() {
        let cache = QuestionEmbeddingCache::new();
        let calls = AtomicUsize::new(0);
        let compute = |q: &[String]| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![vec![1.0]; q.len()])
        };

        cache.get_or_compute(1, &qs(&["a", "b"]), compute).unwrap();
        cache.get_or_compute(1, &qs(&["a", "b"]), compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((cache.hits(), cache.misses()), (1, 1));

        cache.get_or_compute(1, &qs(&["a", "b", "c"]), compute).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let cache = QuestionEmbeddingCache::new();
        let compute = |q: &[String]| Ok(vec![vec![0.5]; q.len()]);
        cache.get_or_compute(3, &qs(&["a"]), compute).unwrap();
        cache.invalidate(3);
        cache.get_or_compute(3, &qs(&["a"]), compute).unwrap();
        assert_eq!(cache.misses(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = QuestionEmbeddingCache::new();
        let failed = cache.get_or_compute(1, &qs(&["a"]), |_| anyhow::bail!("backend down"));
        assert!(failed.is_err());
        let ok = cache
            .get_or_compute(1, &qs(&["a"]), |q| Ok(vec![vec![1.0]; q.len()]))
            .unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn concurrent_lookups_compute_once_per_guild() {
        let cache = Arc::new(QuestionEmbeddingCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    cache
                        .get_or_compute(11, &qs(&["hours?"]), |q| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(vec![vec![1.0]; q.len()])
                        })
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
