use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::{QuestionEmbeddingCache, QuestionEmbeddings};
use crate::chunk::ChunkConfig;
use crate::config::MatcherSettings;
use crate::embed::EmbeddingProvider;
use crate::error::MatchError;
use crate::model::{Author, DeferredAnswer, GuildId, MatchOutcome, MatchResult};
use crate::normalize::{normalize, word_count};
use crate::retrieval::{score_all, BestScore};
use crate::store::QaStore;
use crate::table::FaqTable;
use crate::timeout_embed::{EmbedTimeout, TimeoutEmbeddingProvider};

/// Matches chat messages against a guild's FAQ by embedding similarity.
///
/// The message is normalized and split into overlapping word chunks; every
/// chunk is compared with every stored question and the single best pair
/// above the threshold wins. Chunks are scored in order and questions in
/// table order, and only a strictly higher score replaces the current best,
/// so among equal scores the first one found is kept.
pub struct SimilarityMatcher<S, E> {
    store: S,
    embedder: E,
    chunking: ChunkConfig,
    cache: Option<Arc<QuestionEmbeddingCache>>,
    deferred: HashMap<String, DeferredAnswer>,
    match_timeout: Option<Duration>,
}

impl<S: QaStore> SimilarityMatcher<S, Box<dyn EmbeddingProvider>> {
    /// Build a matcher from validated settings, wrapping the provider in a
    /// timeout and attaching a fresh cache when configured.
    pub fn from_settings(
        store: S,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: &MatcherSettings,
    ) -> Self {
        let embedder: Box<dyn EmbeddingProvider> = match settings.embed_timeout {
            Some(timeout) => Box::new(TimeoutEmbeddingProvider::new(embedder, timeout)),
            None => Box::new(embedder),
        };
        let mut matcher = Self::new(store, embedder).with_chunking(settings.chunking);
        if let Some(timeout) = settings.embed_timeout {
            matcher = matcher.with_match_timeout(timeout);
        }
        if settings.cache_question_embeddings {
            matcher.with_cache(Arc::new(QuestionEmbeddingCache::new()))
        } else {
            matcher
        }
    }
}

impl<S: QaStore, E: EmbeddingProvider> SimilarityMatcher<S, E> {
    pub fn new(store: S, embedder: E) -> Self {
        Self {
            store,
            embedder,
            chunking: ChunkConfig::default(),
            cache: None,
            deferred: HashMap::new(),
            match_timeout: None,
        }
    }

    pub fn with_chunking(mut self, chunking: ChunkConfig) -> Self {
        self.chunking = chunking;
        self
    }

    pub fn with_cache(mut self, cache: Arc<QuestionEmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Bound all embedding work for one message by `timeout`, however many
    /// chunks it has.
    pub fn with_match_timeout(mut self, timeout: Duration) -> Self {
        self.match_timeout = Some(timeout);
        self
    }

    /// Answer `question` with a callback instead of its stored text, in every
    /// guild that stores that exact question.
    pub fn with_deferred_answer<F>(mut self, question: impl Into<String>, answer: F) -> Self
    where
        F: Fn(&Author) -> String + Send + Sync + 'static,
    {
        self.deferred.insert(question.into(), Arc::new(answer));
        self
    }

    pub fn cache(&self) -> Option<&Arc<QuestionEmbeddingCache>> {
        self.cache.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn find_best_match(
        &self,
        guild: GuildId,
        raw: &str,
        author: &Author,
        threshold: f32,
    ) -> MatchOutcome {
        match self.try_match(guild, raw, author, threshold) {
            Ok(Some(result)) => {
                debug!(
                    guild,
                    pair_id = result.pair_id,
                    score = result.score,
                    chunk = %result.chunk,
                    "faq match"
                );
                MatchOutcome::Hit(result)
            }
            Ok(None) => MatchOutcome::Miss,
            Err(err) => {
                warn!(guild, error = %err, "faq match unavailable");
                MatchOutcome::Unavailable(err)
            }
        }
    }

    fn try_match(
        &self,
        guild: GuildId,
        raw: &str,
        author: &Author,
        threshold: f32,
    ) -> Result<Option<MatchResult>, MatchError> {
        let pairs = self.store.get_pairs(guild)?;
        let mut table = FaqTable::from_pairs(&pairs);
        if table.is_empty() {
            debug!(guild, "no usable faq pairs");
            return Ok(None);
        }
        table.apply_deferred(&self.deferred);

        let cleaned = normalize(raw);
        if word_count(&cleaned) <= 1 {
            debug!(guild, "message too short to match");
            return Ok(None);
        }

        let deadline = self.match_timeout.map(|t| Instant::now() + t);
        let chunks = self.chunking.chunk(&cleaned);
        self.check_deadline(deadline)?;
        let question_embeddings = self.question_embeddings(guild, table.questions(), deadline)?;

        let mut best = BestScore::new(threshold);
        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            self.check_deadline(deadline)?;
            let chunk_embedding = self
                .embedder
                .embed_until(chunk, deadline)
                .map_err(provider_error)?;
            check_dimensions(&chunk_embedding, &question_embeddings)?;
            for (question_idx, score) in score_all(&chunk_embedding, &question_embeddings)
                .into_iter()
                .enumerate()
            {
                best.offer(score, (chunk_idx, question_idx));
            }
        }

        let Some((score, (chunk_idx, question_idx))) = best.best() else {
            debug!(guild, chunks = chunks.len(), "no question above threshold");
            return Ok(None);
        };
        let question = &table.questions()[question_idx];
        let Some((answer, pair_id)) = table.answer(question) else {
            return Ok(None);
        };

        Ok(Some(MatchResult {
            answer: answer.resolve(author),
            score,
            pair_id,
            question: question.clone(),
            chunk: chunks[chunk_idx].clone(),
        }))
    }

    fn check_deadline(&self, deadline: Option<Instant>) -> Result<(), MatchError> {
        match (deadline, self.match_timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                Err(MatchError::Timeout(timeout))
            }
            _ => Ok(()),
        }
    }

    fn question_embeddings(
        &self,
        guild: GuildId,
        questions: &[String],
        deadline: Option<Instant>,
    ) -> Result<QuestionEmbeddings, MatchError> {
        let compute = |qs: &[String]| -> anyhow::Result<Vec<Vec<f32>>> {
            let embeddings = self.embedder.embed_batch_until(qs, deadline)?;
            if embeddings.len() != qs.len() {
                anyhow::bail!(
                    "provider returned {} embeddings for {} questions",
                    embeddings.len(),
                    qs.len()
                );
            }
            Ok(embeddings)
        };

        let embeddings = match &self.cache {
            Some(cache) => cache.get_or_compute(guild, questions, compute),
            None => compute(questions).map(Arc::new),
        };
        embeddings.map_err(provider_error)
    }
}

/// Cosine of mismatched vectors is meaningless; treat it as a broken provider.
fn check_dimensions(chunk: &[f32], questions: &[Vec<f32>]) -> Result<(), MatchError> {
    match questions.iter().find(|q| q.len() != chunk.len()) {
        Some(q) => Err(MatchError::Provider(format!(
            "embedding dimensions differ: message chunk has {}, question has {}",
            chunk.len(),
            q.len()
        ))),
        None if chunk.is_empty() => Err(MatchError::Provider("empty embedding".to_string())),
        None => Ok(()),
    }
}

fn provider_error(err: anyhow::Error) -> MatchError {
    match err.downcast_ref::<EmbedTimeout>() {
        Some(EmbedTimeout(after)) => MatchError::Timeout(*after),
        None => MatchError::Provider(format!("{err:#}")),
    }
}
