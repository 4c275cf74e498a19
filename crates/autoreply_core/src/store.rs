use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{info, warn};

use crate::cache::QuestionEmbeddingCache;
use crate::error::{Result, StoreError};
use crate::model::{GuildId, QaPair};
use crate::storage::{read_pairs_jsonl, write_pairs_jsonl};

/// Per-guild list of QA pairs with full-replace writes.
pub trait QaStore: Send + Sync {
    fn get_pairs(&self, guild: GuildId) -> Result<Vec<QaPair>>;
    fn set_pairs(&self, guild: GuildId, pairs: &[QaPair]) -> Result<()>;
}

impl<S: QaStore + ?Sized> QaStore for Arc<S> {
    fn get_pairs(&self, guild: GuildId) -> Result<Vec<QaPair>> {
        (**self).get_pairs(guild)
    }

    fn set_pairs(&self, guild: GuildId, pairs: &[QaPair]) -> Result<()> {
        (**self).set_pairs(guild, pairs)
    }
}

/// Decode a persisted FAQ payload. A payload that is not a JSON list decodes
/// as empty; list items that are not pair objects are skipped.
pub fn decode_payload(guild: GuildId, raw: &str) -> Vec<QaPair> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(other) => {
            warn!(guild, kind = json_kind(&other), "faq payload is not a list, treating as empty");
            return Vec::new();
        }
        Err(err) => {
            warn!(guild, error = %err, "malformed faq payload, treating as empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<QaPair>(item) {
            Ok(pair) => Some(pair),
            Err(err) => {
                warn!(guild, index = idx, error = %err, "skipping malformed faq entry");
                None
            }
        })
        .collect()
}

pub fn encode_payload(pairs: &[QaPair]) -> Result<String> {
    Ok(serde_json::to_string(pairs)?)
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Next id for a guild: one past the largest existing id, or 1.
pub fn next_id(pairs: &[QaPair]) -> Result<u64> {
    match pairs.iter().map(|p| p.id).max() {
        None => Ok(1),
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| StoreError::InvalidArg(format!("no id left after {max}"))),
    }
}

#[derive(Debug, Default)]
pub struct MemoryQaStore {
    guilds: RwLock<HashMap<GuildId, Vec<QaPair>>>,
}

impl MemoryQaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QaStore for MemoryQaStore {
    fn get_pairs(&self, guild: GuildId) -> Result<Vec<QaPair>> {
        let guilds = self.guilds.read().map_err(|_| StoreError::Poisoned)?;
        Ok(guilds.get(&guild).cloned().unwrap_or_default())
    }

    fn set_pairs(&self, guild: GuildId, pairs: &[QaPair]) -> Result<()> {
        let mut guilds = self.guilds.write().map_err(|_| StoreError::Poisoned)?;
        guilds.insert(guild, pairs.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub added: Vec<QaPair>,
    pub skipped: usize,
}

/// Administrative operations on top of a [`QaStore`]. Every write drops the
/// guild's cached question embeddings when a cache is attached.
pub struct FaqService<S> {
    store: S,
    cache: Option<Arc<QuestionEmbeddingCache>>,
}

impl<S: QaStore> FaqService<S> {
    pub fn new(store: S) -> Self {
        Self { store, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<QuestionEmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Stores `question` and `answer` as given; only all-blank text is
    /// rejected.
    pub fn add(&self, guild: GuildId, question: &str, answer: &str) -> Result<QaPair> {
        if question.trim().is_empty() || answer.trim().is_empty() {
            return Err(StoreError::InvalidArg(
                "question and answer must be non-empty".to_string(),
            ));
        }

        let mut pairs = self.store.get_pairs(guild)?;
        let pair = QaPair {
            id: next_id(&pairs)?,
            question: question.to_string(),
            answer: answer.to_string(),
        };
        pairs.push(pair.clone());
        self.write(guild, &pairs)?;
        info!(guild, id = pair.id, "qa pair added");
        Ok(pair)
    }

    pub fn remove(&self, guild: GuildId, id: u64) -> Result<RemoveOutcome> {
        let pairs = self.store.get_pairs(guild)?;
        if pairs.is_empty() {
            return Ok(RemoveOutcome::Empty);
        }

        let kept: Vec<QaPair> = pairs.iter().filter(|p| p.id != id).cloned().collect();
        if kept.len() == pairs.len() {
            return Ok(RemoveOutcome::NotFound);
        }

        self.write(guild, &kept)?;
        info!(guild, id, "qa pair removed");
        Ok(RemoveOutcome::Removed)
    }

    pub fn list(&self, guild: GuildId) -> Result<Vec<QaPair>> {
        self.store.get_pairs(guild)
    }

    /// Append usable pairs under freshly allocated ids; returns the stored
    /// copies.
    pub fn import(&self, guild: GuildId, incoming: &[QaPair]) -> Result<Vec<QaPair>> {
        let mut pairs = self.store.get_pairs(guild)?;
        let mut added = Vec::new();
        for pair in incoming.iter().filter(|p| p.is_usable()) {
            let stored = QaPair {
                id: next_id(&pairs)?,
                question: pair.question.clone(),
                answer: pair.answer.clone(),
            };
            pairs.push(stored.clone());
            added.push(stored);
        }
        if !added.is_empty() {
            self.write(guild, &pairs)?;
            info!(guild, count = added.len(), "qa pairs imported");
        }
        Ok(added)
    }

    /// Append the usable pairs of a JSON-lines file. Lines that do not hold a
    /// usable pair are counted as skipped.
    pub fn import_jsonl(&self, guild: GuildId, path: &Path) -> Result<ImportReport> {
        let batch = read_pairs_jsonl(BufReader::new(File::open(path)?))?;
        let added = self.import(guild, &batch.pairs)?;
        Ok(ImportReport {
            skipped: batch.skipped + (batch.pairs.len() - added.len()),
            added,
        })
    }

    pub fn export_jsonl(&self, guild: GuildId, path: &Path) -> Result<usize> {
        let pairs = self.store.get_pairs(guild)?;
        write_pairs_jsonl(BufWriter::new(File::create(path)?), &pairs)?;
        info!(guild, count = pairs.len(), path = %path.display(), "qa pairs exported");
        Ok(pairs.len())
    }

    fn write(&self, guild: GuildId, pairs: &[QaPair]) -> Result<()> {
        self.store.set_pairs(guild, pairs)?;
        if let Some(cache) = &self.cache {
            cache.invalidate(guild);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_read_back_allocates_ids() {
        let svc = FaqService::new(MemoryQaStore::new());
        let first = svc.add(7, "What are your hours?", "9 to 5").unwrap();
        assert_eq!(first.id, 1);
        let second = svc.add(7, "Refunds?", "30 days").unwrap();
        assert_eq!(second.id, 2);

        let pairs = svc.list(7).unwrap();
        assert_eq!(pairs, vec![first, second]);
        assert!(svc.list(8).unwrap().is_empty());
    }

    #[test]
    fn ids_continue_from_max_not_len() {
        let store = MemoryQaStore::new();
        store
            .set_pairs(
                1,
                &[QaPair {
                    id: 41,
                    question: "q".into(),
                    answer: "a".into(),
                }],
            )
            .unwrap();
        let svc = FaqService::new(store);
        assert_eq!(svc.add(1, "q2", "a2").unwrap().id, 42);
    }

    #[test]
    fn add_fails_cleanly_when_ids_are_exhausted() {
        let store = MemoryQaStore::new();
        store
            .set_pairs(
                1,
                &[QaPair {
                    id: u64::MAX,
                    question: "q".into(),
                    answer: "a".into(),
                }],
            )
            .unwrap();
        let svc = FaqService::new(store);
        assert!(matches!(svc.add(1, "q2", "a2"), Err(StoreError::InvalidArg(_))));
        assert_eq!(svc.list(1).unwrap().len(), 1);
    }

    #[test]
    fn add_keeps_text_exactly_as_given() {
        let svc = FaqService::new(MemoryQaStore::new());
        let added = svc.add(1, " What are your hours? ", "9 to 5\\n").unwrap();
        assert_eq!(svc.list(1).unwrap(), vec![added.clone()]);
        assert_eq!(added.question, " What are your hours? ");
        assert_eq!(added.answer, "9 to 5\\n");
    }

    #[test]
    fn jsonl_export_then_import_into_another_guild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faq.jsonl");
        let svc = FaqService::new(MemoryQaStore::new());
        svc.add(1, "What are your hours?", "9 to 5").unwrap();
        svc.add(1, "Refunds?", "30 days").unwrap();
        assert_eq!(svc.export_jsonl(1, &path).unwrap(), 2);

        svc.add(2, "existing", "yes").unwrap();
        let report = svc.import_jsonl(2, &path).unwrap();
        assert_eq!(report.skipped, 0);
        let ids: Vec<u64> = report.added.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(svc.list(2).unwrap()[2].question, "Refunds?");
    }

    #[test]
    fn jsonl_import_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faq.jsonl");
        std::fs::write(
            &path,
            "{\"question\":\"q\",\"answer\":\"a\"}\nnope\n{\"question\":\"\",\"answer\":\"x\"}\n",
        )
        .unwrap();
        let svc = FaqService::new(MemoryQaStore::new());
        let report = svc.import_jsonl(4, &path).unwrap();
        assert_eq!(report.added.len(), 1);
        assert_eq!(report.skipped, 2);
    }

    #[test]
    fn add_rejects_blank_fields() {
        let svc = FaqService::new(MemoryQaStore::new());
        assert!(matches!(svc.add(1, "  ", "a"), Err(StoreError::InvalidArg(_))));
    }

    #[test]
    fn remove_reports_each_outcome() {
        let svc = FaqService::new(MemoryQaStore::new());
        assert_eq!(svc.remove(1, 1).unwrap(), RemoveOutcome::Empty);
        svc.add(1, "q", "a").unwrap();
        assert_eq!(svc.remove(1, 9).unwrap(), RemoveOutcome::NotFound);
        assert_eq!(svc.remove(1, 1).unwrap(), RemoveOutcome::Removed);
        assert!(svc.list(1).unwrap().is_empty());
    }

    #[test]
    fn import_skips_unusable_and_renumbers() {
        let svc = FaqService::new(MemoryQaStore::new());
        svc.add(1, "existing", "yes").unwrap();
        let added = svc
            .import(
                1,
                &[
                    QaPair {
                        id: 99,
                        question: "new".into(),
                        answer: "one".into(),
                    },
                    QaPair {
                        id: 100,
                        question: "".into(),
                        answer: "orphan".into(),
                    },
                ],
            )
            .unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].id, 2);
    }

    #[test]
    fn decode_tolerates_bad_payloads() {
        assert!(decode_payload(1, "not json").is_empty());
        assert!(decode_payload(1, r#"{"id": 1}"#).is_empty());
        assert!(decode_payload(1, "").is_empty());

        let pairs = decode_payload(
            1,
            r#"[{"id": 1, "question": "q", "answer": "a"}, 5, {"question": "only"}]"#,
        );
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].id, 0);
        assert!(!pairs[1].is_usable());
    }

    #[test]
    fn payload_round_trips() {
        let pairs = vec![QaPair {
            id: 3,
            question: "q".into(),
            answer: "line\\nbreak".into(),
        }];
        assert_eq!(decode_payload(1, &encode_payload(&pairs).unwrap()), pairs);
    }
}
