use std::collections::HashMap;

use crate::model::{Answer, DeferredAnswer, QaPair};

#[derive(Debug, Clone)]
struct TableEntry {
    pair_id: u64,
    answer: Answer,
}

/// Lookup table built from one guild's pairs: distinct questions in
/// first-seen order, each keyed to its answer. A repeated question keeps its
/// original position but takes the answer of the last pair that used it.
#[derive(Debug, Clone, Default)]
pub struct FaqTable {
    questions: Vec<String>,
    entries: HashMap<String, TableEntry>,
}

impl FaqTable {
    pub fn from_pairs(pairs: &[QaPair]) -> Self {
        let mut table = Self::default();
        for pair in pairs.iter().filter(|p| p.is_usable()) {
            let entry = TableEntry {
                pair_id: pair.id,
                answer: Answer::Literal(unescape_newlines(&pair.answer)),
            };
            if table.entries.insert(pair.question.clone(), entry).is_none() {
                table.questions.push(pair.question.clone());
            }
        }
        table
    }

    /// Swap in callback answers for questions this table already knows.
    pub fn apply_deferred(&mut self, deferred: &HashMap<String, DeferredAnswer>) {
        for (question, f) in deferred {
            if let Some(entry) = self.entries.get_mut(question) {
                entry.answer = Answer::Deferred(f.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn answer(&self, question: &str) -> Option<(&Answer, u64)> {
        self.entries.get(question).map(|e| (&e.answer, e.pair_id))
    }
}

/// Answers may be authored with escaped line breaks (`\n` as two characters).
pub fn unescape_newlines(answer: &str) -> String {
    answer.replace("\\n", "\n")
}
