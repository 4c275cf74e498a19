use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::embed::EmbeddingProvider;
use crate::matcher::SimilarityMatcher;
use crate::model::{Author, Decision, GuildId, MatchOutcome};
use crate::store::QaStore;

/// One scripted message and what the matcher should do with it.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalCase {
    pub case_id: String,
    pub message: String,
    /// `null` means the message must not be answered; absent means any hit
    /// is accepted.
    #[serde(default, deserialize_with = "deserialize_optional_nullable_string")]
    pub expected_answer: Option<Option<String>>,
    pub min_similarity: Option<f32>,
}

/// Absent → `None`, null → `Some(None)`, `"text"` → `Some(Some("text"))`.
fn deserialize_optional_nullable_string<'de, D>(
    deserializer: D,
) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: Option<String> = Option::deserialize(deserializer)?;
    Ok(Some(val))
}

impl EvalCase {
    pub fn expected_decision(&self) -> Decision {
        match &self.expected_answer {
            Some(None) => Decision::Miss,
            _ => Decision::Hit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalOutcome {
    pub case_id: String,
    pub passed: bool,
    pub actual_decision: Decision,
    pub actual_answer: Option<String>,
    pub score: Option<f32>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalSummary {
    pub started_at: DateTime<Utc>,
    pub threshold: f32,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f32,
    pub outcomes: Vec<EvalOutcome>,
}

impl EvalSummary {
    pub fn meets(&self, required_pass_rate: f32) -> bool {
        self.pass_rate >= required_pass_rate
    }
}

fn case_passed(case: &EvalCase, outcome: &MatchOutcome) -> bool {
    match (&case.expected_answer, outcome) {
        (Some(None), MatchOutcome::Miss) => true,
        (Some(None), _) => false,
        (expected, MatchOutcome::Hit(hit)) => {
            let answer_ok = match expected {
                Some(Some(text)) => &hit.answer == text,
                _ => true,
            };
            answer_ok && case.min_similarity.map_or(true, |min| hit.score >= min)
        }
        _ => false,
    }
}

pub fn evaluate_cases<S, E>(
    matcher: &SimilarityMatcher<S, E>,
    guild: GuildId,
    cases: &[EvalCase],
    threshold: f32,
) -> EvalSummary
where
    S: QaStore,
    E: EmbeddingProvider,
{
    let started_at = Utc::now();
    let author = Author {
        id: 0,
        name: "eval".to_string(),
    };
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let start = Instant::now();
        let outcome = matcher.find_best_match(guild, &case.message, &author, threshold);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        outcomes.push(EvalOutcome {
            case_id: case.case_id.clone(),
            passed: case_passed(case, &outcome),
            actual_decision: outcome.decision(),
            score: outcome.hit().map(|h| h.score),
            actual_answer: outcome.into_answer(),
            latency_ms,
        });
    }

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.passed).count();
    let failed = total.saturating_sub(passed);
    let pass_rate = if total == 0 {
        0.0
    } else {
        passed as f32 / total as f32
    };

    EvalSummary {
        started_at,
        threshold,
        total,
        passed,
        failed,
        pass_rate,
        outcomes,
    }
}
