use anyhow::Result;
use tracing::{debug, warn};

use crate::embed::EmbeddingProvider;
use crate::matcher::SimilarityMatcher;
use crate::model::{Decision, IncomingMessage, MatchOutcome};
use crate::store::QaStore;

/// Delivers an answer back into the channel the message came from.
pub trait Responder {
    fn reply(&mut self, message: &IncomingMessage, answer: &str) -> Result<()>;
}

/// Run one inbound message through the matcher and reply on a hit.
///
/// Bot authors and messages outside a guild are ignored. Misses stay silent.
/// An unavailable matcher also stays silent; the matcher has already logged
/// the cause. A failed reply is logged and not propagated, so the caller's
/// event loop keeps going.
pub fn handle_message<S, E, R>(
    matcher: &SimilarityMatcher<S, E>,
    responder: &mut R,
    message: &IncomingMessage,
    threshold: f32,
) -> Decision
where
    S: QaStore,
    E: EmbeddingProvider,
    R: Responder + ?Sized,
{
    if message.author_is_bot {
        return Decision::Miss;
    }
    let Some(guild) = message.guild_id else {
        debug!(author = message.author.id, "ignoring direct message");
        return Decision::Miss;
    };

    let outcome = matcher.find_best_match(guild, &message.content, &message.author, threshold);
    let decision = outcome.decision();
    if let MatchOutcome::Hit(result) = outcome {
        if let Err(err) = responder.reply(message, &result.answer) {
            warn!(guild, error = %err, "failed to deliver faq answer");
        }
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use crate::model::{Author, QaPair};
    use crate::store::MemoryQaStore;

    #[derive(Default)]
    struct Recorder {
        replies: Vec<String>,
    }

    impl Responder for Recorder {
        fn reply(&mut self, _message: &IncomingMessage, answer: &str) -> Result<()> {
            self.replies.push(answer.to_string());
            Ok(())
        }
    }

    struct Broken;

    impl Responder for Broken {
        fn reply(&mut self, _message: &IncomingMessage, _answer: &str) -> Result<()> {
            anyhow::bail!("channel gone")
        }
    }

    fn matcher() -> SimilarityMatcher<MemoryQaStore, HashEmbeddingProvider> {
        let store = MemoryQaStore::new();
        store
            .set_pairs(
                10,
                &[QaPair {
                    id: 1,
                    question: "where do I report bugs".into(),
                    answer: "Open an issue.".into(),
                }],
            )
            .unwrap();
        SimilarityMatcher::new(store, HashEmbeddingProvider::new(256))
    }

    fn message(guild: Option<u64>, bot: bool) -> IncomingMessage {
        IncomingMessage {
            guild_id: guild,
            author: Author {
                id: 3,
                name: "sam".into(),
            },
            author_is_bot: bot,
            content: "where do I report bugs".into(),
        }
    }

    #[test]
    fn replies_on_hit() {
        let mut rec = Recorder::default();
        let decision = handle_message(&matcher(), &mut rec, &message(Some(10), false), 0.7);
        assert_eq!(decision, Decision::Hit);
        assert_eq!(rec.replies, vec!["Open an issue."]);
    }

    #[test]
    fn ignores_bots_and_direct_messages() {
        let mut rec = Recorder::default();
        handle_message(&matcher(), &mut rec, &message(Some(10), true), 0.7);
        handle_message(&matcher(), &mut rec, &message(None, false), 0.7);
        assert!(rec.replies.is_empty());
    }

    #[test]
    fn other_guilds_miss() {
        let mut rec = Recorder::default();
        let decision = handle_message(&matcher(), &mut rec, &message(Some(11), false), 0.7);
        assert_eq!(decision, Decision::Miss);
    }

    #[test]
    fn reply_failure_does_not_propagate() {
        let decision = handle_message(&matcher(), &mut Broken, &message(Some(10), false), 0.7);
        assert_eq!(decision, Decision::Hit);
    }
}
