use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@!?[0-9]+>").expect("static regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"http\S+").expect("static regex"))
}

/// Strip user mentions and URLs from a raw chat message and trim the result.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.trim().to_string();

    // Removing one mention can splice two halves into a new one (`<@<@1>2>`).
    loop {
        match mention_re().replace_all(&text, "") {
            Cow::Borrowed(_) => break,
            Cow::Owned(next) => text = next,
        }
    }

    url_re().replace_all(text.trim(), "").trim().to_string()
}

/// Whitespace-separated word count, as used by the single-word guard.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn strips_mentions_and_urls() {
        assert_eq!(
            normalize("<@123> see https://example.com/faq?x=1 for hours <@!9>"),
            "see  for hours"
        );
    }

    #[test]
    fn nested_mentions_are_fully_removed() {
        assert_eq!(normalize("<@<@1>2> hi"), "hi");
    }

    #[test]
    fn plain_text_is_only_trimmed() {
        assert_eq!(normalize("  what are your hours?  "), "what are your hours?");
    }

    #[test]
    fn mention_without_digits_is_kept() {
        assert_eq!(normalize("<@everyone> hello"), "<@everyone> hello");
    }

    #[test]
    fn only_noise_becomes_empty() {
        assert_eq!(normalize("<@1> http://a.b <@!22>"), "");
        assert_eq!(word_count(""), 0);
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(raw in r"(<@!?[0-9]{0,3}>?|https?://[a-z./]{0,6}|[a-z<@!>0-9]{1,5}|\s{1,2})*") {
            let once = normalize(&raw);
            prop_assert_eq!(normalize(&once), once);
        }
    }
}
