use serde::Serialize;

use crate::model::QaPair;

pub const MAX_FIELDS_PER_PAGE: usize = 25;
pub const MAX_CHARS_PER_PAGE: usize = 6000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingPage {
    pub title: String,
    pub fields: Vec<ListingField>,
}

/// How a guild's pairs should be shown to a moderator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Empty,
    Page(ListingPage),
    /// Too long for one page; send as a text attachment instead.
    Attachment { file_name: String, content: String },
}

impl ListingField {
    fn chars(&self) -> usize {
        self.name.chars().count() + self.value.chars().count()
    }
}

impl ListingPage {
    pub fn chars(&self) -> usize {
        self.fields.iter().map(ListingField::chars).sum()
    }
}

fn field_for(pair: &QaPair) -> ListingField {
    let question = if pair.question.is_empty() {
        "No question provided"
    } else {
        &pair.question
    };
    let answer = if pair.answer.is_empty() {
        "No answer provided"
    } else {
        &pair.answer
    };
    ListingField {
        name: format!("ID {}: {question}", pair.id),
        value: answer.to_string(),
    }
}

/// Split pairs into pages of at most 25 fields and 6000 characters. A single
/// field larger than the character budget still gets a page of its own.
pub fn paginate(pairs: &[QaPair]) -> Vec<ListingPage> {
    let mut pages = Vec::new();
    let mut current = ListingPage {
        title: "QA Pairs".to_string(),
        fields: Vec::new(),
    };
    let mut chars = 0usize;

    for pair in pairs {
        let field = field_for(pair);
        let size = field.chars();
        if !current.fields.is_empty()
            && (current.fields.len() >= MAX_FIELDS_PER_PAGE || chars + size > MAX_CHARS_PER_PAGE)
        {
            pages.push(std::mem::replace(
                &mut current,
                ListingPage {
                    title: "QA Pairs (continued)".to_string(),
                    fields: Vec::new(),
                },
            ));
            chars = 0;
        }
        current.fields.push(field);
        chars += size;
    }

    if !current.fields.is_empty() {
        pages.push(current);
    }
    pages
}

pub fn render_text(pairs: &[QaPair]) -> String {
    pairs
        .iter()
        .map(|p| {
            let f = field_for(p);
            format!("{}\n{}\n\n", f.name, f.value)
        })
        .collect()
}

pub fn build_listing(pairs: &[QaPair]) -> Listing {
    let mut pages = paginate(pairs);
    match pages.len() {
        0 => Listing::Empty,
        1 if pages[0].chars() <= MAX_CHARS_PER_PAGE => Listing::Page(pages.remove(0)),
        _ => Listing::Attachment {
            file_name: "qa_list.txt".to_string(),
            content: render_text(pairs),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(n: u64, answer_len: usize) -> Vec<QaPair> {
        (1..=n)
            .map(|id| QaPair {
                id,
                question: format!("q{id}"),
                answer: "a".repeat(answer_len),
            })
            .collect()
    }

    #[test]
    fn empty_list() {
        assert_eq!(build_listing(&[]), Listing::Empty);
    }

    #[test]
    fn small_list_is_one_page() {
        let Listing::Page(page) = build_listing(&pairs(3, 5)) else {
            panic!("expected single page");
        };
        assert_eq!(page.title, "QA Pairs");
        assert_eq!(page.fields[2].name, "ID 3: q3");
    }

    #[test]
    fn splits_on_field_count() {
        let pages = paginate(&pairs(26, 1));
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].fields.len(), 25);
        assert_eq!(pages[1].title, "QA Pairs (continued)");
    }

    #[test]
    fn splits_on_character_budget() {
        let pages = paginate(&pairs(3, 2500));
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].fields.len(), 2);
    }

    #[test]
    fn multi_page_listing_becomes_attachment() {
        let Listing::Attachment { file_name, content } = build_listing(&pairs(30, 1)) else {
            panic!("expected attachment");
        };
        assert_eq!(file_name, "qa_list.txt");
        assert!(content.starts_with("ID 1: q1\na\n\n"));
    }

    #[test]
    fn oversized_single_pair_becomes_attachment() {
        let listing = build_listing(&pairs(1, 6500));
        assert!(matches!(listing, Listing::Attachment { .. }));

        let Listing::Page(page) = build_listing(&pairs(1, 5990)) else {
            panic!("expected single page");
        };
        assert!(page.chars() <= MAX_CHARS_PER_PAGE);
    }

    #[test]
    fn placeholders_for_blank_fields() {
        let blank = QaPair {
            id: 4,
            question: String::new(),
            answer: String::new(),
        };
        assert_eq!(render_text(&[blank]), "ID 4: No question provided\nNo answer provided\n\n");
    }
}
