//! Structural field extraction from item text.
//!
//! Two fields matter:
//! - the bracketed numeric tag, e.g. `[5]` → `5`
//! - a parenthesized contact token containing `@`, e.g. `(ann@example.com)`

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[(\d+)\]").unwrap());

static CONTACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+@[^)]+)\)").unwrap());

/// Structural fields pulled out of an item's text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTags {
    pub tag: Option<u32>,
    pub contact: Option<String>,
}

impl ItemTags {
    /// Extract the first tag and contact token. A tag too large for `u32`
    /// counts as absent.
    pub fn extract(text: &str) -> Self {
        let tag = TAG_RE
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());

        let contact = CONTACT_RE
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());

        Self { tag, contact }
    }

    /// Key used by the duplicate-completion policy. Needs both fields.
    pub fn dedup_key(&self) -> Option<String> {
        match (self.tag, self.contact.as_deref()) {
            (Some(tag), Some(contact)) => Some(format!("{}|{}", tag, contact.to_lowercase())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_tag_and_contact() {
        let tags = ItemTags::extract("Slot [5] for Ann (ann@example.com), thanks");
        assert_eq!(tags.tag, Some(5));
        assert_eq!(tags.contact.as_deref(), Some("ann@example.com"));
    }

    #[test]
    fn first_tag_wins() {
        let tags = ItemTags::extract("[12] moved from [3]");
        assert_eq!(tags.tag, Some(12));
    }

    #[test]
    fn missing_tag_is_none() {
        let tags = ItemTags::extract("no brackets here (bob@example.com)");
        assert_eq!(tags.tag, None);
        assert!(tags.contact.is_some());
    }

    #[test]
    fn non_numeric_brackets_are_ignored() {
        assert_eq!(ItemTags::extract("[abc] [ 4 ]").tag, None);
    }

    #[test]
    fn overflowing_tag_is_none() {
        assert_eq!(ItemTags::extract("[99999999999999]").tag, None);
    }

    #[test]
    fn parentheses_without_at_sign_are_not_contacts() {
        let tags = ItemTags::extract("[7] (see above)");
        assert_eq!(tags.contact, None);
        assert_eq!(tags.dedup_key(), None);
    }

    #[test]
    fn dedup_key_is_case_insensitive_on_contact() {
        let a = ItemTags::extract("[7] (Ann@Example.com)");
        let b = ItemTags::extract("[7] (ann@example.com)");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_eq!(a.dedup_key().as_deref(), Some("7|ann@example.com"));
    }
}
