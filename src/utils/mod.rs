//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod retry;

/// Normalize a search keyword: trimmed, inner whitespace collapsed, lower-cased
pub fn normalize_keyword(keyword: &str) -> String {
    keyword
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Title-case a keyword for display ("chunky sneakers" -> "Chunky Sneakers")
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate text to a maximum number of characters
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keyword() {
        assert_eq!(normalize_keyword("  Chunky   Sneakers "), "chunky sneakers");
        assert_eq!(normalize_keyword("LOAFERS"), "loafers");
        assert_eq!(normalize_keyword("   "), "");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("chunky sneakers"), "Chunky Sneakers");
        assert_eq!(title_case("high top sneakers"), "High Top Sneakers");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("very long text here", 10), "very lo...");
    }
}
