//! Content preprocessing for embedding generation.
//!
//! Prepares the text a book is embedded from:
//! 1. Collapse whitespace in every field
//! 2. Skip the book if every field is empty
//! 3. Join the non-empty fields with a separator
//! 4. Truncate to max length with ellipsis

use crate::catalog::Book;

/// Maximum content length for embedding input (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 512;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Compose the embedding input for a book.
///
/// Fields are taken in the order title, author, genres, tags, description.
/// Returns `None` if all of them are empty after trimming.
pub fn book_text(book: &Book) -> Option<String> {
    let fields = [
        &book.title,
        &book.author,
        &book.genres,
        &book.tags,
        &book.description,
    ];

    let parts: Vec<String> = fields
        .iter()
        .map(|field| collapse_whitespace(field))
        .filter(|field| !field.is_empty())
        .collect();

    if parts.is_empty() {
        return None;
    }

    Some(truncate_content(&parts.join(" - ")))
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate content to MAX_CONTENT_LENGTH, adding ellipsis if truncated.
fn truncate_content(content: &str) -> String {
    if content.chars().count() <= MAX_CONTENT_LENGTH {
        return content.to_string();
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}
