//! Input validation for entity metadata fields.

use crate::error::{Error, Result};
use crate::{MAX_CHAPTER_CHARS, MAX_LIMIT_BYTES};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_AUTHOR_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_TAG_CHARS: usize = 50;
pub const MAX_TAGS: usize = 20;
pub const MAX_FONT_NAME_CHARS: usize = 120;
pub const MIN_PAGE_INDEX: i64 = 1;
pub const MAX_PAGE_INDEX: i64 = 9999;

/// Validate a title: required, non-blank, bounded.
pub fn title(s: &str) -> Result<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("title must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::Validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate an optional author field. Blank input clears the field.
pub fn author(s: &str) -> Result<Option<String>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_AUTHOR_CHARS {
        return Err(Error::Validation(format!(
            "author must be at most {MAX_AUTHOR_CHARS} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Validate an optional description field. Blank input clears the field.
pub fn description(s: &str) -> Result<Option<String>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(Error::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_CHARS} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Validate chapter body text.
pub fn chapter_content(s: &str) -> Result<()> {
    if s.chars().count() > MAX_CHAPTER_CHARS {
        return Err(Error::Validation(format!(
            "chapter content must be at most {MAX_CHAPTER_CHARS} characters"
        )));
    }
    Ok(())
}

/// Normalize and validate a tag list: trimmed, deduplicated, order preserved.
pub fn tags(raw: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() > MAX_TAG_CHARS {
            return Err(Error::Validation(format!(
                "tag must be at most {MAX_TAG_CHARS} characters"
            )));
        }
        let normalized = trimmed.to_string();
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    if out.len() > MAX_TAGS {
        return Err(Error::Validation(format!("at most {MAX_TAGS} tags allowed")));
    }
    Ok(out)
}

/// Validate a comic page index.
pub fn page_index(index: i64) -> Result<()> {
    if !(MIN_PAGE_INDEX..=MAX_PAGE_INDEX).contains(&index) {
        return Err(Error::Validation(format!(
            "page index must be between {MIN_PAGE_INDEX} and {MAX_PAGE_INDEX}"
        )));
    }
    Ok(())
}

/// Validate the administrator-set storage ceiling.
/// `None` or zero means "no limit".
pub fn storage_limit(bytes: Option<i64>) -> Result<Option<u64>> {
    match bytes {
        None | Some(0) => Ok(None),
        Some(n) if n < 0 => Err(Error::Validation("storage limit must not be negative".into())),
        Some(n) => {
            let n = n as u64;
            if n > MAX_LIMIT_BYTES {
                return Err(Error::Validation(format!(
                    "storage limit must be at most {MAX_LIMIT_BYTES} bytes"
                )));
            }
            Ok(Some(n))
        }
    }
}

/// Validate a site font file name: `.woff2` only, key-safe characters, no
/// traversal sequences. The name goes into the blob key verbatim.
pub fn font_file_name(s: &str) -> Result<String> {
    let name = s.trim();
    if name.is_empty() || name.chars().count() > MAX_FONT_NAME_CHARS {
        return Err(Error::Validation(format!(
            "font name must be 1 to {MAX_FONT_NAME_CHARS} characters"
        )));
    }
    let safe = name
        .chars()
        .all(|c| matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-'));
    if !safe || name.contains("..") {
        return Err(Error::Validation("font name contains unsafe characters".into()));
    }
    let lower = name.to_ascii_lowercase();
    if !lower.ends_with(".woff2") || lower == ".woff2" {
        return Err(Error::Validation("only .woff2 fonts are supported".into()));
    }
    Ok(name.to_string())
}

/// Validate a non-negative count used for source metadata backfill
/// (word counts, chapter counts).
pub fn non_negative_count(field: &str, n: i64) -> Result<()> {
    if n < 0 {
        return Err(Error::Validation(format!("{field} must not be negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_trims_and_bounds() {
        assert_eq!(title("  Dune  ").unwrap(), "Dune");
        assert!(title("   ").is_err());
        assert!(title(&"x".repeat(201)).is_err());
        assert!(title(&"x".repeat(200)).is_ok());
    }

    #[test]
    fn blank_author_clears() {
        assert_eq!(author("  ").unwrap(), None);
        assert_eq!(author(" Frank Herbert ").unwrap().as_deref(), Some("Frank Herbert"));
        assert!(author(&"x".repeat(101)).is_err());
    }

    #[test]
    fn tags_dedupe_and_skip_blank() {
        let raw = vec![
            " sci-fi ".to_string(),
            "".to_string(),
            "sci-fi".to_string(),
            "classic".to_string(),
        ];
        assert_eq!(tags(&raw).unwrap(), vec!["sci-fi", "classic"]);
    }

    #[test]
    fn page_index_bounds() {
        assert!(page_index(0).is_err());
        assert!(page_index(1).is_ok());
        assert!(page_index(9999).is_ok());
        assert!(page_index(10_000).is_err());
    }

    #[test]
    fn storage_limit_zero_and_none_clear() {
        assert_eq!(storage_limit(None).unwrap(), None);
        assert_eq!(storage_limit(Some(0)).unwrap(), None);
        assert_eq!(storage_limit(Some(1024)).unwrap(), Some(1024));
        assert!(storage_limit(Some(-1)).is_err());
        assert!(storage_limit(Some(i64::MAX)).is_err());
    }

    #[test]
    fn font_names_are_woff2_and_key_safe() {
        assert_eq!(font_file_name(" Reader-1.woff2 ").unwrap(), "Reader-1.woff2");
        assert!(font_file_name("reader.ttf").is_err());
        assert!(font_file_name("a/b.woff2").is_err());
        assert!(font_file_name("..woff2").is_err());
        assert!(font_file_name(".woff2").is_err());
        assert!(font_file_name("").is_err());
    }

    #[test]
    fn chapter_content_bound_is_chars_not_bytes() {
        let content = "あ".repeat(MAX_CHAPTER_CHARS);
        assert!(chapter_content(&content).is_ok());
        assert!(chapter_content(&format!("{content}x")).is_err());
    }
}
