//! Blob key naming scheme.
//!
//! Keys follow `{category}/{entity-kind}/{id}/{discriminator}` and are the
//! only link between the blob store and the metadata store. The category
//! prefix is load-bearing: storage accounting classifies objects from the key
//! alone, so it can stay a pure string operation instead of a metadata join
//! per object. Changing any of these formats is a breaking change for
//! accounting.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Top-level accounting category, derived from the key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageCategory {
    /// Raw uploaded source files (EPUB/TXT/CBZ), kept as-is.
    Sources,
    /// Chapter text blobs.
    Novels,
    /// Comic page images (and covers derived from them).
    Comics,
    /// Book cover images.
    Covers,
    /// Site-wide fonts, not owned by any entity.
    Fonts,
    /// Derived assets.
    Derived,
    /// Unclassified. A growing `other` bucket signals a naming-scheme bug.
    Other,
}

impl StorageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sources => "sources",
            Self::Novels => "novels",
            Self::Comics => "comics",
            Self::Covers => "covers",
            Self::Fonts => "fonts",
            Self::Derived => "derived",
            Self::Other => "other",
        }
    }
}

/// Classify a key into its accounting category.
pub fn classify(key: &str) -> StorageCategory {
    match key.split('/').next() {
        Some("sources") => StorageCategory::Sources,
        Some("novels") => StorageCategory::Novels,
        Some("comics") => StorageCategory::Comics,
        Some("covers") => StorageCategory::Covers,
        Some("fonts") => StorageCategory::Fonts,
        Some("derived") => StorageCategory::Derived,
        _ => StorageCategory::Other,
    }
}

/// Fine-grained classification of a single object for the admin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectClass {
    pub category: StorageCategory,
    /// "book", "comic" or "site"; None when the owner cannot be inferred.
    pub owner_type: Option<&'static str>,
    pub owner_id: Option<i64>,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_index: Option<i64>,
}

impl ObjectClass {
    fn bare(category: StorageCategory, kind: &'static str) -> Self {
        Self {
            category,
            owner_type: None,
            owner_id: None,
            kind,
            chapter_id: None,
            page_index: None,
        }
    }
}

/// Classify a key, resolving the owning entity where the format allows it.
pub fn classify_object(key: &str) -> ObjectClass {
    let parts: Vec<&str> = key.split('/').collect();

    match parts.as_slice() {
        // sources/books/{id}/... and sources/comics/{id}/...
        ["sources", "books", id, _rest @ ..] if !_rest.is_empty() => {
            match id.parse::<i64>() {
                Ok(id) => ObjectClass {
                    owner_type: Some("book"),
                    owner_id: Some(id),
                    ..ObjectClass::bare(StorageCategory::Sources, "book_source")
                },
                Err(_) => ObjectClass::bare(StorageCategory::Sources, "source"),
            }
        }
        ["sources", "comics", id, _rest @ ..] if !_rest.is_empty() => {
            match id.parse::<i64>() {
                Ok(id) => ObjectClass {
                    owner_type: Some("comic"),
                    owner_id: Some(id),
                    ..ObjectClass::bare(StorageCategory::Sources, "comic_source")
                },
                Err(_) => ObjectClass::bare(StorageCategory::Sources, "source"),
            }
        }
        // novels/books/{book}/chapters/{chapter}.txt
        ["novels", "books", book, "chapters", file] => {
            let chapter = file.strip_suffix(".txt").and_then(|s| s.parse::<i64>().ok());
            match (book.parse::<i64>().ok(), chapter) {
                (Some(book_id), Some(chapter_id)) => ObjectClass {
                    owner_type: Some("book"),
                    owner_id: Some(book_id),
                    chapter_id: Some(chapter_id),
                    ..ObjectClass::bare(StorageCategory::Novels, "chapter_text")
                },
                _ => ObjectClass::bare(StorageCategory::Novels, "novel"),
            }
        }
        // covers/{book}.{ext}
        ["covers", file] => match file.split_once('.').and_then(|(id, _)| id.parse::<i64>().ok()) {
            Some(book_id) => ObjectClass {
                owner_type: Some("book"),
                owner_id: Some(book_id),
                ..ObjectClass::bare(StorageCategory::Covers, "cover")
            },
            None => ObjectClass::bare(StorageCategory::Covers, "cover"),
        },
        // comics/{comic}/pages/{0001}.{ext}
        ["comics", comic, "pages", file] => {
            let page = file
                .split_once('.')
                .map(|(stem, _)| stem)
                .filter(|stem| stem.len() == 4)
                .and_then(|stem| stem.parse::<i64>().ok());
            match (comic.parse::<i64>().ok(), page) {
                (Some(comic_id), Some(page_index)) => ObjectClass {
                    owner_type: Some("comic"),
                    owner_id: Some(comic_id),
                    page_index: Some(page_index),
                    ..ObjectClass::bare(StorageCategory::Comics, "comic_page")
                },
                _ => ObjectClass::bare(StorageCategory::Comics, "comic"),
            }
        }
        ["fonts", ..] => ObjectClass {
            owner_type: Some("site"),
            ..ObjectClass::bare(StorageCategory::Fonts, "font")
        },
        ["derived", ..] => ObjectClass::bare(StorageCategory::Derived, "derived"),
        ["novels", ..] => ObjectClass::bare(StorageCategory::Novels, "novel"),
        ["comics", ..] => ObjectClass::bare(StorageCategory::Comics, "comic"),
        ["sources", ..] => ObjectClass::bare(StorageCategory::Sources, "source"),
        _ => ObjectClass::bare(StorageCategory::Other, "other"),
    }
}

/// Key for a book's uploaded source file. Timestamped so a replacement never
/// collides with the blob it supersedes.
pub fn book_source_key(book_id: i64, file_name: &str, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("sources/books/{book_id}/{millis}-{}", sanitize_filename(file_name, 120))
}

/// Key for a comic's uploaded source file.
pub fn comic_source_key(comic_id: i64, file_name: &str, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("sources/comics/{comic_id}/{millis}-{}", sanitize_filename(file_name, 120))
}

/// Key for a chapter's text blob.
pub fn chapter_text_key(book_id: i64, chapter_id: i64) -> String {
    format!("novels/books/{book_id}/chapters/{chapter_id}.txt")
}

/// Key for a book cover.
pub fn cover_key(book_id: i64, ext: &str) -> String {
    format!("covers/{book_id}.{ext}")
}

/// Key for a comic page image. Page indices are zero-padded to four digits so
/// lexicographic listing order matches page order.
pub fn comic_page_key(comic_id: i64, page_index: i64, ext: &str) -> String {
    format!("comics/{comic_id}/pages/{page_index:04}.{ext}")
}

/// Key for a site font file. The name must already be validated; it becomes
/// part of the key verbatim.
pub fn font_key(name: &str) -> String {
    format!("fonts/{name}")
}

/// Sanitize an uploaded file name for embedding in a key.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(name.len().min(max_len));
    let mut last_underscore = false;
    for c in name.trim().chars() {
        let safe = matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '_' | '-');
        if safe {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
        if out.len() >= max_len {
            break;
        }
    }
    if out.is_empty() { "file".to_string() } else { out }
}

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "avif", "bmp"];

/// Guess an image file extension from the content type, falling back to the
/// original file name, then to a generic `img`.
pub fn guess_image_ext(content_type: &str, orig_name: &str) -> &'static str {
    match content_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => return "jpg",
        "image/png" => return "png",
        "image/webp" => return "webp",
        "image/gif" => return "gif",
        "image/avif" => return "avif",
        "image/bmp" => return "bmp",
        _ => {}
    }
    let lower = sanitize_filename(orig_name, 120).to_ascii_lowercase();
    if let Some((_, ext)) = lower.rsplit_once('.') {
        if let Some(found) = IMAGE_EXTS.iter().find(|e| **e == ext) {
            return if *found == "jpeg" { "jpg" } else { found };
        }
    }
    "img"
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn derived_keys_classify_back_to_their_category() {
        let now = datetime!(2025-06-01 12:00:00 UTC);
        let cases = [
            (book_source_key(7, "novel.epub", now), StorageCategory::Sources),
            (comic_source_key(9, "vol1.cbz", now), StorageCategory::Sources),
            (chapter_text_key(7, 123), StorageCategory::Novels),
            (cover_key(7, "jpg"), StorageCategory::Covers),
            (comic_page_key(9, 1, "png"), StorageCategory::Comics),
            (font_key("reader.woff2"), StorageCategory::Fonts),
        ];
        for (key, category) in cases {
            assert_eq!(classify(&key), category, "key: {key}");
        }
    }

    #[test]
    fn classify_object_resolves_owners() {
        let c = classify_object("novels/books/42/chapters/317.txt");
        assert_eq!(c.owner_type, Some("book"));
        assert_eq!(c.owner_id, Some(42));
        assert_eq!(c.chapter_id, Some(317));
        assert_eq!(c.kind, "chapter_text");

        let c = classify_object("comics/5/pages/0012.webp");
        assert_eq!(c.owner_id, Some(5));
        assert_eq!(c.page_index, Some(12));

        let c = classify_object("sources/books/42/1717243200000-novel.epub");
        assert_eq!(c.owner_type, Some("book"));
        assert_eq!(c.owner_id, Some(42));

        let c = classify_object("covers/42.jpg");
        assert_eq!(c.owner_id, Some(42));
    }

    #[test]
    fn unknown_keys_fall_into_other() {
        assert_eq!(classify("stray/object"), StorageCategory::Other);
        assert_eq!(classify_object("stray/object").kind, "other");
        // Malformed but recognizable prefix stays in its category.
        assert_eq!(classify_object("novels/orphan.txt").kind, "novel");
    }

    #[test]
    fn page_keys_are_zero_padded() {
        assert_eq!(comic_page_key(3, 7, "jpg"), "comics/3/pages/0007.jpg");
        assert_eq!(comic_page_key(3, 1234, "jpg"), "comics/3/pages/1234.jpg");
    }

    #[test]
    fn sanitize_filename_collapses_and_bounds() {
        assert_eq!(sanitize_filename("my book (final).epub", 120), "my_book_final_.epub");
        assert_eq!(sanitize_filename("", 120), "file");
        assert_eq!(sanitize_filename("   ", 120), "file");
        assert!(sanitize_filename(&"x".repeat(500), 120).len() <= 120);
    }

    #[test]
    fn guess_image_ext_prefers_content_type() {
        assert_eq!(guess_image_ext("image/jpeg", "page.png"), "jpg");
        assert_eq!(guess_image_ext("application/octet-stream", "page.PNG"), "png");
        assert_eq!(guess_image_ext("application/octet-stream", "page.jpeg"), "jpg");
        assert_eq!(guess_image_ext("text/plain", "noext"), "img");
    }
}
