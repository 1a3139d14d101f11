//! Repository traits, one per entity family.

pub mod books;
pub mod chapters;
pub mod comics;
pub mod pages;
pub mod settings;

pub use books::{BookRepo, NewBook, SourceUpload};
pub use chapters::ChapterRepo;
pub use comics::{ComicRepo, NewComic};
pub use pages::{ComicPageRepo, PageUpload};
pub use settings::{SettingsRepo, CUSTOM_FONTS, STORAGE_LIMIT_BYTES};
