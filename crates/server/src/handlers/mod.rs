//! HTTP request handlers.

pub mod books;
pub mod chapters;
pub mod comics;
pub mod common;
pub mod fonts;
pub mod storage_admin;
