//! Tools available to the abilities
//!
//! Each tool folds its own failures into returned text so a failing tool
//! never aborts an ability run; the model sees the error and moves on.

pub mod shell;
pub mod web;

pub use shell::SafeShell;
pub use web::{WebSearch, SearchResult, fetch_page, http_get, http_post, extract_text};
