pub mod cache;
pub mod format;
