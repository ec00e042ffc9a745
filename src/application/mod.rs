//! Application services layered over the cache engine and repositories.

pub mod authoring;
pub mod content;
pub mod error;
pub mod jobs;
pub mod pagination;
pub mod repos;
