//! Content cache-and-ranking engine for a tag-organised blog.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
