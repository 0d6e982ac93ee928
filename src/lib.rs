//! Content digest: submit a YouTube video or article URL, extract its text
//! and summarize it with the first LLM provider that answers.

pub mod ai;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;

pub use api::{build_router, AppState};
pub use config::Config;
pub use error::{AppError, Result};
