//! Core: tool resolution, command building and process orchestration

pub mod fetcher;
pub mod job;
pub mod locator;
pub mod options;
pub mod process;
pub mod progress;
pub mod resolver;
