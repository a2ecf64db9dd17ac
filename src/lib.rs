//! dlp-conductor library
//!
//! Locates or provisions yt-dlp and its helpers, builds its command line, and
//! runs it with streamed, classified output.

pub mod core;
pub mod error;
pub mod storage;
pub mod types;
pub mod utils;
