//! Path and file name helpers

pub mod media;
pub mod paths;
