//! Storage modules: config

pub mod config;
