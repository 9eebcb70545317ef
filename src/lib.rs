pub mod artifact;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod job;
pub mod progress;
pub mod runtime;
