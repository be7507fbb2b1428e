pub mod batch;
pub mod cache;
pub mod config;
pub mod db;
pub mod decode;
pub mod engine;
pub mod fingerprint;
pub mod index;
pub mod matcher;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testutil;

/// Audio file extensions we can decode natively
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "wave", "flac"];

/// Application name for XDG paths
pub const APP_NAME: &str = "trackprint";
