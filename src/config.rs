//! Runtime configuration read from the environment (and `.env`).

use crate::{Error, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PROMPT: &str = "Reimagine this image as a vibrant illustration. \
Keep the main subject, its pose and the overall composition recognizable.";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_input_dimension: u32,
    pub max_concurrent_generations: usize,
    pub default_prompt: String,
    pub blank_threshold: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("GEMINI_API_KEY")
            .ok_or_else(|| Error::Config("GEMINI_API_KEY must be set".to_string()))?;

        Ok(Self {
            api_key,
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(parse_or(&get, "GEMINI_TIMEOUT_SECS", 120u64)?),
            bind_addr: parse_or(&get, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            upload_dir: get("UPLOAD_DIR").unwrap_or_else(|| "uploads".into()).into(),
            output_dir: get("OUTPUT_DIR").unwrap_or_else(|| "outputs".into()).into(),
            max_upload_bytes: parse_positive(&get, "MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            max_input_dimension: parse_positive(&get, "MAX_INPUT_DIMENSION", 2048u32)?,
            max_concurrent_generations: parse_positive(&get, "MAX_CONCURRENT_GENERATIONS", 1usize)?,
            default_prompt: get("DEFAULT_PROMPT").unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            blank_threshold: parse_or(&get, "BLANK_THRESHOLD", 2.0f64)?,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: '{}' ({})", key, raw, e))),
        None => Ok(default),
    }
}

/// Like [`parse_or`], but zero is rejected.
fn parse_positive<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    let value = parse_or(get, key, default)?;
    if value == T::default() {
        return Err(Error::Config(format!("{} must be at least 1", key)));
    }
    Ok(value)
}
