//! Decides whether a response is rewritten or passed through untouched.

use regex::{Regex, RegexBuilder};

use crate::app::{ProxyError, Result};
use crate::config::ContentConfig;

/// What a missing or unrecognizable content type is taken to be.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Ordered list of accepted content-type patterns.
///
/// Each pattern must match the whole normalized type; the first match wins.
#[derive(Debug, Clone)]
pub struct ContentTypeGate {
    patterns: Vec<Regex>,
}

impl ContentTypeGate {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(&format!("^(?:{})$", p.as_ref()))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ProxyError::Config(format!(
                            "Invalid content type pattern '{}': {}",
                            p.as_ref(),
                            e
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn from_config(config: &ContentConfig) -> Result<Self> {
        Self::new(&config.accepted_types)
    }

    /// Strip parameters and map `unknown` (or nothing) to `text/html`.
    pub fn normalize(content_type: Option<&str>) -> String {
        let essence = content_type
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .unwrap_or_default();

        if essence.is_empty() || essence.eq_ignore_ascii_case("unknown") {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            essence.to_string()
        }
    }

    /// The `charset` parameter of a raw content type, if any.
    pub fn charset(content_type: Option<&str>) -> Option<&str> {
        content_type?
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches('"'))
            .filter(|value| !value.is_empty())
    }

    /// Index of the first pattern accepting `normalized`.
    pub fn matching_pattern(&self, normalized: &str) -> Option<usize> {
        self.patterns.iter().position(|p| p.is_match(normalized))
    }

    pub fn is_filtered(&self, normalized: &str) -> bool {
        self.matching_pattern(normalized).is_some()
    }
}
