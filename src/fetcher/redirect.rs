//! Redirect resolution.
//!
//! Mirrors what browsers tolerate rather than what RFC 7231 demands: a
//! `Location` without a scheme that does not start with `/` is resolved
//! against the directory of the previous URL.

use std::sync::LazyLock;

use regex::Regex;

use crate::app::{ProxyError, Result};
use crate::fetcher::header_value;

static URL_WITH_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^:]*://").unwrap_or_else(|e| panic!("URL_WITH_SCHEME is invalid: {e}"))
});
static URL_BASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^:]*://[^/]*)").unwrap_or_else(|e| panic!("URL_BASE is invalid: {e}"))
});

/// Statuses that send the caller elsewhere.
pub const REDIRECT_STATUSES: [u16; 4] = [301, 302, 303, 307];

pub fn is_redirect(status: u16) -> bool {
    REDIRECT_STATUSES.contains(&status)
}

/// Compute the URL to fetch after a response.
///
/// Returns `url` unchanged when the status is not a redirect or the
/// redirect carries no usable `Location`; the fetch loop treats an unchanged
/// URL as the end of the chain.
///
/// # Errors
///
/// Fails with [`ProxyError::MalformedRedirectBase`] when a host-relative
/// `Location` must be anchored on a `url` that has no `scheme://host` part.
pub fn check_redirect(url: &str, status: u16, headers: &[(String, String)]) -> Result<String> {
    if !is_redirect(status) {
        return Ok(url.to_string());
    }

    let location = match header_value(headers, "location").map(str::trim) {
        Some(loc) if !loc.is_empty() => loc,
        _ => {
            tracing::warn!("Redirect status {} for {} but no Location header", status, url);
            return Ok(url.to_string());
        }
    };

    let next = if URL_WITH_SCHEME.is_match(location) {
        location.to_string()
    } else if location.starts_with('/') {
        let base = URL_BASE
            .captures(url)
            .and_then(|c| c.get(1))
            .ok_or_else(|| ProxyError::MalformedRedirectBase(url.to_string()))?;
        format!("{}{}", base.as_str(), location)
    } else {
        let dir = url.rfind('/').map_or(url, |idx| &url[..idx]);
        format!("{}/{}", dir, location)
    };

    tracing::debug!(
        "Handling {} redirect from '{}' to '{}'. Calculated redirect URL is: {}",
        status,
        url,
        location,
        next
    );

    Ok(next)
}
