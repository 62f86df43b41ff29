pub mod fetch_loop;
pub mod http_fetcher;
pub mod redirect;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;

use crate::app::{ProxyError, Result};
use crate::domain::{Method, RESERVED_PARAM_PREFIX};

pub use fetch_loop::{FetchLoop, FetchOutcome};
pub use http_fetcher::{HttpTransport, TransportPool};
pub use redirect::check_redirect;

/// Response body, read at most once.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// One outbound request, rebuilt for every redirect hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub form_params: Vec<(String, String)>,
}

impl FetchTarget {
    pub fn new(url: impl Into<String>, method: Method) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            form_params: Vec::new(),
        }
    }
}

/// Credentials handed to the transport for HTTP-level authentication.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic {
        user_name: String,
        password: String,
    },
    Ntlm {
        user_name: String,
        password: String,
        domain: String,
        host: Option<String>,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { user_name, .. } => f
                .debug_struct("Basic")
                .field("user_name", user_name)
                .finish_non_exhaustive(),
            Credentials::Ntlm {
                user_name,
                domain,
                host,
                ..
            } => f
                .debug_struct("Ntlm")
                .field("user_name", user_name)
                .field("domain", domain)
                .field("host", host)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub target: FetchTarget,
    pub credentials: Option<Credentials>,
}

impl OutboundRequest {
    pub fn new(target: FetchTarget) -> Self {
        Self {
            target,
            credentials: None,
        }
    }
}

/// A response whose body has not been consumed yet.
///
/// Dropping the result releases the underlying connection.
pub struct FetchResult {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub body: BodyStream,
    pub final_url: String,
}

impl fmt::Debug for FetchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResult")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("final_url", &self.final_url)
            .finish_non_exhaustive()
    }
}

impl FetchResult {
    /// Result with an in-memory body.
    pub fn from_bytes(
        status: u16,
        headers: Vec<(String, String)>,
        final_url: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        let content_type = header_value(&headers, "content-type").map(String::from);
        let body: Bytes = body.into();
        Self {
            status,
            headers,
            content_type,
            body: stream::once(async move { Ok::<_, ProxyError>(body) }).boxed(),
            final_url: final_url.into(),
        }
    }

    /// Where this response sends the caller next; `url` itself if nowhere.
    pub fn redirect_target(&self, url: &str) -> Result<String> {
        check_redirect(url, self.status, &self.headers)
    }
}

/// Case-insensitive header lookup, first match wins.
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Fold submitted GET-form parameters into the query string of `url`.
pub fn build_get_url(url: &str, params: &[(String, String)]) -> Result<String> {
    let mut parsed = url::Url::parse(url)?;
    {
        let mut query = parsed.query_pairs_mut();
        for (name, value) in params {
            if !name.starts_with(RESERVED_PARAM_PREFIX) {
                query.append_pair(name, value);
            }
        }
    }
    Ok(parsed.to_string())
}

/// Sends requests to origin servers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. A transport timeout must surface as
    /// [`ProxyError::Timeout`].
    async fn send(&self, request: &OutboundRequest) -> Result<FetchResult>;
}

/// Hands out the transport owning a caller session's connection state.
pub trait TransportProvider: Send + Sync {
    fn transport_for(&self, session_id: &str) -> Result<Arc<dyn Transport>>;
}

/// Every session shares one transport.
pub struct SharedTransport(pub Arc<dyn Transport>);

impl TransportProvider for SharedTransport {
    fn transport_for(&self, _session_id: &str) -> Result<Arc<dyn Transport>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let headers = vec![
            ("Content-Type".to_string(), "text/html".to_string()),
            ("LOCATION".to_string(), "/next".to_string()),
        ];
        assert_eq!(header_value(&headers, "location"), Some("/next"));
        assert_eq!(header_value(&headers, "content-type"), Some("text/html"));
        assert_eq!(header_value(&headers, "etag"), None);
    }

    #[test]
    fn test_build_get_url_skips_reserved_params() {
        let params = vec![
            ("q".to_string(), "a b".to_string()),
            ("__wp_getMethod".to_string(), "1".to_string()),
        ];
        let url = build_get_url("http://a.example/search", &params).unwrap();
        assert_eq!(url, "http://a.example/search?q=a+b");
    }

    #[test]
    fn test_build_get_url_keeps_existing_query() {
        let params = vec![("page".to_string(), "2".to_string())];
        let url = build_get_url("http://a.example/list?sort=asc", &params).unwrap();
        assert_eq!(url, "http://a.example/list?sort=asc&page=2");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::Basic {
            user_name: "jdoe".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("jdoe"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_from_bytes_body_and_content_type() {
        let result = FetchResult::from_bytes(
            200,
            vec![("Content-Type".into(), "text/html; charset=utf-8".into())],
            "http://a.example/",
            "<p>hi</p>",
        );
        assert_eq!(result.content_type.as_deref(), Some("text/html; charset=utf-8"));
        let chunks: Vec<Bytes> = result.body.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![Bytes::from_static(b"<p>hi</p>")]);
    }
}
