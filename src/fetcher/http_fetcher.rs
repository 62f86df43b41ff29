use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use lru::LruCache;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect, Client};

use crate::app::{ProxyError, Result};
use crate::config::HttpConfig;
use crate::domain::Method;
use crate::fetcher::{Credentials, FetchResult, OutboundRequest, Transport, TransportProvider};

/// Sessions whose transports are kept alive at once.
pub const DEFAULT_POOL_SIZE: usize = 1000;

/// reqwest-backed transport.
///
/// Redirects are never followed here; the fetch loop resolves them so it can
/// re-attach credentials and run interceptors on every hop. Each transport
/// keeps its own cookie jar, so one transport must only ever serve one
/// caller session.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .redirect(redirect::Policy::none());

        if let Some(ref user_agent) = config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<FetchResult> {
        let target = &request.target;
        let method = match target.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Head => reqwest::Method::HEAD,
        };

        let mut builder = self.client.request(method, target.url.as_str());

        for (name, value) in &target.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => tracing::warn!("Skipping invalid request header '{}'", name),
            }
        }

        if target.method == Method::Post && !target.form_params.is_empty() {
            builder = builder.form(&target.form_params);
        }

        match &request.credentials {
            Some(Credentials::Basic {
                user_name,
                password,
            }) => {
                builder = builder.basic_auth(user_name, Some(password));
            }
            Some(Credentials::Ntlm { .. }) => {
                return Err(ProxyError::Auth(
                    "NTLM credentials are not supported by the HTTP transport".into(),
                ));
            }
            None => {}
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::Timeout(target.url.clone())
            } else {
                ProxyError::Http(e)
            }
        })?;

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let url = target.url.clone();
        let body = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| {
                    if e.is_timeout() {
                        ProxyError::Timeout(url.clone())
                    } else {
                        ProxyError::Http(e)
                    }
                })
            })
            .boxed();

        Ok(FetchResult {
            status,
            headers,
            content_type,
            body,
            final_url,
        })
    }
}

/// One [`HttpTransport`] per caller session, least recently used evicted.
pub struct TransportPool {
    config: HttpConfig,
    transports: Mutex<LruCache<String, Arc<HttpTransport>>>,
}

impl TransportPool {
    pub fn new(config: HttpConfig) -> Self {
        Self::with_capacity(config, DEFAULT_POOL_SIZE)
    }

    pub fn with_capacity(config: HttpConfig, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            transports: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.transports.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransportProvider for TransportPool {
    fn transport_for(&self, session_id: &str) -> Result<Arc<dyn Transport>> {
        let mut transports = self
            .transports
            .lock()
            .map_err(|e| ProxyError::Config(format!("transport pool lock poisoned: {}", e)))?;

        if let Some(transport) = transports.get(session_id) {
            return Ok(transport.clone());
        }

        let transport = Arc::new(HttpTransport::new(&self.config)?);
        transports.put(session_id.to_string(), transport.clone());
        Ok(transport)
    }
}
