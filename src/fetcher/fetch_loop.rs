use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::app::{ProxyContext, ProxyError, Result};
use crate::cache::CacheKey;
use crate::domain::{expiry_after, AuthSession, CacheEntry, CallerContext, Method};
use crate::fetcher::{FetchResult, FetchTarget, OutboundRequest, Transport};

/// How a fetch ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The origin answered; the body has not been read yet.
    Response(FetchResult),
    /// The origin timed out and a cached copy is served instead.
    Stale(CacheEntry),
}

/// Bounded redirect-following fetch for one caller request.
///
/// Every hop re-attaches credentials, rebuilds the outbound request and runs
/// the configured interceptors. The loop gives up after `max_redirects`
/// sends and returns whatever the last response was.
pub struct FetchLoop<'a> {
    ctx: &'a ProxyContext,
    transport: Arc<dyn Transport>,
    header_mismatch: bool,
}

impl<'a> FetchLoop<'a> {
    pub fn new(ctx: &'a ProxyContext, transport: Arc<dyn Transport>) -> Self {
        Self {
            ctx,
            transport,
            header_mismatch: false,
        }
    }

    /// Whether the configured extra header arrays failed to line up.
    pub fn header_mismatch(&self) -> bool {
        self.header_mismatch
    }

    /// Fetch `url`. `cache_key` enables the stale fallback on timeout.
    pub async fn run(
        &mut self,
        caller: &CallerContext,
        session: &mut AuthSession,
        url: &str,
        method: Method,
        cache_key: Option<&CacheKey>,
    ) -> Result<FetchOutcome> {
        let max_hops = self.ctx.config.http.max_redirects.max(1);
        let mut url = url.to_string();
        let mut hop = 0;

        loop {
            let mut request = OutboundRequest::new(self.build_target(caller, &url, method, hop));
            self.ctx
                .credentials
                .attach_transport_credentials(session, caller, &mut request);

            let pre = self
                .ctx
                .interceptors
                .resolve_pre(self.ctx.config.interceptors.pre())?;
            if let Some(pre) = pre {
                pre.intercept(caller, &mut request.target)?;
            }

            debug!(hop, method = request.target.method.as_str(), "Fetching {}", url);
            let result = match self.transport.send(&request).await {
                Ok(result) => result,
                Err(ProxyError::Timeout(timed_out)) => {
                    return self.stale_fallback(cache_key, timed_out);
                }
                Err(e) => return Err(e),
            };

            session.touch(Utc::now());
            self.ctx.sessions.save(&caller.session_id, session);

            let post = self
                .ctx
                .interceptors
                .resolve_post(self.ctx.config.interceptors.post())?;
            if let Some(post) = post {
                post.intercept(caller, &result)?;
            }

            let next = result.redirect_target(&url)?;
            hop += 1;

            if next == url {
                return Ok(FetchOutcome::Response(result));
            }
            if hop >= max_hops {
                warn!(
                    "Gave up on {} after {} redirects, returning the last response",
                    url, hop
                );
                return Ok(FetchOutcome::Response(result));
            }

            url = next;
        }
    }

    fn build_target(
        &mut self,
        caller: &CallerContext,
        url: &str,
        method: Method,
        hop: usize,
    ) -> FetchTarget {
        let method = match method {
            _ if hop == 0 => method,
            Method::Head => Method::Head,
            _ => Method::Get,
        };

        let mut target = FetchTarget::new(url, method);

        let http = &self.ctx.config.http;
        match http.extra_headers() {
            Some(headers) => target.headers = headers,
            None => {
                error!(
                    "Header names and values differ in length ({} names, {} values); sending no extra headers",
                    http.header_names.len(),
                    http.header_values.len()
                );
                self.header_mismatch = true;
            }
        }

        if hop == 0 && method == Method::Post {
            target.form_params = caller.forwardable_params();
        }

        target
    }

    fn stale_fallback(&self, cache_key: Option<&CacheKey>, url: String) -> Result<FetchOutcome> {
        let config = &self.ctx.config.cache;
        if !config.enabled || !config.serve_expired_on_timeout {
            return Err(ProxyError::Timeout(url));
        }

        let Some(entry) = cache_key.and_then(|key| self.ctx.cache.lookup(key, true)) else {
            warn!("Timed out fetching {} and no cached copy is available", url);
            return Err(ProxyError::Timeout(url));
        };

        let entry = match (cache_key, config.retry_delay()?) {
            (Some(key), Some(delay)) => {
                let refreshed = entry.with_expiration(Some(expiry_after(Utc::now(), delay)?));
                self.ctx.cache.store(key, refreshed.clone(), config.persist);
                refreshed
            }
            _ => entry,
        };

        info!("Timed out fetching {}, serving cached copy", url);
        Ok(FetchOutcome::Stale(entry))
    }
}
