//! One proxied page, start to finish.
//!
//! [`render_content`] authorizes the caller, resolves the page to fetch,
//! serves it from cache when it can, otherwise runs the fetch loop and either
//! streams the body through untouched or rewrites it, teeing the rewritten
//! output into the cache.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::Utc;
use futures::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::app::{ProxyContext, ProxyError, Result};
use crate::auth::LoginRequirement;
use crate::cache::CacheKey;
use crate::config::non_empty;
use crate::domain::{AuthSession, CacheEntry, CallerContext, Method};
use crate::fetcher::{build_get_url, FetchLoop, FetchOutcome};
use crate::gate::ContentTypeGate;
use crate::rewrite::FilterContext;

/// Where rendered bytes go.
pub trait CallerOutput: AsyncWrite + Unpin + Send {
    /// Called once, before the first byte is written.
    fn set_content_type(&mut self, content_type: &str);
}

/// Output collected in memory.
#[derive(Debug, Default)]
pub struct BufferedOutput {
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AsyncWrite for BufferedOutput {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.body).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.body).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.body).poll_shutdown(cx)
    }
}

impl CallerOutput for BufferedOutput {
    fn set_content_type(&mut self, content_type: &str) {
        self.content_type = Some(content_type.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Nothing was fetched; the caller must be prompted for credentials.
    CredentialsRequired,
    /// Served from a fresh cache entry.
    Cached { content_type: String },
    /// The origin timed out and an expired cache entry was served.
    Stale { content_type: String },
    /// Fetched from the origin.
    Rendered {
        content_type: String,
        filtered: bool,
        final_url: String,
    },
}

/// What a HEAD request says about a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Normalized content type, if the origin sent one
    pub content_type: Option<String>,
    pub filtered: bool,
    pub final_url: String,
}

/// URL and method of the first hop.
fn request_target(
    ctx: &ProxyContext,
    caller: &CallerContext,
    session: &AuthSession,
) -> Result<(String, Method)> {
    let url = non_empty(caller.url.as_deref())
        .or_else(|| non_empty(session.current_url.as_deref()))
        .or_else(|| non_empty(ctx.config.general.base_url.as_deref()))
        .ok_or_else(|| ProxyError::Config("No initial URL configured".into()))?;

    if caller.submits_get_form() {
        Ok((build_get_url(url, &caller.form_params)?, Method::Get))
    } else {
        Ok((url.to_string(), caller.method))
    }
}

async fn serve_entry<O>(out: &mut O, entry: &CacheEntry) -> Result<()>
where
    O: CallerOutput + ?Sized,
{
    out.set_content_type(&entry.content_type);
    out.write_all(&entry.content).await?;
    out.flush().await?;
    Ok(())
}

/// Render the caller's page into `out`.
pub async fn render_content<O>(
    ctx: &ProxyContext,
    caller: &CallerContext,
    out: &mut O,
) -> Result<RenderOutcome>
where
    O: CallerOutput + ?Sized,
{
    let mut session = ctx.sessions.load(&caller.session_id);

    let requirement = ctx
        .credentials
        .authorize(&mut session, caller, ctx.cas.as_deref())
        .await;
    ctx.sessions.save(&caller.session_id, &session);
    if requirement == LoginRequirement::Prompt {
        info!("Session {} needs credentials before fetching", caller.session_id);
        return Ok(RenderOutcome::CredentialsRequired);
    }

    let (url, method) = request_target(ctx, caller, &session)?;
    let transport = ctx.transports.transport_for(&caller.session_id)?;

    let landing = ctx
        .credentials
        .perform_form_login(transport.as_ref(), &mut session, Utc::now())
        .await?;
    if let Some(landing) = landing {
        info!("Form login landed on {}, fetching {}", landing, url);
    }
    ctx.sessions.save(&caller.session_id, &session);

    let cache_config = &ctx.config.cache;
    let key = cache_config
        .enabled
        .then(|| CacheKey::new(&url, cache_config.scope, &caller.instance_id));

    if let Some(ref key) = key {
        if let Some(entry) = ctx.cache.lookup(key, false) {
            serve_entry(out, &entry).await?;
            return Ok(RenderOutcome::Cached {
                content_type: entry.content_type,
            });
        }
    }

    let _flight = match key {
        Some(ref key) if cache_config.single_flight => {
            let guard = ctx.flights.acquire(key).await;
            if let Some(entry) = ctx.cache.lookup(key, false) {
                debug!("{} was filled while waiting for another fetch", key);
                serve_entry(out, &entry).await?;
                return Ok(RenderOutcome::Cached {
                    content_type: entry.content_type,
                });
            }
            Some(guard)
        }
        _ => None,
    };

    let mut fetch_loop = FetchLoop::new(ctx, transport);
    let result = match fetch_loop
        .run(caller, &mut session, &url, method, key.as_ref())
        .await?
    {
        FetchOutcome::Response(result) => result,
        FetchOutcome::Stale(entry) => {
            serve_entry(out, &entry).await?;
            return Ok(RenderOutcome::Stale {
                content_type: entry.content_type,
            });
        }
    };

    let content_type = ContentTypeGate::normalize(result.content_type.as_deref());
    let final_url = result.final_url.clone();

    if !ctx.gate.is_filtered(&content_type) {
        debug!("Passing {} ({}) through unfiltered", final_url, content_type);
        out.set_content_type(result.content_type.as_deref().unwrap_or(&content_type));
        let mut body = result.body;
        while let Some(chunk) = body.next().await {
            out.write_all(&chunk?).await?;
        }
        out.flush().await?;
        return Ok(RenderOutcome::Rendered {
            content_type,
            filtered: false,
            final_url,
        });
    }

    session.current_url = Some(final_url.clone());
    ctx.sessions.save(&caller.session_id, &session);

    let rewrite = &ctx.config.rewrite;
    let cx = FilterContext {
        page_url: &final_url,
        config: rewrite,
    };
    let pipeline = ctx
        .filters
        .pipeline(&rewrite.filters, &cx)?
        .with_charset(ContentTypeGate::charset(result.content_type.as_deref()));
    let header = ctx.config.static_html.header();
    let footer = ctx.config.static_html.footer();

    out.set_content_type(&content_type);
    match key {
        Some(key) => {
            let template = CacheEntry::template(
                content_type.as_str(),
                cache_config.entry_lifetime()?,
                Utc::now(),
            )?;
            let mut tee = ctx.cache.capture(out, template, key, cache_config.persist);
            pipeline.run(result.body, &mut tee, header, footer).await?;
            tee.finish().await?;
        }
        None => {
            pipeline.run(result.body, out, header, footer).await?;
            out.flush().await?;
        }
    }

    Ok(RenderOutcome::Rendered {
        content_type,
        filtered: true,
        final_url,
    })
}

/// Follow the caller's page with HEAD requests and report its content type.
/// Never touches the cache.
pub async fn probe(ctx: &ProxyContext, caller: &CallerContext) -> Result<ProbeResult> {
    let mut session = ctx.sessions.load(&caller.session_id);
    let (url, _) = request_target(ctx, caller, &session)?;
    let transport = ctx.transports.transport_for(&caller.session_id)?;

    ctx.credentials
        .perform_form_login(transport.as_ref(), &mut session, Utc::now())
        .await?;
    ctx.sessions.save(&caller.session_id, &session);

    let mut fetch_loop = FetchLoop::new(ctx, transport);
    let (content_type, final_url) = match fetch_loop
        .run(caller, &mut session, &url, Method::Head, None)
        .await?
    {
        FetchOutcome::Response(result) => (result.content_type.clone(), result.final_url),
        FetchOutcome::Stale(entry) => (Some(entry.content_type), url),
    };

    let content_type = content_type.map(|ct| ContentTypeGate::normalize(Some(&ct)));
    let filtered = content_type
        .as_deref()
        .is_some_and(|ct| ctx.gate.is_filtered(ct));

    Ok(ProbeResult {
        content_type,
        filtered,
        final_url,
    })
}
