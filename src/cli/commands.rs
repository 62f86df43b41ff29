use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::Utc;
use tokio::io::{AsyncWrite, Stdout};

use crate::app::{ProxyContext, Result};
use crate::auth::ManualCredentials;
use crate::domain::CallerContext;
use crate::render::{self, CallerOutput, RenderOutcome};

/// Page bytes go to stdout; the content type is reported on stderr.
pub struct StdoutOutput {
    inner: Stdout,
}

impl StdoutOutput {
    pub fn new() -> Self {
        Self {
            inner: tokio::io::stdout(),
        }
    }
}

impl Default for StdoutOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncWrite for StdoutOutput {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl CallerOutput for StdoutOutput {
    fn set_content_type(&mut self, content_type: &str) {
        eprintln!("Content-Type: {}", content_type);
    }
}

pub async fn render(ctx: &ProxyContext, caller: &CallerContext) -> Result<()> {
    let mut out = StdoutOutput::new();

    match render::render_content(ctx, caller, &mut out).await? {
        RenderOutcome::CredentialsRequired => {
            eprintln!("Credentials required: pass --user/--password or --login-value");
        }
        RenderOutcome::Cached { .. } => eprintln!("Served from cache"),
        RenderOutcome::Stale { .. } => eprintln!("Origin timed out, served expired copy"),
        RenderOutcome::Rendered {
            filtered, final_url, ..
        } => {
            if !filtered {
                eprintln!("Passed through unfiltered: {}", final_url);
            }
        }
    }

    Ok(())
}

/// Store prompt answers in the caller's session and write anything the
/// configuration asks to remember back to `config_path`.
pub fn submit_credentials(
    ctx: &ProxyContext,
    caller: &CallerContext,
    submitted: ManualCredentials,
    config_path: &Path,
) -> Result<()> {
    let mut session = ctx.sessions.load(&caller.session_id);
    let remembered = ctx
        .credentials
        .submit_manual_credentials(&mut session, submitted)?;
    ctx.sessions.save(&caller.session_id, &session);

    if !remembered.is_empty() {
        let mut config = ctx.config.clone();
        remembered.apply_to(&mut config.auth);
        config.save_to(config_path)?;
        eprintln!("Remembered credentials in {}", config_path.display());
    }

    Ok(())
}

pub async fn probe(ctx: &ProxyContext, caller: &CallerContext) -> Result<()> {
    let result = render::probe(ctx, caller).await?;

    println!("URL: {}", result.final_url);
    println!(
        "Content-Type: {}",
        result.content_type.as_deref().unwrap_or("(none)")
    );
    println!("Filtered: {}", if result.filtered { "yes" } else { "no" });
    Ok(())
}

pub fn purge_cache(ctx: &ProxyContext) -> Result<()> {
    let removed = ctx.cache.purge_expired(Utc::now())?;
    println!("Removed {} expired pages", removed);
    Ok(())
}
