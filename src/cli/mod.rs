pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{CallerContext, Method};

#[derive(Parser)]
#[command(name = "webproxy")]
#[command(about = "Fetch a remote page through the proxy and rewrite it", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/webproxy/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a page to stdout
    Render {
        #[command(flatten)]
        caller: CallerArgs,

        /// Submit as POST instead of GET
        #[arg(long)]
        post: bool,

        /// Form parameter as name=value (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,

        /// User name answering a credentials prompt
        #[arg(long)]
        user: Option<String>,

        /// Password answering a credentials prompt
        #[arg(long)]
        password: Option<String>,

        /// Value for the next dynamic login field (repeatable, in order)
        #[arg(long = "login-value")]
        login_values: Vec<String>,
    },
    /// Report a page's content type without downloading it
    Probe {
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Remove expired pages from the cache
    CachePurge,
}

/// Who is asking and for what.
#[derive(Args, Debug, Clone)]
pub struct CallerArgs {
    /// Page to fetch (default: the session's last page, then general.base_url)
    pub url: Option<String>,

    /// Session identifier
    #[arg(long, default_value = "cli")]
    pub session: String,

    /// Instance identifier used for per-user cache keys
    #[arg(long, default_value = "cli")]
    pub instance: String,

    /// Address of the end user
    #[arg(long)]
    pub remote_host: Option<String>,

    /// CAS proxy ticket
    #[arg(long)]
    pub ticket: Option<String>,
}

impl CallerArgs {
    pub fn to_caller(&self) -> CallerContext {
        let mut caller = CallerContext::new(self.session.clone());
        caller.instance_id = self.instance.clone();
        caller.remote_host = self.remote_host.clone();
        caller.url = self.url.clone();
        caller.proxy_ticket = self.ticket.clone();
        caller.method = Method::Get;
        caller
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{}`", raw))?;
    if name.is_empty() {
        return Err(format!("empty parameter name in `{}`", raw));
    }
    Ok((name.to_string(), value.to_string()))
}
