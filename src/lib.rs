//! # webproxy
//!
//! Fetches remote pages on behalf of a caller and rewrites their markup on
//! the way through.
//!
//! ## Architecture
//!
//! One render runs through:
//!
//! ```text
//! Auth → Cache → Fetch loop → Content-type gate → Rewrite pipeline → Caller
//!                                                       └→ Cache capture
//! ```
//!
//! - [`auth`]: Credentials for the origin and the decision to prompt the caller
//! - [`fetcher`]: Transports, redirect resolution and the fetch loop
//! - [`cache`]: Rendered-page cache with stale fallback
//! - [`rewrite`]: Streaming markup rewriting through pluggable filters
//!
//! ## Quick Start
//!
//! ```bash
//! # Render a page
//! webproxy render https://www.rust-lang.org/
//!
//! # Check whether a page would be rewritten
//! webproxy probe https://www.rust-lang.org/logos/rust-logo-512x512.png
//!
//! # Drop expired cache entries
//! webproxy cache-purge
//! ```

/// Application context and error handling.
///
/// [`ProxyContext`](app::ProxyContext) wires together the transports, session
/// store, cache, credential provider and plug-in registries.
pub mod app;

/// Origin credentials: basic/NTLM attachment, form login, CAS delegation
/// and manual credential submission.
pub mod auth;

/// Page cache.
///
/// - [`PageCache`](cache::PageCache): LRU memory tier over an optional durable backing
/// - [`CaptureWriter`](cache::CaptureWriter): tees rendered output into the cache
/// - [`SingleFlight`](cache::SingleFlight): one origin fetch per key at a time
pub mod cache;

/// Command-line interface using clap.
///
/// - `render [url]` - Render a page to stdout
/// - `probe [url]` - Report a page's content type
/// - `cache-purge` - Remove expired cache entries
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/webproxy/config.toml`.
pub mod config;

/// Core domain models.
pub mod domain;

/// HTTP fetching.
///
/// - [`Transport`](fetcher::Transport): Async trait for sending one request
/// - [`HttpTransport`](fetcher::HttpTransport): reqwest-based implementation
/// - [`FetchLoop`](fetcher::FetchLoop): Redirect-following fetch with interceptors
pub mod fetcher;

/// Decides which content types get rewritten.
pub mod gate;

/// Named hooks run before and after every origin request.
pub mod interceptor;

/// The full lifecycle of one proxied page.
pub mod render;

/// Streaming markup rewriting.
///
/// Bytes are tokenized with html5ever on a blocking thread, passed through
/// the configured [`MarkupFilter`](rewrite::MarkupFilter) chain and serialized
/// back out as they arrive.
pub mod rewrite;

/// Persistence: durable cache backing (SQLite) and session storage.
pub mod store;
