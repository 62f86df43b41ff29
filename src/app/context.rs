use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::error::{ProxyError, Result};
use crate::auth::{CasAuthenticator, CredentialProvider, TicketUrlAuthenticator};
use crate::cache::{PageCache, SingleFlight};
use crate::config::{AuthKind, CacheConfig, Config};
use crate::fetcher::{TransportPool, TransportProvider};
use crate::gate::ContentTypeGate;
use crate::interceptor::InterceptorRegistry;
use crate::rewrite::FilterRegistry;
use crate::store::{CacheBacking, InMemorySessionStore, SessionStore, SqliteStore};

/// Everything a render needs, built once from configuration and passed
/// explicitly down the call chain.
pub struct ProxyContext {
    pub config: Config,
    pub transports: Arc<dyn TransportProvider>,
    pub sessions: Arc<dyn SessionStore>,
    pub cache: PageCache,
    pub flights: SingleFlight,
    pub credentials: CredentialProvider,
    pub interceptors: InterceptorRegistry,
    pub filters: FilterRegistry,
    pub gate: ContentTypeGate,
    pub cas: Option<Arc<dyn CasAuthenticator>>,
}

impl ProxyContext {
    /// Context sending origin traffic through per-session reqwest clients.
    pub fn new(config: Config) -> Result<Self> {
        if config.auth.uses(AuthKind::Ntlm) {
            return Err(ProxyError::Config(
                "NTLM authentication is not supported by the HTTP transport".into(),
            ));
        }

        let transports = Arc::new(TransportPool::new(config.http.clone()));
        Self::with_transports(config, transports)
    }

    /// Context whose origin traffic goes through `transports`.
    pub fn with_transports(config: Config, transports: Arc<dyn TransportProvider>) -> Result<Self> {
        config.cache.entry_lifetime()?;
        config.cache.retry_delay()?;
        config.auth.session_timeout()?;

        let backing: Option<Arc<dyn CacheBacking>> =
            match cache_db_path(&config.cache, dirs::data_dir())? {
                Some(path) => Some(Arc::new(open_backing(&path)?)),
                None => None,
            };

        let cas: Option<Arc<dyn CasAuthenticator>> = if config.auth.uses(AuthKind::Cas) {
            Some(Arc::new(TicketUrlAuthenticator::from_config(&config)))
        } else {
            None
        };

        Ok(Self {
            transports,
            sessions: Arc::new(InMemorySessionStore::new()),
            cache: PageCache::new(config.cache.max_entries, backing),
            flights: SingleFlight::new(),
            credentials: CredentialProvider::new(config.auth.clone()),
            interceptors: InterceptorRegistry::default(),
            filters: FilterRegistry::default(),
            gate: ContentTypeGate::from_config(&config.content)?,
            cas,
            config,
        })
    }
}

/// Durable cache file: the configured one, else `<data dir>/webproxy/cache.db`
/// when pages are persisted.
fn cache_db_path(cache: &CacheConfig, data_dir: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(ref path) = cache.db_path {
        return Ok(Some(path.clone()));
    }
    if !cache.persist {
        return Ok(None);
    }

    let data_dir = data_dir
        .ok_or_else(|| ProxyError::Config("Could not find data directory".into()))?;
    Ok(Some(data_dir.join("webproxy").join("cache.db")))
}

fn open_backing(path: &Path) -> Result<SqliteStore> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    SqliteStore::new(path)
}
