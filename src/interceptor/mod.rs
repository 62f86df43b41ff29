//! Pre-request and post-response interceptors, resolved by configured name.
//!
//! A name is looked up in an [`InterceptorRegistry`] that maps it to a
//! statically known factory. No configured name means no interceptor; a name
//! the registry does not know is a hard error for the request.

use std::collections::HashMap;
use std::sync::Arc;

use crate::app::{ProxyError, Result};
use crate::domain::CallerContext;
use crate::fetcher::{FetchResult, FetchTarget};

/// Runs on every hop just before the request is sent.
pub trait PreInterceptor: Send + Sync {
    fn intercept(&self, caller: &CallerContext, target: &mut FetchTarget) -> Result<()>;
}

/// Runs on every hop right after a response arrives.
pub trait PostInterceptor: Send + Sync {
    fn intercept(&self, caller: &CallerContext, result: &FetchResult) -> Result<()>;
}

pub type PreFactory = fn() -> Arc<dyn PreInterceptor>;
pub type PostFactory = fn() -> Arc<dyn PostInterceptor>;

pub struct InterceptorRegistry {
    pre: HashMap<String, PreFactory>,
    post: HashMap<String, PostFactory>,
}

impl InterceptorRegistry {
    /// Registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            pre: HashMap::new(),
            post: HashMap::new(),
        }
    }

    pub fn register_pre(&mut self, name: impl Into<String>, factory: PreFactory) {
        self.pre.insert(name.into(), factory);
    }

    pub fn register_post(&mut self, name: impl Into<String>, factory: PostFactory) {
        self.post.insert(name.into(), factory);
    }

    pub fn resolve_pre(&self, name: Option<&str>) -> Result<Option<Arc<dyn PreInterceptor>>> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(None),
            Some(name) => self
                .pre
                .get(name)
                .map(|factory| Some(factory()))
                .ok_or_else(|| ProxyError::UnknownInterceptor(name.to_string())),
        }
    }

    pub fn resolve_post(&self, name: Option<&str>) -> Result<Option<Arc<dyn PostInterceptor>>> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(None),
            Some(name) => self
                .post
                .get(name)
                .map(|factory| Some(factory()))
                .ok_or_else(|| ProxyError::UnknownInterceptor(name.to_string())),
        }
    }
}

impl Default for InterceptorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_pre("forwarded-for", || Arc::new(ForwardedFor));
        registry.register_pre("no-cache", || Arc::new(NoCache));
        registry.register_post("log-response", || Arc::new(LogResponse));
        registry
    }
}

/// Tells the origin who the real client is.
pub struct ForwardedFor;

impl PreInterceptor for ForwardedFor {
    fn intercept(&self, caller: &CallerContext, target: &mut FetchTarget) -> Result<()> {
        if let Some(ref host) = caller.remote_host {
            target
                .headers
                .push(("X-Forwarded-For".to_string(), host.clone()));
        }
        Ok(())
    }
}

/// Asks intermediaries for a fresh copy.
pub struct NoCache;

impl PreInterceptor for NoCache {
    fn intercept(&self, _caller: &CallerContext, target: &mut FetchTarget) -> Result<()> {
        target
            .headers
            .push(("Cache-Control".to_string(), "no-cache".to_string()));
        Ok(())
    }
}

pub struct LogResponse;

impl PostInterceptor for LogResponse {
    fn intercept(&self, caller: &CallerContext, result: &FetchResult) -> Result<()> {
        tracing::info!(
            session = %caller.session_id,
            status = result.status,
            "Fetched {}",
            result.final_url
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Method;

    #[test]
    fn test_absent_name_is_not_an_error() {
        let registry = InterceptorRegistry::default();
        assert!(registry.resolve_pre(None).unwrap().is_none());
        assert!(registry.resolve_post(Some("  ")).unwrap().is_none());
    }

    #[test]
    fn test_unknown_name_is_an_error() {
        let registry = InterceptorRegistry::default();
        let err = registry.resolve_pre(Some("com.example.Missing")).err().unwrap();
        assert!(matches!(err, ProxyError::UnknownInterceptor(name) if name == "com.example.Missing"));
    }

    #[test]
    fn test_forwarded_for_adds_remote_host() {
        let registry = InterceptorRegistry::default();
        let interceptor = registry.resolve_pre(Some("forwarded-for")).unwrap().unwrap();

        let mut caller = CallerContext::new("s1");
        caller.remote_host = Some("10.0.0.7".into());
        let mut target = FetchTarget::new("http://a.example/", Method::Get);

        interceptor.intercept(&caller, &mut target).unwrap();
        assert_eq!(
            target.headers,
            vec![("X-Forwarded-For".to_string(), "10.0.0.7".to_string())]
        );
    }

    #[test]
    fn test_custom_registration() {
        struct Deny;
        impl PreInterceptor for Deny {
            fn intercept(&self, _: &CallerContext, target: &mut FetchTarget) -> Result<()> {
                Err(ProxyError::Interceptor(format!("blocked {}", target.url)))
            }
        }

        let mut registry = InterceptorRegistry::empty();
        registry.register_pre("deny", || Arc::new(Deny));

        let interceptor = registry.resolve_pre(Some("deny")).unwrap().unwrap();
        let mut target = FetchTarget::new("http://a.example/", Method::Get);
        assert!(interceptor
            .intercept(&CallerContext::new("s1"), &mut target)
            .is_err());
    }
}
