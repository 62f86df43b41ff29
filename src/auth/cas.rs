use async_trait::async_trait;
use url::Url;

use crate::app::Result;
use crate::config::{non_empty, Config};
use crate::domain::CallerContext;

/// Exchanges a CAS proxy ticket for an authenticated landing URL.
#[async_trait]
pub trait CasAuthenticator: Send + Sync {
    /// `Ok(None)` means the exchange did not authenticate the caller.
    async fn authenticate(
        &self,
        caller: &CallerContext,
        proxy_ticket: Option<&str>,
    ) -> Result<Option<String>>;
}

/// Lands the caller on the CAS-protected service with the ticket attached,
/// leaving validation to the service itself.
#[derive(Debug, Clone)]
pub struct TicketUrlAuthenticator {
    service_url: Option<String>,
}

impl TicketUrlAuthenticator {
    pub fn new(service_url: Option<String>) -> Self {
        Self { service_url }
    }

    /// Uses `cas_service_url`, falling back to `base_url`.
    pub fn from_config(config: &Config) -> Self {
        let service_url = non_empty(config.general.cas_service_url.as_deref())
            .or_else(|| non_empty(config.general.base_url.as_deref()))
            .map(String::from);
        Self::new(service_url)
    }
}

#[async_trait]
impl CasAuthenticator for TicketUrlAuthenticator {
    async fn authenticate(
        &self,
        _caller: &CallerContext,
        proxy_ticket: Option<&str>,
    ) -> Result<Option<String>> {
        let (Some(service), Some(ticket)) = (
            self.service_url.as_deref(),
            proxy_ticket.filter(|t| !t.is_empty()),
        ) else {
            return Ok(None);
        };

        let mut url = Url::parse(service)?;
        url.query_pairs_mut().append_pair("ticket", ticket);
        Ok(Some(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_is_appended() {
        let cas = TicketUrlAuthenticator::new(Some("https://app.example/home?lang=en".into()));
        let dest = cas
            .authenticate(&CallerContext::new("s1"), Some("PT-1-abc"))
            .await
            .unwrap();
        assert_eq!(dest.as_deref(), Some("https://app.example/home?lang=en&ticket=PT-1-abc"));
    }

    #[tokio::test]
    async fn test_missing_ticket_does_not_authenticate() {
        let cas = TicketUrlAuthenticator::new(Some("https://app.example/".into()));
        let caller = CallerContext::new("s1");
        assert!(cas.authenticate(&caller, None).await.unwrap().is_none());
        assert!(cas.authenticate(&caller, Some("")).await.unwrap().is_none());
    }

    #[test]
    fn test_service_url_falls_back_to_base_url() {
        let mut config = Config::default();
        config.general.base_url = Some("https://app.example/".into());
        let cas = TicketUrlAuthenticator::from_config(&config);
        assert_eq!(cas.service_url.as_deref(), Some("https://app.example/"));
    }
}
