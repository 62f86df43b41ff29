//! Credential resolution for the origin server.
//!
//! [`CredentialProvider`] covers every configured authentication kind:
//! transport-level credentials (basic, NTLM), form login replayed when the
//! origin session lapses, CAS ticket delegation, and the decision whether the
//! caller has to be prompted before anything is fetched.

pub mod cas;

pub use cas::{CasAuthenticator, TicketUrlAuthenticator};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::app::{ProxyError, Result};
use crate::config::{AuthConfig, AuthKind};
use crate::domain::{AuthSession, CallerContext, Method};
use crate::fetcher::{Credentials, FetchTarget, OutboundRequest, Transport};

/// Whether the caller must supply credentials before the fetch can go ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginRequirement {
    None,
    Prompt,
}

/// Values a caller typed into the credential prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualCredentials {
    pub user_name: Option<String>,
    pub password: Option<String>,
    /// One entry per configured dynamic login parameter
    pub dynamic_values: Vec<Option<String>>,
}

/// Submitted values the configuration asked to keep beyond the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Remembered {
    pub user_name: Option<String>,
    pub password: Option<String>,
    /// Replacement for the configured dynamic values; only the persisted
    /// indices carry a value
    pub dynamic_values: Option<Vec<String>>,
}

impl Remembered {
    pub fn is_empty(&self) -> bool {
        self.user_name.is_none() && self.password.is_none() && self.dynamic_values.is_none()
    }

    pub fn apply_to(&self, config: &mut AuthConfig) {
        if let Some(ref user_name) = self.user_name {
            config.user_name = Some(user_name.clone());
        }
        if let Some(ref password) = self.password {
            config.password = Some(password.clone());
        }
        if let Some(ref values) = self.dynamic_values {
            config.dynamic_param_values = values.clone();
        }
    }
}

pub struct CredentialProvider {
    config: AuthConfig,
}

impl CredentialProvider {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    fn user_name(&self, session: &AuthSession) -> Option<String> {
        non_empty_owned(session.user_name.as_deref())
            .or_else(|| non_empty_owned(self.config.user_name.as_deref()))
    }

    fn password(&self, session: &AuthSession) -> Option<String> {
        non_empty_owned(session.password.as_deref())
            .or_else(|| non_empty_owned(self.config.password.as_deref()))
    }

    fn domain(&self, session: &AuthSession) -> Option<String> {
        non_empty_owned(session.domain.as_deref())
            .or_else(|| non_empty_owned(self.config.domain.as_deref()))
    }

    /// Put HTTP-level credentials on `request` for basic and NTLM auth.
    pub fn attach_transport_credentials(
        &self,
        session: &AuthSession,
        caller: &CallerContext,
        request: &mut OutboundRequest,
    ) {
        if !self.config.enabled {
            return;
        }

        request.credentials = match self.config.kind {
            AuthKind::Basic => Some(Credentials::Basic {
                user_name: self.user_name(session).unwrap_or_default(),
                password: self.password(session).unwrap_or_default(),
            }),
            AuthKind::Ntlm => Some(Credentials::Ntlm {
                user_name: self.user_name(session).unwrap_or_default(),
                password: self.password(session).unwrap_or_default(),
                domain: self.domain(session).unwrap_or_default(),
                host: caller.remote_host.clone(),
            }),
            AuthKind::Form | AuthKind::Cas => return,
        };
    }

    /// Replay the configured login form if the origin session has lapsed.
    ///
    /// Returns the landing URL when the login response redirects somewhere
    /// other than the login URL itself.
    pub async fn perform_form_login(
        &self,
        transport: &dyn Transport,
        session: &mut AuthSession,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        if !self.config.uses(AuthKind::Form)
            || !session.is_expired(self.config.session_timeout()?, now)
        {
            return Ok(None);
        }

        let login_url = self.config.login_url().ok_or_else(|| {
            ProxyError::Config("Form authentication is enabled but no login URL is set".into())
        })?;

        let mut target = FetchTarget::new(login_url, Method::Post);
        target.form_params = self
            .config
            .dynamic_param_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = session.dynamic_value(i).unwrap_or_default().to_string();
                (name.clone(), value)
            })
            .chain(self.config.static_params())
            .collect();

        info!("Session expired, logging in at {}", login_url);
        let response = transport.send(&OutboundRequest::new(target)).await?;
        session.touch(now);

        let landing = response.redirect_target(login_url)?;
        drop(response);

        if landing == login_url {
            Ok(None)
        } else {
            debug!("Form login landed on {}", landing);
            Ok(Some(landing))
        }
    }

    /// Decide whether the caller has to be prompted, delegating to CAS when
    /// that is the configured kind.
    pub async fn authorize(
        &self,
        session: &mut AuthSession,
        caller: &CallerContext,
        cas: Option<&dyn CasAuthenticator>,
    ) -> LoginRequirement {
        if !self.config.enabled {
            return LoginRequirement::None;
        }

        match self.config.kind {
            AuthKind::Basic => {
                let missing_user = self.config.prompt_user_name && self.user_name(session).is_none();
                let missing_password =
                    self.config.prompt_password && self.password(session).is_none();

                if missing_user || missing_password {
                    LoginRequirement::Prompt
                } else {
                    LoginRequirement::None
                }
            }
            AuthKind::Form => {
                let merged: Vec<Option<String>> = (0..self.config.dynamic_param_names.len())
                    .map(|i| {
                        // A blank answer from the caller still counts as answered.
                        self.config
                            .dynamic_value(i)
                            .map(String::from)
                            .or_else(|| session.dynamic_values.get(i).cloned().flatten())
                    })
                    .collect();
                let missing = merged.iter().any(Option::is_none);
                session.dynamic_values = merged;

                if missing {
                    LoginRequirement::Prompt
                } else {
                    LoginRequirement::None
                }
            }
            AuthKind::Cas => {
                if session.cas_authenticated {
                    return LoginRequirement::None;
                }

                let Some(cas) = cas else {
                    warn!("CAS authentication is enabled but no authenticator is available");
                    return LoginRequirement::Prompt;
                };

                match cas.authenticate(caller, caller.proxy_ticket.as_deref()).await {
                    Ok(Some(destination)) => {
                        info!("CAS authenticated session {}", caller.session_id);
                        session.current_url = Some(destination);
                        session.cas_authenticated = true;
                        LoginRequirement::None
                    }
                    Ok(None) => LoginRequirement::Prompt,
                    Err(e) => {
                        warn!("CAS authentication failed: {}", e);
                        LoginRequirement::Prompt
                    }
                }
            }
            AuthKind::Ntlm => LoginRequirement::None,
        }
    }

    /// Store what the caller typed into the prompt in `session`.
    pub fn submit_manual_credentials(
        &self,
        session: &mut AuthSession,
        submitted: ManualCredentials,
    ) -> Result<Remembered> {
        let mut remembered = Remembered::default();

        match self.config.kind {
            AuthKind::Basic => {
                if let Some(user_name) = submitted.user_name.filter(|v| !v.is_empty()) {
                    if self.config.persist_user_name {
                        remembered.user_name = Some(user_name.clone());
                    }
                    session.user_name = Some(user_name);
                }
                if let Some(password) = submitted.password.filter(|v| !v.is_empty()) {
                    if self.config.persist_password {
                        remembered.password = Some(password.clone());
                    }
                    session.password = Some(password);
                }
            }
            AuthKind::Form => {
                let expected = self.config.dynamic_param_names.len();
                if submitted.dynamic_values.len() != expected {
                    warn!(
                        "Invalid data submitted during manual authentication: {} dynamic names but {} values",
                        expected,
                        submitted.dynamic_values.len()
                    );
                    return Ok(remembered);
                }

                let values: Vec<String> = submitted
                    .dynamic_values
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect();

                let mut persisted = vec![String::new(); values.len()];
                for &index in &self.config.dynamic_param_persist {
                    match values.get(index) {
                        Some(value) => persisted[index] = value.clone(),
                        None => warn!("Ignoring persist index {} beyond {} dynamic params", index, expected),
                    }
                }
                remembered.dynamic_values = Some(persisted);

                session.dynamic_values = values.into_iter().map(Some).collect();
            }
            kind => {
                return Err(ProxyError::Auth(format!(
                    "Manual credentials are not accepted for {:?} authentication",
                    kind
                )));
            }
        }

        Ok(remembered)
    }
}

fn non_empty_owned(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::testing::{Scripted, ScriptedTransport};
    use async_trait::async_trait;
    use chrono::Duration;

    fn basic_config() -> AuthConfig {
        AuthConfig {
            enabled: true,
            kind: AuthKind::Basic,
            ..Default::default()
        }
    }

    fn form_config() -> AuthConfig {
        AuthConfig {
            enabled: true,
            kind: AuthKind::Form,
            session_timeout_minutes: 1,
            login_url: Some("http://a.example/login".into()),
            static_param_names: vec!["submit".into()],
            static_param_values: vec!["Log In".into()],
            dynamic_param_names: vec!["user".into(), "pass".into()],
            ..Default::default()
        }
    }

    struct FixedCas(Option<String>);

    #[async_trait]
    impl CasAuthenticator for FixedCas {
        async fn authenticate(
            &self,
            _caller: &CallerContext,
            _ticket: Option<&str>,
        ) -> Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_basic_session_value_wins_over_config() {
        let provider = CredentialProvider::new(AuthConfig {
            user_name: Some("configured".into()),
            password: Some("secret".into()),
            ..basic_config()
        });
        let session = AuthSession {
            user_name: Some("typed".into()),
            ..Default::default()
        };
        let mut request = OutboundRequest::new(FetchTarget::new("http://a.example/", Method::Get));

        provider.attach_transport_credentials(&session, &CallerContext::new("s1"), &mut request);

        assert_eq!(
            request.credentials,
            Some(Credentials::Basic {
                user_name: "typed".into(),
                password: "secret".into(),
            })
        );
    }

    #[test]
    fn test_ntlm_carries_domain_and_host() {
        let provider = CredentialProvider::new(AuthConfig {
            kind: AuthKind::Ntlm,
            user_name: Some("jdoe".into()),
            domain: Some("CORP".into()),
            ..basic_config()
        });
        let mut caller = CallerContext::new("s1");
        caller.remote_host = Some("ws-17".into());
        let mut request = OutboundRequest::new(FetchTarget::new("http://a.example/", Method::Get));

        provider.attach_transport_credentials(&AuthSession::new(), &caller, &mut request);

        assert_eq!(
            request.credentials,
            Some(Credentials::Ntlm {
                user_name: "jdoe".into(),
                password: String::new(),
                domain: "CORP".into(),
                host: Some("ws-17".into()),
            })
        );
    }

    #[test]
    fn test_disabled_auth_attaches_nothing() {
        let provider = CredentialProvider::new(AuthConfig {
            enabled: false,
            ..basic_config()
        });
        let mut request = OutboundRequest::new(FetchTarget::new("http://a.example/", Method::Get));
        provider.attach_transport_credentials(&AuthSession::new(), &CallerContext::new("s1"), &mut request);
        assert!(request.credentials.is_none());
    }

    #[tokio::test]
    async fn test_form_login_runs_when_session_expired() {
        let provider = CredentialProvider::new(form_config());
        let transport = ScriptedTransport::new(vec![Scripted::redirect(302, "/welcome")]);
        let now = Utc::now();
        let mut session = AuthSession {
            last_activity: Some(now - Duration::minutes(2)),
            dynamic_values: vec![Some("jdoe".into())],
            ..Default::default()
        };

        let landing = provider
            .perform_form_login(&transport, &mut session, now)
            .await
            .unwrap();

        assert_eq!(landing.as_deref(), Some("http://a.example/welcome"));
        assert_eq!(session.last_activity, Some(now));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target.method, Method::Post);
        assert_eq!(
            sent[0].target.form_params,
            vec![
                ("user".to_string(), "jdoe".to_string()),
                ("pass".to_string(), String::new()),
                ("submit".to_string(), "Log In".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_form_login_skipped_while_session_active() {
        let provider = CredentialProvider::new(form_config());
        let transport = ScriptedTransport::new(Vec::new());
        let now = Utc::now();
        let mut session = AuthSession {
            last_activity: Some(now),
            ..Default::default()
        };

        let landing = provider
            .perform_form_login(&transport, &mut session, now)
            .await
            .unwrap();

        assert!(landing.is_none());
        assert_eq!(transport.send_count(), 0);
    }

    #[tokio::test]
    async fn test_form_login_without_redirect_keeps_url() {
        let provider = CredentialProvider::new(form_config());
        let transport = ScriptedTransport::new(vec![Scripted::ok("text/html", "welcome")]);
        let mut session = AuthSession::new();

        let landing = provider
            .perform_form_login(&transport, &mut session, Utc::now())
            .await
            .unwrap();
        assert!(landing.is_none());
    }

    #[tokio::test]
    async fn test_basic_prompt_when_required_field_missing() {
        let provider = CredentialProvider::new(AuthConfig {
            prompt_password: true,
            user_name: Some("jdoe".into()),
            ..basic_config()
        });
        let caller = CallerContext::new("s1");

        let mut session = AuthSession::new();
        assert_eq!(
            provider.authorize(&mut session, &caller, None).await,
            LoginRequirement::Prompt
        );

        session.password = Some("hunter2".into());
        assert_eq!(
            provider.authorize(&mut session, &caller, None).await,
            LoginRequirement::None
        );
    }

    #[tokio::test]
    async fn test_form_prompt_merges_config_and_session() {
        let provider = CredentialProvider::new(AuthConfig {
            dynamic_param_values: vec!["jdoe".into()],
            ..form_config()
        });
        let caller = CallerContext::new("s1");
        let mut session = AuthSession::new();

        assert_eq!(
            provider.authorize(&mut session, &caller, None).await,
            LoginRequirement::Prompt
        );
        assert_eq!(session.dynamic_values, vec![Some("jdoe".to_string()), None]);

        session.dynamic_values[1] = Some("hunter2".into());
        assert_eq!(
            provider.authorize(&mut session, &caller, None).await,
            LoginRequirement::None
        );
    }

    #[tokio::test]
    async fn test_cas_success_sets_landing_url_once() {
        let provider = CredentialProvider::new(AuthConfig {
            kind: AuthKind::Cas,
            ..basic_config()
        });
        let cas = FixedCas(Some("https://app.example/?ticket=PT-1".into()));
        let mut session = AuthSession::new();

        let requirement = provider
            .authorize(&mut session, &CallerContext::new("s1"), Some(&cas))
            .await;

        assert_eq!(requirement, LoginRequirement::None);
        assert!(session.cas_authenticated);
        assert_eq!(session.current_url.as_deref(), Some("https://app.example/?ticket=PT-1"));

        let refusing = FixedCas(None);
        assert_eq!(
            provider
                .authorize(&mut session, &CallerContext::new("s1"), Some(&refusing))
                .await,
            LoginRequirement::None
        );
    }

    #[tokio::test]
    async fn test_cas_failure_prompts() {
        let provider = CredentialProvider::new(AuthConfig {
            kind: AuthKind::Cas,
            ..basic_config()
        });
        let mut session = AuthSession::new();

        let requirement = provider
            .authorize(&mut session, &CallerContext::new("s1"), Some(&FixedCas(None)))
            .await;

        assert_eq!(requirement, LoginRequirement::Prompt);
        assert!(!session.cas_authenticated);
    }

    #[test]
    fn test_manual_basic_credentials_remembered_when_persisted() {
        let provider = CredentialProvider::new(AuthConfig {
            persist_user_name: true,
            ..basic_config()
        });
        let mut session = AuthSession::new();

        let remembered = provider
            .submit_manual_credentials(
                &mut session,
                ManualCredentials {
                    user_name: Some("jdoe".into()),
                    password: Some("hunter2".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(session.user_name.as_deref(), Some("jdoe"));
        assert_eq!(session.password.as_deref(), Some("hunter2"));
        assert_eq!(remembered.user_name.as_deref(), Some("jdoe"));
        assert!(remembered.password.is_none());

        let mut config = basic_config();
        remembered.apply_to(&mut config);
        assert_eq!(config.user_name.as_deref(), Some("jdoe"));
        assert!(config.password.is_none());
    }

    #[test]
    fn test_manual_form_values_length_mismatch_is_ignored() {
        let provider = CredentialProvider::new(form_config());
        let mut session = AuthSession::new();

        let remembered = provider
            .submit_manual_credentials(
                &mut session,
                ManualCredentials {
                    dynamic_values: vec![Some("jdoe".into())],
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(remembered.is_empty());
        assert!(session.dynamic_values.is_empty());
    }

    #[test]
    fn test_manual_form_values_persist_selected_indices() {
        let provider = CredentialProvider::new(AuthConfig {
            dynamic_param_persist: vec![0],
            ..form_config()
        });
        let mut session = AuthSession::new();

        let remembered = provider
            .submit_manual_credentials(
                &mut session,
                ManualCredentials {
                    dynamic_values: vec![Some("jdoe".into()), None],
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(
            session.dynamic_values,
            vec![Some("jdoe".to_string()), Some(String::new())]
        );
        assert_eq!(
            remembered.dynamic_values,
            Some(vec!["jdoe".to_string(), String::new()])
        );
    }

    #[tokio::test]
    async fn test_blank_manual_answer_stops_prompting() {
        let provider = CredentialProvider::new(form_config());
        let caller = CallerContext::new("s1");
        let mut session = AuthSession::new();

        provider
            .submit_manual_credentials(
                &mut session,
                ManualCredentials {
                    dynamic_values: vec![Some("jdoe".into()), Some(String::new())],
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(
            provider.authorize(&mut session, &caller, None).await,
            LoginRequirement::None
        );
        assert_eq!(
            session.dynamic_values,
            vec![Some("jdoe".to_string()), Some(String::new())]
        );
    }

    #[test]
    fn test_manual_credentials_rejected_for_cas() {
        let provider = CredentialProvider::new(AuthConfig {
            kind: AuthKind::Cas,
            ..basic_config()
        });
        let err = provider
            .submit_manual_credentials(&mut AuthSession::new(), ManualCredentials::default())
            .unwrap_err();
        assert!(matches!(err, ProxyError::Auth(_)));
    }
}
