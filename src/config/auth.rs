use serde::{Deserialize, Serialize};

use super::{non_empty, ConfigError};

/// Authentication strategy applied to the proxied site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    #[default]
    Basic,
    Ntlm,
    Form,
    Cas,
}

/// Authentication configuration.
///
/// Credential values set here are the static fallbacks; values a user enters
/// at the credential prompt live in the session and take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub kind: AuthKind,

    pub user_name: Option<String>,
    pub password: Option<String>,
    /// NTLM domain
    pub domain: Option<String>,

    /// Prompt when no user name is known (basic auth)
    pub prompt_user_name: bool,
    /// Prompt when no password is known (basic auth)
    pub prompt_password: bool,
    /// Copy a prompted user name into the configuration
    pub persist_user_name: bool,
    /// Copy a prompted password into the configuration
    pub persist_password: bool,

    /// Minutes of inactivity after which form login is repeated (default: 25)
    pub session_timeout_minutes: i64,

    /// Form login target
    pub login_url: Option<String>,
    pub static_param_names: Vec<String>,
    pub static_param_values: Vec<String>,
    pub dynamic_param_names: Vec<String>,
    /// Remembered dynamic values; an empty string means "ask the user"
    pub dynamic_param_values: Vec<String>,
    /// Indices of dynamic parameters whose submitted values are remembered
    pub dynamic_param_persist: Vec<usize>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: AuthKind::Basic,
            user_name: None,
            password: None,
            domain: None,
            prompt_user_name: false,
            prompt_password: false,
            persist_user_name: false,
            persist_password: false,
            session_timeout_minutes: 25,
            login_url: None,
            static_param_names: Vec::new(),
            static_param_values: Vec::new(),
            dynamic_param_names: Vec::new(),
            dynamic_param_values: Vec::new(),
            dynamic_param_persist: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn uses(&self, kind: AuthKind) -> bool {
        self.enabled && self.kind == kind
    }

    pub fn session_timeout(&self) -> Result<chrono::Duration, ConfigError> {
        chrono::Duration::try_minutes(self.session_timeout_minutes).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "auth.session_timeout_minutes = {} is out of range",
                self.session_timeout_minutes
            ))
        })
    }

    pub fn login_url(&self) -> Option<&str> {
        non_empty(self.login_url.as_deref())
    }

    /// Configured value of the dynamic parameter at `index`, if any.
    pub fn dynamic_value(&self, index: usize) -> Option<&str> {
        non_empty(self.dynamic_param_values.get(index).map(String::as_str))
    }

    /// Static login parameters; a missing value is sent as an empty string.
    pub fn static_params(&self) -> Vec<(String, String)> {
        self.static_param_names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let value = self.static_param_values.get(i).cloned().unwrap_or_default();
                (name.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parses_lowercase() {
        let config: AuthConfig = toml::from_str("enabled = true\nkind = \"ntlm\"").unwrap();
        assert!(config.uses(AuthKind::Ntlm));
        assert!(!config.uses(AuthKind::Basic));
    }

    #[test]
    fn test_session_timeout_out_of_range() {
        let config = AuthConfig {
            session_timeout_minutes: i64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.session_timeout(), Err(ConfigError::Invalid(_))));
        assert_eq!(
            AuthConfig::default().session_timeout().unwrap(),
            chrono::Duration::minutes(25)
        );
    }

    #[test]
    fn test_disabled_auth_uses_nothing() {
        let config = AuthConfig {
            kind: AuthKind::Form,
            ..Default::default()
        };
        assert!(!config.uses(AuthKind::Form));
    }

    #[test]
    fn test_static_params_pad_missing_values() {
        let config = AuthConfig {
            static_param_names: vec!["realm".into(), "lang".into()],
            static_param_values: vec!["staff".into()],
            ..Default::default()
        };
        assert_eq!(
            config.static_params(),
            vec![
                ("realm".to_string(), "staff".to_string()),
                ("lang".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_empty_dynamic_value_is_absent() {
        let config = AuthConfig {
            dynamic_param_names: vec!["user".into(), "pin".into()],
            dynamic_param_values: vec!["jdoe".into(), String::new()],
            ..Default::default()
        };
        assert_eq!(config.dynamic_value(0), Some("jdoe"));
        assert_eq!(config.dynamic_value(1), None);
        assert_eq!(config.dynamic_value(2), None);
    }
}
