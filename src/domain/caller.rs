use serde::{Deserialize, Serialize};

/// Parameter names with this prefix belong to the proxy itself and are never
/// forwarded to the origin.
pub const RESERVED_PARAM_PREFIX: &str = "__wp_";

/// Present when the submitted form used GET; its parameters then belong in
/// the query string instead of a request body.
pub const GET_FORM_PARAM: &str = "__wp_getMethod";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
        }
    }
}

/// The inbound exchange being served.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// Key into the session store
    pub session_id: String,
    /// Identity of the embedding instance, used for per-caller cache keys
    pub instance_id: String,
    /// Address of the end user, forwarded for NTLM and `forwarded-for`
    pub remote_host: Option<String>,
    /// Page requested by the caller, overriding session and configuration
    pub url: Option<String>,
    pub method: Method,
    /// Parameters the caller submitted, in submission order
    pub form_params: Vec<(String, String)>,
    /// CAS proxy ticket supplied by the embedding portal
    pub proxy_ticket: Option<String>,
}

impl CallerContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        Self {
            instance_id: session_id.clone(),
            session_id,
            ..Default::default()
        }
    }

    /// Submitted parameters that may be forwarded to the origin.
    pub fn forwardable_params(&self) -> Vec<(String, String)> {
        self.form_params
            .iter()
            .filter(|(name, _)| !name.starts_with(RESERVED_PARAM_PREFIX))
            .cloned()
            .collect()
    }

    pub fn submits_get_form(&self) -> bool {
        self.form_params.iter().any(|(name, _)| name == GET_FORM_PARAM)
    }
}
