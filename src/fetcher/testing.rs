//! Scripted transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::app::{ProxyError, Result};
use crate::fetcher::{FetchResult, OutboundRequest, Transport};

pub(crate) enum Scripted {
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Timeout,
}

impl Scripted {
    pub(crate) fn ok(content_type: &str, body: &str) -> Self {
        Scripted::Respond {
            status: 200,
            headers: vec![("Content-Type".into(), content_type.into())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub(crate) fn redirect(status: u16, location: &str) -> Self {
        Scripted::Respond {
            status,
            headers: vec![("Location".into(), location.into())],
            body: Vec::new(),
        }
    }
}

/// Replays canned responses in order and records every request it receives.
/// Once the script runs out, `fallback` (if any) answers every request.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<u16>,
    sent: Mutex<Vec<OutboundRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    /// Answer every request with a redirect to a fresh `/hop/<n>` path.
    pub(crate) fn redirecting_forever(status: u16) -> Self {
        Self {
            fallback: Some(status),
            ..Default::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutboundRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<FetchResult> {
        let hop = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(request.clone());
            sent.len()
        };
        let url = request.target.url.clone();

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Respond {
                status,
                headers,
                body,
            }) => Ok(FetchResult::from_bytes(status, headers, url, body)),
            Some(Scripted::Timeout) => Err(ProxyError::Timeout(url)),
            None => match &self.fallback {
                Some(status) => Ok(FetchResult::from_bytes(
                    *status,
                    vec![("Location".into(), format!("/hop/{}", hop))],
                    url,
                    Vec::new(),
                )),
                None => Err(ProxyError::Config(format!("no scripted response for {}", url))),
            },
        }
    }
}
