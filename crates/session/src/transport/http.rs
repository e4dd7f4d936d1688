// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! reqwest-backed [`Transport`] talking to the backend over HTTP.

use std::time::Duration;

use reqwest::{Client, Method};

use crate::envelope::Envelope;
use crate::transport::{ApiRequest, Transport, TransportFuture};

/// HTTP client wrapper for the backend API.
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        // reqwest is built without a bundled provider; an already-installed
        // provider is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, request: &ApiRequest) -> String {
        let mut url = format!("{}{}", self.base_url, request.path);
        if request.method == Method::GET {
            if let Some(query) = request.body.as_ref().map(query_string).filter(|q| !q.is_empty())
            {
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            }
        }
        url
    }

    async fn send(&self, request: ApiRequest) -> anyhow::Result<Envelope<serde_json::Value>> {
        let mut req = self.client.request(request.method.clone(), self.url(&request));
        if request.method != Method::GET {
            if let Some(ref body) = request.body {
                req = req.json(body);
            }
        }
        if let Some(ref token) = request.bearer {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        // Error statuses still count when the body is a well-formed envelope.
        match serde_json::from_slice::<Envelope<serde_json::Value>>(&bytes) {
            Ok(envelope) => Ok(envelope),
            Err(e) if status.is_success() => {
                anyhow::bail!("malformed response envelope ({status}): {e}")
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&bytes);
                anyhow::bail!("request failed ({status}): {text}")
            }
        }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
        Box::pin(self.send(request))
    }
}

/// Encode a JSON object as URL query pairs. Null fields are skipped.
pub fn query_string(params: &serde_json::Value) -> String {
    let Some(map) = params.as_object() else {
        return String::new();
    };
    map.iter()
        .filter_map(|(k, v)| {
            let value = match v {
                serde_json::Value::Null => return None,
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(format!("{}={}", urlencoding(k), urlencoding(&value)))
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn urlencoding(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
