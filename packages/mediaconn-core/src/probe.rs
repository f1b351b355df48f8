//! Server liveness probe.
//!
//! The resolver asks each candidate address "who are you?" through the
//! [`CapabilityProbe`] seam. [`HttpCapabilityProbe`] answers it with the
//! server's system info endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::context::{ClientContext, UrlBuilder, AUTHORIZATION_HEADER};
use crate::error::ErrorCode;
use crate::model::{ProbedInfo, PublicSystemInfo, SystemInfo};
use crate::utils::non_blank;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from a single probe attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Connection could not be established.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// No answer within the allotted time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Server answered with a non-success status.
    #[error("HTTP error {0}")]
    HttpStatus(u16),

    /// Response body was not valid system info.
    #[error("invalid response: {0}")]
    Parse(String),
}

impl ErrorCode for ProbeError {
    fn code(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "probe_unreachable",
            Self::Timeout(_) => "probe_timeout",
            Self::HttpStatus(_) => "probe_http_status",
            Self::Parse(_) => "probe_parse",
        }
    }
}

/// Result type for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Probe Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Lightweight "is this server alive" call against one address.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Fetches the server's self-description from `address`.
    ///
    /// With an access token the full description is requested; without one
    /// only the public part.
    async fn get_public_system_info(
        &self,
        address: &str,
        access_token: Option<&str>,
        timeout: Duration,
    ) -> ProbeResult<ProbedInfo>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// [`CapabilityProbe`] over HTTP(S).
#[derive(Clone)]
pub struct HttpCapabilityProbe {
    client: Client,
    context: ClientContext,
}

impl HttpCapabilityProbe {
    /// Creates a probe that identifies itself with `context`.
    pub fn new(client: Client, context: ClientContext) -> Self {
        Self { client, context }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: String,
        access_token: Option<&str>,
    ) -> ProbeResult<T> {
        let mut request = self.client.get(&url).header("Accept", "application/json");
        if access_token.is_some() {
            request = request.header(
                AUTHORIZATION_HEADER,
                self.context.authorization_header(access_token),
            );
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProbeError::Unreachable(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::HttpStatus(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProbeError::Parse(e.to_string()))
    }

    async fn probe(&self, address: &str, access_token: Option<&str>) -> ProbeResult<ProbedInfo> {
        let urls = UrlBuilder::new(address);

        if let Some(token) = non_blank(access_token) {
            match self
                .fetch::<SystemInfo>(urls.system_info_url(), Some(token))
                .await
            {
                Ok(info) => return Ok(info.into()),
                Err(ProbeError::HttpStatus(code))
                    if code == StatusCode::UNAUTHORIZED.as_u16()
                        || code == StatusCode::FORBIDDEN.as_u16() =>
                {
                    log::debug!(
                        "[Probe] {} rejected token ({}), falling back to public info",
                        urls.base_url(),
                        code
                    );
                }
                Err(e) => return Err(e),
            }
        }

        self.fetch::<PublicSystemInfo>(urls.public_info_url(), None)
            .await
            .map(ProbedInfo::from)
    }
}

#[async_trait]
impl CapabilityProbe for HttpCapabilityProbe {
    async fn get_public_system_info(
        &self,
        address: &str,
        access_token: Option<&str>,
        timeout: Duration,
    ) -> ProbeResult<ProbedInfo> {
        tokio::time::timeout(timeout, self.probe(address, access_token))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
    }
}
