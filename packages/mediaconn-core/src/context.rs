//! Client identity and URL construction.
//!
//! [`ClientContext`] bundles the device identity that the server sees in
//! authorization headers and on the event socket. [`UrlBuilder`] derives the
//! probe and socket endpoints from one server address.

use reqwest::Url;

use crate::transport::{TransportError, TransportResult};

/// Device identity sent with every authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientContext {
    pub client_name: String,
    pub client_version: String,
    pub device_name: String,
    pub device_id: String,
}

impl ClientContext {
    /// Builds the `X-Emby-Authorization` header value.
    ///
    /// The token part is omitted when no access token is known.
    #[must_use]
    pub fn authorization_header(&self, access_token: Option<&str>) -> String {
        let mut header = format!(
            "MediaBrowser Client=\"{}\", Device=\"{}\", DeviceId=\"{}\", Version=\"{}\"",
            self.client_name, self.device_name, self.device_id, self.client_version
        );
        if let Some(token) = crate::utils::non_blank(access_token) {
            header.push_str(&format!(", Token=\"{token}\""));
        }
        header
    }
}

/// Name of the authorization header understood by the server.
pub const AUTHORIZATION_HEADER: &str = "X-Emby-Authorization";

/// Builder for the endpoints of one server address.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    base: String,
}

impl UrlBuilder {
    /// Creates a builder for `address`, dropping surrounding whitespace and
    /// trailing slashes.
    pub fn new(address: &str) -> Self {
        Self {
            base: address.trim().trim_end_matches('/').to_string(),
        }
    }

    /// Returns the normalised base address.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Returns the unauthenticated system info URL.
    #[must_use]
    pub fn public_info_url(&self) -> String {
        format!("{}/System/Info/Public", self.base)
    }

    /// Returns the authenticated system info URL.
    #[must_use]
    pub fn system_info_url(&self) -> String {
        format!("{}/System/Info", self.base)
    }

    /// Returns the event socket URL.
    ///
    /// The scheme is switched to `ws`/`wss`; the access token (when known)
    /// and the device id travel as query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the base address is not a
    /// valid absolute URL.
    pub fn websocket_url(
        &self,
        access_token: Option<&str>,
        device_id: &str,
    ) -> TransportResult<String> {
        let mut url = Url::parse(&format!("{}/socket", self.base))
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {e}", self.base)))?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // Switching between special schemes always succeeds.
        let _ = url.set_scheme(scheme);

        {
            let mut query = url.query_pairs_mut();
            if let Some(token) = crate::utils::non_blank(access_token) {
                query.append_pair("api_key", token);
            }
            query.append_pair("deviceId", device_id);
        }
        Ok(url.into())
    }
}
