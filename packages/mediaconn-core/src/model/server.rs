//! Persisted knowledge about one media server.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorCode;
use crate::model::system_info::ProbedInfo;
use crate::utils::{merge_non_blank, non_blank};

/// Default UDP port for Wake-on-LAN magic packets.
pub const DEFAULT_WAKE_ON_LAN_PORT: u16 = 9;

/// Which of a server's candidate addresses is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionMode {
    /// LAN address.
    Local,
    /// WAN address.
    Remote,
    /// Address entered by the user.
    Manual,
}

impl ConnectionMode {
    /// Fixed tie-break order used after the last successful mode.
    pub const PREFERENCE: [ConnectionMode; 3] = [Self::Local, Self::Remote, Self::Manual];

    /// Returns every mode in probe order: `last` first, then the fixed order.
    #[must_use]
    pub fn probe_order(last: Option<ConnectionMode>) -> Vec<ConnectionMode> {
        let mut order = Vec::with_capacity(Self::PREFERENCE.len());
        if let Some(last) = last {
            order.push(last);
        }
        for mode in Self::PREFERENCE {
            if !order.contains(&mode) {
                order.push(mode);
            }
        }
        order
    }
}

impl std::fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// How the signed-in user is linked to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UserLinkType {
    LinkedUser,
    Guest,
}

/// A MAC address used to power on a sleeping server before probing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeOnLanInfo {
    pub mac_address: String,
    #[serde(default = "default_wake_port")]
    pub port: u16,
}

fn default_wake_port() -> u16 {
    DEFAULT_WAKE_ON_LAN_PORT
}

impl WakeOnLanInfo {
    /// Creates a hint for the default port.
    pub fn new(mac_address: impl Into<String>) -> Self {
        Self {
            mac_address: mac_address.into(),
            port: DEFAULT_WAKE_ON_LAN_PORT,
        }
    }
}

/// Errors raised by [`ServerRecord`] accessors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerRecordError {
    /// The record has no address for the requested mode.
    #[error("no {0} address configured")]
    InvalidMode(ConnectionMode),
}

impl ErrorCode for ServerRecordError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidMode(_) => "invalid_mode",
        }
    }
}

/// One known server and its candidate addresses.
///
/// The durable copy is owned by the credential store; sessions hold a
/// transient clone and write it back after a successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerRecord {
    /// Stable server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Federation identifier, if the server is linked to a connect service.
    pub connect_server_id: Option<String>,

    pub local_address: Option<String>,
    pub remote_address: Option<String>,
    pub manual_address: Option<String>,

    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub exchange_token: Option<String>,
    pub user_link_type: Option<UserLinkType>,

    /// Ordered Wake-on-LAN hints, tried before probing the local address.
    pub wake_on_lan_infos: Vec<WakeOnLanInfo>,
    /// Unix milliseconds of the last successful connection.
    pub date_last_accessed: u64,
    /// Mode that last succeeded, probed first next time.
    pub last_connection_mode: Option<ConnectionMode>,
}

impl ServerRecord {
    /// Creates a record that only knows a manually entered address.
    pub fn manual(address: impl Into<String>) -> Self {
        Self {
            manual_address: Some(address.into()),
            ..Self::default()
        }
    }

    /// Returns the non-empty address for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerRecordError::InvalidMode`] if that mode's field is empty.
    pub fn address(&self, mode: ConnectionMode) -> Result<&str, ServerRecordError> {
        let field = match mode {
            ConnectionMode::Local => self.local_address.as_deref(),
            ConnectionMode::Remote => self.remote_address.as_deref(),
            ConnectionMode::Manual => self.manual_address.as_deref(),
        };
        non_blank(field).ok_or(ServerRecordError::InvalidMode(mode))
    }

    /// Returns `true` if at least one address field is non-empty.
    #[must_use]
    pub fn has_address(&self) -> bool {
        ConnectionMode::PREFERENCE
            .iter()
            .any(|mode| self.address(*mode).is_ok())
    }

    /// Returns `true` if the record carries an access token.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        non_blank(self.access_token.as_deref()).is_some()
    }

    /// Returns `(mode, address)` pairs in probe order, skipping empty modes.
    #[must_use]
    pub fn probe_candidates(&self) -> Vec<(ConnectionMode, String)> {
        ConnectionMode::probe_order(self.last_connection_mode)
            .into_iter()
            .filter_map(|mode| {
                self.address(mode)
                    .ok()
                    .map(|address| (mode, address.to_string()))
            })
            .collect()
    }

    /// Merges freshly probed server info into the record.
    ///
    /// - `name` and `id` are always overwritten.
    /// - `local_address` / `remote_address` are only overwritten by non-empty values.
    /// - A full (authenticated) response replaces the Wake-on-LAN hints with a
    ///   single entry for the reported MAC, or clears them when no MAC is reported.
    ///   A public-only response leaves hints untouched.
    pub fn import_info(&mut self, info: &ProbedInfo) {
        let public = info.public();
        self.name = public.server_name.clone();
        self.id = public.id.clone();

        merge_non_blank(&mut self.local_address, public.local_address.as_deref());
        merge_non_blank(&mut self.remote_address, public.wan_address.as_deref());

        if let Some(full) = info.full() {
            self.wake_on_lan_infos = non_blank(full.mac_address.as_deref())
                .map(|mac| vec![WakeOnLanInfo::new(mac)])
                .unwrap_or_default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::system_info::{PublicSystemInfo, SystemInfo};

    fn public(name: &str, id: &str, local: Option<&str>, wan: Option<&str>) -> PublicSystemInfo {
        PublicSystemInfo {
            server_name: name.to_string(),
            id: id.to_string(),
            local_address: local.map(str::to_string),
            wan_address: wan.map(str::to_string),
            version: None,
        }
    }

    #[test]
    fn probe_order_puts_last_mode_first() {
        assert_eq!(
            ConnectionMode::probe_order(None),
            vec![
                ConnectionMode::Local,
                ConnectionMode::Remote,
                ConnectionMode::Manual
            ]
        );
        assert_eq!(
            ConnectionMode::probe_order(Some(ConnectionMode::Manual)),
            vec![
                ConnectionMode::Manual,
                ConnectionMode::Local,
                ConnectionMode::Remote
            ]
        );
    }

    #[test]
    fn address_rejects_empty_mode() {
        let record = ServerRecord {
            local_address: Some("http://192.168.1.5:8096".into()),
            remote_address: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(
            record.address(ConnectionMode::Local),
            Ok("http://192.168.1.5:8096")
        );
        assert_eq!(
            record.address(ConnectionMode::Remote),
            Err(ServerRecordError::InvalidMode(ConnectionMode::Remote))
        );
        assert_eq!(
            record.address(ConnectionMode::Manual),
            Err(ServerRecordError::InvalidMode(ConnectionMode::Manual))
        );
        assert!(record.has_address());
        assert!(!ServerRecord::default().has_address());
    }

    #[test]
    fn probe_candidates_skip_empty_modes() {
        let record = ServerRecord {
            local_address: Some("http://192.168.1.5:8096".into()),
            manual_address: Some("http://media.lan:8096".into()),
            last_connection_mode: Some(ConnectionMode::Manual),
            ..Default::default()
        };
        assert_eq!(
            record.probe_candidates(),
            vec![
                (ConnectionMode::Manual, "http://media.lan:8096".to_string()),
                (ConnectionMode::Local, "http://192.168.1.5:8096".to_string()),
            ]
        );
    }

    #[test]
    fn import_info_overwrites_identity() {
        let mut record = ServerRecord {
            id: "old".into(),
            name: "Old".into(),
            ..Default::default()
        };
        record.import_info(&public("Den", "abc123", None, None).into());
        assert_eq!(record.name, "Den");
        assert_eq!(record.id, "abc123");
    }

    #[test]
    fn import_info_never_clears_known_addresses() {
        let mut record = ServerRecord {
            local_address: Some("http://192.168.1.5:8096".into()),
            remote_address: Some("https://example.com:443".into()),
            ..Default::default()
        };

        for _ in 0..3 {
            record.import_info(&public("Den", "abc123", Some(""), None).into());
        }

        assert_eq!(record.local_address.as_deref(), Some("http://192.168.1.5:8096"));
        assert_eq!(record.remote_address.as_deref(), Some("https://example.com:443"));

        record.import_info(&public("Den", "abc123", Some("http://10.0.0.9:8096"), None).into());
        assert_eq!(record.local_address.as_deref(), Some("http://10.0.0.9:8096"));
    }

    #[test]
    fn import_public_info_keeps_wake_hints() {
        let mut record = ServerRecord {
            wake_on_lan_infos: vec![WakeOnLanInfo::new("00:11:22:33:44:55")],
            ..Default::default()
        };
        record.import_info(&public("Den", "abc123", None, None).into());
        assert_eq!(record.wake_on_lan_infos.len(), 1);
    }

    #[test]
    fn import_full_info_replaces_wake_hints() {
        let mut record = ServerRecord {
            wake_on_lan_infos: vec![
                WakeOnLanInfo::new("00:11:22:33:44:55"),
                WakeOnLanInfo::new("66:77:88:99:AA:BB"),
            ],
            ..Default::default()
        };
        let full = SystemInfo {
            public: public("Den", "abc123", None, None),
            mac_address: Some("AA:BB:CC:DD:EE:FF".into()),
            ..Default::default()
        };
        record.import_info(&full.into());
        assert_eq!(
            record.wake_on_lan_infos,
            vec![WakeOnLanInfo::new("AA:BB:CC:DD:EE:FF")]
        );
    }

    #[test]
    fn import_full_info_without_mac_clears_wake_hints() {
        let mut record = ServerRecord {
            wake_on_lan_infos: vec![WakeOnLanInfo::new("00:11:22:33:44:55")],
            ..Default::default()
        };
        let full = SystemInfo {
            public: public("Den", "abc123", None, None),
            mac_address: Some(String::new()),
            ..Default::default()
        };
        record.import_info(&full.into());
        assert!(record.wake_on_lan_infos.is_empty());
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = ServerRecord {
            id: "abc123".into(),
            name: "Den".into(),
            local_address: Some("http://192.168.1.5:8096".into()),
            last_connection_mode: Some(ConnectionMode::Local),
            wake_on_lan_infos: vec![WakeOnLanInfo::new("00:11:22:33:44:55")],
            ..Default::default()
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"lastConnectionMode\":\"local\""));
        let parsed: ServerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
