//! The persisted set of known servers.

use serde::{Deserialize, Serialize};

use crate::model::server::ServerRecord;
use crate::utils::{merge_non_blank, non_blank};

/// Every server the client has connected to, plus connect-service identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerCredentials {
    pub servers: Vec<ServerRecord>,
    pub connect_user_id: Option<String>,
    pub connect_access_token: Option<String>,
}

impl ServerCredentials {
    /// Inserts `server`, or merges it into the stored record with the same id.
    ///
    /// Merge rules: the newer access date wins; the link type is always taken;
    /// token, addresses and name only when the incoming value is non-empty;
    /// wake hints only when the incoming list is non-empty; the last
    /// connection mode only when set.
    ///
    /// Returns the stored record after the merge.
    pub fn add_or_update_server(&mut self, server: ServerRecord) -> &ServerRecord {
        let Some(index) = self.servers.iter().position(|s| s.id == server.id) else {
            self.servers.push(server);
            let last = self.servers.len() - 1;
            return &self.servers[last];
        };

        let existing = &mut self.servers[index];
        existing.date_last_accessed = existing.date_last_accessed.max(server.date_last_accessed);
        existing.user_link_type = server.user_link_type;

        if non_blank(server.access_token.as_deref()).is_some() {
            existing.access_token = server.access_token;
            existing.user_id = server.user_id;
        }

        merge_non_blank(&mut existing.exchange_token, server.exchange_token.as_deref());
        merge_non_blank(&mut existing.remote_address, server.remote_address.as_deref());
        merge_non_blank(
            &mut existing.connect_server_id,
            server.connect_server_id.as_deref(),
        );
        merge_non_blank(&mut existing.local_address, server.local_address.as_deref());
        merge_non_blank(&mut existing.manual_address, server.manual_address.as_deref());

        if let Some(name) = non_blank(Some(server.name.as_str())) {
            existing.name = name.to_string();
        }
        if !server.wake_on_lan_infos.is_empty() {
            existing.wake_on_lan_infos = server.wake_on_lan_infos;
        }
        if server.last_connection_mode.is_some() {
            existing.last_connection_mode = server.last_connection_mode;
        }

        existing
    }

    /// Returns the stored record with the given id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ServerRecord> {
        self.servers.iter().find(|s| s.id == id)
    }

    /// Removes the record with the given id, returning it if present.
    pub fn remove(&mut self, id: &str) -> Option<ServerRecord> {
        let index = self.servers.iter().position(|s| s.id == id)?;
        Some(self.servers.remove(index))
    }

    /// Returns servers ordered by most recent access first.
    #[must_use]
    pub fn servers_by_recency(&self) -> Vec<&ServerRecord> {
        let mut servers: Vec<_> = self.servers.iter().collect();
        servers.sort_by(|a, b| b.date_last_accessed.cmp(&a.date_last_accessed));
        servers
    }
}
