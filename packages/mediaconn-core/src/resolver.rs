//! Address resolution.
//!
//! Given a [`ServerRecord`], [`AddressResolver`] probes every configured
//! address concurrently and picks the best reachable one. Preference order
//! is the record's last successful mode, then Local, Remote, Manual. A
//! preferred address wins even when a less preferred one answers first, so
//! the resolver only returns once every better-ranked probe has failed.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_PROBE_TIMEOUT_MS;
use crate::crypto::CryptoProvider;
use crate::error::ErrorCode;
use crate::model::{ConnectionMode, ProbedInfo, ServerRecord};
use crate::probe::{CapabilityProbe, ProbeError};
use crate::utils::{non_blank, now_millis};
use crate::wake::WakeOnLan;

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from a resolution run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The record has no non-empty address at all.
    #[error("no server address configured")]
    NoAddressConfigured,

    /// Every configured address failed or timed out.
    #[error("server unreachable ({} address(es) tried)", .0.len())]
    Unreachable(Vec<(ConnectionMode, ProbeError)>),

    /// The caller cancelled the run.
    #[error("resolution cancelled")]
    Cancelled,
}

impl ResolveError {
    /// Returns true if retrying later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoAddressConfigured => "no_address_configured",
            Self::Unreachable(_) => "unreachable",
            Self::Cancelled => "resolve_cancelled",
        }
    }
}

/// Result type for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & Output
// ─────────────────────────────────────────────────────────────────────────────

/// Resolver tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Upper bound for each address probe.
    pub probe_timeout: Duration,
    /// Send Wake-on-LAN packets before probing a local address that failed
    /// on the previous run.
    pub wake_on_lan: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            wake_on_lan: true,
        }
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub mode: ConnectionMode,
    pub address: String,
    pub info: ProbedInfo,
    /// Copy of the input record with the probe result merged in. The caller
    /// is responsible for persisting it.
    pub record: ServerRecord,
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// Removes a record's lock once the last run using it finishes.
struct InFlightSlot<'a> {
    in_flight: &'a DashMap<String, Arc<Mutex<()>>>,
    key: &'a str,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        // Only the map's reference left: nobody holds or waits for the lock.
        self.in_flight
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Picks a live address for a server.
///
/// Runs for the same record are serialized; runs for different records
/// proceed in parallel.
pub struct AddressResolver {
    probe: Arc<dyn CapabilityProbe>,
    waker: Arc<dyn WakeOnLan>,
    crypto: Arc<dyn CryptoProvider>,
    config: ResolverConfig,
    /// One lock per record key.
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    /// Record keys whose local probe failed on the last run.
    local_failed: DashSet<String>,
}

impl AddressResolver {
    pub fn new(
        probe: Arc<dyn CapabilityProbe>,
        waker: Arc<dyn WakeOnLan>,
        crypto: Arc<dyn CryptoProvider>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            probe,
            waker,
            crypto,
            config,
            in_flight: DashMap::new(),
            local_failed: DashSet::new(),
        }
    }

    /// Returns the resolver configuration.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Returns the key used to serialize runs for `record`: its id, or the
    /// hex MD5 of its addresses when it has none yet.
    #[must_use]
    pub fn record_key(&self, record: &ServerRecord) -> String {
        if let Some(id) = non_blank(Some(record.id.as_str())) {
            return id.to_string();
        }
        let joined: String = [
            record.local_address.as_deref(),
            record.remote_address.as_deref(),
            record.manual_address.as_deref(),
        ]
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect();
        hex::encode(self.crypto.md5(joined.as_bytes()))
    }

    /// Probes `record`'s addresses and selects one.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::NoAddressConfigured`] without any network I/O when
    ///   the record has no address.
    /// - [`ResolveError::Unreachable`] when every probe failed or timed out.
    /// - [`ResolveError::Cancelled`] when `cancel` fires first.
    pub async fn resolve(
        &self,
        record: &ServerRecord,
        cancel: &CancellationToken,
    ) -> ResolveResult<Resolution> {
        let candidates = record.probe_candidates();
        if candidates.is_empty() {
            log::warn!("[Resolver] Record '{}' has no address configured", record.name);
            return Err(ResolveError::NoAddressConfigured);
        }

        let key = self.record_key(record);
        // Declared before the lock so it drops after the guard and our clone.
        let _slot = InFlightSlot {
            in_flight: &self.in_flight,
            key: &key,
        };
        let lock = self.in_flight.entry(key.clone()).or_default().clone();
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
            guard = lock.lock() => guard,
        };

        if candidates.iter().any(|(mode, _)| *mode == ConnectionMode::Local) {
            self.wake_if_needed(&key, record).await;
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!("[Resolver] Resolution of {} cancelled", key);
                return Err(ResolveError::Cancelled);
            }
            outcome = self.probe_all(record, &candidates) => outcome,
        };

        match &outcome.local {
            Some(true) => {
                self.local_failed.remove(&key);
            }
            Some(false) => {
                self.local_failed.insert(key.clone());
            }
            None => {}
        }

        let Some((rank, info)) = outcome.winner else {
            log::info!("[Resolver] No reachable address for {}", key);
            return Err(ResolveError::Unreachable(outcome.failures));
        };
        let (mode, address) = candidates[rank].clone();

        let mut updated = record.clone();
        updated.import_info(&info);
        updated.last_connection_mode = Some(mode);
        updated.date_last_accessed = now_millis();

        log::info!(
            "[Resolver] Selected {} address {} for '{}'",
            mode,
            address,
            updated.name
        );

        Ok(Resolution {
            mode,
            address,
            info,
            record: updated,
        })
    }

    async fn wake_if_needed(&self, key: &str, record: &ServerRecord) {
        if !self.config.wake_on_lan
            || record.wake_on_lan_infos.is_empty()
            || !self.local_failed.contains(key)
        {
            return;
        }

        for info in &record.wake_on_lan_infos {
            if let Err(e) = self.waker.wake(info).await {
                log::warn!(
                    "[WakeOnLan] Failed to wake {} ({}): {}",
                    key,
                    info.mac_address,
                    e
                );
            }
        }
    }

    /// Probes every candidate concurrently and applies preference order.
    async fn probe_all(
        &self,
        record: &ServerRecord,
        candidates: &[(ConnectionMode, String)],
    ) -> ProbeOutcome {
        let token = non_blank(record.access_token.as_deref());
        let timeout = self.config.probe_timeout;

        let mut pending: FuturesUnordered<_> = candidates
            .iter()
            .enumerate()
            .map(|(rank, (mode, address))| {
                let probe = &self.probe;
                async move {
                    let result = tokio::time::timeout(
                        timeout,
                        probe.get_public_system_info(address, token, timeout),
                    )
                    .await
                    .unwrap_or(Err(ProbeError::Timeout(timeout)));

                    match &result {
                        Ok(_) => log::debug!("[Resolver] {} probe {} ok", mode, address),
                        Err(e) => log::debug!("[Resolver] {} probe {} failed: {}", mode, address, e),
                    }
                    (rank, result)
                }
            })
            .collect();

        let mut results: Vec<Option<Result<ProbedInfo, ProbeError>>> =
            vec![None; candidates.len()];

        let winner = loop {
            let Some((rank, result)) = pending.next().await else {
                break None;
            };
            results[rank] = Some(result);

            match decide(&results) {
                Decision::Pending => continue,
                Decision::AllFailed => break None,
                Decision::Winner(rank) => match &results[rank] {
                    Some(Ok(info)) => break Some((rank, info.clone())),
                    _ => break None,
                },
            }
        };

        let local = candidates
            .iter()
            .position(|(mode, _)| *mode == ConnectionMode::Local)
            .and_then(|i| results[i].as_ref())
            .map(Result::is_ok);

        let failures = candidates
            .iter()
            .zip(&results)
            .filter_map(|((mode, _), result)| match result {
                Some(Err(e)) => Some((*mode, e.clone())),
                _ => None,
            })
            .collect();

        ProbeOutcome {
            winner,
            local,
            failures,
        }
    }
}

struct ProbeOutcome {
    winner: Option<(usize, ProbedInfo)>,
    /// Whether the local probe succeeded, if it finished.
    local: Option<bool>,
    failures: Vec<(ConnectionMode, ProbeError)>,
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Pending,
    Winner(usize),
    AllFailed,
}

/// Walks results in preference order: the first success wins once every
/// better-ranked probe has failed.
fn decide(results: &[Option<Result<ProbedInfo, ProbeError>>]) -> Decision {
    for (rank, result) in results.iter().enumerate() {
        match result {
            None => return Decision::Pending,
            Some(Ok(_)) => return Decision::Winner(rank),
            Some(Err(_)) => {}
        }
    }
    Decision::AllFailed
}
