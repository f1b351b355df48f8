//! MediaConn - headless client that keeps a live session to a media server.
//!
//! Picks a server (from the command line or the saved server list), resolves
//! the best reachable address, opens the event socket and logs every message
//! until interrupted. Lost connections are re-established with backoff.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mediaconn_core::{
    bootstrap_client, start_with_backoff, ConnectionSession, CredentialStore,
    JsonFileCredentialStore, ServerCredentials, ServerRecord, SessionEvent,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::CliConfig;

/// MediaConn - keep a live connection to a media server.
#[derive(Parser, Debug)]
#[command(name = "mediaconn")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "MEDIACONN_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Data directory holding the saved server list.
    #[arg(short = 'd', long, env = "MEDIACONN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Server address to connect to instead of the most recent saved one.
    #[arg(short = 's', long, env = "MEDIACONN_SERVER")]
    server: Option<String>,

    /// Access token for a server given with --server.
    #[arg(short = 't', long, env = "MEDIACONN_TOKEN")]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("MediaConn v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        CliConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = Some(data_dir);
    }

    let data_dir = config.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
    let store = Arc::new(JsonFileCredentialStore::in_dir(&data_dir));
    log::info!("Using server list: {}", store.path().display());

    let record = select_server(store.as_ref(), args.server, args.token).await?;

    let client = bootstrap_client(&config.client, store)
        .context("Failed to bootstrap client")?;
    let session = client.session(record);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, cleaning up...");
        signal_token.cancel();
    });

    let result = run(&session, &client.backoff_policy(), &shutdown).await;

    session.dispose();
    log::info!("Shutdown complete");
    result
}

/// Chooses the server from the command line or the saved list.
async fn select_server(
    store: &dyn CredentialStore,
    server: Option<String>,
    token: Option<String>,
) -> Result<ServerRecord> {
    let credentials = match store.get_server_credentials().await {
        Ok(credentials) => credentials,
        Err(e) => {
            log::warn!("Saved servers unavailable, continuing without them: {}", e);
            ServerCredentials::default()
        }
    };

    if let Some(address) = server {
        let address = address.trim().trim_end_matches('/').to_string();
        let saved = credentials.servers.iter().find(|s| {
            s.probe_candidates()
                .iter()
                .any(|(_, candidate)| candidate.trim_end_matches('/') == address)
        });

        let mut record = match saved {
            Some(saved) => saved.clone(),
            None => ServerRecord::manual(address),
        };
        if token.is_some() {
            record.access_token = token;
        }
        return Ok(record);
    }

    match credentials.servers_by_recency().first() {
        Some(record) => {
            log::info!("Using most recent server '{}' ({})", record.name, record.id);
            Ok((*record).clone())
        }
        None => bail!("No saved servers; pass --server <ADDRESS>"),
    }
}

/// Keeps the session open until `shutdown` fires.
async fn run(
    session: &ConnectionSession,
    policy: &mediaconn_core::BackoffPolicy,
    shutdown: &CancellationToken,
) -> Result<()> {
    let mut events = session.subscribe().context("Session already disposed")?;

    loop {
        if let Err(e) = start_with_backoff(session, policy, shutdown).await {
            if shutdown.is_cancelled() {
                return Ok(());
            }
            return Err(e).context("Failed to connect");
        }

        if let Ok(record) = session.record() {
            log::info!(
                "Connected to '{}' via {:?}",
                record.name,
                record.last_connection_mode
            );
        }

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                event = events.recv() => event,
            };

            match event {
                Some(SessionEvent::Message(frame)) => match frame.as_text() {
                    Some(text) => log::info!("<- {}", text),
                    None => log::info!("<- {} binary bytes", frame.payload.len()),
                },
                Some(SessionEvent::StateChanged(state)) => {
                    log::debug!("Session state: {}", state);
                }
                Some(SessionEvent::Disconnected) => {
                    log::warn!("Connection lost, reconnecting");
                    break;
                }
                None => return Ok(()),
            }
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrupt_store(dir: &tempfile::TempDir) -> JsonFileCredentialStore {
        let store = JsonFileCredentialStore::in_dir(dir.path());
        std::fs::write(store.path(), b"{ not json").unwrap();
        store
    }

    #[tokio::test]
    async fn corrupt_store_still_allows_explicit_server() {
        let dir = tempfile::tempdir().unwrap();
        let store = corrupt_store(&dir);

        let record = select_server(
            &store,
            Some("http://media.lan:8096/".to_string()),
            Some("token-1".to_string()),
        )
        .await
        .unwrap();

        assert_eq!(record.manual_address.as_deref(), Some("http://media.lan:8096"));
        assert_eq!(record.access_token.as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn corrupt_store_without_server_reports_no_saved_servers() {
        let dir = tempfile::tempdir().unwrap();
        let store = corrupt_store(&dir);

        let err = select_server(&store, None, None).await.unwrap_err();
        assert!(err.to_string().starts_with("No saved servers"));
    }
}
