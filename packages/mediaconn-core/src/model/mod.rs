//! Data model: known servers, their addresses and what a probe reports.
//!
//! - `server` - [`ServerRecord`], [`ConnectionMode`] and Wake-on-LAN hints
//! - `credentials` - [`ServerCredentials`], the persisted set of servers
//! - `system_info` - Public/full server descriptions returned by probes

pub mod credentials;
pub mod server;
pub mod system_info;

pub use credentials::ServerCredentials;
pub use server::{
    ConnectionMode, ServerRecord, ServerRecordError, UserLinkType, WakeOnLanInfo,
    DEFAULT_WAKE_ON_LAN_PORT,
};
pub use system_info::{ProbedInfo, PublicSystemInfo, SystemInfo};
