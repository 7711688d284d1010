//! Configuration: §6's table as nested sections, loaded via `toml` and
//! hot-edited in place via `toml_edit` (see [`root::Config::save`]).

mod blocklists;
mod cache;
mod client_groups;
mod client_identification;
mod errors;
mod local_records;
mod logging;
mod query_log;
mod response;
mod root;
mod server;
mod upstream;

pub use blocklists::BlocklistsConfig;
pub use cache::CacheConfig;
pub use client_groups::{ClientGroupConfig, GroupBlocklistConfig, ScheduleConfig};
pub use client_identification::{ClientEntry, ClientIdentificationConfig};
pub use errors::ConfigError;
pub use local_records::LocalRecord;
pub use logging::LoggingConfig;
pub use query_log::QueryLogConfig;
pub use response::{BlockedResponse, ResponseConfig};
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
pub use upstream::{ResolverConfig, UpstreamDef};
