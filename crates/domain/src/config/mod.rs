//! Startup configuration (§6, §9.3): one `Config` struct per the table's
//! sections, loaded via `toml` and hot-edited in place via `toml_edit`.

pub mod blocklists;
pub mod cache;
pub mod client_groups;
pub mod client_identification;
pub mod errors;
pub mod local_records;
pub mod logging;
pub mod query_log;
pub mod response;
pub mod root;
pub mod server;
pub mod upstream;

pub use blocklists::{BlocklistsConfig, ServiceDefinition};
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
