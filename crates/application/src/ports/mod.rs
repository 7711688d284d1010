pub mod blocklist;
pub mod l0_cache;
pub mod l1_store;
pub mod query_log;
pub mod upstream_dispatch;

pub use blocklist::BlocklistMatcher;
pub use l0_cache::{L0Cache, L0Stats};
pub use l1_store::{L1Stats, L1Store};
pub use query_log::QueryLogSink;
pub use upstream_dispatch::{DispatchOutcome, UpstreamDispatcher};
