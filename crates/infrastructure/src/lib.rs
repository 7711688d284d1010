//! Adapters implementing the application layer's ports (§4): cache tiers,
//! the blocklist matcher, the upstream dispatcher, the wire codec and the
//! query-log sink. Nothing in the application crate knows about any of
//! these concrete types directly — only the composition root in `cli`
//! wires them in.

pub mod blocklist;
pub mod cache;
pub mod codec;
pub mod query_log;
pub mod upstream;

pub use blocklist::BloomBlocklistMatcher;
pub use cache::{DashMapL1Store, LruL0Cache};
pub use query_log::ChannelQueryLogSink;
pub use upstream::{DnsUpstreamDispatcher, ServfailTracker};
