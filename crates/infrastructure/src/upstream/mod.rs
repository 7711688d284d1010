mod dispatcher;
mod servfail;
mod transport;
pub mod wire;

pub use dispatcher::DnsUpstreamDispatcher;
pub use servfail::ServfailTracker;
