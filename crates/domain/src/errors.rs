use thiserror::Error;

/// Error kinds of §7. `PolicyBlocked` is deliberately absent: it is a
/// routing outcome (see [`crate::query_log::Outcome::Blocked`]), not a
/// failure.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("invalid upstream address: {0}")]
    InvalidUpstreamAddress(String),

    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    #[error("cache miss")]
    CacheMiss,

    #[error("cache fault: {0}")]
    CacheFault(String),

    #[error("upstream timeout")]
    UpstreamTimeout,

    #[error("upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("upstream refused (servfail/refused rcode)")]
    UpstreamRefused,

    #[error("all upstreams failed")]
    AllUpstreamsFailed,

    #[error("rate limited")]
    RateLimited,
}

impl ResolverError {
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            ResolverError::UpstreamTimeout
                | ResolverError::UpstreamProtocol(_)
                | ResolverError::UpstreamRefused
        )
    }
}
