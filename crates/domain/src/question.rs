//! The question a client asks and the key derived from it.

use std::fmt;
use std::str::FromStr;

/// DNS record type. Forwarding resolvers must pass through query types they
/// don't specifically reason about, so unrecognized codes are preserved
/// rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    TXT,
    PTR,
    SRV,
    SOA,
    NS,
    NAPTR,
    SVCB,
    HTTPS,
    CAA,
    TLSA,
    SSHFP,
    DNAME,
    NULL,
    HINFO,
    ANY,
    /// Any record type not enumerated above, kept by its wire code so the
    /// pipeline can still forward and cache it.
    Other(u16),
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::PTR => "PTR",
            RecordType::SRV => "SRV",
            RecordType::SOA => "SOA",
            RecordType::NS => "NS",
            RecordType::NAPTR => "NAPTR",
            RecordType::SVCB => "SVCB",
            RecordType::HTTPS => "HTTPS",
            RecordType::CAA => "CAA",
            RecordType::TLSA => "TLSA",
            RecordType::SSHFP => "SSHFP",
            RecordType::DNAME => "DNAME",
            RecordType::NULL => "NULL",
            RecordType::HINFO => "HINFO",
            RecordType::ANY => "ANY",
            RecordType::Other(_) => "OTHER",
        }
    }

    pub fn to_u16(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::NULL => 10,
            RecordType::PTR => 12,
            RecordType::HINFO => 13,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::NAPTR => 35,
            RecordType::DNAME => 39,
            RecordType::SVCB => 64,
            RecordType::HTTPS => 65,
            RecordType::CAA => 257,
            RecordType::TLSA => 52,
            RecordType::SSHFP => 44,
            RecordType::ANY => 255,
            RecordType::Other(code) => *code,
        }
    }

    pub fn from_u16(code: u16) -> Self {
        match code {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            10 => RecordType::NULL,
            12 => RecordType::PTR,
            13 => RecordType::HINFO,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            35 => RecordType::NAPTR,
            39 => RecordType::DNAME,
            44 => RecordType::SSHFP,
            52 => RecordType::TLSA,
            64 => RecordType::SVCB,
            65 => RecordType::HTTPS,
            255 => RecordType::ANY,
            257 => RecordType::CAA,
            other => RecordType::Other(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Other(code) => write!(f, "TYPE{code}"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "MX" => Ok(RecordType::MX),
            "TXT" => Ok(RecordType::TXT),
            "PTR" => Ok(RecordType::PTR),
            "SRV" => Ok(RecordType::SRV),
            "SOA" => Ok(RecordType::SOA),
            "NS" => Ok(RecordType::NS),
            "NAPTR" => Ok(RecordType::NAPTR),
            "SVCB" => Ok(RecordType::SVCB),
            "HTTPS" => Ok(RecordType::HTTPS),
            "CAA" => Ok(RecordType::CAA),
            "TLSA" => Ok(RecordType::TLSA),
            "SSHFP" => Ok(RecordType::SSHFP),
            "DNAME" => Ok(RecordType::DNAME),
            "NULL" => Ok(RecordType::NULL),
            "HINFO" => Ok(RecordType::HINFO),
            "ANY" => Ok(RecordType::ANY),
            other => other
                .strip_prefix("TYPE")
                .and_then(|n| n.parse().ok())
                .map(RecordType::Other)
                .ok_or_else(|| format!("unknown record type: {s}")),
        }
    }
}

/// qname_normalized + qtype + qclass, the unit of work the pipeline resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    pub qname: String,
    pub qtype: RecordType,
    pub qclass: u16,
}

/// Lowercases, strips a single trailing dot and surrounding whitespace.
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(name: &str) -> String {
    let trimmed = name.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

impl Question {
    pub const CLASS_IN: u16 = 1;

    pub fn new(qname: &str, qtype: RecordType, qclass: u16) -> Self {
        Self {
            qname: normalize(qname),
            qtype,
            qclass,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.qname, self.qtype, self.qclass)
    }
}

/// Textual fingerprint `"dns:" + qname + ":" + qtype + ":" + qclass`.
/// Round-trips through [`CacheKey::parse`] / [`fmt::Display`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn new(qname: &str, qtype: RecordType, qclass: u16) -> Self {
        Self(format!("dns:{qname}:{}:{qclass}", qtype.to_u16()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses a previously formatted key back into its parts.
    pub fn parse(s: &str) -> Option<(String, RecordType, u16)> {
        let rest = s.strip_prefix("dns:")?;
        let mut parts = rest.rsplitn(3, ':');
        let qclass: u16 = parts.next()?.parse().ok()?;
        let qtype_code: u16 = parts.next()?.parse().ok()?;
        let qname = parts.next()?.to_string();
        if parts.next().is_some() {
            return None;
        }
        Some((qname, RecordType::from_u16(qtype_code), qclass))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
