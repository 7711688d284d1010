//! DNS wire encode/decode for upstream exchanges, built on `hickory-proto`.
//! Generic over every [`RecordType`] the domain crate knows about — unlike
//! the old per-record-type byte-hacking fast path, this always round-trips
//! through a real [`Message`].

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable, BinEncoder};
use sentrydns_domain::{Question, RecordType, ResolverError};
use std::str::FromStr;

fn to_hickory_type(rt: RecordType) -> hickory_proto::rr::RecordType {
    match rt {
        RecordType::A => hickory_proto::rr::RecordType::A,
        RecordType::AAAA => hickory_proto::rr::RecordType::AAAA,
        RecordType::CNAME => hickory_proto::rr::RecordType::CNAME,
        RecordType::MX => hickory_proto::rr::RecordType::MX,
        RecordType::TXT => hickory_proto::rr::RecordType::TXT,
        RecordType::PTR => hickory_proto::rr::RecordType::PTR,
        RecordType::SRV => hickory_proto::rr::RecordType::SRV,
        RecordType::SOA => hickory_proto::rr::RecordType::SOA,
        RecordType::NS => hickory_proto::rr::RecordType::NS,
        RecordType::NAPTR => hickory_proto::rr::RecordType::NAPTR,
        RecordType::SVCB => hickory_proto::rr::RecordType::SVCB,
        RecordType::HTTPS => hickory_proto::rr::RecordType::HTTPS,
        RecordType::CAA => hickory_proto::rr::RecordType::CAA,
        RecordType::TLSA => hickory_proto::rr::RecordType::TLSA,
        RecordType::SSHFP => hickory_proto::rr::RecordType::SSHFP,
        RecordType::DNAME => hickory_proto::rr::RecordType::DNAME,
        RecordType::NULL => hickory_proto::rr::RecordType::NULL,
        RecordType::HINFO => hickory_proto::rr::RecordType::HINFO,
        RecordType::ANY => hickory_proto::rr::RecordType::ANY,
        RecordType::Other(n) => hickory_proto::rr::RecordType::Unknown(n),
    }
}

/// Builds a recursive query for `question`. Returns the wire ID (needed to
/// match the eventual response) plus the serialized bytes.
pub fn build_query(question: &Question) -> Result<(u16, Vec<u8>), ResolverError> {
    let name = Name::from_str(&question.qname)
        .map_err(|e| ResolverError::InvalidDomainName(format!("{}: {e}", question.qname)))?;

    let mut query = Query::new();
    query.set_name(name);
    query.set_query_type(to_hickory_type(question.qtype));
    query.set_query_class(DNSClass::from(question.qclass));

    let id = fastrand::u16(..);
    let mut message = Message::new(id, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(query);

    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    message
        .emit(&mut encoder)
        .map_err(|e| ResolverError::UpstreamProtocol(e.to_string()))?;
    Ok((id, buf))
}

/// A parsed upstream response: whether it counts as negative/SERVFAIL for
/// caching purposes, the minimum TTL across its answer records (`None` when
/// there are none to scan), plus the raw wire bytes to re-serve (with a
/// patched ID and rewritten TTLs) on a cache hit.
pub struct ParsedResponse {
    pub rcode_is_negative: bool,
    pub is_servfail: bool,
    pub min_answer_ttl: Option<u32>,
    pub raw: Vec<u8>,
}

pub fn parse_response(bytes: &[u8], expected_id: u16) -> Result<ParsedResponse, ResolverError> {
    let message = Message::from_vec(bytes)
        .map_err(|e| ResolverError::UpstreamProtocol(e.to_string()))?;

    if message.id() != expected_id {
        return Err(ResolverError::UpstreamProtocol(format!(
            "response id {} does not match query id {}",
            message.id(),
            expected_id
        )));
    }

    let rcode = message.response_code();
    if rcode == ResponseCode::ServFail {
        return Ok(ParsedResponse {
            rcode_is_negative: true,
            is_servfail: true,
            min_answer_ttl: None,
            raw: bytes.to_vec(),
        });
    }
    if rcode == ResponseCode::Refused {
        return Err(ResolverError::UpstreamRefused);
    }

    let rcode_is_negative = rcode == ResponseCode::NXDomain || message.answer_count() == 0;
    let min_answer_ttl = message.answers().iter().map(|r| r.ttl()).min();
    Ok(ParsedResponse {
        rcode_is_negative,
        is_servfail: false,
        min_answer_ttl,
        raw: bytes.to_vec(),
    })
}

/// Rewrites a cached raw response's transaction ID and, when `new_ttl` is
/// `Some`, every answer-record TTL, for replay on a cache hit.
pub fn rewrite_for_reply(raw: &[u8], id: u16, new_ttl: Option<u32>) -> Result<Vec<u8>, ResolverError> {
    let mut message =
        Message::from_vec(raw).map_err(|e| ResolverError::UpstreamProtocol(e.to_string()))?;
    message.set_id(id);
    if let Some(ttl) = new_ttl {
        for record in message.answers_mut() {
            record.set_ttl(ttl);
        }
    }
    let mut buf = Vec::with_capacity(raw.len() + 16);
    let mut encoder = BinEncoder::new(&mut buf);
    message
        .emit(&mut encoder)
        .map_err(|e| ResolverError::UpstreamProtocol(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentrydns_domain::Question;

    #[test]
    fn build_query_sets_recursion_desired() {
        let q = Question::new("example.com".into(), RecordType::A, 1);
        let (_, bytes) = build_query(&q).unwrap();
        assert_eq!(bytes[2] & 0x01, 0x01);
    }
}
