//! Client-facing wire codec (§4.1): parses an inbound datagram into a
//! [`Question`] and turns each [`PipelineOutcome`](sentrydns_application::pipeline::PipelineOutcome)
//! back into response bytes. Distinct from [`crate::upstream::wire`], which
//! speaks to upstreams rather than clients, though both sit on
//! `hickory-proto` and share its TTL-rewrite trick for cache replay.

use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, MX, NS, PTR, SOA, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable, BinEncoder};
use sentrydns_domain::{Question, RecordType, ResolverError};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An inbound request: always has a wire ID (needed to answer even a
/// malformed request), a question only when one parsed cleanly.
pub struct ParsedQuery {
    pub id: u16,
    pub question: Option<Question>,
}

pub fn parse_query(bytes: &[u8]) -> Result<ParsedQuery, ResolverError> {
    let message =
        Message::from_vec(bytes).map_err(|e| ResolverError::MalformedRequest(e.to_string()))?;
    let id = message.id();
    let question = message.queries().first().map(|q| {
        Question::new(
            &q.name().to_utf8(),
            RecordType::from_u16(u16::from(q.query_type())),
            u16::from(q.query_class()),
        )
    });
    Ok(ParsedQuery { id, question })
}

fn encode(message: &Message) -> Result<Vec<u8>, ResolverError> {
    let mut buf = Vec::with_capacity(512);
    let mut encoder = BinEncoder::new(&mut buf);
    message
        .emit(&mut encoder)
        .map_err(|e| ResolverError::UpstreamProtocol(e.to_string()))?;
    Ok(buf)
}

fn response_shell(id: u16, question: Option<&Question>, rcode: ResponseCode) -> Result<Message, ResolverError> {
    let mut message = Message::new(id, MessageType::Response, OpCode::Query);
    message.set_recursion_available(true);
    message.set_recursion_desired(true);
    message.set_response_code(rcode);
    if let Some(q) = question {
        let name = Name::from_str(&q.qname)
            .map_err(|e| ResolverError::InvalidDomainName(format!("{}: {e}", q.qname)))?;
        let mut query = Query::new();
        query.set_name(name);
        query.set_query_type(to_hickory_type(q.qtype));
        query.set_query_class(DNSClass::from(q.qclass));
        message.add_query(query);
    }
    Ok(message)
}

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

/// No question section survived parsing; nothing more to echo back.
pub fn build_formerr(id: u16) -> Result<Vec<u8>, ResolverError> {
    encode(&response_shell(id, None, ResponseCode::FormErr)?)
}

pub fn build_servfail(id: u16, question: Option<&Question>) -> Result<Vec<u8>, ResolverError> {
    encode(&response_shell(id, question, ResponseCode::ServFail)?)
}

/// Answers straight from the local-records table (§4.1 step 3). Only the
/// record types a local override realistically carries are supported;
/// anything else yields an empty NOERROR, matching how a real recursive
/// resolver answers a type it has no data for.
pub fn build_local(
    id: u16,
    question: &Question,
    values: &[String],
    ttl: u32,
) -> Result<Vec<u8>, ResolverError> {
    let mut message = response_shell(id, Some(question), ResponseCode::NoError)?;
    let name = Name::from_str(&question.qname)
        .map_err(|e| ResolverError::InvalidDomainName(format!("{}: {e}", question.qname)))?;
    for value in values {
        if let Some(rdata) = build_rdata(question.qtype, value)? {
            message.add_answer(Record::from_rdata(name.clone(), ttl, rdata));
        }
    }
    encode(&message)
}

fn build_rdata(qtype: RecordType, value: &str) -> Result<Option<RData>, ResolverError> {
    let rdata = match qtype {
        RecordType::A => {
            let addr: Ipv4Addr = value
                .parse()
                .map_err(|_| ResolverError::MalformedRequest(format!("invalid A value: {value}")))?;
            RData::A(A(addr))
        }
        RecordType::AAAA => {
            let addr: Ipv6Addr = value
                .parse()
                .map_err(|_| ResolverError::MalformedRequest(format!("invalid AAAA value: {value}")))?;
            RData::AAAA(AAAA(addr))
        }
        RecordType::CNAME => {
            let name = Name::from_str(value)
                .map_err(|e| ResolverError::InvalidDomainName(format!("{value}: {e}")))?;
            RData::CNAME(CNAME(name))
        }
        RecordType::PTR => {
            let name = Name::from_str(value)
                .map_err(|e| ResolverError::InvalidDomainName(format!("{value}: {e}")))?;
            RData::PTR(PTR(name))
        }
        RecordType::NS => {
            let name = Name::from_str(value)
                .map_err(|e| ResolverError::InvalidDomainName(format!("{value}: {e}")))?;
            RData::NS(NS(name))
        }
        RecordType::TXT => RData::TXT(TXT::new(vec![value.to_string()])),
        RecordType::MX => {
            let (preference, exchange) = value
                .split_once(' ')
                .ok_or_else(|| ResolverError::MalformedRequest(format!("invalid MX value: {value}")))?;
            let preference: u16 = preference
                .parse()
                .map_err(|_| ResolverError::MalformedRequest(format!("invalid MX preference: {value}")))?;
            let exchange = Name::from_str(exchange)
                .map_err(|e| ResolverError::InvalidDomainName(format!("{exchange}: {e}")))?;
            RData::MX(MX::new(preference, exchange))
        }
        _ => return Ok(None),
    };
    Ok(Some(rdata))
}

/// Policy-blocked response (§4.1 step 4). `Nxdomain` is an empty-answer
/// NXDOMAIN with a synthesized authority-section SOA carrying `ttl` as its
/// negative-caching minimum (§8 scenario 1: "TTL of SOA ≤ `blocked_ttl`"),
/// the way a real zone signals how long a resolver may cache the negative
/// result. `SinkholeIp` answers A queries with the configured address and
/// falls back to an empty NOERROR for every other query type, since a single
/// sinkhole address can't stand in for a CNAME or TXT record.
pub fn build_blocked_nxdomain(id: u16, question: &Question, ttl: u32) -> Result<Vec<u8>, ResolverError> {
    let mut message = response_shell(id, Some(question), ResponseCode::NXDomain)?;
    let name = Name::from_str(&question.qname)
        .map_err(|e| ResolverError::InvalidDomainName(format!("{}: {e}", question.qname)))?;
    let mname = Name::from_str("blocked.sentrydns.invalid.")
        .expect("constant SOA mname is always valid");
    let rname = Name::from_str("hostmaster.sentrydns.invalid.")
        .expect("constant SOA rname is always valid");
    let soa = SOA::new(mname, rname, 1, 3600, 900, 604_800, ttl);
    message.add_name_server(Record::from_rdata(name, ttl, RData::SOA(soa)));
    encode(&message)
}

pub fn build_blocked_sinkhole(
    id: u16,
    question: &Question,
    sinkhole: &str,
    ttl: u32,
) -> Result<Vec<u8>, ResolverError> {
    let mut message = response_shell(id, Some(question), ResponseCode::NoError)?;
    if question.qtype == RecordType::A {
        if let Ok(addr) = sinkhole.parse::<Ipv4Addr>() {
            let name = Name::from_str(&question.qname)
                .map_err(|e| ResolverError::InvalidDomainName(format!("{}: {e}", question.qname)))?;
            message.add_answer(Record::from_rdata(name, ttl, RData::A(A(addr))));
        }
    }
    encode(&message)
}

/// Re-serves a raw upstream-sourced payload (cache hit or fresh upstream
/// answer) with the client's transaction ID and, for a stale/negative hit,
/// a rewritten TTL.
pub fn build_cache_reply(raw: &[u8], id: u16, new_ttl: Option<u32>) -> Result<Vec<u8>, ResolverError> {
    crate::upstream::wire::rewrite_for_reply(raw, id, new_ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formerr_has_no_question() {
        let bytes = build_formerr(42).unwrap();
        let message = Message::from_vec(&bytes).unwrap();
        assert_eq!(message.response_code(), ResponseCode::FormErr);
        assert!(message.queries().is_empty());
    }

    #[test]
    fn local_a_record_round_trips() {
        let q = Question::new("host.lan", RecordType::A, Question::CLASS_IN);
        let bytes = build_local(7, &q, &["192.168.1.10".to_string()], 300).unwrap();
        let message = Message::from_vec(&bytes).unwrap();
        assert_eq!(message.answer_count(), 1);
        assert_eq!(message.response_code(), ResponseCode::NoError);
    }

    #[test]
    fn blocked_nxdomain_has_empty_answers_and_soa_within_ttl() {
        let q = Question::new("ads.example.com", RecordType::A, Question::CLASS_IN);
        let bytes = build_blocked_nxdomain(9, &q, 60).unwrap();
        let message = Message::from_vec(&bytes).unwrap();
        assert_eq!(message.response_code(), ResponseCode::NXDomain);
        assert_eq!(message.answer_count(), 0);
        assert_eq!(message.name_server_count(), 1);
        let soa = &message.name_servers()[0];
        assert!(matches!(soa.data(), RData::SOA(_)));
        assert!(soa.ttl() <= 60);
    }

    #[test]
    fn sinkhole_answers_a_query() {
        let q = Question::new("ads.example.com", RecordType::A, Question::CLASS_IN);
        let bytes = build_blocked_sinkhole(9, &q, "0.0.0.0", 60).unwrap();
        let message = Message::from_vec(&bytes).unwrap();
        assert_eq!(message.answer_count(), 1);
    }

    #[test]
    fn sinkhole_falls_back_to_empty_for_non_a() {
        let q = Question::new("ads.example.com", RecordType::TXT, Question::CLASS_IN);
        let bytes = build_blocked_sinkhole(9, &q, "0.0.0.0", 60).unwrap();
        let message = Message::from_vec(&bytes).unwrap();
        assert_eq!(message.answer_count(), 0);
        assert_eq!(message.response_code(), ResponseCode::NoError);
    }
}
