//! Per-protocol exchange primitives (§4.4): one plain round-trip function per
//! wire protocol, pooled where the protocol has a notion of a reusable
//! connection. Enum-dispatched rather than `Box<dyn>` — there are only five
//! variants and the hot path (UDP) shouldn't pay vtable overhead.

use dashmap::DashMap;
use rustls::pki_types::ServerName;
use sentrydns_domain::ResolverError;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::client::TlsStream;
use tracing::debug;

const MAX_UDP_RESPONSE_SIZE: usize = 4096;
const MAX_TCP_MESSAGE_SIZE: usize = 65535;
const MAX_IDLE_PER_HOST: usize = 2;

/// Parsed form of a config `upstreams[].address` entry (§6). `host:port` is
/// UDP/TCP, the rest are scheme-prefixed per §4.4.
pub enum UpstreamTarget {
    Udp(SocketAddr),
    Tcp(SocketAddr),
    Tls { addr: SocketAddr, sni: String },
    Quic { addr: SocketAddr, sni: String },
    Https(String),
}

pub fn parse_target(
    address: &str,
    protocol: sentrydns_domain::upstream::Protocol,
) -> Result<UpstreamTarget, ResolverError> {
    use sentrydns_domain::upstream::Protocol;
    match protocol {
        Protocol::Udp => Ok(UpstreamTarget::Udp(parse_socket_addr(address)?)),
        Protocol::Tcp => Ok(UpstreamTarget::Tcp(parse_socket_addr(address)?)),
        Protocol::Tls => {
            let rest = address.strip_prefix("tls://").unwrap_or(address);
            let (host, addr) = split_host_addr(rest)?;
            Ok(UpstreamTarget::Tls { addr, sni: host })
        }
        Protocol::Quic => {
            let rest = address.strip_prefix("quic://").unwrap_or(address);
            let (host, addr) = split_host_addr(rest)?;
            Ok(UpstreamTarget::Quic { addr, sni: host })
        }
        Protocol::Https => {
            if address.starts_with("https://") {
                Ok(UpstreamTarget::Https(address.to_string()))
            } else {
                Err(ResolverError::InvalidUpstreamAddress(address.to_string()))
            }
        }
    }
}

fn parse_socket_addr(s: &str) -> Result<SocketAddr, ResolverError> {
    SocketAddr::from_str(s).map_err(|_| ResolverError::InvalidUpstreamAddress(s.to_string()))
}

fn split_host_addr(rest: &str) -> Result<(String, SocketAddr), ResolverError> {
    let addr = parse_socket_addr(rest)?;
    let host = rest.rsplit_once(':').map(|(h, _)| h.to_string()).ok_or_else(|| {
        ResolverError::InvalidUpstreamAddress(rest.to_string())
    })?;
    Ok((host.trim_start_matches('[').trim_end_matches(']').to_string(), addr))
}

static TLS_CONFIG: LazyLock<Arc<rustls::ClientConfig>> = LazyLock::new(|| {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
});

static TLS_POOL: LazyLock<DashMap<(SocketAddr, String), Vec<TlsStream<TcpStream>>>> =
    LazyLock::new(DashMap::new);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .use_rustls_tls()
        .pool_max_idle_per_host(4)
        .http2_prior_knowledge()
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

static QUIC_CLIENT_CONFIG: LazyLock<quinn::ClientConfig> = LazyLock::new(|| {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    let tls = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let quic_tls =
        quinn::crypto::rustls::QuicClientConfig::try_from(Arc::new(tls)).expect("valid quic tls");
    quinn::ClientConfig::new(Arc::new(quic_tls))
});

static QUIC_ENDPOINT: LazyLock<quinn::Endpoint> = LazyLock::new(|| {
    let mut ep = quinn::Endpoint::client("0.0.0.0:0".parse().unwrap()).expect("quic endpoint");
    ep.set_default_client_config(QUIC_CLIENT_CONFIG.clone());
    ep
});

static QUIC_POOL: LazyLock<DashMap<(SocketAddr, String), quinn::Connection>> =
    LazyLock::new(DashMap::new);

/// One exchange over the target's protocol. `query` is a fully built wire
/// message; returns the raw response bytes.
pub async fn exchange(
    target: &UpstreamTarget,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    match target {
        UpstreamTarget::Udp(addr) => exchange_udp(*addr, query, timeout).await,
        UpstreamTarget::Tcp(addr) => exchange_tcp(*addr, query, timeout).await,
        UpstreamTarget::Tls { addr, sni } => exchange_tls(*addr, sni, query, timeout).await,
        UpstreamTarget::Quic { addr, sni } => exchange_quic(*addr, sni, query, timeout).await,
        UpstreamTarget::Https(url) => exchange_https(url, query, timeout).await,
    }
}

async fn exchange_udp(
    addr: SocketAddr,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    let bind: SocketAddr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }
        .parse()
        .expect("valid bind addr");
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|e| ResolverError::UpstreamProtocol(format!("udp bind: {e}")))?;

    tokio::time::timeout(timeout, socket.send_to(query, addr))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("udp send: {e}")))?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
    let n = tokio::time::timeout(timeout, socket.recv(&mut buf))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("udp recv: {e}")))?;
    buf.truncate(n);

    if is_truncated(&buf) {
        debug!(%addr, "UDP response truncated, retrying via TCP");
        return exchange_tcp(addr, query, timeout).await;
    }
    Ok(buf)
}

fn is_truncated(message: &[u8]) -> bool {
    message.len() >= 3 && message[2] & 0x02 != 0
}

async fn exchange_tcp(
    addr: SocketAddr,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("tcp connect: {e}")))?;
    tokio::time::timeout(timeout, send_framed(&mut stream, query))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)??;
    tokio::time::timeout(timeout, recv_framed(&mut stream))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
}

async fn send_framed<S: AsyncWriteExt + Unpin>(
    stream: &mut S,
    message: &[u8],
) -> Result<(), ResolverError> {
    let len = message.len() as u16;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| ResolverError::UpstreamProtocol(format!("write length: {e}")))?;
    stream
        .write_all(message)
        .await
        .map_err(|e| ResolverError::UpstreamProtocol(format!("write body: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| ResolverError::UpstreamProtocol(format!("flush: {e}")))
}

async fn recv_framed<S: AsyncReadExt + Unpin>(stream: &mut S) -> Result<Vec<u8>, ResolverError> {
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| ResolverError::UpstreamProtocol(format!("read length: {e}")))?;
    let len = u16::from_be_bytes(len_buf) as usize;
    if len > MAX_TCP_MESSAGE_SIZE {
        return Err(ResolverError::UpstreamProtocol(format!(
            "response too large: {len} bytes"
        )));
    }
    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| ResolverError::UpstreamProtocol(format!("read body: {e}")))?;
    Ok(body)
}

async fn exchange_tls(
    addr: SocketAddr,
    sni: &str,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    let key = (addr, sni.to_string());
    if let Some(mut stream) = TLS_POOL.get_mut(&key).and_then(|mut v| v.pop()) {
        match send_recv_tls(&mut stream, query, timeout).await {
            Ok(response) => {
                return_tls(&key, stream);
                return Ok(response);
            }
            Err(_) => debug!(%addr, sni, "pooled DoT connection stale, reconnecting"),
        }
    }

    let mut stream = connect_tls(addr, sni, timeout).await?;
    let response = send_recv_tls(&mut stream, query, timeout).await?;
    return_tls(&key, stream);
    Ok(response)
}

fn return_tls(key: &(SocketAddr, String), stream: TlsStream<TcpStream>) {
    let mut entry = TLS_POOL.entry(key.clone()).or_default();
    if entry.len() < MAX_IDLE_PER_HOST {
        entry.push(stream);
    }
}

async fn connect_tls(
    addr: SocketAddr,
    sni: &str,
    timeout: Duration,
) -> Result<TlsStream<TcpStream>, ResolverError> {
    let connector = tokio_rustls::TlsConnector::from(TLS_CONFIG.clone());
    let server_name = ServerName::try_from(sni.to_string())
        .map_err(|e| ResolverError::InvalidUpstreamAddress(format!("{sni}: {e}")))?;
    let tcp = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("tls tcp connect: {e}")))?;
    tokio::time::timeout(timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("tls handshake: {e}")))
}

async fn send_recv_tls(
    stream: &mut TlsStream<TcpStream>,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    tokio::time::timeout(timeout, send_framed(stream, query))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)??;
    tokio::time::timeout(timeout, recv_framed(stream))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
}

async fn exchange_quic(
    addr: SocketAddr,
    sni: &str,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    let key = (addr, sni.to_string());
    if let Some(conn) = QUIC_POOL.get(&key).map(|c| c.clone()) {
        if conn.close_reason().is_none() {
            if let Ok(response) = send_recv_quic(&conn, query, timeout).await {
                return Ok(response);
            }
        }
        QUIC_POOL.remove(&key);
    }

    let connecting = QUIC_ENDPOINT
        .connect(addr, sni)
        .map_err(|e| ResolverError::UpstreamProtocol(format!("quic connect init: {e}")))?;
    let conn = tokio::time::timeout(timeout, connecting)
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("quic handshake: {e}")))?;
    let response = send_recv_quic(&conn, query, timeout).await?;
    QUIC_POOL.insert(key, conn);
    Ok(response)
}

async fn send_recv_quic(
    conn: &quinn::Connection,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    let (mut send, mut recv) = tokio::time::timeout(timeout, conn.open_bi())
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("quic open_bi: {e}")))?;
    tokio::time::timeout(timeout, send_framed(&mut send, query))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)??;
    send.finish()
        .map_err(|e| ResolverError::UpstreamProtocol(format!("quic finish: {e}")))?;
    tokio::time::timeout(timeout, recv_framed(&mut recv))
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
}

async fn exchange_https(
    url: &str,
    query: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>, ResolverError> {
    let response = tokio::time::timeout(
        timeout,
        HTTP_CLIENT
            .post(url)
            .header("Content-Type", "application/dns-message")
            .header("Accept", "application/dns-message")
            .body(query.to_vec())
            .send(),
    )
    .await
    .map_err(|_| ResolverError::UpstreamTimeout)?
    .map_err(|e| ResolverError::UpstreamProtocol(format!("doh request: {e}")))?;

    if !response.status().is_success() {
        return Err(ResolverError::UpstreamProtocol(format!(
            "doh http {}",
            response.status()
        )));
    }

    let bytes = tokio::time::timeout(timeout, response.bytes())
        .await
        .map_err(|_| ResolverError::UpstreamTimeout)?
        .map_err(|e| ResolverError::UpstreamProtocol(format!("doh body: {e}")))?;
    Ok(bytes.to_vec())
}
