//! The DNS listener (§4.1, §6 "server"): `num_workers` UDP+TCP worker pairs
//! sharing one `SO_REUSEPORT` group per listen address, handing each
//! datagram/stream straight to the resolution pipeline. Socket setup is the
//! teacher's — only the handler wiring changed, from the old
//! `hickory_server::ServerFuture`/`DnsServerHandler` pair to the pipeline's
//! own `resolve` plus the client-facing wire codec.

use sentrydns_application::{BlockedKind, PipelineOutcome, ResolutionPipeline};
use sentrydns_infrastructure::codec;
use sentrydns_infrastructure::{
    BloomBlocklistMatcher, ChannelQueryLogSink, DashMapL1Store, DnsUpstreamDispatcher, LruL0Cache,
};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncReadExt, AsyncWriteExt, Interest};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::pktinfo;

pub type Pipeline = ResolutionPipeline<
    LruL0Cache,
    DashMapL1Store,
    BloomBlocklistMatcher,
    DnsUpstreamDispatcher,
    ChannelQueryLogSink,
>;

pub struct DnsServerConfig {
    pub num_workers: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

pub async fn start_dns_server(
    bind_addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    cfg: DnsServerConfig,
) -> anyhow::Result<()> {
    let domain = if bind_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    info!(
        bind_address = %bind_addr,
        num_workers = cfg.num_workers,
        "starting DNS server with SO_REUSEPORT"
    );

    let mut join_set: JoinSet<()> = JoinSet::new();

    for i in 0..cfg.num_workers {
        let udp_socket = Arc::new(create_udp_socket(domain, bind_addr)?);
        let pipeline_udp = pipeline.clone();
        join_set.spawn(async move {
            run_udp_worker(udp_socket, pipeline_udp, i).await;
        });

        let tcp_listener = create_tcp_listener(domain, bind_addr)?;
        let pipeline_tcp = pipeline.clone();
        let read_timeout = cfg.read_timeout;
        let write_timeout = cfg.write_timeout;
        join_set.spawn(async move {
            run_tcp_worker(tcp_listener, pipeline_tcp, read_timeout, write_timeout, i).await;
        });
    }

    info!("DNS server ready — {} workers on {}", cfg.num_workers, bind_addr);

    while join_set.join_next().await.is_some() {}
    Ok(())
}

async fn run_udp_worker(
    socket: Arc<AsyncFd<std::net::UdpSocket>>,
    pipeline: Arc<Pipeline>,
    worker_id: usize,
) {
    let mut recv_buf = [0u8; 4096];

    loop {
        let mut guard = match socket.readable().await {
            Ok(g) => g,
            Err(_) => break,
        };

        loop {
            match pktinfo::try_recv_with_pktinfo(socket.get_ref(), &mut recv_buf) {
                Ok((n, from, dst_ip)) => {
                    let query_buf: Arc<[u8]> = Arc::from(&recv_buf[..n]);
                    let client_ip = from.ip();
                    let pipeline = pipeline.clone();
                    let socket = socket.clone();
                    tokio::spawn(async move {
                        if let Some(response) = resolve_and_encode(&pipeline, &query_buf, client_ip).await {
                            let _ = pktinfo::try_send_with_src_ip(socket.get_ref(), &response, from, dst_ip);
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    guard.clear_ready();
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(worker = worker_id, error = %e, "UDP recv error");
                    guard.clear_ready();
                    break;
                }
            }
        }
    }
}

async fn run_tcp_worker(
    listener: TcpListener,
    pipeline: Arc<Pipeline>,
    read_timeout: Duration,
    write_timeout: Duration,
    worker_id: usize,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(worker = worker_id, error = %e, "TCP accept error");
                continue;
            }
        };
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            if let Err(e) =
                handle_tcp_connection(stream, peer.ip(), &pipeline, read_timeout, write_timeout).await
            {
                debug!(peer = %peer, error = %e, "TCP connection closed");
            }
        });
    }
}

/// One connection, many queries: a client may pipeline several messages over
/// the same stream (§6 "TCP (2-byte length prefix)"), so the loop keeps
/// reading until the peer closes it or goes idle past `read_timeout`.
async fn handle_tcp_connection(
    mut stream: TcpStream,
    client_ip: IpAddr,
    pipeline: &Pipeline,
    read_timeout: Duration,
    write_timeout: Duration,
) -> io::Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        match tokio::time::timeout(read_timeout, stream.read_exact(&mut len_buf)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(()),
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        tokio::time::timeout(read_timeout, stream.read_exact(&mut body))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tcp read timeout"))??;

        let Some(response) = resolve_and_encode(pipeline, &body, client_ip).await else {
            continue;
        };
        let response_len = (response.len() as u16).to_be_bytes();
        tokio::time::timeout(write_timeout, async {
            stream.write_all(&response_len).await?;
            stream.write_all(&response).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "tcp write timeout"))??;
    }
}

/// Parses, resolves and re-encodes one client query. Returns `None` only
/// when the request was too short to even carry a transaction ID to echo
/// back, or the chosen response builder itself failed to encode.
async fn resolve_and_encode(pipeline: &Pipeline, bytes: &[u8], client_addr: IpAddr) -> Option<Vec<u8>> {
    let parsed = match codec::parse_query(bytes) {
        Ok(p) => p,
        Err(_) => {
            let id = fallback_id(bytes)?;
            return codec::build_formerr(id).ok();
        }
    };

    let now = unix_now();
    let started = Instant::now();
    let outcome = pipeline
        .resolve(parsed.question.as_ref(), client_addr, now, started)
        .await;
    let question = parsed.question.as_ref();

    let result = match outcome {
        PipelineOutcome::Formerr => codec::build_formerr(parsed.id),
        PipelineOutcome::Local { values, ttl } => codec::build_local(
            parsed.id,
            question.expect("a Local outcome always carries the question it answered"),
            &values,
            ttl,
        ),
        PipelineOutcome::Blocked { kind, ttl } => {
            let question = question.expect("a Blocked outcome always carries the question it answered");
            match kind {
                BlockedKind::Nxdomain => codec::build_blocked_nxdomain(parsed.id, question, ttl),
                BlockedKind::SinkholeIp(addr) => {
                    codec::build_blocked_sinkhole(parsed.id, question, &addr, ttl)
                }
            }
        }
        PipelineOutcome::CacheHit { answer, remaining_ttl, .. } => {
            if answer.is_servfail {
                codec::build_servfail(parsed.id, question)
            } else {
                codec::build_cache_reply(&answer.records, parsed.id, Some(remaining_ttl))
            }
        }
        PipelineOutcome::Upstream { answer, ttl } => {
            codec::build_cache_reply(&answer.records, parsed.id, Some(ttl))
        }
        PipelineOutcome::Servfail => codec::build_servfail(parsed.id, question),
    };
    result.ok()
}

fn fallback_id(bytes: &[u8]) -> Option<u16> {
    (bytes.len() >= 2).then(|| u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn create_udp_socket(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<AsyncFd<std::net::UdpSocket>> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_recv_buffer_size(512 * 1024)?;
    socket.set_send_buffer_size(512 * 1024)?;
    socket.bind(&socket_addr.into())?;
    pktinfo::enable_pktinfo(&socket);
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(AsyncFd::with_interest(
        std_socket,
        Interest::READABLE | Interest::WRITABLE,
    )?)
}

fn create_tcp_listener(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}
