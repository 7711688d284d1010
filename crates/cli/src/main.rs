//! Composition root (§9.5 component #10 and friends): parses CLI overrides,
//! loads config, wires every adapter into the resolution pipeline, starts
//! the background jobs and the DNS/control-surface listeners.

mod server;

use clap::Parser;
use mimalloc::MiMalloc;
use sentrydns_application::refresh::RefreshCoordinatorConfig;
use sentrydns_application::reload::{ClientRegistry, LocalRecordsRegistry};
use sentrydns_application::stats::StatsRegistry;
use sentrydns_application::{PipelineConfig, RefreshCoordinator, ResolutionPipeline};
use sentrydns_domain::{ClientTable, CliOverrides, Config, LocalRecordsTable};
use sentrydns_infrastructure::{
    BloomBlocklistMatcher, ChannelQueryLogSink, DashMapL1Store, DnsUpstreamDispatcher, LruL0Cache,
    ServfailTracker,
};
use sentrydns_jobs::{JobRunner, ServfailPrunerJob, SweeperJob};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "sentrydns")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A caching, blocklist-aware DNS forwarding resolver")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Override server.listen (repeatable addresses aren't supported on the
    /// command line; use the config file for more than one).
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        listen: cli.listen.clone(),
        log_level: cli.log_level.clone(),
    };
    let config = Config::load(cli.config.as_deref(), cli_overrides)?;
    config.validate()?;

    init_logging(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "starting sentrydns");
    info!(
        config_file = cli.config.as_deref().unwrap_or("default"),
        listen = ?config.server.listen,
        upstreams = config.upstreams.len(),
        strategy = ?config.resolver.strategy,
        "configuration loaded"
    );

    let l0 = Arc::new(LruL0Cache::new(config.cache.redis_lru_size));
    let l1 = Arc::new(DashMapL1Store::new());

    let blocklist = Arc::new(BloomBlocklistMatcher::new());
    blocklist.apply_config(
        &config.blocklists.denylist,
        &config.blocklists.allowlist,
        &config.client_groups,
        &config.blocklists.services,
    );

    let servfail = Arc::new(ServfailTracker::new(
        config.cache.servfail_max_entries,
        config.cache.servfail_threshold,
        config.cache.servfail_backoff_secs,
        config.cache.refresh_upstream_fail_log_interval_secs,
    ));
    let dispatcher = Arc::new(DnsUpstreamDispatcher::new(
        &config.upstreams,
        &config.resolver,
        Arc::clone(&servfail),
    )?);

    let (query_log, query_log_handle) = ChannelQueryLogSink::spawn(
        config.query_log.channel_capacity,
        config.query_log.exclude_domains.clone(),
        config.query_log.exclude_clients.clone(),
    );
    let query_log = Arc::new(query_log);

    let clients = Arc::new(ClientRegistry::new(ClientTable::build(
        &config.client_identification,
    )));
    let local_records = Arc::new(LocalRecordsRegistry::new(LocalRecordsTable::build(
        &config.local_records,
    )));
    let stats = Arc::new(StatsRegistry::new(unix_now()));

    let upstream_timeout = Duration::from_millis(config.resolver.upstream_timeout_ms);

    let refresh = Arc::new(RefreshCoordinator::new(
        Arc::clone(&l1),
        Arc::clone(&dispatcher),
        RefreshCoordinatorConfig {
            max_inflight: config.cache.max_inflight,
            lock_ttl_secs: config.cache.lock_ttl_secs,
            min_ttl: config.cache.min_ttl,
            max_ttl: config.cache.max_ttl,
            stale_ttl_secs: config.cache.stale_ttl_secs,
            upstream_timeout,
            refresh_upstream_fail_log_interval_secs: config
                .cache
                .refresh_upstream_fail_log_interval_secs,
        },
    ));

    let pipeline = Arc::new(ResolutionPipeline::new(
        Arc::clone(&l0),
        Arc::clone(&l1),
        Arc::clone(&blocklist),
        Arc::clone(&dispatcher),
        Arc::clone(&query_log),
        Arc::clone(&clients),
        Arc::clone(&local_records),
        Arc::clone(&refresh),
        Arc::clone(&stats),
        PipelineConfig {
            local_ttl: config.server.local_ttl_secs,
            blocked: config.response.blocked.clone(),
            blocked_ttl: config.response.blocked_ttl,
            min_ttl: config.cache.min_ttl,
            max_ttl: config.cache.max_ttl,
            negative_ttl: config.cache.negative_ttl,
            stale_ttl_secs: config.cache.stale_ttl_secs,
            expired_entry_ttl_secs: config.cache.expired_entry_ttl_secs,
            serve_stale: config.cache.serve_stale,
            refresh_min_ttl_secs: config.cache.refresh_min_ttl_secs,
            hot_threshold: config.cache.hot_threshold as u64,
            upstream_timeout,
            servfail_backoff_secs: config.cache.servfail_backoff_secs,
        },
    ));

    let shutdown = CancellationToken::new();

    let sweeper = SweeperJob::new(
        Arc::clone(&refresh),
        Arc::clone(&l1),
        Arc::clone(&stats),
        config.cache.sweep_interval_secs,
        config.cache.sweep_window_secs,
        config.cache.sweep_min_hits,
        config.cache.sweep_hit_window_secs,
        config.cache.max_batch_size,
    );
    let servfail_pruner = ServfailPrunerJob::new(Arc::clone(&servfail), config.cache.servfail_backoff_secs as u64);

    JobRunner::new()
        .with_sweeper(sweeper)
        .with_servfail_pruner(servfail_pruner)
        .with_shutdown_token(shutdown.clone())
        .start()
        .await;

    let dns_cfg = server::dns::DnsServerConfig {
        num_workers: config.server.reuse_port_listeners,
        read_timeout: Duration::from_millis(config.server.read_timeout_ms),
        write_timeout: Duration::from_millis(config.server.write_timeout_ms),
    };

    let mut dns_tasks = Vec::new();
    for listen in &config.server.listen {
        let bind_addr: SocketAddr = listen
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid server.listen address {listen}: {e}"))?;
        let pipeline = Arc::clone(&pipeline);
        let cfg = server::dns::DnsServerConfig {
            num_workers: dns_cfg.num_workers,
            read_timeout: dns_cfg.read_timeout,
            write_timeout: dns_cfg.write_timeout,
        };
        dns_tasks.push(tokio::spawn(async move {
            if let Err(e) = server::start_dns_server(bind_addr, pipeline, cfg).await {
                error!(error = %e, bind_address = %bind_addr, "DNS server exited");
            }
        }));
    }

    let control_addr: SocketAddr = config
        .server
        .control_listen
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid server.control_listen address: {e}"))?;
    let blocklist_dyn: Arc<dyn sentrydns_application::ports::BlocklistMatcher> = blocklist;
    let app_state = sentrydns_api::AppState {
        stats: Arc::clone(&stats),
        blocklist: blocklist_dyn,
        clients: Arc::clone(&clients),
        local_records: Arc::clone(&local_records),
        config: Arc::new(RwLock::new(config)),
        config_path: cli.config.map(|p| Arc::from(p.as_str())),
    };
    let web_task = tokio::spawn(async move {
        if let Err(e) = server::start_web_server(control_addr, app_state).await {
            error!(error = %e, bind_address = %control_addr, "control-surface API exited");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    shutdown.cancel();
    web_task.abort();
    for task in dns_tasks {
        task.abort();
    }
    drop(query_log);
    let _ = query_log_handle.await;

    Ok(())
}

fn init_logging(cfg: &sentrydns_domain::config::LoggingConfig) {
    let level = cfg.level.parse().unwrap_or(tracing::Level::INFO);
    let subscriber = tracing_subscriber::fmt().with_target(true).with_max_level(level);
    if cfg.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
