use clap::Parser;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burstrx::api;
use burstrx::config::{CliArgs, Config};
use burstrx::inspect::Firewall;
use burstrx::poller::ReceivePoller;
use burstrx::receiver::SyntheticReceiver;
use burstrx::stats::PollerStats;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();

    // Load config from file if provided, otherwise use defaults.
    let mut config = if let Some(ref config_path) = cli.config {
        Config::from_file(Path::new(config_path))?
    } else {
        Config::default()
    };
    config.merge_cli(&cli);

    // Logging.
    if config.quiet {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new("error"))
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let layout = config.layout()?;

    // ── Shutdown ──────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    {
        let running = running.clone();
        let shutdown_tx = shutdown_tx.clone();
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
            let _ = shutdown_tx.send(true);
        })?;
    }

    // ── Poller ────────────────────────────────────────────────────────
    let firewall =
        Firewall::with_tracking_limit(config.blacklist.clone(), config.drop_tracking_limit);
    let firewall_stats = firewall.stats();
    let receiver = SyntheticReceiver::new(config.synthetic.clone());
    let mut poller = ReceivePoller::new(receiver, firewall, layout)?
        .with_retry_delay(Duration::from_millis(config.retry_delay_ms));
    let poller_stats = poller.stats();

    let running_poller = running.clone();
    let poller_task = tokio::task::spawn_blocking(move || poller.run(&running_poller));

    // ── Throughput Report Task ────────────────────────────────────────
    if config.stats_interval_seconds > 0 {
        let stats = poller_stats.clone();
        let period = config.stats_interval_seconds;
        tokio::spawn(async move {
            report_throughput(stats, Duration::from_secs(period)).await;
        });
    }

    // ── Drop Table Cleanup Task ───────────────────────────────────────
    let firewall_cleanup = firewall_stats.clone();
    let drop_timeout = config.drop_timeout_seconds;
    tokio::spawn(async move {
        let mut cleanup_interval = interval(Duration::from_secs(10));
        loop {
            cleanup_interval.tick().await;
            firewall_cleanup.cleanup_stale_destinations(Duration::from_secs(drop_timeout));
        }
    });

    // ── HTTP API ──────────────────────────────────────────────────────
    let app_state = Arc::new(api::AppState {
        poller: poller_stats,
        firewall: firewall_stats,
        start_time: std::time::Instant::now(),
    });
    let app = api::router(app_state, &config.allowed_ips);

    let listener =
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Stats API running on http://0.0.0.0:{}", config.port);
    let server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await
    });

    // The poller only returns on shutdown or a fatal receive error; either
    // way the API goes down with it.
    let polled = poller_task.await?;
    running.store(false, Ordering::Relaxed);
    let _ = shutdown_tx.send(true);
    server.await??;
    polled?;

    Ok(())
}

/// Log packets and bytes seen since the previous tick.
async fn report_throughput(stats: Arc<PollerStats>, period: Duration) {
    let mut ticker = interval(period);
    let mut last = stats.snapshot();
    loop {
        ticker.tick().await;
        let now = stats.snapshot();
        let delta = now.since(&last);
        tracing::info!(
            "Packets: {}, Bytes: {} (total {} packets)",
            delta.total_packets,
            delta.total_bytes,
            now.total_packets
        );
        last = now;
    }
}
