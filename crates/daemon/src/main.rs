use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visits_core::AccumMode;
use visits_daemon::{
    config::{DaemonConfig, DEFAULT_VISIT_API_TEMPLATE},
    http,
    remote::HttpVisitSource,
    service::TaskService,
};

#[derive(Parser, Debug)]
#[command(name = "visits-daemon", version, about = "Visit-count task tracker")]
struct Args {
    /// Listen address, e.g. 127.0.0.1:8000
    #[arg(long, env = "VISITS_LISTEN", default_value = "127.0.0.1:8000")]
    listen: SocketAddr,

    /// Directory holding tasks.json and settings.json.
    #[arg(long, env = "DATA_DIR", default_value = ".visits-tracker")]
    data_dir: PathBuf,

    /// Provider URL; `{uid}` is replaced by the URL-encoded user id.
    #[arg(long, env = "VISIT_API_TEMPLATE", default_value = DEFAULT_VISIT_API_TEMPLATE)]
    visit_api_template: String,

    /// Timeout for one provider call, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 15)]
    request_timeout_secs: u64,

    /// Pause between background poll cycles, in milliseconds.
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 1_000)]
    poll_interval_ms: u64,

    /// Mode used when the settings document is first created.
    #[arg(long, env = "ACCUM_MODE", default_value = "add_reports", value_parser = parse_mode)]
    accum_mode: AccumMode,

    /// Admin credential for list / sweep / set-mode.
    #[arg(long, env = "ADMIN_PASS", hide_env_values = true)]
    admin_pass: Option<String>,

    /// Do not run in-process loops; rely on an external caller of the sweep.
    #[arg(long, env = "NO_BACKGROUND_WORKERS")]
    no_background_workers: bool,

    /// Log level (env-filter syntax).
    #[arg(long, env = "VISITS_LOG", default_value = "info")]
    log: String,
}

fn parse_mode(s: &str) -> Result<AccumMode, String> {
    s.parse().map_err(|e: visits_core::TaskError| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.log))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = DaemonConfig {
        data_dir: args.data_dir,
        visit_api_template: args.visit_api_template,
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        default_accum_mode: args.accum_mode,
        admin_pass: args.admin_pass,
        background_workers: !args.no_background_workers,
    };
    info!("starting daemon with config: {:?}", config);
    if config.admin_pass.is_none() {
        warn!("no admin credential configured; admin endpoints will refuse every call");
    }

    let source = HttpVisitSource::new(&config.visit_api_template, config.request_timeout)
        .context("build provider client")?;
    let svc = TaskService::new(config, Arc::new(source));
    svc.start().await.context("initialise task store")?;

    let app = http::router(Arc::clone(&svc));

    info!(listen = %args.listen, "daemon listening");
    axum::serve(tokio::net::TcpListener::bind(args.listen).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    svc.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
