mod api;
mod config;

use api::AppState;
use courier_core::config::PushConfig;
use courier_core::dispatcher::{AllowAll, PushHandler};
use courier_core::gateway::OnlinePusher;
use courier_core::group_cache::{GroupApi, InMemoryGroupApi, LocalGroupCache};
use courier_core::hooks::{HttpHookTransport, WebhookClient};
use courier_core::metrics::Metrics;
use courier_core::offline_push::new_offline_pusher;
use courier_core::online_cache::OnlineCache;
use courier_core::presence::PresenceRegistry;
use courier_core::seq_alloc::SeqAllocator;
use courier_core::seq_user::SeqUserService;
use courier_gateway::client::HttpGatewayClient;
use courier_gateway::{GatewayTransport, StaticDiscovery};
use courier_postgres::PgStore;
use courier_redis::{RedisEngine, RedisStreamBus};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{error, info, LevelFilter};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

#[derive(thiserror::Error, Debug)]
enum DaemonError {
    #[error("usage: courier-pushd --config <file> [--port <n>] [--prometheus-port <n>]")]
    Usage,
    #[error("config: {0}")]
    Config(#[from] config::ConfigError),
    #[error("core: {0}")]
    Core(#[from] courier_core::error::CoreError),
    #[error("gateway: {0}")]
    Gateway(#[from] courier_gateway::GatewayError),
    #[error("bind")]
    Bind,
}

struct Args {
    config: PathBuf,
    port: Option<u16>,
    prometheus_port: Option<u16>,
}

fn parse_args() -> Result<Args, DaemonError> {
    let argv: Vec<String> = std::env::args().collect();
    let mut args = Args {
        config: PathBuf::from("courier-pushd.toml"),
        port: None,
        prometheus_port: None,
    };
    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                args.config = PathBuf::from(argv.get(i).ok_or(DaemonError::Usage)?);
            }
            "--port" => {
                i += 1;
                let raw = argv.get(i).ok_or(DaemonError::Usage)?;
                args.port = Some(raw.parse().map_err(|_| DaemonError::Usage)?);
            }
            "--prometheus-port" => {
                i += 1;
                let raw = argv.get(i).ok_or(DaemonError::Usage)?;
                args.prometheus_port = Some(raw.parse().map_err(|_| DaemonError::Usage)?);
            }
            _ => return Err(DaemonError::Usage),
        }
        i += 1;
    }
    Ok(args)
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

fn override_port(addr: SocketAddr, port: Option<u16>) -> SocketAddr {
    match port {
        Some(port) => SocketAddr::new(addr.ip(), port),
        None => addr,
    }
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let args = parse_args()?;
    let cfg = config::load_config(&args.config)?;
    init_logging(&cfg.logging.level);

    let redis = RedisEngine::connect(&cfg.redis.url).await?;
    let store = Arc::new(PgStore::connect(&cfg.postgres.dsn).await?);
    store.migrate().await?;

    let push_cfg: PushConfig = cfg.push.clone();
    let redis = Arc::new(redis);
    let seq = Arc::new(SeqAllocator::new(redis.clone(), store.clone(), &push_cfg));
    let seq_user = Arc::new(SeqUserService::new(redis.clone(), store.clone(), &push_cfg));

    // Group membership is owned by the group service; the daemon ships with
    // the in-process placeholder until that client is wired in deployment.
    let group_api: Arc<dyn GroupApi> = Arc::new(InMemoryGroupApi::new());
    let group_cache = Arc::new(LocalGroupCache::new(
        group_api.clone(),
        Duration::from_secs(60),
    ));

    let registry = Arc::new(PresenceRegistry::new(redis.clone(), group_api));
    let online_cache = OnlineCache::new(registry.clone(), push_cfg.online_cache_ttl());

    let mut transports: Vec<Arc<dyn GatewayTransport>> = Vec::new();
    for endpoint in &cfg.gateway.endpoints {
        transports.push(Arc::new(HttpGatewayClient::new(
            endpoint.clone(),
            cfg.gateway.timeout_ms,
        )?));
    }
    let online_pusher = OnlinePusher::new(Arc::new(StaticDiscovery::new(transports)));
    let offline_pusher = new_offline_pusher(&push_cfg.offline_push, redis.clone())?;
    let webhook = WebhookClient::new(
        push_cfg.webhooks.url.clone(),
        Arc::new(HttpHookTransport::new()?),
    );
    let metrics = Metrics::new();

    let (handler, aggregator) = PushHandler::new(
        push_cfg,
        online_cache,
        online_pusher,
        offline_pusher,
        group_cache,
        seq,
        seq_user,
        Arc::new(AllowAll),
        webhook,
        metrics.clone(),
    );

    let state = AppState {
        registry,
        metrics,
        redis: (*redis).clone(),
        store: store.clone(),
    };
    let api_addr = override_port(cfg.bind_addr()?, args.port);
    let metrics_addr = override_port(cfg.prometheus_addr()?, args.prometheus_port);
    serve(api_addr, state.clone(), false).await?;
    serve(metrics_addr, state.clone(), true).await?;

    let bus = RedisStreamBus::new(
        (*redis).clone(),
        cfg.bus.stream.clone(),
        cfg.bus.group.clone(),
        cfg.bus.consumer.clone(),
    )
    .await?;
    let consumer = tokio::spawn(async move {
        let mut bus = bus;
        if let Err(e) = handler.run(&mut bus).await {
            error!("consumer loop stopped: {}", e);
        }
    });
    info!(
        "courier-pushd up: api {} metrics {} stream {}",
        api_addr, metrics_addr, cfg.bus.stream
    );

    let _ = signal::ctrl_c().await;
    info!("shutting down");
    consumer.abort();
    let _ = consumer.await;
    // Dropping the consumer closed the read channel; drain the aggregator.
    let _ = aggregator.join().await;
    Ok(())
}

async fn serve(addr: SocketAddr, state: AppState, metrics_only: bool) -> Result<(), DaemonError> {
    let listener = TcpListener::bind(addr).await.map_err(|_| DaemonError::Bind)?;
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                continue;
            };
            let state = state.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    let state = state.clone();
                    async move {
                        let response = if metrics_only {
                            api::handle_metrics(state, req).await
                        } else {
                            api::handle_presence(state, req).await
                        };
                        Ok::<_, std::convert::Infallible>(response)
                    }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    log::debug!("connection error: {}", e);
                }
            });
        }
    });
    Ok(())
}
