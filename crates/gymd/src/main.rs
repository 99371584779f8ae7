//! gymd - class scheduling and membership session ledger service
//!
//! This is the main entry point for the gymd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Core engine and trainer notifier
//! - IPC server
//! - Missed-session and expiry sweep timers

mod handlers;
mod notifier;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gym_api::{
    API_VERSION, ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus,
    Request, Response, ResponsePayload, SweepKind,
};
use gym_config::{FacilityPolicy, SweepSchedule, load_config};
use gym_core::GymEngine;
use gym_ipc::{IpcServer, ServerMessage};
use gym_store::{AuditEventType, SqliteStore, Store};
use gym_util::{ClientId, RateLimiter, database_path, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::notifier::ChannelNotifier;

/// Requests per second allowed for each client
const RATE_LIMIT_PER_SECOND: u32 = 30;

/// How often idle rate-limiter entries are dropped
const RATE_LIMIT_CLEANUP: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// gymd - class scheduling and membership session ledger
#[derive(Parser, Debug)]
#[command(name = "gymd")]
#[command(about = "Class scheduling and membership session ledger service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/gymd/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set GYM_SOCKET env var)
    #[arg(short, long, env = "GYM_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set GYM_DATA_DIR env var)
    #[arg(short, long, env = "GYM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// When each sweep last completed
#[derive(Debug, Default)]
struct SweepTimes {
    missed: Option<chrono::DateTime<chrono::Local>>,
    expiry: Option<chrono::DateTime<chrono::Local>>,
}

/// State shared by the request and sweep tasks
struct Shared {
    engine: Arc<GymEngine>,
    ipc: Arc<IpcServer>,
    rate_limiter: Mutex<RateLimiter>,
    sweep_times: Mutex<SweepTimes>,
}

/// Main service state
struct Service {
    shared: Arc<Shared>,
    sweeps: SweepSchedule,
    notifier_task: JoinHandle<()>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let policy = if args.config.exists() {
            load_config(&args.config)
                .with_context(|| format!("Failed to load config from {:?}", args.config))?
        } else {
            warn!(config_path = %args.config.display(), "Config file not found, using defaults");
            FacilityPolicy::default()
        };

        info!(
            config_path = %args.config.display(),
            trainer_count = policy.trainers.len(),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| policy.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| policy.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = database_path(&data_dir);
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path, policy.booking.lock_timeout)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        let (notifier, notifier_task) = ChannelNotifier::spawn(&policy.trainers);
        let sweeps = policy.sweeps.clone();
        let engine = Arc::new(GymEngine::new(policy, store, Arc::new(notifier)));

        engine
            .append_audit(AuditEventType::ServiceStarted, gym_util::now())
            .context("Failed to record service start")?;

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        let shared = Arc::new(Shared {
            engine,
            ipc: Arc::new(ipc),
            rate_limiter: Mutex::new(RateLimiter::new(
                RATE_LIMIT_PER_SECOND,
                Duration::from_secs(1),
            )),
            sweep_times: Mutex::new(SweepTimes::default()),
        });

        Ok(Self {
            shared,
            sweeps,
            notifier_task,
        })
    }

    async fn run(self) -> Result<()> {
        let shared = self.shared;
        let mut ipc_messages = shared
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = shared.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        let mut missed_timer = tokio::time::interval(self.sweeps.missed_interval);
        let mut expiry_timer = tokio::time::interval(self.sweeps.expiry_interval);
        let mut cleanup_timer = tokio::time::interval(RATE_LIMIT_CLEANUP);
        for timer in [&mut missed_timer, &mut expiry_timer, &mut cleanup_timer] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }
        // The first tick of an interval fires immediately
        if !self.sweeps.run_on_startup {
            missed_timer.reset();
            expiry_timer.reset();
        }
        cleanup_timer.reset();

        info!(
            missed_interval = ?self.sweeps.missed_interval,
            expiry_interval = ?self.sweeps.expiry_interval,
            "Service running"
        );

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                _ = missed_timer.tick() => {
                    tokio::spawn(run_sweep(shared.clone(), SweepKind::Missed));
                }

                _ = expiry_timer.tick() => {
                    tokio::spawn(run_sweep(shared.clone(), SweepKind::Expiry));
                }

                _ = cleanup_timer.tick() => {
                    let mut limiter = shared.rate_limiter.lock().await;
                    limiter.cleanup(RATE_LIMIT_CLEANUP * 5);
                    debug!(clients = limiter.tracked_clients(), "Rate limiter cleaned up");
                }

                Some(msg) = ipc_messages.recv() => {
                    handle_ipc_message(&shared, msg).await;
                }
            }
        }

        info!("Shutting down gymd");

        shared.ipc.broadcast_event(Event::new(EventPayload::Shutdown));

        if let Err(e) = audit(&shared, AuditEventType::ServiceStopped).await {
            warn!(error = %e, "Failed to log service shutdown");
        }

        shared.ipc.shutdown();
        self.notifier_task.abort();

        info!("Shutdown complete");
        Ok(())
    }
}

async fn handle_ipc_message(shared: &Arc<Shared>, msg: ServerMessage) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            {
                let mut limiter = shared.rate_limiter.lock().await;
                if !limiter.check(&client_id) {
                    let response = Response::error(
                        request.request_id,
                        ErrorInfo::new(ErrorCode::RateLimited, "Too many requests"),
                    );
                    let _ = shared.ipc.send_response(&client_id, response).await;
                    return;
                }
            }

            tokio::spawn(handle_request(shared.clone(), client_id, request));
        }

        ServerMessage::ClientConnected { client_id, info } => {
            debug!(client_id = %client_id, role = ?info.role, "Client registered");

            let event = AuditEventType::ClientConnected {
                client_id: client_id.to_string(),
                role: format!("{:?}", info.role).to_lowercase(),
                uid: info.uid,
            };
            if let Err(e) = audit(shared, event).await {
                warn!(error = %e, "Failed to audit client connection");
            }
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Client disconnected");

            let event = AuditEventType::ClientDisconnected {
                client_id: client_id.to_string(),
            };
            if let Err(e) = audit(shared, event).await {
                warn!(error = %e, "Failed to audit client disconnection");
            }

            shared.rate_limiter.lock().await.remove_client(&client_id);
        }
    }
}

async fn handle_request(shared: Arc<Shared>, client_id: ClientId, request: Request) {
    let request_id = request.request_id;

    let response = if request.api_version != API_VERSION {
        Response::error(
            request_id,
            ErrorInfo::new(
                ErrorCode::InvalidRequest,
                format!(
                    "Unsupported API version {} (expected {})",
                    request.api_version, API_VERSION
                ),
            ),
        )
    } else {
        match request.command {
            Command::SubscribeEvents => Response::success(
                request_id,
                ResponsePayload::Subscribed {
                    client_id: client_id.clone(),
                },
            ),

            Command::UnsubscribeEvents => {
                Response::success(request_id, ResponsePayload::Unsubscribed)
            }

            Command::GetHealth => {
                Response::success(request_id, ResponsePayload::Health(health(&shared).await))
            }

            command => {
                let role = shared
                    .ipc
                    .get_client_info(&client_id)
                    .await
                    .map(|info| info.role)
                    .unwrap_or(ClientRole::Staff);

                let engine = shared.engine.clone();
                let now = gym_util::now();
                let handled = tokio::task::spawn_blocking(move || {
                    handlers::execute(&engine, role, command, now)
                })
                .await;

                match handled {
                    Ok(handled) => {
                        for event in handled.events {
                            shared
                                .ipc
                                .broadcast_event(Event::new(handlers::event_payload(event)));
                        }
                        match handled.result {
                            Ok(payload) => Response::success(request_id, payload),
                            Err(info) => Response::error(request_id, info),
                        }
                    }
                    Err(e) => {
                        error!(error = %e, request_id, "Command handler panicked");
                        Response::error(
                            request_id,
                            ErrorInfo::new(ErrorCode::InternalError, "Command handler failed"),
                        )
                    }
                }
            }
        }
    };

    if let Err(e) = shared.ipc.send_response(&client_id, response).await {
        debug!(client_id = %client_id, error = %e, "Client gone before response");
    }
}

async fn run_sweep(shared: Arc<Shared>, kind: SweepKind) {
    let engine = shared.engine.clone();
    let now = gym_util::now();
    let result = tokio::task::spawn_blocking(move || match kind {
        SweepKind::Missed => engine.run_missed_sweep(now),
        SweepKind::Expiry => engine.run_expiry_sweep(now),
    })
    .await;

    match result {
        Ok(Ok(outcome)) => {
            {
                let mut times = shared.sweep_times.lock().await;
                match kind {
                    SweepKind::Missed => times.missed = Some(now),
                    SweepKind::Expiry => times.expiry = Some(now),
                }
            }
            for event in outcome.events {
                shared
                    .ipc
                    .broadcast_event(Event::new(handlers::event_payload(event)));
            }
        }
        Ok(Err(e)) => warn!(sweep = kind.as_str(), error = %e, "Sweep failed"),
        Err(e) => error!(sweep = kind.as_str(), error = %e, "Sweep task panicked"),
    }
}

async fn health(shared: &Arc<Shared>) -> HealthStatus {
    let engine = shared.engine.clone();
    let store_ok = tokio::task::spawn_blocking(move || engine.is_healthy())
        .await
        .unwrap_or(false);

    let times = shared.sweep_times.lock().await;
    HealthStatus {
        live: true,
        ready: store_ok,
        store_ok,
        last_missed_sweep: times.missed,
        last_expiry_sweep: times.expiry,
    }
}

/// Record a service-level audit event off the async threads
async fn audit(shared: &Arc<Shared>, event: AuditEventType) -> Result<()> {
    let engine = shared.engine.clone();
    let now = gym_util::now();
    tokio::task::spawn_blocking(move || engine.append_audit(event, now))
        .await
        .context("Audit task failed")??;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!(version = env!("CARGO_PKG_VERSION"), "gymd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
