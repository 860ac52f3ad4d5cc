//! powerwardd - The powerward background service
//!
//! Wires together:
//! - Configuration loading
//! - ESXi gateway (SSH + Wake-on-LAN)
//! - Transition executor and reconciliation loop
//! - IPC server for the control surface

use anyhow::{Context, Result};
use clap::Parser;
use powerward_api::{
    ClientRole, Command, Direction, ErrorCode, ErrorInfo, Event, EventPayload, Response, ResponsePayload,
};
use powerward_config::load_config;
use powerward_core::{
    CoreEvent, PowerController, Reconciler, Schedule, TransitionError, TransitionExecutor,
    believed_state, seed_believed_state,
};
use powerward_host_api::HostGateway;
use powerward_host_esxi::EsxiGateway;
use powerward_ipc::{IpcServer, ServerMessage};
use powerward_util::{ClientId, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// powerwardd - Keeps an ESXi host powered on during a daily window
#[derive(Parser, Debug)]
#[command(name = "powerwardd")]
#[command(about = "Keeps an ESXi host powered on during a daily window", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/powerward/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set POWERWARD_SOCKET env var)
    #[arg(short, long, env = "POWERWARD_SOCKET")]
    socket: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Serve the control surface only; never act on the schedule
    #[arg(long)]
    no_manage: bool,
}

/// Main service state
struct Service {
    controller: PowerController,
    reconciler: Option<Reconciler>,
    core_events: mpsc::UnboundedReceiver<CoreEvent>,
    ipc: Arc<IpcServer>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(
            config_path = %args.config.display(),
            host = %settings.host.address,
            mac = %settings.host.mac_address,
            schedule = %format!(
                "{}-{} {}",
                settings.schedule.start, settings.schedule.end, settings.schedule.timezone
            ),
            "Configuration loaded"
        );

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.service.socket_path.clone());

        let gateway: Arc<dyn HostGateway> = Arc::new(EsxiGateway::from_settings(&settings.host));

        let (event_tx, core_events) = mpsc::unbounded_channel();
        let executor = TransitionExecutor::new(
            gateway.clone(),
            settings.host.mac_address,
            settings.retry,
            settings.shutdown,
            event_tx,
        );

        // One probe decides where the loop starts from
        let seed = seed_believed_state(gateway.as_ref(), powerward_util::now()).await;
        let (state_writer, state_reader) = believed_state(seed);

        let schedule = Schedule::from_settings(&settings.schedule);
        let managed = !args.no_manage;
        let controller =
            PowerController::new(executor.clone(), schedule.clone(), state_reader, managed);

        let reconciler = if managed {
            Some(Reconciler::new(
                schedule,
                executor,
                state_writer,
                settings.service.poll_interval,
            ))
        } else {
            warn!("Schedule management disabled, serving control surface only");
            None
        };

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start()
            .await
            .with_context(|| format!("Failed to start IPC server at {:?}", socket_path))?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            controller,
            reconciler,
            core_events,
            ipc: Arc::new(ipc),
        })
    }

    async fn run(self) -> Result<()> {
        let Service {
            controller,
            reconciler,
            mut core_events,
            ipc,
        } = self;

        let mut ipc_messages = ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let reconcile_handle: Option<JoinHandle<()>> =
            reconciler.map(|r| tokio::spawn(r.run(shutdown_rx)));

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;
        let mut sighup =
            signal(SignalKind::hangup()).context("Failed to create SIGHUP handler")?;

        info!("Service running");

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

                Some(event) = core_events.recv() => {
                    ipc.broadcast_event(Event::new(event.into()));
                }

                Some(msg) = ipc_messages.recv() => {
                    // A live probe can take a while; keep the loop responsive
                    tokio::spawn(handle_ipc_message(controller.clone(), ipc.clone(), msg));
                }
            }
        }

        info!("Shutting down powerwardd");

        let _ = shutdown_tx.send(true);
        if let Some(handle) = reconcile_handle {
            if controller.health().transition_in_flight {
                info!("Waiting for the running procedure to finish");
            }
            if let Err(e) = handle.await {
                error!(error = %e, "Reconciliation loop panicked");
            }
        }

        // Flush whatever the loop reported while stopping
        while let Ok(event) = core_events.try_recv() {
            ipc.broadcast_event(Event::new(event.into()));
        }

        ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        ipc.shutdown();

        info!("Shutdown complete");
        Ok(())
    }
}

async fn handle_ipc_message(controller: PowerController, ipc: Arc<IpcServer>, msg: ServerMessage) {
    match msg {
        ServerMessage::Request { client_id, request } => {
            let role = ipc
                .get_client_info(&client_id)
                .await
                .map(|info| info.role)
                .unwrap_or(ClientRole::Observer);

            let response =
                handle_command(&controller, role, &client_id, request.request_id, request.command)
                    .await;

            if let Err(e) = ipc.send_response(&client_id, response).await {
                warn!(client_id = %client_id, error = %e, "Failed to send response");
            }
        }

        ServerMessage::ClientConnected { client_id, info } => {
            info!(
                client_id = %client_id,
                role = ?info.role,
                uid = ?info.uid,
                "Client connected"
            );
        }

        ServerMessage::ClientDisconnected { client_id } => {
            debug!(client_id = %client_id, "Client disconnected");
        }
    }
}

async fn handle_command(
    controller: &PowerController,
    role: ClientRole,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> Response {
    if command.is_trigger() && !role.can_trigger() {
        warn!(client_id = %client_id, ?command, "Observer attempted a power transition");
        return Response::error(
            request_id,
            ErrorInfo::new(
                ErrorCode::PermissionDenied,
                "Only admin clients may trigger power transitions",
            ),
        );
    }

    match command {
        Command::GetState => Response::success(
            request_id,
            ResponsePayload::State(controller.snapshot(powerward_util::now())),
        ),

        Command::PowerOn | Command::PowerOff => {
            let (direction, result) = if matches!(command, Command::PowerOn) {
                (Direction::PowerOn, controller.trigger_power_on())
            } else {
                (Direction::PowerOff, controller.trigger_power_off())
            };

            match result {
                Ok(transition_id) => Response::success(
                    request_id,
                    ResponsePayload::TransitionAccepted {
                        transition_id,
                        direction,
                    },
                ),
                Err(e @ TransitionError::Busy { .. }) => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::TransitionInProgress, e.to_string()),
                ),
                Err(e) => Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::InternalError, e.to_string()),
                ),
            }
        }

        Command::QueryReachable => {
            let reachable = controller.query_reachable().await;
            Response::success(request_id, ResponsePayload::Reachable { reachable })
        }

        // The IPC layer already flipped the subscription flag
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
            Response::success(request_id, ResponsePayload::Health(controller.health()))
        }

        Command::Ping => Response::success(request_id, ResponsePayload::Pong),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        managed = !args.no_manage,
        "powerwardd starting"
    );

    if powerward_util::is_mock_time_active() {
        warn!(now = %powerward_util::now(), "Mock time active, schedule follows the shifted clock");
    }

    let service = Service::new(&args).await?;
    service.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerward_api::{BelievedState, ResponseResult};
    use powerward_config::{RetryPolicy, ShutdownPolicy};
    use powerward_host_api::{MacAddress, MockGateway, Reachability};
    use powerward_util::WallClock;
    use std::time::Duration;

    fn controller(mock: &MockGateway) -> (PowerController, mpsc::UnboundedReceiver<CoreEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let executor = TransitionExecutor::new(
            Arc::new(mock.clone()),
            MacAddress::new([0x00, 0x1b, 0x21, 0x3a, 0x4f, 0x10]),
            RetryPolicy {
                max_attempts: 1,
                delay: Duration::from_secs(1),
            },
            ShutdownPolicy::default(),
            tx,
        );
        let (_writer, reader) = believed_state(BelievedState::probed(true, powerward_util::now()));
        let schedule = Schedule::new(
            WallClock::new(9, 0).unwrap(),
            WallClock::new(17, 0).unwrap(),
            "UTC",
        );
        (PowerController::new(executor, schedule, reader, true), rx)
    }

    fn error_code(response: &Response) -> Option<ErrorCode> {
        match &response.result {
            ResponseResult::Err(e) => Some(e.code),
            ResponseResult::Ok(_) => None,
        }
    }

    #[tokio::test]
    async fn observer_cannot_trigger() {
        let mock = MockGateway::new();
        let (ctl, _events) = controller(&mock);
        let client = ClientId::new();

        let resp = handle_command(&ctl, ClientRole::Observer, &client, 1, Command::PowerOff).await;

        assert_eq!(error_code(&resp), Some(ErrorCode::PermissionDenied));
        assert!(mock.calls().is_empty());
        assert!(!ctl.health().transition_in_flight);
    }

    #[tokio::test]
    async fn observer_can_read_state() {
        let mock = MockGateway::new();
        let (ctl, _events) = controller(&mock);
        let client = ClientId::new();

        let resp = handle_command(&ctl, ClientRole::Observer, &client, 4, Command::GetState).await;
        assert_eq!(resp.request_id, 4);
        match resp.result {
            ResponseResult::Ok(ResponsePayload::State(snapshot)) => {
                assert!(snapshot.managed);
                assert_eq!(snapshot.schedule.to_string(), "09:00-17:00 UTC");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn admin_trigger_is_accepted_then_busy() {
        let mock = MockGateway::new().with_command_delay(Duration::from_secs(2));
        let (ctl, _events) = controller(&mock);
        let client = ClientId::new();

        let first = handle_command(&ctl, ClientRole::Admin, &client, 1, Command::PowerOff).await;
        match first.result {
            ResponseResult::Ok(ResponsePayload::TransitionAccepted { direction, .. }) => {
                assert_eq!(direction, Direction::PowerOff);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let second = handle_command(&ctl, ClientRole::Admin, &client, 2, Command::PowerOn).await;
        assert_eq!(error_code(&second), Some(ErrorCode::TransitionInProgress));
    }

    #[tokio::test]
    async fn reachable_reports_live_probe() {
        let mock = MockGateway::with_reachability(Reachability::Fixed(false));
        let (ctl, _events) = controller(&mock);
        let client = ClientId::new();

        let resp =
            handle_command(&ctl, ClientRole::Observer, &client, 9, Command::QueryReachable).await;
        assert!(matches!(
            resp.result,
            ResponseResult::Ok(ResponsePayload::Reachable { reachable: false })
        ));
        assert_eq!(mock.probe_count(), 1);
    }

    #[tokio::test]
    async fn subscribe_echoes_client_id() {
        let mock = MockGateway::new();
        let (ctl, _events) = controller(&mock);
        let client = ClientId::new();

        let resp =
            handle_command(&ctl, ClientRole::Observer, &client, 1, Command::SubscribeEvents).await;
        match resp.result {
            ResponseResult::Ok(ResponsePayload::Subscribed { client_id }) => {
                assert_eq!(client_id, client);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let pong = handle_command(&ctl, ClientRole::Observer, &client, 2, Command::Ping).await;
        assert!(matches!(pong.result, ResponseResult::Ok(ResponsePayload::Pong)));
    }
}
