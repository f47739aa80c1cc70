//! Runs a [`ConnectionSupervisor`] on its own tokio task.
//!
//! The supervision tick, inbound polling and caller requests are serialised
//! through one `select!` loop, so only that task ever touches the serial
//! handle. Callers use the cloneable [`LinkHandle`].

use crate::config::DeviceConfig;
use crate::error::LinkError;
use crate::message::Command;
use crate::mouse::{self, MouseButtons};
use crate::supervisor::{ConnectionState, ConnectionSupervisor};
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep, timeout};
use tracing::{debug, info};

const REQUEST_QUEUE_DEPTH: usize = 64;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

enum Request {
    Send {
        data: Bytes,
        force: bool,
        reply: oneshot::Sender<bool>,
    },
    Reset,
    FactoryReset(oneshot::Sender<bool>),
    ApplyConfig {
        config: DeviceConfig,
        reply: oneshot::Sender<bool>,
    },
    ChangeBaudRate(u32),
    State(oneshot::Sender<ConnectionState>),
    DeviceConfig(oneshot::Sender<Option<DeviceConfig>>),
    Shutdown,
}

/// Cloneable command surface for a running link.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    tx: mpsc::Sender<Request>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Send { data, force, .. } => write!(f, "Send({}, force={})", hex::encode(data), force),
            Request::Reset => write!(f, "Reset"),
            Request::FactoryReset(_) => write!(f, "FactoryReset"),
            Request::ApplyConfig { config, .. } => write!(f, "ApplyConfig({:?})", config),
            Request::ChangeBaudRate(rate) => write!(f, "ChangeBaudRate({})", rate),
            Request::State(_) => write!(f, "State"),
            Request::DeviceConfig(_) => write!(f, "DeviceConfig"),
            Request::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Starts the supervision loop. The task ends when [`LinkHandle::shutdown`]
/// is called or every handle is dropped; the port is closed on the way out.
pub fn spawn(supervisor: ConnectionSupervisor) -> (LinkHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let task = tokio::spawn(run(supervisor, rx));
    (LinkHandle { tx }, task)
}

async fn run(mut supervisor: ConnectionSupervisor, mut rx: mpsc::Receiver<Request>) {
    let mut tick = interval(supervisor.config().tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut poll = interval(supervisor.config().poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Link service started");
    loop {
        tokio::select! {
            _ = tick.tick() => supervisor.tick().await,
            _ = poll.tick() => supervisor.poll_inbound().await,
            request = rx.recv() => match request {
                None | Some(Request::Shutdown) => break,
                Some(request) => handle(&mut supervisor, request).await,
            },
        }
    }
    supervisor.close();
    info!("Link service stopped");
}

async fn handle(supervisor: &mut ConnectionSupervisor, request: Request) {
    debug!("Handling {:?}", request);
    // Reply failures only mean the caller stopped waiting
    match request {
        Request::Send { data, force, reply } => {
            let _ = reply.send(supervisor.send_command(&data, force));
        }
        Request::Reset => supervisor.reset(),
        Request::FactoryReset(reply) => {
            let _ = reply.send(supervisor.factory_reset());
        }
        Request::ApplyConfig { config, reply } => {
            let _ = reply.send(supervisor.apply_config(&config).await);
        }
        Request::ChangeBaudRate(rate) => supervisor.change_baud_rate(rate).await,
        Request::State(reply) => {
            let _ = reply.send(supervisor.state());
        }
        Request::DeviceConfig(reply) => {
            let _ = reply.send(supervisor.device_config().cloned());
        }
        Request::Shutdown => {}
    }
}

impl LinkHandle {
    async fn request(&self, request: Request) -> Result<(), LinkError> {
        self.tx.send(request).await.map_err(|_| LinkError::ServiceClosed)
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, LinkError> {
        let (reply, rx) = oneshot::channel();
        self.request(build(reply)).await?;
        rx.await.map_err(|_| LinkError::ServiceClosed)
    }

    /// Sends prefix+payload bytes; the checksum is added by the supervisor.
    /// Returns false when the link refused or failed the write.
    pub async fn send_command(&self, data: impl Into<Bytes>, force: bool) -> bool {
        let data = data.into();
        self.query(|reply| Request::Send { data, force, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn send(&self, command: &Command, force: bool) -> bool {
        self.send_command(command.to_bytes(), force).await
    }

    pub async fn absolute_mouse_action(&self, x: u16, y: u16, buttons: MouseButtons, wheel_delta: i32) -> bool {
        self.send(&mouse::absolute_move(x, y, buttons, wheel_delta), false).await
    }

    pub async fn relative_mouse_action(&self, dx: i32, dy: i32, buttons: MouseButtons, wheel_delta: i32) -> bool {
        self.send(&mouse::relative_move(dx, dy, buttons, wheel_delta), false).await
    }

    pub async fn reset(&self) -> Result<(), LinkError> {
        self.request(Request::Reset).await
    }

    pub async fn factory_reset(&self) -> Result<bool, LinkError> {
        self.query(Request::FactoryReset).await
    }

    /// Writes a patched parameter block, e.g. from
    /// [`DeviceConfig::with_usb_ids`], then restarts the link.
    pub async fn apply_config(&self, config: DeviceConfig) -> Result<bool, LinkError> {
        self.query(|reply| Request::ApplyConfig { config, reply }).await
    }

    pub async fn change_baud_rate(&self, baud_rate: u32) -> Result<(), LinkError> {
        self.request(Request::ChangeBaudRate(baud_rate)).await
    }

    pub async fn state(&self) -> Result<ConnectionState, LinkError> {
        self.query(Request::State).await
    }

    pub async fn device_config(&self) -> Result<Option<DeviceConfig>, LinkError> {
        self.query(Request::DeviceConfig).await
    }

    /// Waits until the link reports ready, for at most `limit`.
    pub async fn wait_ready(&self, limit: Duration) -> Result<(), LinkError> {
        timeout(limit, self.poll_ready()).await?
    }

    async fn poll_ready(&self) -> Result<(), LinkError> {
        while self.state().await? != ConnectionState::Ready {
            sleep(READY_POLL_INTERVAL).await;
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        // Already stopped is fine
        let _ = self.request(Request::Shutdown).await;
    }
}
