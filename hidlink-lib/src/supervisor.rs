//! Connection lifecycle for one HID bridge.
//!
//! The supervisor owns the single open serial handle and is the only thing
//! that mutates it. Everything that can change the connection state (timer
//! ticks, inbound data, caller requests) goes through `&mut self`, so callers
//! either own the supervisor or talk to it through [`crate::service`].

use crate::config::DeviceConfig;
use crate::constants::DISCONNECTED_PORT;
use crate::discovery::find_device_port;
use crate::events::EventSink;
use crate::frame::{self, Frame, FrameDecoder, FrameKind};
use crate::message::{Command, Response};
use crate::mouse::{self, MouseButtons};
use crate::settings::{ChecksumPolicy, LinkConfig};
use crate::transport::{PortProvider, SerialLink};
use strum_macros::Display;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionState {
    Closed,
    Opening,
    AwaitingConfigAck,
    Ready,
}

/// Result of one open + get-config exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handshake {
    Ready,
    /// Nothing usable came back; worth retrying at another rate
    NoResponse,
    /// The device answered with the wrong settings and was told to fix them
    Reconfigured,
}

pub struct ConnectionSupervisor {
    provider: Box<dyn PortProvider>,
    sink: Box<dyn EventSink>,
    config: LinkConfig,
    link: Option<Box<dyn SerialLink>>,
    state: ConnectionState,
    decoder: FrameDecoder,
    device_config: Option<DeviceConfig>,
    /// Whether the sink was told about the current port
    announced: bool,
}

impl ConnectionSupervisor {
    pub fn new(provider: impl PortProvider + 'static, sink: impl EventSink + 'static, config: LinkConfig) -> Self {
        Self {
            provider: Box::new(provider),
            sink: Box::new(sink),
            config,
            link: None,
            state: ConnectionState::Closed,
            decoder: FrameDecoder::new(),
            device_config: None,
            announced: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn port_name(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.name())
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.link.as_ref().map(|link| link.baud_rate())
    }

    /// Last parameter block the device reported
    pub fn device_config(&self) -> Option<&DeviceConfig> {
        self.device_config.as_ref()
    }

    pub fn find_device_port(&self) -> Option<String> {
        find_device_port(self.provider.as_ref(), &self.config.port_description)
    }

    /// Periodic supervision: health-check an open port, or look for the
    /// device and connect when closed.
    pub async fn tick(&mut self) {
        match self.link.as_mut() {
            Some(link) => {
                if let Err(e) = link.set_data_terminal_ready(true) {
                    warn!("Health check failed on {}: {}", link.name(), e);
                    self.close();
                } else if self.state != ConnectionState::Ready {
                    debug!("Port {} is open but not ready, resetting", link.name());
                    self.reset();
                }
            }
            None => {
                debug!("Checking port, closed...");
                if let Some(port) = self.find_device_port() {
                    self.initialize(&port).await;
                }
            }
        }
    }

    /// Opens `port` at the configured rate, falling back once to the legacy
    /// rate when the device does not answer.
    pub async fn initialize(&mut self, port: &str) {
        info!("Initializing port {}", port);
        self.close();

        if self.prepare(port, self.config.baud_rate).await != Handshake::NoResponse {
            return;
        }
        sleep(self.config.retry_delay).await;
        self.close();

        let legacy = self.config.legacy_baud_rate;
        if self.prepare(port, legacy).await == Handshake::NoResponse {
            info!("No response from {} at {} baud either, giving up until next tick", port, legacy);
            self.close();
        }
    }

    async fn prepare(&mut self, port: &str, baud_rate: u32) -> Handshake {
        self.state = ConnectionState::Opening;
        let link = match self.provider.open(port, baud_rate) {
            Ok(link) => link,
            Err(e) => {
                debug!("Open port {} with baudrate {} failed: {}", port, baud_rate, e);
                self.state = ConnectionState::Closed;
                return Handshake::NoResponse;
            }
        };
        info!("Opened port {} with baudrate {}", port, baud_rate);
        self.link = Some(link);
        self.decoder.clear();
        self.state = ConnectionState::AwaitingConfigAck;

        if !self.send(&Command::GetParaCfg, true) {
            debug!("Sending get-config to {} failed", port);
            return Handshake::NoResponse;
        }
        self.await_handshake().await
    }

    async fn await_handshake(&mut self) -> Handshake {
        if timeout(self.config.handshake_timeout, self.wait_readable()).await.is_err() {
            debug!("No reply within {:?}", self.config.handshake_timeout);
            return Handshake::NoResponse;
        }
        sleep(self.config.handshake_settle).await;
        self.poll_inbound().await;

        match (self.state, self.link.is_some()) {
            (ConnectionState::Ready, _) => Handshake::Ready,
            (_, false) => Handshake::Reconfigured,
            _ => Handshake::NoResponse,
        }
    }

    async fn wait_readable(&mut self) {
        loop {
            match self.link.as_mut().map(|link| link.bytes_to_read()) {
                Some(Ok(0)) => {}
                // Data is waiting, or the port is gone and reading will say so
                _ => return,
            }
            sleep(self.config.poll_interval).await;
        }
    }

    /// Reads whatever the port has buffered and dispatches it.
    pub async fn poll_inbound(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let available = match link.bytes_to_read() {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to query {}: {}", link.name(), e);
                return;
            }
        };
        let mut buf = vec![0u8; available];
        match link.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                buf.truncate(n);
                self.handle_data(&buf).await;
            }
            Err(e) => warn!("Failed to read from {}: {}", link.name(), e),
        }
    }

    /// Entry point for inbound bytes, however they were obtained.
    pub async fn handle_data(&mut self, data: &[u8]) {
        debug!(bytes = hex::encode(data), "Serial read");
        self.decoder.push(data);
        while let Some(frame) = self.decoder.next_frame() {
            self.handle_frame(frame).await;
        }
        self.sink.on_data_received(data);
    }

    async fn handle_frame(&mut self, frame: Frame) {
        if let FrameKind::Response(_) = frame.kind() {
            if let Err(e) = frame.verify_checksum() {
                match self.config.checksum_policy {
                    ChecksumPolicy::Strict => {
                        warn!(bytes = hex::encode(frame.as_bytes()), "Dropping frame: {}", e);
                        return;
                    }
                    ChecksumPolicy::Advisory => {
                        warn!(bytes = hex::encode(frame.as_bytes()), "{}, processing anyway", e)
                    }
                }
            }
        }

        match Response::from(frame) {
            Response::Error(code) => {
                warn!("Error({:#04x}), {}", u8::from(code), code);
            }
            Response::ParaCfg(config) => self.handle_device_config(config).await,
            Response::MouseAck { relative: false, status } => {
                debug!("Absolute mouse event sent, status {:#04x}", status);
            }
            Response::MouseAck { relative: true, status } => {
                debug!("Relative mouse event sent, status {:#04x}", status);
            }
            Response::Ack { code, status } => {
                debug!("{:?} acknowledged, status {:#04x}", code, status);
            }
            Response::Unrecognized(frame) => {
                debug!(bytes = hex::encode(frame.as_bytes()), "Ignoring frame {:#04x}", frame.code());
            }
        }
    }

    async fn handle_device_config(&mut self, config: DeviceConfig) {
        info!("Current baudrate: {}, mode: {:#04x}", config.baud_rate, config.mode);
        self.sink.on_device_config(&config);
        self.device_config = Some(config.clone());

        if config.is_expected() {
            if self.state != ConnectionState::Ready {
                self.state = ConnectionState::Ready;
                if let Some(name) = self.port_name().map(str::to_string) {
                    info!("Port {} ready", name);
                    self.announced = true;
                    self.sink.on_port_connected(&name);
                }
            }
            return;
        }

        warn!(
            "Device runs at {} baud in mode {:#04x}, reconfiguring",
            config.baud_rate, config.mode
        );
        self.apply_config(&config).await;
    }

    /// Writes `config` to the chip (forcing the expected mode and default
    /// line rate) and restarts the chip and the link so it takes effect.
    ///
    /// Returns false when the set-config write failed.
    pub async fn apply_config(&mut self, config: &DeviceConfig) -> bool {
        info!(
            "Writing parameters: VID:PID {:04x}:{:04x}, USB string flags {:#04x}",
            config.vid, config.pid, config.usb_string_flags
        );
        let sent = self.send(&config.reconfigure_command(), true);
        if sent {
            sleep(self.config.reconfigure_delay).await;
            self.send(&Command::Reset, true);
        }
        self.reset();
        sent
    }

    /// Appends the checksum to `data` and writes it.
    ///
    /// Without `force` nothing is written unless the link is ready. A failed
    /// write marks the link not ready but leaves the handle open; the next
    /// health check decides whether to close it.
    pub fn send_command(&mut self, data: &[u8], force: bool) -> bool {
        if !force && self.state != ConnectionState::Ready {
            debug!("Link not ready, dropping command");
            return false;
        }
        let Some(link) = self.link.as_mut() else {
            debug!("Serial port is not open, dropping command");
            return false;
        };

        let frame = frame::encode(data, &[]);
        match link.write_all(&frame) {
            Ok(()) => {
                debug!(bytes = hex::encode(&frame), "Serial write");
                true
            }
            Err(e) => {
                warn!("Write to {} failed: {}", link.name(), e);
                if self.state == ConnectionState::Ready {
                    self.state = ConnectionState::AwaitingConfigAck;
                }
                false
            }
        }
    }

    pub fn send(&mut self, command: &Command, force: bool) -> bool {
        self.send_command(&command.to_bytes(), force)
    }

    pub fn absolute_mouse_action(&mut self, x: u16, y: u16, buttons: MouseButtons, wheel_delta: i32) -> bool {
        self.send(&mouse::absolute_move(x, y, buttons, wheel_delta), false)
    }

    pub fn relative_mouse_action(&mut self, dx: i32, dy: i32, buttons: MouseButtons, wheel_delta: i32) -> bool {
        self.send(&mouse::relative_move(dx, dy, buttons, wheel_delta), false)
    }

    /// Closes the port; the next tick reconnects from scratch.
    pub fn reset(&mut self) {
        info!("Resetting serial port");
        self.close();
    }

    /// Restores the chip's factory parameters, then resets the link.
    pub fn factory_reset(&mut self) -> bool {
        info!("Factory reset of the HID chip");
        let sent = self.send(&Command::FactoryReset, true);
        self.reset();
        sent
    }

    /// Reopens the device at `baud_rate` and re-runs the handshake.
    pub async fn change_baud_rate(&mut self, baud_rate: u32) {
        let port = match self.port_name() {
            Some(name) => Some(name.to_string()),
            None => self.find_device_port(),
        };
        self.close();
        let Some(port) = port else {
            warn!("No bridge port to reopen at {} baud", baud_rate);
            return;
        };
        if self.prepare(&port, baud_rate).await == Handshake::NoResponse {
            self.close();
        }
    }

    pub fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            info!("Close serial port {}", link.name());
            if let Err(e) = link.clear() {
                debug!("Failed to clear {}: {}", link.name(), e);
            }
        }
        self.decoder.clear();
        self.state = ConnectionState::Closed;
        if std::mem::take(&mut self.announced) {
            self.sink.on_port_connected(DISCONNECTED_PORT);
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.close();
    }
}
