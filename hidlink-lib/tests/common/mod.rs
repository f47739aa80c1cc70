//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;
#[allow(unused_imports)]
pub use hidlink_lib::constants::DISCONNECTED_PORT;
#[allow(unused_imports)]
pub use hidlink_lib::frame;
#[allow(unused_imports)]
pub use hidlink_lib::message::Command;
#[allow(unused_imports)]
pub use hidlink_lib::{
    ChannelSink, ChecksumPolicy, ConnectionState, ConnectionSupervisor, LinkConfig, LinkError, LinkEvent,
    MouseButtons, PortDescriptor, PortProvider, SerialLink,
};

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Port name the mock bridge enumerates under
#[allow(dead_code)]
pub const BRIDGE_PORT: &str = "/dev/ttyUSB0";

/// Description the mock bridge's adapter reports
#[allow(dead_code)]
pub const BRIDGE_DESCRIPTION: &str = "USB Serial";

/// VID/PID the mock reports in its parameter block
#[allow(dead_code)]
pub const BRIDGE_VID: u16 = 0x1A86;
#[allow(dead_code)]
pub const BRIDGE_PID: u16 = 0xE129;

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// 50-byte parameter block with the given mode and line rate
#[allow(dead_code)]
pub fn config_block(mode: u8, baud_rate: u32) -> Vec<u8> {
    let mut block = vec![0u8; 50];
    block[0] = mode;
    block[1] = 0x80;
    block[3..7].copy_from_slice(&baud_rate.to_be_bytes());
    block[11..13].copy_from_slice(&BRIDGE_VID.to_le_bytes());
    block[13..15].copy_from_slice(&BRIDGE_PID.to_le_bytes());
    block
}

/// Complete `0x88` response carrying `block`
#[allow(dead_code)]
pub fn config_ack(block: &[u8]) -> Bytes {
    frame::encode(&[0x57, 0xAB, 0x00, 0x88, block.len() as u8], block)
}

/// Timings small enough that the retry paths finish quickly
#[allow(dead_code)]
pub fn fast_config() -> LinkConfig {
    LinkConfig {
        port_description: BRIDGE_DESCRIPTION.to_string(),
        tick_interval: Duration::from_millis(50),
        handshake_timeout: Duration::from_millis(20),
        handshake_settle: Duration::from_millis(2),
        retry_delay: Duration::from_millis(5),
        reconfigure_delay: Duration::from_millis(5),
        poll_interval: Duration::from_millis(1),
        ..LinkConfig::default()
    }
}

/// Opt-in log output: `RUST_LOG=debug cargo test`
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Shared state of the simulated bridge.
#[allow(dead_code)]
#[derive(Debug)]
pub struct BridgeState {
    pub ports: Vec<PortDescriptor>,
    /// Line rate the chip listens at; `None` means it never answers
    pub answer_baud: Option<u32>,
    /// Parameter block reported on get-config
    pub reported: Vec<u8>,
    pub fail_open: bool,
    pub fail_write: bool,
    pub fail_dtr: bool,
    /// Line rate at which the chip answers get-config with line noise
    pub garbled_baud: Option<u32>,
    /// Every `(port, baud)` pair that was opened
    pub opened: Vec<(String, u32)>,
    /// Every frame written, with the rate it was written at
    pub written: Vec<(u32, Bytes)>,
    pub inbound: VecDeque<u8>,
    pub clears: usize,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self {
            ports: vec![PortDescriptor {
                name: BRIDGE_PORT.to_string(),
                description: Some(BRIDGE_DESCRIPTION.to_string()),
                vid: Some(BRIDGE_VID),
                pid: Some(0x7523),
            }],
            answer_baud: Some(115_200),
            reported: config_block(0x82, 115_200),
            fail_open: false,
            fail_write: false,
            fail_dtr: false,
            garbled_baud: None,
            opened: Vec::new(),
            written: Vec::new(),
            inbound: VecDeque::new(),
            clears: 0,
        }
    }
}

impl BridgeState {
    fn on_write(&mut self, baud_rate: u32, data: &[u8]) {
        self.written.push((baud_rate, Bytes::copy_from_slice(data)));
        if self.garbled_baud == Some(baud_rate) && data.get(3) == Some(&0x08) {
            self.inbound.extend([0x00, 0xFF, 0x12]);
            return;
        }
        if self.answer_baud != Some(baud_rate) || data.len() < 4 {
            return;
        }
        match data[3] {
            0x08 => {
                let ack = config_ack(&self.reported);
                self.inbound.extend(ack.iter());
            }
            // Set-config: bytes 5..55 are the whole new block
            0x09 if data.len() > 55 => self.reported.copy_from_slice(&data[5..55]),
            // Short set-config: mode at byte 5, rate big-endian at 8..12
            0x09 if data.len() >= 12 => {
                self.reported[0] = data[5];
                self.reported[3..7].copy_from_slice(&data[8..12]);
            }
            // The new rate only takes effect after a reset
            0x0F => {
                let rate = u32::from_be_bytes([
                    self.reported[3],
                    self.reported[4],
                    self.reported[5],
                    self.reported[6],
                ]);
                self.answer_baud = Some(rate);
            }
            _ => {}
        }
    }
}

/// In-memory bridge, clone it to keep a handle after giving it to the supervisor.
#[derive(Debug, Clone, Default)]
pub struct MockBridge {
    state: Arc<Mutex<BridgeState>>,
}

#[allow(dead_code)]
impl MockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chip that only listens at `baud_rate` and reports `reported`
    pub fn answering_at(baud_rate: u32, reported: Vec<u8>) -> Self {
        let bridge = Self::default();
        {
            let mut state = bridge.state();
            state.answer_baud = Some(baud_rate);
            state.reported = reported;
        }
        bridge
    }

    pub fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().expect("Mock bridge state poisoned")
    }

    pub fn written(&self) -> Vec<(u32, Bytes)> {
        self.state().written.clone()
    }

    pub fn last_written(&self) -> Option<Bytes> {
        self.state().written.last().map(|(_, frame)| frame.clone())
    }

    pub fn opened(&self) -> Vec<(String, u32)> {
        self.state().opened.clone()
    }
}

impl PortProvider for MockBridge {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, LinkError> {
        Ok(self.state().ports.clone())
    }

    fn open(&self, name: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, LinkError> {
        let mut state = self.state();
        if state.fail_open {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "port busy").into());
        }
        state.opened.push((name.to_string(), baud_rate));
        state.inbound.clear();
        Ok(Box::new(MockLink {
            name: name.to_string(),
            baud_rate,
            bridge: self.clone(),
        }))
    }
}

struct MockLink {
    name: String,
    baud_rate: u32,
    bridge: MockBridge,
}

impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let mut state = self.bridge.state();
        if state.fail_write {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed").into());
        }
        state.on_write(self.baud_rate, data);
        Ok(())
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkError> {
        Ok(self.bridge.state().inbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let mut state = self.bridge.state();
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_data_terminal_ready(&mut self, _level: bool) -> Result<(), LinkError> {
        if self.bridge.state().fail_dtr {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device unplugged").into());
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), LinkError> {
        let mut state = self.bridge.state();
        state.inbound.clear();
        state.clears += 1;
        Ok(())
    }
}

/// Drains every event delivered so far.
#[allow(dead_code)]
pub fn drain_events(rx: &mut UnboundedReceiver<LinkEvent>) -> Vec<LinkEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Port names passed to `on_port_connected`, in order.
#[allow(dead_code)]
pub fn port_events(events: &[LinkEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            LinkEvent::PortConnected(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Supervisor wired to `bridge` with a channel sink and fast timings.
#[allow(dead_code)]
pub fn supervisor_for(bridge: &MockBridge) -> (ConnectionSupervisor, UnboundedReceiver<LinkEvent>) {
    supervisor_with(bridge, fast_config())
}

#[allow(dead_code)]
pub fn supervisor_with(
    bridge: &MockBridge,
    config: LinkConfig,
) -> (ConnectionSupervisor, UnboundedReceiver<LinkEvent>) {
    init_tracing();
    let (sink, rx) = ChannelSink::new();
    (ConnectionSupervisor::new(bridge.clone(), sink, config), rx)
}
