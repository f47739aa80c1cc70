use crate::config::DeviceConfig;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Callbacks the supervisor makes into the surrounding application.
pub trait EventSink: Send {
    /// Called with the port name once the link is ready, and with `"NA"`
    /// when it goes down.
    fn on_port_connected(&mut self, port_name: &str);

    /// Raw inbound bytes, before any decoding.
    fn on_data_received(&mut self, data: &[u8]);

    /// Called for every parameter block the device reports.
    fn on_device_config(&mut self, _config: &DeviceConfig) {}
}

/// Sink that ignores everything.
impl EventSink for () {
    fn on_port_connected(&mut self, _port_name: &str) {}

    fn on_data_received(&mut self, _data: &[u8]) {}
}

/// Events as forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    PortConnected(String),
    DataReceived(Bytes),
    DeviceConfig(DeviceConfig),
}

/// Forwards every callback over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: LinkEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_port_connected(&mut self, port_name: &str) {
        self.forward(LinkEvent::PortConnected(port_name.to_string()));
    }

    fn on_data_received(&mut self, data: &[u8]) {
        self.forward(LinkEvent::DataReceived(Bytes::copy_from_slice(data)));
    }

    fn on_device_config(&mut self, config: &DeviceConfig) {
        self.forward(LinkEvent::DeviceConfig(config.clone()));
    }
}
