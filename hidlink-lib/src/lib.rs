pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod events;
pub mod frame;
pub mod message;
pub mod mouse;
pub mod service;
pub mod settings;
pub mod supervisor;
pub mod transport;


// Re-export the types most callers need
pub use config::DeviceConfig;
pub use error::{DecodeError, LinkError};
pub use events::{ChannelSink, EventSink, LinkEvent};
pub use frame::{Frame, FrameDecoder};
pub use message::{Command, Response};
pub use mouse::MouseButtons;
pub use service::LinkHandle;
pub use settings::{ChecksumPolicy, LinkConfig};
pub use supervisor::{ConnectionState, ConnectionSupervisor};
pub use transport::{PortDescriptor, PortProvider, SerialLink, SystemPorts};
