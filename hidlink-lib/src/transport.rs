//! The seam between the supervisor and the operating system's serial ports.
//!
//! [`SystemPorts`] is the real implementation on top of the `serialport`
//! crate. Tests drive the supervisor through the same traits with an
//! in-memory bridge.

use crate::error::LinkError;
use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Read/write timeout applied to opened ports
const PORT_TIMEOUT: Duration = Duration::from_millis(100);

/// A serial endpoint as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    /// Human-readable description (the USB product string for USB adapters)
    pub description: Option<String>,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
}

/// One open serial handle.
pub trait SerialLink: Send {
    fn name(&self) -> &str;

    fn baud_rate(&self) -> u32;

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError>;

    /// Bytes that can be read without blocking
    fn bytes_to_read(&mut self) -> Result<usize, LinkError>;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError>;

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), LinkError>;

    /// Drops anything still queued in either direction
    fn clear(&mut self) -> Result<(), LinkError>;
}

/// Enumerates and opens serial endpoints.
pub trait PortProvider: Send {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, LinkError>;

    fn open(&self, name: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, LinkError>;
}

/// Serial ports of the host, via `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortProvider for SystemPorts {
    fn available_ports(&self) -> Result<Vec<PortDescriptor>, LinkError> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|info| match info.port_type {
                SerialPortType::UsbPort(usb) => PortDescriptor {
                    name: info.port_name,
                    description: usb.product,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                },
                _ => PortDescriptor {
                    name: info.port_name,
                    description: None,
                    vid: None,
                    pid: None,
                },
            })
            .collect())
    }

    fn open(&self, name: &str, baud_rate: u32) -> Result<Box<dyn SerialLink>, LinkError> {
        let port = serialport::new(name, baud_rate).timeout(PORT_TIMEOUT).open()?;
        debug!(port = name, baud_rate, "Serial port opened");
        Ok(Box::new(SystemLink {
            name: name.to_string(),
            baud_rate,
            port,
        }))
    }
}

struct SystemLink {
    name: String,
    baud_rate: u32,
    port: Box<dyn SerialPort>,
}

impl SerialLink for SystemLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn write_all(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkError> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        Ok(self.port.read(buf)?)
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), LinkError> {
        self.port.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), LinkError> {
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }
}
