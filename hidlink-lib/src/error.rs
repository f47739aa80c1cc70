use std::io;
use thiserror::Error;

/// The primary error type for the `hidlink` library.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("HID bridge not found. Is the serial adapter connected?")]
    DeviceNotFound,

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Timeout waiting for the device: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Link service has shut down")]
    ServiceClosed,
}

/// Errors produced while decoding inbound bytes into frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Insufficient data: expected at least {expected} bytes, got {actual}")]
    Incomplete { expected: usize, actual: usize },

    #[error("Checksum mismatch: frame carries {carried:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { carried: u8, computed: u8 },
}
