use crate::constants::{CMD_SET_PARA_CFG_PREFIX, CONFIG_BLOCK_SIZE, DEFAULT_BAUDRATE, EXPECTED_MODE};
use crate::frame::{CommandCode, Frame, FrameKind};
use crate::message::Command;
use bytes::Bytes;
use serde::Serialize;
use zerocopy::byteorder::{big_endian, little_endian};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Number of leading config bytes the set-config prefix overrides
/// (mode, serial mode, address, baud rate).
const FORCED_PREFIX_LEN: usize = 7;

/// The 50-byte parameter block as the chip lays it out.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct ConfigBlockRaw {
    pub mode: u8,
    pub serial_mode: u8,
    pub address: u8,
    pub baud_rate: big_endian::U32,
    pub reserved: [u8; 2],
    pub packet_interval_ms: big_endian::U16,
    pub vid: little_endian::U16,
    pub pid: little_endian::U16,
    pub keyboard_upload_interval_ms: big_endian::U16,
    pub keyboard_release_delay_ms: big_endian::U16,
    pub auto_enter: u8,
    pub enter_chars: [u8; 8],
    pub filter_strings: [u8; 12],
    pub usb_string_flags: u8,
    pub keyboard_fast_upload: u8,
    pub reserved_tail: [u8; 8],
}

/// Decoded get-parameter-config response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceConfig {
    /// Operating mode, `0x82` when the chip is usable by this driver
    pub mode: u8,
    pub serial_mode: u8,
    pub address: u8,
    pub baud_rate: u32,
    pub packet_interval_ms: u16,
    pub vid: u16,
    pub pid: u16,
    pub usb_string_flags: u8,
    #[serde(skip)]
    raw: Bytes,
}

impl DeviceConfig {
    /// Parses the config block out of a `0x88` response frame.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match frame.kind() {
            FrameKind::Response(CommandCode::ParaCfgAck) => Self::from_block(&frame.data()),
            _ => None,
        }
    }

    /// Parses a bare config block. Extra trailing bytes are ignored.
    pub fn from_block(block: &[u8]) -> Option<Self> {
        let (raw, _) = ConfigBlockRaw::read_from_prefix(block).ok()?;
        Some(Self {
            mode: raw.mode,
            serial_mode: raw.serial_mode,
            address: raw.address,
            baud_rate: raw.baud_rate.get(),
            packet_interval_ms: raw.packet_interval_ms.get(),
            vid: raw.vid.get(),
            pid: raw.pid.get(),
            usb_string_flags: raw.usb_string_flags,
            raw: Bytes::copy_from_slice(raw.as_bytes()),
        })
    }

    /// True when the chip runs at the default line rate in the expected mode.
    pub fn is_expected(&self) -> bool {
        self.baud_rate == DEFAULT_BAUDRATE && self.mode == EXPECTED_MODE
    }

    pub fn as_block(&self) -> &[u8] {
        &self.raw
    }

    /// Overrides the USB vendor and product IDs the chip enumerates with.
    pub fn with_usb_ids(self, vid: u16, pid: u16) -> Self {
        self.patch(|raw| {
            raw.vid.set(vid);
            raw.pid.set(pid);
        })
    }

    /// Sets which custom USB string descriptors the chip reports
    /// (bit 0 serial, bit 1 product, bit 2 manufacturer, bit 7 enable).
    pub fn with_usb_string_flags(self, flags: u8) -> Self {
        self.patch(|raw| raw.usb_string_flags = flags)
    }

    /// Builds a set-parameter-config command that switches the chip to the
    /// expected mode and default line rate while keeping its other settings.
    pub fn reconfigure_command(&self) -> Command {
        let mut payload = Vec::with_capacity(CONFIG_BLOCK_SIZE - FORCED_PREFIX_LEN);
        payload.extend_from_slice(&self.raw[FORCED_PREFIX_LEN..]);
        Command::SetParaCfg(Bytes::from(payload))
    }

    fn patch(self, apply: impl FnOnce(&mut ConfigBlockRaw)) -> Self {
        let Ok((mut raw, _)) = ConfigBlockRaw::read_from_prefix(&self.raw) else {
            return self;
        };
        apply(&mut raw);
        Self::from_block(raw.as_bytes()).unwrap_or(self)
    }
}

/// Length of the full set-config frame body (prefix plus preserved settings)
#[cfg(test)]
pub(crate) const SET_PARA_CFG_BODY_LEN: usize = CMD_SET_PARA_CFG_PREFIX.len() + CONFIG_BLOCK_SIZE - FORCED_PREFIX_LEN;
