// Protocol constants for CH9329-class HID bridges

use std::time::Duration;

/// Fixed two-byte frame header
pub const FRAME_HEADER: [u8; 2] = [0x57, 0xAB];

/// Default chip address (byte 2 of every frame)
pub const DEFAULT_ADDRESS: u8 = 0x00;

/// Offset of the command / status discriminant
pub const COMMAND_OFFSET: usize = 3;

/// Offset of the data length byte
pub const LENGTH_OFFSET: usize = 4;

/// Bytes needed before the discriminant can be inspected
pub const MIN_INSPECT_SIZE: usize = COMMAND_OFFSET + 1;

/// Header (2) + address (1) + command (1) + length (1) + checksum (1)
pub const FRAME_OVERHEAD: usize = 6;

/// Size of the parameter configuration block
pub const CONFIG_BLOCK_SIZE: usize = 50;

/// Line rate the bridge is expected to run at
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Factory line rate of the chip, tried when the default rate gets no answer
pub const LEGACY_BAUDRATE: u32 = 9_600;

/// Operating mode byte for "keyboard + mouse + custom HID, protocol transfer"
pub const EXPECTED_MODE: u8 = 0x82;

/// Port name passed to the event sink when the link goes down
pub const DISCONNECTED_PORT: &str = "NA";

/// Port description the bridge's USB-serial adapter reports
#[cfg(windows)]
pub const PORT_DESCRIPTION: &str = "USB-SERIAL CH340";
#[cfg(not(windows))]
pub const PORT_DESCRIPTION: &str = "USB Serial";

// --- Command prefixes (checksum excluded) ---

pub const CMD_GET_PARA_CFG: &[u8] = &[0x57, 0xAB, 0x00, 0x08, 0x00];
pub const CMD_RESET: &[u8] = &[0x57, 0xAB, 0x00, 0x0F, 0x00];
pub const CMD_SET_DEFAULT_CFG: &[u8] = &[0x57, 0xAB, 0x00, 0x0C, 0x00];
#[rustfmt::skip]
pub const CMD_SET_PARA_CFG_PREFIX: &[u8] = &[
    0x57, 0xAB, 0x00, 0x09, 0x32, 0x82, 0x80, 0x00, 0x00, 0x01, 0xC2, 0x00,
];
pub const CMD_SET_USB_STRING_PREFIX: &[u8] = &[0x57, 0xAB, 0x00, 0x0B];
pub const MOUSE_ABS_ACTION_PREFIX: &[u8] = &[0x57, 0xAB, 0x00, 0x04, 0x07, 0x02];
pub const MOUSE_REL_ACTION_PREFIX: &[u8] = &[0x57, 0xAB, 0x00, 0x05, 0x05, 0x01];

/// Longest string the USB string descriptor command accepts
pub const MAX_USB_STRING_LEN: usize = 23;

// --- Supervisor timing defaults ---

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
pub const HANDSHAKE_SETTLE: Duration = Duration::from_millis(100);
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);
pub const RECONFIGURE_DELAY: Duration = Duration::from_millis(500);
