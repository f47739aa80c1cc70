use crate::config::DeviceConfig;
use crate::constants::{
    CMD_GET_PARA_CFG, CMD_RESET, CMD_SET_DEFAULT_CFG, CMD_SET_PARA_CFG_PREFIX, CMD_SET_USB_STRING_PREFIX,
    MAX_USB_STRING_LEN, MOUSE_ABS_ACTION_PREFIX, MOUSE_REL_ACTION_PREFIX,
};
use crate::frame::{self, CommandCode, Frame, FrameKind, ProtocolErrorCode};
use crate::mouse::MouseButtons;
use bytes::{Bytes, BytesMut};
use num_enum::IntoPrimitive;
use strum_macros::Display;

/// Which USB string descriptor a [`Command::SetUsbString`] replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, Display)]
#[repr(u8)]
pub enum UsbStringKind {
    #[strum(to_string = "manufacturer")]
    Manufacturer = 0x00,
    #[strum(to_string = "product")]
    Product = 0x01,
    #[strum(to_string = "serial number")]
    SerialNumber = 0x02,
}

/// Outbound commands understood by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetParaCfg,
    /// Settings following the forced mode/address/baud bytes
    SetParaCfg(Bytes),
    Reset,
    /// Restore the chip's factory parameters
    FactoryReset,
    MouseAbsolute {
        x: u16,
        y: u16,
        buttons: MouseButtons,
        wheel: u8,
    },
    MouseRelative {
        dx: i8,
        dy: i8,
        buttons: MouseButtons,
        wheel: u8,
    },
    /// USB descriptor change; text longer than 23 bytes is truncated
    SetUsbString { kind: UsbStringKind, text: String },
}

impl Command {
    pub fn usb_string(kind: UsbStringKind, text: impl Into<String>) -> Self {
        Command::SetUsbString {
            kind,
            text: text.into(),
        }
    }

    pub fn code(&self) -> CommandCode {
        match self {
            Command::GetParaCfg => CommandCode::GetParaCfg,
            Command::SetParaCfg(_) => CommandCode::SetParaCfg,
            Command::Reset => CommandCode::Reset,
            Command::FactoryReset => CommandCode::SetDefaultCfg,
            Command::MouseAbsolute { .. } => CommandCode::MouseAbsolute,
            Command::MouseRelative { .. } => CommandCode::MouseRelative,
            Command::SetUsbString { .. } => CommandCode::SetUsbString,
        }
    }

    /// Prefix and payload without the checksum, as taken by `send_command`.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(64);
        match self {
            Command::GetParaCfg => out.extend_from_slice(CMD_GET_PARA_CFG),
            Command::SetParaCfg(settings) => {
                out.extend_from_slice(CMD_SET_PARA_CFG_PREFIX);
                out.extend_from_slice(settings);
            }
            Command::Reset => out.extend_from_slice(CMD_RESET),
            Command::FactoryReset => out.extend_from_slice(CMD_SET_DEFAULT_CFG),
            Command::MouseAbsolute { x, y, buttons, wheel } => {
                out.extend_from_slice(MOUSE_ABS_ACTION_PREFIX);
                out.extend_from_slice(&[buttons.mask()]);
                out.extend_from_slice(&x.to_le_bytes());
                out.extend_from_slice(&y.to_le_bytes());
                out.extend_from_slice(&[*wheel]);
            }
            Command::MouseRelative { dx, dy, buttons, wheel } => {
                out.extend_from_slice(MOUSE_REL_ACTION_PREFIX);
                out.extend_from_slice(&[buttons.mask(), *dx as u8, *dy as u8, *wheel]);
            }
            Command::SetUsbString { kind, text } => {
                let text = truncate_utf8(text, MAX_USB_STRING_LEN);
                out.extend_from_slice(CMD_SET_USB_STRING_PREFIX);
                out.extend_from_slice(&[(text.len() + 2) as u8, u8::from(*kind), text.len() as u8]);
                out.extend_from_slice(text.as_bytes());
            }
        }
        out.freeze()
    }

    /// Complete frame including the checksum.
    pub fn encode(&self) -> Bytes {
        frame::encode(&self.to_bytes(), &[])
    }
}

fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Inbound frames, classified by discriminant.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Reply to get-parameter-config
    ParaCfg(DeviceConfig),
    /// Mouse action acknowledged, with the chip's status byte
    MouseAck { relative: bool, status: u8 },
    /// Any other acknowledged command
    Ack { code: CommandCode, status: u8 },
    /// Device-reported failure in the `0xC_` band
    Error(ProtocolErrorCode),
    /// Known layout but unparseable payload, or a discriminant we do not handle
    Unrecognized(Frame),
}

impl From<Frame> for Response {
    fn from(frame: Frame) -> Self {
        let status = frame.data().first().copied().unwrap_or_default();
        match frame.kind() {
            FrameKind::ProtocolError(code) => Response::Error(code),
            FrameKind::Response(CommandCode::ParaCfgAck) => match DeviceConfig::from_frame(&frame) {
                Some(config) => Response::ParaCfg(config),
                None => Response::Unrecognized(frame),
            },
            FrameKind::Response(CommandCode::MouseAbsoluteAck) => Response::MouseAck {
                relative: false,
                status,
            },
            FrameKind::Response(CommandCode::MouseRelativeAck) => Response::MouseAck { relative: true, status },
            FrameKind::Response(
                code @ (CommandCode::SetParaCfgAck
                | CommandCode::SetUsbStringAck
                | CommandCode::SetDefaultCfgAck
                | CommandCode::ResetAck),
            ) => Response::Ack { code, status },
            FrameKind::Response(_) => Response::Unrecognized(frame),
        }
    }
}
