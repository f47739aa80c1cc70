//! Mouse input to bridge commands.
//!
//! Builders here only produce [`Command`] values; sending is up to the
//! supervisor, which drops mouse traffic while the link is not ready.
//!
//! Wheel deltas are scaled by 100 per notch. Every non-zero delta moves at
//! least one notch and at most 127 in either direction, so small deltas of
//! either sign still scroll and large ones saturate instead of wrapping.

use crate::message::Command;
use modular_bitfield::prelude::*;

/// Raw input deltas per wheel notch
const WHEEL_STEP: u32 = 100;

/// Largest magnitude that still reads as signed on the wire
const MAX_WHEEL_STEPS: u32 = 127;

const MAX_RELATIVE_STEP: i32 = 127;

#[bitfield(bytes = 1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseButtons {
    pub left: bool,
    pub right: bool,
    pub middle: bool,
    pub back: bool,
    pub forward: bool,
    #[skip]
    unused: B3,
}

impl MouseButtons {
    pub const NONE: u8 = 0x00;
    pub const LEFT: u8 = 0x01;
    pub const RIGHT: u8 = 0x02;
    pub const MIDDLE: u8 = 0x04;
    pub const BACK: u8 = 0x08;
    pub const FORWARD: u8 = 0x10;

    /// Wraps a raw button byte; it is sent to the chip unchanged.
    pub fn from_mask(mask: u8) -> Self {
        Self::from_bytes([mask])
    }

    pub fn mask(&self) -> u8 {
        self.into_bytes()[0]
    }
}

/// Maps a raw wheel delta to the single signed-like byte the bridge expects.
///
/// Positive deltas become `delta / 100`, negative ones `256 - |delta| / 100`,
/// with the notch count clamped to `1..=127` on both sides: `50` gives `1`
/// rather than `0`, `-50` gives `0xFF` rather than wrapping to "no scroll",
/// and anything past 127 notches saturates at `0x7F` / `0x81`.
pub fn map_scroll_wheel(delta: i32) -> u8 {
    if delta == 0 {
        return 0;
    }
    let steps = (delta.unsigned_abs() / WHEEL_STEP).clamp(1, MAX_WHEEL_STEPS) as u8;
    if delta > 0 { steps } else { steps.wrapping_neg() }
}

/// Absolute pointer position, in the bridge's 0..=4095 screen space.
pub fn absolute_move(x: u16, y: u16, buttons: MouseButtons, wheel_delta: i32) -> Command {
    Command::MouseAbsolute {
        x,
        y,
        buttons,
        wheel: map_scroll_wheel(wheel_delta),
    }
}

/// Relative pointer motion. Deltas are clamped to `-127..=127`.
pub fn relative_move(dx: i32, dy: i32, buttons: MouseButtons, wheel_delta: i32) -> Command {
    Command::MouseRelative {
        dx: clamp_step(dx),
        dy: clamp_step(dy),
        buttons,
        wheel: map_scroll_wheel(wheel_delta),
    }
}

fn clamp_step(delta: i32) -> i8 {
    delta.clamp(-MAX_RELATIVE_STEP, MAX_RELATIVE_STEP) as i8
}
