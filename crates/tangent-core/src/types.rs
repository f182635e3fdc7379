use serde::{Deserialize, Serialize};

/// Number of physical keys on the pad.
pub const KEY_COUNT: u8 = 8;

/// Edge codes in the key log: a down edge is stored as the key index,
/// an up edge as the key index plus this offset.
pub const RELEASE_OFFSET: u8 = 10;

/// Bit for physical key `key` in the live-held bitmask. Key 0 is the MSB,
/// matching the pad's left-to-right wiring order.
pub const fn key_bit(key: u8) -> u8 {
    0x80 >> key
}

/// The two modifier anchor keys (0 and 4).
pub const ANCHOR_MASK: u8 = key_bit(0) | key_bit(4);

/// The four-key panic/reset chord (2, 3, 6, 7).
pub const PANIC_MASK: u8 = key_bit(2) | key_bit(3) | key_bit(6) | key_bit(7);

/// A single key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEdge {
    Down,
    Up,
}

pub const fn edge_code(key: u8, edge: KeyEdge) -> u8 {
    match edge {
        KeyEdge::Down => key,
        KeyEdge::Up => key + RELEASE_OFFSET,
    }
}

pub const fn split_code(code: u8) -> (u8, KeyEdge) {
    if code >= RELEASE_OFFSET {
        (code - RELEASE_OFFSET, KeyEdge::Up)
    } else {
        (code, KeyEdge::Down)
    }
}

/// One Morse element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    Dit,
    Dah,
}

impl Element {
    /// Pattern digit used by the lookup table: dit = '0', dah = '1'.
    pub const fn digit(self) -> char {
        match self {
            Element::Dit => '0',
            Element::Dah => '1',
        }
    }
}

/// Active key layer. Cycled (mod 4) by the layer-change gesture.
/// `Numbers` is reserved wiring for a future layer; it cycles through but
/// binds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyLayer {
    DashDots,
    Numbers,
    Arrows,
    Media,
}

impl KeyLayer {
    pub const fn next(self) -> Self {
        match self {
            KeyLayer::DashDots => KeyLayer::Numbers,
            KeyLayer::Numbers => KeyLayer::Arrows,
            KeyLayer::Arrows => KeyLayer::Media,
            KeyLayer::Media => KeyLayer::DashDots,
        }
    }
}

impl Default for KeyLayer {
    fn default() -> Self {
        KeyLayer::DashDots
    }
}

/// Which lock each anchor key carries. Cycled (mod 3) by the two-anchor
/// toggle gesture. First name is key 0, second is key 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifyLayer {
    CtrlShift,
    CtrlGui,
    ShiftGui,
}

impl ModifyLayer {
    pub const fn next(self) -> Self {
        match self {
            ModifyLayer::CtrlShift => ModifyLayer::CtrlGui,
            ModifyLayer::CtrlGui => ModifyLayer::ShiftGui,
            ModifyLayer::ShiftGui => ModifyLayer::CtrlShift,
        }
    }

    /// True when key 0 currently represents the ctrl lock.
    pub const fn ctrl_on_anchor(self) -> bool {
        matches!(self, ModifyLayer::CtrlShift | ModifyLayer::CtrlGui)
    }

    /// True when key 4 currently represents the gui lock.
    pub const fn gui_on_anchor(self) -> bool {
        matches!(self, ModifyLayer::CtrlGui | ModifyLayer::ShiftGui)
    }
}

impl Default for ModifyLayer {
    fn default() -> Self {
        ModifyLayer::CtrlShift
    }
}

/// Sticky modifier locks carried on every character output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyLocks {
    pub shift: bool,
    pub ctrl: bool,
    pub gui: bool,
}

impl KeyLocks {
    pub const fn none() -> Self {
        Self {
            shift: false,
            ctrl: false,
            gui: false,
        }
    }

    pub const fn is_empty(self) -> bool {
        !(self.shift || self.ctrl || self.gui)
    }

    pub fn clear(&mut self) {
        *self = Self::none();
    }
}

/// Non-printing keyboard keys the decoder can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlKey {
    Escape,
    PrintScreen,
    Tab,
    Backspace,
    Enter,
    Space,
    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
}

/// Consumer-control codes for the media layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKey {
    PlayPause,
    NextTrack,
    PrevTrack,
    VolumeUp,
    VolumeDown,
    Mute,
}

/// A decoded keyboard output, before HID usage mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeySym {
    Char(char),
    Control(ControlKey),
}

/// Diagnosable anomalies. Formatted into log output only; the public entry
/// points never propagate these (the device degrades and continues).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("impossible key index: {0}")]
    KeyOutOfRange(u8),
    #[error("no character mapped for dash/dot pattern `{0}`")]
    UnknownPattern(String),
}
