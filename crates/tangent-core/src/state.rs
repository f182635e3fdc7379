//! Decoder state: the edge log, the dash/dot accumulator and the single
//! mutable aggregate every matcher works against.

use crate::types::{
    key_bit, split_code, Element, KeyEdge, KeyLayer, KeyLocks, ModifyLayer, ANCHOR_MASK,
};
use serde::Serialize;

/// Slots in the edge ring buffer.
pub const LOG_CAPACITY: usize = 50;

/// Longest history window any matcher inspects: the widest chord definition
/// is 4 keys x 2 edges, plus one guard edge.
pub const THUMB_WINDOW: usize = 9;

/// Capacity of the dash/dot accumulator.
pub const DASH_DOT_CAPACITY: usize = 10;

/// Fixed-capacity ring of raw edge codes with point-in-time bitmask
/// reconstruction.
///
/// An earlier revision kept the total-push counter in a single byte, so it
/// wrapped at 256 while slots were indexed mod 50 and occupancy accounting
/// went quietly wrong after 256 edges. The counter here is a plain `usize`
/// and never wraps in the life of the process: slot = `count % 50`,
/// occupancy = `min(count, 50)`.
#[derive(Debug, Clone)]
pub struct EdgeLog {
    slots: [u8; LOG_CAPACITY],
    count: usize,
}

impl EdgeLog {
    pub const fn new() -> Self {
        Self {
            slots: [0; LOG_CAPACITY],
            count: 0,
        }
    }

    /// Append an edge code, overwriting the oldest slot once full.
    pub fn push(&mut self, code: u8) {
        self.slots[self.count % LOG_CAPACITY] = code;
        self.count += 1;
    }

    /// Edges currently retained.
    pub fn len(&self) -> usize {
        self.count.min(LOG_CAPACITY)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The edge code `back` positions before the most recent one
    /// (`back == 0` is the most recent).
    pub fn last(&self, back: usize) -> Option<u8> {
        if back >= self.len() {
            return None;
        }
        Some(self.slots[(self.count - 1 - back) % LOG_CAPACITY])
    }

    /// The last up-to-nine edge codes in chronological order.
    pub fn recent(&self) -> impl Iterator<Item = u8> + '_ {
        let n = self.len().min(THUMB_WINDOW);
        (0..n).rev().filter_map(move |back| self.last(back))
    }

    /// Reconstruct "what was the live-key bitmask N edges ago" for a series
    /// of consecutive backward windows, without replaying full history.
    ///
    /// Walks backward from the most recent edge. Each window folds its edges
    /// into one frame: a down edge ORs the key's bit in, an up edge ANDs it
    /// out, seeded at 0 if the first folded edge is a down and 0xFF if it is
    /// an up. A zero-size window peeks the next unconsumed edge for its seed
    /// and does not advance the cursor. Once history is exhausted, that
    /// window and every later one yield `None`.
    pub fn frames_from_last<const N: usize>(&self, windows: [usize; N]) -> [Option<u8>; N] {
        let avail = self.len();
        let mut frames = [None; N];
        let mut cursor = 0usize;
        let mut starved = false;
        for (slot, &w) in frames.iter_mut().zip(windows.iter()) {
            if starved || cursor + w.max(1) > avail {
                starved = true;
                continue;
            }
            let (_, first_edge) = split_code(self.slots[(self.count - 1 - cursor) % LOG_CAPACITY]);
            let mut frame: u8 = match first_edge {
                KeyEdge::Up => 0xFF,
                KeyEdge::Down => 0x00,
            };
            for i in 0..w {
                let code = self.slots[(self.count - 1 - cursor - i) % LOG_CAPACITY];
                let (key, edge) = split_code(code);
                match edge {
                    KeyEdge::Down => frame |= key_bit(key),
                    KeyEdge::Up => frame &= !key_bit(key),
                }
            }
            cursor += w;
            *slot = Some(frame);
        }
        frames
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for EdgeLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulator for the character currently being spelled.
#[derive(Debug, Clone)]
pub struct DashDots {
    buf: [Element; DASH_DOT_CAPACITY],
    len: usize,
}

impl DashDots {
    pub const fn new() -> Self {
        Self {
            buf: [Element::Dit; DASH_DOT_CAPACITY],
            len: 0,
        }
    }

    /// Append one element; silently dropped once the buffer is full.
    pub fn push(&mut self, element: Element) {
        if self.len >= DASH_DOT_CAPACITY {
            return;
        }
        self.buf[self.len] = element;
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lookup key for the Morse table: dit = '0', dah = '1', in push order.
    pub fn pattern(&self) -> String {
        self.buf[..self.len].iter().map(|e| e.digit()).collect()
    }

    pub fn reset(&mut self) {
        self.len = 0;
    }
}

impl Default for DashDots {
    fn default() -> Self {
        Self::new()
    }
}

/// The sole mutable aggregate, owned exclusively by the decoder controller.
#[derive(Debug, Clone, Default)]
pub struct DecoderState {
    /// Generation stamp, bumped (wrapping) on every accepted edge. Timer
    /// callbacks re-validate a snapshot of this before acting.
    pub change_flag: u8,
    /// Live held bitmask; bit i is set while physical key i is down.
    pub key_pushed: u8,
    pub key_layer: KeyLayer,
    pub modify_layer: ModifyLayer,
    pub locks: KeyLocks,
    pub dash_dots: DashDots,
    pub log: EdgeLog,
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_change(&mut self) {
        self.change_flag = self.change_flag.wrapping_add(1);
    }

    pub fn push_key(&mut self, key: u8) {
        self.key_pushed |= key_bit(key);
    }

    pub fn release_key(&mut self, key: u8) {
        self.key_pushed &= !key_bit(key);
    }

    pub fn held(&self, key: u8) -> bool {
        self.key_pushed & key_bit(key) != 0
    }

    /// Live bitmask with the two modifier anchors masked out; chord patterns
    /// are compared against this so a held anchor never breaks a chord.
    pub fn held_masked(&self) -> u8 {
        self.key_pushed & !ANCHOR_MASK
    }

    /// Restore every field to its startup value, in place.
    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Forget the accumulator and the log, keeping layer, lock and live-key
    /// state intact. Used after a commit and after a layer change, where a
    /// full reset would discard the user's chosen layer.
    pub fn clear_history(&mut self) {
        self.dash_dots.reset();
        self.log.reset();
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            change_flag: self.change_flag,
            key_pushed: self.key_pushed,
            key_layer: self.key_layer,
            modify_layer: self.modify_layer,
            locks: self.locks,
            dash_dots: self.dash_dots.pattern(),
            recent_edges: self.log.recent().collect(),
        }
    }
}

/// Serializable view of the decoder state for the status indicator and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub change_flag: u8,
    pub key_pushed: u8,
    pub key_layer: KeyLayer,
    pub modify_layer: ModifyLayer,
    pub locks: KeyLocks,
    pub dash_dots: String,
    pub recent_edges: Vec<u8>,
}
