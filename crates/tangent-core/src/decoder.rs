//! The decoder controller: per-key dispatch tables over the matcher library,
//! the cooperative timer queue, and the output callback registry.
//!
//! Single-threaded by contract: the pin shim locks [`DECODER`], records an
//! edge or polls, and unlocks. Timers are plain data with deadlines; nothing
//! here blocks or preempts. A timer that outlives the edge that armed it
//! re-validates the generation stamp and the live bit pattern before any
//! visible effect; that check is the whole cancellation mechanism.

use crate::matchers::{
    self, Effect, HoldBinding, HoldTarget, Verdict, BACKSPACE_HOLD, ENTER_HOLD, SPACE_HOLD,
    TAB_HOLD,
};
use crate::state::{DecoderState, StateSnapshot};
use crate::types::{
    edge_code, DecodeError, KeyEdge, KeyLocks, KeySym, MediaKey, ANCHOR_MASK, KEY_COUNT,
};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Debounce-settle delay before a hold chord reports its press.
pub const SETTLE_DELAY: Duration = Duration::from_millis(10);
/// Poll period of the hold-repeat timer.
pub const REPEAT_PERIOD: Duration = Duration::from_millis(50);
/// Window for the modifier-layer toggle to complete.
pub const MODIFY_CONFIRM_DELAY: Duration = Duration::from_millis(150);

lazy_static! {
    /// Process-wide decoder instance for the pin-edge shim.
    pub static ref DECODER: Mutex<Decoder> = Mutex::new(Decoder::new());
}

/// One entry in a per-key attempt chain.
#[derive(Debug, Clone, Copy)]
enum Attempt {
    OccupyLayerChange,
    LayerChange,
    ModifyToggle,
    CtrlLock,
    GuiLock,
    ShiftOnRelease,
    ShiftOnPress,
    Hold(HoldBinding),
    OccupyHoldRelease,
    OccupyForceEmpty,
    ForceEmpty,
    StoreDashDots,
    Commit,
    LayerHold,
}

use Attempt::*;

/// Ordered matcher attempts per key index on a down edge. First success wins.
const DOWN_ATTEMPTS: [&[Attempt]; KEY_COUNT as usize] = [
    &[ModifyToggle, CtrlLock, ShiftOnPress],
    &[OccupyLayerChange, Hold(TAB_HOLD), LayerHold],
    &[
        OccupyForceEmpty,
        Hold(TAB_HOLD),
        Hold(BACKSPACE_HOLD),
        LayerHold,
    ],
    &[OccupyForceEmpty, Hold(BACKSPACE_HOLD), LayerHold],
    &[ModifyToggle, ShiftOnRelease, GuiLock],
    &[OccupyLayerChange, Hold(SPACE_HOLD), Commit, LayerHold],
    &[
        OccupyForceEmpty,
        Hold(SPACE_HOLD),
        Hold(ENTER_HOLD),
        Commit,
        LayerHold,
    ],
    &[OccupyForceEmpty, Hold(ENTER_HOLD), LayerHold],
];

/// Ordered matcher attempts per key index on an up edge.
const UP_ATTEMPTS: [&[Attempt]; KEY_COUNT as usize] = [
    &[CtrlLock, ShiftOnPress],
    &[
        LayerChange,
        OccupyLayerChange,
        OccupyHoldRelease,
        StoreDashDots,
    ],
    &[
        ForceEmpty,
        OccupyForceEmpty,
        OccupyHoldRelease,
        StoreDashDots,
    ],
    &[
        ForceEmpty,
        OccupyForceEmpty,
        OccupyHoldRelease,
        StoreDashDots,
    ],
    &[ShiftOnRelease, GuiLock],
    &[
        LayerChange,
        OccupyLayerChange,
        OccupyHoldRelease,
        StoreDashDots,
    ],
    &[
        ForceEmpty,
        OccupyForceEmpty,
        OccupyHoldRelease,
        StoreDashDots,
    ],
    &[
        ForceEmpty,
        OccupyForceEmpty,
        OccupyHoldRelease,
        StoreDashDots,
    ],
];

type KeyCallback = Box<dyn FnMut(KeySym, KeyLocks) + Send>;
type MediaCallback = Box<dyn FnMut(MediaKey) + Send>;
type ResetCallback = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Callbacks {
    send: Option<KeyCallback>,
    pressing: Option<KeyCallback>,
    released: Option<KeyCallback>,
    media: Option<MediaCallback>,
    force_empty: Option<ResetCallback>,
}

impl Callbacks {
    fn emit_send(&mut self, sym: KeySym, locks: KeyLocks) {
        if let Some(cb) = self.send.as_mut() {
            cb(sym, locks);
        }
    }

    fn emit_pressing(&mut self, sym: KeySym, locks: KeyLocks) {
        if let Some(cb) = self.pressing.as_mut() {
            cb(sym, locks);
        }
    }

    fn emit_released(&mut self, sym: KeySym, locks: KeyLocks) {
        if let Some(cb) = self.released.as_mut() {
            cb(sym, locks);
        }
    }

    fn emit_media(&mut self, code: MediaKey) {
        if let Some(cb) = self.media.as_mut() {
            cb(code);
        }
    }

    fn emit_force_empty(&mut self) {
        if let Some(cb) = self.force_empty.as_mut() {
            cb();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldPhase {
    /// Waiting out the debounce-settle delay before reporting the press.
    Settle,
    /// Ticking every repeat period; `pressing` records whether the press was
    /// actually reported, so a hold broken before settle never emits a
    /// release either.
    Repeat { pressing: bool },
}

#[derive(Debug, Clone, Copy)]
struct HoldTask {
    stamp: u8,
    binding: HoldBinding,
    at: Instant,
    phase: HoldPhase,
}

#[derive(Debug, Clone, Copy)]
enum TimerTask {
    Hold(HoldTask),
    ModifyConfirm { at: Instant },
}

impl TimerTask {
    fn deadline(&self) -> Instant {
        match self {
            TimerTask::Hold(task) => task.at,
            TimerTask::ModifyConfirm { at } => *at,
        }
    }
}

/// The key-transition decoder.
#[derive(Default)]
pub struct Decoder {
    state: DecoderState,
    timers: Vec<TimerTask>,
    callbacks: Callbacks,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_key_send(&mut self, cb: impl FnMut(KeySym, KeyLocks) + Send + 'static) {
        self.callbacks.send = Some(Box::new(cb));
    }

    pub fn on_key_pressing(&mut self, cb: impl FnMut(KeySym, KeyLocks) + Send + 'static) {
        self.callbacks.pressing = Some(Box::new(cb));
    }

    pub fn on_key_released(&mut self, cb: impl FnMut(KeySym, KeyLocks) + Send + 'static) {
        self.callbacks.released = Some(Box::new(cb));
    }

    pub fn on_media_key(&mut self, cb: impl FnMut(MediaKey) + Send + 'static) {
        self.callbacks.media = Some(Box::new(cb));
    }

    pub fn on_force_history_empty(&mut self, cb: impl FnMut() + Send + 'static) {
        self.callbacks.force_empty = Some(Box::new(cb));
    }

    pub fn state(&self) -> &DecoderState {
        &self.state
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// Record a key-down edge from the debounce layer.
    pub fn key_down(&mut self, key: u8, now: Instant) {
        if key >= KEY_COUNT {
            warn!("{}", DecodeError::KeyOutOfRange(key));
            return;
        }
        self.state.bump_change();
        self.state.log.push(edge_code(key, KeyEdge::Down));
        self.state.push_key(key);
        trace!(key, state = ?self.state.snapshot(), "key down");
        self.dispatch(key, KeyEdge::Down, now);
    }

    /// Record a key-up edge from the debounce layer.
    pub fn key_up(&mut self, key: u8, now: Instant) {
        if key >= KEY_COUNT {
            warn!("{}", DecodeError::KeyOutOfRange(key));
            return;
        }
        self.state.bump_change();
        self.state.log.push(edge_code(key, KeyEdge::Up));
        self.state.release_key(key);
        trace!(key, state = ?self.state.snapshot(), "key up");
        self.dispatch(key, KeyEdge::Up, now);
    }

    /// Run every timer that has come due, earliest first. The host event
    /// loop calls this whenever [`next_deadline`](Self::next_deadline) has
    /// passed; calling it early or late is always safe.
    pub fn poll(&mut self, now: Instant) {
        loop {
            let due = self
                .timers
                .iter()
                .enumerate()
                .filter(|(_, t)| t.deadline() <= now)
                .min_by_key(|(_, t)| t.deadline())
                .map(|(i, _)| i);
            let Some(idx) = due else {
                break;
            };
            match self.timers.swap_remove(idx) {
                TimerTask::Hold(task) => self.run_hold(task),
                TimerTask::ModifyConfirm { .. } => self.run_modify_confirm(),
            }
        }
    }

    /// When the earliest pending timer wants to fire, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(TimerTask::deadline).min()
    }

    fn dispatch(&mut self, key: u8, edge: KeyEdge, now: Instant) {
        let attempts = match edge {
            KeyEdge::Down => DOWN_ATTEMPTS[key as usize],
            KeyEdge::Up => UP_ATTEMPTS[key as usize],
        };
        for &attempt in attempts {
            if self.run_attempt(attempt, key, edge, now) {
                debug!(key, ?edge, ?attempt, "edge claimed");
                return;
            }
        }
    }

    fn run_attempt(&mut self, attempt: Attempt, key: u8, edge: KeyEdge, now: Instant) -> bool {
        let st = &mut self.state;
        let verdict = match attempt {
            OccupyLayerChange => matchers::attempt_occupy_layer_change(st, key),
            LayerChange => matchers::attempt_layer_change(st),
            ModifyToggle => matchers::attempt_modify_toggle(st),
            CtrlLock => matchers::attempt_ctrl_lock(st),
            GuiLock => matchers::attempt_gui_lock(st),
            ShiftOnRelease => matchers::attempt_shift_on_release(st, edge),
            ShiftOnPress => matchers::attempt_shift_on_press(st, edge),
            Hold(binding) => matchers::attempt_hold(st, binding),
            OccupyHoldRelease => matchers::attempt_occupy_hold_release(st, key),
            OccupyForceEmpty => matchers::attempt_occupy_force_empty(st, edge),
            ForceEmpty => matchers::attempt_force_empty(st),
            StoreDashDots => matchers::attempt_store_dash_dots(st),
            Commit => matchers::attempt_commit(st),
            LayerHold => matchers::attempt_layer_hold(st, key),
        };
        match verdict {
            Verdict::Pass => false,
            Verdict::Claim => true,
            Verdict::Effect(effect) => {
                self.apply_effect(effect, now);
                true
            }
        }
    }

    fn apply_effect(&mut self, effect: Effect, now: Instant) {
        match effect {
            Effect::Send { sym, locks } => self.callbacks.emit_send(sym, locks),
            Effect::ArmHold(binding) => {
                self.timers.push(TimerTask::Hold(HoldTask {
                    stamp: self.state.change_flag,
                    binding,
                    at: now + SETTLE_DELAY,
                    phase: HoldPhase::Settle,
                }));
            }
            Effect::ArmModifyConfirm => {
                self.timers.push(TimerTask::ModifyConfirm {
                    at: now + MODIFY_CONFIRM_DELAY,
                });
            }
            Effect::ForceEmpty => {
                self.state.reset_all();
                // The flag restarts at zero, so stale stamps could collide;
                // pending work dies with the history.
                self.timers.clear();
                self.callbacks.emit_force_empty();
            }
        }
    }

    fn hold_still_valid(&self, task: &HoldTask) -> bool {
        self.state.change_flag == task.stamp && self.state.held_masked() == task.binding.chord
    }

    fn run_hold(&mut self, mut task: HoldTask) {
        let valid = self.hold_still_valid(&task);
        match task.phase {
            HoldPhase::Settle => {
                if valid {
                    match task.binding.target {
                        HoldTarget::Sym(sym) => {
                            self.callbacks.emit_pressing(sym, self.state.locks)
                        }
                        HoldTarget::Media(code) => self.callbacks.emit_media(code),
                    }
                    task.phase = HoldPhase::Repeat { pressing: true };
                } else {
                    trace!("hold broke before settle");
                    task.phase = HoldPhase::Repeat { pressing: false };
                }
                // First repeat tick lands one repeat period after arming.
                task.at += REPEAT_PERIOD - SETTLE_DELAY;
                self.timers.push(TimerTask::Hold(task));
            }
            HoldPhase::Repeat { pressing: false } => {
                // Settle already failed; retire without ever reporting.
            }
            HoldPhase::Repeat { pressing: true } => {
                if valid {
                    if let HoldTarget::Media(code) = task.binding.target {
                        // Consumer controls auto-repeat as discrete taps.
                        self.callbacks.emit_media(code);
                    }
                    task.at += REPEAT_PERIOD;
                    self.timers.push(TimerTask::Hold(task));
                } else {
                    if let HoldTarget::Sym(sym) = task.binding.target {
                        self.callbacks.emit_released(sym, self.state.locks);
                    }
                    debug!("hold released");
                }
            }
        }
    }

    fn run_modify_confirm(&mut self) {
        // Both anchors must have been released together as the two most
        // recent edges; anything else is a silent timeout.
        if self.state.log.frames_from_last([2]) == [Some(!ANCHOR_MASK)] {
            self.state.modify_layer = self.state.modify_layer.next();
            self.state.locks.clear();
            debug!(modify = ?self.state.modify_layer, "modifier layer advanced");
        } else {
            trace!("modifier toggle timed out");
        }
    }
}
