//! The chord recognizer library.
//!
//! Every matcher inspects (and sometimes mutates) the shared [`DecoderState`]
//! and answers "did I fully handle this edge". The controller tries the
//! matchers for a key in a fixed priority order and stops at the first one
//! that claims; `Verdict::Pass` means "try the next in the chain".
//!
//! Matchers never talk to timers or callbacks directly. Anything deferred or
//! externally visible is returned as an [`Effect`] for the controller to
//! apply, so each recognizer stays a plain function of the state.

use crate::morse_map;
use crate::state::DecoderState;
use crate::types::{
    key_bit, ControlKey, DecodeError, Element, KeyEdge, KeyLayer, KeyLocks, KeySym, MediaKey,
    ModifyLayer, ANCHOR_MASK, PANIC_MASK, RELEASE_OFFSET,
};
use tracing::debug;

/// Outcome of one matcher attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Not recognized; the next matcher in the chain may try.
    Pass,
    /// Recognized and fully handled (possibly as a deliberate no-op).
    Claim,
    /// Recognized; the controller must apply a deferred effect.
    Effect(Effect),
}

/// Work the controller performs on behalf of a successful matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Emit one full tap through the send callback.
    Send { sym: KeySym, locks: KeyLocks },
    /// Arm the 10 ms settle / 50 ms repeat hold protocol for a chord.
    ArmHold(HoldBinding),
    /// Arm the 150 ms modifier-layer confirmation one-shot.
    ArmModifyConfirm,
    /// The panic gesture completed: reset everything and notify.
    ForceEmpty,
}

/// What a confirmed hold emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldTarget {
    Sym(KeySym),
    Media(MediaKey),
}

/// A hold-and-repeat chord: the exact (anchor-masked) bit pattern that must
/// stay live, and the output it drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldBinding {
    pub chord: u8,
    pub target: HoldTarget,
}

pub const TAB_HOLD: HoldBinding = HoldBinding {
    chord: key_bit(1) | key_bit(2),
    target: HoldTarget::Sym(KeySym::Control(ControlKey::Tab)),
};
pub const BACKSPACE_HOLD: HoldBinding = HoldBinding {
    chord: key_bit(2) | key_bit(3),
    target: HoldTarget::Sym(KeySym::Control(ControlKey::Backspace)),
};
pub const SPACE_HOLD: HoldBinding = HoldBinding {
    chord: key_bit(5) | key_bit(6),
    target: HoldTarget::Sym(KeySym::Control(ControlKey::Space)),
};
pub const ENTER_HOLD: HoldBinding = HoldBinding {
    chord: key_bit(6) | key_bit(7),
    target: HoldTarget::Sym(KeySym::Control(ControlKey::Enter)),
};

const SEBT_CHORDS: [u8; 4] = [
    TAB_HOLD.chord,
    BACKSPACE_HOLD.chord,
    SPACE_HOLD.chord,
    ENTER_HOLD.chord,
];

/// The character-commit chord (5 + 6, disambiguated from the space hold by a
/// non-empty accumulator).
const COMMIT_CHORD: u8 = key_bit(5) | key_bit(6);

/// The layer-change chord: the non-anchor half of the {0, 1, 4, 5} box.
const LAYER_CHORD: u8 = key_bit(1) | key_bit(5);

/// Per-key Morse contribution for a clean down-then-up tap. The anchors
/// (0 and 4) spell nothing.
const KEY_ELEMENTS: [&[Element]; 8] = [
    &[],
    &[Element::Dit],
    &[Element::Dit, Element::Dah],
    &[Element::Dit, Element::Dit],
    &[],
    &[Element::Dah],
    &[Element::Dah, Element::Dit],
    &[Element::Dah, Element::Dah],
];

/// Claim any edge of a layer-chord key while its partner is still held, so a
/// gesture in progress cannot be misread as a dash/dot tap or a hold chord.
pub fn attempt_occupy_layer_change(st: &DecoderState, key: u8) -> Verdict {
    let partner = if key == 1 { 5 } else { 1 };
    if st.held(partner) {
        Verdict::Claim
    } else {
        Verdict::Pass
    }
}

/// The completed layer-change gesture: both chord keys went down together and
/// came back up together as the four most recent edges, nothing else held.
pub fn attempt_layer_change(st: &mut DecoderState) -> Verdict {
    if st.key_pushed != 0 {
        return Verdict::Pass;
    }
    if st.log.frames_from_last([2, 2]) != [Some(!LAYER_CHORD), Some(LAYER_CHORD)] {
        return Verdict::Pass;
    }
    st.key_layer = st.key_layer.next();
    // The chord keys sit next to the modifier anchors; any lock picked up
    // while fingering the gesture is stale.
    st.locks.clear();
    st.clear_history();
    debug!(layer = ?st.key_layer, "key layer advanced");
    Verdict::Claim
}

/// Both anchors held at once starts the modifier-layer toggle; the 150 ms
/// confirmation decides whether it completes.
pub fn attempt_modify_toggle(st: &DecoderState) -> Verdict {
    if st.key_pushed == ANCHOR_MASK {
        Verdict::Effect(Effect::ArmModifyConfirm)
    } else {
        Verdict::Pass
    }
}

/// Ctrl is live: locked exactly while its anchor (key 0) is held.
pub fn attempt_ctrl_lock(st: &mut DecoderState) -> Verdict {
    if !st.modify_layer.ctrl_on_anchor() {
        return Verdict::Pass;
    }
    st.locks.ctrl = st.held(0);
    Verdict::Claim
}

/// Gui is live: locked exactly while its anchor (key 4) is held.
pub fn attempt_gui_lock(st: &mut DecoderState) -> Verdict {
    if !st.modify_layer.gui_on_anchor() {
        return Verdict::Pass;
    }
    st.locks.gui = st.held(4);
    Verdict::Claim
}

/// Shift under CtrlShift lives on key 4 and toggles on release: the last two
/// edges must be a clean down-then-up of the anchor with nothing else held.
pub fn attempt_shift_on_release(st: &mut DecoderState, edge: KeyEdge) -> Verdict {
    if st.modify_layer != ModifyLayer::CtrlShift {
        return Verdict::Pass;
    }
    if edge == KeyEdge::Up
        && st.key_pushed == 0
        && st.log.frames_from_last([1, 1]) == [Some(!key_bit(4)), Some(key_bit(4))]
    {
        st.locks.shift = !st.locks.shift;
        debug!(shift = st.locks.shift, "shift lock toggled");
    }
    Verdict::Claim
}

/// Shift under ShiftGui lives on key 0 and toggles on press, when the anchor
/// is the only key down.
pub fn attempt_shift_on_press(st: &mut DecoderState, edge: KeyEdge) -> Verdict {
    if st.modify_layer != ModifyLayer::ShiftGui {
        return Verdict::Pass;
    }
    if edge == KeyEdge::Down && st.key_pushed == key_bit(0) {
        st.locks.shift = !st.locks.shift;
        debug!(shift = st.locks.shift, "shift lock toggled");
    }
    Verdict::Claim
}

/// A hold-and-repeat chord qualifies on a down edge when the dash/dot layer
/// is active, nothing is being spelled, and the live (anchor-masked) bitmask
/// is exactly the chord.
pub fn attempt_hold(st: &DecoderState, binding: HoldBinding) -> Verdict {
    if st.key_layer != KeyLayer::DashDots {
        return Verdict::Pass;
    }
    if !st.dash_dots.is_empty() {
        return Verdict::Pass;
    }
    if st.held_masked() != binding.chord {
        return Verdict::Pass;
    }
    Verdict::Effect(Effect::ArmHold(binding))
}

/// Claim the up edges of a hold chord that went through a clean matched
/// down-then-up, so dash/dot storage cannot reinterpret them. Inspects the
/// last two to four log edges.
pub fn attempt_occupy_hold_release(st: &DecoderState, key: u8) -> Verdict {
    if st.key_layer != KeyLayer::DashDots {
        return Verdict::Pass;
    }
    for chord in SEBT_CHORDS {
        if chord & key_bit(key) == 0 {
            continue;
        }
        // Both chord keys released: two ups over the two downs.
        if st.log.frames_from_last([2, 2]) == [Some(!chord), Some(chord)] {
            return Verdict::Claim;
        }
        // First of the two released: this up directly follows the chord downs.
        if st.log.frames_from_last([1, 2])[1] == Some(chord) {
            return Verdict::Claim;
        }
    }
    Verdict::Pass
}

/// Claim edges while the four-key panic chord is forming (or unwinding), so
/// no other interpretation fires mid-gesture. Tolerates one key not yet
/// pressed on the way down and a partially drained pattern on the way up.
pub fn attempt_occupy_force_empty(st: &DecoderState, edge: KeyEdge) -> Verdict {
    if st.key_pushed & !PANIC_MASK != 0 {
        return Verdict::Pass;
    }
    let live = (st.key_pushed & PANIC_MASK).count_ones();
    let claimed = match edge {
        KeyEdge::Down => live >= 3,
        KeyEdge::Up => live >= 2,
    };
    if claimed {
        Verdict::Claim
    } else {
        Verdict::Pass
    }
}

/// The completed panic gesture: all four keys down then all four up as the
/// eight most recent edges, zero keys held. Near misses must not reset.
pub fn attempt_force_empty(st: &DecoderState) -> Verdict {
    if st.key_pushed != 0 {
        return Verdict::Pass;
    }
    if st.log.frames_from_last([4, 4]) != [Some(!PANIC_MASK), Some(PANIC_MASK)] {
        return Verdict::Pass;
    }
    debug!("panic chord completed, forcing history empty");
    Verdict::Effect(Effect::ForceEmpty)
}

/// Catch-all for up edges in the dash/dot layer: claims the edge, and spells
/// the key's element(s) when the last two edges are a clean down-then-up of
/// one key.
pub fn attempt_store_dash_dots(st: &mut DecoderState) -> Verdict {
    if st.key_layer != KeyLayer::DashDots {
        return Verdict::Pass;
    }
    if let (Some(up), Some(down)) = (st.log.last(0), st.log.last(1)) {
        if down < RELEASE_OFFSET && up == down + RELEASE_OFFSET {
            for &element in KEY_ELEMENTS[down as usize] {
                st.dash_dots.push(element);
            }
            debug!(pattern = %st.dash_dots.pattern(), "dash/dots stored");
        }
    }
    Verdict::Claim
}

/// Commit chord: resolve the accumulated pattern and clear the working
/// history. The user's layer and locks survive a commit, hit or miss.
pub fn attempt_commit(st: &mut DecoderState) -> Verdict {
    if st.key_layer != KeyLayer::DashDots || st.dash_dots.is_empty() {
        return Verdict::Pass;
    }
    if st.held_masked() != COMMIT_CHORD {
        return Verdict::Pass;
    }
    let pattern = st.dash_dots.pattern();
    let verdict = match morse_map::lookup(&pattern) {
        Some(sym) => Verdict::Effect(Effect::Send {
            sym,
            locks: st.locks,
        }),
        None => {
            debug!("{}", DecodeError::UnknownPattern(pattern));
            Verdict::Claim
        }
    };
    st.clear_history();
    verdict
}

/// Single-key holds for the arrows and media layers. Same timer protocol as
/// the dash/dot-layer chords, gated on the key layer instead of a chord.
pub fn attempt_layer_hold(st: &DecoderState, key: u8) -> Verdict {
    let target = match st.key_layer {
        KeyLayer::Arrows => arrow_target(key),
        KeyLayer::Media => media_target(key),
        _ => None,
    };
    let Some(target) = target else {
        return Verdict::Pass;
    };
    if st.held_masked() != key_bit(key) {
        return Verdict::Pass;
    }
    Verdict::Effect(Effect::ArmHold(HoldBinding {
        chord: key_bit(key),
        target,
    }))
}

fn arrow_target(key: u8) -> Option<HoldTarget> {
    let ctrl = match key {
        1 => ControlKey::Left,
        2 => ControlKey::Up,
        3 => ControlKey::PageUp,
        5 => ControlKey::Right,
        6 => ControlKey::Down,
        7 => ControlKey::PageDown,
        _ => return None,
    };
    Some(HoldTarget::Sym(KeySym::Control(ctrl)))
}

fn media_target(key: u8) -> Option<HoldTarget> {
    let code = match key {
        1 => MediaKey::PrevTrack,
        2 => MediaKey::PlayPause,
        3 => MediaKey::VolumeDown,
        5 => MediaKey::NextTrack,
        6 => MediaKey::Mute,
        7 => MediaKey::VolumeUp,
        _ => return None,
    };
    Some(HoldTarget::Media(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::edge_code;

    fn press(st: &mut DecoderState, key: u8) {
        st.bump_change();
        st.log.push(edge_code(key, KeyEdge::Down));
        st.push_key(key);
    }

    fn release(st: &mut DecoderState, key: u8) {
        st.bump_change();
        st.log.push(edge_code(key, KeyEdge::Up));
        st.release_key(key);
    }

    fn tap(st: &mut DecoderState, key: u8) {
        press(st, key);
        release(st, key);
    }

    #[test]
    fn layer_change_requires_the_exact_box_pattern() {
        let mut st = DecoderState::new();
        press(&mut st, 1);
        press(&mut st, 5);
        assert_eq!(attempt_layer_change(&mut st), Verdict::Pass);
        release(&mut st, 1);
        // Partner still held: occupy guards the intermediate up.
        assert_eq!(attempt_occupy_layer_change(&st, 1), Verdict::Claim);
        assert_eq!(attempt_layer_change(&mut st), Verdict::Pass);
        release(&mut st, 5);
        assert_eq!(attempt_layer_change(&mut st), Verdict::Claim);
        assert_eq!(st.key_layer, KeyLayer::Numbers);
        assert!(st.log.is_empty());
    }

    #[test]
    fn four_layer_changes_cycle_home() {
        let mut st = DecoderState::new();
        for _ in 0..4 {
            press(&mut st, 5);
            press(&mut st, 1);
            release(&mut st, 5);
            release(&mut st, 1);
            assert_eq!(attempt_layer_change(&mut st), Verdict::Claim);
        }
        assert_eq!(st.key_layer, KeyLayer::DashDots);
    }

    #[test]
    fn lone_tap_of_a_chord_key_is_not_a_layer_change() {
        let mut st = DecoderState::new();
        tap(&mut st, 1);
        assert_eq!(attempt_occupy_layer_change(&st, 1), Verdict::Pass);
        assert_eq!(attempt_layer_change(&mut st), Verdict::Pass);
    }

    #[test]
    fn modify_toggle_arms_only_on_both_anchors() {
        let mut st = DecoderState::new();
        press(&mut st, 0);
        assert_eq!(attempt_modify_toggle(&st), Verdict::Pass);
        press(&mut st, 4);
        assert_eq!(
            attempt_modify_toggle(&st),
            Verdict::Effect(Effect::ArmModifyConfirm)
        );
        press(&mut st, 2);
        assert_eq!(attempt_modify_toggle(&st), Verdict::Pass);
    }

    #[test]
    fn ctrl_and_gui_track_their_anchor() {
        let mut st = DecoderState::new();
        press(&mut st, 0);
        assert_eq!(attempt_ctrl_lock(&mut st), Verdict::Claim);
        assert!(st.locks.ctrl);
        release(&mut st, 0);
        assert_eq!(attempt_ctrl_lock(&mut st), Verdict::Claim);
        assert!(!st.locks.ctrl);

        st.modify_layer = ModifyLayer::ShiftGui;
        assert_eq!(attempt_ctrl_lock(&mut st), Verdict::Pass);
        press(&mut st, 4);
        assert_eq!(attempt_gui_lock(&mut st), Verdict::Claim);
        assert!(st.locks.gui);
    }

    #[test]
    fn shift_toggles_on_clean_anchor_tap() {
        let mut st = DecoderState::new();
        tap(&mut st, 4);
        assert_eq!(attempt_shift_on_release(&mut st, KeyEdge::Up), Verdict::Claim);
        assert!(st.locks.shift);
        tap(&mut st, 4);
        assert_eq!(attempt_shift_on_release(&mut st, KeyEdge::Up), Verdict::Claim);
        assert!(!st.locks.shift);
    }

    #[test]
    fn shift_does_not_toggle_during_the_anchor_pair_gesture() {
        let mut st = DecoderState::new();
        press(&mut st, 0);
        press(&mut st, 4);
        release(&mut st, 0);
        release(&mut st, 4);
        // Last two edges are up0, up4, not a clean key-4 tap.
        assert_eq!(attempt_shift_on_release(&mut st, KeyEdge::Up), Verdict::Claim);
        assert!(!st.locks.shift);
    }

    #[test]
    fn shift_on_press_wants_a_lone_anchor() {
        let mut st = DecoderState::new();
        st.modify_layer = ModifyLayer::ShiftGui;
        press(&mut st, 2);
        press(&mut st, 0);
        assert_eq!(attempt_shift_on_press(&mut st, KeyEdge::Down), Verdict::Claim);
        assert!(!st.locks.shift);
        release(&mut st, 2);
        release(&mut st, 0);
        press(&mut st, 0);
        assert_eq!(attempt_shift_on_press(&mut st, KeyEdge::Down), Verdict::Claim);
        assert!(st.locks.shift);
    }

    #[test]
    fn hold_needs_layer_empty_accumulator_and_exact_chord() {
        let mut st = DecoderState::new();
        press(&mut st, 5);
        assert_eq!(attempt_hold(&st, SPACE_HOLD), Verdict::Pass);
        press(&mut st, 6);
        assert_eq!(
            attempt_hold(&st, SPACE_HOLD),
            Verdict::Effect(Effect::ArmHold(SPACE_HOLD))
        );
        st.dash_dots.push(Element::Dit);
        assert_eq!(attempt_hold(&st, SPACE_HOLD), Verdict::Pass);
        st.dash_dots.reset();
        st.key_layer = KeyLayer::Arrows;
        assert_eq!(attempt_hold(&st, SPACE_HOLD), Verdict::Pass);
    }

    #[test]
    fn held_anchor_does_not_break_a_hold_chord() {
        let mut st = DecoderState::new();
        press(&mut st, 0);
        press(&mut st, 2);
        press(&mut st, 3);
        assert_eq!(
            attempt_hold(&st, BACKSPACE_HOLD),
            Verdict::Effect(Effect::ArmHold(BACKSPACE_HOLD))
        );
    }

    #[test]
    fn hold_release_edges_are_occupied() {
        let mut st = DecoderState::new();
        press(&mut st, 5);
        press(&mut st, 6);
        release(&mut st, 5);
        assert_eq!(attempt_occupy_hold_release(&st, 5), Verdict::Claim);
        release(&mut st, 6);
        assert_eq!(attempt_occupy_hold_release(&st, 6), Verdict::Claim);
        // A lone clean tap is not chord traffic.
        let mut st = DecoderState::new();
        tap(&mut st, 5);
        assert_eq!(attempt_occupy_hold_release(&st, 5), Verdict::Pass);
    }

    #[test]
    fn panic_occupy_tolerates_one_missing_key() {
        let mut st = DecoderState::new();
        press(&mut st, 2);
        press(&mut st, 3);
        assert_eq!(
            attempt_occupy_force_empty(&st, KeyEdge::Down),
            Verdict::Pass
        );
        press(&mut st, 6);
        assert_eq!(
            attempt_occupy_force_empty(&st, KeyEdge::Down),
            Verdict::Claim
        );
        press(&mut st, 7);
        release(&mut st, 2);
        release(&mut st, 3);
        assert_eq!(attempt_occupy_force_empty(&st, KeyEdge::Up), Verdict::Claim);
        // Any non-panic key in the mask disqualifies the gesture.
        press(&mut st, 1);
        assert_eq!(attempt_occupy_force_empty(&st, KeyEdge::Up), Verdict::Pass);
    }

    #[test]
    fn force_empty_wants_the_strict_full_cycle() {
        let mut st = DecoderState::new();
        for key in [2, 3, 6, 7] {
            press(&mut st, key);
        }
        for key in [7, 2, 6, 3] {
            release(&mut st, key);
        }
        assert_eq!(attempt_force_empty(&st), Verdict::Effect(Effect::ForceEmpty));
    }

    #[test]
    fn near_miss_panic_does_not_reset() {
        let mut st = DecoderState::new();
        for key in [2, 3, 6] {
            press(&mut st, key);
        }
        for key in [2, 3, 6] {
            release(&mut st, key);
        }
        assert_eq!(attempt_force_empty(&st), Verdict::Pass);
    }

    #[test]
    fn clean_taps_spell_elements() {
        let mut st = DecoderState::new();
        tap(&mut st, 1);
        assert_eq!(attempt_store_dash_dots(&mut st), Verdict::Claim);
        tap(&mut st, 7);
        assert_eq!(attempt_store_dash_dots(&mut st), Verdict::Claim);
        assert_eq!(st.dash_dots.pattern(), "011");
        // Anchors spell nothing but the edge is still claimed.
        tap(&mut st, 4);
        assert_eq!(attempt_store_dash_dots(&mut st), Verdict::Claim);
        assert_eq!(st.dash_dots.pattern(), "011");
    }

    #[test]
    fn interleaved_edges_spell_nothing() {
        let mut st = DecoderState::new();
        press(&mut st, 1);
        press(&mut st, 5);
        release(&mut st, 1);
        assert_eq!(attempt_store_dash_dots(&mut st), Verdict::Claim);
        assert!(st.dash_dots.is_empty());
    }

    #[test]
    fn commit_sends_and_clears_history_only() {
        let mut st = DecoderState::new();
        st.locks.ctrl = true;
        tap(&mut st, 1); // dit
        attempt_store_dash_dots(&mut st);
        press(&mut st, 5);
        press(&mut st, 6);
        let verdict = attempt_commit(&mut st);
        assert_eq!(
            verdict,
            Verdict::Effect(Effect::Send {
                sym: KeySym::Char('e'),
                locks: KeyLocks {
                    ctrl: true,
                    ..KeyLocks::none()
                },
            })
        );
        assert!(st.dash_dots.is_empty());
        assert!(st.log.is_empty());
        assert!(st.locks.ctrl);
        assert_eq!(st.key_layer, KeyLayer::DashDots);
    }

    #[test]
    fn commit_miss_clears_without_sending() {
        let mut st = DecoderState::new();
        for _ in 0..5 {
            tap(&mut st, 2); // "01" x5 is not in the table
            attempt_store_dash_dots(&mut st);
        }
        press(&mut st, 5);
        press(&mut st, 6);
        assert_eq!(attempt_commit(&mut st), Verdict::Claim);
        assert!(st.dash_dots.is_empty());
        assert!(st.log.is_empty());
    }

    #[test]
    fn commit_needs_a_non_empty_accumulator() {
        let mut st = DecoderState::new();
        press(&mut st, 5);
        press(&mut st, 6);
        assert_eq!(attempt_commit(&mut st), Verdict::Pass);
    }

    #[test]
    fn layer_holds_are_gated_on_the_layer() {
        let mut st = DecoderState::new();
        press(&mut st, 6);
        assert_eq!(attempt_layer_hold(&st, 6), Verdict::Pass);
        st.key_layer = KeyLayer::Arrows;
        assert_eq!(
            attempt_layer_hold(&st, 6),
            Verdict::Effect(Effect::ArmHold(HoldBinding {
                chord: key_bit(6),
                target: HoldTarget::Sym(KeySym::Control(ControlKey::Down)),
            }))
        );
        st.key_layer = KeyLayer::Media;
        assert_eq!(
            attempt_layer_hold(&st, 6),
            Verdict::Effect(Effect::ArmHold(HoldBinding {
                chord: key_bit(6),
                target: HoldTarget::Media(MediaKey::Mute),
            }))
        );
        // Two keys down is not a single-key hold.
        press(&mut st, 7);
        assert_eq!(attempt_layer_hold(&st, 6), Verdict::Pass);
    }
}
