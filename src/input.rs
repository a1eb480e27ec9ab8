//! C4 — Input State Registry: process-wide controller state updated by
//! host keyboard/gamepad events, read-snapshotted by the pad-read syscall.
//!
//! Grounded on the teacher's scancode-driven `handle_scancode` dispatch
//! shape, generalized from PS/2 scancodes to a host-agnostic `Key` enum
//! since the real keyboard driver is a host collaborator here.

use std::sync::Mutex;

pub mod button {
    pub const CROSS: u32 = 0x4000;
    pub const CIRCLE: u32 = 0x2000;
    pub const SQUARE: u32 = 0x8000;
    pub const TRIANGLE: u32 = 0x1000;
    pub const L1: u32 = 0x400;
    pub const R1: u32 = 0x800;
    pub const L2: u32 = 0x100;
    pub const R2: u32 = 0x200;
    pub const L3: u32 = 0x2;
    pub const R3: u32 = 0x4;
    pub const OPTIONS: u32 = 0x8;
    pub const UP: u32 = 0x10;
    pub const RIGHT: u32 = 0x20;
    pub const DOWN: u32 = 0x40;
    pub const LEFT: u32 = 0x80;
    pub const TOUCHPAD: u32 = 0x10_0000;
    pub const SHARE: u32 = 0x1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Z,
    X,
    C,
    V,
    I,
    J,
    K,
    L,
    W,
    A,
    S,
    D,
    Q,
    E,
    Digit1,
    Digit3,
    Enter,
    Backspace,
    T,
    F,
    G,
}

/// Two historical keyboard-to-pad conventions coexist in the source this
/// was distilled from; neither is dropped (spec §9 Open Question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMap {
    /// Z/X/C/V -> CROSS/CIRCLE/SQUARE/TRIANGLE.
    Default,
    /// I/J/K/L -> TRIANGLE/SQUARE/CROSS/CIRCLE.
    AltLayout,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerSnapshot {
    pub button_bitmask: u32,
    pub lx: u8,
    pub ly: u8,
    pub rx: u8,
    pub ry: u8,
    pub l2: u8,
    pub r2: u8,
    pub touch_xy: (u16, u16),
    pub motion: [f32; 9], // orientation quaternion packed separately; raw accel+gyro here
    pub connected: bool,
}

const STICK_CENTER: u8 = 128;

impl ControllerSnapshot {
    fn centered() -> Self {
        Self {
            lx: STICK_CENTER,
            ly: STICK_CENTER,
            rx: STICK_CENTER,
            ry: STICK_CENTER,
            connected: false,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GamepadState {
    pub buttons: u32,
    pub left_stick: (i16, i16),
    pub right_stick: (i16, i16),
    pub left_trigger: i16,
    pub right_trigger: i16,
}

const STICK_DEADZONE: i16 = 8000;
const TRIGGER_DEADZONE: i16 = 30;

pub struct InputRegistry {
    state: Mutex<ControllerSnapshot>,
    key_map: KeyMap,
}

impl InputRegistry {
    pub fn new(key_map: KeyMap) -> Self {
        Self { state: Mutex::new(ControllerSnapshot::centered()), key_map }
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap() = ControllerSnapshot::centered();
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        *self.state.lock().unwrap()
    }

    pub fn key_down(&self, key: Key) {
        self.apply_key(key, true);
    }

    pub fn key_up(&self, key: Key) {
        self.apply_key(key, false);
    }

    fn apply_key(&self, key: Key, down: bool) {
        let mut state = self.state.lock().unwrap();
        match key {
            Key::Up => Self::set_bit(&mut state.button_bitmask, button::UP, down),
            Key::Down => Self::set_bit(&mut state.button_bitmask, button::DOWN, down),
            Key::Left => Self::set_bit(&mut state.button_bitmask, button::LEFT, down),
            Key::Right => Self::set_bit(&mut state.button_bitmask, button::RIGHT, down),
            Key::Z if self.key_map == KeyMap::Default => {
                Self::set_bit(&mut state.button_bitmask, button::CROSS, down)
            }
            Key::X if self.key_map == KeyMap::Default => {
                Self::set_bit(&mut state.button_bitmask, button::CIRCLE, down)
            }
            Key::C if self.key_map == KeyMap::Default => {
                Self::set_bit(&mut state.button_bitmask, button::SQUARE, down)
            }
            Key::V if self.key_map == KeyMap::Default => {
                Self::set_bit(&mut state.button_bitmask, button::TRIANGLE, down)
            }
            Key::K if self.key_map == KeyMap::AltLayout => {
                Self::set_bit(&mut state.button_bitmask, button::CROSS, down)
            }
            Key::L if self.key_map == KeyMap::AltLayout => {
                Self::set_bit(&mut state.button_bitmask, button::CIRCLE, down)
            }
            Key::J if self.key_map == KeyMap::AltLayout => {
                Self::set_bit(&mut state.button_bitmask, button::SQUARE, down)
            }
            Key::I if self.key_map == KeyMap::AltLayout => {
                Self::set_bit(&mut state.button_bitmask, button::TRIANGLE, down)
            }
            Key::W => state.ly = if down { 0 } else { STICK_CENTER },
            Key::S => state.ly = if down { 255 } else { STICK_CENTER },
            Key::A => state.lx = if down { 0 } else { STICK_CENTER },
            Key::D => state.lx = if down { 255 } else { STICK_CENTER },
            Key::Q => {
                Self::set_bit(&mut state.button_bitmask, button::L1, down);
            }
            Key::E => {
                Self::set_bit(&mut state.button_bitmask, button::R1, down);
            }
            Key::Digit1 => {
                Self::set_bit(&mut state.button_bitmask, button::L2, down);
                state.l2 = if down { 255 } else { 0 };
            }
            Key::Digit3 => {
                Self::set_bit(&mut state.button_bitmask, button::R2, down);
                state.r2 = if down { 255 } else { 0 };
            }
            Key::Enter => Self::set_bit(&mut state.button_bitmask, button::OPTIONS, down),
            Key::Backspace => Self::set_bit(&mut state.button_bitmask, button::SHARE, down),
            Key::T => Self::set_bit(&mut state.button_bitmask, button::TOUCHPAD, down),
            Key::F => Self::set_bit(&mut state.button_bitmask, button::L3, down),
            Key::G => Self::set_bit(&mut state.button_bitmask, button::R3, down),
            _ => {}
        }
    }

    fn set_bit(mask: &mut u32, bit: u32, set: bool) {
        if set {
            *mask |= bit;
        } else {
            *mask &= !bit;
        }
    }

    /// Rescales a connected gamepad's digital and analog inputs into the
    /// console's bitmask/byte conventions, with deadzones and inverted Y
    /// axes per spec §4.8.
    pub fn apply_gamepad(&self, pad: GamepadState) {
        let mut state = self.state.lock().unwrap();
        state.button_bitmask = pad.buttons;
        state.lx = Self::rescale_axis(pad.left_stick.0, STICK_DEADZONE);
        state.ly = Self::rescale_axis(-pad.left_stick.1, STICK_DEADZONE);
        state.rx = Self::rescale_axis(pad.right_stick.0, STICK_DEADZONE);
        state.ry = Self::rescale_axis(-pad.right_stick.1, STICK_DEADZONE);
        state.l2 = Self::rescale_trigger(pad.left_trigger, TRIGGER_DEADZONE);
        state.r2 = Self::rescale_trigger(pad.right_trigger, TRIGGER_DEADZONE);
        state.connected = true;
    }

    fn rescale_axis(value: i16, deadzone: i16) -> u8 {
        let clamped = if value.unsigned_abs() < deadzone as u16 { 0 } else { value };
        (((clamped as i32) + 32768) / 256) as u8
    }

    fn rescale_trigger(value: i16, deadzone: i16) -> u8 {
        let clamped = if value.unsigned_abs() < deadzone as u16 { 0 } else { value.max(0) };
        (clamped as u32 * 255 / 32767) as u8
    }

    pub fn mark_disconnected(&self) {
        let mut state = self.state.lock().unwrap();
        *state = ControllerSnapshot::centered();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_has_centered_sticks() {
        let registry = InputRegistry::new(KeyMap::Default);
        let snap = registry.snapshot();
        assert_eq!((snap.lx, snap.ly, snap.rx, snap.ry), (128, 128, 128, 128));
    }

    #[test]
    fn default_mapping_z_sets_cross() {
        let registry = InputRegistry::new(KeyMap::Default);
        registry.key_down(Key::Z);
        assert_ne!(registry.snapshot().button_bitmask & button::CROSS, 0);
    }

    #[test]
    fn alt_mapping_k_sets_cross_instead_of_z() {
        let registry = InputRegistry::new(KeyMap::AltLayout);
        registry.key_down(Key::Z);
        assert_eq!(registry.snapshot().button_bitmask & button::CROSS, 0);
        registry.key_down(Key::K);
        assert_ne!(registry.snapshot().button_bitmask & button::CROSS, 0);
    }

    #[test]
    fn wasd_drives_left_stick_to_extremes() {
        let registry = InputRegistry::new(KeyMap::Default);
        registry.key_down(Key::D);
        assert_eq!(registry.snapshot().lx, 255);
        registry.key_up(Key::D);
        assert_eq!(registry.snapshot().lx, 128);
    }

    #[test]
    fn gamepad_deadzone_zeroes_small_stick_values() {
        let registry = InputRegistry::new(KeyMap::Default);
        registry.apply_gamepad(GamepadState {
            buttons: 0,
            left_stick: (100, 0),
            right_stick: (0, 0),
            left_trigger: 0,
            right_trigger: 0,
        });
        assert_eq!(registry.snapshot().lx, 128);
    }
}
