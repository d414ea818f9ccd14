//! Velocity state derived from held keys
//!
//! The commanded velocity is a pure function of the currently pressed key
//! set; there is no hidden history. Opposing keys resolve by dominance:
//! backward beats forward, turn-right beats turn-left.

use serde::Serialize;

/// Per-axis speed magnitude commanded while a key is held
const SPEED: f64 = 0.5;

/// Directional control keys (W/S/A/D on the keyboard)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKey {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
}

/// Commanded velocity without a timestamp
///
/// `vx` and `vyaw` take one of {-0.5, 0.0, 0.5}; `vy` (lateral strafe)
/// is always 0.0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
    pub vyaw: f64,
}

impl Velocity {
    /// True when both controllable axes are zero
    pub fn is_stopped(&self) -> bool {
        self.vx == 0.0 && self.vyaw == 0.0
    }

    /// Human-readable direction words for the status line:
    /// `FORWARD`, `BACKWARD`, `LEFT`, `RIGHT` (concatenated when both
    /// axes are active), or `STOPPED`.
    pub fn direction_label(&self) -> String {
        let mut label = String::new();
        if self.vx > 0.0 {
            label.push_str("FORWARD ");
        } else if self.vx < 0.0 {
            label.push_str("BACKWARD ");
        }
        if self.vyaw > 0.0 {
            label.push_str("LEFT ");
        } else if self.vyaw < 0.0 {
            label.push_str("RIGHT ");
        }
        if label.is_empty() {
            label.push_str("STOPPED ");
        }
        label.trim_end().to_string()
    }

    /// Stamp this velocity with a wall-clock time for the wire
    pub fn stamp(self, timestamp: f64) -> VelocityCommand {
        VelocityCommand {
            vx: self.vx,
            vy: self.vy,
            vyaw: self.vyaw,
            timestamp,
        }
    }
}

/// Wire form of one command-channel message
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VelocityCommand {
    pub vx: f64,
    pub vy: f64,
    pub vyaw: f64,
    /// Unix seconds as a float
    pub timestamp: f64,
}

/// Set of currently held control keys
///
/// Mutated only by the input thread; everyone else sees the derived
/// [`Velocity`] snapshots.
#[derive(Debug, Default)]
pub struct KeyState {
    forward: bool,
    backward: bool,
    turn_left: bool,
    turn_right: bool,
}

impl KeyState {
    pub fn press(&mut self, key: ControlKey) {
        self.set(key, true);
    }

    pub fn release(&mut self, key: ControlKey) {
        self.set(key, false);
    }

    fn set(&mut self, key: ControlKey, held: bool) {
        match key {
            ControlKey::Forward => self.forward = held,
            ControlKey::Backward => self.backward = held,
            ControlKey::TurnLeft => self.turn_left = held,
            ControlKey::TurnRight => self.turn_right = held,
        }
    }

    /// Derive the commanded velocity from the held keys.
    ///
    /// Backward is checked before forward and turn-right before turn-left,
    /// so the dominant key wins when opposing keys are held together.
    pub fn velocity(&self) -> Velocity {
        let vx = if self.backward {
            -SPEED
        } else if self.forward {
            SPEED
        } else {
            0.0
        };
        let vyaw = if self.turn_right {
            -SPEED
        } else if self.turn_left {
            SPEED
        } else {
            0.0
        };
        Velocity { vx, vy: 0.0, vyaw }
    }
}
