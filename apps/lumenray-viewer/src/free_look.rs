//! Keyboard free-look camera controller.
//!
//! Movement is applied in fixed ticks so speed does not depend on frame rate.

use std::collections::HashSet;

use glam::{Quat, Vec3};
use lumenray_core::Transform;
use winit::keyboard::KeyCode;

/// Ticks per second.
pub const TICK_RATE: f32 = 50.0;

/// Degrees turned per tick.
pub const TURN_DEGREES: f32 = 0.5;

/// World units moved per tick.
pub const STEP: f32 = 0.25;

/// Ticks run at most per frame, so a long stall does not fling the camera.
const MAX_TICKS_PER_FRAME: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    PitchDown,
    PitchUp,
    YawLeft,
    YawRight,
    Forward,
    Back,
    Left,
    Right,
    Up,
    Down,
}

impl Action {
    const fn from_key(key: KeyCode) -> Option<Self> {
        Some(match key {
            KeyCode::KeyJ | KeyCode::ArrowDown => Self::PitchDown,
            KeyCode::KeyK | KeyCode::ArrowUp => Self::PitchUp,
            KeyCode::KeyH | KeyCode::ArrowLeft => Self::YawLeft,
            KeyCode::KeyL | KeyCode::ArrowRight => Self::YawRight,
            KeyCode::KeyW => Self::Forward,
            KeyCode::KeyS => Self::Back,
            KeyCode::KeyA => Self::Left,
            KeyCode::KeyD => Self::Right,
            KeyCode::Space => Self::Up,
            KeyCode::ShiftLeft | KeyCode::ShiftRight => Self::Down,
            _ => return None,
        })
    }
}

/// Pitch and yaw with `J`/`K`/`H`/`L` or the arrow keys, move with `WASD`,
/// rise with `Space` and sink with `Shift`.
#[derive(Debug, Default)]
pub struct FreeLook {
    held: HashSet<KeyCode>,
    pending: f32,
}

impl FreeLook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a key transition. Returns `true` if the key is bound.
    pub fn process_key(&mut self, key: KeyCode, pressed: bool) -> bool {
        if Action::from_key(key).is_none() {
            return false;
        }
        if pressed {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
        true
    }

    /// Forget every held key, e.g. when the window loses focus.
    pub fn release_all(&mut self) {
        self.held.clear();
    }

    fn active(&self, action: Action) -> bool {
        self.held
            .iter()
            .any(|key| Action::from_key(*key) == Some(action))
    }

    /// Advance by `dt` seconds and apply whole ticks to `transform`.
    ///
    /// Returns `true` if `transform` changed.
    pub fn update(&mut self, transform: &mut Transform, dt: f32) -> bool {
        self.pending += dt.max(0.0);
        let tick = 1.0 / TICK_RATE;
        let mut ticks = 0;
        while self.pending >= tick && ticks < MAX_TICKS_PER_FRAME {
            self.pending -= tick;
            ticks += 1;
        }
        if ticks == MAX_TICKS_PER_FRAME {
            self.pending = 0.0;
        }

        if self.held.is_empty() {
            return false;
        }
        let before = *transform;
        for _ in 0..ticks {
            self.tick(transform);
        }
        *transform != before
    }

    fn tick(&self, transform: &mut Transform) {
        let turn = TURN_DEGREES.to_radians();
        let axis = |positive: Action, negative: Action| {
            f32::from(u8::from(self.active(positive))) - f32::from(u8::from(self.active(negative)))
        };

        let pitch = axis(Action::PitchUp, Action::PitchDown);
        let yaw = axis(Action::YawLeft, Action::YawRight);
        // Pitch about the camera's own X axis, yaw about world up so the
        // horizon stays level.
        transform.rotation =
            (Quat::from_rotation_y(yaw * turn) * transform.rotation * Quat::from_rotation_x(pitch * turn)).normalize();

        let forward = axis(Action::Forward, Action::Back);
        let right = axis(Action::Right, Action::Left);
        let up = axis(Action::Up, Action::Down);
        transform.position +=
            (transform.forward() * forward + transform.right() * right + Vec3::Y * up) * STEP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TICK: f32 = 1.0 / TICK_RATE;

    #[test]
    fn unbound_keys_are_ignored() {
        let mut look = FreeLook::new();
        assert!(!look.process_key(KeyCode::KeyQ, true));
        assert!(look.process_key(KeyCode::KeyW, true));
    }

    #[test]
    fn forward_moves_one_step_per_tick() {
        let mut look = FreeLook::new();
        let mut transform = Transform::IDENTITY;
        look.process_key(KeyCode::KeyW, true);

        assert!(look.update(&mut transform, TICK * 2.0 + 0.001));
        assert_relative_eq!(transform.position.z, -2.0 * STEP, epsilon = 1e-5);
        assert_relative_eq!(transform.position.x, 0.0);
    }

    #[test]
    fn partial_ticks_accumulate() {
        let mut look = FreeLook::new();
        let mut transform = Transform::IDENTITY;
        look.process_key(KeyCode::Space, true);

        assert!(!look.update(&mut transform, TICK * 0.6));
        assert!(look.update(&mut transform, TICK * 0.6));
        assert_relative_eq!(transform.position.y, STEP);
    }

    #[test]
    fn release_stops_movement() {
        let mut look = FreeLook::new();
        let mut transform = Transform::IDENTITY;
        look.process_key(KeyCode::KeyD, true);
        look.update(&mut transform, TICK);
        look.process_key(KeyCode::KeyD, false);

        let before = transform;
        assert!(!look.update(&mut transform, TICK * 3.0));
        assert_eq!(transform, before);
        assert_relative_eq!(before.position.x, STEP);
    }

    #[test]
    fn yaw_turns_half_a_degree_per_tick() {
        let mut look = FreeLook::new();
        let mut transform = Transform::IDENTITY;
        look.process_key(KeyCode::ArrowLeft, true);
        for _ in 0..18 {
            look.update(&mut transform, TICK * 10.0);
        }
        // 180 ticks at 0.5 degrees is a quarter turn to the left.
        let forward = transform.forward();
        assert_relative_eq!(forward.x, -1.0, epsilon = 1e-4);
        assert_relative_eq!(forward.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn pitch_up_raises_the_view() {
        let mut look = FreeLook::new();
        let mut transform = Transform::IDENTITY;
        look.process_key(KeyCode::KeyK, true);
        look.update(&mut transform, TICK);
        assert!(transform.forward().y > 0.0);
    }

    #[test]
    fn opposing_keys_cancel() {
        let mut look = FreeLook::new();
        let mut transform = Transform::IDENTITY;
        look.process_key(KeyCode::KeyW, true);
        look.process_key(KeyCode::KeyS, true);
        assert!(!look.update(&mut transform, TICK));
    }

    #[test]
    fn long_stall_is_capped() {
        let mut look = FreeLook::new();
        let mut transform = Transform::IDENTITY;
        look.process_key(KeyCode::KeyW, true);
        look.update(&mut transform, 5.0);
        assert_relative_eq!(transform.position.z, -(MAX_TICKS_PER_FRAME as f32) * STEP, epsilon = 1e-4);
    }
}
