//! Pointer state accumulation between frames.

use glam::{Vec2, Vec3};
use rand::Rng;

/// A single per-frame dye/force injection request, already converted to the
/// simulation's coordinate space (origin bottom-left, y up).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatRequest {
    /// Normalized position in [0,1]^2.
    pub point: Vec2,
    /// Pointer delta in surface pixels, already scaled by the delta gain.
    /// Still in screen orientation; the pipeline flips the y sign.
    pub delta: Vec2,
    /// Dye color chosen on pointer-down.
    pub color: Vec3,
}

/// Accumulates raw pointer events into at most one splat request per frame.
/// Multiple motion events between frames collapse into the latest delta;
/// there is no queue. Positions are kept in surface pixels and converted at
/// `take_request`.
#[derive(Debug, Clone)]
pub struct PointerInputModel {
    position: Vec2,
    delta: Vec2,
    color: Vec3,
    down: bool,
    moved: bool,
    gain: f32,
}

impl PointerInputModel {
    pub fn new(gain: f32) -> Self {
        Self {
            position: Vec2::ZERO,
            delta: Vec2::ZERO,
            color: Vec3::ZERO,
            down: false,
            moved: false,
            gain,
        }
    }

    /// Pointer pressed: pick a fresh dye color for this stroke.
    pub fn pointer_down(&mut self, x: f32, y: f32, rng: &mut impl Rng) {
        self.down = true;
        self.position = Vec2::new(x, y);
        self.color = Vec3::new(rng.r#gen::<f32>(), rng.r#gen::<f32>(), rng.r#gen::<f32>());
    }

    /// Motion sample. Only marks the frame dirty while the pointer is held.
    pub fn pointer_move(&mut self, x: f32, y: f32) {
        let new = Vec2::new(x, y);
        self.delta = (new - self.position) * self.gain;
        self.position = new;
        self.moved = self.down;
    }

    pub fn pointer_up(&mut self) {
        self.down = false;
    }

    pub fn is_down(&self) -> bool {
        self.down
    }

    /// Consume the accumulated motion into a splat request, converting the
    /// pixel position into normalized coordinates with the vertical axis
    /// flipped (pointer origin is top-left, the simulation's is bottom-left).
    /// Clears the moved flag, so a second call before the next motion event
    /// returns None.
    pub fn take_request(&mut self, surface_width: f32, surface_height: f32) -> Option<SplatRequest> {
        if !self.moved {
            return None;
        }
        self.moved = false;
        Some(SplatRequest {
            point: Vec2::new(
                self.position.x / surface_width,
                1.0 - self.position.y / surface_height,
            ),
            delta: self.delta,
            color: self.color,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn motion_without_press_produces_no_request() {
        let mut pointer = PointerInputModel::new(10.0);
        pointer.pointer_move(100.0, 100.0);
        assert!(pointer.take_request(800.0, 600.0).is_none());
    }

    #[test]
    fn drag_produces_one_request_per_frame() {
        let mut pointer = PointerInputModel::new(10.0);
        pointer.pointer_down(100.0, 100.0, &mut rng());
        pointer.pointer_move(104.0, 98.0);
        let req = pointer.take_request(800.0, 600.0).unwrap();
        assert_eq!(req.delta, Vec2::new(40.0, -20.0));
        // Consumed: nothing left until the next motion event.
        assert!(pointer.take_request(800.0, 600.0).is_none());
    }

    #[test]
    fn intermediate_motion_collapses_to_latest_delta() {
        let mut pointer = PointerInputModel::new(1.0);
        pointer.pointer_down(0.0, 0.0, &mut rng());
        pointer.pointer_move(10.0, 0.0);
        pointer.pointer_move(13.0, 4.0);
        let req = pointer.take_request(100.0, 100.0).unwrap();
        assert_eq!(req.delta, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn position_is_normalized_with_y_flipped() {
        let mut pointer = PointerInputModel::new(1.0);
        pointer.pointer_down(200.0, 150.0, &mut rng());
        pointer.pointer_move(200.0, 150.0);
        let req = pointer.take_request(800.0, 600.0).unwrap();
        assert_eq!(req.point, Vec2::new(0.25, 0.75));
    }

    #[test]
    fn release_stops_marking_motion() {
        let mut pointer = PointerInputModel::new(1.0);
        pointer.pointer_down(0.0, 0.0, &mut rng());
        pointer.pointer_up();
        pointer.pointer_move(50.0, 50.0);
        assert!(pointer.take_request(100.0, 100.0).is_none());
    }

    #[test]
    fn each_press_picks_a_color_in_range() {
        let mut pointer = PointerInputModel::new(1.0);
        let mut r = rng();
        pointer.pointer_down(0.0, 0.0, &mut r);
        pointer.pointer_move(1.0, 1.0);
        let req = pointer.take_request(10.0, 10.0).unwrap();
        for channel in [req.color.x, req.color.y, req.color.z] {
            assert!((0.0..=1.0).contains(&channel));
        }
    }
}
