//! Ownership of the simulation fields and their double-buffer roles.

use crate::error::SimError;
use crate::grid::{DoubleBuffer, Field, FilterMode};

/// All per-cell simulation state. Velocity, dye and pressure carry history
/// and are ping-ponged; divergence and curl are fully recomputed before every
/// use and stay single-buffered. Allocated once at startup and on resize,
/// mutated in place for the life of the session.
#[derive(Debug, Clone)]
pub struct FluidState {
    pub width: usize,
    pub height: usize,
    pub velocity: DoubleBuffer,
    pub density: DoubleBuffer,
    pub pressure: DoubleBuffer,
    pub divergence: Field,
    pub curl: Field,
}

impl FluidState {
    pub fn new(width: usize, height: usize) -> Result<Self, SimError> {
        Ok(Self {
            width,
            height,
            // Advected fields want smooth resampling; the scalar solver
            // fields are only ever read at texel centers.
            velocity: DoubleBuffer::new(width, height, FilterMode::Linear)?,
            density: DoubleBuffer::new(width, height, FilterMode::Linear)?,
            pressure: DoubleBuffer::new(width, height, FilterMode::Nearest)?,
            divergence: Field::new(width, height, FilterMode::Nearest)?,
            curl: Field::new(width, height, FilterMode::Nearest)?,
        })
    }

    /// Aspect ratio the splat kernel uses to keep impulses circular on a
    /// non-square grid.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Drop all field content and reallocate at the new size. Prior
    /// simulation state is intentionally lost; the caller must not run a
    /// step concurrently with this.
    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), SimError> {
        *self = Self::new(width, height)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_discards_previous_state() {
        let mut state = FluidState::new(8, 8).unwrap();
        state
            .density
            .write_target()
            .set(2, 2, glam::Vec4::new(1.0, 0.0, 0.0, 1.0));
        state.density.swap();
        state.resize(16, 16).unwrap();
        assert_eq!(state.width, 16);
        assert_eq!(state.density.readable().get(2, 2), glam::Vec4::ZERO);
    }

    #[test]
    fn resize_to_zero_fails() {
        let mut state = FluidState::new(8, 8).unwrap();
        assert!(state.resize(0, 8).is_err());
    }
}
