//! Scalar diagnostics over the simulation fields, for the headless runner
//! and for tests.

use crate::state::FluidState;

#[derive(Debug, Clone)]
pub struct FluidMetrics {
    pub total_dye: f32,
    pub max_dye: f32,
    pub total_kinetic_energy: f32,
    pub max_velocity: f32,
    pub mean_abs_divergence: f32,
    pub frame: u64,
}

impl FluidMetrics {
    pub fn analyze(state: &FluidState, frame: u64) -> Self {
        let density = state.density.readable();
        let velocity = state.velocity.readable();

        let mut total_dye = 0.0f32;
        let mut max_dye = 0.0f32;
        let mut total_kinetic_energy = 0.0f32;
        let mut max_velocity = 0.0f32;

        for texel in density.texels() {
            let dye = texel.x + texel.y + texel.z;
            total_dye += dye;
            max_dye = max_dye.max(dye);
        }
        for texel in velocity.texels() {
            let speed_sq = texel.x * texel.x + texel.y * texel.y;
            total_kinetic_energy += 0.5 * speed_sq;
            max_velocity = max_velocity.max(speed_sq.sqrt());
        }

        Self {
            total_dye,
            max_dye,
            total_kinetic_energy,
            max_velocity,
            mean_abs_divergence: mean_abs_divergence(state),
            frame,
        }
    }

    pub fn print_summary(&self) {
        println!("Frame {} metrics:", self.frame);
        println!("  Total dye: {:.6}", self.total_dye);
        println!("  Max dye: {:.6}", self.max_dye);
        println!("  Kinetic energy: {:.6}", self.total_kinetic_energy);
        println!("  Max velocity: {:.6}", self.max_velocity);
        println!("  Mean |divergence|: {:.6}", self.mean_abs_divergence);
        println!();
    }
}

/// Central-difference mean absolute divergence over the interior cells,
/// computed directly from texels rather than through the divergence kernel
/// so it can be taken at any point in the frame.
pub fn mean_abs_divergence(state: &FluidState) -> f32 {
    let velocity = state.velocity.readable();
    let width = state.width;
    let height = state.height;
    if width < 3 || height < 3 {
        return 0.0;
    }
    let mut total = 0.0f32;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let r = velocity.get(x + 1, y).x;
            let l = velocity.get(x - 1, y).x;
            let t = velocity.get(x, y + 1).y;
            let b = velocity.get(x, y - 1).y;
            total += (0.5 * (r - l + t - b)).abs();
        }
    }
    total / ((width - 2) * (height - 2)) as f32
}
