use serde::{Deserialize, Serialize};

use crate::error::SimError;

/// Solver tuning knobs. Defaults match the constants the simulation was
/// originally tuned with; everything is startup configuration, nothing is
/// re-read mid-frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Right-shift applied to the surface size to get the simulation grid.
    pub texture_downsample: u32,
    /// Per-step retention factor for advected velocity, in (0, 1].
    pub velocity_dissipation: f32,
    /// Per-step retention factor for advected dye, in (0, 1].
    pub density_dissipation: f32,
    /// Gaussian falloff radius of pointer splats, in normalized units.
    pub splat_radius: f32,
    /// Fixed Jacobi sweep count for the pressure solve.
    pub pressure_iterations: u32,
    /// Fixed timestep. Wall-clock time is deliberately not measured; the
    /// simulation is frame-rate dependent by design.
    pub fixed_dt: f32,
    /// Multiplier applied to raw pointer deltas before splatting.
    pub pointer_delta_gain: f32,
    /// Vorticity confinement strength; 0 disables the curl stages entirely.
    pub vorticity_strength: f32,
    /// Reuse last frame's pressure as the initial Jacobi iterate instead of
    /// clearing to zero. Off by default: the cold start avoids long-term
    /// pressure drift at the cost of a few extra iterations of convergence.
    pub pressure_warm_start: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            texture_downsample: 2,
            velocity_dissipation: 0.99,
            density_dissipation: 0.98,
            splat_radius: 0.003,
            pressure_iterations: 50,
            fixed_dt: 0.016,
            pointer_delta_gain: 10.0,
            vorticity_strength: 0.0,
            pressure_warm_start: false,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.velocity_dissipation > 0.0 && self.velocity_dissipation <= 1.0) {
            return Err(SimError::Config(format!(
                "velocity_dissipation must be in (0, 1], got {}",
                self.velocity_dissipation
            )));
        }
        if !(self.density_dissipation > 0.0 && self.density_dissipation <= 1.0) {
            return Err(SimError::Config(format!(
                "density_dissipation must be in (0, 1], got {}",
                self.density_dissipation
            )));
        }
        if !(self.splat_radius > 0.0) {
            return Err(SimError::Config(format!(
                "splat_radius must be positive, got {}",
                self.splat_radius
            )));
        }
        if self.pressure_iterations == 0 {
            return Err(SimError::Config("pressure_iterations must be > 0".into()));
        }
        if !(self.fixed_dt > 0.0) {
            return Err(SimError::Config(format!(
                "fixed_dt must be positive, got {}",
                self.fixed_dt
            )));
        }
        if self.vorticity_strength < 0.0 {
            return Err(SimError::Config(format!(
                "vorticity_strength must be >= 0, got {}",
                self.vorticity_strength
            )));
        }
        Ok(())
    }

    /// Simulation grid size for a given surface size. Clamped so a collapsed
    /// window never produces a zero-sized field.
    pub fn grid_size(&self, surface_width: u32, surface_height: u32) -> (usize, usize) {
        let w = (surface_width >> self.texture_downsample).max(1) as usize;
        let h = (surface_height >> self.texture_downsample).max(1) as usize;
        (w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_dissipation() {
        let mut cfg = SimConfig::default();
        cfg.velocity_dissipation = 0.0;
        assert!(cfg.validate().is_err());
        cfg.velocity_dissipation = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_pressure_iterations() {
        let mut cfg = SimConfig::default();
        cfg.pressure_iterations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn grid_size_never_collapses_to_zero() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.grid_size(1, 1), (1, 1));
        assert_eq!(cfg.grid_size(800, 600), (200, 150));
    }

    #[test]
    fn config_survives_a_serialization_round_trip() {
        // The app persists its tuning through eframe storage; every knob
        // must come back exactly as saved.
        let cfg = SimConfig {
            pressure_iterations: 35,
            vorticity_strength: 12.5,
            pressure_warm_start: true,
            ..SimConfig::default()
        };
        let stored = serde_json::to_string(&cfg).unwrap();
        let restored: SimConfig = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, cfg);
    }
}
