//! Per-frame kernel orchestration: the stable-fluids stage order.

use glam::Vec3;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::input::SplatRequest;
use crate::kernels::{self, KernelCall};
use crate::state::FluidState;

/// Runs the fixed sequence of kernel invocations that advances the
/// simulation by one frame. Every stage reads the previous stage's output,
/// so the order is strictly sequential; parallelism lives inside the
/// individual kernels only.
#[derive(Debug, Clone)]
pub struct SolverPipeline {
    pub config: SimConfig,
    pub state: FluidState,
    frame: u64,
}

impl SolverPipeline {
    pub fn new(width: usize, height: usize, config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        Ok(Self {
            config,
            state: FluidState::new(width, height)?,
            frame: 0,
        })
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn resize(&mut self, width: usize, height: usize) -> Result<(), SimError> {
        log::info!("reallocating fields at {}x{}", width, height);
        self.state.resize(width, height)
    }

    /// Advance one frame. `splat` is this frame's consumed pointer request,
    /// already cleared from the input model by the caller. After this
    /// returns, every double buffer's readable side holds the latest data.
    pub fn step(&mut self, splat: Option<SplatRequest>) {
        let dt = self.config.fixed_dt;

        // 1. Velocity carries itself.
        {
            let (read, write) = self.state.velocity.pair_mut();
            kernels::run(
                &KernelCall::Advect {
                    velocity: read,
                    source: read,
                    dt,
                    dissipation: self.config.velocity_dissipation,
                },
                write,
            );
        }
        self.state.velocity.swap();

        // 2. Dye rides the fresh velocity.
        {
            let velocity = self.state.velocity.readable();
            let (read, write) = self.state.density.pair_mut();
            kernels::run(
                &KernelCall::Advect {
                    velocity,
                    source: read,
                    dt,
                    dissipation: self.config.density_dissipation,
                },
                write,
            );
        }
        self.state.density.swap();

        // 3. Pointer injection.
        if let Some(request) = splat {
            // The pointer's vertical axis points down, the simulation's
            // points up, hence the sign flip on dy.
            self.splat(
                request,
                Vec3::new(request.delta.x, -request.delta.y, 1.0),
                request.color,
            );
        }

        // Optional vorticity confinement, restoring the small-scale swirl
        // that semi-Lagrangian advection smears out.
        if self.config.vorticity_strength > 0.0 {
            {
                let velocity = self.state.velocity.readable();
                kernels::run(&KernelCall::Curl { velocity }, &mut self.state.curl);
            }
            {
                let curl = &self.state.curl;
                let (read, write) = self.state.velocity.pair_mut();
                kernels::run(
                    &KernelCall::VorticityForce {
                        velocity: read,
                        curl,
                        strength: self.config.vorticity_strength,
                        dt,
                    },
                    write,
                );
            }
            self.state.velocity.swap();
        }

        // 4. Divergence of the post-injection velocity. Single-buffered:
        // fully overwritten here, consumed below.
        kernels::run(
            &KernelCall::Divergence {
                velocity: self.state.velocity.readable(),
            },
            &mut self.state.divergence,
        );

        // 5. Pressure solve. Cold start by default; warm start reuses last
        // frame's pressure as the initial iterate.
        if !self.config.pressure_warm_start {
            self.state.pressure.clear_both();
        }
        for _ in 0..self.config.pressure_iterations {
            let divergence = &self.state.divergence;
            let (read, write) = self.state.pressure.pair_mut();
            kernels::run(
                &KernelCall::PressureJacobi {
                    pressure: read,
                    divergence,
                },
                write,
            );
            self.state.pressure.swap();
        }

        // 6. Subtract the pressure gradient; velocity is now approximately
        // divergence-free.
        {
            let pressure = self.state.pressure.readable();
            let (read, write) = self.state.velocity.pair_mut();
            kernels::run(
                &KernelCall::GradientSubtract {
                    pressure,
                    velocity: read,
                },
                write,
            );
        }
        self.state.velocity.swap();

        // 7. Presentation reads density.readable() from here.
        self.frame += 1;
    }

    /// Inject one impulse into velocity and dye. Exposed separately so
    /// headless runs and tests can splat without synthesizing pointer events.
    pub fn splat(&mut self, request: SplatRequest, velocity_color: Vec3, dye_color: Vec3) {
        let aspect_ratio = self.state.aspect_ratio();
        let radius = self.config.splat_radius;
        {
            let (read, write) = self.state.velocity.pair_mut();
            kernels::run(
                &KernelCall::Splat {
                    target: read,
                    point: request.point,
                    aspect_ratio,
                    color: velocity_color,
                    radius,
                },
                write,
            );
        }
        self.state.velocity.swap();
        {
            let (read, write) = self.state.density.pair_mut();
            kernels::run(
                &KernelCall::Splat {
                    target: read,
                    point: request.point,
                    aspect_ratio,
                    color: dye_color,
                    radius,
                },
                write,
            );
        }
        self.state.density.swap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec2, Vec4};

    fn quiet_config() -> SimConfig {
        SimConfig {
            pressure_iterations: 20,
            ..SimConfig::default()
        }
    }

    #[test]
    fn step_with_no_input_leaves_empty_fields_empty() {
        let mut pipeline = SolverPipeline::new(32, 32, quiet_config()).unwrap();
        pipeline.step(None);
        assert!(pipeline
            .state
            .density
            .readable()
            .texels()
            .iter()
            .all(|t| t.x == 0.0 && t.y == 0.0 && t.z == 0.0));
        assert_eq!(pipeline.frame(), 1);
    }

    #[test]
    fn splat_lands_in_both_velocity_and_dye() {
        let mut pipeline = SolverPipeline::new(64, 64, quiet_config()).unwrap();
        let request = SplatRequest {
            point: Vec2::new(0.5, 0.5),
            delta: Vec2::new(8.0, 0.0),
            color: Vec3::new(0.0, 1.0, 0.0),
        };
        pipeline.step(Some(request));
        let dye = pipeline.state.density.readable().get(32, 32);
        assert!(dye.y > 0.1, "dye splat missing: {dye:?}");
        // Rightward drag adds positive x velocity near the point.
        let vel = pipeline.state.velocity.readable().get(32, 32);
        assert!(vel.x > 0.0, "velocity splat missing: {vel:?}");
    }

    #[test]
    fn vorticity_stage_only_runs_when_enabled() {
        let mut config = quiet_config();
        config.vorticity_strength = 0.0;
        let mut pipeline = SolverPipeline::new(32, 32, config).unwrap();
        pipeline.state.velocity.write_target().set(
            10,
            10,
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        );
        pipeline.state.velocity.swap();
        pipeline.step(None);
        // Curl buffer untouched when the stage is disabled.
        assert!(pipeline.state.curl.texels().iter().all(|t| t.x == 0.0));

        config.vorticity_strength = 10.0;
        let mut pipeline = SolverPipeline::new(32, 32, config).unwrap();
        let shear = Vec4::new(1.0, 0.0, 0.0, 1.0);
        for x in 0..32 {
            for y in 0..16 {
                pipeline.state.velocity.write_target().set(x, y, shear);
            }
        }
        pipeline.state.velocity.swap();
        pipeline.step(None);
        assert!(
            pipeline.state.curl.texels().iter().any(|t| t.x != 0.0),
            "curl buffer should be populated when vorticity is enabled"
        );
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let mut config = SimConfig::default();
        config.fixed_dt = 0.0;
        assert!(SolverPipeline::new(16, 16, config).is_err());
    }
}
