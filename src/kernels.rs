//! The fixed set of per-cell computational kernels.
//!
//! Each kernel is a pure function of its sampled inputs and scalar
//! parameters, evaluated independently at every grid cell; `run` applies one
//! kernel over a whole output field with rayon splitting the rows. There is
//! no cell-to-cell dependency inside a single invocation, so row order never
//! matters.

use glam::{Vec2, Vec3, Vec4};
use rayon::prelude::*;

use crate::grid::Field;

/// Kernel identifiers, shared with the GPU backend where they name compute
/// entry points. Built once at initialization, never re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelId {
    Advect,
    Splat,
    Divergence,
    PressureJacobi,
    GradientSubtract,
    Curl,
    VorticityForce,
    Present,
}

impl KernelId {
    pub const ALL: [KernelId; 8] = [
        KernelId::Advect,
        KernelId::Splat,
        KernelId::Divergence,
        KernelId::PressureJacobi,
        KernelId::GradientSubtract,
        KernelId::Curl,
        KernelId::VorticityForce,
        KernelId::Present,
    ];

    pub fn entry_point(self) -> &'static str {
        match self {
            KernelId::Advect => "advect",
            KernelId::Splat => "splat",
            KernelId::Divergence => "divergence",
            KernelId::PressureJacobi => "pressure_jacobi",
            KernelId::GradientSubtract => "gradient_subtract",
            KernelId::Curl => "curl",
            KernelId::VorticityForce => "vorticity_force",
            KernelId::Present => "present",
        }
    }
}

/// One kernel invocation: the kernel plus its input bindings. Output is
/// always a single field of the same dimensions, passed to `run`.
pub enum KernelCall<'a> {
    Advect {
        velocity: &'a Field,
        source: &'a Field,
        dt: f32,
        dissipation: f32,
    },
    Splat {
        target: &'a Field,
        point: Vec2,
        aspect_ratio: f32,
        color: Vec3,
        radius: f32,
    },
    Divergence {
        velocity: &'a Field,
    },
    PressureJacobi {
        pressure: &'a Field,
        divergence: &'a Field,
    },
    GradientSubtract {
        pressure: &'a Field,
        velocity: &'a Field,
    },
    Curl {
        velocity: &'a Field,
    },
    VorticityForce {
        velocity: &'a Field,
        curl: &'a Field,
        strength: f32,
        dt: f32,
    },
}

/// Neighbor coordinates derived once per cell, the shared vertex-stage
/// counterpart every stencil kernel depends on.
#[derive(Clone, Copy)]
struct CellCoords {
    uv: Vec2,
    left: Vec2,
    right: Vec2,
    top: Vec2,
    bottom: Vec2,
}

impl CellCoords {
    #[inline]
    fn at(x: usize, y: usize, texel_size: Vec2) -> Self {
        let uv = Vec2::new(
            (x as f32 + 0.5) * texel_size.x,
            (y as f32 + 0.5) * texel_size.y,
        );
        Self {
            uv,
            left: uv - Vec2::new(texel_size.x, 0.0),
            right: uv + Vec2::new(texel_size.x, 0.0),
            top: uv + Vec2::new(0.0, texel_size.y),
            bottom: uv - Vec2::new(0.0, texel_size.y),
        }
    }
}

/// Evaluate one kernel at every cell of `out`.
pub fn run(call: &KernelCall<'_>, out: &mut Field) {
    let width = out.width();
    let texel_size = out.texel_size();
    out.texels_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, texel) in row.iter_mut().enumerate() {
                let c = CellCoords::at(x, y, texel_size);
                *texel = eval(call, c, texel_size);
            }
        });
}

#[inline]
fn eval(call: &KernelCall<'_>, c: CellCoords, texel_size: Vec2) -> Vec4 {
    match *call {
        KernelCall::Advect {
            velocity,
            source,
            dt,
            dissipation,
        } => {
            // Trace backward along the velocity, resample, dissipate.
            let v = velocity.sample(c.uv);
            let coord = c.uv - dt * Vec2::new(v.x, v.y) * texel_size;
            dissipation * source.sample(coord)
        }
        KernelCall::Splat {
            target,
            point,
            aspect_ratio,
            color,
            radius,
        } => {
            let mut p = c.uv - point;
            p.x *= aspect_ratio;
            let falloff = (-p.dot(p) / radius).exp();
            let base = target.sample(c.uv);
            Vec4::new(
                base.x + falloff * color.x,
                base.y + falloff * color.y,
                base.z + falloff * color.z,
                1.0,
            )
        }
        KernelCall::Divergence { velocity } => {
            // Free-slip walls: the normal velocity component reflects sign
            // across the edge, the tangential component is preserved.
            let l = sample_velocity_reflected(velocity, c.left).x;
            let r = sample_velocity_reflected(velocity, c.right).x;
            let t = sample_velocity_reflected(velocity, c.top).y;
            let b = sample_velocity_reflected(velocity, c.bottom).y;
            let div = 0.5 * (r - l + t - b);
            Vec4::new(div, 0.0, 0.0, 1.0)
        }
        KernelCall::PressureJacobi {
            pressure,
            divergence,
        } => {
            // Zero-Neumann pressure boundary: clamped, not reflected.
            let l = pressure.sample(clamp_uv(c.left)).x;
            let r = pressure.sample(clamp_uv(c.right)).x;
            let t = pressure.sample(clamp_uv(c.top)).x;
            let b = pressure.sample(clamp_uv(c.bottom)).x;
            let div = divergence.sample(c.uv).x;
            let p = (l + r + b + t - div) * 0.25;
            Vec4::new(p, 0.0, 0.0, 1.0)
        }
        KernelCall::GradientSubtract { pressure, velocity } => {
            let l = pressure.sample(clamp_uv(c.left)).x;
            let r = pressure.sample(clamp_uv(c.right)).x;
            let t = pressure.sample(clamp_uv(c.top)).x;
            let b = pressure.sample(clamp_uv(c.bottom)).x;
            let v = velocity.sample(c.uv);
            Vec4::new(v.x - (r - l), v.y - (t - b), 0.0, 1.0)
        }
        KernelCall::Curl { velocity } => {
            let l = velocity.sample(clamp_uv(c.left)).y;
            let r = velocity.sample(clamp_uv(c.right)).y;
            let t = velocity.sample(clamp_uv(c.top)).x;
            let b = velocity.sample(clamp_uv(c.bottom)).x;
            Vec4::new(0.5 * ((r - l) - (t - b)), 0.0, 0.0, 1.0)
        }
        KernelCall::VorticityForce {
            velocity,
            curl,
            strength,
            dt,
        } => {
            let l = curl.sample(clamp_uv(c.left)).x.abs();
            let r = curl.sample(clamp_uv(c.right)).x.abs();
            let t = curl.sample(clamp_uv(c.top)).x.abs();
            let b = curl.sample(clamp_uv(c.bottom)).x.abs();
            let center = curl.sample(c.uv).x;
            let mut force = 0.5 * Vec2::new(t - b, r - l);
            force /= force.length() + 1e-4;
            force *= strength * center;
            force.y = -force.y;
            let v = velocity.sample(c.uv);
            Vec4::new(v.x + force.x * dt, v.y + force.y * dt, 0.0, 1.0)
        }
    }
}

/// The `present` kernel: identity copy of a dye texel to an 8-bit output
/// pixel, no transform beyond the clamp to displayable range.
#[inline]
pub fn present(texel: Vec4) -> [u8; 4] {
    [
        (texel.x.clamp(0.0, 1.0) * 255.0) as u8,
        (texel.y.clamp(0.0, 1.0) * 255.0) as u8,
        (texel.z.clamp(0.0, 1.0) * 255.0) as u8,
        255,
    ]
}

#[inline]
fn clamp_uv(uv: Vec2) -> Vec2 {
    uv.clamp(Vec2::ZERO, Vec2::ONE)
}

/// Clamp the coordinate into the domain and negate whichever velocity
/// component crossed the edge. Used only by the divergence kernel; pressure
/// kernels clamp without reflecting, and the two must stay distinct.
#[inline]
fn sample_velocity_reflected(velocity: &Field, uv: Vec2) -> Vec2 {
    let mut uv = uv;
    let mut multiplier = Vec2::ONE;
    if uv.x < 0.0 {
        uv.x = 0.0;
        multiplier.x = -1.0;
    }
    if uv.x > 1.0 {
        uv.x = 1.0;
        multiplier.x = -1.0;
    }
    if uv.y < 0.0 {
        uv.y = 0.0;
        multiplier.y = -1.0;
    }
    if uv.y > 1.0 {
        uv.y = 1.0;
        multiplier.y = -1.0;
    }
    let v = velocity.sample(uv);
    multiplier * Vec2::new(v.x, v.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::FilterMode;

    fn field(w: usize, h: usize) -> Field {
        Field::new(w, h, FilterMode::Linear).unwrap()
    }

    #[test]
    fn divergence_reflects_velocity_at_the_wall() {
        // Velocity (1, 0) at cell (0, 1) of a 4x4 grid. The left neighbor
        // sample falls outside the domain and must come back as (-1, 0),
        // giving divergence 0.5 * (R - L) = 0.5 * (0 - (-1)) = 0.5.
        let mut velocity = field(4, 4);
        velocity.set(0, 1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let mut out = field(4, 4);
        run(&KernelCall::Divergence { velocity: &velocity }, &mut out);
        assert!(
            (out.get(0, 1).x - 0.5).abs() < 1e-5,
            "expected free-slip reflected divergence 0.5, got {}",
            out.get(0, 1).x
        );
    }

    #[test]
    fn divergence_of_uniform_flow_is_zero_in_the_interior() {
        let mut velocity = field(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                velocity.set(x, y, Vec4::new(1.0, 0.5, 0.0, 1.0));
            }
        }
        let mut out = field(8, 8);
        run(&KernelCall::Divergence { velocity: &velocity }, &mut out);
        assert!(out.get(4, 4).x.abs() < 1e-5);
    }

    #[test]
    fn splat_is_local() {
        // A radius-0.003 splat at the center must be invisible half the
        // domain away.
        let target = field(64, 64);
        let mut out = field(64, 64);
        run(
            &KernelCall::Splat {
                target: &target,
                point: Vec2::new(0.5, 0.5),
                aspect_ratio: 1.0,
                color: Vec3::new(1.0, 1.0, 1.0),
                radius: 0.003,
            },
            &mut out,
        );
        // Cell nearest to (1.0, 0.5): 0.5 normalized units from the splat.
        let far = out.get(63, 32);
        assert!(far.x < 1e-4, "splat leaked to distant cell: {}", far.x);
        // And it did land at the center.
        assert!(out.get(32, 32).x > 0.5);
    }

    #[test]
    fn splat_adds_to_existing_values() {
        let mut target = field(16, 16);
        target.set(8, 8, Vec4::new(0.25, 0.0, 0.0, 1.0));
        let mut out = field(16, 16);
        run(
            &KernelCall::Splat {
                target: &target,
                point: Vec2::new(0.53, 0.53),
                aspect_ratio: 1.0,
                color: Vec3::new(1.0, 0.0, 0.0),
                radius: 0.01,
            },
            &mut out,
        );
        assert!(out.get(8, 8).x > 0.25);
    }

    #[test]
    fn advection_with_zero_velocity_is_dissipation_only() {
        let velocity = field(8, 8);
        let mut source = field(8, 8);
        source.set(3, 3, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let mut out = field(8, 8);
        run(
            &KernelCall::Advect {
                velocity: &velocity,
                source: &source,
                dt: 0.016,
                dissipation: 0.9,
            },
            &mut out,
        );
        assert!((out.get(3, 3).x - 0.9).abs() < 1e-5);
        assert!(out.get(4, 3).x.abs() < 1e-5);
    }

    #[test]
    fn jacobi_step_averages_neighbors_minus_divergence() {
        let mut pressure = field(3, 3);
        pressure.set(0, 1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        pressure.set(2, 1, Vec4::new(1.0, 0.0, 0.0, 1.0));
        pressure.set(1, 0, Vec4::new(1.0, 0.0, 0.0, 1.0));
        pressure.set(1, 2, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let mut div = field(3, 3);
        div.set(1, 1, Vec4::new(2.0, 0.0, 0.0, 1.0));
        let mut out = field(3, 3);
        run(
            &KernelCall::PressureJacobi {
                pressure: &pressure,
                divergence: &div,
            },
            &mut out,
        );
        // (1 + 1 + 1 + 1 - 2) / 4 = 0.5
        assert!((out.get(1, 1).x - 0.5).abs() < 1e-5);
    }

    #[test]
    fn present_clamps_to_displayable_range() {
        assert_eq!(present(Vec4::new(2.0, -1.0, 0.5, 1.0)), [255, 0, 127, 255]);
    }
}
