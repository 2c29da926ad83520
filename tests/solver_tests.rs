use glam::{Vec2, Vec3, Vec4};
use inkflow::{metrics, SimConfig, SolverPipeline, SplatRequest};

fn conservative_config() -> SimConfig {
    SimConfig {
        velocity_dissipation: 1.0,
        density_dissipation: 1.0,
        ..SimConfig::default()
    }
}

/// Fill the velocity field's x component with a narrow Gaussian bump, a
/// smooth but strongly divergent flow.
fn set_velocity_bump(pipeline: &mut SolverPipeline, center: Vec2, variance: f32) {
    let (w, h) = (pipeline.state.width, pipeline.state.height);
    {
        let target = pipeline.state.velocity.write_target();
        for y in 0..h {
            for x in 0..w {
                let uv = Vec2::new((x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32);
                let d = uv - center;
                let vx = (-d.dot(d) / variance).exp();
                target.set(x, y, Vec4::new(vx, 0.0, 0.0, 1.0));
            }
        }
    }
    pipeline.state.velocity.swap();
}

#[test]
fn projection_reduces_divergence_by_an_order_of_magnitude() {
    let config = SimConfig {
        pressure_iterations: 200,
        ..conservative_config()
    };
    let mut pipeline = SolverPipeline::new(32, 32, config).unwrap();
    set_velocity_bump(&mut pipeline, Vec2::new(0.5, 0.5), 0.001);

    let before = metrics::mean_abs_divergence(&pipeline.state);
    assert!(before > 1e-3, "bump should be divergent, got {before}");

    pipeline.step(None);

    let after = metrics::mean_abs_divergence(&pipeline.state);
    println!("mean |divergence|: {before:.6} -> {after:.6}");
    assert!(
        after < before / 10.0,
        "projection should reduce divergence at least 10x: {before} -> {after}"
    );
}

#[test]
fn projection_works_with_warm_started_pressure() {
    let config = SimConfig {
        pressure_iterations: 60,
        pressure_warm_start: true,
        ..conservative_config()
    };
    let mut pipeline = SolverPipeline::new(32, 32, config).unwrap();
    set_velocity_bump(&mut pipeline, Vec2::new(0.5, 0.5), 0.001);
    let before = metrics::mean_abs_divergence(&pipeline.state);

    // Repeated frames keep refining the carried-over pressure.
    for _ in 0..3 {
        pipeline.step(None);
    }

    let after = metrics::mean_abs_divergence(&pipeline.state);
    assert!(
        after < before / 10.0,
        "warm-started projection should still converge: {before} -> {after}"
    );
}

#[test]
fn dye_is_conserved_without_dissipation_or_input() {
    // With unit dissipation, zero velocity and no pointer input there is no
    // decay term anywhere: the dye integral must hold across 100 steps.
    let mut pipeline = SolverPipeline::new(64, 64, conservative_config()).unwrap();
    {
        let target = pipeline.state.density.write_target();
        for y in 24..40 {
            for x in 24..40 {
                target.set(x, y, Vec4::new(0.5, 0.3, 0.1, 1.0));
            }
        }
    }
    pipeline.state.density.swap();

    let initial: f32 = pipeline
        .state
        .density
        .readable()
        .texels()
        .iter()
        .map(|t| t.x + t.y + t.z)
        .sum();

    for _ in 0..100 {
        pipeline.step(None);
    }

    let last: f32 = pipeline
        .state
        .density
        .readable()
        .texels()
        .iter()
        .map(|t| t.x + t.y + t.z)
        .sum();

    println!("dye integral: {initial:.6} -> {last:.6}");
    assert!(
        (last - initial).abs() / initial < 1e-4,
        "dye integral drifted: {initial} -> {last}"
    );
}

#[test]
fn injected_dye_decays_by_the_dissipation_law() {
    // End-to-end scenario: one red splat with a small rightward push on a
    // 128x128 grid, 60 steps. The dye integral must follow the advection
    // dissipation factor, not some other decay.
    let config = SimConfig {
        velocity_dissipation: 0.99,
        density_dissipation: 0.98,
        fixed_dt: 0.016,
        ..SimConfig::default()
    };
    let mut pipeline = SolverPipeline::new(128, 128, config).unwrap();

    let request = SplatRequest {
        point: Vec2::new(0.5, 0.5),
        delta: Vec2::new(0.1, 0.0),
        color: Vec3::new(1.0, 0.0, 0.0),
    };
    pipeline.step(Some(request));

    let total = |pipeline: &SolverPipeline| -> f32 {
        pipeline
            .state
            .density
            .readable()
            .texels()
            .iter()
            .map(|t| t.x)
            .sum()
    };
    let post_injection = total(&pipeline);
    assert!(post_injection > 0.0, "splat injected no dye");

    for _ in 0..59 {
        pipeline.step(None);
    }
    let final_total = total(&pipeline);

    // 59 further advection passes, each retaining 0.98 of the dye.
    let expected = post_injection * 0.98f32.powi(59);
    let ratio = final_total / expected;
    println!(
        "dye integral {post_injection:.4} -> {final_total:.4}, expected {expected:.4} (ratio {ratio:.4})"
    );
    assert!(
        (0.95..=1.05).contains(&ratio),
        "decay should track the dissipation law, ratio {ratio}"
    );
}

#[test]
fn splat_then_steps_moves_dye_downstream() {
    let mut pipeline = SolverPipeline::new(64, 64, SimConfig::default()).unwrap();
    let request = SplatRequest {
        point: Vec2::new(0.25, 0.5),
        delta: Vec2::new(120.0, 0.0),
        color: Vec3::new(0.0, 0.0, 1.0),
    };
    pipeline.step(Some(request));
    for _ in 0..30 {
        pipeline.step(None);
    }

    let density = pipeline.state.density.readable();
    let mut left = 0.0;
    let mut right = 0.0;
    for y in 0..64 {
        for x in 0..16 {
            left += density.get(x, y).z;
        }
        for x in 16..64 {
            right += density.get(x, y).z;
        }
    }
    println!("dye split left {left:.4} / right {right:.4}");
    assert!(
        right > left,
        "rightward push should carry dye past the injection column"
    );
}

#[test]
fn steady_state_runs_allocation_free_frames() {
    // Smoke test for the no-reallocation contract: stepping must not change
    // the field dimensions or invalidate buffers.
    let mut pipeline = SolverPipeline::new(48, 32, SimConfig::default()).unwrap();
    for _ in 0..10 {
        pipeline.step(None);
    }
    assert_eq!(pipeline.state.width, 48);
    assert_eq!(pipeline.state.height, 32);
    assert_eq!(pipeline.frame(), 10);
}
