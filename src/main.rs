use std::path::Path;

use glam::{Vec2, Vec3};
use inkflow::{FluidApp, FluidMetrics, ImageExporter, SimConfig, SolverPipeline, SplatRequest};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "headless" {
        run_headless()?;
    } else {
        run_gui()?;
    }
    Ok(())
}

/// Scripted run without a window: one diagonal stroke of red dye, PNG
/// frames and metrics every few steps.
fn run_headless() -> Result<(), Box<dyn std::error::Error>> {
    log::info!("running headless scenario");

    let config = SimConfig::default();
    let mut pipeline = SolverPipeline::new(256, 256, config)?;
    let exporter = ImageExporter::new(512, 512);

    for frame in 0..60u64 {
        // Drag across the middle of the domain for the first 20 frames.
        let request = if frame < 20 {
            let t = frame as f32 / 20.0;
            Some(SplatRequest {
                point: Vec2::new(0.3 + 0.4 * t, 0.5),
                delta: Vec2::new(60.0, 0.0),
                color: Vec3::new(1.0, 0.2, 0.1),
            })
        } else {
            None
        };
        pipeline.step(request);

        if frame % 10 == 0 {
            FluidMetrics::analyze(&pipeline.state, frame).print_summary();
            let dye_path = format!("frame_{frame:04}.png");
            let vel_path = format!("velocity_{frame:04}.png");
            exporter.export_dye_png(&pipeline.state, Path::new(&dye_path))?;
            exporter.export_velocity_png(&pipeline.state, Path::new(&vel_path))?;
        }
    }

    FluidMetrics::analyze(&pipeline.state, 60).print_summary();
    println!("Headless run complete.");
    Ok(())
}

fn run_gui() -> Result<(), Box<dyn std::error::Error>> {
    let width = 1024.0;
    let height = 768.0;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([width, height])
            .with_title("inkflow"),
        ..Default::default()
    };

    eframe::run_native(
        "inkflow",
        options,
        Box::new(move |cc| {
            // Tuning knobs survive restarts; anything stale or out of range
            // falls back to the defaults.
            let config = cc
                .storage
                .and_then(|storage| eframe::get_value::<SimConfig>(storage, eframe::APP_KEY))
                .filter(|config| config.validate().is_ok())
                .unwrap_or_default();
            let app = FluidApp::new(config, width as u32, height as u32)
                .expect("solver startup failed");
            Box::new(app)
        }),
    )
    .map_err(|e| format!("eframe failed: {e}"))?;
    Ok(())
}
