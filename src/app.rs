//! Interactive frame driver: an eframe app that owns the solver, feeds it
//! pointer input, and presents the dye field once per repaint.

use eframe::egui;
use rand::rngs::ThreadRng;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::input::PointerInputModel;
use crate::kernels;
use crate::pipeline::SolverPipeline;

pub struct FluidApp {
    pipeline: SolverPipeline,
    pointer: PointerInputModel,
    rng: ThreadRng,
    paused: bool,
    surface_size: (u32, u32),
    texture: Option<egui::TextureHandle>,
}

impl FluidApp {
    pub fn new(config: SimConfig, surface_width: u32, surface_height: u32) -> Result<Self, SimError> {
        let (w, h) = config.grid_size(surface_width, surface_height);
        log::info!(
            "starting solver at {}x{} (surface {}x{}, downsample {})",
            w,
            h,
            surface_width,
            surface_height,
            config.texture_downsample
        );
        Ok(Self {
            pointer: PointerInputModel::new(config.pointer_delta_gain),
            pipeline: SolverPipeline::new(w, h, config)?,
            rng: rand::thread_rng(),
            paused: false,
            surface_size: (surface_width, surface_height),
            texture: None,
        })
    }

    /// Rebuild all fields when the canvas size changes. Simulation state is
    /// lost on resize; that is accepted behavior, not a bug.
    fn handle_resize(&mut self, surface_width: u32, surface_height: u32) {
        if (surface_width, surface_height) == self.surface_size {
            return;
        }
        self.surface_size = (surface_width, surface_height);
        let (w, h) = self.pipeline.config.grid_size(surface_width, surface_height);
        if w != self.pipeline.state.width || h != self.pipeline.state.height {
            if let Err(e) = self.pipeline.resize(w, h) {
                log::error!("resize to {}x{} failed: {e}", w, h);
            }
        }
    }

    /// Run the density field through the present kernel into an egui
    /// texture. The image origin is top-left, the simulation's bottom-left,
    /// so rows are emitted in reverse.
    fn present(&mut self, ctx: &egui::Context) -> egui::TextureId {
        let density = self.pipeline.state.density.readable();
        let (w, h) = (density.width(), density.height());
        let mut pixels = Vec::with_capacity(w * h);
        for y in (0..h).rev() {
            for x in 0..w {
                let p = kernels::present(density.get(x, y));
                pixels.push(egui::Color32::from_rgb(p[0], p[1], p[2]));
            }
        }
        let image = egui::ColorImage {
            size: [w, h],
            pixels,
        };
        match &mut self.texture {
            Some(texture) => {
                texture.set(image, egui::TextureOptions::LINEAR);
                texture.id()
            }
            None => {
                let texture = ctx.load_texture("dye", image, egui::TextureOptions::LINEAR);
                let id = texture.id();
                self.texture = Some(texture);
                id
            }
        }
    }
}

impl eframe::App for FluidApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                self.handle_resize(rect.width() as u32, rect.height() as u32);

                let response = ui.allocate_rect(rect, egui::Sense::click_and_drag());

                // Pointer wiring. Position updates on every motion sample;
                // only motion while pressed marks the frame dirty.
                if response.drag_started_by(egui::PointerButton::Primary) {
                    if let Some(pos) = response.interact_pointer_pos() {
                        self.pointer
                            .pointer_down(pos.x - rect.left(), pos.y - rect.top(), &mut self.rng);
                    }
                }
                if let Some(pos) = response.hover_pos().or(response.interact_pointer_pos()) {
                    self.pointer
                        .pointer_move(pos.x - rect.left(), pos.y - rect.top());
                }
                if response.drag_stopped_by(egui::PointerButton::Primary) {
                    self.pointer.pointer_up();
                }
                if ui.input(|i| i.key_pressed(egui::Key::Space)) {
                    self.paused = !self.paused;
                }

                if !self.paused {
                    let request = self.pointer.take_request(rect.width(), rect.height());
                    self.pipeline.step(request);
                }

                let texture_id = self.present(ctx);
                ui.painter().image(
                    texture_id,
                    rect,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            });

        // Vsync-aligned cooperative loop: one step per repaint.
        ctx.request_repaint();
    }

    /// Persist the solver tuning across sessions. Field contents are not
    /// saved; a fresh run starts from empty fields with the same knobs.
    fn save(&mut self, storage: &mut dyn eframe::Storage) {
        eframe::set_value(storage, eframe::APP_KEY, &self.pipeline.config);
    }
}
