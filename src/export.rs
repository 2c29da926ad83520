//! PNG export of simulation frames, for the headless runner.

use std::path::Path;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::grid::Field;
use crate::kernels;
use crate::state::FluidState;

pub struct ImageExporter {
    width: u32,
    height: u32,
}

impl ImageExporter {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Upsample the dye field to the output resolution through the present
    /// kernel.
    pub fn render_dye(&self, state: &FluidState) -> RgbImage {
        let density = state.density.readable();
        self.render_with(|x, y| {
            let pixel = kernels::present(sample_scaled(density, x, y, self.width, self.height));
            Rgb([pixel[0], pixel[1], pixel[2]])
        })
    }

    /// Velocity magnitude as a red/green split of |vx| and |vy|.
    pub fn render_velocity(&self, state: &FluidState) -> RgbImage {
        let velocity = state.velocity.readable();
        self.render_with(|x, y| {
            let texel = sample_scaled(velocity, x, y, self.width, self.height);
            let r = (texel.x.abs() * 255.0).min(255.0) as u8;
            let g = (texel.y.abs() * 255.0).min(255.0) as u8;
            Rgb([r, g, 128])
        })
    }

    pub fn export_dye_png(
        &self,
        state: &FluidState,
        path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.render_dye(state).save(path)?;
        Ok(())
    }

    pub fn export_velocity_png(
        &self,
        state: &FluidState,
        path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.render_velocity(state).save(path)?;
        Ok(())
    }

    fn render_with(&self, f: impl Fn(u32, u32) -> Rgb<u8>) -> RgbImage {
        let mut img = ImageBuffer::new(self.width, self.height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = f(x, y);
        }
        img
    }
}

fn sample_scaled(field: &Field, x: u32, y: u32, out_w: u32, out_h: u32) -> glam::Vec4 {
    // The image origin is top-left, the simulation's bottom-left.
    let uv = glam::Vec2::new(
        (x as f32 + 0.5) / out_w as f32,
        1.0 - (y as f32 + 0.5) / out_h as f32,
    );
    field.sample(uv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn dye_render_flips_vertically() {
        let mut state = FluidState::new(4, 4).unwrap();
        // Bottom row of the simulation lands at the bottom of the image,
        // i.e. at high image y.
        state
            .density
            .write_target()
            .set(0, 0, Vec4::new(1.0, 1.0, 1.0, 1.0));
        state.density.swap();
        let img = ImageExporter::new(4, 4).render_dye(&state);
        assert!(img.get_pixel(0, 3)[0] > 128);
        assert!(img.get_pixel(0, 0)[0] < 128);
    }
}
