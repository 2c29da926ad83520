//! 2D texel storage: RGBA-shaped float fields with clamp-to-edge sampling
//! and ping-pong double buffering.

use glam::{Vec2, Vec4};

use crate::error::SimError;

/// Sampling filter used when a kernel reads a field at a non-integer
/// coordinate. Mirrors the texture filter the field would carry on a GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Linear,
    Nearest,
}

/// A width x height grid of 4-component float texels. Only 1-2 channels are
/// semantically used per field (velocity xy, dye xyz, scalars in x); keeping
/// the RGBA shape keeps every kernel signature uniform across fields.
#[derive(Debug, Clone)]
pub struct Field {
    width: usize,
    height: usize,
    filter: FilterMode,
    texels: Vec<Vec4>,
}

impl Field {
    pub fn new(width: usize, height: usize, filter: FilterMode) -> Result<Self, SimError> {
        if width == 0 || height == 0 {
            return Err(SimError::Allocation { width, height });
        }
        Ok(Self {
            width,
            height,
            filter,
            texels: vec![Vec4::ZERO; width * height],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    /// (1/W, 1/H), the neighbor offset every stencil kernel uses.
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Vec4 {
        self.texels[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: Vec4) {
        self.texels[y * self.width + x] = value;
    }

    /// Clamp-to-edge texel fetch for out-of-range integer coordinates.
    #[inline]
    pub fn fetch(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.width as i64 - 1) as usize;
        let y = y.clamp(0, self.height as i64 - 1) as usize;
        self.texels[y * self.width + x]
    }

    /// Sample at a normalized coordinate in [0,1]^2 with this field's filter.
    /// Texel centers sit at ((i + 0.5)/W, (j + 0.5)/H); coordinates outside
    /// the unit square clamp to the edge texel.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        match self.filter {
            FilterMode::Nearest => {
                let x = (uv.x * self.width as f32).floor() as i64;
                let y = (uv.y * self.height as f32).floor() as i64;
                self.fetch(x, y)
            }
            FilterMode::Linear => {
                let tx = uv.x * self.width as f32 - 0.5;
                let ty = uv.y * self.height as f32 - 0.5;
                let x0 = tx.floor();
                let y0 = ty.floor();
                let fx = tx - x0;
                let fy = ty - y0;
                let x0 = x0 as i64;
                let y0 = y0 as i64;
                let p00 = self.fetch(x0, y0);
                let p10 = self.fetch(x0 + 1, y0);
                let p01 = self.fetch(x0, y0 + 1);
                let p11 = self.fetch(x0 + 1, y0 + 1);
                p00.lerp(p10, fx).lerp(p01.lerp(p11, fx), fy)
            }
        }
    }

    pub fn clear(&mut self) {
        self.texels.fill(Vec4::ZERO);
    }

    pub fn texels(&self) -> &[Vec4] {
        &self.texels
    }

    pub fn texels_mut(&mut self) -> &mut [Vec4] {
        &mut self.texels
    }
}

/// Ping-pong pair. Exactly one side is readable and one is the write target
/// at any time; `swap` exchanges the roles in O(1) without copying texels.
#[derive(Debug, Clone)]
pub struct DoubleBuffer {
    a: Field,
    b: Field,
    front_is_a: bool,
}

impl DoubleBuffer {
    pub fn new(width: usize, height: usize, filter: FilterMode) -> Result<Self, SimError> {
        Ok(Self {
            a: Field::new(width, height, filter)?,
            b: Field::new(width, height, filter)?,
            front_is_a: true,
        })
    }

    pub fn readable(&self) -> &Field {
        if self.front_is_a { &self.a } else { &self.b }
    }

    pub fn write_target(&mut self) -> &mut Field {
        if self.front_is_a { &mut self.b } else { &mut self.a }
    }

    /// Readable side and write target simultaneously, for kernels that read
    /// the previous frame while producing the next.
    pub fn pair_mut(&mut self) -> (&Field, &mut Field) {
        if self.front_is_a {
            (&self.a, &mut self.b)
        } else {
            (&self.b, &mut self.a)
        }
    }

    pub fn swap(&mut self) {
        self.front_is_a = !self.front_is_a;
    }

    pub fn clear_both(&mut self) {
        self.a.clear();
        self.b.clear();
    }
}
