//! GPU-resident pipeline: the same kernel set as the CPU solver, expressed
//! as wgpu compute entry points over ping-pong storage textures.
//!
//! Every kernel shares one bind group layout (uniform params, two read
//! textures, one write texture); all bind groups are pre-built at allocation
//! time into an explicit table indexed by buffer orientation, so a frame
//! performs no resource creation at all -- per-stage uniforms are refreshed
//! with `queue.write_buffer` and the whole frame is submitted as one command
//! encoder.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use tokio::sync::oneshot;
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, ComputePipeline, Device, Queue, Texture, TextureFormat,
    TextureView,
};

use crate::config::SimConfig;
use crate::error::SimError;
use crate::input::SplatRequest;
use crate::kernels::KernelId;

const WORKGROUP_SIZE: u32 = 8;

const KERNEL_SOURCE: &str = r#"
struct KernelParams {
    texel_size: vec2<f32>,
    point: vec2<f32>,
    color: vec4<f32>,
    dt: f32,
    dissipation: f32,
    aspect_ratio: f32,
    radius: f32,
    vorticity: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0) var<uniform> params: KernelParams;
@group(0) @binding(1) var input_a: texture_storage_2d<rgba32float, read>;
@group(0) @binding(2) var input_b: texture_storage_2d<rgba32float, read>;
@group(0) @binding(3) var output: texture_storage_2d<rgba32float, write>;

fn load_clamped(t: texture_storage_2d<rgba32float, read>, c: vec2<i32>) -> vec4<f32> {
    let size = vec2<i32>(textureDimensions(t));
    return textureLoad(t, clamp(c, vec2<i32>(0, 0), size - vec2<i32>(1, 1)));
}

// Manual bilinear filtering over a storage texture: texel centers at
// (i + 0.5) / size, clamp-to-edge outside the unit square.
fn sample_bilinear(t: texture_storage_2d<rgba32float, read>, uv: vec2<f32>) -> vec4<f32> {
    let size = vec2<f32>(textureDimensions(t));
    let tx = uv * size - vec2<f32>(0.5, 0.5);
    let base = floor(tx);
    let f = tx - base;
    let i = vec2<i32>(base);
    let p00 = load_clamped(t, i);
    let p10 = load_clamped(t, i + vec2<i32>(1, 0));
    let p01 = load_clamped(t, i + vec2<i32>(0, 1));
    let p11 = load_clamped(t, i + vec2<i32>(1, 1));
    return mix(mix(p00, p10, f.x), mix(p01, p11, f.x), f.y);
}

// Free-slip wall sampling: clamp into the domain and negate whichever
// velocity component crossed the edge. Divergence only; the pressure
// kernels clamp without reflecting.
fn sample_velocity_reflected(uv_in: vec2<f32>) -> vec2<f32> {
    var uv = uv_in;
    var multiplier = vec2<f32>(1.0, 1.0);
    if (uv.x < 0.0) { uv.x = 0.0; multiplier.x = -1.0; }
    if (uv.x > 1.0) { uv.x = 1.0; multiplier.x = -1.0; }
    if (uv.y < 0.0) { uv.y = 0.0; multiplier.y = -1.0; }
    if (uv.y > 1.0) { uv.y = 1.0; multiplier.y = -1.0; }
    return multiplier * sample_bilinear(input_a, uv).xy;
}

fn in_bounds(id: vec3<u32>) -> bool {
    let size = textureDimensions(output);
    return id.x < size.x && id.y < size.y;
}

fn cell_uv(id: vec3<u32>) -> vec2<f32> {
    return (vec2<f32>(f32(id.x), f32(id.y)) + vec2<f32>(0.5, 0.5)) * params.texel_size;
}

@compute @workgroup_size(8, 8)
fn advect(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    let uv = cell_uv(id);
    let velocity = sample_bilinear(input_a, uv).xy;
    let coord = uv - params.dt * velocity * params.texel_size;
    textureStore(output, vec2<i32>(id.xy), params.dissipation * sample_bilinear(input_b, coord));
}

@compute @workgroup_size(8, 8)
fn splat(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    var p = cell_uv(id) - params.point;
    p.x = p.x * params.aspect_ratio;
    let falloff = exp(-dot(p, p) / params.radius);
    let base = textureLoad(input_a, vec2<i32>(id.xy)).xyz;
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(base + falloff * params.color.xyz, 1.0));
}

@compute @workgroup_size(8, 8)
fn divergence(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    let uv = cell_uv(id);
    let l = sample_velocity_reflected(uv - vec2<f32>(params.texel_size.x, 0.0)).x;
    let r = sample_velocity_reflected(uv + vec2<f32>(params.texel_size.x, 0.0)).x;
    let t = sample_velocity_reflected(uv + vec2<f32>(0.0, params.texel_size.y)).y;
    let b = sample_velocity_reflected(uv - vec2<f32>(0.0, params.texel_size.y)).y;
    let div = 0.5 * (r - l + t - b);
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(div, 0.0, 0.0, 1.0));
}

@compute @workgroup_size(8, 8)
fn pressure_jacobi(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    let c = vec2<i32>(id.xy);
    let l = load_clamped(input_a, c - vec2<i32>(1, 0)).x;
    let r = load_clamped(input_a, c + vec2<i32>(1, 0)).x;
    let t = load_clamped(input_a, c + vec2<i32>(0, 1)).x;
    let b = load_clamped(input_a, c - vec2<i32>(0, 1)).x;
    let div = textureLoad(input_b, c).x;
    textureStore(output, c, vec4<f32>((l + r + b + t - div) * 0.25, 0.0, 0.0, 1.0));
}

@compute @workgroup_size(8, 8)
fn gradient_subtract(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    let c = vec2<i32>(id.xy);
    let l = load_clamped(input_a, c - vec2<i32>(1, 0)).x;
    let r = load_clamped(input_a, c + vec2<i32>(1, 0)).x;
    let t = load_clamped(input_a, c + vec2<i32>(0, 1)).x;
    let b = load_clamped(input_a, c - vec2<i32>(0, 1)).x;
    let velocity = textureLoad(input_b, c).xy;
    let projected = velocity - vec2<f32>(r - l, t - b);
    textureStore(output, c, vec4<f32>(projected, 0.0, 1.0));
}

@compute @workgroup_size(8, 8)
fn curl(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    let c = vec2<i32>(id.xy);
    let l = load_clamped(input_a, c - vec2<i32>(1, 0)).y;
    let r = load_clamped(input_a, c + vec2<i32>(1, 0)).y;
    let t = load_clamped(input_a, c + vec2<i32>(0, 1)).x;
    let b = load_clamped(input_a, c - vec2<i32>(0, 1)).x;
    textureStore(output, c, vec4<f32>(0.5 * ((r - l) - (t - b)), 0.0, 0.0, 1.0));
}

@compute @workgroup_size(8, 8)
fn vorticity_force(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    let c = vec2<i32>(id.xy);
    let l = abs(load_clamped(input_b, c - vec2<i32>(1, 0)).x);
    let r = abs(load_clamped(input_b, c + vec2<i32>(1, 0)).x);
    let t = abs(load_clamped(input_b, c + vec2<i32>(0, 1)).x);
    let b = abs(load_clamped(input_b, c - vec2<i32>(0, 1)).x);
    let center = textureLoad(input_b, c).x;
    var force = 0.5 * vec2<f32>(t - b, r - l);
    force = force / (length(force) + 1e-4);
    force = force * params.vorticity * center;
    force.y = -force.y;
    let velocity = textureLoad(input_a, c).xy;
    textureStore(output, c, vec4<f32>(velocity + force * params.dt, 0.0, 1.0));
}

@compute @workgroup_size(8, 8)
fn clear_field(@builtin(global_invocation_id) id: vec3<u32>) {
    if (!in_bounds(id)) { return; }
    textureStore(output, vec2<i32>(id.xy), vec4<f32>(0.0, 0.0, 0.0, 1.0));
}
"#;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct KernelParams {
    texel_size: [f32; 2],
    point: [f32; 2],
    color: [f32; 4],
    dt: f32,
    dissipation: f32,
    aspect_ratio: f32,
    radius: f32,
    vorticity: f32,
    _padding: [f32; 3],
}

impl KernelParams {
    fn base(width: u32, height: u32) -> Self {
        Self {
            texel_size: [1.0 / width as f32, 1.0 / height as f32],
            point: [0.0; 2],
            color: [0.0; 4],
            dt: 0.0,
            dissipation: 1.0,
            aspect_ratio: width as f32 / height as f32,
            radius: 1.0,
            vorticity: 0.0,
            _padding: [0.0; 3],
        }
    }
}

struct PingPongTex {
    textures: [Texture; 2],
    views: [TextureView; 2],
    front: usize,
}

impl PingPongTex {
    fn swap(&mut self) {
        self.front ^= 1;
    }

    fn front_texture(&self) -> &Texture {
        &self.textures[self.front]
    }
}

/// Per-stage uniform buffers, one per kernel invocation slot in the frame.
struct StageParams {
    advect_velocity: Buffer,
    advect_density: Buffer,
    splat_velocity: Buffer,
    splat_density: Buffer,
    stencil: Buffer,
    vorticity: Buffer,
}

/// Pre-built bind group table. Outer indices are double-buffer orientations
/// (which side is currently the readable one).
struct BindGroups {
    advect_velocity: [BindGroup; 2],
    advect_density: [[BindGroup; 2]; 2],
    splat_velocity: [BindGroup; 2],
    splat_density: [BindGroup; 2],
    divergence: [BindGroup; 2],
    clear_pressure: [BindGroup; 2],
    pressure: [BindGroup; 2],
    gradient: [[BindGroup; 2]; 2],
    curl: [BindGroup; 2],
    vorticity: [BindGroup; 2],
}

/// The GPU edition of the solver. Field data never leaves the device during
/// normal operation; `read_density` exists for tests and offline capture.
pub struct GpuSolverPipeline {
    device: Device,
    queue: Queue,
    config: SimConfig,
    width: u32,
    height: u32,
    format: TextureFormat,
    layout: BindGroupLayout,
    pipelines: std::collections::HashMap<KernelId, ComputePipeline>,
    clear_pipeline: ComputePipeline,
    velocity: PingPongTex,
    density: PingPongTex,
    pressure: PingPongTex,
    params: StageParams,
    groups: BindGroups,
    frame: u64,
}

impl GpuSolverPipeline {
    pub async fn new(width: u32, height: u32, config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        if width == 0 || height == 0 {
            return Err(SimError::Allocation {
                width: width as usize,
                height: height as usize,
            });
        }

        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(SimError::NoAdapter)?;
        log::info!("using adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("inkflow solver"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|e| SimError::Device(e.to_string()))?;

        // Preferred precision is full float; fall back to half floats when
        // the adapter cannot use rgba32float as a storage texture.
        let format = if adapter
            .get_texture_format_features(TextureFormat::Rgba32Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING)
        {
            TextureFormat::Rgba32Float
        } else if adapter
            .get_texture_format_features(TextureFormat::Rgba16Float)
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING)
        {
            log::warn!("rgba32float storage unsupported, falling back to rgba16float");
            TextureFormat::Rgba16Float
        } else {
            return Err(SimError::UnsupportedPrecision(
                "adapter supports neither rgba32float nor rgba16float storage textures".into(),
            ));
        };
        let source = match format {
            TextureFormat::Rgba32Float => KERNEL_SOURCE.to_string(),
            _ => KERNEL_SOURCE.replace("rgba32float", "rgba16float"),
        };

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<KernelParams>() as u64,
                        ),
                    },
                    count: None,
                },
                storage_texture_entry(1, wgpu::StorageTextureAccess::ReadOnly, format),
                storage_texture_entry(2, wgpu::StorageTextureAccess::ReadOnly, format),
                storage_texture_entry(3, wgpu::StorageTextureAccess::WriteOnly, format),
            ],
        });

        // Compile the whole kernel set once; surface rejected source as a
        // startup error instead of a panic.
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("kernel set"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("kernel pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let mut pipelines = std::collections::HashMap::new();
        for id in KernelId::ALL {
            // `present` is the surface blit, owned by the host render loop.
            if id == KernelId::Present {
                continue;
            }
            pipelines.insert(
                id,
                compute_pipeline(&device, &pipeline_layout, &module, id.entry_point()),
            );
        }
        let clear_pipeline = compute_pipeline(&device, &pipeline_layout, &module, "clear_field");
        if let Some(error) = device.pop_error_scope().await {
            return Err(SimError::KernelCompilation {
                kernel: "kernel set".into(),
                reason: error.to_string(),
            });
        }

        let (velocity, density, pressure, params, groups) =
            allocate_resources(&device, &layout, width, height, format);

        Ok(Self {
            device,
            queue,
            config,
            width,
            height,
            format,
            layout,
            pipelines,
            clear_pipeline,
            velocity,
            density,
            pressure,
            params,
            groups,
            frame: 0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Reallocate every field and bind group at a new grid size. Prior
    /// simulation state is lost, as on the CPU path.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), SimError> {
        if width == 0 || height == 0 {
            return Err(SimError::Allocation {
                width: width as usize,
                height: height as usize,
            });
        }
        log::info!("reallocating GPU fields at {}x{}", width, height);
        let (velocity, density, pressure, params, groups) =
            allocate_resources(&self.device, &self.layout, width, height, self.format);
        self.width = width;
        self.height = height;
        self.velocity = velocity;
        self.density = density;
        self.pressure = pressure;
        self.params = params;
        self.groups = groups;
        Ok(())
    }

    /// Advance one frame: identical stage order to the CPU pipeline, encoded
    /// as a single command submission.
    pub fn step(&mut self, splat: Option<SplatRequest>) {
        let base = KernelParams::base(self.width, self.height);
        self.write_params(
            &self.params.advect_velocity,
            KernelParams {
                dt: self.config.fixed_dt,
                dissipation: self.config.velocity_dissipation,
                ..base
            },
        );
        self.write_params(
            &self.params.advect_density,
            KernelParams {
                dt: self.config.fixed_dt,
                dissipation: self.config.density_dissipation,
                ..base
            },
        );
        self.write_params(&self.params.stencil, base);
        if let Some(request) = splat {
            self.write_params(
                &self.params.splat_velocity,
                KernelParams {
                    point: [request.point.x, request.point.y],
                    color: [request.delta.x, -request.delta.y, 1.0, 0.0],
                    radius: self.config.splat_radius,
                    ..base
                },
            );
            self.write_params(
                &self.params.splat_density,
                KernelParams {
                    point: [request.point.x, request.point.y],
                    color: [request.color.x, request.color.y, request.color.z, 0.0],
                    radius: self.config.splat_radius,
                    ..base
                },
            );
        }
        if self.config.vorticity_strength > 0.0 {
            self.write_params(
                &self.params.vorticity,
                KernelParams {
                    dt: self.config.fixed_dt,
                    vorticity: self.config.vorticity_strength,
                    ..base
                },
            );
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("solver frame"),
            });

        self.dispatch(
            &mut encoder,
            &self.pipelines[&KernelId::Advect],
            &self.groups.advect_velocity[self.velocity.front],
        );
        self.velocity.swap();
        self.dispatch(
            &mut encoder,
            &self.pipelines[&KernelId::Advect],
            &self.groups.advect_density[self.velocity.front][self.density.front],
        );
        self.density.swap();

        if splat.is_some() {
            self.dispatch(
                &mut encoder,
                &self.pipelines[&KernelId::Splat],
                &self.groups.splat_velocity[self.velocity.front],
            );
            self.velocity.swap();
            self.dispatch(
                &mut encoder,
                &self.pipelines[&KernelId::Splat],
                &self.groups.splat_density[self.density.front],
            );
            self.density.swap();
        }

        if self.config.vorticity_strength > 0.0 {
            self.dispatch(
                &mut encoder,
                &self.pipelines[&KernelId::Curl],
                &self.groups.curl[self.velocity.front],
            );
            self.dispatch(
                &mut encoder,
                &self.pipelines[&KernelId::VorticityForce],
                &self.groups.vorticity[self.velocity.front],
            );
            self.velocity.swap();
        }

        self.dispatch(
            &mut encoder,
            &self.pipelines[&KernelId::Divergence],
            &self.groups.divergence[self.velocity.front],
        );

        if !self.config.pressure_warm_start {
            self.dispatch(
                &mut encoder,
                &self.clear_pipeline,
                &self.groups.clear_pressure[self.pressure.front],
            );
        }
        for _ in 0..self.config.pressure_iterations {
            self.dispatch(
                &mut encoder,
                &self.pipelines[&KernelId::PressureJacobi],
                &self.groups.pressure[self.pressure.front],
            );
            self.pressure.swap();
        }

        self.dispatch(
            &mut encoder,
            &self.pipelines[&KernelId::GradientSubtract],
            &self.groups.gradient[self.pressure.front][self.velocity.front],
        );
        self.velocity.swap();

        self.queue.submit(std::iter::once(encoder.finish()));
        self.frame += 1;
    }

    /// Convenience used by tests: one splat without the rest of the frame.
    pub fn splat(&mut self, request: SplatRequest, velocity_color: Vec3, dye_color: Vec3) {
        let base = KernelParams::base(self.width, self.height);
        self.write_params(
            &self.params.splat_velocity,
            KernelParams {
                point: [request.point.x, request.point.y],
                color: [velocity_color.x, velocity_color.y, velocity_color.z, 0.0],
                radius: self.config.splat_radius,
                ..base
            },
        );
        self.write_params(
            &self.params.splat_density,
            KernelParams {
                point: [request.point.x, request.point.y],
                color: [dye_color.x, dye_color.y, dye_color.z, 0.0],
                radius: self.config.splat_radius,
                ..base
            },
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("splat"),
            });
        self.dispatch(
            &mut encoder,
            &self.pipelines[&KernelId::Splat],
            &self.groups.splat_velocity[self.velocity.front],
        );
        self.velocity.swap();
        self.dispatch(
            &mut encoder,
            &self.pipelines[&KernelId::Splat],
            &self.groups.splat_density[self.density.front],
        );
        self.density.swap();
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Read the dye field back to the host as RGBA f32 texels, row-major.
    pub async fn read_density(&self) -> Result<Vec<f32>, SimError> {
        let bytes_per_texel = match self.format {
            TextureFormat::Rgba32Float => 16u32,
            _ => 8u32,
        };
        let unpadded_bytes_per_row = self.width * bytes_per_texel;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(256) * 256;

        let read_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("density readback"),
            size: padded_bytes_per_row as u64 * self.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("density readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: self.density.front_texture(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &read_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = read_buffer.slice(..);
        let (sender, receiver) = oneshot::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .await
            .map_err(|_| SimError::Device("readback channel closed".into()))?
            .map_err(|e| SimError::Device(format!("buffer map failed: {e:?}")))?;

        let data = buffer_slice.get_mapped_range();
        let mut texels = Vec::with_capacity((self.width * self.height * 4) as usize);
        for row in 0..self.height {
            let start = (row * padded_bytes_per_row) as usize;
            let row_bytes = &data[start..start + unpadded_bytes_per_row as usize];
            match self.format {
                TextureFormat::Rgba32Float => {
                    texels.extend_from_slice(bytemuck::cast_slice::<u8, f32>(row_bytes));
                }
                _ => {
                    for bits in bytemuck::cast_slice::<u8, u16>(row_bytes) {
                        texels.push(half::f16::from_bits(*bits).to_f32());
                    }
                }
            }
        }
        Ok(texels)
    }

    fn write_params(&self, buffer: &Buffer, params: KernelParams) {
        self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(&[params]));
    }

    fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &ComputePipeline,
        bind_group: &BindGroup,
    ) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(
            self.width.div_ceil(WORKGROUP_SIZE),
            self.height.div_ceil(WORKGROUP_SIZE),
            1,
        );
    }
}

fn storage_texture_entry(
    binding: u32,
    access: wgpu::StorageTextureAccess,
    format: TextureFormat,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn compute_pipeline(
    device: &Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(layout),
        module,
        entry_point,
        compilation_options: wgpu::PipelineCompilationOptions::default(),
    })
}

fn create_field_texture(
    device: &Device,
    width: u32,
    height: u32,
    format: TextureFormat,
    label: &str,
) -> (Texture, TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_ping_pong(
    device: &Device,
    width: u32,
    height: u32,
    format: TextureFormat,
    label: &str,
) -> PingPongTex {
    let (tex_a, view_a) = create_field_texture(device, width, height, format, label);
    let (tex_b, view_b) = create_field_texture(device, width, height, format, label);
    PingPongTex {
        textures: [tex_a, tex_b],
        views: [view_a, view_b],
        front: 0,
    }
}

fn params_buffer(device: &Device, label: &str) -> Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&[KernelParams::base(1, 1)]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

#[allow(clippy::type_complexity)]
fn allocate_resources(
    device: &Device,
    layout: &BindGroupLayout,
    width: u32,
    height: u32,
    format: TextureFormat,
) -> (PingPongTex, PingPongTex, PingPongTex, StageParams, BindGroups) {
    let velocity = create_ping_pong(device, width, height, format, "velocity");
    let density = create_ping_pong(device, width, height, format, "density");
    let pressure = create_ping_pong(device, width, height, format, "pressure");
    let (_divergence_tex, divergence_view) =
        create_field_texture(device, width, height, format, "divergence");
    let (_curl_tex, curl_view) = create_field_texture(device, width, height, format, "curl");

    let params = StageParams {
        advect_velocity: params_buffer(device, "advect velocity params"),
        advect_density: params_buffer(device, "advect density params"),
        splat_velocity: params_buffer(device, "splat velocity params"),
        splat_density: params_buffer(device, "splat density params"),
        stencil: params_buffer(device, "stencil params"),
        vorticity: params_buffer(device, "vorticity params"),
    };

    let group = |params: &Buffer, a: &TextureView, b: &TextureView, out: &TextureView| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(a),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(b),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(out),
                },
            ],
        })
    };

    let vel = &velocity.views;
    let den = &density.views;
    let pres = &pressure.views;

    let groups = BindGroups {
        advect_velocity: [0, 1].map(|f| {
            group(&params.advect_velocity, &vel[f], &vel[f], &vel[1 - f])
        }),
        advect_density: [0, 1].map(|vf| {
            [0, 1].map(|df| group(&params.advect_density, &vel[vf], &den[df], &den[1 - df]))
        }),
        splat_velocity: [0, 1].map(|f| {
            group(&params.splat_velocity, &vel[f], &vel[f], &vel[1 - f])
        }),
        splat_density: [0, 1].map(|f| {
            group(&params.splat_density, &den[f], &den[f], &den[1 - f])
        }),
        divergence: [0, 1].map(|f| group(&params.stencil, &vel[f], &vel[f], &divergence_view)),
        clear_pressure: [0, 1].map(|f| {
            // The clear kernel only writes; divergence stands in as the
            // unused read bindings to keep one shared layout.
            group(&params.stencil, &divergence_view, &divergence_view, &pres[f])
        }),
        pressure: [0, 1].map(|f| group(&params.stencil, &pres[f], &divergence_view, &pres[1 - f])),
        gradient: [0, 1].map(|pf| {
            [0, 1].map(|vf| group(&params.stencil, &pres[pf], &vel[vf], &vel[1 - vf]))
        }),
        curl: [0, 1].map(|f| group(&params.stencil, &vel[f], &vel[f], &curl_view)),
        vorticity: [0, 1].map(|f| group(&params.vorticity, &vel[f], &curl_view, &vel[1 - f])),
    };

    (velocity, density, pressure, params, groups)
}

#[cfg(test)]
mod tests {
    #[test]
    fn half_float_readback_decode_covers_edge_values() {
        // Bit patterns the fallback readback path must decode: one, a
        // negative half, and the largest subnormal.
        assert_eq!(half::f16::from_bits(0x3c00).to_f32(), 1.0);
        assert_eq!(half::f16::from_bits(0xb800).to_f32(), -0.5);
        let largest_subnormal = half::f16::from_bits(0x03ff).to_f32();
        assert!((largest_subnormal - 6.097555e-5).abs() < 1e-9);
    }
}
