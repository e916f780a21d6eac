// ============================================================================
// FILTER CHAIN ENGINE — upload, one draw per filter, submit
// ============================================================================
//
// Passes ping-pong between the two render targets of the pool; the last pass
// of every chain (or the single identity pass of an empty chain) lands on the
// output surface.
//
// Orientation follows the GL framebuffer convention: every offscreen pass
// is written bottom-up (`target_origin_y = -1`), so each handoff between
// targets inverts the image in memory.  The final draw counts the handoffs
// and applies `flip_y = -1` when their number is odd.
// ============================================================================

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use image::RgbaImage;
use serde::Serialize;
use wgpu::util::DeviceExt;

use super::context::{EngineConfig, GpuContext};
use super::pool::RenderTargetPool;
use super::program::{ProgramCache, ShaderProgram};
use super::shaders;
use super::texture::{OutputSurface, RenderTarget, SourceTexture};
use crate::error::{FilterError, FilterResult};
use crate::filters::kernels::{self, KernelOutput, UniformBindings};
use crate::filters::{FilterArg, FilterInvocation, FilterKind};

// ============================================================================
// DRAW SCHEDULE (pure)
// ============================================================================

/// A surface a draw reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceRef {
    Source,
    Target(usize),
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawStep {
    pub source: SurfaceRef,
    pub target: SurfaceRef,
    pub flip_y: f32,
}

impl DrawStep {
    /// Offscreen targets are written bottom-up, the output surface top-down.
    pub fn target_origin_y(&self) -> f32 {
        match self.target {
            SurfaceRef::Output => 1.0,
            _ => -1.0,
        }
    }

    /// True when this draw leaves its target upside down relative to its
    /// source in memory.
    pub fn inverts(&self) -> bool {
        self.flip_y * self.target_origin_y() < 0.0
    }
}

/// Per-`apply()` sequencing state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub draw_count: u32,
    pub active_target: Option<usize>,
    pub last_in_chain: bool,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the next draw reads and writes.  Call once per pass, in order.
    pub fn next_draw(&mut self, last_in_chain: bool) -> DrawStep {
        let source = match self.active_target {
            None => SurfaceRef::Source,
            Some(i) => SurfaceRef::Target(i),
        };

        self.draw_count += 1;
        self.last_in_chain = last_in_chain;

        if last_in_chain {
            let flip_y = if self.draw_count % 2 == 0 { -1.0 } else { 1.0 };
            return DrawStep { source, target: SurfaceRef::Output, flip_y };
        }

        let next = self.active_target.map_or(0, |i| (i + 1) % 2);
        self.active_target = Some(next);
        DrawStep { source, target: SurfaceRef::Target(next), flip_y: 1.0 }
    }
}

/// The full schedule for a chain of `passes` draws (an empty chain still draws once).
pub fn schedule(passes: usize) -> Vec<DrawStep> {
    let passes = passes.max(1);
    let mut state = EngineState::new();
    (0..passes).map(|i| state.next_draw(i + 1 == passes)).collect()
}

// ============================================================================
// ENGINE
// ============================================================================

/// Vertex-stage uniforms of every draw (group 1).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DrawUniforms {
    flip_y: f32,
    target_origin_y: f32,
    _pad: [f32; 2],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub target_allocations: u64,
    pub programs_compiled: usize,
    pub full_uploads: u64,
    pub sub_uploads: u64,
    pub draws: u64,
}

/// A pass of the last `apply()` that was rendered as a pass-through.
#[derive(Debug, Clone)]
pub struct PassDiagnostic {
    pub index: usize,
    pub kind: FilterKind,
    pub error: FilterError,
}

struct Pass {
    program: Arc<ShaderProgram>,
    uniforms: UniformBindings,
}

struct Frame {
    source: SourceTexture,
    output: OutputSurface,
}

pub struct FilterChainEngine {
    ctx: GpuContext,
    programs: ProgramCache,
    targets: RenderTargetPool,
    frame: Option<Frame>,
    sampler: wgpu::Sampler,
    quad: wgpu::Buffer,
    queued: Vec<FilterInvocation>,
    stats: EngineStats,
    diagnostics: Vec<PassDiagnostic>,
}

impl FilterChainEngine {
    /// Acquire a GPU context.  Fails with `ContextUnavailable` when none exists.
    pub fn new(config: &EngineConfig) -> FilterResult<Self> {
        Ok(Self::with_context(GpuContext::new(config)?))
    }

    pub fn with_context(ctx: GpuContext) -> Self {
        let programs = ProgramCache::new(Arc::clone(&ctx.device));

        // Nearest sampling keeps every pass texel-exact.
        let sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("filter_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let quad = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("filter_quad"),
            contents: bytemuck::cast_slice(&shaders::QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            ctx,
            programs,
            targets: RenderTargetPool::new(),
            frame: None,
            sampler,
            quad,
            queued: Vec::new(),
            stats: EngineStats::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.ctx.adapter_name
    }

    pub fn programs(&mut self) -> &mut ProgramCache {
        &mut self.programs
    }

    // ---- Queue --------------------------------------------------------------

    /// Drop all queued invocations.  No GPU side effects.
    pub fn reset(&mut self) {
        self.queued.clear();
    }

    pub fn add_filter(&mut self, invocation: FilterInvocation) {
        self.queued.push(invocation);
    }

    /// Queue by external name.  Unknown names queue a pass-through stage.
    pub fn add_filter_named(&mut self, name: &str, args: Vec<FilterArg>) {
        let invocation = FilterInvocation::named(name, args).unwrap_or_else(|e| {
            crate::log_warn!("{}, stage treated as identity", e);
            FilterInvocation::passthrough()
        });
        self.queued.push(invocation);
    }

    pub fn queued(&self) -> &[FilterInvocation] {
        &self.queued
    }

    pub fn apply_queued(&mut self, image: &RgbaImage) -> FilterResult<&OutputSurface> {
        let chain = self.queued.clone();
        self.apply(image, &chain)
    }

    // ---- Render -------------------------------------------------------------

    /// Render `chain` over `image`.  The returned surface stays valid until the
    /// next `apply()`.
    pub fn apply(&mut self, image: &RgbaImage, chain: &[FilterInvocation]) -> FilterResult<&OutputSurface> {
        self.apply_with(image, chain, default_kernel)
    }

    /// `apply()` with a caller-chosen kernel per invocation, for front ends that
    /// ship their own fragment shaders.
    pub fn apply_with<F>(&mut self, image: &RgbaImage, chain: &[FilterInvocation], kernel: F) -> FilterResult<&OutputSurface>
    where
        F: Fn(&FilterInvocation, u32, u32) -> KernelOutput,
    {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 || !self.ctx.supports_size(width, height) {
            return Err(FilterError::InvalidDimensions { width, height });
        }

        let passes = self.resolve_passes(chain, width, height, kernel)?;

        // ---- Surfaces + upload ----
        let frame = match self.frame.take() {
            Some(frame) if frame.output.dimensions() == (width, height) => {
                frame.source.update(&self.ctx.queue, image);
                self.stats.sub_uploads += 1;
                frame
            }
            _ => {
                crate::log_info!("allocating {}x{} source/output surfaces", width, height);
                self.stats.full_uploads += 1;
                Frame {
                    source: SourceTexture::new(&self.ctx.device, &self.ctx.queue, image),
                    output: OutputSurface::new(
                        Arc::clone(&self.ctx.device),
                        Arc::clone(&self.ctx.queue),
                        width,
                        height,
                    ),
                }
            }
        };
        let frame = self.frame.insert(frame);
        let targets = self.targets.ensure_size(&self.ctx.device, width, height);

        // ---- Draws ----
        let recorder = DrawRecorder {
            device: &self.ctx.device,
            programs: &self.programs,
            sampler: &self.sampler,
            quad: &self.quad,
            source: &frame.source,
            output: &frame.output,
            targets,
        };

        let mut encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("filter_chain_encoder"),
        });
        let mut state = EngineState::new();
        let last = passes.len() - 1;
        for (i, pass) in passes.iter().enumerate() {
            let step = state.next_draw(i == last);
            recorder.draw(&mut encoder, &pass.program, &pass.uniforms, step);
        }
        self.ctx.submit_one(encoder);
        self.stats.draws += passes.len() as u64;

        Ok(&frame.output)
    }

    /// Kernel + program for every pass.  A recoverable program failure turns
    /// that pass into the identity and is recorded in `diagnostics()`.
    fn resolve_passes<F>(&mut self, chain: &[FilterInvocation], width: u32, height: u32, kernel: F) -> FilterResult<Vec<Pass>>
    where
        F: Fn(&FilterInvocation, u32, u32) -> KernelOutput,
    {
        self.diagnostics.clear();

        if chain.is_empty() {
            let program = self.programs.compile(shaders::FRAGMENT_IDENTITY_SHADER)?;
            return Ok(vec![Pass { program, uniforms: Vec::new() }]);
        }

        let mut passes = Vec::with_capacity(chain.len());
        for (index, invocation) in chain.iter().enumerate() {
            let output = kernel(invocation, width, height);
            let pass = match self.programs.compile(output.shader) {
                Ok(program) => Pass { program, uniforms: output.uniforms },
                Err(error) if error.is_recoverable() => {
                    crate::log_err!("pass {} ({}): {}", index, invocation.kind, error);
                    self.diagnostics.push(PassDiagnostic { index, kind: invocation.kind, error });
                    let program = self.programs.compile(shaders::FRAGMENT_IDENTITY_SHADER)?;
                    Pass { program, uniforms: Vec::new() }
                }
                Err(error) => return Err(error),
            };
            passes.push(pass);
        }
        Ok(passes)
    }

    /// The output of the last `apply()`, read back to the CPU.
    pub fn read_output(&self) -> FilterResult<RgbaImage> {
        match &self.frame {
            Some(frame) => frame.output.read_pixels(),
            None => Err(FilterError::Readback("nothing has been rendered yet".to_string())),
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            target_allocations: self.targets.allocation_count(),
            programs_compiled: self.programs.compiled_count(),
            ..self.stats
        }
    }

    pub fn diagnostics(&self) -> &[PassDiagnostic] {
        &self.diagnostics
    }
}

/// The built-in kernel of an invocation.
pub fn default_kernel(invocation: &FilterInvocation, width: u32, height: u32) -> KernelOutput {
    kernels::build(&kernels::resolve(invocation), width, height)
}

// ============================================================================
// DRAW PRIMITIVE
// ============================================================================

/// Everything a single draw needs, borrowed from the engine for one `apply()`.
struct DrawRecorder<'a> {
    device: &'a wgpu::Device,
    programs: &'a ProgramCache,
    sampler: &'a wgpu::Sampler,
    quad: &'a wgpu::Buffer,
    source: &'a SourceTexture,
    output: &'a OutputSurface,
    targets: &'a [RenderTarget; 2],
}

impl DrawRecorder<'_> {
    fn view(&self, surface: SurfaceRef) -> &wgpu::TextureView {
        match surface {
            SurfaceRef::Source => &self.source.view,
            SurfaceRef::Target(i) => &self.targets[i % 2].view,
            SurfaceRef::Output => &self.output.view,
        }
    }

    fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        program: &ShaderProgram,
        uniforms: &[(&'static str, kernels::UniformValue)],
        step: DrawStep,
    ) {
        let source_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter_source_bg"),
            layout: &self.programs.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(self.view(step.source)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(self.sampler),
                },
            ],
        });

        let draw_uniforms = DrawUniforms {
            flip_y: step.flip_y,
            target_origin_y: step.target_origin_y(),
            _pad: [0.0; 2],
        };
        let draw_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("filter_draw_uniforms"),
            contents: bytemuck::bytes_of(&draw_uniforms),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let draw_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter_draw_bg"),
            layout: &self.programs.draw_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: draw_buf.as_entire_binding() }],
        });

        let params_bg = match (program.params_layout.as_ref(), program.pack_uniforms(uniforms)) {
            (Some(layout), Some(bytes)) => {
                let buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("filter_params"),
                    contents: &bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                });
                Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("filter_params_bg"),
                    layout,
                    entries: &[wgpu::BindGroupEntry { binding: 0, resource: buf.as_entire_binding() }],
                }))
            }
            _ => None,
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.view(step.target),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, &source_bg, &[]);
        pass.set_bind_group(1, &draw_bg, &[]);
        if let Some(bg) = params_bg.as_ref() {
            pass.set_bind_group(2, bg, &[]);
        }
        pass.set_vertex_buffer(0, self.quad.slice(..));
        pass.draw(0..6, 0..1);
    }
}
