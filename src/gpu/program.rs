// ============================================================================
// PROGRAM CACHE — fragment source text -> compiled render pipeline
// ============================================================================
//
// Every program pairs the shared full-screen-quad vertex shader with one
// fragment shader.  The exact fragment text is the cache key, so kinds that
// share a shader body (the two hue-strip presets, the color-matrix family)
// share one pipeline.  Entries are never evicted.
//
// Attribute locations and the layout of the filter uniform block are found by
// scanning the WGSL itself; see `reflect_attributes` / `reflect_uniform_block`.
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{FilterError, FilterResult};
use crate::filters::kernels::UniformValue;

use super::shaders;

/// Bind group index of the per-filter uniform block.
pub const FILTER_UNIFORM_GROUP: u32 = 2;

pub const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

// ============================================================================
// REFLECTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    F32,
    Vec2,
    Vec4,
    Vec4Array(u32),
}

impl UniformType {
    fn parse(ty: &str) -> Option<Self> {
        let ty: String = ty.chars().filter(|c| !c.is_whitespace()).collect();
        match ty.as_str() {
            "f32" => Some(UniformType::F32),
            "vec2<f32>" => Some(UniformType::Vec2),
            "vec4<f32>" => Some(UniformType::Vec4),
            _ => {
                let len = ty.strip_prefix("array<vec4<f32>,")?.strip_suffix('>')?;
                len.parse().ok().map(UniformType::Vec4Array)
            }
        }
    }

    /// Byte size under WGSL uniform-buffer layout rules.
    pub fn size(self) -> u32 {
        match self {
            UniformType::F32 => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec4 => 16,
            UniformType::Vec4Array(n) => 16 * n,
        }
    }

    pub fn align(self) -> u32 {
        match self {
            UniformType::F32 => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec4 | UniformType::Vec4Array(_) => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    pub offset: u32,
    pub ty: UniformType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniformBlock {
    pub type_name: String,
    pub fields: HashMap<String, UniformField>,
    /// Total size, rounded up to 16 bytes.
    pub size: u32,
}

impl UniformBlock {
    pub fn field(&self, name: &str) -> Option<UniformField> {
        self.fields.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    pub location: u32,
}

fn align_to(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Body of `struct <name> { ... }` in `source`, without the braces.
fn struct_body<'a>(source: &'a str, name: &str) -> Option<&'a str> {
    let header = format!("struct {}", name);
    let start = source.find(&header)? + header.len();
    let rest = &source[start..];
    let open = rest.find('{')?;
    let close = rest.find('}')?;
    (open < close).then(|| &rest[open + 1..close])
}

/// `(name, type)` for each field line of a struct body.
fn struct_fields(body: &str) -> impl Iterator<Item = (&str, &str)> {
    body.lines().filter_map(|line| {
        let line = line.trim().trim_end_matches(',');
        let (name, ty) = line.split_once(':')?;
        Some((name.trim(), ty.trim()))
    })
}

/// Vertex attributes declared in the `VertexInput` struct.
pub fn reflect_attributes(vertex_source: &str) -> Vec<AttributeInfo> {
    let Some(body) = struct_body(vertex_source, "VertexInput") else {
        return Vec::new();
    };
    let mut attrs: Vec<AttributeInfo> = struct_fields(body)
        .filter_map(|(decl, _)| {
            let loc = decl.strip_prefix("@location(")?;
            let (loc, name) = loc.split_once(')')?;
            Some(AttributeInfo { name: name.trim().to_string(), location: loc.trim().parse().ok()? })
        })
        .collect();
    attrs.sort_by_key(|a| a.location);
    attrs
}

/// Layout of the struct bound as `var<uniform>` at `@group(group) @binding(0)`,
/// or `None` when the shader declares no such block.
pub fn reflect_uniform_block(source: &str, group: u32) -> FilterResult<Option<UniformBlock>> {
    let marker = format!("@group({}) @binding(0) var<uniform>", group);
    let Some(pos) = source.find(&marker) else {
        return Ok(None);
    };
    let decl = &source[pos + marker.len()..];
    let decl = &decl[..decl.find(';').unwrap_or(decl.len())];
    let type_name = decl
        .split_once(':')
        .map(|(_, ty)| ty.trim().to_string())
        .ok_or_else(|| reflect_error(source, format!("malformed uniform declaration '{}'", decl.trim())))?;

    let body = struct_body(source, &type_name)
        .ok_or_else(|| reflect_error(source, format!("uniform struct '{}' not found", type_name)))?;

    let mut fields = HashMap::new();
    let mut offset = 0;
    for (name, ty) in struct_fields(body) {
        let ty = UniformType::parse(ty)
            .ok_or_else(|| reflect_error(source, format!("unsupported uniform type '{}' for '{}'", ty, name)))?;
        offset = align_to(offset, ty.align());
        fields.insert(name.to_string(), UniformField { offset, ty });
        offset += ty.size();
    }

    Ok(Some(UniformBlock { type_name, fields, size: align_to(offset.max(16), 16) }))
}

fn reflect_error(source: &str, diagnostic: String) -> FilterError {
    FilterError::ProgramLinkFailed { label: shaders::label_for(source).to_string(), diagnostic }
}

// ============================================================================
// SHADER PROGRAM
// ============================================================================

pub struct ShaderProgram {
    pub label: &'static str,
    pub pipeline: wgpu::RenderPipeline,
    /// Layout of group 2, present only when the fragment shader has a block.
    pub params_layout: Option<wgpu::BindGroupLayout>,
    pub uniforms: Option<UniformBlock>,
    pub attributes: Vec<AttributeInfo>,
}

impl ShaderProgram {
    /// Offset and type of a uniform, `None` when the program does not declare it.
    pub fn uniform_location(&self, name: &str) -> Option<UniformField> {
        self.uniforms.as_ref()?.field(name)
    }

    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        self.attributes.iter().find(|a| a.name == name).map(|a| a.location)
    }

    /// Serialize `bindings` into the program's uniform block.  Names the block
    /// does not declare are skipped.  Returns `None` for programs without a block.
    pub fn pack_uniforms(&self, bindings: &[(&'static str, UniformValue)]) -> Option<Vec<u8>> {
        let block = self.uniforms.as_ref()?;
        Some(pack_block(self.label, block, bindings))
    }
}

fn pack_block(label: &str, block: &UniformBlock, bindings: &[(&'static str, UniformValue)]) -> Vec<u8> {
    let mut bytes = vec![0u8; block.size as usize];
    for (name, value) in bindings {
        let Some(field) = block.field(name) else {
            crate::log_warn!("program '{}' has no uniform '{}', value dropped", label, name);
            continue;
        };
        let floats: &[f32] = match value {
            UniformValue::Float(v) => std::slice::from_ref(v),
            UniformValue::Vec2(v) => v,
            UniformValue::Floats(v) => v,
        };
        let raw: &[u8] = bytemuck::cast_slice(floats);
        let start = field.offset as usize;
        let len = raw.len().min(field.ty.size() as usize);
        bytes[start..start + len].copy_from_slice(&raw[..len]);
    }
    bytes
}

// ============================================================================
// CACHE
// ============================================================================

pub struct ProgramCache {
    device: Arc<wgpu::Device>,
    /// Group 0: source texture + sampler.
    pub texture_layout: wgpu::BindGroupLayout,
    /// Group 1: per-draw orientation uniforms.
    pub draw_layout: wgpu::BindGroupLayout,
    programs: HashMap<String, Arc<ShaderProgram>>,
}

impl ProgramCache {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("filter_source_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let draw_layout = uniform_layout(&device, "filter_draw_bgl", wgpu::ShaderStages::VERTEX);

        Self { device, texture_layout, draw_layout, programs: HashMap::new() }
    }

    /// Number of distinct programs compiled so far.
    pub fn compiled_count(&self) -> usize {
        self.programs.len()
    }

    pub fn contains(&self, fragment_source: &str) -> bool {
        self.programs.contains_key(fragment_source)
    }

    /// Cached program for `fragment_source`, compiling and linking it on first
    /// use.  Failures are returned and not cached.
    pub fn compile(&mut self, fragment_source: &str) -> FilterResult<Arc<ShaderProgram>> {
        if let Some(program) = self.programs.get(fragment_source) {
            return Ok(Arc::clone(program));
        }

        let program = Arc::new(self.build(fragment_source)?);
        crate::log_info!("compiled program '{}' ({} cached)", program.label, self.programs.len() + 1);
        self.programs.insert(fragment_source.to_string(), Arc::clone(&program));
        Ok(program)
    }

    fn build(&self, fragment_source: &str) -> FilterResult<ShaderProgram> {
        let label = shaders::label_for(fragment_source);
        let device = &self.device;

        // ---- Compile ----
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("filter_vertex"),
            source: wgpu::ShaderSource::Wgsl(shaders::VERTEX_IDENTITY_SHADER.into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FilterError::ShaderCompileFailed {
                label: label.to_string(),
                diagnostic: err.to_string(),
            });
        }

        // ---- Reflect ----
        let attributes = reflect_attributes(shaders::VERTEX_IDENTITY_SHADER);
        let uniforms = reflect_uniform_block(fragment_source, FILTER_UNIFORM_GROUP)?;
        let params_layout = uniforms
            .as_ref()
            .map(|_| uniform_layout(device, "filter_params_bgl", wgpu::ShaderStages::FRAGMENT));

        let vertex_attributes: Vec<wgpu::VertexAttribute> = attributes
            .iter()
            .enumerate()
            .map(|(i, a)| wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: (i * 8) as u64,
                shader_location: a.location,
            })
            .collect();

        // ---- Link ----
        let mut group_layouts = vec![&self.texture_layout, &self.draw_layout];
        if let Some(layout) = params_layout.as_ref() {
            group_layouts.push(layout);
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("filter_pipeline_layout"),
            bind_group_layouts: &group_layouts,
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 4]>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &vertex_attributes,
                }],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None, // passes overwrite, never blend
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(FilterError::ProgramLinkFailed {
                label: label.to_string(),
                diagnostic: err.to_string(),
            });
        }

        Ok(ShaderProgram { label, pipeline, params_layout, uniforms, attributes })
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_attributes_in_location_order() {
        let attrs = reflect_attributes(shaders::VERTEX_IDENTITY_SHADER);
        assert_eq!(
            attrs,
            vec![
                AttributeInfo { name: "pos".into(), location: 0 },
                AttributeInfo { name: "uv".into(), location: 1 },
            ]
        );
    }

    #[test]
    fn fixed_shaders_have_no_block() {
        for src in [shaders::FRAGMENT_IDENTITY_SHADER, shaders::INVERT_SHADER, shaders::BLACK_AND_WHITE_SHADER] {
            assert_eq!(reflect_uniform_block(src, FILTER_UNIFORM_GROUP).unwrap(), None);
        }
    }

    #[test]
    fn convolution_block_layout() {
        let block = reflect_uniform_block(shaders::CONVOLUTION_SHADER, FILTER_UNIFORM_GROUP)
            .unwrap()
            .unwrap();
        assert_eq!(block.type_name, "ConvolutionParams");
        assert_eq!(block.fields["px"], UniformField { offset: 0, ty: UniformType::Vec2 });
        assert_eq!(block.fields["m"], UniformField { offset: 16, ty: UniformType::Vec4Array(3) });
        assert_eq!(block.size, 64);
    }

    #[test]
    fn hue_strip_block_packs_scalar_after_vec2() {
        let block = reflect_uniform_block(shaders::STRIP_HUE_RANGE_SHADER, FILTER_UNIFORM_GROUP)
            .unwrap()
            .unwrap();
        assert_eq!(block.fields["lightness_for_deleted"].offset, 8);
        assert_eq!(block.size, 16);
    }

    #[test]
    fn every_catalog_shader_reflects() {
        for (label, src) in shaders::FRAGMENT_CATALOG {
            assert!(reflect_uniform_block(src, FILTER_UNIFORM_GROUP).is_ok(), "{}", label);
        }
    }

    #[test]
    fn unsupported_field_type_is_a_link_error() {
        let src = "struct P { n: i32, };\n@group(2) @binding(0) var<uniform> params: P;";
        assert!(matches!(
            reflect_uniform_block(src, FILTER_UNIFORM_GROUP),
            Err(FilterError::ProgramLinkFailed { .. })
        ));
    }

    #[test]
    fn packing_writes_at_offsets_and_skips_unknown_names() {
        let block = reflect_uniform_block(shaders::COLOR_MATRIX_WITH_ALPHA_SHADER, FILTER_UNIFORM_GROUP)
            .unwrap()
            .unwrap();
        let m: Vec<f32> = (0..20).map(|i| i as f32).collect();
        let bytes = pack_block(
            "color_matrix_alpha",
            &block,
            &[("m", UniformValue::Floats(m.clone())), ("bogus", UniformValue::Float(9.0))],
        );
        assert_eq!(bytes.len(), 80);
        let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(floats, m);
    }
}
