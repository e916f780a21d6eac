// ============================================================================
// GPU SHADERS — all WGSL code kept inline for containment
// ============================================================================
//
// Binding convention shared by every filter program:
//
//   group 0  binding 0  source texture      (fragment)
//            binding 1  source sampler      (fragment)
//   group 1  binding 0  DrawUniforms        (vertex: flip_y, target_origin_y)
//   group 2  binding 0  per-filter uniforms (fragment, optional)
//
// The program cache reflects the uniform block of group 2 and the vertex
// attributes straight from this text, so struct layouts here are the single
// source of truth.  Fields named `_pad*` only exist for alignment.
// ============================================================================

/// Texture + sampler declarations every fragment shader starts with.
macro_rules! fragment_header {
    () => {
        r#"
@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var src_samp: sampler;
"#
    };
}

/// RGB <-> HLS helpers (hue, lightness, saturation, all 0..1).
macro_rules! hls_helpers {
    () => {
        r#"
fn rgb2hls(rgb: vec3<f32>) -> vec3<f32> {
    let max_val = max(rgb.r, max(rgb.g, rgb.b));
    let min_val = min(rgb.r, min(rgb.g, rgb.b));
    let l = (max_val + min_val) / 2.0;
    var h = 0.0;
    var s = 0.0;

    if (max_val != min_val) {
        let d = max_val - min_val;
        if (l > 0.5) {
            s = d / (2.0 - max_val - min_val);
        } else {
            s = d / (max_val + min_val);
        }

        if (max_val == rgb.r) {
            h = (rgb.g - rgb.b) / d;
            if (rgb.g < rgb.b) {
                h = h + 6.0;
            }
        } else if (max_val == rgb.g) {
            h = (rgb.b - rgb.r) / d + 2.0;
        } else {
            h = (rgb.r - rgb.g) / d + 4.0;
        }
        h = h / 6.0;
    }

    return vec3<f32>(h, l, s);
}

fn hue2rgb(p: f32, q: f32, t_in: f32) -> f32 {
    var t = t_in;
    if (t < 0.0) { t = t + 1.0; }
    if (t > 1.0) { t = t - 1.0; }
    if (t < 1.0 / 6.0) { return p + (q - p) * 6.0 * t; }
    if (t < 1.0 / 2.0) { return q; }
    if (t < 2.0 / 3.0) { return p + (q - p) * (2.0 / 3.0 - t) * 6.0; }
    return p;
}

fn hls2rgb(hls: vec3<f32>) -> vec3<f32> {
    let h = hls.x;
    let l = hls.y;
    let s = hls.z;
    if (s == 0.0) {
        return vec3<f32>(l, l, l);
    }

    var q = 0.0;
    if (l < 0.5) {
        q = l * (1.0 + s);
    } else {
        q = l + s - l * s;
    }
    let p = 2.0 * l - q;
    return vec3<f32>(
        hue2rgb(p, q, h + 1.0 / 3.0),
        hue2rgb(p, q, h),
        hue2rgb(p, q, h - 1.0 / 3.0),
    );
}
"#
    };
}

// ============================================================================
// VERTEX SHADER — full-screen quad shared by every program
// ============================================================================
//
// The quad carries GL-style texture coordinates (v = 1 at the bottom edge).
// `target_origin_y = -1` writes offscreen targets bottom-up like a GL
// framebuffer; `flip_y = -1` on the final draw undoes an odd number of those
// inversions.
pub const VERTEX_IDENTITY_SHADER: &str = r#"
struct DrawUniforms {
    flip_y: f32,
    target_origin_y: f32,
    _pad: vec2<f32>,
};

@group(1) @binding(0) var<uniform> draw_u: DrawUniforms;

struct VertexInput {
    @location(0) pos: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) v_uv: vec2<f32>,
};

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.v_uv = input.uv;
    out.position = vec4<f32>(input.pos.x, input.pos.y * draw_u.flip_y * draw_u.target_origin_y, 0.0, 1.0);
    return out;
}
"#;

/// Two triangles, `[x, y, u, v]` per vertex.
pub const QUAD_VERTICES: [[f32; 4]; 6] = [
    [-1.0, -1.0, 0.0, 1.0],
    [ 1.0, -1.0, 1.0, 1.0],
    [-1.0,  1.0, 0.0, 0.0],
    [-1.0,  1.0, 0.0, 0.0],
    [ 1.0, -1.0, 1.0, 1.0],
    [ 1.0,  1.0, 1.0, 0.0],
];

// ============================================================================
// FIXED FRAGMENT SHADERS (no uniforms)
// ============================================================================

pub const FRAGMENT_IDENTITY_SHADER: &str = concat!(
    fragment_header!(),
    r#"
@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(src_tex, src_samp, v_uv);
}
"#
);

pub const INVERT_SHADER: &str = concat!(
    fragment_header!(),
    r#"
@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(src_tex, src_samp, v_uv);
    return vec4<f32>(1.0 - c.r, 1.0 - c.g, 1.0 - c.b, c.a);
}
"#
);

pub const BLACK_AND_WHITE_SHADER: &str = concat!(
    fragment_header!(),
    r#"
@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(src_tex, src_samp, v_uv);
    let lightness = (c.r + c.g + c.b) / 3.0;
    return vec4<f32>(lightness, lightness, lightness, c.a);
}
"#
);

// ============================================================================
// COLOR MATRIX — 4x5 affine matrix, 20 floats packed into 5 vec4s
// ============================================================================

pub const COLOR_MATRIX_WITHOUT_ALPHA_SHADER: &str = concat!(
    fragment_header!(),
    r#"
struct ColorMatrixParams {
    m: array<vec4<f32>, 5>,
};

@group(2) @binding(0) var<uniform> params: ColorMatrixParams;

fn m(i: u32) -> f32 {
    return params.m[i / 4u][i % 4u];
}

@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(src_tex, src_samp, v_uv);
    return vec4<f32>(
        m(0u) * c.r + m(1u) * c.g + m(2u) * c.b + m(4u),
        m(5u) * c.r + m(6u) * c.g + m(7u) * c.b + m(9u),
        m(10u) * c.r + m(11u) * c.g + m(12u) * c.b + m(14u),
        c.a,
    );
}
"#
);

pub const COLOR_MATRIX_WITH_ALPHA_SHADER: &str = concat!(
    fragment_header!(),
    r#"
struct ColorMatrixParams {
    m: array<vec4<f32>, 5>,
};

@group(2) @binding(0) var<uniform> params: ColorMatrixParams;

fn m(i: u32) -> f32 {
    return params.m[i / 4u][i % 4u];
}

@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(src_tex, src_samp, v_uv);
    return vec4<f32>(
        m(0u) * c.r + m(1u) * c.g + m(2u) * c.b + m(3u) * c.a + m(4u),
        m(5u) * c.r + m(6u) * c.g + m(7u) * c.b + m(8u) * c.a + m(9u),
        m(10u) * c.r + m(11u) * c.g + m(12u) * c.b + m(13u) * c.a + m(14u),
        m(15u) * c.r + m(16u) * c.g + m(17u) * c.b + m(18u) * c.a + m(19u),
    );
}
"#
);

// ============================================================================
// 3x3 CONVOLUTION
// ============================================================================

pub const CONVOLUTION_SHADER: &str = concat!(
    fragment_header!(),
    r#"
struct ConvolutionParams {
    px: vec2<f32>,
    _pad: vec2<f32>,
    m: array<vec4<f32>, 3>,
};

@group(2) @binding(0) var<uniform> params: ConvolutionParams;

fn k(i: u32) -> f32 {
    return params.m[i / 4u][i % 4u];
}

@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let px = params.px;
    let c11 = textureSample(src_tex, src_samp, v_uv - px);
    let c12 = textureSample(src_tex, src_samp, vec2<f32>(v_uv.x, v_uv.y - px.y));
    let c13 = textureSample(src_tex, src_samp, vec2<f32>(v_uv.x + px.x, v_uv.y - px.y));

    let c21 = textureSample(src_tex, src_samp, vec2<f32>(v_uv.x - px.x, v_uv.y));
    let c22 = textureSample(src_tex, src_samp, v_uv);
    let c23 = textureSample(src_tex, src_samp, vec2<f32>(v_uv.x + px.x, v_uv.y));

    let c31 = textureSample(src_tex, src_samp, vec2<f32>(v_uv.x - px.x, v_uv.y + px.y));
    let c32 = textureSample(src_tex, src_samp, vec2<f32>(v_uv.x, v_uv.y + px.y));
    let c33 = textureSample(src_tex, src_samp, v_uv + px);

    let sum =
        c11 * k(0u) + c12 * k(1u) + c13 * k(2u) +
        c21 * k(3u) + c22 * k(4u) + c23 * k(5u) +
        c31 * k(6u) + c32 * k(7u) + c33 * k(8u);
    return vec4<f32>(sum.rgb, c22.a);
}
"#
);

// ============================================================================
// HUE-BAND STRIP — gray out pixels whose fast hue estimate falls in a band
// ============================================================================
//
// Hue is estimated from the dominant channel without a full HSL conversion:
// red-dominant lands in [-1, 1], green in [1, 3], blue in [3, 5].
pub const STRIP_HUE_RANGE_SHADER: &str = concat!(
    fragment_header!(),
    r#"
struct HueStripParams {
    hue_range: vec2<f32>,
    lightness_for_deleted: f32,
    _pad: f32,
};

@group(2) @binding(0) var<uniform> params: HueStripParams;

@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let c = textureSample(src_tex, src_samp, v_uv);

    // Achromatic pixels have no hue and are never stripped.
    if (max(c.r, max(c.g, c.b)) == min(c.r, min(c.g, c.b))) {
        return c;
    }

    var hue = 0.0;
    if (c.r >= c.g && c.r >= c.b) {
        hue = (c.g - c.b) / (c.r - min(c.g, c.b));
    } else if (c.g >= c.r && c.g >= c.b) {
        hue = 2.0 + (c.b - c.r) / (c.g - min(c.r, c.b));
    } else {
        hue = 4.0 + (c.r - c.g) / (c.b - min(c.r, c.g));
    }

    if (hue >= params.hue_range.x && hue <= params.hue_range.y) {
        let l = params.lightness_for_deleted;
        return vec4<f32>(l, l, l, c.a);
    }
    return c;
}
"#
);

// ============================================================================
// LIGHTNESS REMAP ("variance") — rescale HLS lightness into a window
// ============================================================================

pub const LIGHTNESS_REMAP_SHADER: &str = concat!(
    fragment_header!(),
    hls_helpers!(),
    r#"
struct LightnessRemapParams {
    lightness_range: vec2<f32>,
    _pad: vec2<f32>,
};

@group(2) @binding(0) var<uniform> params: LightnessRemapParams;

@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(src_tex, src_samp, v_uv);
    let lo = params.lightness_range.x;
    let hi = params.lightness_range.y;

    let hls = rgb2hls(color.rgb);
    var lightness = hls.y;
    if (lightness < lo) {
        lightness = 0.0;
    } else if (lightness > hi) {
        lightness = 1.0;
    } else {
        lightness = (lightness - lo) / max(hi - lo, 1e-6);
    }

    let rgb = hls2rgb(vec3<f32>(hls.x, lightness, hls.z));
    return vec4<f32>(rgb, color.a);
}
"#
);

// ============================================================================
// HIGH PENETRATION — gamma on HLS lightness
// ============================================================================

pub const HIGH_PENETRATION_SHADER: &str = concat!(
    fragment_header!(),
    hls_helpers!(),
    r#"
struct HighPenetrationParams {
    gamma_high: f32,
    _pad0: f32,
    _pad1: vec2<f32>,
};

@group(2) @binding(0) var<uniform> params: HighPenetrationParams;

@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let color = textureSample(src_tex, src_samp, v_uv);
    let hls = rgb2hls(color.rgb);
    let lightness = pow(hls.y, params.gamma_high);
    let rgb = hls2rgb(vec3<f32>(hls.x, lightness, hls.z));
    return vec4<f32>(rgb, color.a);
}
"#
);

// ============================================================================
// SEN — approximate tile-local contrast equalization (CLAHE-like)
// ============================================================================
//
// Tiles are `1 / kernel_size` wide in texture space.  The 3x3 tile-corner
// samples around the tile origin give a local average; the clip limit scales
// with that average's mean.  Output keeps hue and saturation and replaces the
// lightness with the equalized red channel.  Alpha is forced to 1.
pub const SEN_EQUALIZE_SHADER: &str = concat!(
    fragment_header!(),
    hls_helpers!(),
    r#"
struct SenParams {
    resolution: vec2<f32>,
    clip_limit: f32,
    kernel_size: f32,
};

@group(2) @binding(0) var<uniform> params: SenParams;

fn apply_clahe(tex_coord: vec2<f32>, clip: f32, kernel_size: f32) -> f32 {
    let tile_size = vec2<f32>(1.0 / kernel_size);
    let tile_coord = floor(tex_coord / tile_size);

    var sum = vec4<f32>(0.0);
    for (var x = -1.0; x <= 1.0; x = x + 1.0) {
        for (var y = -1.0; y <= 1.0; y = y + 1.0) {
            let offset = tile_size * vec2<f32>(x, y);
            sum = sum + textureSampleLevel(src_tex, src_samp, tile_coord * tile_size + offset, 0.0);
        }
    }
    let average = sum / 9.0;

    let limit = clip * dot(average.rgb, vec3<f32>(1.0 / 3.0));

    let tile_color = textureSampleLevel(src_tex, src_samp, tex_coord, 0.0);
    let clipped = max(tile_color - average + limit, vec4<f32>(0.0));
    let equalized = min(clipped * (1.0 / (1.0 + limit)), vec4<f32>(1.0));
    return equalized.x;
}

@fragment
fn fs_main(@location(0) v_uv: vec2<f32>) -> @location(0) vec4<f32> {
    let tex_coord = (floor(v_uv * params.resolution) + 0.5) / params.resolution;
    let hls = rgb2hls(textureSampleLevel(src_tex, src_samp, tex_coord, 0.0).rgb);
    let equalized = apply_clahe(tex_coord, params.clip_limit, params.kernel_size);
    return vec4<f32>(hls2rgb(vec3<f32>(hls.x, equalized, hls.z)), 1.0);
}
"#
);

/// Every fragment program in the catalog, with a label for diagnostics.
pub const FRAGMENT_CATALOG: [(&str, &str); 10] = [
    ("identity", FRAGMENT_IDENTITY_SHADER),
    ("invert", INVERT_SHADER),
    ("black_and_white", BLACK_AND_WHITE_SHADER),
    ("color_matrix", COLOR_MATRIX_WITHOUT_ALPHA_SHADER),
    ("color_matrix_alpha", COLOR_MATRIX_WITH_ALPHA_SHADER),
    ("convolution", CONVOLUTION_SHADER),
    ("strip_hue_range", STRIP_HUE_RANGE_SHADER),
    ("lightness_remap", LIGHTNESS_REMAP_SHADER),
    ("high_penetration", HIGH_PENETRATION_SHADER),
    ("sen_equalize", SEN_EQUALIZE_SHADER),
];

/// Diagnostic label for a fragment source, `"custom"` when not in the catalog.
pub fn label_for(source: &str) -> &'static str {
    FRAGMENT_CATALOG
        .iter()
        .find(|(_, s)| *s == source)
        .map(|(label, _)| *label)
        .unwrap_or("custom")
}
