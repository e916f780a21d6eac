// ============================================================================
// FILTER KERNELS — (params, image size) -> (fragment shader, uniform values)
// ============================================================================
//
// Kernels are pure: they never touch GPU state.  The engine hands their
// output to the program cache and the draw primitive; the CPU reference
// renderer reads the same `KernelParams` so both paths agree on every
// constant.
// ============================================================================

use super::{FilterArg, FilterInvocation, FilterKind, HueBand};
use crate::gpu::shaders;

pub const SHARPEN_FILTER_AMOUNT: f32 = 10.0;
pub const EMBOSS_FILTER_AMOUNT: f32 = 4.0;

pub const OS_FILTER_RANGE: [f32; 2] = [0.0, 2.0];
pub const OS_FILTER_LIGHTNESS: f32 = 1.0;
pub const O2_FILTER_RANGE: [f32; 2] = [2.0, 256.0];
pub const O2_FILTER_LIGHTNESS: f32 = 1.0;

/// Lightness windows of the nine "variance" bars, in 1/256 units.  The first
/// entry is reproduced verbatim even though its window is inverted.
pub const VARIANCE_BANDS: [[u32; 2]; 9] = [
    [64, 0],
    [24, 88],
    [48, 112],
    [72, 136],
    [96, 160],
    [120, 184],
    [144, 208],
    [168, 232],
    [192, 256],
];
pub const DEFAULT_VARIANCE_BAND: usize = 4;

pub const SEN_CLIP_LIMIT: f32 = 2.0;
pub const SEN_KERNEL_SIZE: f32 = 8.0;

pub const HIGH_PENETRATION_GAMMA: f32 = 2.0;

pub const IDENTITY_MATRIX: [f32; 20] = [
    1.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 1.0, 0.0,
];

pub const EDGE_DETECT_KERNEL: [f32; 9] = [0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0];

/// A value destined for one named field of a program's uniform block.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    /// Packed tightly from the field's offset (used for `array<vec4<f32>, N>`).
    Floats(Vec<f32>),
}

pub type UniformBindings = Vec<(&'static str, UniformValue)>;

/// Resolved parameters of one pass, shared by the GPU and CPU paths.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelParams {
    Identity,
    Invert,
    BlackWhite,
    /// 20 floats, offsets (m[4], m[9], m[14], m[19]) already normalized to 0..1.
    ColorMatrix([f32; 20]),
    Convolution([f32; 9]),
    HueStrip { range: [f32; 2], lightness: f32 },
    LightnessRemap { range: [f32; 2] },
    SenEqualize { clip_limit: f32, kernel_size: f32 },
    HighPenetration { gamma: f32 },
}

/// What the engine needs to issue one draw.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelOutput {
    pub shader: &'static str,
    pub uniforms: UniformBindings,
}

// ============================================================================
// PARAMETER RESOLUTION
// ============================================================================

fn number_or(inv: &FilterInvocation, i: usize, default: f32) -> f32 {
    inv.number(i).map(|n| n as f32).unwrap_or(default)
}

/// Resolve an invocation's kind + args into concrete kernel parameters.
pub fn resolve(inv: &FilterInvocation) -> KernelParams {
    match inv.kind {
        FilterKind::Identity => KernelParams::Identity,
        FilterKind::Invert => KernelParams::Invert,
        FilterKind::BlackWhite => KernelParams::BlackWhite,
        FilterKind::Contrast => KernelParams::ColorMatrix(normalize_matrix(contrast_matrix(number_or(inv, 0, 0.0)))),
        FilterKind::Brightness => KernelParams::ColorMatrix(normalize_matrix(brightness_matrix(number_or(inv, 0, 0.0)))),
        FilterKind::Saturation => KernelParams::ColorMatrix(normalize_matrix(saturation_matrix(number_or(inv, 0, 0.0)))),
        FilterKind::Negative => KernelParams::ColorMatrix(normalize_matrix(contrast_matrix(-2.0))),
        FilterKind::ColorMatrix => KernelParams::ColorMatrix(normalize_matrix(matrix_from_args(&inv.args))),
        FilterKind::Sharpen => KernelParams::Convolution(sharpen_kernel(number_or(inv, 0, SHARPEN_FILTER_AMOUNT))),
        FilterKind::Emboss => KernelParams::Convolution(emboss_kernel(number_or(inv, 0, EMBOSS_FILTER_AMOUNT))),
        FilterKind::DetectEdges => KernelParams::Convolution(EDGE_DETECT_KERNEL),
        FilterKind::HueStrip(band) => {
            let (range, lightness) = match band {
                HueBand::Narrow => (OS_FILTER_RANGE, OS_FILTER_LIGHTNESS),
                HueBand::Wide => (O2_FILTER_RANGE, O2_FILTER_LIGHTNESS),
            };
            KernelParams::HueStrip {
                range: [number_or(inv, 0, range[0]), number_or(inv, 1, range[1])],
                lightness: number_or(inv, 2, lightness),
            }
        }
        FilterKind::LightnessRemap => KernelParams::LightnessRemap {
            range: variance_band(band_index(&inv.args)),
        },
        FilterKind::SenEqualize => KernelParams::SenEqualize {
            clip_limit: number_or(inv, 0, SEN_CLIP_LIMIT),
            kernel_size: number_or(inv, 1, SEN_KERNEL_SIZE).max(1.0),
        },
        FilterKind::HighPenetration => KernelParams::HighPenetration {
            gamma: number_or(inv, 0, HIGH_PENETRATION_GAMMA),
        },
    }
}

/// Shader + uniform values for one pass.  `width`/`height` feed the pixel
/// step of the convolution family and the sen resolution.
pub fn build(params: &KernelParams, width: u32, height: u32) -> KernelOutput {
    match params {
        KernelParams::Identity => fixed(shaders::FRAGMENT_IDENTITY_SHADER),
        KernelParams::Invert => fixed(shaders::INVERT_SHADER),
        KernelParams::BlackWhite => fixed(shaders::BLACK_AND_WHITE_SHADER),
        KernelParams::ColorMatrix(m) => KernelOutput {
            shader: color_matrix_shader(m),
            uniforms: vec![("m", UniformValue::Floats(m.to_vec()))],
        },
        KernelParams::Convolution(k) => KernelOutput {
            shader: shaders::CONVOLUTION_SHADER,
            uniforms: vec![
                ("px", UniformValue::Vec2(pixel_step(width, height))),
                ("m", UniformValue::Floats(k.to_vec())),
            ],
        },
        KernelParams::HueStrip { range, lightness } => KernelOutput {
            shader: shaders::STRIP_HUE_RANGE_SHADER,
            uniforms: vec![
                ("hue_range", UniformValue::Vec2(*range)),
                ("lightness_for_deleted", UniformValue::Float(*lightness)),
            ],
        },
        KernelParams::LightnessRemap { range } => KernelOutput {
            shader: shaders::LIGHTNESS_REMAP_SHADER,
            uniforms: vec![("lightness_range", UniformValue::Vec2(*range))],
        },
        KernelParams::SenEqualize { clip_limit, kernel_size } => KernelOutput {
            shader: shaders::SEN_EQUALIZE_SHADER,
            uniforms: vec![
                ("resolution", UniformValue::Vec2([width as f32, height as f32])),
                ("clip_limit", UniformValue::Float(*clip_limit)),
                ("kernel_size", UniformValue::Float(*kernel_size)),
            ],
        },
        KernelParams::HighPenetration { gamma } => KernelOutput {
            shader: shaders::HIGH_PENETRATION_SHADER,
            uniforms: vec![("gamma_high", UniformValue::Float(*gamma))],
        },
    }
}

fn fixed(shader: &'static str) -> KernelOutput {
    KernelOutput { shader, uniforms: Vec::new() }
}

// ============================================================================
// COLOR MATRIX FAMILY
// ============================================================================

/// Contrast around the 128 midpoint: scale `a + 1`, offset `-128 (v - 1)`.
pub fn contrast_matrix(amount: f32) -> [f32; 20] {
    let v = amount + 1.0;
    let o = -128.0 * (v - 1.0);
    [
        v, 0.0, 0.0, 0.0, o,
        0.0, v, 0.0, 0.0, o,
        0.0, 0.0, v, 0.0, o,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

pub fn brightness_matrix(amount: f32) -> [f32; 20] {
    let b = amount + 1.0;
    [
        b, 0.0, 0.0, 0.0, 0.0,
        0.0, b, 0.0, 0.0, 0.0,
        0.0, 0.0, b, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

pub fn saturation_matrix(amount: f32) -> [f32; 20] {
    let x = amount * 2.0 / 3.0 + 1.0;
    let y = (x - 1.0) * -0.5;
    [
        x, y, y, 0.0, 0.0,
        y, x, y, 0.0, 0.0,
        y, y, x, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]
}

/// The first 20 args as a row-major 4x5 matrix.  Anything shorter, or with a
/// non-numeric entry in those 20, falls back to the identity.
pub fn matrix_from_args(args: &[FilterArg]) -> [f32; 20] {
    let mut m = IDENTITY_MATRIX;
    let values: Vec<f32> = args.iter().take(20).filter_map(|a| a.as_number()).map(|n| n as f32).collect();
    if values.len() < 20 {
        crate::log_warn!("colorMatrix needs 20 numbers, got {}; using identity", values.len());
        return m;
    }
    m.copy_from_slice(&values);
    m
}

/// Offsets are authored in 0..255 units; shaders work in 0..1.
pub fn normalize_matrix(mut m: [f32; 20]) -> [f32; 20] {
    for i in [4, 9, 14, 19] {
        m[i] /= 255.0;
    }
    m
}

/// True when the matrix leaves alpha alone and ignores it as an input.
pub fn ignores_alpha(m: &[f32; 20]) -> bool {
    m[18] == 1.0 && [3, 8, 13, 15, 16, 17, 19].iter().all(|&i| m[i] == 0.0)
}

pub fn color_matrix_shader(m: &[f32; 20]) -> &'static str {
    if ignores_alpha(m) {
        shaders::COLOR_MATRIX_WITHOUT_ALPHA_SHADER
    } else {
        shaders::COLOR_MATRIX_WITH_ALPHA_SHADER
    }
}

// ============================================================================
// CONVOLUTION FAMILY
// ============================================================================

pub fn sharpen_kernel(a: f32) -> [f32; 9] {
    [0.0, -a, 0.0, -a, 1.0 + 4.0 * a, -a, 0.0, -a, 0.0]
}

pub fn emboss_kernel(s: f32) -> [f32; 9] {
    [-2.0 * s, -s, 0.0, -s, 1.0, s, 0.0, s, 2.0 * s]
}

/// One texel in normalized texture coordinates.
pub fn pixel_step(width: u32, height: u32) -> [f32; 2] {
    [1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32]
}

// ============================================================================
// LIGHTNESS REMAP
// ============================================================================

/// Band index from the argument array: a number, or the position of the lit
/// bar in an equalizer flag array.  Missing or out of range → band 4.
pub fn band_index(args: &[FilterArg]) -> usize {
    let picked = match args.first() {
        Some(FilterArg::Number(n)) if n.is_finite() && *n >= 0.0 => Some(n.round() as usize),
        Some(FilterArg::Flag(_)) => args.iter().position(|a| matches!(a, FilterArg::Flag(true))),
        _ => None,
    };
    match picked {
        Some(i) if i < VARIANCE_BANDS.len() => i,
        Some(i) => {
            crate::log_warn!("variance band {} out of range, using {}", i, DEFAULT_VARIANCE_BAND);
            DEFAULT_VARIANCE_BAND
        }
        None => DEFAULT_VARIANCE_BAND,
    }
}

pub fn variance_band(index: usize) -> [f32; 2] {
    let [from, to] = VARIANCE_BANDS[index.min(VARIANCE_BANDS.len() - 1)];
    [from as f32 / 256.0, to as f32 / 256.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sharpen_kernel_preserves_energy() {
        for a in [0.0, 0.5, 1.0, 4.0, SHARPEN_FILTER_AMOUNT, 123.25] {
            let sum: f32 = sharpen_kernel(a).iter().sum();
            assert!((sum - 1.0).abs() < 1e-4, "amount {} sums to {}", a, sum);
        }
    }

    #[test]
    fn emboss_and_edges_shapes() {
        assert_eq!(emboss_kernel(4.0), [-8.0, -4.0, 0.0, -4.0, 1.0, 4.0, 0.0, 4.0, 8.0]);
        assert_eq!(EDGE_DETECT_KERNEL.iter().sum::<f32>(), 0.0);
    }

    #[test]
    fn contrast_zero_is_identity_matrix() {
        let m = normalize_matrix(contrast_matrix(0.0));
        assert_eq!(m, normalize_matrix(brightness_matrix(0.0)));
        assert_eq!(m[0], 1.0);
        assert_eq!(m[4], 0.0);
    }

    #[test]
    fn contrast_offset_is_centred_on_128() {
        let m = normalize_matrix(contrast_matrix(1.0));
        assert_eq!(m[0], 2.0);
        assert!((m[4] - (-128.0 / 255.0)).abs() < 1e-6);
        assert_eq!(m[9], m[4]);
        assert_eq!(m[14], m[4]);
        assert_eq!(m[19], 0.0);
    }

    #[test]
    fn alpha_free_variant_selected_for_rgb_matrices() {
        let m = normalize_matrix(contrast_matrix(2.5));
        assert!(ignores_alpha(&m));
        assert_eq!(color_matrix_shader(&m), shaders::COLOR_MATRIX_WITHOUT_ALPHA_SHADER);

        let mut with_alpha = m;
        with_alpha[18] = 0.5;
        assert_eq!(color_matrix_shader(&with_alpha), shaders::COLOR_MATRIX_WITH_ALPHA_SHADER);
    }

    #[test]
    fn color_matrix_args_are_normalized() {
        let mut args = IDENTITY_MATRIX.map(|v| FilterArg::Number(v as f64)).to_vec();
        args[4] = FilterArg::Number(51.0);
        args[18] = FilterArg::Number(0.5);
        args[19] = FilterArg::Number(25.5);
        let params = resolve(&FilterInvocation::with_args(FilterKind::ColorMatrix, args));
        let KernelParams::ColorMatrix(m) = &params else { panic!("unexpected {:?}", params) };
        assert!((m[4] - 0.2).abs() < 1e-6);
        assert!((m[19] - 0.1).abs() < 1e-6);
        assert_eq!(build(&params, 1, 1).shader, shaders::COLOR_MATRIX_WITH_ALPHA_SHADER);
    }

    #[test]
    fn short_color_matrix_falls_back_to_identity() {
        let args = vec![FilterArg::Number(2.0); 19];
        assert_eq!(
            resolve(&FilterInvocation::with_args(FilterKind::ColorMatrix, args)),
            KernelParams::ColorMatrix(IDENTITY_MATRIX)
        );
        assert_eq!(
            resolve(&FilterInvocation::new(FilterKind::ColorMatrix)),
            resolve(&FilterInvocation::with_amount(FilterKind::Contrast, 0.0))
        );
    }

    #[test]
    fn convolution_step_follows_image_size() {
        let out = build(&KernelParams::Convolution(EDGE_DETECT_KERNEL), 200, 50);
        assert_eq!(out.uniforms[0], ("px", UniformValue::Vec2([0.005, 0.02])));
    }

    #[test]
    fn hue_presets_share_one_shader() {
        let narrow = build(&resolve(&FilterInvocation::new(FilterKind::HueStrip(HueBand::Narrow))), 4, 4);
        let wide = build(&resolve(&FilterInvocation::new(FilterKind::HueStrip(HueBand::Wide))), 4, 4);
        assert_eq!(narrow.shader, wide.shader);
        assert_eq!(narrow.uniforms[0].1, UniformValue::Vec2([0.0, 2.0]));
        assert_eq!(wide.uniforms[0].1, UniformValue::Vec2([2.0, 256.0]));
    }

    #[test]
    fn variance_band_table() {
        assert_eq!(variance_band(4), [96.0 / 256.0, 160.0 / 256.0]);
        assert_eq!(variance_band(8), [0.75, 1.0]);
        assert_eq!(band_index(&[]), 4);
        assert_eq!(band_index(&[FilterArg::Number(7.0)]), 7);
        assert_eq!(band_index(&[FilterArg::Number(0.0)]), 0);
        assert_eq!(variance_band(0), [0.25, 0.0]);
        assert_eq!(band_index(&[FilterArg::Number(42.0)]), 4);
        let flags = [false, false, true, false].map(FilterArg::Flag);
        assert_eq!(band_index(&flags), 2);
    }

    #[test]
    fn sen_defaults() {
        assert_eq!(
            resolve(&FilterInvocation::new(FilterKind::SenEqualize)),
            KernelParams::SenEqualize { clip_limit: 2.0, kernel_size: 8.0 }
        );
    }
}
