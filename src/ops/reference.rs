// ============================================================================
// CPU REFERENCE RENDERER — rayon-parallelized mirror of the GPU chain
// ============================================================================
//
// Runs the same kernels on the CPU, pass by pass, with the same draw schedule
// as the GPU engine.  Every pass is quantized to 8 bits and offscreen passes
// are stored upside down, exactly like an Rgba8Unorm render target written
// bottom-up, so outputs match the GPU path texel for texel (nearest
// sampling, clamp-to-edge).
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::error::{FilterError, FilterResult};
use crate::filters::FilterInvocation;
use crate::filters::kernels::{self, KernelParams};
use crate::gpu::engine::schedule;

type Px = [f32; 4];

/// Render `chain` over `image` on the CPU.  An empty chain returns a copy;
/// zero-area images are rejected like on the GPU.
pub fn render(image: &RgbaImage, chain: &[FilterInvocation]) -> FilterResult<RgbaImage> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(FilterError::InvalidDimensions { width, height });
    }

    let params: Vec<KernelParams> = if chain.is_empty() {
        vec![KernelParams::Identity]
    } else {
        chain.iter().map(kernels::resolve).collect()
    };

    let mut current = image.clone();
    for (p, step) in params.iter().zip(schedule(params.len())) {
        current = render_pass(&current, p);
        if step.inverts() {
            image::imageops::flip_vertical_in_place(&mut current);
        }
    }
    Ok(current)
}

/// One pass in memory orientation: output texel (x, y) reads around source
/// texel (x, y).
pub fn render_pass(src: &RgbaImage, params: &KernelParams) -> RgbaImage {
    let (w, h) = src.dimensions();
    let stride = w as usize * 4;
    let mut dst_raw = vec![0u8; stride * h as usize];

    dst_raw
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row_out)| {
            for x in 0..w as usize {
                let px = shade(src, x as i64, y as i64, params);
                let pi = x * 4;
                for c in 0..4 {
                    row_out[pi + c] = quantize(px[c]);
                }
            }
        });

    RgbaImage::from_raw(w, h, dst_raw).unwrap_or_else(|| src.clone())
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Clamp-to-edge texel fetch, normalized to 0..1.
fn texel(src: &RgbaImage, x: i64, y: i64) -> Px {
    let cx = x.clamp(0, src.width() as i64 - 1) as u32;
    let cy = y.clamp(0, src.height() as i64 - 1) as u32;
    let p = src.get_pixel(cx, cy).0;
    [
        p[0] as f32 / 255.0,
        p[1] as f32 / 255.0,
        p[2] as f32 / 255.0,
        p[3] as f32 / 255.0,
    ]
}

/// Nearest sample at normalized coordinates.
fn sample(src: &RgbaImage, u: f32, v: f32) -> Px {
    let x = (u * src.width() as f32).floor() as i64;
    let y = (v * src.height() as f32).floor() as i64;
    texel(src, x, y)
}

fn shade(src: &RgbaImage, x: i64, y: i64, params: &KernelParams) -> Px {
    let c = texel(src, x, y);
    match params {
        KernelParams::Identity => c,
        KernelParams::Invert => [1.0 - c[0], 1.0 - c[1], 1.0 - c[2], c[3]],
        KernelParams::BlackWhite => {
            let l = (c[0] + c[1] + c[2]) / 3.0;
            [l, l, l, c[3]]
        }
        KernelParams::ColorMatrix(m) => color_matrix(m, c),
        KernelParams::Convolution(k) => {
            let mut sum = [0.0f32; 4];
            for (i, weight) in k.iter().enumerate() {
                let dx = (i % 3) as i64 - 1;
                let dy = (i / 3) as i64 - 1;
                let s = texel(src, x + dx, y + dy);
                for ch in 0..4 {
                    sum[ch] += s[ch] * weight;
                }
            }
            [sum[0], sum[1], sum[2], c[3]]
        }
        KernelParams::HueStrip { range, lightness } => match fast_hue(c) {
            Some(hue) if hue >= range[0] && hue <= range[1] => [*lightness, *lightness, *lightness, c[3]],
            _ => c,
        },
        KernelParams::LightnessRemap { range } => {
            let [h, l, s] = rgb2hls([c[0], c[1], c[2]]);
            let l = if l < range[0] {
                0.0
            } else if l > range[1] {
                1.0
            } else {
                (l - range[0]) / (range[1] - range[0]).max(1e-6)
            };
            let [r, g, b] = hls2rgb([h, l, s]);
            [r, g, b, c[3]]
        }
        KernelParams::HighPenetration { gamma } => {
            let [h, l, s] = rgb2hls([c[0], c[1], c[2]]);
            let [r, g, b] = hls2rgb([h, l.powf(*gamma), s]);
            [r, g, b, c[3]]
        }
        KernelParams::SenEqualize { clip_limit, kernel_size } => {
            let u = (x as f32 + 0.5) / src.width() as f32;
            let v = (y as f32 + 0.5) / src.height() as f32;
            let eq = sen_equalize(src, u, v, *clip_limit, *kernel_size);
            let [h, _, s] = rgb2hls([c[0], c[1], c[2]]);
            let [r, g, b] = hls2rgb([h, eq, s]);
            [r, g, b, 1.0]
        }
    }
}

fn color_matrix(m: &[f32; 20], c: Px) -> Px {
    let row = |i: usize| m[i] * c[0] + m[i + 1] * c[1] + m[i + 2] * c[2] + m[i + 3] * c[3] + m[i + 4];
    if kernels::ignores_alpha(m) {
        let rgb = |i: usize| m[i] * c[0] + m[i + 1] * c[1] + m[i + 2] * c[2] + m[i + 4];
        [rgb(0), rgb(5), rgb(10), c[3]]
    } else {
        [row(0), row(5), row(10), row(15)]
    }
}

/// Dominant-channel hue estimate; `None` for achromatic pixels.
pub fn fast_hue(c: Px) -> Option<f32> {
    let [r, g, b, _] = c;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == min {
        return None;
    }
    let hue = if r >= g && r >= b {
        (g - b) / (r - g.min(b))
    } else if g >= r && g >= b {
        2.0 + (b - r) / (g - r.min(b))
    } else {
        4.0 + (r - g) / (b - r.min(g))
    };
    Some(hue)
}

fn sen_equalize(src: &RgbaImage, u: f32, v: f32, clip: f32, kernel_size: f32) -> f32 {
    let tile = 1.0 / kernel_size;
    let (tu, tv) = ((u / tile).floor(), (v / tile).floor());

    let mut avg = [0.0f32; 4];
    for ox in [-1.0f32, 0.0, 1.0] {
        for oy in [-1.0f32, 0.0, 1.0] {
            let s = sample(src, tu * tile + tile * ox, tv * tile + tile * oy);
            for ch in 0..4 {
                avg[ch] += s[ch] / 9.0;
            }
        }
    }

    let limit = clip * (avg[0] + avg[1] + avg[2]) / 3.0;
    let color = sample(src, u, v);
    let clipped = (color[0] - avg[0] + limit).max(0.0);
    (clipped * (1.0 / (1.0 + limit))).min(1.0)
}

// ============================================================================
// HLS
// ============================================================================

pub fn rgb2hls([r, g, b]: [f32; 3]) -> [f32; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if max == min {
        return [0.0, l, 0.0];
    }
    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let mut h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    h /= 6.0;
    [h, l, s]
}

fn hue2rgb(p: f32, q: f32, t: f32) -> f32 {
    let t = if t < 0.0 {
        t + 1.0
    } else if t > 1.0 {
        t - 1.0
    } else {
        t
    };
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

pub fn hls2rgb([h, l, s]: [f32; 3]) -> [f32; 3] {
    if s == 0.0 {
        return [l, l, l];
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    [hue2rgb(p, q, h + 1.0 / 3.0), hue2rgb(p, q, h), hue2rgb(p, q, h - 1.0 / 3.0)]
}
