//! GPU engine tests.  Each test acquires its own device and returns early when
//! the machine has no adapter at all (not even a software one).

use image::{Rgba, RgbaImage};

use xrayfe::filters::kernels::{self, KernelOutput, KernelParams};
use xrayfe::gpu::engine::default_kernel;
use xrayfe::gpu::shaders;
use xrayfe::ops::reference;
use xrayfe::{EngineConfig, FilterArg, FilterChainEngine, FilterError, FilterInvocation, FilterKind, HueBand};

fn engine() -> Option<FilterChainEngine> {
    match FilterChainEngine::new(&EngineConfig::default()) {
        Ok(engine) => Some(engine),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        Rgba([(x * 29 % 256) as u8, (y * 47 % 256) as u8, ((x * 3 + y * 5) % 256) as u8, 255])
    })
}

fn render(engine: &mut FilterChainEngine, image: &RgbaImage, chain: &[FilterInvocation]) -> RgbaImage {
    engine.apply(image, chain).unwrap();
    engine.read_output().unwrap()
}

fn max_channel_diff(a: &RgbaImage, b: &RgbaImage) -> i32 {
    a.as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(x, y)| (*x as i32 - *y as i32).abs())
        .max()
        .unwrap_or(0)
}

const BROKEN_FRAGMENT: &str = "@fragment fn fs_main() -> @location(0) vec4<f32> { return nope; }";

#[test]
fn empty_chain_copies_the_source() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(37, 23);
    assert_eq!(render(&mut engine, &img, &[]), img);
}

#[test]
fn identity_chains_of_any_length_are_upright() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(16, 11);
    for n in 1..=4 {
        let chain = vec![FilterInvocation::passthrough(); n];
        assert_eq!(render(&mut engine, &img, &chain), img, "chain of {}", n);
    }
}

#[test]
fn two_targets_regardless_of_chain_length() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(8, 8);
    for n in [0, 1, 5, 50] {
        let chain = vec![FilterInvocation::new(FilterKind::Invert); n];
        engine.apply(&img, &chain).unwrap();
        assert_eq!(engine.stats().target_allocations, 2, "chain of {}", n);
    }
}

#[test]
fn gray_invert_and_black_white() {
    let Some(mut engine) = engine() else { return };
    let gray = RgbaImage::from_pixel(2, 2, Rgba([128, 128, 128, 255]));
    let inverted = render(&mut engine, &gray, &[FilterInvocation::new(FilterKind::Invert)]);
    assert!(inverted.pixels().all(|p| p.0 == [127, 127, 127, 255]));
    let bw = render(&mut engine, &gray, &[FilterInvocation::new(FilterKind::BlackWhite)]);
    assert_eq!(bw, gray);
}

#[test]
fn invert_is_an_involution() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(13, 9);
    let chain = vec![FilterInvocation::new(FilterKind::Invert); 2];
    assert_eq!(render(&mut engine, &img, &chain), img);
}

#[test]
fn every_kind_matches_the_cpu_reference() {
    let Some(mut engine) = engine() else { return };
    // Odd sizes keep sen tile corners off texel boundaries.
    let img = gradient(17, 13);
    for kind in FilterKind::ALL {
        let chain = [FilterInvocation::new(kind)];
        let gpu = render(&mut engine, &img, &chain);
        let cpu = reference::render(&img, &chain).unwrap();
        assert!(max_channel_diff(&gpu, &cpu) <= 1, "{}: max diff {}", kind, max_channel_diff(&gpu, &cpu));
    }
}

#[test]
fn multi_pass_chains_match_the_cpu_reference() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(17, 13);
    let chains = vec![
        vec![
            FilterInvocation::with_amount(FilterKind::Contrast, 1.5),
            FilterInvocation::new(FilterKind::Invert),
            FilterInvocation::new(FilterKind::HueStrip(HueBand::Narrow)),
        ],
        // Emboss is asymmetric, so a missed flip between passes shows up.
        vec![FilterInvocation::new(FilterKind::Invert), FilterInvocation::new(FilterKind::Emboss)],
        vec![FilterInvocation::new(FilterKind::DetectEdges); 3],
        vec![
            FilterInvocation::new(FilterKind::Invert),
            FilterInvocation::new(FilterKind::SenEqualize),
            FilterInvocation::new(FilterKind::Invert),
        ],
        vec![FilterInvocation::with_amount(FilterKind::LightnessRemap, 0.0)],
    ];
    for chain in chains {
        let gpu = render(&mut engine, &img, &chain);
        let cpu = reference::render(&img, &chain).unwrap();
        let names: Vec<_> = chain.iter().map(|f| f.kind.name()).collect();
        assert!(max_channel_diff(&gpu, &cpu) <= 1, "{:?}: max diff {}", names, max_channel_diff(&gpu, &cpu));
    }
}

#[test]
fn hue_presets_gray_out_their_band() {
    let Some(mut engine) = engine() else { return };
    // Fast hue estimates 0, 1, 2, 3, 4, -0.5, then an achromatic pixel.
    let row = [
        [200, 100, 100, 255],
        [200, 200, 100, 255],
        [100, 200, 100, 255],
        [100, 200, 200, 255],
        [100, 100, 200, 180],
        [200, 100, 150, 255],
        [90, 90, 90, 255],
    ];
    let img = RgbaImage::from_fn(row.len() as u32, 1, |x, _| Rgba(row[x as usize]));
    let grayed = |band: HueBand, engine: &mut FilterChainEngine| -> Vec<usize> {
        let out = render(engine, &img, &[FilterInvocation::new(FilterKind::HueStrip(band))]);
        (0..row.len())
            .filter(|&x| {
                let p = out.get_pixel(x as u32, 0).0;
                p != row[x] && p[..3] == [255, 255, 255] && p[3] == row[x][3]
            })
            .collect()
    };
    assert_eq!(grayed(HueBand::Narrow, &mut engine), vec![0, 1, 2]);
    assert_eq!(grayed(HueBand::Wide, &mut engine), vec![2, 3, 4]);
}

#[test]
fn lightness_band_four_window_on_gpu() {
    let Some(mut engine) = engine() else { return };
    let chain = [FilterInvocation::with_amount(FilterKind::LightnessRemap, 4.0)];
    let img = RgbaImage::from_fn(3, 1, |x, _| {
        let v = [128, 50, 200][x as usize];
        Rgba([v, v, v, 255])
    });
    let out = render(&mut engine, &img, &chain);
    let mid = out.get_pixel(0, 0).0;
    assert!((mid[0] as i32 - 128).abs() <= 2, "midpoint -> {:?}", mid);
    assert_eq!(out.get_pixel(1, 0).0, [0, 0, 0, 255]);
    assert_eq!(out.get_pixel(2, 0).0, [255, 255, 255, 255]);
}

#[test]
fn positive_contrast_increases_variance_on_gpu() {
    let Some(mut engine) = engine() else { return };
    let img = RgbaImage::from_fn(8, 8, |x, y| {
        let v = 96 + ((x + y) * 4) as u8;
        Rgba([v, v, v, 255])
    });
    let variance = |img: &RgbaImage| {
        let vals: Vec<f64> = img.pixels().map(|p| p.0[0] as f64).collect();
        let mean = vals.iter().sum::<f64>() / vals.len() as f64;
        vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / vals.len() as f64
    };
    let out = render(&mut engine, &img, &[FilterInvocation::with_amount(FilterKind::Contrast, 1.0)]);
    assert!(variance(&out) > variance(&img));
    assert_eq!(render(&mut engine, &img, &[FilterInvocation::with_amount(FilterKind::Contrast, 0.0)]), img);
}

#[test]
fn color_matrix_alpha_row_uses_the_alpha_program() {
    let Some(mut engine) = engine() else { return };
    let mut m = [0.0; 20];
    m[0] = 1.0;
    m[6] = 1.0;
    m[12] = 1.0;
    m[18] = 0.5;
    m[19] = 51.0;
    let inv = FilterInvocation::with_args(FilterKind::ColorMatrix, m.iter().map(|v| FilterArg::Number(*v)).collect());
    let img = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 200]));
    let out = render(&mut engine, &img, &[inv]);
    assert!(out.pixels().all(|p| p.0 == [10, 20, 30, 151]), "{:?}", out.get_pixel(0, 0));
    assert!(engine.programs().contains(shaders::COLOR_MATRIX_WITH_ALPHA_SHADER));
    assert!(!engine.programs().contains(shaders::COLOR_MATRIX_WITHOUT_ALPHA_SHADER));
}

#[test]
fn broken_stage_renders_as_identity_and_is_diagnosed() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(11, 7);
    // Pointwise last stage: dropping a stage changes how many handoffs precede
    // it, which would mirror a neighborhood kernel's taps.
    let contrast = FilterInvocation::with_amount(FilterKind::Contrast, 1.0);
    let with_broken_middle = [
        FilterInvocation::new(FilterKind::Invert),
        FilterInvocation::new(FilterKind::Emboss),
        contrast.clone(),
    ];
    let kernel = |inv: &FilterInvocation, w: u32, h: u32| {
        if inv.kind == FilterKind::Emboss {
            KernelOutput { shader: BROKEN_FRAGMENT, uniforms: Vec::new() }
        } else {
            default_kernel(inv, w, h)
        }
    };
    engine.apply_with(&img, &with_broken_middle, kernel).unwrap();
    let degraded = engine.read_output().unwrap();

    let diagnostics = engine.diagnostics().to_vec();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].index, 1);
    assert_eq!(diagnostics[0].kind, FilterKind::Emboss);
    assert!(matches!(diagnostics[0].error, FilterError::ShaderCompileFailed { .. }));
    assert!(!engine.programs().contains(BROKEN_FRAGMENT));

    let without = render(&mut engine, &img, &[FilterInvocation::new(FilterKind::Invert), contrast]);
    assert_eq!(degraded, without);
    assert!(engine.diagnostics().is_empty());
}

#[test]
fn hue_presets_share_one_program() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(4, 4);
    engine.apply(&img, &[FilterInvocation::new(FilterKind::HueStrip(HueBand::Narrow))]).unwrap();
    let after_narrow = engine.stats().programs_compiled;
    engine.apply(&img, &[FilterInvocation::new(FilterKind::HueStrip(HueBand::Wide))]).unwrap();
    assert_eq!(engine.stats().programs_compiled, after_narrow);
}

#[test]
fn invalid_shader_is_reported_and_not_cached() {
    let Some(mut engine) = engine() else { return };
    let broken = BROKEN_FRAGMENT;
    match engine.programs().compile(broken) {
        Err(FilterError::ShaderCompileFailed { label, .. }) => assert_eq!(label, "custom"),
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("broken shader compiled"),
    }
    assert!(!engine.programs().contains(broken));
    assert_eq!(engine.programs().compiled_count(), 0);
}

#[test]
fn resize_reallocates_targets_together() {
    let Some(mut engine) = engine() else { return };
    engine.apply(&gradient(8, 8), &[]).unwrap();
    engine.apply(&gradient(8, 8), &[]).unwrap();
    assert_eq!(engine.stats().target_allocations, 2);
    let out = engine.apply(&gradient(12, 5), &[]).unwrap();
    assert_eq!(out.dimensions(), (12, 5));
    assert_eq!(engine.stats().target_allocations, 4);
}

#[test]
fn second_apply_at_same_size_uploads_in_place() {
    let Some(mut engine) = engine() else { return };
    let first = gradient(10, 10);
    let second = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]));
    engine.apply(&first, &[]).unwrap();
    let out = render(&mut engine, &second, &[]);
    let stats = engine.stats();
    assert_eq!((stats.full_uploads, stats.sub_uploads), (1, 1));
    assert_eq!(out, second);
}

#[test]
fn zero_area_is_rejected() {
    let Some(mut engine) = engine() else { return };
    match engine.apply(&RgbaImage::new(0, 5), &[]) {
        Err(FilterError::InvalidDimensions { width: 0, height: 5 }) => {}
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("zero-area image accepted"),
    }
}

#[test]
fn queued_filters_render_like_an_explicit_chain() {
    let Some(mut engine) = engine() else { return };
    let img = gradient(9, 9);
    engine.add_filter_named("invert", vec![]);
    engine.add_filter_named("sepia", vec![]);
    engine.add_filter_named("contrast", vec![FilterArg::Number(0.0)]);
    assert_eq!(engine.queued().len(), 3);
    engine.apply_queued(&img).unwrap();
    let queued = engine.read_output().unwrap();
    let explicit = render(&mut engine, &img, &[FilterInvocation::new(FilterKind::Invert)]);
    assert_eq!(queued, explicit);

    engine.reset();
    assert!(engine.queued().is_empty());
}

#[test]
fn every_kernel_shader_compiles() {
    let Some(mut engine) = engine() else { return };
    for (label, src) in shaders::FRAGMENT_CATALOG {
        assert!(engine.programs().compile(src).is_ok(), "{}", label);
    }
    let out = kernels::build(&KernelParams::Identity, 1, 1);
    assert!(engine.programs().contains(out.shader));
}

#[test]
fn compiled_programs_expose_locations() {
    let Some(mut engine) = engine() else { return };
    let program = engine.programs().compile(shaders::CONVOLUTION_SHADER).unwrap();
    assert_eq!(program.uniform_location("px").map(|f| f.offset), Some(0));
    assert_eq!(program.uniform_location("m").map(|f| f.offset), Some(16));
    assert_eq!(program.uniform_location("missing"), None);
    assert_eq!(program.attribute_location("pos"), Some(0));
    assert_eq!(program.attribute_location("uv"), Some(1));

    let identity = engine.programs().compile(shaders::FRAGMENT_IDENTITY_SHADER).unwrap();
    assert_eq!(identity.uniform_location("px"), None);
}
