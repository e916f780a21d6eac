// ============================================================================
// XRayFE CLI — headless filter-chain rendering via command-line arguments
// ============================================================================
//
// Usage examples:
//   xrayfe -i scan.png -f contrast=1.5 -f invert -o out.png
//   xrayfe -i "bags/*.jpg" --chain night-shift.json --output-dir processed/
//   xrayfe -i scan.png -f osFilter -f variance=false,false,true --cpu
//   xrayfe --list-filters
//
// Filters apply left to right in the order given.  Rendering uses the GPU
// engine and falls back to the CPU reference renderer when no adapter exists.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::RgbaImage;

use crate::error::{FilterError, FilterResult};
use crate::filters::{self, FilterInvocation, catalog};
use crate::gpu::{EngineConfig, FilterChainEngine, GpuPreference};
use crate::ops::reference;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// XRayFE headless filter-chain renderer.
#[derive(Parser, Debug)]
#[command(
    name = "xrayfe",
    about = "XRayFE headless X-ray image filter renderer",
    long_about = "Apply an ordered chain of X-ray viewing filters (contrast, invert,\n\
                  sharpen, hue strip, variance, ...) to image files on the GPU.\n\n\
                  Example:\n  \
                  xrayfe -i scan.png -f contrast=1.5 -f invert -o out.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "scans/*.jpg").
    #[arg(short, long, num_args = 1.., required_unless_present = "list_filters")]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing (PNG, original file stem).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Filter to apply, `name` or `name=a,b,..`. Repeatable; applied in order.
    #[arg(short, long = "filter", value_name = "NAME[=ARGS]")]
    pub filters: Vec<String>,

    /// JSON chain file: `[{"kind": "contrast", "args": [1.5]}, ...]`.
    /// Its stages run before any --filter flags.
    #[arg(long, value_name = "FILE")]
    pub chain: Option<PathBuf>,

    /// Render on the CPU reference renderer instead of the GPU.
    #[arg(long)]
    pub cpu: bool,

    /// GPU preference: "high performance" or "low power".
    #[arg(long, default_value = "high performance", value_name = "PREF")]
    pub gpu: String,

    /// Print the filter catalog as JSON and exit.
    #[arg(long)]
    pub list_filters: bool,

    /// Print per-file timing and pass diagnostics.
    #[arg(short, long)]
    pub verbose: bool,
}

/// The engine actually used for this run.
enum Renderer {
    Gpu(Box<FilterChainEngine>),
    Cpu,
}

impl Renderer {
    fn select(args: &CliArgs) -> Self {
        if args.cpu {
            return Renderer::Cpu;
        }
        let config = EngineConfig {
            gpu_preference: GpuPreference::from_setting(&args.gpu),
            ..EngineConfig::default()
        };
        match FilterChainEngine::new(&config) {
            Ok(engine) => {
                if args.verbose {
                    println!("GPU: {}", engine.adapter_name());
                }
                Renderer::Gpu(Box::new(engine))
            }
            Err(e) => {
                eprintln!("warning: {}; using the CPU renderer.", e);
                Renderer::Cpu
            }
        }
    }

    fn render(&mut self, image: &RgbaImage, chain: &[FilterInvocation], verbose: bool) -> FilterResult<RgbaImage> {
        match self {
            Renderer::Gpu(engine) => {
                engine.apply(image, chain)?;
                if verbose {
                    for d in engine.diagnostics() {
                        println!("  pass {} ({}) rendered as identity: {}", d.index, d.kind, d.error);
                    }
                }
                engine.read_output()
            }
            Renderer::Cpu => reference::render(image, chain),
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    if args.list_filters {
        return match serde_json::to_string_pretty(&catalog::filter_catalog()) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let chain = match build_chain(args.chain.as_deref(), &args.filters) {
        Ok(chain) => chain,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    crate::log_info!("chain: {:?}", chain.iter().map(|f| f.kind.name()).collect::<Vec<_>>());

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let mut renderer = Renderer::select(&args);
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(&mut renderer, input_path, &output_path, &chain, args.verbose) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                crate::log_err!("{}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    renderer: &mut Renderer,
    input: &Path,
    output: &Path,
    chain: &[FilterInvocation],
    verbose: bool,
) -> Result<(), String> {
    let image = image::open(input)
        .map_err(|e| format!("load failed: {}", e))?
        .to_rgba8();

    let rendered = renderer
        .render(&image, chain, verbose)
        .map_err(|e| format!("render failed: {}", e))?;

    rendered.save(output).map_err(|e| format!("save failed: {}", e))
}

// ============================================================================
// Helpers
// ============================================================================

/// Chain file stages first, then `--filter` flags in command-line order.
fn build_chain(chain_file: Option<&Path>, specs: &[String]) -> FilterResult<Vec<FilterInvocation>> {
    let mut chain = match chain_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| FilterError::ChainFile(format!("{}: {}", path.display(), e)))?;
            filters::parse_chain_json(&text)?
        }
        None => Vec::new(),
    };
    for spec in specs {
        chain.push(FilterInvocation::parse_spec(spec)?);
    }
    Ok(chain)
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Output path for one input file.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir` + input stem + `.png`
/// 3. Next to the input as `<stem>_filtered.png`
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = input.parent().unwrap_or_else(|| Path::new("."));
    Some(parent.join(format!("{}_filtered.png", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterKind;

    #[test]
    fn flags_parse_in_order() {
        let args = CliArgs::parse_from(["xrayfe", "-i", "a.png", "-f", "contrast=2", "-f", "invert", "--cpu"]);
        assert!(args.cpu);
        let chain = build_chain(None, &args.filters).unwrap();
        assert_eq!(chain.iter().map(|f| f.kind).collect::<Vec<_>>(), vec![FilterKind::Contrast, FilterKind::Invert]);
        assert_eq!(chain[0].number(0), Some(2.0));
    }

    #[test]
    fn list_filters_needs_no_input() {
        let args = CliArgs::parse_from(["xrayfe", "--list-filters"]);
        assert!(args.list_filters);
        assert!(args.input.is_empty());
    }

    #[test]
    fn unknown_filter_flag_is_an_error() {
        assert!(matches!(
            build_chain(None, &["sepia".to_string()]),
            Err(FilterError::UnknownFilterKind(_))
        ));
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("scans/bag01.jpg");
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), Some(Path::new("out"))),
            Some(PathBuf::from("x.png"))
        );
        assert_eq!(build_output_path(input, None, Some(Path::new("out"))), Some(PathBuf::from("out/bag01.png")));
        assert_eq!(build_output_path(input, None, None), Some(PathBuf::from("scans/bag01_filtered.png")));
    }
}
