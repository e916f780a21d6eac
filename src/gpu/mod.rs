// ============================================================================
// GPU MODULE — multi-pass filter-chain rendering for XRayFE
// ============================================================================
//
// Architecture:
//   context.rs — wgpu Device, Queue, adapter init, engine config
//   shaders.rs — all WGSL shader source (inline strings)
//   program.rs — program cache keyed by fragment source + WGSL reflection
//   texture.rs — source texture, render targets, output surface + readback
//   pool.rs    — the two ping-pong render targets
//   engine.rs  — FilterChainEngine: upload, per-pass draws, submit
// ============================================================================

pub mod context;
pub mod engine;
pub mod pool;
pub mod program;
pub mod shaders;
pub mod texture;

pub use context::{EngineConfig, GpuContext, GpuPreference};
pub use engine::{EngineStats, FilterChainEngine, PassDiagnostic};
pub use texture::OutputSurface;

/// Row pitch for texture -> buffer copies, padded to
/// `wgpu::COPY_BYTES_PER_ROW_ALIGNMENT` (256 bytes).
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readback_rows_are_padded() {
        assert_eq!(aligned_bytes_per_row(1), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }
}
