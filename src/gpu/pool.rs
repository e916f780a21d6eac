// ============================================================================
// RENDER TARGET POOL — the two ping-pong targets of a filter chain
// ============================================================================

use super::texture::RenderTarget;

/// Exactly two offscreen targets sized to the current image.
///
/// Both are created together on the first request and recreated together
/// whenever the image size changes, so a chain of any length costs two
/// allocations per size.
pub struct RenderTargetPool {
    targets: Option<[RenderTarget; 2]>,
    /// Lifetime count of target textures created.
    allocations: u64,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self { targets: None, allocations: 0 }
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.targets.as_ref().map(|[ping, _]| (ping.width, ping.height))
    }

    /// The pair for `width` x `height`, reallocating both when the size changed.
    pub fn ensure_size(&mut self, device: &wgpu::Device, width: u32, height: u32) -> &[RenderTarget; 2] {
        if self.size() != Some((width, height)) {
            crate::log_info!("allocating ping-pong targets {}x{}", width, height);
            self.allocations += 2;
            self.targets = None;
        }
        self.targets.get_or_insert_with(|| {
            [
                RenderTarget::new(device, "ping_target", width, height),
                RenderTarget::new(device, "pong_target", width, height),
            ]
        })
    }

    pub fn allocation_count(&self) -> u64 {
        self.allocations
    }
}

impl Default for RenderTargetPool {
    fn default() -> Self {
        Self::new()
    }
}
