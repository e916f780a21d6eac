// ============================================================================
// GPU CONTEXT — wgpu Device, Queue, and adapter initialization
// ============================================================================

use std::sync::Arc;

use crate::error::{FilterError, FilterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPreference {
    #[default]
    HighPerformance,
    LowPower,
}

impl GpuPreference {
    /// Parse a settings string.  Anything unrecognised means "fast".
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "low power" | "low-power" | "integrated" => GpuPreference::LowPower,
            _ => GpuPreference::HighPerformance,
        }
    }

    fn power_preference(self) -> wgpu::PowerPreference {
        match self {
            GpuPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            GpuPreference::LowPower => wgpu::PowerPreference::LowPower,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub gpu_preference: GpuPreference,
    /// Accept a software rasterizer when no hardware adapter is found.
    pub allow_software_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gpu_preference: GpuPreference::HighPerformance,
            allow_software_fallback: true,
        }
    }
}

/// Device + queue owned by one engine.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
}

impl GpuContext {
    /// Tries a hardware adapter first, then (if allowed) a software
    /// rasterizer via `force_fallback_adapter`.
    pub fn new(config: &EngineConfig) -> FilterResult<Self> {
        if let Some(ctx) = pollster::block_on(Self::new_async(config.gpu_preference, false)) {
            crate::log_info!("GPU adapter: {} (max texture {})", ctx.adapter_name, ctx.max_texture_dim);
            return Ok(ctx);
        }
        if !config.allow_software_fallback {
            crate::log_err!("no hardware GPU adapter and software fallback disabled");
            return Err(FilterError::ContextUnavailable);
        }
        crate::log_warn!("hardware adapter unavailable, trying software fallback");
        match pollster::block_on(Self::new_async(config.gpu_preference, true)) {
            Some(ctx) => {
                crate::log_info!("GPU adapter (software): {}", ctx.adapter_name);
                Ok(ctx)
            }
            None => {
                crate::log_err!("no GPU adapter available");
                Err(FilterError::ContextUnavailable)
            }
        }
    }

    async fn new_async(preference: GpuPreference, force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: preference.power_preference(),
                compatible_surface: None, // headless, offscreen only
                force_fallback_adapter: force_fallback,
            })
            .await?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("XRayFE GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        ..wgpu::Limits::downlevel_webgl2_defaults()
                    },
                },
                None,
            )
            .await
            .ok()?;

        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
        })
    }

    pub fn supports_size(&self, width: u32, height: u32) -> bool {
        width <= self.max_texture_dim && height <= self.max_texture_dim
    }

    /// Submit a single encoder's commands.
    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_strings() {
        assert_eq!(GpuPreference::from_setting("Low Power"), GpuPreference::LowPower);
        assert_eq!(GpuPreference::from_setting("integrated"), GpuPreference::LowPower);
        assert_eq!(GpuPreference::from_setting("discrete"), GpuPreference::HighPerformance);
        assert_eq!(GpuPreference::from_setting(""), GpuPreference::HighPerformance);
    }

    #[test]
    fn default_config_allows_fallback() {
        let cfg = EngineConfig::default();
        assert!(cfg.allow_software_fallback);
        assert_eq!(cfg.gpu_preference, GpuPreference::HighPerformance);
    }
}
