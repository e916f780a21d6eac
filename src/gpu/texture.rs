// ============================================================================
// SURFACES — source texture, ping-pong render targets, output surface
// ============================================================================

use std::sync::Arc;

use image::RgbaImage;

use super::aligned_bytes_per_row;
use super::program::TARGET_FORMAT;
use crate::error::{FilterError, FilterResult};

fn create_rgba_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    usage: wgpu::TextureUsages,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TARGET_FORMAT,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

// ============================================================================
// SOURCE TEXTURE
// ============================================================================

/// The input image on the GPU.  Kept across `apply()` calls and rewritten in
/// place while the size is unchanged.
pub struct SourceTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl SourceTexture {
    /// Allocate and perform the full upload.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        let (texture, view) = create_rgba_texture(
            device,
            "source_texture",
            width,
            height,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        let source = Self { texture, view, width, height };
        source.update(queue, image);
        source
    }

    /// In-place sub-image update.  `image` must match the texture size.
    pub fn update(&self, queue: &wgpu::Queue, image: &RgbaImage) {
        debug_assert_eq!(image.dimensions(), (self.width, self.height));

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            image.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * self.width),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

// ============================================================================
// RENDER TARGET
// ============================================================================

pub struct RenderTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl RenderTarget {
    pub fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let (texture, view) = create_rgba_texture(
            device,
            label,
            width,
            height,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        );
        Self { texture, view, width, height }
    }
}

// ============================================================================
// OUTPUT SURFACE
// ============================================================================

/// Where the last pass of every chain lands.  Holds its own device/queue
/// handles so callers can read it back without the engine.
pub struct OutputSurface {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl OutputSurface {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, width: u32, height: u32) -> Self {
        let (texture, view) = create_rgba_texture(
            &device,
            "output_surface",
            width,
            height,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );
        Self { texture, view, width, height, device, queue }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copy the surface into a staging buffer and block until it is mapped.
    pub fn read_pixels(&self) -> FilterResult<RgbaImage> {
        let (width, height) = (self.width, self.height);
        let bytes_per_row = aligned_bytes_per_row(width);

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("output_readback"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("output_readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(FilterError::Readback(format!("map error: {:?}", e))),
            Err(e) => return Err(FilterError::Readback(format!("channel error: {:?}", e))),
        }

        let mapped = slice.get_mapped_range();
        let actual_row = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(actual_row * height as usize);
        for y in 0..height as usize {
            let start = y * bytes_per_row as usize;
            pixels.extend_from_slice(&mapped[start..start + actual_row]);
        }
        drop(mapped);
        staging.unmap();

        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| FilterError::Readback("pixel buffer size mismatch".to_string()))
    }
}
