use crate::distortion::domain::distortion_state::DistortionState;
use crate::distortion::domain::frame_distorter::{FrameDistorter, RenderError};
use crate::shared::frame::Frame;

use super::gpu_context::{GpuBulgeParams, GpuContext, TARGET_FORMAT};

/// Per-size GPU resources, rebuilt when the frame dimensions change.
struct RenderTarget {
    width: u32,
    height: u32,
    source: wgpu::Texture,
    output: wgpu::Texture,
    output_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    padded_bytes_per_row: u32,
    bind_group: wgpu::BindGroup,
}

/// GPU bulge renderer: uploads the frame as a texture, draws one quad
/// through the bulge shader into an offscreen target, reads it back.
pub struct GpuBulgeDistorter {
    ctx: GpuContext,
    radius: f32,
    target: Option<RenderTarget>,
}

impl GpuBulgeDistorter {
    pub fn new(ctx: GpuContext, radius: f32) -> Self {
        Self {
            ctx,
            radius,
            target: None,
        }
    }

    fn ensure_target(&mut self, width: u32, height: u32) {
        let stale = self
            .target
            .as_ref()
            .map_or(true, |t| t.width != width || t.height != height);
        if stale {
            log::debug!("Allocating {width}x{height} render target");
            self.target = Some(create_target(&self.ctx, width, height));
        }
    }
}

fn create_target(ctx: &GpuContext, width: u32, height: u32) -> RenderTarget {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = |label, usage| {
        ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage,
            view_formats: &[],
        })
    };
    let source = texture(
        "bulge-source",
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
    );
    let output = texture(
        "bulge-output",
        wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
    );
    let source_view = source.create_view(&wgpu::TextureViewDescriptor::default());
    let output_view = output.create_view(&wgpu::TextureViewDescriptor::default());

    let padded_bytes_per_row = padded_row_bytes(width);
    let readback = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("bulge-readback"),
        size: padded_bytes_per_row as u64 * height as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("bulge-bind-group"),
        layout: &ctx.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: ctx.params.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&source_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&ctx.sampler),
            },
        ],
    });

    RenderTarget {
        width,
        height,
        source,
        output,
        output_view,
        readback,
        padded_bytes_per_row,
        bind_group,
    }
}

fn check_size(width: u32, height: u32, max: u32) -> Result<(), RenderError> {
    if width == 0 || height == 0 {
        return Err(RenderError::EmptyFrame);
    }
    if width > max || height > max {
        return Err(RenderError::FrameTooLarge { width, height, max });
    }
    Ok(())
}

/// Texture-to-buffer copies need rows aligned to 256 bytes.
fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

fn pack_params(state: &DistortionState, radius: f32) -> GpuBulgeParams {
    let mut params = GpuBulgeParams {
        intensity: state.intensity(),
        radius,
        ..Default::default()
    };
    for (slot, center) in params.centers.iter_mut().zip(state.centers()) {
        *slot = [center.x, center.y, 0.0, 0.0];
    }
    params
}

impl FrameDistorter for GpuBulgeDistorter {
    fn distort(
        &mut self,
        frame: &Frame,
        state: &DistortionState,
    ) -> Result<Frame, Box<dyn std::error::Error>> {
        if !matches!(frame.channels(), 3 | 4) {
            return Err(RenderError::UnsupportedChannels(frame.channels()).into());
        }
        let (width, height) = (frame.width(), frame.height());
        check_size(width, height, self.ctx.device.limits().max_texture_dimension_2d)?;

        let params = pack_params(state, self.radius);
        let rgba = frame.to_rgba();
        self.ensure_target(width, height);
        let ctx = &self.ctx;
        let Some(target) = self.target.as_ref() else {
            return Err(RenderError::EmptyFrame.into());
        };

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        ctx.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &target.source,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );
        ctx.queue.write_buffer(&ctx.params, 0, bytemuck::bytes_of(&params));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bulge-encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("bulge-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.output_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&ctx.pipeline);
            pass.set_bind_group(0, &target.bind_group, &[]);
            pass.draw(0..4, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.output,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &target.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(target.padded_bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            size,
        );
        ctx.queue.submit(Some(encoder.finish()));

        // Read back results
        let slice = target.readback.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| RenderError::BufferMap(e.to_string()))?
            .map_err(|e| RenderError::BufferMap(e.to_string()))?;

        let row_bytes = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(target.padded_bytes_per_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        target.readback.unmap();

        if pixels.len() != row_bytes * height as usize {
            return Err(RenderError::ReadbackSize {
                expected: row_bytes * height as usize,
                actual: pixels.len(),
            }
            .into());
        }

        Ok(Frame::new(pixels, width, height, 4, frame.index()).with_timestamp(frame.timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detected_face::NormalizedPoint;
    use crate::distortion::domain::distortion_state::EFFECT_RADIUS;
    use crate::distortion::infrastructure::cpu_bulge_distorter::CpuBulgeDistorter;

    fn gradient_frame(w: u32, h: u32) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                data.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 200]);
            }
        }
        Frame::new(data, w, h, 3, 0)
    }

    fn max_channel_diff(a: &[u8], b: &[u8]) -> u8 {
        a.iter().zip(b).map(|(x, y)| x.abs_diff(*y)).max().unwrap_or(0)
    }

    #[test]
    fn test_padded_row_bytes() {
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
        assert_eq!(padded_row_bytes(1), 256);
    }

    #[test]
    fn test_check_size_rejects_oversized_frames() {
        assert!(check_size(2048, 2048, 2048).is_ok());
        assert!(matches!(
            check_size(3840, 2160, 2048),
            Err(RenderError::FrameTooLarge { width: 3840, height: 2160, max: 2048 })
        ));
        assert!(matches!(check_size(1, 4096, 2048), Err(RenderError::FrameTooLarge { .. })));
        assert!(matches!(check_size(0, 10, 2048), Err(RenderError::EmptyFrame)));
    }

    #[test]
    fn test_gpu_frame_over_texture_limit_is_error() {
        let Some(ctx) = GpuContext::new() else {
            return;
        };
        let max = ctx.device.limits().max_texture_dimension_2d;
        let frame = Frame::new(vec![0u8; (max as usize + 1) * 3], max + 1, 1, 3, 0);
        let mut distorter = GpuBulgeDistorter::new(ctx, EFFECT_RADIUS);
        assert!(distorter.distort(&frame, &DistortionState::default()).is_err());
        // The distorter stays usable after rejecting a frame
        assert!(distorter.distort(&gradient_frame(8, 8), &DistortionState::default()).is_ok());
    }

    #[test]
    fn test_pack_params_keeps_empty_marker() {
        let state = DistortionState::new([NormalizedPoint::new(0.3, 0.6), NormalizedPoint::ORIGIN], 0.4);
        let params = pack_params(&state, EFFECT_RADIUS);
        assert_eq!(params.centers[0], [0.3, 0.6, 0.0, 0.0]);
        assert_eq!(params.centers[1], [0.0; 4]);
        assert_eq!(params.intensity, 0.4);
        assert_eq!(params.radius, EFFECT_RADIUS);
    }

    #[test]
    fn test_gpu_passthrough_without_faces() {
        let Some(ctx) = GpuContext::new() else {
            return;
        };
        let frame = gradient_frame(48, 40);
        let out = GpuBulgeDistorter::new(ctx, EFFECT_RADIUS)
            .distort(&frame, &DistortionState::default())
            .unwrap();
        assert!(max_channel_diff(out.data(), &frame.to_rgba()) <= 1);
    }

    #[test]
    fn test_gpu_matches_cpu_reference() {
        let Some(ctx) = GpuContext::new() else {
            return;
        };
        let frame = gradient_frame(60, 50);
        let state = DistortionState::new(
            [NormalizedPoint::new(0.4, 0.5), NormalizedPoint::new(0.7, 0.4)],
            0.6,
        );
        let gpu = GpuBulgeDistorter::new(ctx, EFFECT_RADIUS).distort(&frame, &state).unwrap();
        let cpu = CpuBulgeDistorter::new(EFFECT_RADIUS).distort(&frame, &state).unwrap();
        assert_eq!(gpu.data().len(), cpu.data().len());
        assert!(max_channel_diff(gpu.data(), cpu.data()) <= 3);
    }

    #[test]
    fn test_gpu_target_follows_frame_size() {
        let Some(ctx) = GpuContext::new() else {
            return;
        };
        let mut distorter = GpuBulgeDistorter::new(ctx, EFFECT_RADIUS);
        let small = distorter.distort(&gradient_frame(16, 16), &DistortionState::default()).unwrap();
        let large = distorter.distort(&gradient_frame(40, 24), &DistortionState::default()).unwrap();
        assert_eq!((small.width(), small.height()), (16, 16));
        assert_eq!((large.width(), large.height()), (40, 24));
        assert_eq!(large.data().len(), 40 * 24 * 4);
    }
}
