// Generic texture upload strategy
//
// Works on any device. The pipeline is asked to convert everything to
// RGBx, and frames are copied into an Rgba8Unorm texture. The texture
// is reallocated only when the frame layout changed; otherwise the new
// frame is written into the existing allocation.

use gstreamer_video as gst_video;
use gstreamer_video::VideoFrameExt;
use std::sync::atomic::{AtomicBool, Ordering};

use super::upload::{MaterialTexture, TextureUpload, UploadError};
use super::FrameLayout;

const SUPPORTED_FORMATS: &[gst_video::VideoFormat] = &[gst_video::VideoFormat::Rgbx];

pub struct GenericUpload {
    video_info_changed: AtomicBool,
}

impl GenericUpload {
    pub fn new() -> Self {
        Self {
            video_info_changed: AtomicBool::new(false),
        }
    }

    fn needs_realloc(&self, layout: &FrameLayout, slot: &Option<MaterialTexture>) -> bool {
        let Some(existing) = slot else {
            return true;
        };
        if self.video_info_changed.load(Ordering::SeqCst) {
            return true;
        }
        let texture = existing.texture();
        texture.width() != layout.total_width || texture.height() != layout.total_height
    }
}

impl Default for GenericUpload {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureUpload for GenericUpload {
    fn supported_formats(&self) -> &[gst_video::VideoFormat] {
        SUPPORTED_FORMATS
    }

    fn set_video_info_changed(&self, changed: bool) {
        self.video_info_changed.store(changed, Ordering::SeqCst);
    }

    fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &FrameLayout,
        frame: &gst_video::VideoFrameRef<&gstreamer::BufferRef>,
        slot: &mut Option<MaterialTexture>,
    ) -> Result<bool, UploadError> {
        debug_assert_eq!(layout.format, gst_video::VideoFormat::Rgbx);

        let mut replaced = false;
        if self.needs_realloc(layout, slot) {
            log::debug!(
                "Allocating {}x{} frame texture",
                layout.total_width,
                layout.total_height
            );
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Video Frame Texture"),
                size: wgpu::Extent3d {
                    width: layout.total_width,
                    height: layout.total_height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            *slot = Some(MaterialTexture::Rgb { texture, view });
            self.video_info_changed.store(false, Ordering::SeqCst);
            replaced = true;
        }

        let Some(MaterialTexture::Rgb { texture, .. }) = slot else {
            unreachable!("slot was just (re)allocated as an RGB texture");
        };

        let data = frame
            .plane_data(0)
            .map_err(|e| UploadError::PlaneData(e.to_string()))?;
        let stride = frame.plane_stride()[0] as u32;

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(stride),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: layout.total_width,
                height: layout.total_height,
                depth_or_array_layers: 1,
            },
        );

        Ok(replaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_rgbx_supported() {
        let upload = GenericUpload::new();
        assert_eq!(
            upload.supported_formats(),
            &[gst_video::VideoFormat::Rgbx]
        );
    }

    #[test]
    fn test_empty_slot_needs_realloc() {
        let upload = GenericUpload::new();
        let layout = FrameLayout {
            format: gst_video::VideoFormat::Rgbx,
            frame_width: 320,
            frame_height: 240,
            total_width: 320,
            total_height: 240,
        };
        assert!(upload.needs_realloc(&layout, &None));
    }
}
