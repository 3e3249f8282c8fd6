// Direct texture upload strategy
//
// Uploads frames in the decoder's native layout, skipping the CPU-side
// conversion to RGBx that the generic strategy forces. In particular
// NV12 frames go up as a real two-plane NV12 texture and get converted
// to RGB in the fragment shader. Available only on devices that expose
// multi-planar texture support; probed once at startup.

use gstreamer_video as gst_video;
use gstreamer_video::VideoFrameExt;

use super::upload::{MaterialTexture, TextureUpload, UploadError};
use super::FrameLayout;

const SUPPORTED_FORMATS: &[gst_video::VideoFormat] = &[
    gst_video::VideoFormat::Nv12,
    gst_video::VideoFormat::Rgba,
    gst_video::VideoFormat::Bgra,
    gst_video::VideoFormat::Rgbx,
    gst_video::VideoFormat::Bgrx,
];

pub struct DirectUpload;

impl DirectUpload {
    /// Returns the strategy if the device can take NV12 textures, which
    /// is what this strategy exists for. `None` means the caller must
    /// fall back to the generic strategy.
    pub fn probe(device: &wgpu::Device) -> Option<Self> {
        if device
            .features()
            .contains(wgpu::Features::TEXTURE_FORMAT_NV12)
        {
            log::info!("Using direct texture uploads (native NV12 supported)");
            Some(Self)
        } else {
            log::info!("Device lacks NV12 texture support");
            None
        }
    }

    /// Texture format for a supported pixel format. The supported set
    /// is fixed and pinned onto the pipeline's sink caps, so any other
    /// format here is a logic error, not a runtime condition.
    fn texture_format(format: gst_video::VideoFormat) -> wgpu::TextureFormat {
        match format {
            gst_video::VideoFormat::Nv12 => wgpu::TextureFormat::NV12,
            gst_video::VideoFormat::Rgba | gst_video::VideoFormat::Rgbx => {
                wgpu::TextureFormat::Rgba8Unorm
            }
            gst_video::VideoFormat::Bgra | gst_video::VideoFormat::Bgrx => {
                wgpu::TextureFormat::Bgra8Unorm
            }
            other => unreachable!("format {:?} is never negotiated", other),
        }
    }
}

impl TextureUpload for DirectUpload {
    fn supported_formats(&self) -> &[gst_video::VideoFormat] {
        SUPPORTED_FORMATS
    }

    /// No-op: this strategy creates a fresh texture for every frame, so
    /// there is no stale allocation a layout change could invalidate.
    fn set_video_info_changed(&self, _changed: bool) {}

    fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &FrameLayout,
        frame: &gst_video::VideoFrameRef<&gstreamer::BufferRef>,
        slot: &mut Option<MaterialTexture>,
    ) -> Result<bool, UploadError> {
        let format = Self::texture_format(layout.format);

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
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        *slot = Some(if format == wgpu::TextureFormat::NV12 {
            upload_nv12(queue, &texture, layout, frame)?;

            let y_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Luma Plane View"),
                format: Some(wgpu::TextureFormat::R8Unorm),
                aspect: wgpu::TextureAspect::Plane0,
                ..Default::default()
            });
            let uv_view = texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("Chroma Plane View"),
                format: Some(wgpu::TextureFormat::Rg8Unorm),
                aspect: wgpu::TextureAspect::Plane1,
                ..Default::default()
            });
            MaterialTexture::Nv12 {
                texture,
                y_view,
                uv_view,
            }
        } else {
            upload_packed(queue, &texture, layout, frame)?;

            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            MaterialTexture::Rgb { texture, view }
        });

        // A fresh texture every frame.
        Ok(true)
    }
}

fn upload_packed(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    layout: &FrameLayout,
    frame: &gst_video::VideoFrameRef<&gstreamer::BufferRef>,
) -> Result<(), UploadError> {
    let data = frame
        .plane_data(0)
        .map_err(|e| UploadError::PlaneData(e.to_string()))?;

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
            bytes_per_row: Some(frame.plane_stride()[0] as u32),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: layout.total_width,
            height: layout.total_height,
            depth_or_array_layers: 1,
        },
    );

    Ok(())
}

fn upload_nv12(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    layout: &FrameLayout,
    frame: &gst_video::VideoFrameRef<&gstreamer::BufferRef>,
) -> Result<(), UploadError> {
    let y_data = frame
        .plane_data(0)
        .map_err(|e| UploadError::PlaneData(e.to_string()))?;

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::Plane0,
        },
        y_data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(frame.plane_stride()[0] as u32),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: layout.total_width,
            height: layout.total_height,
            depth_or_array_layers: 1,
        },
    );

    let uv_data = frame
        .plane_data(1)
        .map_err(|e| UploadError::PlaneData(e.to_string()))?;

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::Plane1,
        },
        uv_data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(frame.plane_stride()[1] as u32),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: layout.total_width / 2,
            height: layout.total_height / 2,
            depth_or_array_layers: 1,
        },
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_format_mapping() {
        assert_eq!(
            DirectUpload::texture_format(gst_video::VideoFormat::Nv12),
            wgpu::TextureFormat::NV12
        );
        assert_eq!(
            DirectUpload::texture_format(gst_video::VideoFormat::Rgba),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            DirectUpload::texture_format(gst_video::VideoFormat::Rgbx),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(
            DirectUpload::texture_format(gst_video::VideoFormat::Bgra),
            wgpu::TextureFormat::Bgra8Unorm
        );
        assert_eq!(
            DirectUpload::texture_format(gst_video::VideoFormat::Bgrx),
            wgpu::TextureFormat::Bgra8Unorm
        );
    }

    #[test]
    #[should_panic]
    fn test_unsupported_format_is_a_logic_error() {
        DirectUpload::texture_format(gst_video::VideoFormat::I420);
    }

    #[test]
    fn test_every_advertised_format_maps() {
        for format in SUPPORTED_FORMATS {
            // Must not panic.
            let _ = DirectUpload::texture_format(*format);
        }
    }
}
