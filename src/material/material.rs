// Per-object video material state

use gstreamer_video as gst_video;

use super::upload::MaterialTexture;
use super::{crop_uniform, FrameLayout};

/// Crop rectangle in percent of the visible frame, 0..=100 per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for CropRect {
    /// The full frame.
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        }
    }
}

impl CropRect {
    fn clamped(self) -> Self {
        Self {
            x: self.x.min(100),
            y: self.y.min(100),
            width: self.width.min(100),
            height: self.height.min(100),
        }
    }
}

/// Everything needed to texture one mesh with video: the current frame
/// texture, the frame layout it was uploaded with, and the crop and
/// rotation applied when sampling it.
///
/// Materials are owned by scene items; uploads into them go through the
/// provider's active strategy.
pub struct VideoMaterial {
    pub(crate) texture: Option<MaterialTexture>,
    pub(crate) uniform_buffer: wgpu::Buffer,
    pub(crate) bind_group: Option<wgpu::BindGroup>,
    layout: Option<FrameLayout>,
    crop: CropRect,
    rotation: f32,
}

impl VideoMaterial {
    pub(crate) fn new(uniform_buffer: wgpu::Buffer) -> Self {
        Self {
            texture: None,
            uniform_buffer,
            bind_group: None,
            layout: None,
            crop: CropRect::default(),
            rotation: 0.0,
        }
    }

    /// Adopts the layout of newly negotiated video info. Existing
    /// texture contents stay valid until the next upload.
    pub fn set_video_info(&mut self, info: &gst_video::VideoInfo) {
        self.layout = Some(FrameLayout::from_video_info(info));
    }

    pub(crate) fn update_layout(&mut self, layout: FrameLayout) {
        self.layout = Some(layout);
    }

    pub fn layout(&self) -> Option<&FrameLayout> {
        self.layout.as_ref()
    }

    /// True once a frame has been uploaded and can be drawn.
    pub fn has_frame(&self) -> bool {
        self.texture.is_some()
    }

    pub fn set_crop(&mut self, crop: CropRect) {
        self.crop = crop.clamped();
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    /// Texture rotation in degrees, applied about the crop center.
    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = degrees;
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Crop rectangle in texture coordinates, padding-compensated.
    /// Covers the full visible frame while no layout is known.
    pub(crate) fn crop_vec(&self) -> [f32; 4] {
        match &self.layout {
            Some(layout) => crop_uniform(&self.crop, layout),
            None => [0.0, 0.0, 1.0, 1.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_crop_is_full_frame() {
        let crop = CropRect::default();
        assert_eq!(
            crop,
            CropRect {
                x: 0,
                y: 0,
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn test_crop_fields_clamp_to_100() {
        let crop = CropRect {
            x: 150,
            y: 99,
            width: 300,
            height: 100,
        }
        .clamped();
        assert_eq!(crop.x, 100);
        assert_eq!(crop.y, 99);
        assert_eq!(crop.width, 100);
        assert_eq!(crop.height, 100);
    }
}
