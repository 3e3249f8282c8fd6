// Video material module
//
// Turns decoded video frames into GPU textures and the uniform data the
// mesh shader needs. Two upload strategies exist: a generic one that
// runs everywhere and converts everything to RGBx on the CPU side, and
// a direct one that uploads the decoder's native layout (including
// NV12) when the GPU supports it. The provider picks one at startup.

mod direct;
mod generic;
mod material;
mod provider;
mod upload;

pub use direct::DirectUpload;
pub use generic::GenericUpload;
pub use material::{CropRect, VideoMaterial};
pub use provider::{MaterialUniforms, VideoMaterialProvider};
pub use provider::{TARGET_COLOR_FORMAT, TARGET_DEPTH_FORMAT};
pub use upload::{MaterialTexture, TextureUpload, UploadError};

use gstreamer_video as gst_video;

/// Pixel format and geometry of incoming frames.
///
/// Decoders pad frame rows out to alignment boundaries, so the memory a
/// frame occupies is usually wider (and with planar formats sometimes
/// taller) than the visible picture. Texture uploads cover the total
/// size; the shader then samples only the frame-sized region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub format: gst_video::VideoFormat,
    /// Visible picture size in pixels.
    pub frame_width: u32,
    pub frame_height: u32,
    /// Allocated size in pixels, padding included.
    pub total_width: u32,
    pub total_height: u32,
}

impl FrameLayout {
    /// Derives the layout from negotiated video info.
    ///
    /// The total width comes from the first plane's row stride divided
    /// by its pixel stride. The total height of a multi-planar frame is
    /// the span between the first two plane offsets divided by the row
    /// stride; single-plane frames have no padding rows to account for.
    pub fn from_video_info(info: &gst_video::VideoInfo) -> Self {
        let stride = info.stride()[0] as u32;
        let pixel_stride = info.format_info().pixel_stride()[0] as u32;

        let total_width = if pixel_stride > 0 {
            stride / pixel_stride
        } else {
            info.width()
        };

        let total_height = if info.n_planes() > 1 && stride > 0 {
            let offset0 = info.offset()[0] as u32;
            let offset1 = info.offset()[1] as u32;
            (offset1 - offset0) / stride
        } else {
            info.height()
        };

        Self {
            format: info.format(),
            frame_width: info.width(),
            frame_height: info.height(),
            total_width,
            total_height,
        }
    }

    /// True if a texture sized for `self` can be reused for `other`
    /// without reallocation.
    pub fn same_allocation(&self, other: &FrameLayout) -> bool {
        self.format == other.format
            && self.total_width == other.total_width
            && self.total_height == other.total_height
    }
}

/// Computes the crop rectangle in texture coordinates.
///
/// `crop` is in percent of the visible frame. The result additionally
/// compensates for row/plane padding: since the texture covers the
/// total allocated size, the visible frame only spans
/// frame_size/total_size of the 0..1 texture range.
pub fn crop_uniform(crop: &CropRect, layout: &FrameLayout) -> [f32; 4] {
    let scale_w = layout.frame_width as f32 / layout.total_width.max(1) as f32;
    let scale_h = layout.frame_height as f32 / layout.total_height.max(1) as f32;

    let x = crop.x as f32 / 100.0;
    let y = crop.y as f32 / 100.0;
    let w = (crop.width as f32 / 100.0).min(1.0 - x);
    let h = (crop.height as f32 / 100.0).min(1.0 - y);

    [x * scale_w, y * scale_h, w * scale_w, h * scale_h]
}

/// 2x2 rotation matrix (column major) used to spin texture coordinates
/// about the crop rectangle's center.
pub fn rotation_matrix(degrees: f32) -> [[f32; 2]; 2] {
    let (s, c) = degrees.to_radians().sin_cos();
    [[c, s], [-s, c]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use gstreamer_video as gst_video;

    fn layout(
        frame: (u32, u32),
        total: (u32, u32),
    ) -> FrameLayout {
        FrameLayout {
            format: gst_video::VideoFormat::Rgbx,
            frame_width: frame.0,
            frame_height: frame.1,
            total_width: total.0,
            total_height: total.1,
        }
    }

    #[test]
    fn test_layout_from_unpadded_rgbx_info() {
        gstreamer::init().unwrap();

        let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgbx, 320, 240)
            .build()
            .unwrap();
        let layout = FrameLayout::from_video_info(&info);

        assert_eq!(layout.frame_width, 320);
        assert_eq!(layout.frame_height, 240);
        assert_eq!(layout.total_width, 320);
        assert_eq!(layout.total_height, 240);
    }

    #[test]
    fn test_layout_from_row_padded_info() {
        gstreamer::init().unwrap();

        // 509 visible pixels, rows padded out to 512 (2048 bytes at 4
        // bytes per pixel).
        let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgbx, 509, 240)
            .stride(&[2048])
            .build()
            .unwrap();
        let layout = FrameLayout::from_video_info(&info);

        assert_eq!(layout.frame_width, 509);
        assert_eq!(layout.total_width, 512);
        assert_eq!(layout.total_height, 240);
    }

    #[test]
    fn test_layout_from_plane_padded_nv12_info() {
        gstreamer::init().unwrap();

        // Luma plane padded from 240 to 256 rows before the chroma
        // plane starts.
        let info = gst_video::VideoInfo::builder(gst_video::VideoFormat::Nv12, 320, 240)
            .stride(&[320, 320])
            .offset(&[0, 320 * 256])
            .build()
            .unwrap();
        let layout = FrameLayout::from_video_info(&info);

        assert_eq!(layout.frame_height, 240);
        assert_eq!(layout.total_height, 256);
        assert_eq!(layout.total_width, 320);
    }

    #[test]
    fn test_same_allocation_ignores_frame_size() {
        let a = layout((509, 240), (512, 240));
        let b = layout((510, 240), (512, 240));
        assert!(a.same_allocation(&b));
    }

    #[test]
    fn test_same_allocation_rejects_total_size_change() {
        let a = layout((320, 240), (320, 240));
        let b = layout((640, 480), (640, 480));
        assert!(!a.same_allocation(&b));
    }

    #[test]
    fn test_crop_uniform_full_frame_unpadded() {
        let crop = CropRect::default();
        let uniform = crop_uniform(&crop, &layout((320, 240), (320, 240)));
        assert_eq!(uniform, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_crop_uniform_compensates_row_padding() {
        // Full crop of a 509-wide frame in a 512-wide allocation must
        // stop sampling at 509/512, not at the padding bytes.
        let crop = CropRect::default();
        let uniform = crop_uniform(&crop, &layout((509, 240), (512, 240)));
        assert!((uniform[2] - 509.0 / 512.0).abs() < 1e-6);
        assert!((uniform[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_crop_uniform_offsets_scale_by_matching_axis() {
        let crop = CropRect {
            x: 10,
            y: 20,
            width: 50,
            height: 50,
        };
        let uniform = crop_uniform(&crop, &layout((509, 240), (512, 256)));

        let scale_w = 509.0 / 512.0;
        let scale_h = 240.0 / 256.0;
        assert!((uniform[0] - 0.1 * scale_w).abs() < 1e-6);
        assert!((uniform[1] - 0.2 * scale_h).abs() < 1e-6);
        assert!((uniform[2] - 0.5 * scale_w).abs() < 1e-6);
        assert!((uniform[3] - 0.5 * scale_h).abs() < 1e-6);
    }

    #[test]
    fn test_crop_uniform_clamps_overhanging_rect() {
        // x=60 with width=80 runs off the right edge; the width clamps
        // to the remaining 40%.
        let crop = CropRect {
            x: 60,
            y: 0,
            width: 80,
            height: 100,
        };
        let uniform = crop_uniform(&crop, &layout((100, 100), (100, 100)));
        assert!((uniform[2] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_matrix_zero_is_identity() {
        let m = rotation_matrix(0.0);
        assert!((m[0][0] - 1.0).abs() < 1e-6);
        assert!(m[0][1].abs() < 1e-6);
        assert!(m[1][0].abs() < 1e-6);
        assert!((m[1][1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_matrix_quarter_turn() {
        let m = rotation_matrix(90.0);
        assert!(m[0][0].abs() < 1e-6);
        assert!((m[0][1] - 1.0).abs() < 1e-6);
        assert!((m[1][0] + 1.0).abs() < 1e-6);
        assert!(m[1][1].abs() < 1e-6);
    }
}
