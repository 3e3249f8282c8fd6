// Texture upload strategy seam

use gstreamer_video as gst_video;
use thiserror::Error;

use super::FrameLayout;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to map video frame: {0}")]
    Map(String),
    #[error("Frame has no usable plane data: {0}")]
    PlaneData(String),
}

/// GPU-side storage of one video frame.
///
/// Packed RGB formats need a single texture; NV12 keeps its two planes
/// in one texture with separate luma and chroma views for the shader.
pub enum MaterialTexture {
    Rgb {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    Nv12 {
        texture: wgpu::Texture,
        y_view: wgpu::TextureView,
        uv_view: wgpu::TextureView,
    },
}

impl MaterialTexture {
    pub fn texture(&self) -> &wgpu::Texture {
        match self {
            MaterialTexture::Rgb { texture, .. } => texture,
            MaterialTexture::Nv12 { texture, .. } => texture,
        }
    }
}

/// A way of getting decoded frames into GPU textures.
///
/// Exactly one implementation is active per device, shared by all
/// materials. `upload` is called once per new frame with the frame
/// still held by the media pipeline; implementations must not keep
/// references to the mapped data past the call.
pub trait TextureUpload: Send + Sync {
    /// Pixel formats this strategy accepts. The player's sink caps are
    /// restricted to exactly this set, so `upload` never sees anything
    /// else.
    fn supported_formats(&self) -> &[gst_video::VideoFormat];

    /// Tells the strategy that the next upload carries a new frame
    /// layout, so size-dependent GPU resources must be recreated rather
    /// than reused.
    fn set_video_info_changed(&self, changed: bool);

    /// Uploads one frame. `slot` holds the texture of the previous
    /// frame (if any); the strategy may write into it in place or
    /// replace it. Returns true if the texture object was replaced,
    /// meaning bindings referencing it must be rebuilt.
    fn upload(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &FrameLayout,
        frame: &gst_video::VideoFrameRef<&gstreamer::BufferRef>,
        slot: &mut Option<MaterialTexture>,
    ) -> Result<bool, UploadError>;
}
