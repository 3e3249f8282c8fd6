// Video object item: a mesh with video playing on it
//
// Each item renders into its own offscreen target, and only when
// something actually changed: a new video frame arrived, the transform
// or camera moved, the mesh type switched, or crop/rotation were
// adjusted. The compositor then blits the per-item targets to the
// window every frame, so an unchanged item costs no re-render.

use glam::Mat4;
use gstreamer_video as gst_video;

use crate::material::{CropRect, VideoMaterial, TARGET_COLOR_FORMAT, TARGET_DEPTH_FORMAT};
use crate::player::Player;

use super::resources::RenderResources;
use super::transform::{normal_matrix, Camera, Transform};

/// UI-facing state of one scene object. The render side picks changes
/// up during `ItemRenderer::synchronize`.
pub struct VideoItem {
    pub player: Player,
    pub transform: Transform,
    pub mesh_type: String,
    pub crop: CropRect,
    pub texture_rotation: f32,
}

impl VideoItem {
    pub fn new(player: Player, mesh_type: impl Into<String>) -> Self {
        Self {
            player,
            transform: Transform::default(),
            mesh_type: mesh_type.into(),
            crop: CropRect::default(),
            texture_rotation: 0.0,
        }
    }
}

/// Change tracking between the UI state and the rendered state.
///
/// `must_render` latches: any observed change sets it, and only a
/// completed render clears it. `first_render` guarantees the target is
/// cleared once even if nothing is ever drawn.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncState {
    modelviewproj: Mat4,
    mesh_type: Option<String>,
    crop: CropRect,
    rotation: f32,
    must_render: bool,
    first_render: bool,
}

impl SyncState {
    pub(crate) fn new() -> Self {
        Self {
            modelviewproj: Mat4::IDENTITY,
            mesh_type: None,
            crop: CropRect::default(),
            rotation: 0.0,
            must_render: true,
            first_render: true,
        }
    }

    /// Records the combined matrix; a change forces a re-render.
    pub(crate) fn sync_matrices(&mut self, modelviewproj: Mat4) {
        if self.modelviewproj != modelviewproj {
            self.modelviewproj = modelviewproj;
            self.must_render = true;
        }
    }

    /// Returns true if the mesh type changed, so the caller re-resolves
    /// its mesh.
    pub(crate) fn sync_mesh_type(&mut self, mesh_type: &str) -> bool {
        if self.mesh_type.as_deref() != Some(mesh_type) {
            self.mesh_type = Some(mesh_type.to_string());
            self.must_render = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn sync_crop(&mut self, crop: CropRect) -> bool {
        if self.crop != crop {
            self.crop = crop;
            self.must_render = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn sync_rotation(&mut self, rotation: f32) -> bool {
        if self.rotation != rotation {
            self.rotation = rotation;
            self.must_render = true;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.must_render = true;
    }

    pub(crate) fn must_render(&self) -> bool {
        self.must_render
    }

    /// True exactly once, on the first render after creation.
    pub(crate) fn take_first_render(&mut self) -> bool {
        std::mem::take(&mut self.first_render)
    }

    pub(crate) fn rendered(&mut self) {
        self.must_render = false;
    }
}

struct RenderTarget {
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    size: (u32, u32),
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Item Color Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Item Depth Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            size: (width, height),
        }
    }
}

/// Renders one item's mesh with its current video frame into the item's
/// offscreen target.
pub struct ItemRenderer {
    material: VideoMaterial,
    video_info: Option<gst_video::VideoInfo>,
    sync: SyncState,
    modelview: Mat4,
    target: Option<RenderTarget>,
}

impl ItemRenderer {
    pub fn new(device: &wgpu::Device, resources: &RenderResources) -> Self {
        log::debug!("Created item renderer");
        Self {
            material: resources.provider().create_material(device),
            video_info: None,
            sync: SyncState::new(),
            modelview: Mat4::IDENTITY,
            target: None,
        }
    }

    /// (Re)creates the offscreen target. The old contents are lost, so
    /// the next render is forced.
    pub fn set_target_size(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        let size = (width.max(1), height.max(1));
        if self.target.as_ref().map(|t| t.size) == Some(size) {
            return;
        }
        self.target = Some(RenderTarget::new(device, size.0, size.1));
        self.sync.first_render = true;
        self.sync.mark_dirty();
    }

    /// The latest rendered output, for compositing. `None` until a
    /// target size was set.
    pub fn output(&self) -> Option<&wgpu::TextureView> {
        self.target.as_ref().map(|t| &t.color_view)
    }

    /// Picks up changes from the UI state. Cheap; call once per frame
    /// for every item.
    pub fn synchronize(&mut self, item: &VideoItem, camera: &Camera) {
        self.modelview = camera.view_matrix() * item.transform.matrix();
        self.sync
            .sync_matrices(camera.projection_matrix() * self.modelview);
        self.sync.sync_mesh_type(&item.mesh_type);
        if self.sync.sync_crop(item.crop) {
            self.material.set_crop(item.crop);
        }
        if self.sync.sync_rotation(item.texture_rotation) {
            self.material.set_rotation(item.texture_rotation);
        }
    }

    /// Re-renders the offscreen target if necessary. Pulls at most one
    /// pending video frame from the item's player.
    ///
    /// Returns true if the caller must schedule another render soon,
    /// e.g. because the mesh has no contents yet.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        resources: &mut RenderResources,
        player: &mut Player,
    ) -> bool {
        let Some(target) = &self.target else {
            return false;
        };

        // Clear the target once right away so stale memory is never
        // composited, video frame or not. Alpha 0 keeps the background
        // fully translucent.
        let mut cleared = false;
        if self.sync.take_first_render() {
            clear_target(encoder, target);
            cleared = true;
        }

        let mesh_type = match &self.sync.mesh_type {
            Some(mesh_type) => mesh_type.clone(),
            None => return false,
        };
        resources.ensure_mesh(device, &mesh_type);
        let has_mesh_contents = resources
            .mesh(&mesh_type)
            .is_some_and(|mesh| mesh.has_contents());
        if !has_mesh_contents {
            // Nothing to draw, but contents may appear later and no
            // other change will re-trigger rendering by itself.
            return true;
        }

        let video_sample = player.pull_video_sample();
        if let Some(sample) = video_sample.sample() {
            if video_sample.has_new_caps() {
                match sample.caps().map(gst_video::VideoInfo::from_caps) {
                    Some(Ok(info)) => {
                        log::debug!(
                            "New video info: {}x{} {:?}",
                            info.width(),
                            info.height(),
                            info.format()
                        );
                        self.material.set_video_info(&info);
                        resources.provider().set_video_info_changed(true);
                        self.video_info = Some(info);
                    }
                    Some(Err(e)) => {
                        log::error!("Ignoring video sample with unusable caps: {}", e)
                    }
                    None => log::warn!("Video sample carries no caps"),
                }
            }

            if let (Some(info), Some(buffer)) = (&self.video_info, sample.buffer()) {
                match resources
                    .provider()
                    .upload_frame(device, queue, &mut self.material, info, buffer)
                {
                    Ok(()) => self.sync.mark_dirty(),
                    Err(e) => log::error!("Frame upload failed: {}", e),
                }
            }
        }

        // Render only when a change demands it and a frame exists to
        // texture the mesh with.
        if !self.sync.must_render() || !self.material.has_frame() {
            return false;
        }

        let provider = resources.provider();
        provider.update_uniforms(
            queue,
            &self.material,
            self.sync.modelviewproj,
            normal_matrix(self.modelview),
        );

        let Some(bind_group) = &self.material.bind_group else {
            return false;
        };

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Item Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: if cleared {
                            wgpu::LoadOp::Load
                        } else {
                            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
                        },
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            pass.set_pipeline(provider.pipeline_for(&self.material));
            pass.set_bind_group(0, bind_group, &[]);
            if let Some(mesh) = resources.mesh(&mesh_type) {
                mesh.draw(&mut pass);
            }
        }

        self.sync.rendered();
        false
    }
}

fn clear_target(encoder: &mut wgpu::CommandEncoder, target: &RenderTarget) {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Item Clear Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &target.depth_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_new_state_renders_once_then_settles() {
        let mut state = SyncState::new();
        assert!(state.must_render());
        assert!(state.take_first_render());
        assert!(!state.take_first_render());

        state.rendered();
        assert!(!state.must_render());
    }

    #[test]
    fn test_repeated_sync_with_same_values_stays_clean() {
        let mut state = SyncState::new();
        let mvp = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));

        state.sync_matrices(mvp);
        state.sync_mesh_type("cube");
        state.sync_crop(CropRect::default());
        state.sync_rotation(45.0);
        state.rendered();

        state.sync_matrices(mvp);
        assert!(!state.sync_mesh_type("cube"));
        assert!(!state.sync_crop(CropRect::default()));
        assert!(!state.sync_rotation(45.0));
        assert!(!state.must_render());
    }

    #[test]
    fn test_each_change_dirties_independently() {
        let changes: &[fn(&mut SyncState)] = &[
            |s| s.sync_matrices(Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0))),
            |s| {
                s.sync_mesh_type("torus");
            },
            |s| {
                s.sync_crop(CropRect {
                    x: 10,
                    y: 10,
                    width: 80,
                    height: 80,
                });
            },
            |s| {
                s.sync_rotation(90.0);
            },
        ];

        for change in changes {
            let mut state = SyncState::new();
            state.sync_mesh_type("cube");
            state.rendered();

            change(&mut state);
            assert!(state.must_render());
        }
    }

    #[test]
    fn test_mesh_type_change_reported_once() {
        let mut state = SyncState::new();
        assert!(state.sync_mesh_type("cube"));
        assert!(!state.sync_mesh_type("cube"));
        assert!(state.sync_mesh_type("sphere"));
    }
}
