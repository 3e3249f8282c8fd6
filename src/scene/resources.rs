// Shared GPU resources for one rendering context

use std::collections::HashMap;

use crate::material::VideoMaterialProvider;

use super::mesh::{mesh_data_for_type, Mesh};

/// Resources shared by all scene items on the same GPU device: the
/// material provider and one GPU mesh per mesh type.
///
/// Lives exactly as long as the GPU context. Dropping it releases every
/// mesh buffer, pipeline and sampler with it, so it must be torn down
/// before the device goes away.
pub struct RenderResources {
    provider: VideoMaterialProvider,
    meshes: HashMap<String, Mesh>,
}

impl RenderResources {
    pub fn new(device: &wgpu::Device) -> Self {
        log::debug!("Setting up shared render resources");
        Self {
            provider: VideoMaterialProvider::new(device),
            meshes: HashMap::new(),
        }
    }

    pub fn provider(&self) -> &VideoMaterialProvider {
        &self.provider
    }

    /// Creates the GPU mesh for `mesh_type` on first use. Unknown types
    /// yield a mesh without contents, which items skip drawing.
    pub fn ensure_mesh(&mut self, device: &wgpu::Device, mesh_type: &str) {
        self.meshes.entry(mesh_type.to_string()).or_insert_with(|| {
            let mut mesh = Mesh::new();
            match mesh_data_for_type(mesh_type) {
                Some(data) => mesh.set_contents(device, &data),
                None => log::warn!("Unknown mesh type \"{}\"", mesh_type),
            }
            mesh
        });
    }

    pub fn mesh(&self, mesh_type: &str) -> Option<&Mesh> {
        self.meshes.get(mesh_type)
    }
}
