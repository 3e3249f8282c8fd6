// Scene module
//
// Meshes, transforms, and the per-item renderers that put video frames
// onto them. Items render into offscreen targets only when dirty; the
// compositor blends those targets onto the window surface each frame.

pub mod arcball;
pub mod compositor;
pub mod item;
pub mod mesh;
pub mod resources;
pub mod transform;

pub use arcball::Arcball;
pub use compositor::Compositor;
pub use item::{ItemRenderer, VideoItem};
pub use mesh::{Mesh, MeshData, Vertex};
pub use resources::RenderResources;
pub use transform::{Camera, Transform};
