// Mesh data and GPU mesh buffers

use wgpu::util::DeviceExt;

/// Vertex layout shared by all meshes: position, normal, texture
/// coordinate. 32 bytes per vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &Self::ATTRIBUTES,
    };

    const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// CPU-side mesh contents, ready for buffer upload.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

/// Mesh data for a named mesh type, or `None` for unknown names.
pub fn mesh_data_for_type(mesh_type: &str) -> Option<MeshData> {
    match mesh_type {
        "quad" => Some(quad_mesh_data()),
        "cube" => Some(cube_mesh_data()),
        "sphere" => Some(sphere_mesh_data(1.0, 32, 32)),
        "torus" => Some(torus_mesh_data(0.75, 0.35, 32, 24)),
        _ => None,
    }
}

/// Double-sided unit quad in the XY plane. The back face repeats the
/// front face with flipped normals and U coordinates.
pub fn quad_mesh_data() -> MeshData {
    let vertices = vec![
        Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        Vertex::new([1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
        Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
        Vertex::new([1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
        Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 1.0]),
        Vertex::new([1.0, -1.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0]),
        Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0]),
        Vertex::new([1.0, 1.0, 0.0], [0.0, 0.0, -1.0], [0.0, 0.0]),
    ];
    let indices = vec![0, 1, 2, 2, 1, 3, 4, 6, 5, 5, 6, 7];
    MeshData { vertices, indices }
}

/// Unit cube with per-face vertices so each face gets full texture
/// coverage and a constant normal.
pub fn cube_mesh_data() -> MeshData {
    let vertices = vec![
        Vertex::new([1.0, -1.0, -1.0], [0.0, 0.0, -1.0], [0.0, 1.0]),
        Vertex::new([-1.0, -1.0, -1.0], [0.0, 0.0, -1.0], [1.0, 1.0]),
        Vertex::new([1.0, 1.0, -1.0], [0.0, 0.0, -1.0], [0.0, 0.0]),
        Vertex::new([-1.0, 1.0, -1.0], [0.0, 0.0, -1.0], [1.0, 0.0]),
        Vertex::new([-1.0, -1.0, 1.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
        Vertex::new([1.0, -1.0, 1.0], [0.0, 0.0, 1.0], [1.0, 1.0]),
        Vertex::new([-1.0, 1.0, 1.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
        Vertex::new([1.0, 1.0, 1.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
        Vertex::new([-1.0, -1.0, -1.0], [0.0, -1.0, 0.0], [1.0, 0.0]),
        Vertex::new([1.0, -1.0, -1.0], [0.0, -1.0, 0.0], [0.0, 0.0]),
        Vertex::new([-1.0, -1.0, 1.0], [0.0, -1.0, 0.0], [1.0, 1.0]),
        Vertex::new([1.0, -1.0, 1.0], [0.0, -1.0, 0.0], [0.0, 1.0]),
        Vertex::new([1.0, 1.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
        Vertex::new([-1.0, 1.0, -1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
        Vertex::new([1.0, 1.0, 1.0], [0.0, 1.0, 0.0], [1.0, 1.0]),
        Vertex::new([-1.0, 1.0, 1.0], [0.0, 1.0, 0.0], [0.0, 1.0]),
        Vertex::new([-1.0, -1.0, 1.0], [-1.0, 0.0, 0.0], [1.0, 1.0]),
        Vertex::new([-1.0, 1.0, 1.0], [-1.0, 0.0, 0.0], [1.0, 0.0]),
        Vertex::new([-1.0, -1.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0]),
        Vertex::new([-1.0, 1.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 0.0]),
        Vertex::new([1.0, -1.0, -1.0], [1.0, 0.0, 0.0], [1.0, 1.0]),
        Vertex::new([1.0, 1.0, -1.0], [1.0, 0.0, 0.0], [1.0, 0.0]),
        Vertex::new([1.0, -1.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0]),
        Vertex::new([1.0, 1.0, 1.0], [1.0, 0.0, 0.0], [0.0, 0.0]),
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 1, 2, 2, 1, 3,
        4, 5, 6, 6, 5, 7,
        8, 9, 10, 10, 9, 11,
        12, 13, 14, 14, 13, 15,
        16, 17, 18, 18, 17, 19,
        20, 21, 22, 22, 21, 23,
    ];
    MeshData { vertices, indices }
}

/// UV sphere. `latitude_tesselation` is the number of horizontal ring
/// segments, `longitude_tesselation` the number of vertical ones.
///
/// The first vertical segment is duplicated as the last one: where the
/// mesh closes on itself the vertices share position and normal but
/// need different U coordinates.
pub fn sphere_mesh_data(
    radius: f32,
    latitude_tesselation: u16,
    longitude_tesselation: u16,
) -> MeshData {
    assert!(latitude_tesselation >= 3);
    assert!(longitude_tesselation >= 3);

    let lat = latitude_tesselation as usize;
    let long = longitude_tesselation as usize;
    // The indices are u16; more vertices than that cannot be addressed.
    assert!(
        lat * (long + 1) <= u16::MAX as usize + 1,
        "tesselation exceeds the 16-bit index range"
    );

    let mut vertices = Vec::with_capacity(lat * (long + 1));
    for latitude in 0..lat {
        let latitude_f = latitude as f32 / (lat - 1) as f32;
        let lat_angle = latitude_f * std::f32::consts::PI;
        let y = lat_angle.cos();
        let latitude_radius = lat_angle.sin();

        for longitude in 0..=long {
            let longitude_f = longitude as f32 / long as f32;
            let long_angle = longitude_f * 2.0 * std::f32::consts::PI;
            let x = long_angle.cos();
            let z = long_angle.sin();

            vertices.push(Vertex::new(
                [
                    x * latitude_radius * radius,
                    y * radius,
                    z * latitude_radius * radius,
                ],
                [x, y, z],
                // Flipped in U, otherwise the texture appears mirrored.
                [1.0 - longitude_f, latitude_f],
            ));
        }
    }

    let mut indices = Vec::with_capacity((lat - 1) * long * 6);
    for latitude in 0..(lat - 1) {
        let ring_a = ((long + 1) * latitude) as u16;
        let ring_b = ((long + 1) * (latitude + 1)) as u16;
        for longitude in 0..long as u16 {
            indices.extend_from_slice(&[
                ring_a + longitude,
                ring_a + longitude + 1,
                ring_b + longitude,
                ring_b + longitude,
                ring_a + longitude + 1,
                ring_b + longitude + 1,
            ]);
        }
    }

    MeshData { vertices, indices }
}

/// Torus made of tube ring sections. `major_radius` is the overall
/// radius, `minor_radius` the tube radius; the tesselation counts
/// apply to the torus and the tube respectively.
pub fn torus_mesh_data(
    major_radius: f32,
    minor_radius: f32,
    major_tesselation: u16,
    minor_tesselation: u16,
) -> MeshData {
    assert!(major_tesselation >= 4);
    assert!(minor_tesselation >= 3);

    let major = major_tesselation as usize;
    let minor = minor_tesselation as usize;
    assert!(
        (major + 1) * minor <= u16::MAX as usize + 1,
        "tesselation exceeds the 16-bit index range"
    );

    let mut vertices = Vec::with_capacity((major + 1) * minor);
    for major_i in 0..=major {
        let major_f = major_i as f32 / major as f32;
        let major_angle = major_f * 2.0 * std::f32::consts::PI;
        let major_x = major_angle.cos();
        let major_z = major_angle.sin();

        for minor_i in 0..minor {
            let minor_f = minor_i as f32 / minor as f32;
            let minor_angle = minor_f * 2.0 * std::f32::consts::PI;
            // Reversed X for correct backface culling and V direction.
            let minor_x = -minor_angle.cos();
            let minor_y = minor_angle.sin();

            vertices.push(Vertex::new(
                [
                    major_x * (major_radius + minor_x * minor_radius),
                    minor_y * minor_radius,
                    major_z * (major_radius + minor_x * minor_radius),
                ],
                [major_x * minor_x, minor_y, major_z * minor_x],
                // Repeat the texture four times around the torus so it
                // does not look stretched; flipped in U like the sphere.
                [(1.0 - major_f) * 4.0, minor_f],
            ));
        }
    }

    let mut indices = Vec::with_capacity(major * minor * 6);
    for major_i in 0..major {
        let ring_a = (minor * major_i) as u16;
        let ring_b = (minor * (major_i + 1)) as u16;
        for minor_i in 0..minor as u16 {
            let minor_i2 = (minor_i + 1) % minor as u16;
            indices.extend_from_slice(&[
                ring_a + minor_i,
                ring_b + minor_i,
                ring_a + minor_i2,
                ring_a + minor_i2,
                ring_b + minor_i,
                ring_b + minor_i2,
            ]);
        }
    }

    MeshData { vertices, indices }
}

/// GPU mesh buffers. Starts out empty; a mesh without contents is
/// simply not drawn.
pub struct Mesh {
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    num_indices: u32,
}

impl Mesh {
    pub fn new() -> Self {
        Self {
            vertex_buffer: None,
            index_buffer: None,
            num_indices: 0,
        }
    }

    pub fn set_contents(&mut self, device: &wgpu::Device, data: &MeshData) {
        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.index_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        }));
        self.num_indices = data.indices.len() as u32;
    }

    pub fn has_contents(&self) -> bool {
        self.vertex_buffer.is_some() && self.index_buffer.is_some()
    }

    pub fn num_indices(&self) -> u32 {
        self.num_indices
    }

    /// Binds the buffers and issues the indexed draw. No-op while the
    /// mesh has no contents.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let (Some(vertices), Some(indices)) = (&self.vertex_buffer, &self.index_buffer) else {
            return;
        };
        pass.set_vertex_buffer(0, vertices.slice(..));
        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint16);
        pass.draw_indexed(0..self.num_indices, 0, 0..1);
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid(data: &MeshData) {
        assert!(!data.vertices.is_empty());
        assert_eq!(data.indices.len() % 3, 0, "indices must form triangles");
        for &index in &data.indices {
            assert!((index as usize) < data.vertices.len());
        }
        for vertex in &data.vertices {
            let n = vertex.normal;
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            assert!((len - 1.0).abs() < 1e-4, "normal not unit length: {:?}", n);
        }
    }

    #[test]
    fn test_quad_mesh_valid() {
        assert_valid(&quad_mesh_data());
    }

    #[test]
    fn test_cube_mesh_valid() {
        let data = cube_mesh_data();
        assert_valid(&data);
        assert_eq!(data.vertices.len(), 24);
        assert_eq!(data.indices.len(), 36);
    }

    #[test]
    fn test_sphere_mesh_valid() {
        let data = sphere_mesh_data(1.0, 32, 32);
        assert_valid(&data);
        assert_eq!(data.vertices.len(), 32 * 33);
        assert_eq!(data.indices.len(), 31 * 32 * 6);
    }

    #[test]
    fn test_sphere_vertices_on_radius() {
        let radius = 2.5;
        let data = sphere_mesh_data(radius, 8, 8);
        for vertex in &data.vertices {
            let p = vertex.position;
            let len = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((len - radius).abs() < 1e-3);
        }
    }

    #[test]
    fn test_torus_mesh_valid() {
        let data = torus_mesh_data(0.75, 0.35, 32, 24);
        assert_valid(&data);
        assert_eq!(data.vertices.len(), 33 * 24);
        assert_eq!(data.indices.len(), 32 * 24 * 6);
    }

    #[test]
    #[should_panic(expected = "16-bit index range")]
    fn test_sphere_tesselation_beyond_index_range_panics() {
        // 300 * 301 vertices would overflow the u16 ring offsets.
        sphere_mesh_data(1.0, 300, 300);
    }

    #[test]
    #[should_panic(expected = "16-bit index range")]
    fn test_torus_tesselation_beyond_index_range_panics() {
        torus_mesh_data(0.75, 0.35, 300, 300);
    }

    #[test]
    fn test_unknown_mesh_type_has_no_data() {
        assert!(mesh_data_for_type("teapot").is_none());
        assert!(mesh_data_for_type("").is_none());
        assert!(mesh_data_for_type("cube ").is_none());
    }

    #[test]
    fn test_known_mesh_types_resolve() {
        for mesh_type in ["quad", "cube", "sphere", "torus"] {
            assert!(mesh_data_for_type(mesh_type).is_some(), "{}", mesh_type);
        }
    }
}
