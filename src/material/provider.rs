// Video material provider
//
// Owns the active texture upload strategy and the render pipelines that
// sample video textures onto meshes. One provider exists per GPU
// context; all scene items create their materials through it.

use gstreamer as gst;
use gstreamer_video as gst_video;
use gstreamer_video::VideoFrameExt;

use super::direct::DirectUpload;
use super::generic::GenericUpload;
use super::material::VideoMaterial;
use super::upload::{MaterialTexture, TextureUpload, UploadError};
use super::{rotation_matrix, FrameLayout};
use crate::scene::mesh::Vertex;

/// Format of the offscreen color targets materials render into.
pub const TARGET_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const TARGET_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// WGSL shader for meshes textured with a packed RGB video frame
const RGB_SHADER: &str = r#"
struct MaterialUniforms {
    mvp: mat4x4<f32>,
    modelview: mat3x3<f32>,
    crop: vec4<f32>,
    tex_rotation: mat2x2<f32>,
}

@group(0) @binding(0) var<uniform> material: MaterialUniforms;
@group(0) @binding(1) var frame_sampler: sampler;
@group(0) @binding(2) var frame_texture: texture_2d<f32>;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = material.mvp * vec4<f32>(input.position, 1.0);
    output.normal = material.modelview * input.normal;
    output.tex_coord = input.tex_coord;
    return output;
}

// Rotates the coordinate about the frame center and maps it into the
// crop rectangle. z carries 1.0 inside the frame, 0.0 where rotation
// moved the coordinate off it.
fn video_tex_coord(tex_coord: vec2<f32>) -> vec3<f32> {
    let rotated = material.tex_rotation * (tex_coord - vec2<f32>(0.5, 0.5)) + vec2<f32>(0.5, 0.5);
    let inside = step(vec2<f32>(0.0, 0.0), rotated) * step(rotated, vec2<f32>(1.0, 1.0));
    let uv = material.crop.xy + rotated * material.crop.zw;
    return vec3<f32>(uv, inside.x * inside.y);
}

fn shade(normal: vec3<f32>) -> f32 {
    let light = max(dot(normalize(normal), vec3<f32>(0.0, 0.0, 1.0)), 0.0);
    return 0.2 + 0.8 * light;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let tc = video_tex_coord(input.tex_coord);
    let color = textureSample(frame_texture, frame_sampler, tc.xy).rgb;
    return vec4<f32>(color * shade(input.normal) * tc.z, tc.z);
}
"#;

/// WGSL shader for meshes textured with a two-plane NV12 video frame
const NV12_SHADER: &str = r#"
struct MaterialUniforms {
    mvp: mat4x4<f32>,
    modelview: mat3x3<f32>,
    crop: vec4<f32>,
    tex_rotation: mat2x2<f32>,
}

@group(0) @binding(0) var<uniform> material: MaterialUniforms;
@group(0) @binding(1) var frame_sampler: sampler;
@group(0) @binding(2) var y_texture: texture_2d<f32>;
@group(0) @binding(3) var uv_texture: texture_2d<f32>;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) tex_coord: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.position = material.mvp * vec4<f32>(input.position, 1.0);
    output.normal = material.modelview * input.normal;
    output.tex_coord = input.tex_coord;
    return output;
}

fn video_tex_coord(tex_coord: vec2<f32>) -> vec3<f32> {
    let rotated = material.tex_rotation * (tex_coord - vec2<f32>(0.5, 0.5)) + vec2<f32>(0.5, 0.5);
    let inside = step(vec2<f32>(0.0, 0.0), rotated) * step(rotated, vec2<f32>(1.0, 1.0));
    let uv = material.crop.xy + rotated * material.crop.zw;
    return vec3<f32>(uv, inside.x * inside.y);
}

fn shade(normal: vec3<f32>) -> f32 {
    let light = max(dot(normalize(normal), vec3<f32>(0.0, 0.0, 1.0)), 0.0);
    return 0.2 + 0.8 * light;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let tc = video_tex_coord(input.tex_coord);
    let y = textureSample(y_texture, frame_sampler, tc.xy).r;
    let u = textureSample(uv_texture, frame_sampler, tc.xy).r - 0.5;
    let v = textureSample(uv_texture, frame_sampler, tc.xy).g - 0.5;

    // BT.601 YUV to RGB conversion
    let r = y + 1.402 * v;
    let g = y - 0.344 * u - 0.714 * v;
    let b = y + 1.772 * u;

    return vec4<f32>(vec3<f32>(r, g, b) * shade(input.normal) * tc.z, tc.z);
}
"#;

/// Uniform block shared by both material shaders.
///
/// Matches the WGSL layout exactly: mat3x3 columns are padded to vec4,
/// the whole struct is 144 bytes.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniforms {
    pub mvp: [[f32; 4]; 4],
    pub modelview: [[f32; 4]; 3],
    pub crop: [f32; 4],
    pub tex_rotation: [[f32; 2]; 2],
}

fn pack_mat3(m: glam::Mat3) -> [[f32; 4]; 3] {
    let c = m.to_cols_array_2d();
    [
        [c[0][0], c[0][1], c[0][2], 0.0],
        [c[1][0], c[1][1], c[1][2], 0.0],
        [c[2][0], c[2][1], c[2][2], 0.0],
    ]
}

pub struct VideoMaterialProvider {
    strategy: Box<dyn TextureUpload>,
    sampler: wgpu::Sampler,
    rgb_pipeline: wgpu::RenderPipeline,
    rgb_bind_group_layout: wgpu::BindGroupLayout,
    nv12_pipeline: Option<wgpu::RenderPipeline>,
    nv12_bind_group_layout: Option<wgpu::BindGroupLayout>,
}

impl VideoMaterialProvider {
    /// Picks the upload strategy for `device` and builds the material
    /// pipelines. The direct strategy wins when the device supports it.
    pub fn new(device: &wgpu::Device) -> Self {
        let strategy: Box<dyn TextureUpload> = match DirectUpload::probe(device) {
            Some(direct) => Box::new(direct),
            None => {
                log::info!("Using generic texture uploads (RGBx conversion in the pipeline)");
                Box::new(GenericUpload::new())
            }
        };
        let direct = strategy
            .supported_formats()
            .contains(&gst_video::VideoFormat::Nv12);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let rgb_bind_group_layout = make_bind_group_layout(device, "RGB Material", 1);
        let rgb_pipeline = make_pipeline(device, "RGB Material", RGB_SHADER, &rgb_bind_group_layout);

        let (nv12_pipeline, nv12_bind_group_layout) = if direct {
            let layout = make_bind_group_layout(device, "NV12 Material", 2);
            let pipeline = make_pipeline(device, "NV12 Material", NV12_SHADER, &layout);
            (Some(pipeline), Some(layout))
        } else {
            (None, None)
        };

        Self {
            strategy,
            sampler,
            rgb_pipeline,
            rgb_bind_group_layout,
            nv12_pipeline,
            nv12_bind_group_layout,
        }
    }

    /// The pixel formats the active strategy accepts; restrict the
    /// player's sink caps to exactly this set.
    pub fn supported_formats(&self) -> &[gst_video::VideoFormat] {
        self.strategy.supported_formats()
    }

    /// Forwarded to the strategy when negotiated video info changed.
    pub fn set_video_info_changed(&self, changed: bool) {
        self.strategy.set_video_info_changed(changed);
    }

    pub fn create_material(&self, device: &wgpu::Device) -> VideoMaterial {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Material Uniforms"),
            size: std::mem::size_of::<MaterialUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        VideoMaterial::new(uniform_buffer)
    }

    /// Uploads one frame buffer into the material's texture and rebuilds
    /// its bind group if the texture object changed.
    pub fn upload_frame(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        material: &mut VideoMaterial,
        info: &gst_video::VideoInfo,
        buffer: &gst::BufferRef,
    ) -> Result<(), UploadError> {
        // Mapping applies any per-buffer stride/offset overrides, so the
        // layout is taken from the mapped frame, not the negotiated info.
        let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, info)
            .map_err(|e| UploadError::Map(e.to_string()))?;
        let layout = FrameLayout::from_video_info(frame.info());
        material.update_layout(layout);

        let replaced =
            self.strategy
                .upload(device, queue, &layout, &frame, &mut material.texture)?;

        if replaced || material.bind_group.is_none() {
            material.bind_group = self.make_bind_group(device, material);
        }
        Ok(())
    }

    /// Writes the per-draw uniforms for `material`.
    pub fn update_uniforms(
        &self,
        queue: &wgpu::Queue,
        material: &VideoMaterial,
        mvp: glam::Mat4,
        modelview: glam::Mat3,
    ) {
        let uniforms = MaterialUniforms {
            mvp: mvp.to_cols_array_2d(),
            modelview: pack_mat3(modelview),
            crop: material.crop_vec(),
            tex_rotation: rotation_matrix(material.rotation()),
        };
        queue.write_buffer(&material.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    /// The pipeline matching the material's current texture kind.
    pub fn pipeline_for(&self, material: &VideoMaterial) -> &wgpu::RenderPipeline {
        match material.texture {
            Some(MaterialTexture::Nv12 { .. }) => self
                .nv12_pipeline
                .as_ref()
                .expect("NV12 texture exists only with the direct strategy"),
            _ => &self.rgb_pipeline,
        }
    }

    fn make_bind_group(
        &self,
        device: &wgpu::Device,
        material: &VideoMaterial,
    ) -> Option<wgpu::BindGroup> {
        let texture = material.texture.as_ref()?;

        let bind_group = match texture {
            MaterialTexture::Rgb { view, .. } => {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("RGB Material Bind Group"),
                    layout: &self.rgb_bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: material.uniform_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(view),
                        },
                    ],
                })
            }
            MaterialTexture::Nv12 {
                y_view, uv_view, ..
            } => device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("NV12 Material Bind Group"),
                layout: self
                    .nv12_bind_group_layout
                    .as_ref()
                    .expect("NV12 texture exists only with the direct strategy"),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: material.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(y_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(uv_view),
                    },
                ],
            }),
        };
        Some(bind_group)
    }
}

/// Bind group layout with the uniform block, the sampler, and
/// `texture_count` sampled textures.
fn make_bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    texture_count: u32,
) -> wgpu::BindGroupLayout {
    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        },
    ];
    for i in 0..texture_count {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2 + i,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

fn make_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader_source: &str,
    bind_group_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(shader_source.into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_group_layout],
        immediate_size: 0,
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::LAYOUT],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TARGET_COLOR_FORMAT,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: TARGET_DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_block_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<MaterialUniforms>(), 144);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, modelview), 64);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, crop), 112);
        assert_eq!(std::mem::offset_of!(MaterialUniforms, tex_rotation), 128);
    }

    #[test]
    fn test_pack_mat3_pads_columns() {
        let packed = pack_mat3(glam::Mat3::IDENTITY);
        assert_eq!(packed[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(packed[1], [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(packed[2], [0.0, 0.0, 1.0, 0.0]);
    }
}
