//! Shader programs used by [`crate::DrawListRenderer`].
//!
//! Every program shares the same first two bind groups so draw-list callbacks can switch
//! programs mid-list without rebinding unrelated state:
//!
//! * group 0: [`Builtins`] (the MVP matrix for the current target)
//! * group 1: the texture bound to unit 0 and its sampler
//! * group 2: optional, program-specific uniforms
//!
//! Vertex attributes are fixed by [`crate::vertex::UvVertex`]: position (0), uv (1), color (2).

pub const BUILTINS_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;
pub const PROGRAM_GROUP: u32 = 2;

/// WGSL shared by every program: the builtins/texture bindings and the `vs_main` vertex stage.
/// Programs append their own `fs_main`.
pub const PRELUDE_WGSL: &str = include_str!("program_prelude.wgsl");

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Builtins {
    pub mvp: nalgebra::Matrix4<f32>,
}

impl Builtins {
    pub fn new(mvp: nalgebra::Matrix4<f32>) -> Self {
        Self { mvp }
    }
}

/// Bind group layouts for groups 0 and 1, shared by all programs created on one device.
pub struct ProgramLayouts {
    pub builtins: wgpu::BindGroupLayout,
    pub texture: wgpu::BindGroupLayout,
}

impl ProgramLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let builtins = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ProgramLayouts: Builtins Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ProgramLayouts: Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        Self { builtins, texture }
    }
}

/// A linked shader program: one pipeline per target format plus optional uniforms.
pub trait Program: Send + Sync {
    fn label(&self) -> &str;

    fn pipeline(
        &self,
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        target_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline;

    /// Bind group for [`PROGRAM_GROUP`], if the program has its own uniforms.
    fn uniforms_bind_group(&self) -> Option<wgpu::BindGroup> {
        None
    }
}

/// Pipeline descriptor shared by the draw-list programs: triangle list, no culling,
/// alpha blending, [`crate::vertex::UvVertex`] input.
pub fn make_program_pipeline(
    device: &wgpu::Device,
    label: &str,
    shader: &wgpu::ShaderModule,
    pipeline_layout: &wgpu::PipelineLayout,
    target_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(pipeline_layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[crate::vertex::UvVertex::desc()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Maps display pixels (top-left origin, Y down) to NDC.
#[rustfmt::skip]
pub fn viewport_projection(viewport_size: [f32; 2]) -> nalgebra::Matrix4<f32> {
    let translate = nalgebra::Matrix4::new_translation(&nalgebra::Vector3::new(
        -1.0,
        1.0,
        0.0,
    ));

    let scale = nalgebra::Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(
        2.0 / viewport_size[0],
        -2.0 / viewport_size[1],
        1.0,
    ));

    translate * scale
}

/// Like [`viewport_projection`] but with the Y axis flipped, so the top of the display lands
/// in the last row of the target. Textures rendered with this have a bottom-up origin.
#[rustfmt::skip]
pub fn viewport_projection_bottom_up(viewport_size: [f32; 2]) -> nalgebra::Matrix4<f32> {
    let translate = nalgebra::Matrix4::new_translation(&nalgebra::Vector3::new(
        -1.0,
        -1.0,
        0.0,
    ));

    let scale = nalgebra::Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(
        2.0 / viewport_size[0],
        2.0 / viewport_size[1],
        1.0,
    ));

    translate * scale
}
