use log::{debug, trace, warn};
use renderer::program::{
    PRELUDE_WGSL, PROGRAM_GROUP, Program, ProgramLayouts, make_program_pipeline,
};
use utils::NameCache;

use crate::settings::BlurParameters;

const PIPELINE_CACHE_SIZE: u64 = 4;

/// Names of the members of the blur uniform block in `blur.wgsl`.
pub mod uniform_names {
    pub const DARKNESS: &str = "blur_darkness";
    pub const SIZE: &str = "blur_size";
    pub const STEPS: &str = "blur_steps";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
}

/// Byte offset and scalar type of one member of the blur uniform block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformLocation {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Scalar members of the program's uniform struct, reflected from the shader source.
#[derive(Debug)]
struct UniformBlock {
    size: u64,
    members: Vec<(String, UniformLocation)>,
}

impl UniformBlock {
    fn find(&self, name: &str) -> Option<UniformLocation> {
        self.members
            .iter()
            .find(|(member, _)| member == name)
            .map(|(_, location)| *location)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BlurProgramError {
    #[error("blur shader failed to parse:\n{0}")]
    Parse(String),
    #[error("blur shader failed validation: {0}")]
    Validation(String),
    #[error("blur shader has no uniform struct at group 2, binding 0")]
    MissingUniformBlock,
    #[error("device rejected the blur shader: {0}")]
    ShaderModule(String),
}

/// Gaussian blur program sampling the texture bound to unit 0.
///
/// Compiled once; pipelines are created per target format on first use. Uniform locations are
/// looked up by name on first upload and cached.
pub struct BlurProgram {
    shader: wgpu::ShaderModule,
    uniform_block: UniformBlock,
    uniform_buffer: wgpu::Buffer,
    uniforms_layout: wgpu::BindGroupLayout,
    uniforms_bind_group: wgpu::BindGroup,
    locations: NameCache<UniformLocation>,
    pipeline: moka::sync::Cache<wgpu::TextureFormat, wgpu::RenderPipeline, fxhash::FxBuildHasher>,
}

impl BlurProgram {
    pub fn source() -> String {
        format!("{PRELUDE_WGSL}\n{}", include_str!("blur.wgsl"))
    }

    pub fn compile(device: &wgpu::Device) -> Result<Self, BlurProgramError> {
        Self::compile_source(device, &Self::source())
    }

    pub(crate) fn compile_source(
        device: &wgpu::Device,
        source: &str,
    ) -> Result<Self, BlurProgramError> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| BlurProgramError::Parse(e.emit_to_string(source)))?;

        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .map_err(|e| BlurProgramError::Validation(e.into_inner().to_string()))?;

        let uniform_block = reflect_uniform_block(&module).ok_or(BlurProgramError::MissingUniformBlock)?;
        debug!("BlurProgram::compile: uniform block {uniform_block:?}");

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blur_shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(e) = futures::executor::block_on(device.pop_error_scope()) {
            return Err(BlurProgramError::ShaderModule(e.to_string()));
        }

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("BlurProgram: Uniform Buffer"),
            size: uniform_block.size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniforms_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("BlurProgram: Uniforms Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniforms_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("BlurProgram: Uniforms Bind Group"),
            layout: &uniforms_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Ok(Self {
            shader,
            uniform_block,
            uniform_buffer,
            uniforms_layout,
            uniforms_bind_group,
            locations: NameCache::new(),
            pipeline: moka::sync::CacheBuilder::new(PIPELINE_CACHE_SIZE)
                .build_with_hasher(fxhash::FxBuildHasher::default()),
        })
    }

    /// Location of a uniform member, resolved on first request and cached afterwards.
    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.locations.get_or_resolve(name, |name| {
            let location = self.uniform_block.find(name);
            trace!("BlurProgram::uniform_location: resolved `{name}` to {location:?}");
            location
        })
    }

    /// Number of uniform names resolved so far.
    pub fn resolved_uniforms(&self) -> usize {
        self.locations.len()
    }

    pub fn set_uniform_f32(&self, queue: &wgpu::Queue, location: UniformLocation, value: f32) {
        if location.kind != UniformKind::Float {
            warn!("BlurProgram::set_uniform_f32: location {location:?} is not a float");
            return;
        }
        queue.write_buffer(
            &self.uniform_buffer,
            location.offset as u64,
            bytemuck::bytes_of(&value),
        );
    }

    pub fn set_uniform_i32(&self, queue: &wgpu::Queue, location: UniformLocation, value: i32) {
        if location.kind != UniformKind::Int {
            warn!("BlurProgram::set_uniform_i32: location {location:?} is not an int");
            return;
        }
        queue.write_buffer(
            &self.uniform_buffer,
            location.offset as u64,
            bytemuck::bytes_of(&value),
        );
    }

    /// Uploads darkness, size and steps. Each name is resolved independently, a missing one only
    /// skips that value.
    pub fn upload(&self, queue: &wgpu::Queue, params: &BlurParameters) {
        let floats = [
            (uniform_names::DARKNESS, params.darkness),
            (uniform_names::SIZE, params.size),
        ];
        for (name, value) in floats {
            match self.uniform_location(name) {
                Some(location) => self.set_uniform_f32(queue, location, value),
                None => warn!("BlurProgram::upload: no uniform named `{name}`"),
            }
        }

        match self.uniform_location(uniform_names::STEPS) {
            Some(location) => self.set_uniform_i32(queue, location, params.steps),
            None => warn!("BlurProgram::upload: no uniform named `{}`", uniform_names::STEPS),
        }
    }
}

impl Program for BlurProgram {
    fn label(&self) -> &str {
        "blur"
    }

    fn pipeline(
        &self,
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        target_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        self.pipeline.get_with(target_format, || {
            debug!("BlurProgram::pipeline: creating pipeline for {target_format:?}");
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("BlurProgram: Pipeline Layout"),
                bind_group_layouts: &[&layouts.builtins, &layouts.texture, &self.uniforms_layout],
                push_constant_ranges: &[],
            });

            make_program_pipeline(
                device,
                "blur_pipeline",
                &self.shader,
                &pipeline_layout,
                target_format,
            )
        })
    }

    fn uniforms_bind_group(&self) -> Option<wgpu::BindGroup> {
        Some(self.uniforms_bind_group.clone())
    }
}

/// Finds the uniform struct bound at `PROGRAM_GROUP`/0 and records its 32-bit scalar members.
fn reflect_uniform_block(module: &naga::Module) -> Option<UniformBlock> {
    let (_, global) = module.global_variables.iter().find(|(_, global)| {
        global.space == naga::AddressSpace::Uniform
            && global.binding.as_ref().is_some_and(|binding| {
                binding.group == PROGRAM_GROUP && binding.binding == 0
            })
    })?;

    let naga::TypeInner::Struct { members, span } = &module.types[global.ty].inner else {
        return None;
    };

    let members = members
        .iter()
        .filter_map(|member| {
            let name = member.name.clone()?;
            let kind = match module.types[member.ty].inner {
                naga::TypeInner::Scalar(naga::Scalar {
                    kind: naga::ScalarKind::Float,
                    width: 4,
                }) => UniformKind::Float,
                naga::TypeInner::Scalar(naga::Scalar {
                    kind: naga::ScalarKind::Sint,
                    width: 4,
                }) => UniformKind::Int,
                _ => return None,
            };
            Some((
                name,
                UniformLocation {
                    offset: member.offset,
                    kind,
                },
            ))
        })
        .collect();

    Some(UniformBlock {
        size: *span as u64,
        members,
    })
}
