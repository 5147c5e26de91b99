use crate::program::{PRELUDE_WGSL, Program, ProgramLayouts, make_program_pipeline};

/* NOTE: The default program of the draw list. It multiplies the vertex color with the texel
bound to unit 0, so untextured primitives sample the renderer's 1x1 white texture at uv (0, 0). */

const PIPELINE_CACHE_SIZE: u64 = 4;

pub struct TextureColorProgram {
    inner: utils::RwOption<wgpu::ShaderModule>,
    pipeline: moka::sync::Cache<wgpu::TextureFormat, wgpu::RenderPipeline, fxhash::FxBuildHasher>,
}

impl Default for TextureColorProgram {
    fn default() -> Self {
        Self {
            inner: utils::RwOption::new(),
            pipeline: moka::sync::CacheBuilder::new(PIPELINE_CACHE_SIZE)
                .build_with_hasher(fxhash::FxBuildHasher::default()),
        }
    }
}

impl TextureColorProgram {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Program for TextureColorProgram {
    fn label(&self) -> &str {
        "texture_color"
    }

    fn pipeline(
        &self,
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        target_format: wgpu::TextureFormat,
    ) -> wgpu::RenderPipeline {
        self.pipeline.get_with(target_format, || {
            let shader = self.inner.with_read_or_insert_with(
                || make_shader(device),
                |shader| shader.clone(),
            );

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("TextureColor: Pipeline Layout"),
                bind_group_layouts: &[&layouts.builtins, &layouts.texture],
                push_constant_ranges: &[],
            });

            make_program_pipeline(
                device,
                "texture_color_pipeline",
                &shader,
                &pipeline_layout,
                target_format,
            )
        })
    }
}

fn make_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    let source = format!("{PRELUDE_WGSL}\n{}", include_str!("texture_color.wgsl"));
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("texture_color_shader"),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}
