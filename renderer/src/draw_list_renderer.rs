use std::sync::Arc;

use log::{trace, warn};
use smallvec::SmallVec;
use wgpu::util::DeviceExt;

use crate::draw_list::{DrawCmd, DrawList, GpuStateScope};
use crate::vertex::UvVertex;
use crate::program::{
    BUILTINS_GROUP, Builtins, PROGRAM_GROUP, Program, ProgramLayouts, TEXTURE_GROUP,
    viewport_projection,
};
use crate::widgets_renderer::texture_color::TextureColorProgram;

static PLACEHOLDER_VERTICES: [UvVertex; 1] = [UvVertex {
    position: [0.0; 2],
    tex_coords: [0.0; 2],
    color: [0.0; 4],
}];
static PLACEHOLDER_INDICES: [u32; 1] = [0];

pub struct RenderTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub size: [u32; 2],
}

/// Replays a [`DrawList`] onto a target, running its callbacks and state scopes in order.
///
/// Device objects are created lazily on the first `render` call.
#[derive(Default)]
pub struct DrawListRenderer {
    inner: utils::RwOption<DrawListRendererImpl>,
}

struct DrawListRendererImpl {
    layouts: Arc<ProgramLayouts>,
    default_program: Arc<dyn Program>,
    white_texture: wgpu::TextureView,
    texture_sampler: wgpu::Sampler,
}

impl DrawListRendererImpl {
    fn setup(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let layouts = Arc::new(ProgramLayouts::new(device));

        let white_texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("DrawListRenderer: White Texture"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );

        let texture_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("DrawListRenderer: Texture Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            layouts,
            default_program: Arc::new(TextureColorProgram::new()),
            white_texture: white_texture.create_view(&wgpu::TextureViewDescriptor::default()),
            texture_sampler,
        }
    }
}

/// GPU state visible to draw-list callbacks while a list is replayed.
///
/// Callbacks only change what the next element command will use; the renderer applies the
/// state when it records that command.
pub struct RenderState<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    target_format: wgpu::TextureFormat,
    target_size: [u32; 2],

    builtins_buffer: &'a wgpu::Buffer,
    default_program: Arc<dyn Program>,

    program: Arc<dyn Program>,
    texture: wgpu::TextureView,
    // bumped on every bind so the renderer knows when to rebuild the texture bind group
    texture_generation: u64,
}

/// Bound texture and program captured before a [`GpuStateScope`] is entered.
pub(crate) struct SavedState {
    program: Arc<dyn Program>,
    texture: wgpu::TextureView,
}

impl<'a> RenderState<'a> {
    pub fn device(&self) -> &'a wgpu::Device {
        self.device
    }

    pub fn queue(&self) -> &'a wgpu::Queue {
        self.queue
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    pub fn target_size(&self) -> [u32; 2] {
        self.target_size
    }

    /// Texture bound to unit 0.
    pub fn bound_texture(&self) -> &wgpu::TextureView {
        &self.texture
    }

    /// Binds `texture` to unit 0 and returns the previous binding.
    pub fn bind_texture(&mut self, texture: wgpu::TextureView) -> wgpu::TextureView {
        self.texture_generation += 1;
        std::mem::replace(&mut self.texture, texture)
    }

    pub fn program(&self) -> &Arc<dyn Program> {
        &self.program
    }

    pub fn use_program(&mut self, program: Arc<dyn Program>) {
        trace!("RenderState::use_program: {}", program.label());
        self.program = program;
    }

    /// Reactivates the textured-color program the list started with.
    pub fn use_default_program(&mut self) {
        self.use_program(Arc::clone(&self.default_program));
    }

    pub fn is_default_program(&self) -> bool {
        Arc::ptr_eq(&self.program, &self.default_program)
    }

    /// Uploads the MVP matrix for the current target.
    ///
    /// The upload goes through `Queue::write_buffer`, which lands before the pass executes, so
    /// the last value written during a list applies to all of it. Every call writes the same
    /// projection for `target_size`; a scope that needs another matrix must not rely on this.
    pub fn set_uniforms_for_builtins(&mut self) {
        let builtins = target_builtins(self.target_size);
        self.queue
            .write_buffer(self.builtins_buffer, 0, bytemuck::bytes_of(&builtins));
    }

    pub(crate) fn save(&self) -> SavedState {
        SavedState {
            program: Arc::clone(&self.program),
            texture: self.texture.clone(),
        }
    }

    /// Rebinds the saved texture and program. The builtins upload only repeats the list's
    /// projection, see [`Self::set_uniforms_for_builtins`].
    pub(crate) fn restore(&mut self, saved: SavedState) {
        self.bind_texture(saved.texture);
        self.use_program(saved.program);
        self.set_uniforms_for_builtins();
    }
}

impl DrawListRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layouts shared by programs used with this renderer. `None` before the first render.
    pub fn layouts(&self) -> Option<Arc<ProgramLayouts>> {
        self.inner.with_read(|inner| Arc::clone(&inner.layouts))
    }

    pub fn render(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: RenderTarget<'_>,
        draw_list: &DrawList,
    ) {
        if draw_list.commands().is_empty() {
            return;
        }

        self.inner.with_read_or_insert_with(
            || DrawListRendererImpl::setup(device, queue),
            |inner| render_impl(inner, device, queue, target, draw_list),
        );
    }
}

/// Builtins for every command of a list drawn onto a target of `size`.
fn target_builtins(size: [u32; 2]) -> Builtins {
    Builtins::new(viewport_projection([size[0] as f32, size[1] as f32]))
}

fn render_impl(
    inner: &DrawListRendererImpl,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    RenderTarget { view, format, size }: RenderTarget<'_>,
    draw_list: &DrawList,
) {
    let builtins = target_builtins(size);
    let builtins_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("DrawListRenderer: Builtins Buffer"),
        contents: bytemuck::bytes_of(&builtins),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let builtins_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("DrawListRenderer: Builtins Bind Group"),
        layout: &inner.layouts.builtins,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: builtins_buffer.as_entire_binding(),
        }],
    });

    // empty buffers are not allowed, lists made only of callbacks still get one element
    let vertices = if draw_list.vertices().is_empty() {
        &PLACEHOLDER_VERTICES[..]
    } else {
        draw_list.vertices()
    };
    let indices = if draw_list.indices().is_empty() {
        &PLACEHOLDER_INDICES[..]
    } else {
        draw_list.indices()
    };
    let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("DrawListRenderer: Vertex Buffer"),
        contents: bytemuck::cast_slice(vertices),
        usage: wgpu::BufferUsages::VERTEX,
    });
    let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("DrawListRenderer: Index Buffer"),
        contents: bytemuck::cast_slice(indices),
        usage: wgpu::BufferUsages::INDEX,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("DrawListRenderer: Command Encoder"),
    });

    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("DrawListRenderer: Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        render_pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);

        let mut state = RenderState {
            device,
            queue,
            target_format: format,
            target_size: size,
            builtins_buffer: &builtins_buffer,
            default_program: Arc::clone(&inner.default_program),
            program: Arc::clone(&inner.default_program),
            texture: inner.white_texture.clone(),
            texture_generation: 0,
        };

        let mut scopes: SmallVec<[(Arc<dyn GpuStateScope>, SavedState); 4]> = SmallVec::new();
        let mut texture_bind_group: Option<(u64, wgpu::BindGroup)> = None;

        for cmd in draw_list.commands() {
            match cmd {
                DrawCmd::Elements { clip_rect, indices } => {
                    if indices.is_empty() {
                        continue;
                    }
                    let Some([x, y, w, h]) = clip_rect.to_scissor(size) else {
                        continue;
                    };

                    let bind_group = match &texture_bind_group {
                        Some((generation, bind_group))
                            if *generation == state.texture_generation =>
                        {
                            bind_group.clone()
                        }
                        _ => {
                            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                                label: Some("DrawListRenderer: Texture Bind Group"),
                                layout: &inner.layouts.texture,
                                entries: &[
                                    wgpu::BindGroupEntry {
                                        binding: 0,
                                        resource: wgpu::BindingResource::TextureView(
                                            &state.texture,
                                        ),
                                    },
                                    wgpu::BindGroupEntry {
                                        binding: 1,
                                        resource: wgpu::BindingResource::Sampler(
                                            &inner.texture_sampler,
                                        ),
                                    },
                                ],
                            });
                            texture_bind_group =
                                Some((state.texture_generation, bind_group.clone()));
                            bind_group
                        }
                    };

                    let pipeline = state.program.pipeline(device, &inner.layouts, format);
                    render_pass.set_scissor_rect(x, y, w, h);
                    render_pass.set_pipeline(&pipeline);
                    render_pass.set_bind_group(BUILTINS_GROUP, &builtins_bind_group, &[]);
                    render_pass.set_bind_group(TEXTURE_GROUP, &bind_group, &[]);
                    if let Some(uniforms) = state.program.uniforms_bind_group() {
                        render_pass.set_bind_group(PROGRAM_GROUP, &uniforms, &[]);
                    }
                    render_pass.draw_indexed(indices.clone(), 0, 0..1);
                }
                DrawCmd::Callback(callback) => callback(&mut state),
                DrawCmd::BeginState(scope) => {
                    let saved = state.save();
                    scope.enter(&mut state);
                    scopes.push((Arc::clone(scope), saved));
                }
                DrawCmd::EndState => match scopes.pop() {
                    Some((scope, saved)) => {
                        scope.exit(&mut state);
                        state.restore(saved);
                    }
                    None => warn!("DrawListRenderer::render: EndState without BeginState"),
                },
            }
        }

        if !scopes.is_empty() {
            warn!(
                "DrawListRenderer::render: {} state scope(s) left open, restoring",
                scopes.len()
            );
        }
        while let Some((scope, saved)) = scopes.pop() {
            scope.exit(&mut state);
            state.restore(saved);
        }
    }

    queue.submit(std::iter::once(encoder.finish()));
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::draw_list::DrawList;
    use gpu_utils::wgpu_utils::noop_wgpu;

    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

    fn make_target(device: &wgpu::Device, size: [u32; 2]) -> wgpu::TextureView {
        device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("test target"),
                size: wgpu::Extent3d {
                    width: size[0],
                    height: size[1],
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Records which program each callback and scope observed.
    #[derive(Default)]
    struct Probe {
        observed_default: Mutex<Vec<bool>>,
        exits: AtomicUsize,
    }

    struct SwapScope {
        probe: Arc<Probe>,
        texture: wgpu::TextureView,
        program: Arc<dyn Program>,
    }

    impl GpuStateScope for SwapScope {
        fn enter(&self, state: &mut RenderState<'_>) {
            state.bind_texture(self.texture.clone());
            state.use_program(Arc::clone(&self.program));
            state.set_uniforms_for_builtins();
            self.probe
                .observed_default
                .lock()
                .push(state.is_default_program());
        }

        fn exit(&self, _state: &mut RenderState<'_>) {
            self.probe.exits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn observe(probe: &Arc<Probe>) -> impl Fn(&mut RenderState<'_>) + Send + Sync + 'static {
        let probe = Arc::clone(probe);
        move |state| probe.observed_default.lock().push(state.is_default_program())
    }

    #[test]
    fn test_scope_restores_default_program() {
        pollster::block_on(async {
            let (_instance, _adapter, device, queue) = noop_wgpu().await;
            let target = make_target(&device, [64, 64]);
            let probe = Arc::new(Probe::default());

            let scope = Arc::new(SwapScope {
                probe: Arc::clone(&probe),
                texture: make_target(&device, [8, 8]),
                program: Arc::new(TextureColorProgram::new()),
            });

            let mut list = DrawList::new([64.0, 64.0]);
            list.with_gpu_state(scope, |list| {
                list.add_rect_filled([0.0, 0.0], [32.0, 32.0], [0.0, 0.0, 0.0, 1.0]);
            });
            list.add_callback(observe(&probe));
            list.add_rect_filled([0.0, 0.0], [8.0, 8.0], [1.0, 1.0, 1.0, 1.0]);

            let renderer = DrawListRenderer::new();
            assert!(renderer.layouts().is_none());
            renderer.render(
                &device,
                &queue,
                RenderTarget {
                    view: &target,
                    format: FORMAT,
                    size: [64, 64],
                },
                &list,
            );
            assert!(renderer.layouts().is_some());

            // inside the scope the custom program is active, after it the default again
            assert_eq!(*probe.observed_default.lock(), vec![false, true]);
            assert_eq!(probe.exits.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_unclosed_scope_is_restored_at_end_of_list() {
        pollster::block_on(async {
            let (_instance, _adapter, device, queue) = noop_wgpu().await;
            let target = make_target(&device, [16, 16]);
            let probe = Arc::new(Probe::default());

            let mut list = DrawList::new([16.0, 16.0]);
            list.add_callback(observe(&probe));
            list.push_gpu_state(Arc::new(SwapScope {
                probe: Arc::clone(&probe),
                texture: make_target(&device, [4, 4]),
                program: Arc::new(TextureColorProgram::new()),
            }));
            list.add_rect_filled([0.0, 0.0], [4.0, 4.0], [1.0, 1.0, 1.0, 1.0]);

            DrawListRenderer::new().render(
                &device,
                &queue,
                RenderTarget {
                    view: &target,
                    format: FORMAT,
                    size: [16, 16],
                },
                &list,
            );

            assert_eq!(*probe.observed_default.lock(), vec![true, false]);
            assert_eq!(probe.exits.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_builtins_depend_only_on_target_size() {
        let a = target_builtins([640, 480]);
        let b = target_builtins([640, 480]);
        assert_eq!(bytemuck::bytes_of(&a), bytemuck::bytes_of(&b));
        assert_eq!(a.mvp, viewport_projection([640.0, 480.0]));

        let other = target_builtins([320, 480]);
        assert_ne!(a.mvp, other.mvp);
    }

    #[test]
    fn test_offscreen_elements_are_skipped() {
        pollster::block_on(async {
            let (_instance, _adapter, device, queue) = noop_wgpu().await;
            let target = make_target(&device, [16, 16]);

            let mut list = DrawList::new([16.0, 16.0]);
            list.push_clip_rect(crate::ClipRect::new([100.0, 100.0], [200.0, 200.0]));
            list.add_rect_filled([100.0, 100.0], [200.0, 200.0], [1.0, 1.0, 1.0, 1.0]);
            list.pop_clip_rect();

            DrawListRenderer::new().render(
                &device,
                &queue,
                RenderTarget {
                    view: &target,
                    format: FORMAT,
                    size: [16, 16],
                },
                &list,
            );
        });
    }
}
