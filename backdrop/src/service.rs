use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use gpu_utils::{CallbackId, ContextLostReason, Gpu};
use log::{debug, error, trace};
use renderer::DrawList;

use crate::backdrop_blit::{BlurScope, PanelRect, backdrop_uv_rect, emit_backdrop};
use crate::blur_program::BlurProgram;
use crate::offscreen_target::OffscreenTarget;
use crate::scene_capture::{CaptureOutcome, FrameContext, Scene, SkipReason, capture_scene};
use crate::settings::{SettingsStore, blur_enabled};

#[derive(Debug, Clone, Copy)]
pub struct BackdropBlurDescriptor {
    /// Format of the captured scene. Must be filterable.
    pub capture_format: wgpu::TextureFormat,
}

impl Default for BackdropBlurDescriptor {
    fn default() -> Self {
        Self {
            capture_format: wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// Blurred copy of the scene painted behind UI panels.
///
/// Each frame, [`BackdropBlur::draw_scene`] re-renders the scene into an offscreen target after
/// the normal draw, and [`BackdropBlur::blit_panel`] records a blurred background for a panel
/// that samples it.
pub struct BackdropBlur {
    settings: Arc<dyn SettingsStore>,
    capture_format: wgpu::TextureFormat,

    program: Option<Arc<BlurProgram>>,
    target: utils::RwOption<OffscreenTarget>,

    overlay_visible: AtomicBool,
}

impl BackdropBlur {
    /// Compiles the blur program. If that fails the service stays usable but never captures.
    pub fn new(
        device: &wgpu::Device,
        settings: Arc<dyn SettingsStore>,
        desc: BackdropBlurDescriptor,
    ) -> Self {
        let program = match BlurProgram::compile(device) {
            Ok(program) => Some(Arc::new(program)),
            Err(e) => {
                error!("BackdropBlur::new: blur disabled, program failed to compile: {e}");
                None
            }
        };

        Self {
            settings,
            capture_format: desc.capture_format,
            program,
            target: utils::RwOption::new(),
            overlay_visible: AtomicBool::new(true),
        }
    }

    /// Drops the target whenever `gpu` reports a lost context. The callback holds only a weak
    /// reference to the service.
    pub fn attach(self: &Arc<Self>, gpu: &Gpu) -> CallbackId {
        let weak: Weak<Self> = Arc::downgrade(self);
        gpu.add_context_lost_callback(move |reason| {
            if let Some(service) = weak.upgrade() {
                service.invalidate(reason);
            }
        })
    }

    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn target_size(&self) -> Option<[u32; 2]> {
        self.target.with_read(|target| target.size())
    }

    pub fn set_overlay_visible(&self, visible: bool) {
        self.overlay_visible.store(visible, Ordering::Relaxed);
    }

    pub fn is_overlay_visible(&self) -> bool {
        self.overlay_visible.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        blur_enabled(self.settings.as_ref())
    }

    /// Runs `draw`, then captures `scene` into the offscreen target when the blur is active.
    pub fn draw_scene(
        &self,
        frame: FrameContext<'_>,
        scene: &dyn Scene,
        draw: impl FnOnce(),
    ) -> CaptureOutcome {
        draw();

        if !self.is_overlay_visible() {
            return CaptureOutcome::Skipped(SkipReason::OverlayHidden);
        }
        if !self.is_enabled() {
            if self.target.take().is_some() {
                debug!("BackdropBlur::draw_scene: blur disabled, released offscreen target");
            }
            return CaptureOutcome::Skipped(SkipReason::Disabled);
        }
        if self.program.is_none() {
            return CaptureOutcome::Skipped(SkipReason::NoProgram);
        }

        let size = frame.viewport_size;
        if size[0] == 0 || size[1] == 0 {
            trace!("BackdropBlur::draw_scene: empty viewport, skipping capture");
            return CaptureOutcome::Skipped(SkipReason::EmptyViewport);
        }

        let format = self.capture_format;
        let mut target = self
            .target
            .get_mut_or_insert_with(|| OffscreenTarget::new(frame.device, size, format));
        if !target.matches(size, format) {
            debug!(
                "BackdropBlur::draw_scene: viewport changed {:?} -> {size:?}, recreating target",
                target.size()
            );
            *target = OffscreenTarget::new(frame.device, size, format);
        }

        capture_scene(&frame, &target, scene);

        CaptureOutcome::Captured { size }
    }

    /// Records the blurred background of `panel` into `draw_list`.
    ///
    /// Returns `false` without touching the list when there is no program, no captured target or
    /// no usable display size.
    pub fn blit_panel(&self, draw_list: &mut DrawList, panel: PanelRect) -> bool {
        let Some(program) = &self.program else {
            return false;
        };
        let Some(texture) = self.target.with_read(|target| target.view().clone()) else {
            return false;
        };
        let Some(uv) = backdrop_uv_rect(&panel, draw_list.display_size()) else {
            return false;
        };

        let scope = BlurScope {
            program: Arc::clone(program),
            texture,
            settings: Arc::clone(&self.settings),
        };
        emit_backdrop(draw_list, &panel, uv, scope);
        true
    }

    /// Inbound display-mode change. The next capture recreates the target.
    pub fn on_display_mode_changed(&self) {
        self.invalidate(&ContextLostReason::DisplayModeChanged);
    }

    pub fn invalidate(&self, reason: &ContextLostReason) {
        if self.target.take().is_some() {
            debug!("BackdropBlur::invalidate: dropped offscreen target ({reason:?})");
        }
    }

    /// Frees the offscreen target. The program is kept.
    pub fn release(&self) {
        self.target.take();
    }
}
