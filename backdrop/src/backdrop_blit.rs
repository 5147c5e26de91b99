use std::sync::Arc;

use log::trace;
use renderer::{DrawList, GpuStateScope, RenderState};

use crate::blur_program::BlurProgram;
use crate::settings::{BlurParameters, SettingsStore};

/// Height of a panel's title bar. The backdrop starts below it.
pub const TITLE_BAR_HEIGHT: f32 = 24.0;

const BACKDROP_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Panel rectangle in display pixels, top-left origin, Y down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelRect {
    pub position: [f32; 2],
    pub size: [f32; 2],
}

impl PanelRect {
    pub fn new(position: [f32; 2], size: [f32; 2]) -> Self {
        Self { position, size }
    }

    /// Corners of the blurred body, below the title bar.
    pub fn body(&self) -> ([f32; 2], [f32; 2]) {
        let [x, y] = self.position;
        let [w, h] = self.size;
        (
            [x, y + TITLE_BAR_HEIGHT],
            [x + w, y + TITLE_BAR_HEIGHT + h],
        )
    }
}

/// Texture coordinates of a panel body inside the captured scene.
///
/// `top` is larger than `bottom`: the capture is stored bottom-up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvRect {
    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl UvRect {
    /// In [`DrawList::add_rect_filled`] vertex order.
    pub fn corners(&self) -> [[f32; 2]; 4] {
        [
            [self.left, self.top],
            [self.right, self.top],
            [self.right, self.bottom],
            [self.left, self.bottom],
        ]
    }
}

/// Maps a panel body to the captured texture. Values outside `[0, 1]` are kept; the sampler
/// clamps to the edge. `None` for a zero or non-finite display size.
pub fn backdrop_uv_rect(panel: &PanelRect, display_size: [f32; 2]) -> Option<UvRect> {
    let [w, h] = display_size;
    if !(w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
        return None;
    }

    let (min, max) = panel.body();
    Some(UvRect {
        left: min[0] / w,
        right: max[0] / w,
        top: 1.0 - min[1] / h,
        bottom: 1.0 - max[1] / h,
    })
}

/// Binds the captured scene and the blur program for the panel background.
///
/// The renderer restores the previous texture and program when the scope closes.
pub(crate) struct BlurScope {
    pub(crate) program: Arc<BlurProgram>,
    pub(crate) texture: wgpu::TextureView,
    pub(crate) settings: Arc<dyn SettingsStore>,
}

impl GpuStateScope for BlurScope {
    fn enter(&self, state: &mut RenderState<'_>) {
        state.bind_texture(self.texture.clone());
        state.use_program(self.program.clone());
        state.set_uniforms_for_builtins();

        let params = BlurParameters::read(self.settings.as_ref());
        trace!("BlurScope::enter: {params:?}");
        self.program.upload(state.queue(), &params);
    }
}

/// Records the blurred background of `panel` into `draw_list`.
pub(crate) fn emit_backdrop(draw_list: &mut DrawList, panel: &PanelRect, uv: UvRect, scope: BlurScope) {
    let (min, max) = panel.body();

    draw_list.push_clip_rect_full_screen();
    draw_list.with_gpu_state(Arc::new(scope), |list| {
        list.add_rect_filled(min, max, BACKDROP_COLOR);
        for (vertex, tex_coords) in list.last_vertices_mut(4).iter_mut().zip(uv.corners()) {
            vertex.tex_coords = tex_coords;
        }
    });
    draw_list.pop_clip_rect();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[test]
    fn test_uv_rect_inverts_vertical_axis() {
        let panel = PanelRect::new([100.0, 50.0], [200.0, 100.0]);
        let uv = backdrop_uv_rect(&panel, [800.0, 600.0]).expect("display size is valid");

        assert_close(uv.left, 0.125);
        assert_close(uv.right, 0.375);
        assert_close(uv.top, 1.0 - 74.0 / 600.0);
        assert_close(uv.bottom, 1.0 - 174.0 / 600.0);
        assert!(uv.top > uv.bottom);
    }

    #[test]
    fn test_full_display_panel_below_title_bar() {
        let panel = PanelRect::new([0.0, -TITLE_BAR_HEIGHT], [640.0, 480.0]);
        let uv = backdrop_uv_rect(&panel, [640.0, 480.0]).expect("display size is valid");
        assert_eq!(
            uv.corners(),
            [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]]
        );
    }

    #[test]
    fn test_panel_outside_display_is_not_clamped() {
        let panel = PanelRect::new([1000.0, 900.0], [50.0, 50.0]);
        let uv = backdrop_uv_rect(&panel, [800.0, 600.0]).expect("display size is valid");

        assert!(uv.left > 1.0 && uv.right > 1.0);
        assert!(uv.top < 0.0 && uv.bottom < 0.0);
    }

    #[test]
    fn test_degenerate_display() {
        let panel = PanelRect::new([0.0, 0.0], [10.0, 10.0]);
        assert_eq!(backdrop_uv_rect(&panel, [0.0, 600.0]), None);
        assert_eq!(backdrop_uv_rect(&panel, [800.0, f32::NAN]), None);
        assert_eq!(backdrop_uv_rect(&panel, [-1.0, 600.0]), None);
    }

    #[test]
    fn test_zero_area_panel() {
        let panel = PanelRect::new([10.0, 10.0], [0.0, 0.0]);
        let uv = backdrop_uv_rect(&panel, [100.0, 100.0]).expect("display size is valid");
        assert_eq!(uv.left, uv.right);
        assert_eq!(uv.top, uv.bottom);
    }
}
