use std::ops::Range;
use std::sync::Arc;

use log::warn;

use crate::draw_list_renderer::RenderState;
use crate::vertex::UvVertex;

/// UV of the white texel used by untextured primitives.
pub const WHITE_UV: [f32; 2] = [0.0, 0.0];

/// Axis-aligned clip rectangle in display pixels (top-left origin, Y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRect {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl ClipRect {
    pub fn new(min: [f32; 2], max: [f32; 2]) -> Self {
        Self { min, max }
    }

    pub fn full_screen(display_size: [f32; 2]) -> Self {
        Self {
            min: [0.0, 0.0],
            max: display_size,
        }
    }

    pub fn intersect(&self, other: &ClipRect) -> ClipRect {
        ClipRect {
            min: [self.min[0].max(other.min[0]), self.min[1].max(other.min[1])],
            max: [self.max[0].min(other.max[0]), self.max[1].min(other.max[1])],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max[0] <= self.min[0] || self.max[1] <= self.min[1]
    }

    /// Clamps to the target and converts to `[x, y, width, height]` for
    /// `RenderPass::set_scissor_rect`. `None` when nothing of the rect is on the target.
    pub fn to_scissor(&self, target_size: [u32; 2]) -> Option<[u32; 4]> {
        let clamp = |v: f32, max: u32| (v.max(0.0).floor() as u32).min(max);

        let x0 = clamp(self.min[0], target_size[0]);
        let y0 = clamp(self.min[1], target_size[1]);
        let x1 = (self.max[0].max(0.0).ceil() as u32).min(target_size[0]);
        let y1 = (self.max[1].max(0.0).ceil() as u32).min(target_size[1]);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some([x0, y0, x1 - x0, y1 - y0])
    }
}

/// Native code run by the renderer between draw commands.
pub type DrawCallback = Arc<dyn Fn(&mut RenderState<'_>) + Send + Sync>;

/// Custom GPU state applied to a run of draw commands.
///
/// The renderer snapshots the bound texture and program before [`GpuStateScope::enter`] and
/// restores them when the scope closes, including when a list ends with the scope still open.
pub trait GpuStateScope: Send + Sync {
    fn enter(&self, state: &mut RenderState<'_>);

    /// Runs before the snapshot is restored.
    fn exit(&self, _state: &mut RenderState<'_>) {}
}

pub enum DrawCmd {
    Elements {
        clip_rect: ClipRect,
        indices: Range<u32>,
    },
    Callback(DrawCallback),
    BeginState(Arc<dyn GpuStateScope>),
    EndState,
}

impl std::fmt::Debug for DrawCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawCmd::Elements { clip_rect, indices } => f
                .debug_struct("Elements")
                .field("clip_rect", clip_rect)
                .field("indices", indices)
                .finish(),
            DrawCmd::Callback(_) => f.write_str("Callback"),
            DrawCmd::BeginState(_) => f.write_str("BeginState"),
            DrawCmd::EndState => f.write_str("EndState"),
        }
    }
}

/// Immediate-mode list of primitives and GPU callbacks for one frame, replayed in order by
/// [`crate::DrawListRenderer`].
pub struct DrawList {
    display_size: [f32; 2],
    vertices: Vec<UvVertex>,
    indices: Vec<u32>,
    commands: Vec<DrawCmd>,
    clip_stack: Vec<ClipRect>,
}

impl DrawList {
    pub fn new(display_size: [f32; 2]) -> Self {
        Self {
            display_size,
            vertices: Vec::new(),
            indices: Vec::new(),
            commands: Vec::new(),
            clip_stack: Vec::new(),
        }
    }

    pub fn display_size(&self) -> [f32; 2] {
        self.display_size
    }

    pub fn vertices(&self) -> &[UvVertex] {
        &self.vertices
    }

    /// The `n` most recently added vertices (fewer if the list holds fewer).
    pub fn last_vertices_mut(&mut self, n: usize) -> &mut [UvVertex] {
        let start = self.vertices.len().saturating_sub(n);
        &mut self.vertices[start..]
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn commands(&self) -> &[DrawCmd] {
        &self.commands
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.commands.clear();
        self.clip_stack.clear();
    }

    pub fn current_clip_rect(&self) -> ClipRect {
        self.clip_stack
            .last()
            .copied()
            .unwrap_or_else(|| ClipRect::full_screen(self.display_size))
    }

    /// Pushes `rect` intersected with the current clip rect.
    pub fn push_clip_rect(&mut self, rect: ClipRect) {
        let rect = rect.intersect(&self.current_clip_rect());
        self.clip_stack.push(rect);
    }

    /// Pushes the whole display, ignoring the current clip rect.
    pub fn push_clip_rect_full_screen(&mut self) {
        self.clip_stack
            .push(ClipRect::full_screen(self.display_size));
    }

    pub fn pop_clip_rect(&mut self) {
        if self.clip_stack.pop().is_none() {
            warn!("DrawList::pop_clip_rect: clip stack is already empty");
        }
    }

    /// Adds a filled rectangle. Vertices are appended top-left, top-right, bottom-right,
    /// bottom-left, all with [`WHITE_UV`].
    pub fn add_rect_filled(&mut self, min: [f32; 2], max: [f32; 2], color: [f32; 4]) {
        let base = self.vertices.len() as u32;

        // 0-------1
        // | \     |
        // |   \   |
        // |     \ |
        // 3-------2
        let corners = [min, [max[0], min[1]], max, [min[0], max[1]]];
        self.vertices
            .extend(corners.into_iter().map(|position| UvVertex {
                position,
                tex_coords: WHITE_UV,
                color,
            }));

        let start = self.indices.len() as u32;
        self.indices.extend_from_slice(&[
            base,
            base + 1,
            base + 2,
            base,
            base + 2,
            base + 3,
        ]);
        let end = self.indices.len() as u32;

        self.push_elements(start..end);
    }

    pub fn add_callback(&mut self, callback: impl Fn(&mut RenderState<'_>) + Send + Sync + 'static) {
        self.commands.push(DrawCmd::Callback(Arc::new(callback)));
    }

    /// Opens a GPU-state scope. Prefer [`Self::with_gpu_state`], which cannot leave it open.
    pub fn push_gpu_state(&mut self, scope: Arc<dyn GpuStateScope>) {
        self.commands.push(DrawCmd::BeginState(scope));
    }

    pub fn pop_gpu_state(&mut self) {
        self.commands.push(DrawCmd::EndState);
    }

    /// Records `f`'s commands inside `scope`. The closing command is always recorded.
    pub fn with_gpu_state<R>(
        &mut self,
        scope: Arc<dyn GpuStateScope>,
        f: impl FnOnce(&mut DrawList) -> R,
    ) -> R {
        self.push_gpu_state(scope);
        let r = f(self);
        self.pop_gpu_state();
        r
    }

    fn push_elements(&mut self, indices: Range<u32>) {
        let clip_rect = self.current_clip_rect();

        if let Some(DrawCmd::Elements {
            clip_rect: last_clip,
            indices: last_indices,
        }) = self.commands.last_mut()
        {
            if *last_clip == clip_rect && last_indices.end == indices.start {
                last_indices.end = indices.end;
                return;
            }
        }

        self.commands.push(DrawCmd::Elements { clip_rect, indices });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

    fn element_ranges(list: &DrawList) -> Vec<Range<u32>> {
        list.commands()
            .iter()
            .filter_map(|cmd| match cmd {
                DrawCmd::Elements { indices, .. } => Some(indices.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rect_vertex_order() {
        let mut list = DrawList::new([100.0, 100.0]);
        list.add_rect_filled([10.0, 20.0], [30.0, 50.0], BLACK);

        let positions: Vec<_> = list.vertices().iter().map(|v| v.position).collect();
        assert_eq!(
            positions,
            vec![[10.0, 20.0], [30.0, 20.0], [30.0, 50.0], [10.0, 50.0]]
        );
        assert_eq!(list.indices(), &[0, 1, 2, 0, 2, 3]);
        assert!(list.vertices().iter().all(|v| v.tex_coords == WHITE_UV));
    }

    #[test]
    fn test_same_clip_merges_elements() {
        let mut list = DrawList::new([100.0, 100.0]);
        list.add_rect_filled([0.0, 0.0], [1.0, 1.0], BLACK);
        list.add_rect_filled([2.0, 2.0], [3.0, 3.0], BLACK);

        assert_eq!(element_ranges(&list), vec![0..12]);
    }

    #[test]
    fn test_callback_splits_elements() {
        let mut list = DrawList::new([100.0, 100.0]);
        list.add_rect_filled([0.0, 0.0], [1.0, 1.0], BLACK);
        list.add_callback(|_| {});
        list.add_rect_filled([2.0, 2.0], [3.0, 3.0], BLACK);

        assert_eq!(element_ranges(&list), vec![0..6, 6..12]);
        assert_eq!(list.commands().len(), 3);
    }

    #[test]
    fn test_clip_stack() {
        let mut list = DrawList::new([200.0, 100.0]);
        assert_eq!(list.current_clip_rect(), ClipRect::full_screen([200.0, 100.0]));

        list.push_clip_rect(ClipRect::new([10.0, 10.0], [50.0, 50.0]));
        list.push_clip_rect(ClipRect::new([40.0, 0.0], [300.0, 300.0]));
        assert_eq!(
            list.current_clip_rect(),
            ClipRect::new([40.0, 10.0], [50.0, 50.0])
        );

        list.push_clip_rect_full_screen();
        assert_eq!(list.current_clip_rect(), ClipRect::full_screen([200.0, 100.0]));

        list.pop_clip_rect();
        list.pop_clip_rect();
        list.pop_clip_rect();
        // popping an empty stack is tolerated
        list.pop_clip_rect();
        assert_eq!(list.current_clip_rect(), ClipRect::full_screen([200.0, 100.0]));
    }

    #[test]
    fn test_clip_change_starts_new_elements() {
        let mut list = DrawList::new([100.0, 100.0]);
        list.add_rect_filled([0.0, 0.0], [1.0, 1.0], BLACK);
        list.push_clip_rect(ClipRect::new([0.0, 0.0], [10.0, 10.0]));
        list.add_rect_filled([2.0, 2.0], [3.0, 3.0], BLACK);
        list.pop_clip_rect();

        assert_eq!(element_ranges(&list), vec![0..6, 6..12]);
    }

    struct NoopScope;

    impl GpuStateScope for NoopScope {
        fn enter(&self, _state: &mut RenderState<'_>) {}
    }

    #[test]
    fn test_gpu_state_is_balanced() {
        let mut list = DrawList::new([100.0, 100.0]);
        let n = list.with_gpu_state(Arc::new(NoopScope), |list| {
            list.add_rect_filled([0.0, 0.0], [1.0, 1.0], BLACK);
            7
        });
        assert_eq!(n, 7);

        assert_eq!(list.commands().len(), 3);
        assert!(matches!(list.commands()[0], DrawCmd::BeginState(_)));
        assert!(matches!(list.commands()[1], DrawCmd::Elements { .. }));
        assert!(matches!(list.commands()[2], DrawCmd::EndState));
    }

    #[test]
    fn test_last_vertices_mut() {
        let mut list = DrawList::new([100.0, 100.0]);
        list.add_rect_filled([0.0, 0.0], [1.0, 1.0], BLACK);
        list.add_rect_filled([2.0, 2.0], [3.0, 3.0], BLACK);

        for v in list.last_vertices_mut(4) {
            v.tex_coords = [0.5, 0.5];
        }

        assert!(list.vertices()[..4].iter().all(|v| v.tex_coords == WHITE_UV));
        assert!(list.vertices()[4..].iter().all(|v| v.tex_coords == [0.5, 0.5]));
        assert_eq!(list.last_vertices_mut(100).len(), 8);
    }

    #[test]
    fn test_scissor_clamps_to_target() {
        let rect = ClipRect::new([-10.0, 5.5], [120.0, 40.2]);
        assert_eq!(rect.to_scissor([100, 100]), Some([0, 5, 100, 36]));

        let outside = ClipRect::new([150.0, 150.0], [200.0, 200.0]);
        assert_eq!(outside.to_scissor([100, 100]), None);
        assert!(ClipRect::new([5.0, 5.0], [5.0, 9.0]).is_empty());
    }
}
