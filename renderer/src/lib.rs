pub mod draw_list;
pub use draw_list::{ClipRect, DrawCallback, DrawCmd, DrawList, GpuStateScope};
pub mod draw_list_renderer;
pub use draw_list_renderer::{DrawListRenderer, RenderState, RenderTarget};
pub mod program;
pub use program::{Builtins, Program, ProgramLayouts};

pub mod vertex;

pub mod widgets_renderer;
pub use widgets_renderer::texture_color;
