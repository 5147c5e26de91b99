//! Blurred scene backdrops for UI panels.
//!
//! Each frame the scene is drawn normally, then drawn a second time into an offscreen target.
//! Panels drawn afterwards sample that target through a Gaussian blur program, so the UI
//! appears on frosted glass while the UI itself stays sharp.

pub mod backdrop_blit;
pub mod blur_program;
pub mod kernel;
pub mod offscreen_target;
pub mod scene_capture;
pub mod service;
pub mod settings;

pub use backdrop_blit::{PanelRect, TITLE_BAR_HEIGHT, UvRect, backdrop_uv_rect};
pub use blur_program::{BlurProgram, BlurProgramError, UniformKind, UniformLocation};
pub use offscreen_target::OffscreenTarget;
pub use scene_capture::{CaptureOutcome, FrameContext, Scene, SceneTarget, SkipReason};
pub use service::{BackdropBlur, BackdropBlurDescriptor};
pub use settings::{BlurParameters, SettingValue, Settings, SettingsStore};
