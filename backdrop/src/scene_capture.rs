use log::trace;
use nalgebra::Matrix4;
use renderer::program::viewport_projection_bottom_up;

use crate::offscreen_target::OffscreenTarget;

/// Device handles and viewport of the frame being drawn.
#[derive(Clone, Copy)]
pub struct FrameContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub viewport_size: [u32; 2],
}

/// What a [`Scene`] is rendered into during a capture.
#[derive(Debug, Clone, Copy)]
pub struct SceneTarget {
    pub format: wgpu::TextureFormat,
    pub size: [u32; 2],
    /// Pixel space (top-left origin, Y down) to clip space, flipped so rows are stored
    /// bottom-up.
    pub projection: Matrix4<f32>,
}

/// Host scene that can be traversed into an arbitrary render pass.
pub trait Scene {
    fn visit(&self, render_pass: &mut wgpu::RenderPass<'_>, target: &SceneTarget);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OverlayHidden,
    Disabled,
    NoProgram,
    EmptyViewport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Skipped(SkipReason),
    Captured { size: [u32; 2] },
}

impl CaptureOutcome {
    pub fn is_captured(&self) -> bool {
        matches!(self, CaptureOutcome::Captured { .. })
    }
}

/// Clears `target` to transparent and renders `scene` into it in a pass of its own.
pub(crate) fn capture_scene(frame: &FrameContext<'_>, target: &OffscreenTarget, scene: &dyn Scene) {
    let scene_target = SceneTarget {
        format: target.format(),
        size: target.size(),
        projection: viewport_projection_bottom_up([
            target.width() as f32,
            target.height() as f32,
        ]),
    };

    let mut encoder = frame
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("BackdropBlur: Capture Encoder"),
        });

    {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("BackdropBlur: Capture Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view(),
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        trace!(
            "capture_scene: visiting scene into {}x{} target",
            scene_target.size[0], scene_target.size[1]
        );
        scene.visit(&mut render_pass, &scene_target);
    }

    frame.queue.submit(std::iter::once(encoder.finish()));
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use nalgebra::Vector4;

    use super::*;
    use gpu_utils::wgpu_utils::noop_wgpu;

    #[derive(Default)]
    struct RecordingScene {
        targets: RefCell<Vec<SceneTarget>>,
    }

    impl Scene for RecordingScene {
        fn visit(&self, _render_pass: &mut wgpu::RenderPass<'_>, target: &SceneTarget) {
            self.targets.borrow_mut().push(*target);
        }
    }

    #[test]
    fn test_scene_sees_target_and_flipped_projection() {
        pollster::block_on(async {
            let (_instance, _adapter, device, queue) = noop_wgpu().await;
            let target = OffscreenTarget::new(&device, [200, 100], wgpu::TextureFormat::Rgba8Unorm);
            let scene = RecordingScene::default();

            let frame = FrameContext {
                device: &device,
                queue: &queue,
                viewport_size: [200, 100],
            };
            capture_scene(&frame, &target, &scene);

            let targets = scene.targets.borrow();
            assert_eq!(targets.len(), 1);
            assert_eq!(targets[0].size, [200, 100]);
            assert_eq!(targets[0].format, wgpu::TextureFormat::Rgba8Unorm);

            // the top-left pixel lands at the bottom of clip space
            let top_left = targets[0].projection * Vector4::new(0.0, 0.0, 0.0, 1.0);
            assert!((top_left.x + 1.0).abs() < 1e-6);
            assert!((top_left.y + 1.0).abs() < 1e-6);
        });
    }

    #[test]
    fn test_outcome() {
        assert!(CaptureOutcome::Captured { size: [1, 1] }.is_captured());
        assert!(!CaptureOutcome::Skipped(SkipReason::Disabled).is_captured());
    }
}
