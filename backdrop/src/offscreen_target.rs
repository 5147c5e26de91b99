use log::debug;

/// Color texture the scene is re-rendered into, sampled afterwards by the backdrop blit.
///
/// The size is fixed at creation. A viewport of another size needs a new target.
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: [u32; 2],
    format: wgpu::TextureFormat,
}

impl OffscreenTarget {
    pub fn new(device: &wgpu::Device, size: [u32; 2], format: wgpu::TextureFormat) -> Self {
        debug!(
            "OffscreenTarget::new: creating {}x{} {format:?} target",
            size[0], size[1]
        );

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("OffscreenTarget: Texture"),
            size: wgpu::Extent3d {
                width: size[0],
                height: size[1],
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            size,
            format,
        }
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size[0]
    }

    pub fn height(&self) -> u32 {
        self.size[1]
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Whether this target can be reused for a capture of `size` in `format`.
    pub fn matches(&self, size: [u32; 2], format: wgpu::TextureFormat) -> bool {
        self.size == size && self.format == format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_utils::wgpu_utils::noop_wgpu;

    #[test]
    fn test_target_dimensions() {
        pollster::block_on(async {
            let (_instance, _adapter, device, _queue) = noop_wgpu().await;
            let format = wgpu::TextureFormat::Rgba8Unorm;
            let target = OffscreenTarget::new(&device, [320, 200], format);

            assert_eq!(target.size(), [320, 200]);
            assert_eq!((target.width(), target.height()), (320, 200));
            assert_eq!(target.texture().width(), 320);
            assert_eq!(target.texture().height(), 200);
            assert!(
                target
                    .texture()
                    .usage()
                    .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
            );

            assert!(target.matches([320, 200], format));
            assert!(!target.matches([321, 200], format));
            assert!(!target.matches([320, 200], wgpu::TextureFormat::Bgra8Unorm));
        });
    }
}
