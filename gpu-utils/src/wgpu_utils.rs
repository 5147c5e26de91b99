use std::sync::Arc;

use crate::gpu::Gpu;

fn noop_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::NOOP,
        backend_options: wgpu::BackendOptions {
            noop: wgpu::NoopBackendOptions { enable: true },
            ..Default::default()
        },
        ..Default::default()
    })
}

/// Device on wgpu's `noop` backend: resources can be created and work submitted, nothing runs.
/// For tests only; panics when the backend is unavailable.
pub async fn noop_wgpu() -> (wgpu::Instance, wgpu::Adapter, wgpu::Device, wgpu::Queue) {
    let instance = noop_instance();

    let Some(adapter) = instance.enumerate_adapters(wgpu::Backends::NOOP).pop() else {
        panic!("noop_wgpu: wgpu was built without the `noop` backend");
    };

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("noop device"),
            ..Default::default()
        })
        .await
        .unwrap_or_else(|e| panic!("noop_wgpu: failed to create device: {e}"));

    (instance, adapter, device, queue)
}

/// [`noop_wgpu`] wrapped in a [`Gpu`] handle.
pub async fn noop_gpu() -> Arc<Gpu> {
    let (instance, adapter, device, queue) = noop_wgpu().await;
    Gpu::from_parts(instance, adapter, device, queue)
}
