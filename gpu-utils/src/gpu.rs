use fxhash::FxBuildHasher;
use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Descriptor used to configure and create a `Gpu` instance.
pub struct GpuDescriptor {
    /// Which wgpu backends to enable.
    pub backends: wgpu::Backends,
    /// Power preference for adapter selection.
    pub power_preference: wgpu::PowerPreference,
    /// Features that must be available on the device.
    pub required_features: wgpu::Features,
    /// Optional device limits to request. If `None`, the adapter's limits are used.
    pub required_limits: Option<wgpu::Limits>,
}

impl Default for GpuDescriptor {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::PRIMARY,
            power_preference: wgpu::PowerPreference::LowPower,
            required_features: wgpu::Features::empty(),
            required_limits: None,
        }
    }
}

static CALLBACK_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId {
    id: u64,
}

#[allow(clippy::new_without_default)]
impl CallbackId {
    pub fn new() -> Self {
        let id = CALLBACK_ID.fetch_add(1, Ordering::Relaxed);
        Self { id }
    }
}

/// Why GPU objects created so far can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextLostReason {
    /// The window switched between windowed and fullscreen (or similar), which recreates the
    /// presentation context.
    DisplayModeChanged,
    /// wgpu reported the device as lost.
    DeviceLost { message: String },
}

type ContextLostCallback = Arc<dyn Fn(&ContextLostReason) + Send + Sync>;

/// Owns a `wgpu::Instance`, the chosen adapter and the device/queue pair, and fans out
/// context-lost notifications to everything holding device-bound resources.
pub struct Gpu {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,

    device_lost: AtomicBool,
    context_lost_callback: Mutex<HashMap<CallbackId, ContextLostCallback, FxBuildHasher>>,
}

/* ----------------------
Constructors / getters
---------------------- */
impl Gpu {
    /// Create a new `Gpu` from descriptor.
    ///
    /// Validates required features against the chosen adapter, requests a device and queue and
    /// installs the device-lost and uncaptured-error handlers.
    pub async fn new(desc: GpuDescriptor) -> Result<Arc<Self>, GpuError> {
        let GpuDescriptor {
            backends,
            power_preference,
            required_features,
            required_limits,
        } = desc;

        trace!("Gpu::new: creating instance with backends={backends:?}, power_preference={power_preference:?}");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;
        debug!("Gpu::new: adapter received: {:#?}", adapter.get_info());

        let adapter_features = adapter.features();
        if !adapter_features.contains(required_features) {
            warn!(
                "Gpu::new: adapter does not support required features: required={required_features:?} available={adapter_features:?}"
            );
            return Err(GpuError::AdapterFeatureUnsupported);
        }

        let limits = required_limits.unwrap_or_else(|| adapter.limits());
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Gpu: request device"),
                required_features,
                required_limits: limits,
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        trace!("Gpu::new: device and queue successfully created");
        Ok(Self::from_parts(instance, adapter, device, queue))
    }

    /// Wrap objects the host already created. Device handlers are installed the same way as in
    /// [`Gpu::new`].
    pub fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Gpu>| {
            Self::install_device_callbacks(&device, weak);
            Self::install_uncaptured_error_handler(&device);

            Self {
                instance,
                adapter,
                device,
                queue,
                device_lost: AtomicBool::new(false),
                context_lost_callback: Default::default(),
            }
        })
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn is_device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }
}

/* ----------------------
Context-lost notification
---------------------- */
impl Gpu {
    /// Add a callback invoked whenever resources bound to the current context must be dropped.
    pub fn add_context_lost_callback(
        &self,
        callback: impl Fn(&ContextLostReason) + Send + Sync + 'static,
    ) -> CallbackId {
        let id = CallbackId::new();
        self.context_lost_callback
            .lock()
            .insert(id, Arc::new(callback));
        id
    }

    pub fn remove_context_lost_callback(&self, id: CallbackId) {
        self.context_lost_callback.lock().remove(&id);
    }

    /// Inbound notification from the windowing layer (e.g. a fullscreen toggle).
    pub fn notify_context_lost(&self, reason: ContextLostReason) {
        debug!("Gpu::notify_context_lost: reason={reason:?}");

        // Clone out of the lock so callbacks may add or remove callbacks themselves.
        let callbacks: Vec<_> = self
            .context_lost_callback
            .lock()
            .values()
            .cloned()
            .collect();
        for cb in callbacks {
            cb(&reason);
        }
    }
}

/* ----------------------
Private helpers
---------------------- */
impl Gpu {
    fn install_device_callbacks(device: &wgpu::Device, weak: &Weak<Gpu>) {
        let weak = weak.clone();
        device.set_device_lost_callback(move |reason, message| {
            warn!("Gpu: device lost: reason={reason:?} message={message}");
            if let Some(gpu) = weak.upgrade() {
                gpu.device_lost.store(true, Ordering::Release);
                gpu.notify_context_lost(ContextLostReason::DeviceLost { message });
            }
        });
    }

    fn install_uncaptured_error_handler(device: &wgpu::Device) {
        device.on_uncaptured_error(Box::new(|err| {
            error!("gpu-utils: uncaptured wgpu error: {err:?}");
        }));
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    #[error("Failed to request adapter")]
    AdapterRequestFailed(#[from] wgpu::RequestAdapterError),
    #[error("Adapter does not support required features")]
    AdapterFeatureUnsupported,
    #[error("Failed to request device")]
    DeviceRequestFailed(#[from] wgpu::RequestDeviceError),
}
