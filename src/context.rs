//! GPU context.
//!
//! The batching core never touches a surface: windowing and presentation belong
//! to the application. A [`Context`] is the device and queue every batch is
//! created on, either requested here (headless) or handed in by the host.

use anyhow::Context as _;

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub features: wgpu::Features,
}

impl Context {
    /// Requests an adapter and device without a surface.
    ///
    /// `INDIRECT_FIRST_INSTANCE` is enabled when the adapter offers it; batches
    /// rely on it to place each command's instances at its base offset.
    pub async fn new() -> anyhow::Result<Self> {
        log::info!("WGPU setup");
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;

        let features = adapter.features() & wgpu::Features::INDIRECT_FIRST_INSTANCE;
        if features.is_empty() {
            log::warn!("Adapter {:?} lacks INDIRECT_FIRST_INSTANCE", adapter.get_info().name);
        }

        log::info!("device and queue");
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("batch-ngin device"),
                required_features: features,
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .context("failed to create the GPU device")?;

        Ok(Self::from_parts(device, queue))
    }

    /// Blocking variant of [`Self::new`].
    pub fn new_blocking() -> anyhow::Result<Self> {
        futures::executor::block_on(Self::new())
    }

    /// Wraps a device and queue owned by the host application.
    pub fn from_parts(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let features = device.features();
        Self {
            device,
            queue,
            features,
        }
    }

    pub fn supports_first_instance(&self) -> bool {
        self.features
            .contains(wgpu::Features::INDIRECT_FIRST_INSTANCE)
    }
}
