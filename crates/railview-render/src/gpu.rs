//! Headless GPU device initialization.
//!
//! The viewer does not own a window; it only needs a device to upload streamed
//! meshes. [`init_headless_device`] picks any adapter without a surface.

/// Error type for device initialization failures.
#[derive(Debug, thiserror::Error)]
pub enum RenderContextError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// A device and queue with no presentation surface.
#[derive(Debug)]
pub struct HeadlessDevice {
    pub adapter_info: wgpu::AdapterInfo,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

/// Request a device from the first available adapter, blocking on the futures.
pub fn init_headless_device() -> Result<HeadlessDevice, RenderContextError> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderContextError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?}, {:?})",
            adapter_info.name,
            adapter_info.backend,
            adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("railview-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        Ok(HeadlessDevice {
            adapter_info,
            device,
            queue,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_device_limits() {
        let Ok(headless) = init_headless_device() else {
            return;
        };
        assert!(headless.device.limits().max_buffer_size > 0);
    }
}
