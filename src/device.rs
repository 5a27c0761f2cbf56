use std::sync::OnceLock;

use pollster::FutureExt;
use tracing::{info, warn};

use crate::gpu_backend::backend::{BackendConfig, GpuBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// No hardware adapter; the GPU kernels are not available.
    Cpu,
    Gpu,
}

static DEFAULT_DEVICE: OnceLock<Device> = OnceLock::new();

impl Device {
    /// Probed once per process. Software rasterizers count as [`Device::Cpu`].
    pub fn default_device() -> Device {
        *DEFAULT_DEVICE.get_or_init(|| Self::detect(&BackendConfig::default()))
    }

    pub fn detect(config: &BackendConfig) -> Device {
        match GpuBackend::probe(config).block_on() {
            Some(info) if info.device_type != wgpu::DeviceType::Cpu => {
                info!(adapter = %info.name, backend = ?info.backend, "default device is the gpu");
                Device::Gpu
            }
            Some(info) => {
                warn!(adapter = %info.name, "only a software adapter is available");
                Device::Cpu
            }
            None => {
                warn!("no wgpu adapter available");
                Device::Cpu
            }
        }
    }

    pub fn is_gpu(self) -> bool {
        self == Device::Gpu
    }
}
