use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use tracing::{debug, info};
use wgpu::{AdapterInfo, ComputePipeline, Device, Queue};

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

// keyed by generated kernel source
type PipelineCache = HashMap<String, Arc<ComputePipeline>>;

pub struct GpuBackend {
    pub device: Arc<Device>,
    queue: Arc<Queue>,
    info: AdapterInfo,
    pipelines: Mutex<PipelineCache>,
}

/// Entries are inserted whole, so a cache left behind by a panicking thread
/// is still consistent.
fn lock_pipelines(pipelines: &Mutex<PipelineCache>) -> MutexGuard<'_, PipelineCache> {
    pipelines
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn request_adapter(
    instance: &wgpu::Instance,
    config: &BackendConfig,
) -> anyhow::Result<wgpu::Adapter> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            force_fallback_adapter: config.force_fallback_adapter,
            compatible_surface: None,
        })
        .await?;
    Ok(adapter)
}

impl GpuBackend {
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_config(&BackendConfig::default()).await
    }

    pub async fn with_config(config: &BackendConfig) -> anyhow::Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = request_adapter(&instance, config).await?;
        let info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("llops"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;
        info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "gpu backend ready"
        );

        Ok(GpuBackend {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
            pipelines: Mutex::new(HashMap::new()),
        })
    }

    /// Adapter that `with_config` would pick, if any.
    pub async fn probe(config: &BackendConfig) -> Option<AdapterInfo> {
        let instance = wgpu::Instance::default();
        match request_adapter(&instance, config).await {
            Ok(adapter) => Some(adapter.get_info()),
            Err(err) => {
                debug!(%err, "no wgpu adapter");
                None
            }
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &AdapterInfo {
        &self.info
    }

    /// Compiled pipeline for `source`, built on first request.
    pub(crate) fn pipeline(&self, label: &str, source: &str) -> anyhow::Result<Arc<ComputePipeline>> {
        let mut pipelines = lock_pipelines(&self.pipelines);
        if let Some(pipeline) = pipelines.get(source) {
            return Ok(pipeline.clone());
        }

        debug!(label, "compiling kernel");
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let pipeline = Arc::new(self.device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &shader,
                entry_point: None,
                compilation_options: Default::default(),
                cache: Default::default(),
            },
        ));
        pipelines.insert(source.to_owned(), pipeline.clone());
        Ok(pipeline)
    }

    pub fn cached_pipelines(&self) -> usize {
        lock_pipelines(&self.pipelines).len()
    }

    /// Blocks until every submitted command buffer has finished on the device.
    pub fn sync(&self) -> anyhow::Result<()> {
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        Ok(())
    }
}
