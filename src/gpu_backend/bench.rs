use std::sync::Arc;

use llops::{Device, GpuBackend, bench::suite::run_all_benchmarks};
use pollster::FutureExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if !Device::default_device().is_gpu() {
        warn!("default device is not the GPU, nothing to benchmark");
        return Ok(());
    }

    let backend = Arc::new(GpuBackend::new().block_on()?);
    info!(
        adapter = %backend.adapter_info().name,
        "running elementwise and reduce benchmarks"
    );
    for sample in run_all_benchmarks(&backend)? {
        println!("{sample}");
    }
    Ok(())
}
