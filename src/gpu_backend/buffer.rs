use std::{
    borrow::Cow,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use flume::bounded;
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use wgpu::util::{BufferInitDescriptor, DeviceExt};

use crate::{gpu_backend::backend::GpuBackend, shape::Shape};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

const STORAGE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

/// Device-resident `f32` data with a fixed shape.
///
/// Ops take buffers by shared reference and write them on the device, so the
/// same buffer can be both source and destination of an op.
pub struct GpuBuffer {
    id: u64,
    shape: Shape,
    buffer: wgpu::Buffer,
    backend: Arc<GpuBackend>,
}

impl GpuBuffer {
    /// Zero-initialized buffer.
    pub fn new(backend: &Arc<GpuBackend>, dims: &[usize]) -> anyhow::Result<Self> {
        let shape = Shape::new(dims)?;
        let size = byte_size(backend, &shape)?;
        let buffer = backend.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("llops buffer"),
            size,
            usage: STORAGE_USAGE,
            mapped_at_creation: false,
        });
        Ok(Self::wrap(backend, shape, buffer))
    }

    /// Buffer holding a copy of `hostbuf`, with the same shape.
    pub fn from_host<S, D>(
        backend: &Arc<GpuBackend>,
        hostbuf: &ArrayBase<S, D>,
    ) -> anyhow::Result<Self>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let shape = Shape::new(hostbuf.shape())?;
        byte_size(backend, &shape)?;
        let contents: Cow<'_, [f32]> = match hostbuf.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(hostbuf.iter().copied().collect()),
        };
        let buffer = backend.device.create_buffer_init(&BufferInitDescriptor {
            label: Some("llops buffer"),
            contents: bytemuck::cast_slice(&contents[..]),
            usage: STORAGE_USAGE,
        });
        Ok(Self::wrap(backend, shape, buffer))
    }

    fn wrap(backend: &Arc<GpuBackend>, shape: Shape, buffer: wgpu::Buffer) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            shape,
            buffer,
            backend: backend.clone(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn backend(&self) -> &Arc<GpuBackend> {
        &self.backend
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Copies the buffer back to the host once all prior work has finished.
    pub async fn to_host(&self) -> anyhow::Result<ArrayD<f32>> {
        let device = &self.backend.device;
        let queue = self.backend.queue();

        let temp_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: self.buffer.size(),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &temp_buffer, 0, self.buffer.size());
        queue.submit([encoder.finish()]);

        let (tx, rx) = bounded(1);
        temp_buffer.map_async(wgpu::MapMode::Read, .., move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::PollType::wait_indefinitely())?;
        rx.recv_async().await??;

        let data = {
            let mapped = temp_buffer.get_mapped_range(..);
            bytemuck::cast_slice::<u8, f32>(&mapped).to_vec()
        };
        temp_buffer.unmap();

        Ok(ArrayD::from_shape_vec(IxDyn(self.shape.dims()), data)?)
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .finish()
    }
}

fn byte_size(backend: &GpuBackend, shape: &Shape) -> anyhow::Result<u64> {
    let numel = shape.numel();
    anyhow::ensure!(
        u32::try_from(numel).is_ok(),
        "shape {shape} has {numel} elements, more than a kernel can index"
    );
    let size = (numel * size_of::<f32>()) as u64;
    let limit = backend.device.limits().max_storage_buffer_binding_size as u64;
    anyhow::ensure!(
        size <= limit,
        "shape {shape} needs {size} bytes, the device binds at most {limit}"
    );
    Ok(size)
}
