//! Throughput of the elementwise and reduction kernels on fixed shapes.
//!
//! `_nosync` variants only drain the queue once after the loop, so they
//! measure enqueue cost. The others sync every iteration and measure
//! end-to-end latency.

use std::sync::Arc;

use ndarray::{ArrayD, IxDyn};

use crate::{
    bench::{Bench, BenchSample},
    gpu_backend::{backend::GpuBackend, buffer::GpuBuffer},
    ops::{BinaryOps, ReduceOps, UnaryOps, binary_op, reduce_op, sync, unary_op},
};

const SHAPE: [usize; 2] = [1024, 1024];

fn ones(backend: &Arc<GpuBackend>, shape: &[usize]) -> anyhow::Result<GpuBuffer> {
    GpuBuffer::from_host(backend, &ArrayD::<f32>::ones(IxDyn(shape)))
}

pub fn bench_unary_nosync(backend: &Arc<GpuBackend>) -> anyhow::Result<BenchSample> {
    let buf = ones(backend, &SHAPE)?;
    Bench::new("unary op (no sync)")
        .iterations(100_000)
        .done(|| sync(backend))
        .run(|| unary_op(UnaryOps::Neg, &buf, &buf))
}

pub fn bench_unary_tiny(backend: &Arc<GpuBackend>) -> anyhow::Result<BenchSample> {
    let buf = ones(backend, &[1])?;
    Bench::new("unary op tiny").run(|| {
        unary_op(UnaryOps::Neg, &buf, &buf)?;
        sync(backend)
    })
}

pub fn bench_unary(backend: &Arc<GpuBackend>) -> anyhow::Result<BenchSample> {
    let buf = ones(backend, &SHAPE)?;
    Bench::new("unary op").run(|| {
        unary_op(UnaryOps::Neg, &buf, &buf)?;
        sync(backend)
    })
}

pub fn bench_binary_nosync(backend: &Arc<GpuBackend>) -> anyhow::Result<BenchSample> {
    let buf_a = ones(backend, &SHAPE)?;
    let buf_b = ones(backend, &SHAPE)?;
    Bench::new("binary op (no sync)")
        .iterations(10_000)
        .done(|| sync(backend))
        .run(|| binary_op(BinaryOps::Add, &buf_a, &buf_b, &buf_a))
}

pub fn bench_binary(backend: &Arc<GpuBackend>) -> anyhow::Result<BenchSample> {
    let buf_a = ones(backend, &SHAPE)?;
    let buf_b = ones(backend, &SHAPE)?;
    Bench::new("binary op").run(|| {
        binary_op(BinaryOps::Add, &buf_a, &buf_b, &buf_a)?;
        sync(backend)
    })
}

pub fn bench_reduce(backend: &Arc<GpuBackend>) -> anyhow::Result<BenchSample> {
    let buf = ones(backend, &SHAPE)?;
    let buf_out = GpuBuffer::new(backend, &[1024, 1])?;
    Bench::new("reduce op").iterations(100).run(|| {
        reduce_op(ReduceOps::Sum, &buf, &buf_out)?;
        sync(backend)
    })
}

/// Collapses everything into one element, on a single invocation.
pub fn bench_reduce_full(backend: &Arc<GpuBackend>) -> anyhow::Result<BenchSample> {
    let buf = ones(backend, &SHAPE)?;
    let buf_out = GpuBuffer::new(backend, &[1, 1])?;
    Bench::new("reduce op full").iterations(10).run(|| {
        reduce_op(ReduceOps::Sum, &buf, &buf_out)?;
        sync(backend)
    })
}

pub fn run_all_benchmarks(backend: &Arc<GpuBackend>) -> anyhow::Result<Vec<BenchSample>> {
    let benches: [fn(&Arc<GpuBackend>) -> anyhow::Result<BenchSample>; 7] = [
        bench_unary_nosync,
        bench_unary_tiny,
        bench_unary,
        bench_binary_nosync,
        bench_binary,
        bench_reduce,
        bench_reduce_full,
    ];
    benches.iter().map(|bench| bench(backend)).collect()
}
