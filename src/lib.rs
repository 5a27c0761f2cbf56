pub mod bench;
pub mod device;
pub mod gpu_backend;
pub mod ops;
pub mod shape;

pub use bench::{Bench, BenchConfig, BenchSample, timeit};
pub use device::Device;
pub use gpu_backend::{
    backend::{BackendConfig, GpuBackend},
    buffer::GpuBuffer,
};
pub use ops::{BinaryOps, ReduceOps, UnaryOps, binary_op, reduce_op, sync, unary_op};
pub use shape::Shape;
