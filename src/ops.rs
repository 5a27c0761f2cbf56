//! Op kinds and the dispatch entry points.
//!
//! `unary_op`, `binary_op` and `reduce_op` validate their operands, then
//! record and submit a single kernel and return before it runs. `sync` is the
//! only barrier.

use std::sync::Arc;

use anyhow::ensure;

use crate::gpu_backend::{
    backend::GpuBackend,
    buffer::GpuBuffer,
    pipelines::{
        elementwise_pipeline::{ElementwisePipeline, OperandLayout},
        reduce_pipeline::ReducePipeline,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOps {
    Noop,
    Neg,
    Relu,
    Exp,
    Log,
    Sign,
    Reciprocal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOps {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    CmpEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOps {
    Sum,
    Max,
}

impl UnaryOps {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOps::Noop => "noop",
            UnaryOps::Neg => "neg",
            UnaryOps::Relu => "relu",
            UnaryOps::Exp => "exp",
            UnaryOps::Log => "log",
            UnaryOps::Sign => "sign",
            UnaryOps::Reciprocal => "reciprocal",
        }
    }

    /// WGSL expression over the input `A`.
    fn expr(self) -> &'static str {
        match self {
            UnaryOps::Noop => "A",
            UnaryOps::Neg => "-A",
            UnaryOps::Relu => "max(A, 0.0)",
            UnaryOps::Exp => "exp(A)",
            UnaryOps::Log => "log(A)",
            UnaryOps::Sign => "sign(A)",
            UnaryOps::Reciprocal => "1.0 / A",
        }
    }
}

impl BinaryOps {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOps::Add => "add",
            BinaryOps::Sub => "sub",
            BinaryOps::Mul => "mul",
            BinaryOps::Div => "div",
            BinaryOps::Pow => "pow",
            BinaryOps::CmpEq => "cmpeq",
        }
    }

    /// WGSL expression over the inputs `A` and `B`.
    fn expr(self) -> &'static str {
        match self {
            BinaryOps::Add => "A + B",
            BinaryOps::Sub => "A - B",
            BinaryOps::Mul => "A * B",
            BinaryOps::Div => "A / B",
            BinaryOps::Pow => "pow(A, B)",
            BinaryOps::CmpEq => "select(0.0, 1.0, A == B)",
        }
    }
}

impl ReduceOps {
    pub fn name(self) -> &'static str {
        match self {
            ReduceOps::Sum => "sum",
            ReduceOps::Max => "max",
        }
    }

    /// Accumulator start value and the fold of element `x` into `acc`.
    fn init_combine(self) -> (&'static str, &'static str) {
        match self {
            ReduceOps::Sum => ("0.0", "acc + x"),
            ReduceOps::Max => ("bitcast<f32>(0xff800000u)", "max(acc, x)"),
        }
    }
}

fn ensure_same_backend(inputs: &[&GpuBuffer], dst: &GpuBuffer) -> anyhow::Result<()> {
    ensure!(
        inputs
            .iter()
            .all(|input| Arc::ptr_eq(input.backend(), dst.backend())),
        "operands live on different backends"
    );
    Ok(())
}

fn ensure_same_shape(op: &str, inputs: &[&GpuBuffer], dst: &GpuBuffer) -> anyhow::Result<()> {
    for input in inputs {
        ensure!(
            input.shape() == dst.shape(),
            "{op}: input shape {} does not match output shape {}",
            input.shape(),
            dst.shape()
        );
    }
    Ok(())
}

/// `dst = op(src)`, elementwise. `src` may be `dst`.
pub fn unary_op(op: UnaryOps, src: &GpuBuffer, dst: &GpuBuffer) -> anyhow::Result<()> {
    ensure_same_backend(&[src], dst)?;
    ensure_same_shape(op.name(), &[src], dst)?;

    let layout = OperandLayout::resolve(&[src], dst);
    ElementwisePipeline::new_pipeline(dst.backend().clone(), op.name(), op.expr(), &layout)?
        .compute(&layout)
}

/// `dst = op(a, b)`, elementwise. Any operand may alias any other.
pub fn binary_op(
    op: BinaryOps,
    a: &GpuBuffer,
    b: &GpuBuffer,
    dst: &GpuBuffer,
) -> anyhow::Result<()> {
    ensure_same_backend(&[a, b], dst)?;
    ensure_same_shape(op.name(), &[a, b], dst)?;

    let layout = OperandLayout::resolve(&[a, b], dst);
    ElementwisePipeline::new_pipeline(dst.backend().clone(), op.name(), op.expr(), &layout)?
        .compute(&layout)
}

/// Reduces `src` over every axis where `dst` has size 1.
pub fn reduce_op(op: ReduceOps, src: &GpuBuffer, dst: &GpuBuffer) -> anyhow::Result<()> {
    ensure_same_backend(&[src], dst)?;
    ensure!(
        src.id() != dst.id(),
        "{}: cannot reduce a buffer into itself",
        op.name()
    );
    ensure!(
        dst.shape().is_reduction_of(src.shape()),
        "{}: output shape {} is not a reduction of {}",
        op.name(),
        dst.shape(),
        src.shape()
    );

    let (init, combine) = op.init_combine();
    ReducePipeline::new_pipeline(dst.backend().clone(), op.name(), init, combine)?
        .compute(src, dst)
}

/// Blocks until all work enqueued on `backend` has completed.
pub fn sync(backend: &GpuBackend) -> anyhow::Result<()> {
    backend.sync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu_backend::pipelines::reduce_pipeline::reduce_source;

    #[test]
    fn test_max_starts_at_negative_infinity() {
        let (init, combine) = ReduceOps::Max.init_combine();
        assert_eq!(init, "bitcast<f32>(0xff800000u)");
        assert_eq!(f32::from_bits(0xff80_0000), f32::NEG_INFINITY);
        assert!(reduce_source(init, combine).contains("var acc: f32 = bitcast<f32>(0xff800000u);"));
    }

    #[test]
    fn test_sum_starts_at_zero() {
        assert_eq!(ReduceOps::Sum.init_combine(), ("0.0", "acc + x"));
    }
}
