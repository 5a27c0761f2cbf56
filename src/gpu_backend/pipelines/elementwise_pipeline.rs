use std::{fmt::Write, sync::Arc};

use crate::gpu_backend::{
    backend::GpuBackend,
    buffer::GpuBuffer,
    pipelines::{WORKGROUP_SIZE, workgroup_grid},
};

/// Names the kernel expressions use for the first and second input.
const OPERAND_NAMES: [&str; 2] = ["A", "B"];

/// Binding assignment for one elementwise call.
///
/// Binding 0 is always the destination. Each distinct input buffer gets its
/// own read-only binding; an input that is the destination, or that repeats
/// another input, reuses that binding, since wgpu rejects a buffer bound twice
/// with a writable usage.
pub struct OperandLayout<'a> {
    bound: Vec<&'a GpuBuffer>,
    operands: Vec<usize>,
}

impl<'a> OperandLayout<'a> {
    pub fn resolve(inputs: &[&'a GpuBuffer], dst: &'a GpuBuffer) -> Self {
        let mut bound = vec![dst];
        let operands = inputs
            .iter()
            .map(|input| match bound.iter().position(|b| b.id() == input.id()) {
                Some(binding) => binding,
                None => {
                    bound.push(*input);
                    bound.len() - 1
                }
            })
            .collect();
        Self { bound, operands }
    }

    pub fn bindings(&self) -> usize {
        self.bound.len()
    }

    fn dst(&self) -> &GpuBuffer {
        self.bound[0]
    }
}

pub(crate) fn elementwise_source(
    expr: &str,
    operands: &[usize],
    bindings: usize,
) -> anyhow::Result<String> {
    anyhow::ensure!(
        operands.len() <= OPERAND_NAMES.len(),
        "elementwise kernels take at most {} inputs",
        OPERAND_NAMES.len()
    );
    let mut src = String::new();
    for binding in 0..bindings {
        let access = if binding == 0 { "read_write" } else { "read" };
        writeln!(
            src,
            "@group(0) @binding({binding}) var<storage, {access}> buf{binding}: array<f32>;"
        )?;
    }
    writeln!(src)?;
    writeln!(src, "@compute @workgroup_size({WORKGROUP_SIZE})")?;
    writeln!(
        src,
        "fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {{"
    )?;
    writeln!(src, "    let idx = gid.y * groups.x * {WORKGROUP_SIZE}u + gid.x;")?;
    writeln!(src, "    if (idx >= arrayLength(&buf0)) {{")?;
    writeln!(src, "        return;")?;
    writeln!(src, "    }}")?;
    for (name, binding) in OPERAND_NAMES.iter().zip(operands) {
        writeln!(src, "    let {name} = buf{binding}[idx];")?;
    }
    writeln!(src, "    buf0[idx] = {expr};")?;
    writeln!(src, "}}")?;
    Ok(src)
}

pub struct ElementwisePipeline {
    pipeline: Arc<wgpu::ComputePipeline>,
    backend: Arc<GpuBackend>,
}

impl ElementwisePipeline {
    pub fn new_pipeline(
        backend: Arc<GpuBackend>,
        label: &str,
        expr: &str,
        layout: &OperandLayout<'_>,
    ) -> anyhow::Result<Self> {
        let source = elementwise_source(expr, &layout.operands, layout.bindings())?;
        let pipeline = backend.pipeline(label, &source)?;
        Ok(Self { pipeline, backend })
    }

    /// Records and submits the kernel; returns before it runs.
    pub fn compute(&self, layout: &OperandLayout<'_>) -> anyhow::Result<()> {
        let device = &self.backend.device;
        let queue = self.backend.queue();

        let entries: Vec<wgpu::BindGroupEntry<'_>> = layout
            .bound
            .iter()
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.raw().as_entire_binding(),
            })
            .collect();
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &self.pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let (x, y) = workgroup_grid(layout.dst().shape().numel() as u32);
        let mut encoder = device.create_command_encoder(&Default::default());
        {
            let mut pass = encoder.begin_compute_pass(&Default::default());
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(x, y, 1);
        }

        queue.submit([encoder.finish()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_place_binary_source() -> anyhow::Result<()> {
        // add(a, b, a): A aliases the destination, B gets its own binding
        let src = elementwise_source("A + B", &[0, 1], 2)?;
        assert!(src.contains("@binding(0) var<storage, read_write> buf0"));
        assert!(src.contains("@binding(1) var<storage, read> buf1"));
        assert!(!src.contains("@binding(2)"));
        assert!(src.contains("let A = buf0[idx];"));
        assert!(src.contains("let B = buf1[idx];"));
        assert!(src.contains("buf0[idx] = A + B;"));
        Ok(())
    }

    #[test]
    fn test_in_place_unary_source() -> anyhow::Result<()> {
        let src = elementwise_source("-A", &[0], 1)?;
        assert!(!src.contains("@binding(1)"));
        assert!(src.contains("let A = buf0[idx];"));
        assert!(src.contains(&format!("@workgroup_size({WORKGROUP_SIZE})")));
        Ok(())
    }

    #[test]
    fn test_too_many_operands() {
        assert!(elementwise_source("A", &[1, 2, 3], 4).is_err());
    }
}
