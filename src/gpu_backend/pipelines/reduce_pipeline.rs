use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::{
    gpu_backend::{
        backend::GpuBackend,
        buffer::GpuBuffer,
        pipelines::{WORKGROUP_SIZE, workgroup_grid},
    },
    shape::{MAX_RANK, Shape},
};

// One invocation per output element; each walks the reduced sub-space of
// `src` starting at the offset of its output coordinate.
const REDUCE_TEMPLATE: &str = r#"
struct ReduceParams {
    rank: u32,
    out_len: u32,
    red_len: u32,
    pad: u32,
    out_shape: array<u32, $MAX_RANK>,
    red_shape: array<u32, $MAX_RANK>,
    src_strides: array<u32, $MAX_RANK>,
}

@group(0) @binding(0) var<storage, read_write> dst: array<f32>;
@group(0) @binding(1) var<storage, read> src: array<f32>;
@group(0) @binding(2) var<storage, read> params: ReduceParams;

@compute @workgroup_size($WORKGROUP_SIZE)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let o = gid.y * groups.x * $WORKGROUP_SIZEu + gid.x;
    if (o >= params.out_len) {
        return;
    }

    var base = 0u;
    var rem = o;
    for (var i = 0u; i < params.rank; i++) {
        let d = params.rank - 1u - i;
        base += (rem % params.out_shape[d]) * params.src_strides[d];
        rem /= params.out_shape[d];
    }

    var acc: f32 = $INIT;
    for (var r = 0u; r < params.red_len; r++) {
        var offset = base;
        var rr = r;
        for (var i = 0u; i < params.rank; i++) {
            let d = params.rank - 1u - i;
            offset += (rr % params.red_shape[d]) * params.src_strides[d];
            rr /= params.red_shape[d];
        }
        let x = src[offset];
        acc = $COMBINE;
    }
    dst[o] = acc;
}
"#;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct ReduceParams {
    rank: u32,
    out_len: u32,
    red_len: u32,
    pad: u32,
    out_shape: [u32; MAX_RANK],
    red_shape: [u32; MAX_RANK],
    src_strides: [u32; MAX_RANK],
}

unsafe impl Zeroable for ReduceParams {}
unsafe impl Pod for ReduceParams {}

impl ReduceParams {
    /// `dst` must already be checked with [`Shape::is_reduction_of`].
    pub(crate) fn new(src: &Shape, dst: &Shape) -> Self {
        let mut params = ReduceParams {
            rank: src.rank() as u32,
            out_len: dst.numel() as u32,
            red_len: 1,
            pad: 0,
            out_shape: [1; MAX_RANK],
            red_shape: [1; MAX_RANK],
            src_strides: [0; MAX_RANK],
        };
        for (d, stride) in src.strides().into_iter().enumerate() {
            let (s, o) = (src.dims()[d], dst.dims()[d]);
            params.out_shape[d] = o as u32;
            params.src_strides[d] = stride as u32;
            if o == 1 {
                params.red_shape[d] = s as u32;
                params.red_len *= s as u32;
            }
        }
        params
    }
}

pub(crate) fn reduce_source(init: &str, combine: &str) -> String {
    REDUCE_TEMPLATE
        .replace("$MAX_RANK", &MAX_RANK.to_string())
        .replace("$WORKGROUP_SIZE", &WORKGROUP_SIZE.to_string())
        .replace("$INIT", init)
        .replace("$COMBINE", combine)
}

pub struct ReducePipeline {
    pipeline: Arc<wgpu::ComputePipeline>,
    backend: Arc<GpuBackend>,
}

impl ReducePipeline {
    /// `combine` folds the element `x` into the accumulator `acc`.
    pub fn new_pipeline(
        backend: Arc<GpuBackend>,
        label: &str,
        init: &str,
        combine: &str,
    ) -> anyhow::Result<Self> {
        let pipeline = backend.pipeline(label, &reduce_source(init, combine))?;
        Ok(Self { pipeline, backend })
    }

    /// Records and submits the kernel; returns before it runs.
    pub fn compute(&self, src: &GpuBuffer, dst: &GpuBuffer) -> anyhow::Result<()> {
        let device = &self.backend.device;
        let queue = self.backend.queue();

        let params = ReduceParams::new(src.shape(), dst.shape());
        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Reduce params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &self.pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: dst.raw().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: src.raw().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        let (x, y) = workgroup_grid(params.out_len);
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
    fn test_params_reduce_last_axis() -> anyhow::Result<()> {
        let params = ReduceParams::new(&Shape::new(&[1024, 1024])?, &Shape::new(&[1024, 1])?);
        assert_eq!(params.rank, 2);
        assert_eq!(params.out_len, 1024);
        assert_eq!(params.red_len, 1024);
        assert_eq!(params.out_shape[..2], [1024, 1]);
        assert_eq!(params.red_shape[..2], [1, 1024]);
        assert_eq!(params.src_strides[..2], [1024, 1]);
        Ok(())
    }

    #[test]
    fn test_params_full_reduction() -> anyhow::Result<()> {
        let params = ReduceParams::new(&Shape::new(&[4, 3, 2])?, &Shape::new(&[1, 1, 1])?);
        assert_eq!(params.out_len, 1);
        assert_eq!(params.red_len, 24);
        assert_eq!(params.red_shape[..3], [4, 3, 2]);
        assert_eq!(params.src_strides[..3], [6, 2, 1]);
        Ok(())
    }

    #[test]
    fn test_params_layout_matches_wgsl() {
        // 4 scalars + 3 * MAX_RANK array entries, all u32
        assert_eq!(size_of::<ReduceParams>(), 4 * (4 + 3 * MAX_RANK));
    }

    #[test]
    fn test_reduce_source_substitutes_placeholders() {
        let src = reduce_source("0.0", "acc + x");
        assert!(!src.contains('$'));
        assert!(src.contains("var acc: f32 = 0.0;"));
        assert!(src.contains("acc = acc + x;"));
        assert!(src.contains(&format!("array<u32, {MAX_RANK}>")));
        assert!(src.contains(&format!("{WORKGROUP_SIZE}u + gid.x")));
    }
}
