pub mod elementwise_pipeline;
pub mod reduce_pipeline;

pub const WORKGROUP_SIZE: u32 = 256;

const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65535;

/// Workgroup grid covering `invocations` threads. Kernels linearize the
/// index as `gid.y * groups.x * WORKGROUP_SIZE + gid.x`.
pub(crate) fn workgroup_grid(invocations: u32) -> (u32, u32) {
    let groups = invocations.div_ceil(WORKGROUP_SIZE).max(1);
    if groups <= MAX_WORKGROUPS_PER_DIMENSION {
        (groups, 1)
    } else {
        (
            MAX_WORKGROUPS_PER_DIMENSION,
            groups.div_ceil(MAX_WORKGROUPS_PER_DIMENSION),
        )
    }
}
