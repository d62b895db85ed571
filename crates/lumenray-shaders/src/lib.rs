//! Compute kernels for the Lumenray path tracer.
//!
//! The GLSL sources under `shaders/` are compiled to SPIR-V at build time
//! with shaderc and embedded here.
//!
//! - `path_trace.comp`: traces one sample per pixel into the raw target.
//!   Set 0: `0` frame uniforms (UBO), `1` spheres (scalar storage buffer),
//!   `2` sky (combined sampler), `3` raw target (`rgba32f` storage image).
//!   Push constants: `uvec2 resolution; uint sphere_count; uint pad`.
//! - `accumulate.comp`: `accumulated = raw * w + accumulated * (1 - w)`.
//!   Set 0: `0` raw, `1` accumulated (both `rgba32f` storage images).
//!   Push constants: `uvec2 resolution; float weight; uint pad`.
//!
//! Both run 8x8x1 workgroups.

use std::sync::OnceLock;

mod spirv_bytes {
    pub static PATH_TRACE_COMP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/path_trace.spv"));
    pub static ACCUMULATE_COMP: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/accumulate.spv"));
}

/// Re-pack SPIR-V bytes as words; `include_bytes!` gives no alignment.
fn bytes_to_spirv(bytes: &[u8]) -> Vec<u32> {
    assert!(
        bytes.len() % 4 == 0,
        "SPIR-V bytecode must be a whole number of words"
    );
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

static PATH_TRACE_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();
static ACCUMULATE_SPIRV: OnceLock<Vec<u32>> = OnceLock::new();

/// Sphere path tracing kernel.
pub fn path_trace_shader() -> &'static [u32] {
    PATH_TRACE_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::PATH_TRACE_COMP))
}

/// Running-average blend kernel.
pub fn accumulate_shader() -> &'static [u32] {
    ACCUMULATE_SPIRV.get_or_init(|| bytes_to_spirv(spirv_bytes::ACCUMULATE_COMP))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn kernels_are_spirv() {
        for shader in [path_trace_shader(), accumulate_shader()] {
            assert_eq!(shader[0], SPIRV_MAGIC, "Invalid SPIR-V magic number");
            assert!(shader.len() > 20);
        }
    }

    #[test]
    fn trace_kernel_is_larger() {
        assert!(path_trace_shader().len() > accumulate_shader().len());
    }
}
