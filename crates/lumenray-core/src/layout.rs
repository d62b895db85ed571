//! Scene record layouts shared with the tracing kernel.
//!
//! Every record here is read by `path_trace.comp` through a `scalar` block
//! layout storage buffer. Field order and byte size must match the GLSL
//! declarations exactly:
//!
//! ```glsl
//! struct Sphere {
//!     float radius;
//!     float smoothness;
//!     float opacity;
//!     float refractiveSmoothness;
//!     float refractionIndex;
//!     vec3 position;
//!     vec3 albedo;
//!     vec3 specular;
//!     vec3 refractionTint;
//!     vec3 emission;
//! };
//! ```

use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};

/// A fixed-layout value uploaded into a structured GPU buffer.
///
/// The stride is always derived from the type itself; there is no way to
/// override it with a literal.
pub trait GpuRecord: Pod {
    /// Byte distance between two consecutive records in the buffer.
    const STRIDE: u64 = std::mem::size_of::<Self>() as u64;

    /// Human-readable layout name, used in logs and errors.
    const NAME: &'static str;

    /// Reject a caller-supplied stride that disagrees with the true layout.
    fn check_stride(stride: u64) -> Result<()> {
        if stride == Self::STRIDE {
            Ok(())
        } else {
            Err(Error::StrideMismatch {
                expected: Self::STRIDE,
                actual: stride,
            })
        }
    }

    /// Total buffer size in bytes for `count` records.
    fn buffer_size(count: usize) -> u64 {
        Self::STRIDE * count as u64
    }
}

/// Extended sphere record with the full refractive material (80 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SphereRecord {
    pub radius: f32,
    pub smoothness: f32,
    pub opacity: f32,
    pub refractive_smoothness: f32,
    pub refraction_index: f32,
    pub position: [f32; 3],
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
    pub refraction_tint: [f32; 3],
    pub emission: [f32; 3],
}

impl GpuRecord for SphereRecord {
    const NAME: &'static str = "sphere";
}

/// Minimal sphere record carrying only albedo and specular (40 bytes).
///
/// Layout used by the opaque-only kernel variant:
/// `vec3 position; float radius; vec3 albedo; vec3 specular;`
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MinimalSphereRecord {
    pub position: [f32; 3],
    pub radius: f32,
    pub albedo: [f32; 3],
    pub specular: [f32; 3],
}

impl GpuRecord for MinimalSphereRecord {
    const NAME: &'static str = "sphere_minimal";
}

impl From<&SphereRecord> for MinimalSphereRecord {
    fn from(record: &SphereRecord) -> Self {
        Self {
            position: record.position,
            radius: record.radius,
            albedo: record.albedo,
            specular: record.specular,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn sphere_record_size() {
        // 5 scalars + 5 packed vec3s
        assert_eq!(SphereRecord::STRIDE, 5 * 4 + 5 * 12);
        assert_eq!(SphereRecord::STRIDE, size_of::<SphereRecord>() as u64);
    }

    #[test]
    fn sphere_record_layout() {
        assert_eq!(offset_of!(SphereRecord, radius), 0);
        assert_eq!(offset_of!(SphereRecord, smoothness), 4);
        assert_eq!(offset_of!(SphereRecord, opacity), 8);
        assert_eq!(offset_of!(SphereRecord, refractive_smoothness), 12);
        assert_eq!(offset_of!(SphereRecord, refraction_index), 16);
        assert_eq!(offset_of!(SphereRecord, position), 20);
        assert_eq!(offset_of!(SphereRecord, albedo), 32);
        assert_eq!(offset_of!(SphereRecord, specular), 44);
        assert_eq!(offset_of!(SphereRecord, refraction_tint), 56);
        assert_eq!(offset_of!(SphereRecord, emission), 68);
    }

    #[test]
    fn minimal_record_size() {
        assert_eq!(MinimalSphereRecord::STRIDE, 40);
        assert_eq!(
            MinimalSphereRecord::STRIDE,
            size_of::<MinimalSphereRecord>() as u64
        );
    }

    #[test]
    fn minimal_record_layout() {
        assert_eq!(offset_of!(MinimalSphereRecord, position), 0);
        assert_eq!(offset_of!(MinimalSphereRecord, radius), 12);
        assert_eq!(offset_of!(MinimalSphereRecord, albedo), 16);
        assert_eq!(offset_of!(MinimalSphereRecord, specular), 28);
    }

    #[test]
    fn stride_check_rejects_hand_written_constant() {
        // 40 was the minimal layout's size; it is wrong for the extended one.
        let err = SphereRecord::check_stride(40).unwrap_err();
        assert!(matches!(
            err,
            Error::StrideMismatch {
                expected: 80,
                actual: 40
            }
        ));
        assert!(SphereRecord::check_stride(80).is_ok());
        assert!(MinimalSphereRecord::check_stride(40).is_ok());
    }

    #[test]
    fn buffer_size_scales_with_count() {
        assert_eq!(SphereRecord::buffer_size(3), 240);
        assert_eq!(MinimalSphereRecord::buffer_size(0), 0);
    }

    #[test]
    fn narrowing_keeps_geometry_and_colors() {
        let full = SphereRecord {
            radius: 2.0,
            position: [1.0, 2.0, 3.0],
            albedo: [0.1, 0.2, 0.3],
            specular: [0.4, 0.5, 0.6],
            emission: [9.0, 9.0, 9.0],
            ..SphereRecord::default()
        };
        let minimal = MinimalSphereRecord::from(&full);
        assert_eq!(minimal.radius, 2.0);
        assert_eq!(minimal.position, [1.0, 2.0, 3.0]);
        assert_eq!(minimal.albedo, [0.1, 0.2, 0.3]);
        assert_eq!(minimal.specular, [0.4, 0.5, 0.6]);
    }

    #[test]
    fn records_cast_to_bytes_without_padding() {
        let records = [SphereRecord::default(); 4];
        let bytes: &[u8] = bytemuck::cast_slice(&records);
        assert_eq!(bytes.len() as u64, SphereRecord::buffer_size(4));
    }
}
