//! Artifact shapes and the dispatch math shared by every pass.

use vkframe_resources::{KtxHeader, PixelFormat};
use vkframe_rhi::image::full_mip_count;

/// Importance samples per output texel.
pub const SAMPLE_COUNT: u32 = 2048;

/// Side of the square compute workgroup tile.
pub const WORKGROUP_SIZE: u32 = 16;

/// The BRDF table is always 256x256.
pub const BRDF_LUT_SIZE: u32 = 256;

/// Irradiance carries no high frequencies, so its faces are capped at this
/// size.
pub const IRRADIANCE_FACE_SIZE: u32 = 64;

/// KTX key/value entry holding the cache digest.
pub const DIGEST_KEY: &str = "vkframe.source-digest";

/// The three persisted outputs of the precompute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Diffuse convolution, one mip.
    Irradiance,
    /// Specular prefilter, one mip per roughness step.
    Prefiltered,
    /// Split-sum BRDF integration table.
    BrdfLut,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Irradiance,
        ArtifactKind::Prefiltered,
        ArtifactKind::BrdfLut,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Irradiance => "irradiance.ktx",
            ArtifactKind::Prefiltered => "prefiltered.ktx",
            ArtifactKind::BrdfLut => "brdf_lut.ktx",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArtifactKind::Irradiance => "irradiance",
            ArtifactKind::Prefiltered => "prefiltered",
            ArtifactKind::BrdfLut => "brdf_lut",
        }
    }

    /// Header the artifact must have for a source with `source_face_size`.
    pub fn expected_header(self, source_face_size: u32) -> KtxHeader {
        match self {
            ArtifactKind::Irradiance => {
                let size = source_face_size.min(IRRADIANCE_FACE_SIZE);
                cube_header(size, 1)
            }
            ArtifactKind::Prefiltered => {
                cube_header(source_face_size, mip_count(source_face_size))
            }
            ArtifactKind::BrdfLut => KtxHeader {
                format: PixelFormat::Rgba16F,
                width: BRDF_LUT_SIZE,
                height: BRDF_LUT_SIZE,
                mip_levels: 1,
                faces: 1,
                array_layers: 1,
            },
        }
    }

    /// Digest an up-to-date artifact stores. The BRDF table does not depend
    /// on the environment, only on the sample count.
    pub fn expected_digest(self, source_digest: &str) -> String {
        match self {
            ArtifactKind::BrdfLut => format!("split-sum/{SAMPLE_COUNT}"),
            _ => source_digest.to_string(),
        }
    }
}

fn cube_header(face_size: u32, mip_levels: u32) -> KtxHeader {
    KtxHeader {
        format: PixelFormat::Rgba32F,
        width: face_size,
        height: face_size,
        mip_levels,
        faces: 6,
        array_layers: 1,
    }
}

/// `floor(log2(size)) + 1`.
#[inline]
pub fn mip_count(size: u32) -> u32 {
    full_mip_count(size, size)
}

/// Roughness integrated into `mip`: 0 at the base, 1 at the last level.
pub fn roughness_for_mip(mip: u32, mip_count: u32) -> f32 {
    if mip_count <= 1 {
        0.0
    } else {
        mip as f32 / (mip_count - 1) as f32
    }
}

/// Workgroups along one axis for a `dim`-texel face.
#[inline]
pub fn dispatch_groups(dim: u32) -> u32 {
    dim.div_ceil(WORKGROUP_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_512_source_shapes() {
        let prefiltered = ArtifactKind::Prefiltered.expected_header(512);
        assert_eq!(prefiltered.mip_levels, 10);
        assert_eq!(prefiltered.faces, 6);
        assert_eq!(prefiltered.format, PixelFormat::Rgba32F);

        let irradiance = ArtifactKind::Irradiance.expected_header(512);
        assert_eq!(irradiance.mip_levels, 1);
        assert_eq!(irradiance.faces, 6);
        assert_eq!(irradiance.width, IRRADIANCE_FACE_SIZE);
    }

    #[test]
    fn test_small_source_keeps_irradiance_size() {
        assert_eq!(ArtifactKind::Irradiance.expected_header(16).width, 16);
    }

    #[test]
    fn test_brdf_lut_shape() {
        let header = ArtifactKind::BrdfLut.expected_header(512);
        assert_eq!(header.format, PixelFormat::Rgba16F);
        assert_eq!((header.width, header.height), (256, 256));
        assert_eq!(header.faces, 1);
        assert_eq!(ArtifactKind::BrdfLut.expected_header(32), header);
    }

    #[test]
    fn test_mip_count() {
        assert_eq!(mip_count(1), 1);
        assert_eq!(mip_count(2), 2);
        assert_eq!(mip_count(512), 10);
        assert_eq!(mip_count(600), 10);
    }

    #[test]
    fn test_roughness_spans_zero_to_one() {
        assert_eq!(roughness_for_mip(0, 10), 0.0);
        assert_eq!(roughness_for_mip(9, 10), 1.0);
        assert!((roughness_for_mip(3, 10) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(roughness_for_mip(0, 1), 0.0);
    }

    #[test]
    fn test_dispatch_groups_round_up() {
        assert_eq!(dispatch_groups(512), 32);
        assert_eq!(dispatch_groups(17), 2);
        assert_eq!(dispatch_groups(1), 1);
        assert_eq!(dispatch_groups(BRDF_LUT_SIZE), 16);
    }

    #[test]
    fn test_headers_are_stable() {
        for kind in ArtifactKind::ALL {
            assert_eq!(kind.expected_header(256), kind.expected_header(256));
        }
    }

    #[test]
    fn test_brdf_digest_ignores_source() {
        assert_eq!(
            ArtifactKind::BrdfLut.expected_digest("a"),
            ArtifactKind::BrdfLut.expected_digest("b")
        );
        assert_eq!(ArtifactKind::Prefiltered.expected_digest("a"), "a");
    }
}
