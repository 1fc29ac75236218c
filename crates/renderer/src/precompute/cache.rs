//! On-disk artifact cache.
//!
//! Each artifact lives at `<cache_dir>/<kind>.ktx`. A file is reused only
//! when its header matches the expected shape and its digest entry matches
//! the current source.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use vkframe_resources::{KtxHeader, KtxImage};

use super::artifact::{ArtifactKind, DIGEST_KEY};
use crate::error::RendererResult;

/// Why a cached artifact was not used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheMiss {
    Missing,
    Unreadable(String),
    HeaderMismatch {
        expected: KtxHeader,
        found: KtxHeader,
    },
    DigestMismatch,
}

impl fmt::Display for CacheMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheMiss::Missing => write!(f, "not cached"),
            CacheMiss::Unreadable(reason) => write!(f, "unreadable: {reason}"),
            CacheMiss::HeaderMismatch { expected, found } => {
                write!(f, "expected {expected:?}, found {found:?}")
            }
            CacheMiss::DigestMismatch => write!(f, "source changed"),
        }
    }
}

/// Checks a loaded artifact against what the current source would produce.
pub fn validate(image: &KtxImage, expected: &KtxHeader, digest: &str) -> Result<(), CacheMiss> {
    if image.header() != expected {
        return Err(CacheMiss::HeaderMismatch {
            expected: *expected,
            found: *image.header(),
        });
    }
    match image.key_value(DIGEST_KEY) {
        Some(stored) if stored == digest => Ok(()),
        _ => Err(CacheMiss::DigestMismatch),
    }
}

pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Reads and validates one artifact.
    pub fn lookup(
        &self,
        kind: ArtifactKind,
        expected: &KtxHeader,
        digest: &str,
    ) -> Result<KtxImage, CacheMiss> {
        let path = self.path(kind);
        if !path.exists() {
            return Err(CacheMiss::Missing);
        }
        let image = KtxImage::read(&path).map_err(|e| CacheMiss::Unreadable(e.to_string()))?;
        validate(&image, expected, digest)?;
        Ok(image)
    }

    /// Like [`ArtifactCache::lookup`], logging the outcome and folding
    /// every miss into `None`.
    pub fn load(&self, kind: ArtifactKind, expected: &KtxHeader, digest: &str) -> Option<KtxImage> {
        match self.lookup(kind, expected, digest) {
            Ok(image) => {
                info!("Cache hit for {} at '{}'", kind.label(), self.path(kind).display());
                Some(image)
            }
            Err(CacheMiss::Missing) => {
                debug!("No cached {}", kind.label());
                None
            }
            Err(miss) => {
                warn!("Discarding cached {}: {}", kind.label(), miss);
                None
            }
        }
    }

    /// Writes an artifact, creating the cache directory if needed.
    pub fn store(&self, kind: ArtifactKind, image: &KtxImage) -> RendererResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(vkframe_resources::ResourceError::from)?;
        let path = self.path(kind);
        image.write(&path)?;
        info!("Stored {} at '{}'", kind.label(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use vkframe_resources::PixelFormat;

    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vkframe-cache-{}-{}", name, std::process::id()))
    }

    fn artifact(kind: ArtifactKind, source_face: u32, digest: &str) -> KtxImage {
        let header = kind.expected_header(source_face);
        KtxImage::new(header, vec![0u8; header.payload_size()])
            .unwrap()
            .with_key_value(DIGEST_KEY, digest)
    }

    #[test]
    fn test_validate_accepts_matching() {
        let image = artifact(ArtifactKind::Prefiltered, 8, "abc");
        let expected = ArtifactKind::Prefiltered.expected_header(8);
        assert_eq!(validate(&image, &expected, "abc"), Ok(()));
    }

    #[test]
    fn test_validate_rejects_changed_source() {
        let image = artifact(ArtifactKind::Irradiance, 8, "abc");
        let expected = ArtifactKind::Irradiance.expected_header(8);
        assert_eq!(
            validate(&image, &expected, "def"),
            Err(CacheMiss::DigestMismatch)
        );
    }

    #[test]
    fn test_validate_rejects_shape_change() {
        let image = artifact(ArtifactKind::Prefiltered, 8, "abc");
        let expected = ArtifactKind::Prefiltered.expected_header(16);
        assert!(matches!(
            validate(&image, &expected, "abc"),
            Err(CacheMiss::HeaderMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_digest() {
        let header = KtxHeader {
            format: PixelFormat::Rgba16F,
            width: 256,
            height: 256,
            mip_levels: 1,
            faces: 1,
            array_layers: 1,
        };
        let image = KtxImage::new(header, vec![0u8; header.payload_size()]).unwrap();
        assert_eq!(
            validate(&image, &header, "anything"),
            Err(CacheMiss::DigestMismatch)
        );
    }

    #[test]
    fn test_store_then_load() {
        let dir = temp_dir("roundtrip");
        let cache = ArtifactCache::new(dir.join("nested"));
        let image = artifact(ArtifactKind::Prefiltered, 4, "digest");
        let expected = ArtifactKind::Prefiltered.expected_header(4);

        cache.store(ArtifactKind::Prefiltered, &image).unwrap();
        let loaded = cache.load(ArtifactKind::Prefiltered, &expected, "digest");
        assert_eq!(loaded.map(|i| *i.header()), Some(expected));

        assert!(cache.load(ArtifactKind::Prefiltered, &expected, "other").is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_and_corrupt_files() {
        let dir = temp_dir("corrupt");
        let cache = ArtifactCache::new(&dir);
        let expected = ArtifactKind::Irradiance.expected_header(8);
        assert_eq!(
            cache.lookup(ArtifactKind::Irradiance, &expected, "d").err(),
            Some(CacheMiss::Missing)
        );

        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(cache.path(ArtifactKind::Irradiance), b"not a ktx file").unwrap();
        assert!(matches!(
            cache.lookup(ArtifactKind::Irradiance, &expected, "d"),
            Err(CacheMiss::Unreadable(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_dimensions_are_a_miss_not_a_crash() {
        let dir = temp_dir("dimensions");
        let cache = ArtifactCache::new(&dir);
        let expected = ArtifactKind::Irradiance.expected_header(8);
        cache
            .store(ArtifactKind::Irradiance, &artifact(ArtifactKind::Irradiance, 8, "d"))
            .unwrap();
        let path = cache.path(ArtifactKind::Irradiance);
        let original = std::fs::read(&path).unwrap();

        // Width and height follow the identifier and six header words.
        for (size, keep) in [(u32::MAX, original.len()), (1 << 20, 12 + 13 * 4 + 64)] {
            let mut bytes = original.clone();
            bytes[36..40].copy_from_slice(&size.to_le_bytes());
            bytes[40..44].copy_from_slice(&size.to_le_bytes());
            bytes.truncate(keep);
            std::fs::write(&path, &bytes).unwrap();
            assert!(matches!(
                cache.lookup(ArtifactKind::Irradiance, &expected, "d"),
                Err(CacheMiss::Unreadable(_))
            ));
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
