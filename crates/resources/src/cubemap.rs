//! Source cubemaps for the lighting precompute.
//!
//! A [`Cubemap`] is six square RGBA `f32` faces in Vulkan layer order
//! (+X, -X, +Y, -Y, +Z, -Z). It comes from a directory of face images, a
//! 6-face KTX file, or [`Cubemap::procedural_sky`].

use std::path::Path;

use glam::Vec3;
use sha2::{Digest, Sha256};

use crate::error::{ResourceError, ResourceResult};
use crate::ktx::{KtxHeader, KtxImage, PixelFormat};

/// Face file stems in layer order.
pub const FACE_NAMES: [&str; 6] = ["px", "nx", "py", "ny", "pz", "nz"];

const FACE_EXTENSIONS: [&str; 2] = ["hdr", "png"];

/// Six square faces of linear RGBA `f32` pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Cubemap {
    face_size: u32,
    /// Face-major, row-major within a face.
    pixels: Vec<f32>,
}

impl Cubemap {
    /// Wraps face-major pixels. `pixels` must hold `6 * size * size * 4`
    /// floats.
    pub fn from_pixels(face_size: u32, pixels: Vec<f32>) -> ResourceResult<Self> {
        let expected = 6 * face_size as usize * face_size as usize * 4;
        if face_size == 0 || pixels.len() != expected {
            return Err(ResourceError::SizeMismatch {
                expected: expected * 4,
                actual: pixels.len() * 4,
            });
        }
        Ok(Self { face_size, pixels })
    }

    /// Loads a cubemap from a KTX file or a directory of six face images.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        if path.is_dir() {
            Self::load_faces(path)
        } else {
            Self::load_ktx(path)
        }
    }

    fn load_ktx(path: &Path) -> ResourceResult<Self> {
        let image = KtxImage::read(path)?;
        let header = image.header();
        if header.faces != 6 {
            return Err(ResourceError::InvalidCubemap {
                path: path.to_path_buf(),
                reason: format!("KTX has {} face(s)", header.faces),
            });
        }

        let pixels = (0..6)
            .flat_map(|face| image.face_pixels_f32(0, face))
            .collect();
        tracing::info!(
            "Loaded cubemap '{}' ({}x{}, {:?})",
            path.display(),
            header.width,
            header.height,
            header.format
        );
        Self::from_pixels(header.width, pixels)
    }

    fn load_faces(dir: &Path) -> ResourceResult<Self> {
        let mut face_size = None;
        let mut pixels = Vec::new();

        for name in FACE_NAMES {
            let Some(face_path) = FACE_EXTENSIONS
                .iter()
                .map(|ext| dir.join(format!("{name}.{ext}")))
                .find(|p| p.exists())
            else {
                return Err(ResourceError::InvalidCubemap {
                    path: dir.to_path_buf(),
                    reason: format!("missing face '{name}' (.hdr or .png)"),
                });
            };

            let face = image::open(&face_path)?.to_rgba32f();
            let (width, height) = face.dimensions();
            if width != height {
                return Err(ResourceError::InvalidCubemap {
                    path: face_path,
                    reason: format!("face is {width}x{height}, not square"),
                });
            }
            match face_size {
                None => face_size = Some(width),
                Some(size) if size != width => {
                    return Err(ResourceError::InvalidCubemap {
                        path: face_path,
                        reason: format!("face is {width}px, others are {size}px"),
                    });
                }
                Some(_) => {}
            }
            pixels.extend_from_slice(face.as_raw());
        }

        let face_size = face_size.unwrap_or_default();
        tracing::info!(
            "Loaded cubemap faces from '{}' ({}x{})",
            dir.display(),
            face_size,
            face_size
        );
        Self::from_pixels(face_size, pixels)
    }

    /// A gradient sky with a sun and a darker ground, for when no
    /// environment is configured.
    pub fn procedural_sky(face_size: u32) -> Self {
        let zenith = Vec3::new(0.15, 0.35, 0.85);
        let horizon = Vec3::new(0.75, 0.85, 1.0);
        let ground = Vec3::new(0.25, 0.22, 0.2);
        let sun_dir = Vec3::new(0.4, 0.6, -0.7).normalize();
        let sun = Vec3::new(20.0, 18.0, 15.0);

        let size = face_size.max(1);
        let mut pixels = Vec::with_capacity(6 * size as usize * size as usize * 4);
        for face in 0..6 {
            for y in 0..size {
                for x in 0..size {
                    let dir = texel_direction(face, x, y, size);
                    let mut color = if dir.y >= 0.0 {
                        horizon.lerp(zenith, dir.y.powf(0.5))
                    } else {
                        horizon.lerp(ground, (-dir.y).powf(0.35))
                    };
                    if dir.dot(sun_dir) > 0.9995 {
                        color += sun;
                    }
                    pixels.extend_from_slice(&[color.x, color.y, color.z, 1.0]);
                }
            }
        }

        tracing::info!("Generated procedural sky ({}x{})", size, size);
        Self {
            face_size: size,
            pixels,
        }
    }

    #[inline]
    pub fn face_size(&self) -> u32 {
        self.face_size
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Pixel bytes in upload order: face 0 row 0 first.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// RGBA pixels of one face.
    pub fn face(&self, face: u32) -> &[f32] {
        let len = self.face_size as usize * self.face_size as usize * 4;
        let start = face as usize * len;
        &self.pixels[start..start + len]
    }

    /// Identifies this source for cache validation. Covers the size, the
    /// sample count the artifacts are integrated with, and every pixel.
    pub fn digest(&self, sample_count: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.face_size.to_le_bytes());
        hasher.update(sample_count.to_le_bytes());
        hasher.update(self.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// The cubemap as a single-mip RGBA32F KTX image.
    pub fn to_ktx(&self) -> ResourceResult<KtxImage> {
        KtxImage::new(
            KtxHeader {
                format: PixelFormat::Rgba32F,
                width: self.face_size,
                height: self.face_size,
                mip_levels: 1,
                faces: 6,
                array_layers: 1,
            },
            self.as_bytes().to_vec(),
        )
    }
}

/// World direction through the center of texel `(x, y)` of `face`, using
/// the Vulkan cube face orientation.
pub fn texel_direction(face: u32, x: u32, y: u32, size: u32) -> Vec3 {
    let u = 2.0 * (x as f32 + 0.5) / size as f32 - 1.0;
    let v = 2.0 * (y as f32 + 0.5) / size as f32 - 1.0;
    let dir = match face {
        0 => Vec3::new(1.0, -v, -u),
        1 => Vec3::new(-1.0, -v, u),
        2 => Vec3::new(u, 1.0, v),
        3 => Vec3::new(u, -1.0, -v),
        4 => Vec3::new(u, -v, 1.0),
        _ => Vec3::new(-u, -v, -1.0),
    };
    dir.normalize()
}
