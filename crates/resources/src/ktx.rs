//! KTX 1.1 container codec.
//!
//! Used for the persisted lighting artifacts and for cubemap sources. Only
//! uncompressed RGBA formats are handled. Files are always written
//! little-endian; big-endian files are rejected on read.
//!
//! Pixel payload order is mip-major, then array layer, then face. Every
//! supported format has 4-byte pixels or larger multiples, so rows, faces
//! and mips need no padding and every region starts 4-byte aligned.

use std::path::Path;

use half::f16;

use crate::error::{ResourceError, ResourceResult};

/// File identifier every KTX 1.1 file starts with.
pub const KTX_IDENTIFIER: [u8; 12] = [
    0xAB, b'K', b'T', b'X', b' ', b'1', b'1', 0xBB, b'\r', b'\n', 0x1A, b'\n',
];

const ENDIANNESS: u32 = 0x0403_0201;
const HEADER_SIZE: usize = 12 + 13 * 4;

const GL_UNSIGNED_BYTE: u32 = 0x1401;
const GL_FLOAT: u32 = 0x1406;
const GL_HALF_FLOAT: u32 = 0x140B;
const GL_RGBA: u32 = 0x1908;
const GL_RGBA8: u32 = 0x8058;
const GL_RGBA32F: u32 = 0x8814;
const GL_RGBA16F: u32 = 0x881A;

/// Pixel formats the codec reads and writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8,
    Rgba16F,
    Rgba32F,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba16F => 8,
            PixelFormat::Rgba32F => 16,
        }
    }

    fn gl_type(self) -> u32 {
        match self {
            PixelFormat::Rgba8 => GL_UNSIGNED_BYTE,
            PixelFormat::Rgba16F => GL_HALF_FLOAT,
            PixelFormat::Rgba32F => GL_FLOAT,
        }
    }

    fn gl_type_size(self) -> u32 {
        match self {
            PixelFormat::Rgba8 => 1,
            PixelFormat::Rgba16F => 2,
            PixelFormat::Rgba32F => 4,
        }
    }

    fn gl_internal_format(self) -> u32 {
        match self {
            PixelFormat::Rgba8 => GL_RGBA8,
            PixelFormat::Rgba16F => GL_RGBA16F,
            PixelFormat::Rgba32F => GL_RGBA32F,
        }
    }

    fn from_gl(internal_format: u32, gl_type: u32) -> ResourceResult<Self> {
        match (internal_format, gl_type) {
            (GL_RGBA8, GL_UNSIGNED_BYTE) => Ok(PixelFormat::Rgba8),
            (GL_RGBA16F, GL_HALF_FLOAT) => Ok(PixelFormat::Rgba16F),
            (GL_RGBA32F, GL_FLOAT) => Ok(PixelFormat::Rgba32F),
            _ => Err(ResourceError::UnsupportedKtxFormat {
                internal_format,
                gl_type,
            }),
        }
    }
}

/// Image metadata stored in the file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KtxHeader {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    /// 1 or 6.
    pub faces: u32,
    /// At least 1. Written as 0 when 1, as KTX expects for non-arrays.
    pub array_layers: u32,
}

impl KtxHeader {
    /// Size of mip `mip`, never below 1x1.
    pub fn mip_extent(&self, mip: u32) -> (u32, u32) {
        ((self.width >> mip).max(1), (self.height >> mip).max(1))
    }

    /// Bytes of one face of one layer at `mip`.
    ///
    /// Assumes [`KtxHeader::checked_payload_size`] is `Some`, which every
    /// header that passed validation guarantees.
    pub fn face_size(&self, mip: u32) -> usize {
        let (w, h) = self.mip_extent(mip);
        w as usize * h as usize * self.format.bytes_per_pixel()
    }

    /// Total payload size, or `None` when it does not fit in `usize`.
    pub fn checked_payload_size(&self) -> Option<usize> {
        let layers = (self.faces as usize).checked_mul(self.array_layers as usize)?;
        (0..self.mip_levels).try_fold(0usize, |total, mip| {
            let (w, h) = self.mip_extent(mip);
            let face = (w as usize)
                .checked_mul(h as usize)?
                .checked_mul(self.format.bytes_per_pixel())?;
            total.checked_add(face.checked_mul(layers)?)
        })
    }

    /// Bytes of all layers and faces at `mip`.
    pub fn mip_size(&self, mip: u32) -> usize {
        self.face_size(mip) * self.faces as usize * self.array_layers as usize
    }

    /// Total payload size.
    pub fn payload_size(&self) -> usize {
        (0..self.mip_levels).map(|mip| self.mip_size(mip)).sum()
    }

    /// Offset of one face region within the payload.
    pub fn region_offset(&self, mip: u32, layer: u32, face: u32) -> usize {
        let before: usize = (0..mip).map(|m| self.mip_size(m)).sum();
        before + (layer * self.faces + face) as usize * self.face_size(mip)
    }

    fn validate(&self) -> ResourceResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ResourceError::InvalidKtx(format!(
                "zero-sized image {}x{}",
                self.width, self.height
            )));
        }
        if self.faces != 1 && self.faces != 6 {
            return Err(ResourceError::InvalidKtx(format!(
                "{} faces, expected 1 or 6",
                self.faces
            )));
        }
        if self.faces == 6 && self.width != self.height {
            return Err(ResourceError::InvalidKtx(format!(
                "cubemap faces are {}x{}, not square",
                self.width, self.height
            )));
        }
        if self.array_layers == 0 {
            return Err(ResourceError::InvalidKtx("zero array layers".to_string()));
        }
        let max_mips = 32 - self.width.max(self.height).leading_zeros();
        if self.mip_levels == 0 || self.mip_levels > max_mips {
            return Err(ResourceError::InvalidKtx(format!(
                "{} mip levels for a {}x{} image",
                self.mip_levels, self.width, self.height
            )));
        }
        if self.checked_payload_size().is_none() {
            return Err(ResourceError::InvalidKtx(format!(
                "payload of {}x{} with {} face(s), {} layer(s) and {} mip(s) overflows",
                self.width, self.height, self.faces, self.array_layers, self.mip_levels
            )));
        }
        Ok(())
    }

    /// Like `validate`, and also rejects a payload larger than `available`
    /// bytes before anything is reserved for it.
    fn validate_payload(&self, available: usize) -> ResourceResult<usize> {
        self.validate()?;
        let needed = self.payload_size();
        // Each mip adds a 4-byte imageSize field on top of its pixels.
        if needed > available.saturating_sub(4 * self.mip_levels as usize) {
            return Err(ResourceError::InvalidKtx(format!(
                "truncated: header describes {needed} payload bytes, {available} left"
            )));
        }
        Ok(needed)
    }
}

/// A KTX image held in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct KtxImage {
    header: KtxHeader,
    key_values: Vec<(String, String)>,
    data: Vec<u8>,
}

impl KtxImage {
    /// Wraps `data`, which must be exactly [`KtxHeader::payload_size`] bytes
    /// in payload order.
    pub fn new(header: KtxHeader, data: Vec<u8>) -> ResourceResult<Self> {
        header.validate()?;
        let expected = header.payload_size();
        if data.len() != expected {
            return Err(ResourceError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            header,
            key_values: Vec::new(),
            data,
        })
    }

    /// Sets a key/value entry, replacing an existing one with the same key.
    pub fn with_key_value(mut self, key: &str, value: &str) -> Self {
        self.key_values.retain(|(k, _)| k != key);
        self.key_values.push((key.to_string(), value.to_string()));
        self
    }

    pub fn key_value(&self, key: &str) -> Option<&str> {
        self.key_values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn header(&self) -> &KtxHeader {
        &self.header
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes of `face` at `mip` in layer 0.
    pub fn face_bytes(&self, mip: u32, face: u32) -> &[u8] {
        let offset = self.header.region_offset(mip, 0, face);
        &self.data[offset..offset + self.header.face_size(mip)]
    }

    /// Pixels of `face` at `mip` converted to RGBA `f32`.
    pub fn face_pixels_f32(&self, mip: u32, face: u32) -> Vec<f32> {
        let bytes = self.face_bytes(mip, face);
        match self.header.format {
            PixelFormat::Rgba32F => bytemuck::pod_collect_to_vec::<u8, f32>(bytes),
            PixelFormat::Rgba16F => bytemuck::pod_collect_to_vec::<u8, f16>(bytes)
                .into_iter()
                .map(f16::to_f32)
                .collect(),
            PixelFormat::Rgba8 => bytes.iter().map(|&b| f32::from(b) / 255.0).collect(),
        }
    }

    /// Average Rec. 709 luminance over every face of `mip`.
    pub fn mean_luminance(&self, mip: u32) -> f32 {
        let faces = self.header.faces * self.header.array_layers;
        let total: f64 = (0..faces)
            .map(|face| mean_luminance(&self.face_pixels_f32(mip, face)) as f64)
            .sum();
        (total / faces as f64) as f32
    }

    /// Serializes to KTX 1.1 bytes.
    pub fn encode(&self) -> Vec<u8> {
        let key_value_bytes = encode_key_values(&self.key_values);
        let mut out = Vec::with_capacity(
            HEADER_SIZE + key_value_bytes.len() + self.data.len() + 4 * self.header.mip_levels as usize,
        );

        let h = &self.header;
        out.extend_from_slice(&KTX_IDENTIFIER);
        for value in [
            ENDIANNESS,
            h.format.gl_type(),
            h.format.gl_type_size(),
            GL_RGBA,
            h.format.gl_internal_format(),
            GL_RGBA,
            h.width,
            h.height,
            0,
            if h.array_layers == 1 { 0 } else { h.array_layers },
            h.faces,
            h.mip_levels,
            key_value_bytes.len() as u32,
        ] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&key_value_bytes);

        for mip in 0..h.mip_levels {
            // For non-array cubemaps imageSize counts a single face.
            let image_size = if h.faces == 6 && h.array_layers == 1 {
                h.face_size(mip)
            } else {
                h.mip_size(mip)
            };
            out.extend_from_slice(&(image_size as u32).to_le_bytes());
            let start = h.region_offset(mip, 0, 0);
            out.extend_from_slice(&self.data[start..start + h.mip_size(mip)]);
        }
        out
    }

    /// Parses KTX 1.1 bytes.
    pub fn decode(bytes: &[u8]) -> ResourceResult<Self> {
        let mut reader = Reader::new(bytes);
        if reader.take(KTX_IDENTIFIER.len())? != KTX_IDENTIFIER {
            return Err(ResourceError::InvalidKtx("bad file identifier".to_string()));
        }
        let endianness = reader.u32()?;
        if endianness != ENDIANNESS {
            return Err(ResourceError::InvalidKtx(format!(
                "unsupported endianness marker {endianness:#010x}"
            )));
        }

        let gl_type = reader.u32()?;
        let _gl_type_size = reader.u32()?;
        let _gl_format = reader.u32()?;
        let gl_internal_format = reader.u32()?;
        let _gl_base_internal_format = reader.u32()?;
        let width = reader.u32()?;
        let height = reader.u32()?;
        let depth = reader.u32()?;
        let array_elements = reader.u32()?;
        let faces = reader.u32()?;
        let mip_levels = reader.u32()?;
        let key_value_size = reader.u32()? as usize;

        if depth > 1 {
            return Err(ResourceError::InvalidKtx("3D textures are not supported".to_string()));
        }

        let header = KtxHeader {
            format: PixelFormat::from_gl(gl_internal_format, gl_type)?,
            width,
            height: height.max(1),
            // 0 asks the loader to generate mips; this codec never does.
            mip_levels: mip_levels.max(1),
            faces,
            array_layers: array_elements.max(1),
        };
        let key_values = decode_key_values(reader.take(key_value_size)?)?;

        let payload_size = header.validate_payload(reader.remaining())?;
        let mut data = Vec::with_capacity(payload_size);
        for mip in 0..header.mip_levels {
            let image_size = reader.u32()? as usize;
            let expected_face = header.face_size(mip);
            let expected_mip = header.mip_size(mip);
            if image_size != expected_face && image_size != expected_mip {
                return Err(ResourceError::InvalidKtx(format!(
                    "mip {mip} imageSize {image_size}, expected {expected_face} or {expected_mip}"
                )));
            }
            data.extend_from_slice(reader.take(expected_mip)?);
        }

        Ok(Self {
            header,
            key_values,
            data,
        })
    }

    /// Writes the file, replacing any existing one only once the new
    /// contents are complete on disk.
    pub fn write(&self, path: &Path) -> ResourceResult<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("ktx.partial");
        std::fs::write(&tmp, self.encode())?;
        std::fs::rename(&tmp, path)?;
        tracing::debug!("Wrote {} ({} bytes of pixels)", path.display(), self.data.len());
        Ok(())
    }

    pub fn read(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::decode(&bytes)
    }
}

/// Average Rec. 709 luminance of RGBA pixels.
pub fn mean_luminance(rgba: &[f32]) -> f32 {
    let pixels = rgba.len() / 4;
    if pixels == 0 {
        return 0.0;
    }
    let sum: f64 = rgba
        .chunks_exact(4)
        .map(|p| 0.2126 * p[0] as f64 + 0.7152 * p[1] as f64 + 0.0722 * p[2] as f64)
        .sum();
    (sum / pixels as f64) as f32
}

fn encode_key_values(entries: &[(String, String)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (key, value) in entries {
        let size = key.len() + 1 + value.len() + 1;
        out.extend_from_slice(&(size as u32).to_le_bytes());
        out.extend_from_slice(key.as_bytes());
        out.push(0);
        out.extend_from_slice(value.as_bytes());
        out.push(0);
        out.resize(out.len() + (4 - size % 4) % 4, 0);
    }
    out
}

fn decode_key_values(bytes: &[u8]) -> ResourceResult<Vec<(String, String)>> {
    let mut reader = Reader::new(bytes);
    let mut entries = Vec::new();
    while reader.remaining() >= 4 {
        let size = reader.u32()? as usize;
        let entry = reader.take(size)?;
        reader.take((4 - size % 4) % 4)?;

        let Some(split) = entry.iter().position(|&b| b == 0) else {
            return Err(ResourceError::InvalidKtx(
                "key/value entry without key terminator".to_string(),
            ));
        };
        let key = String::from_utf8_lossy(&entry[..split]).into_owned();
        let value = &entry[split + 1..];
        let value = value.strip_suffix(&[0]).unwrap_or(value);
        entries.push((key, String::from_utf8_lossy(value).into_owned()));
    }
    Ok(entries)
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> ResourceResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(ResourceError::InvalidKtx(format!(
                "truncated: needed {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> ResourceResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
