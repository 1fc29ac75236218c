//! Resource loading.
//!
//! - [`Cubemap`]: the source environment for lighting precompute, loaded
//!   from face images or KTX, or generated procedurally
//! - [`ktx`]: the KTX 1.1 container the precomputed artifacts are stored in

pub mod cubemap;
pub mod error;
pub mod ktx;

pub use cubemap::Cubemap;
pub use error::{ResourceError, ResourceResult};
pub use ktx::{KtxHeader, KtxImage, PixelFormat};
