//! Camera and the two camera positioners.

pub mod camera;
pub mod positioner;

pub use camera::Camera;
pub use positioner::{
    ArcballPositioner, CameraPositioner, FirstPersonPositioner, PositionerInput,
};
