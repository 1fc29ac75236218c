//! Camera positioners: an orbiting arcball and a free-flying first-person
//! controller, selected through the [`CameraPositioner`] enum.
//!
//! Positioners read a [`PositionerInput`] snapshot rather than a window
//! or event type, so this crate stays independent of the platform layer.

use glam::{Vec2, Vec3};

/// Keep the pitch away from the poles so `look_to` never degenerates.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

/// One frame's worth of control input.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionerInput {
    /// Mouse motion in pixels since the last update.
    pub mouse_delta: Vec2,
    /// Scroll in lines; positive zooms in.
    pub scroll: f32,
    /// Whether mouse motion should rotate the camera this frame.
    pub rotating: bool,
    /// Requested motion in camera space: x right, y up, z forward.
    pub movement: Vec3,
    /// Speed multiplier held.
    pub fast: bool,
}

/// Orbits a target at a distance.
#[derive(Clone, Debug, PartialEq)]
pub struct ArcballPositioner {
    pub target: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
}

impl ArcballPositioner {
    /// Fraction of the distance one scroll line zooms by.
    const ZOOM_PER_LINE: f32 = 0.1;

    pub fn new(target: Vec3, distance: f32) -> Self {
        Self {
            target,
            distance,
            yaw: 0.0,
            pitch: 0.0,
            min_distance: 0.5,
            max_distance: 100.0,
        }
    }

    fn update(&mut self, input: &PositionerInput, sensitivity: f32) {
        if input.rotating {
            self.yaw -= input.mouse_delta.x * sensitivity;
            self.pitch = (self.pitch - input.mouse_delta.y * sensitivity)
                .clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
        if input.scroll != 0.0 {
            let factor = (1.0 - input.scroll * Self::ZOOM_PER_LINE).max(0.1);
            self.distance = (self.distance * factor).clamp(self.min_distance, self.max_distance);
        }
    }

    fn apply(&self, camera: &mut crate::Camera) {
        camera.yaw = self.yaw;
        camera.pitch = self.pitch;
        camera.position = self.target - camera.forward() * self.distance;
    }
}

/// Free-flying camera driven by movement keys and mouse look.
#[derive(Clone, Debug, PartialEq)]
pub struct FirstPersonPositioner {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// World units per second.
    pub speed: f32,
}

impl FirstPersonPositioner {
    const FAST_MULTIPLIER: f32 = 4.0;

    pub fn new(position: Vec3, speed: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            speed,
        }
    }

    fn update(&mut self, input: &PositionerInput, sensitivity: f32, dt: f32, camera: &crate::Camera) {
        if input.rotating {
            self.yaw -= input.mouse_delta.x * sensitivity;
            self.pitch = (self.pitch - input.mouse_delta.y * sensitivity)
                .clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }

        let oriented = crate::Camera {
            yaw: self.yaw,
            pitch: self.pitch,
            ..camera.clone()
        };
        let direction = oriented.right() * input.movement.x
            + Vec3::Y * input.movement.y
            + oriented.forward() * input.movement.z;
        if direction.length_squared() > 0.0 {
            let speed = if input.fast {
                self.speed * Self::FAST_MULTIPLIER
            } else {
                self.speed
            };
            self.position += direction.normalize() * speed * dt;
        }
    }

    fn apply(&self, camera: &mut crate::Camera) {
        camera.position = self.position;
        camera.yaw = self.yaw;
        camera.pitch = self.pitch;
    }
}

/// The two ways the shell can drive the camera.
#[derive(Clone, Debug, PartialEq)]
pub enum CameraPositioner {
    Arcball(ArcballPositioner),
    FirstPerson(FirstPersonPositioner),
}

impl CameraPositioner {
    /// Advances the positioner by `dt` seconds and writes the result into
    /// `camera`. `sensitivity` is radians per pixel of mouse motion.
    pub fn update(
        &mut self,
        input: &PositionerInput,
        sensitivity: f32,
        dt: f32,
        camera: &mut crate::Camera,
    ) {
        match self {
            CameraPositioner::Arcball(arcball) => {
                arcball.update(input, sensitivity);
                arcball.apply(camera);
            }
            CameraPositioner::FirstPerson(first_person) => {
                first_person.update(input, sensitivity, dt, camera);
                first_person.apply(camera);
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CameraPositioner::Arcball(_) => "arcball",
            CameraPositioner::FirstPerson(_) => "first_person",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Camera;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn test_arcball_looks_at_target() {
        let mut positioner = CameraPositioner::Arcball(ArcballPositioner::new(Vec3::ZERO, 5.0));
        let mut camera = Camera::new();
        let input = PositionerInput {
            mouse_delta: Vec2::new(120.0, -40.0),
            rotating: true,
            ..PositionerInput::default()
        };
        positioner.update(&input, 0.005, 0.016, &mut camera);

        assert!((camera.position.length() - 5.0).abs() < 1e-4);
        let to_target = (Vec3::ZERO - camera.position).normalize();
        assert!(approx_eq_vec3(to_target, camera.forward()));
    }

    #[test]
    fn test_arcball_ignores_motion_when_not_rotating() {
        let mut arcball = ArcballPositioner::new(Vec3::ZERO, 5.0);
        let input = PositionerInput {
            mouse_delta: Vec2::new(300.0, 300.0),
            ..PositionerInput::default()
        };
        arcball.update(&input, 0.01);
        assert_eq!(arcball.yaw, 0.0);
        assert_eq!(arcball.pitch, 0.0);
    }

    #[test]
    fn test_arcball_pitch_is_clamped() {
        let mut arcball = ArcballPositioner::new(Vec3::ZERO, 5.0);
        let input = PositionerInput {
            mouse_delta: Vec2::new(0.0, -100_000.0),
            rotating: true,
            ..PositionerInput::default()
        };
        arcball.update(&input, 0.01);
        assert_eq!(arcball.pitch, PITCH_LIMIT);
    }

    #[test]
    fn test_arcball_zoom_is_bounded() {
        let mut arcball = ArcballPositioner::new(Vec3::ZERO, 5.0);
        let zoom_in = PositionerInput {
            scroll: 1.0,
            ..PositionerInput::default()
        };
        arcball.update(&zoom_in, 0.01);
        assert!((arcball.distance - 4.5).abs() < 1e-5);

        for _ in 0..200 {
            arcball.update(&zoom_in, 0.01);
        }
        assert_eq!(arcball.distance, arcball.min_distance);

        let zoom_out = PositionerInput {
            scroll: -5.0,
            ..PositionerInput::default()
        };
        for _ in 0..200 {
            arcball.update(&zoom_out, 0.01);
        }
        assert_eq!(arcball.distance, arcball.max_distance);
    }

    #[test]
    fn test_first_person_moves_forward() {
        let mut positioner =
            CameraPositioner::FirstPerson(FirstPersonPositioner::new(Vec3::ZERO, 2.0));
        let mut camera = Camera::new();
        let input = PositionerInput {
            movement: Vec3::Z,
            ..PositionerInput::default()
        };
        positioner.update(&input, 0.005, 0.5, &mut camera);
        assert!(approx_eq_vec3(camera.position, Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn test_first_person_fast_and_diagonal() {
        let mut first_person = FirstPersonPositioner::new(Vec3::ZERO, 1.0);
        let camera = Camera::new();
        let input = PositionerInput {
            movement: Vec3::new(1.0, 0.0, 1.0),
            fast: true,
            ..PositionerInput::default()
        };
        first_person.update(&input, 0.005, 1.0, &camera);
        // Diagonal motion is normalized, then scaled by the fast multiplier.
        assert!((first_person.position.length() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_positioner_names() {
        assert_eq!(
            CameraPositioner::Arcball(ArcballPositioner::new(Vec3::ZERO, 1.0)).name(),
            "arcball"
        );
        assert_eq!(
            CameraPositioner::FirstPerson(FirstPersonPositioner::new(Vec3::ZERO, 1.0)).name(),
            "first_person"
        );
    }
}
