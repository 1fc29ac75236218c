//! Maps raw input to positioner controls.

use glam::{Vec2, Vec3};
use vkframe_core::{CameraConfig, PositionerKind};
use vkframe_platform::{InputContext, KeyCode, MouseButton};
use vkframe_scene::{ArcballPositioner, CameraPositioner, FirstPersonPositioner, PositionerInput};

/// Where both positioners start.
const START_DISTANCE: f32 = 5.0;

const MOVEMENT_KEYS: [(KeyCode, Vec3); 6] = [
    (KeyCode::KeyW, Vec3::Z),
    (KeyCode::KeyS, Vec3::NEG_Z),
    (KeyCode::KeyD, Vec3::X),
    (KeyCode::KeyA, Vec3::NEG_X),
    (KeyCode::KeyE, Vec3::Y),
    (KeyCode::KeyQ, Vec3::NEG_Y),
];

pub fn make_positioner(config: &CameraConfig) -> CameraPositioner {
    match config.positioner {
        PositionerKind::Arcball => {
            CameraPositioner::Arcball(ArcballPositioner::new(Vec3::ZERO, START_DISTANCE))
        }
        PositionerKind::FirstPerson => CameraPositioner::FirstPerson(FirstPersonPositioner::new(
            Vec3::new(0.0, 0.0, START_DISTANCE),
            config.move_speed,
        )),
    }
}

/// Left drag orbits, right drag looks around, WASD/QE fly, shift speeds up.
pub fn positioner_input(input: &InputContext) -> PositionerInput {
    let movement = MOVEMENT_KEYS
        .iter()
        .filter(|(key, _)| input.is_key_pressed(*key))
        .map(|(_, dir)| *dir)
        .sum::<Vec3>();
    let (dx, dy) = input.mouse_delta();

    PositionerInput {
        mouse_delta: Vec2::new(dx, dy),
        scroll: input.scroll_delta(),
        rotating: input.is_mouse_pressed(MouseButton::Left)
            || input.is_mouse_pressed(MouseButton::Right),
        movement: movement.clamp_length_max(1.0),
        fast: input.is_key_pressed(KeyCode::ShiftLeft)
            || input.is_key_pressed(KeyCode::ShiftRight),
    }
}
