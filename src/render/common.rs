use glam::{Mat4, Vec3};

use crate::backdrop::LightRig;
use crate::camera::CameraState;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

impl From<&CameraState> for CameraParams {
    fn from(camera: &CameraState) -> Self {
        Self {
            view_proj: camera.view_projection(),
            position: camera.position,
        }
    }
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug)]
pub struct LightParams {
    /// Unit vector pointing from the scene towards the key light.
    pub to_light: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub ambient: Vec3,
}

impl From<&LightRig> for LightParams {
    fn from(rig: &LightRig) -> Self {
        let to_light = -rig.key_direction();
        Self {
            to_light: if to_light == Vec3::ZERO { Vec3::Y } else { to_light },
            color: rig.key_color,
            intensity: rig.key_intensity,
            ambient: rig.ambient,
        }
    }
}
