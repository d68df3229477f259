use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::config::ViewerTuning;
use crate::geometry::Bounds;

/// Perspective camera placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraState {
    pub position: Vec3,
    pub look_at: Vec3,
    /// Vertical field of view in degrees.
    pub field_of_view: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 2.0, 15.0),
            look_at: Vec3::new(0.0, 1.0, 0.0),
            field_of_view: 50.0,
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl CameraState {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.look_at, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.field_of_view.to_radians(),
            self.aspect.max(1e-3),
            self.near,
            self.far,
        )
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn distance(&self) -> f32 {
        self.position.distance(self.look_at)
    }

    /// Updates only the aspect ratio. A zero-sized surface keeps the previous
    /// value.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }
}

/// Computes camera placements from scene bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFramer {
    pub multiplier: f32,
    pub backdrop_multiplier: f32,
    pub lift: f32,
    pub look_at_bias: f32,
    pub field_of_view: f32,
    pub min_extent: f32,
}

impl Default for CameraFramer {
    fn default() -> Self {
        Self::from_tuning(&ViewerTuning::default())
    }
}

impl CameraFramer {
    pub fn from_tuning(tuning: &ViewerTuning) -> Self {
        Self {
            multiplier: tuning.framing_multiplier,
            backdrop_multiplier: tuning.backdrop_framing_multiplier,
            lift: tuning.camera_lift,
            look_at_bias: tuning.look_at_bias,
            field_of_view: tuning.field_of_view,
            min_extent: tuning.min_extent,
        }
    }

    /// Places the camera in front of `bounds` (+Z), lifted by a fraction of
    /// the scene height, looking at the center. `with_backdrop` selects the
    /// wider multiplier.
    pub fn frame(&self, bounds: &Bounds, with_backdrop: bool, aspect: f32) -> CameraState {
        let size = bounds.size();
        let center = bounds.center();
        let k = if with_backdrop {
            self.backdrop_multiplier
        } else {
            self.multiplier
        };
        let distance = bounds.max_extent().max(self.min_extent) * k;
        let position = center + Vec3::new(0.0, size.y * self.lift, distance);
        let look_at = center + Vec3::new(0.0, size.y * self.look_at_bias, 0.0);
        CameraState {
            position,
            look_at,
            field_of_view: self.field_of_view,
            aspect,
            near: (distance * 0.01).max(0.01),
            far: (distance * 100.0).max(1000.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_scales_with_largest_dimension() {
        let framer = CameraFramer::default();
        let bounds = Bounds::new(Vec3::new(-2.5, 0.0, 0.75), Vec3::new(2.5, 8.0, 1.25));
        let camera = framer.frame(&bounds, false, 1.5);
        assert!((camera.position.z - (1.0 + 8.0 * 1.8)).abs() < 1e-4);
        assert!((camera.position.y - (4.0 + 8.0 * 0.3)).abs() < 1e-4);
        assert_eq!(camera.position.x, 0.0);
        assert_eq!(camera.aspect, 1.5);
        assert!(camera.look_at.y > bounds.center().y);
    }

    #[test]
    fn backdrop_widens_the_frame() {
        let framer = CameraFramer::default();
        let bounds = Bounds::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let alone = framer.frame(&bounds, false, 1.0);
        let staged = framer.frame(&bounds, true, 1.0);
        assert!(staged.distance() > alone.distance());
    }

    #[test]
    fn clip_planes_bracket_the_scene() {
        let framer = CameraFramer::default();
        let bounds = Bounds::new(Vec3::ZERO, Vec3::new(60.0, 60.0, 60.0));
        let camera = framer.frame(&bounds, true, 1.0);
        assert!(camera.near > 0.0);
        assert!(camera.far > camera.distance() + 60.0);
    }

    #[test]
    fn degenerate_bounds_still_produce_a_usable_camera() {
        let framer = CameraFramer::default();
        let bounds = Bounds::new(Vec3::ZERO, Vec3::ZERO);
        let camera = framer.frame(&bounds, false, 1.0);
        assert!(camera.distance() > 0.0);
        assert!(camera.view_projection().is_finite());
    }

    #[test]
    fn resize_only_changes_aspect() {
        let mut camera = CameraState::default();
        let before = camera;
        camera.set_viewport(1920, 1080);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-5);
        assert_eq!(camera.position, before.position);
        camera.set_viewport(0, 1080);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-5);
    }
}
