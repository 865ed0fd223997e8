//! Orbit camera for viewing the cloth.

use glam::{Mat4, Vec3};

const FOV_Y_DEGREES: f32 = 45.0;
const MIN_DISTANCE: f32 = 0.2;
const MAX_DISTANCE: f32 = 50.0;

/// Orbit camera around a target point.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Horizontal rotation angle in radians.
    pub yaw: f32,
    /// Vertical rotation angle in radians.
    pub pitch: f32,
    /// Distance from the target point.
    pub distance: f32,
    /// Point the camera orbits around.
    pub target: Vec3,
}

impl Camera {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.15,
            distance: 3.0,
            target: Vec3::ZERO,
        }
    }

    /// Camera placed to fit a cloth whose side is `extent` world units.
    pub fn framing(extent: f32) -> Self {
        let half_fov = (FOV_Y_DEGREES * 0.5).to_radians();
        let distance = (extent * 0.5 / half_fov.tan() * 1.4).clamp(MIN_DISTANCE, MAX_DISTANCE);
        Self {
            distance,
            ..Self::new()
        }
    }

    /// The camera's world position.
    pub fn position(&self) -> Vec3 {
        let x = self.distance * self.pitch.cos() * self.yaw.sin();
        let y = self.distance * self.pitch.sin();
        let z = self.distance * self.pitch.cos() * self.yaw.cos();
        self.target + Vec3::new(x, y, z)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position(), self.target, Vec3::Y)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        let near = (self.distance * 0.01).max(0.001);
        let proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, near, self.distance * 10.0);
        proj * self.view_matrix()
    }

    /// Rotate by a mouse drag of `(dx, dy)` pixels.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * 0.005;
        self.pitch = (self.pitch + dy * 0.005).clamp(-1.5, 1.5);
    }

    /// Move toward (positive `scroll`) or away from the target.
    pub fn zoom(&mut self, scroll: f32) {
        self.distance = (self.distance * (1.0 - scroll * 0.1)).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_looks_from_front() {
        let camera = Camera {
            pitch: 0.0,
            ..Camera::new()
        };
        let p = camera.position();
        assert!(p.x.abs() < 1e-6);
        assert!((p.z - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_orbit_clamps_pitch() {
        let mut camera = Camera::new();
        camera.orbit(0.0, 10_000.0);
        assert_eq!(camera.pitch, 1.5);
        camera.orbit(0.0, -100_000.0);
        assert_eq!(camera.pitch, -1.5);
    }

    #[test]
    fn test_zoom_stays_in_range() {
        let mut camera = Camera::new();
        for _ in 0..200 {
            camera.zoom(5.0);
        }
        assert_eq!(camera.distance, MIN_DISTANCE);
        for _ in 0..200 {
            camera.zoom(-5.0);
        }
        assert_eq!(camera.distance, MAX_DISTANCE);
    }

    #[test]
    fn test_framing_grows_with_extent() {
        assert!(Camera::framing(4.0).distance > Camera::framing(1.0).distance);
    }
}
