//! Scene camera and the pointer-driven rotation rig.

use std::f32::consts::PI;

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use crate::config::CameraSettings;

/// Perspective camera looking down -Z.
///
/// Only the horizontal offset moves at runtime; it is driven by the blend
/// scheduler's camera tween.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    /// Resting position.
    pub base: Vec3,
    /// Horizontal offset added to `base.x`.
    pub offset_x: f32,
    /// Width over height of the surface.
    pub aspect: f32,
}

impl Camera {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            fov: settings.fov,
            near: settings.near,
            far: settings.far,
            base: Vec3::from_array(settings.position),
            offset_x: 0.0,
            aspect: 1.0,
        }
    }

    /// Calculate the camera's world position.
    pub fn position(&self) -> Vec3 {
        self.base + Vec3::X * self.offset_x
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position(), Vec3::NEG_Z, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(&CameraSettings::default())
    }
}

/// Parent rotation that eases toward the pointer every frame.
#[derive(Debug, Clone)]
pub struct RotationRig {
    rotation: Quat,
    amount: f32,
    factor: f32,
}

impl RotationRig {
    /// Standard rig; `compact` selects the gentler touch-layout response.
    pub fn new(compact: bool) -> Self {
        let (amount, factor) = if compact { (0.1, 0.01) } else { (0.25, 0.1) };
        Self {
            rotation: Quat::IDENTITY,
            amount,
            factor,
        }
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Rotation the rig eases toward for a pointer position.
    pub fn target(&self, pointer: Vec2) -> Quat {
        let pitch = (-pointer.y * PI * self.amount).clamp(-0.5, 0.5);
        let yaw = pointer.x * PI * self.amount;
        Quat::from_euler(EulerRot::XYZ, pitch, yaw, 0.0)
    }

    pub fn update(&mut self, pointer: Vec2) -> Quat {
        self.rotation = self.rotation.slerp(self.target(pointer), self.factor);
        self.rotation
    }

    pub fn reset(&mut self) {
        self.rotation = Quat::IDENTITY;
    }
}
