use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec2, Vec3};

use crate::scene::CameraConfig;

const ROTATE_SPEED: f32 = 0.005;
const ZOOM_SPEED: f32 = 0.1;
const PHI_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// View and projection handed to the renderer each frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraParams {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

/// Camera orbiting a fixed centre on a sphere of variable radius.
#[derive(Clone, Debug, PartialEq)]
pub struct OrbitCamera {
    config: CameraConfig,
    theta: f32,
    phi: f32,
    distance: f32,
}

impl OrbitCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            theta: config.theta,
            phi: config.phi.clamp(-PHI_LIMIT, PHI_LIMIT),
            distance: config.distance.max(config.near),
            config,
        }
    }

    pub fn eye(&self) -> Vec3 {
        let (sin_phi, cos_phi) = self.phi.sin_cos();
        let (sin_theta, cos_theta) = self.theta.sin_cos();
        self.config.center
            + self.distance * Vec3::new(cos_theta * cos_phi, sin_phi, sin_theta * cos_phi)
    }

    /// Rotates by a cursor drag measured in physical pixels.
    pub fn rotate(&mut self, drag: Vec2) {
        self.theta += drag.x * ROTATE_SPEED;
        self.phi = (self.phi + drag.y * ROTATE_SPEED).clamp(-PHI_LIMIT, PHI_LIMIT);
    }

    /// Zooms in for positive wheel lines, out for negative ones.
    pub fn zoom(&mut self, lines: f32) {
        let near = self.config.near.max(0.01);
        let zoomed = self.distance * (-lines * ZOOM_SPEED).exp();
        self.distance = zoomed.min(self.config.far).max(near);
    }

    pub fn params(&self, aspect: f32) -> CameraParams {
        let position = self.eye();
        let view = Mat4::look_at_rh(position, self.config.center, Vec3::Y);
        let projection = Mat4::perspective_rh(
            self.config.fov.to_radians(),
            aspect.max(0.01),
            self.config.near,
            self.config.far,
        );
        CameraParams {
            view,
            projection,
            position,
        }
    }
}
