// Free-fly camera
//
// WASD moves along the view direction, Space/Ctrl move along world up,
// holding the right mouse button turns the view.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::config::SceneConfig;
use crate::window::InputState;

const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// Layout of the uniform buffer at binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub view: Mat4,
    pub proj: Mat4,
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    yaw: f32,
    pitch: f32,
    fov_y: f32,
    near: f32,
    far: f32,
    move_speed: f32,
    look_sensitivity: f32,
}

impl Camera {
    /// Starts looking down -Z
    pub fn from_config(config: &SceneConfig) -> Self {
        Self {
            position: Vec3::from_array(config.camera_position),
            yaw: -90.0_f32.to_radians(),
            pitch: 0.0,
            fov_y: config.fov_degrees.to_radians(),
            near: config.near,
            far: config.far,
            move_speed: config.move_speed,
            look_sensitivity: config.look_sensitivity,
        }
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    /// Applies held keys and mouse motion; `dt` in seconds
    pub fn update<I: InputState + ?Sized>(&mut self, input: &mut I, dt: f32) {
        let (dx, dy) = input.take_mouse_delta();
        if input.mouse_button_held(MouseButton::Right) {
            self.yaw += dx as f32 * self.look_sensitivity;
            self.pitch = (self.pitch - dy as f32 * self.look_sensitivity).clamp(-MAX_PITCH, MAX_PITCH);
        }

        let forward = self.forward();
        let right = self.right();
        let mut direction = Vec3::ZERO;

        if input.key_held(KeyCode::KeyW) {
            direction += forward;
        }
        if input.key_held(KeyCode::KeyS) {
            direction -= forward;
        }
        if input.key_held(KeyCode::KeyD) {
            direction += right;
        }
        if input.key_held(KeyCode::KeyA) {
            direction -= right;
        }
        if input.key_held(KeyCode::Space) {
            direction += Vec3::Y;
        }
        if input.key_held(KeyCode::ControlLeft) {
            direction -= Vec3::Y;
        }

        // Diagonals are not faster
        if let Some(direction) = direction.try_normalize() {
            self.position += direction * self.move_speed * dt;
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    /// Right-handed, 0..1 depth, Y flipped for Vulkan clip space
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn uniform(&self, extent: vk::Extent2D) -> CameraUniform {
        let aspect = if extent.height == 0 {
            1.0
        } else {
            extent.width as f32 / extent.height as f32
        };
        CameraUniform {
            view: self.view(),
            proj: self.projection(aspect),
        }
    }
}
