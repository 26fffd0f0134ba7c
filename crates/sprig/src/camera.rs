//! Orthographic 2D camera

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, UVec2, Vec2, Vec3, Vec4};

/// Camera uniform for GPU
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
}

/// 2D camera looking at the XY plane.
///
/// `zoom` is the visible height in world units; the visible width follows from the
/// screen's aspect ratio. With `invert_y` set, world Y grows downwards, which is what
/// screen-space UI and text layout expect.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub screen_size: UVec2,
    pub position: Vec2,
    pub zoom: f32,
    pub invert_y: bool,
}

impl Camera {
    /// Camera where one world unit maps to one pixel, centred on the origin.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen_size: UVec2::new(width, height),
            position: Vec2::ZERO,
            zoom: height.max(1) as f32,
            invert_y: false,
        }
    }

    pub fn with_invert_y(mut self, invert_y: bool) -> Self {
        self.invert_y = invert_y;
        self
    }

    pub fn aspect(&self) -> f32 {
        self.screen_size.x.max(1) as f32 / self.screen_size.y.max(1) as f32
    }

    /// World units covered by one screen pixel.
    pub fn world_units_per_pixel(&self) -> f32 {
        self.zoom / self.screen_size.y.max(1) as f32
    }

    pub fn projection(&self) -> Mat4 {
        let half = self.zoom * 0.5;
        let aspect = self.aspect();
        Mat4::orthographic_rh(-aspect * half, aspect * half, -half, half, -1.0, 1.0)
    }

    pub fn view(&self) -> Mat4 {
        let y = if self.invert_y {
            self.position.y
        } else {
            -self.position.y
        };
        Mat4::from_translation(Vec3::new(-self.position.x, y, 0.0))
    }

    /// Convert a pixel coordinate (origin top-left, Y down) into world space.
    pub fn screen_to_world(&self, screen: Vec2) -> Vec2 {
        let size = self.screen_size.max(UVec2::ONE).as_vec2();
        let mut ndc = (screen / size - 0.5) * 2.0;
        if !self.invert_y {
            ndc.y = -ndc.y;
        }

        let world = self.projection().inverse() * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        Vec2::new(world.x, world.y) + self.position
    }

    /// Convert a world position into pixel coordinates (origin top-left, Y down).
    pub fn world_to_screen(&self, world: Vec2) -> Vec2 {
        let size = self.screen_size.max(UVec2::ONE).as_vec2();
        let rel = world - self.position;
        let clip = self.projection() * Vec4::new(rel.x, rel.y, 0.0, 1.0);

        let mut ndc = Vec2::new(clip.x, clip.y);
        if !self.invert_y {
            ndc.y = -ndc.y;
        }
        (ndc * 0.5 + 0.5) * size
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.screen_size = UVec2::new(width, height);
    }

    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            projection: self.projection().to_cols_array_2d(),
            view: self.view().to_cols_array_2d(),
        }
    }
}
