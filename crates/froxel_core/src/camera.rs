use glam::{Mat4, Vec2, Vec3, Vec4Swizzles};

/// Perspective camera the renderer reads from. Owned by the application;
/// the renderer only consumes its matrices.
#[derive(Clone, Debug)]
pub struct Camera {
    pub fov_y: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            fov_y: 45.0f32.to_radians(),
            aspect_ratio: 16.0 / 9.0, // Standard monitor
            near: 0.1,
            far: 1000.0,
            position: Vec3::new(-9.0, 4.0, 0.0),
            target: Vec3::new(0.0, 3.0, 0.0),
            up: Vec3::Y,
        }
    }
}

impl Camera {
    /// Computes the "Projection Matrix" (View -> Clip), depth mapped to [0, 1]
    pub fn compute_projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.near, self.far)
    }

    /// World -> View. The camera looks down -Z in view space.
    pub fn compute_view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn compute_view_projection_matrix(&self) -> Mat4 {
        self.compute_projection_matrix() * self.compute_view_matrix()
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect_ratio = width as f32 / height as f32;
        }
    }

    /// Positive view-space distance for a [0, 1] depth-buffer value.
    pub fn linearize_depth(&self, ndc_depth: f32) -> f32 {
        linearize_depth(ndc_depth, self.near, self.far)
    }

    /// Projects a view-space point to pixel coordinates (origin top-left).
    pub fn view_to_pixel(&self, view_pos: Vec3, viewport: Vec2) -> Vec2 {
        let clip = self.compute_projection_matrix() * view_pos.extend(1.0);
        let ndc = clip.xy() / clip.w;
        Vec2::new(
            (ndc.x * 0.5 + 0.5) * viewport.x,
            (0.5 - ndc.y * 0.5) * viewport.y,
        )
    }
}

/// Inverse of the `perspective_rh` depth mapping.
pub fn linearize_depth(ndc_depth: f32, near: f32, far: f32) -> f32 {
    near * far / (far - ndc_depth * (far - near))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linearize_depth_inverts_projection() {
        let camera = Camera::default();
        let proj = camera.compute_projection_matrix();

        for distance in [0.1f32, 0.5, 2.0, 19.0, 500.0] {
            let clip = proj * glam::Vec4::new(0.0, 0.0, -distance, 1.0);
            let ndc = clip.z / clip.w;
            assert_relative_eq!(camera.linearize_depth(ndc), distance, max_relative = 1e-3);
        }
    }

    #[test]
    fn view_to_pixel_maps_axis_to_center() {
        let camera = Camera::default();
        let pixel = camera.view_to_pixel(Vec3::new(0.0, 0.0, -5.0), Vec2::new(800.0, 600.0));
        assert_relative_eq!(pixel.x, 400.0, epsilon = 1e-3);
        assert_relative_eq!(pixel.y, 300.0, epsilon = 1e-3);
    }
}
