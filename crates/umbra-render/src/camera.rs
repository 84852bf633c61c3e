//! Camera system for view and projection matrix generation.

use glam::{Mat4, Quat, Vec3};

use crate::inspect::{self, InspectError, Inspectable, Property, PropertyValue};

/// The main scene camera.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    pub projection: Projection,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
}

/// Projection type for the camera.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width / height.
        aspect_ratio: f32,
    },
    Orthographic {
        half_width: f32,
        half_height: f32,
    },
}

impl Camera {
    pub fn perspective(fov_y: f32, aspect_ratio: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y,
                aspect_ratio,
            },
            near,
            far,
        }
    }

    /// Camera-to-world transform.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    /// World-to-camera transform.
    pub fn view_matrix(&self) -> Mat4 {
        self.world_matrix().inverse()
    }

    /// Projection with reverse-Z: near maps to depth 1, far to depth 0.
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_between(self.far, self.near)
    }

    /// Conventional projection of the same frustum (near to 0, far to 1).
    ///
    /// Used where depth must grow with view distance, such as cascade slicing.
    pub fn standard_projection_matrix(&self) -> Mat4 {
        self.projection_between(self.near, self.far)
    }

    fn projection_between(&self, z_near: f32, z_far: f32) -> Mat4 {
        match &self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => Mat4::perspective_rh(*fov_y, *aspect_ratio, z_near, z_far),
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -*half_width,
                *half_width,
                -*half_height,
                *half_height,
                z_near,
                z_far,
            ),
        }
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Vertical field of view, or 0 for orthographic cameras.
    pub fn fov_y(&self) -> f32 {
        match self.projection {
            Projection::Perspective { fov_y, .. } => fov_y,
            Projection::Orthographic { .. } => 0.0,
        }
    }

    pub fn aspect_ratio(&self) -> f32 {
        match self.projection {
            Projection::Perspective { aspect_ratio, .. } => aspect_ratio,
            Projection::Orthographic {
                half_width,
                half_height,
            } => half_width / half_height,
        }
    }

    /// Update the aspect ratio for perspective projection.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if height <= 0.0 {
            return;
        }
        if let Projection::Perspective { aspect_ratio, .. } = &mut self.projection {
            *aspect_ratio = width / height;
        }
    }

    /// Rotate the camera so it faces `target`.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let view = Mat4::look_at_rh(self.position, target, up);
        let (_, rotation, _) = view.inverse().to_scale_rotation_translation();
        self.rotation = rotation.normalize();
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 1000.0)
    }
}

impl Inspectable for Camera {
    fn properties(&self) -> Vec<Property> {
        let mut properties = vec![Property::new(
            "transform.position",
            "Position",
            PropertyValue::Vec3(self.position),
        )];
        if let Projection::Perspective { fov_y, .. } = self.projection {
            properties.push(
                Property::new("fov_y", "Field of view", PropertyValue::Float(fov_y.to_degrees()))
                    .with_range(1.0, 179.0, 0.5),
            );
        }
        properties.push(Property::new("near", "Near", PropertyValue::Float(self.near)));
        properties.push(Property::new("far", "Far", PropertyValue::Float(self.far)));
        properties
    }

    fn set_property(&mut self, path: &str, value: PropertyValue) -> Result<(), InspectError> {
        match path {
            "transform.position" => self.position = inspect::expect_vec3(path, value)?,
            "fov_y" => {
                let degrees = inspect::expect_float_in(path, value, 1.0, 179.0)?;
                match &mut self.projection {
                    Projection::Perspective { fov_y, .. } => *fov_y = degrees.to_radians(),
                    Projection::Orthographic { .. } => {
                        return Err(InspectError::UnknownPath(path.to_string()))
                    }
                }
            }
            "near" => self.near = inspect::expect_float_between(path, value, 0.0, self.far)?,
            "far" => {
                self.far = inspect::expect_float_between(path, value, self.near, f32::INFINITY)?
            }
            _ => return Err(InspectError::UnknownPath(path.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        let camera = Camera::default();
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn test_reverse_z_maps_near_to_one_and_far_to_zero() {
        let camera = Camera::perspective(1.0, 1.0, 0.5, 100.0);
        let proj = camera.projection_matrix();
        let near = proj * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!((near.z / near.w - 1.0).abs() < 1e-5);
        assert!((far.z / far.w).abs() < 1e-5);
    }

    #[test]
    fn test_standard_projection_is_not_reversed() {
        let camera = Camera::perspective(1.0, 1.0, 0.5, 100.0);
        let proj = camera.standard_projection_matrix();
        let near = proj * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_world_matrix_inverts_view() {
        let camera = Camera {
            position: Vec3::new(10.0, 20.0, 30.0),
            rotation: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            ..Camera::default()
        };
        let product = camera.world_matrix() * camera.view_matrix();
        assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert!((camera.world_matrix().col(3).truncate() - camera.position).length() < 1e-4);
    }

    #[test]
    fn test_zero_height_keeps_aspect() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(1920.0, 0.0);
        assert!((camera.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
        camera.set_aspect_ratio(800.0, 800.0);
        assert!((camera.aspect_ratio() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_look_at_faces_target() {
        let mut camera = Camera {
            position: Vec3::new(0.0, 5.0, 10.0),
            ..Camera::default()
        };
        camera.look_at(Vec3::ZERO, Vec3::Y);
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!((camera.forward() - expected).length() < 1e-4);
    }

    #[test]
    fn test_inspector_keeps_near_below_far() {
        let mut camera = Camera::perspective(1.0, 1.0, 0.1, 100.0);
        camera.set_property("far", PropertyValue::Float(500.0)).unwrap();
        assert_eq!(camera.far, 500.0);
        assert!(matches!(
            camera.set_property("near", PropertyValue::Float(600.0)),
            Err(InspectError::OutOfRange { .. })
        ));
        camera.set_property("fov_y", PropertyValue::Float(90.0)).unwrap();
        assert!((camera.fov_y() - std::f32::consts::FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn test_inspector_rejects_equal_planes() {
        let mut camera = Camera::perspective(1.0, 1.0, 0.1, 100.0);
        assert!(matches!(
            camera.set_property("near", PropertyValue::Float(100.0)),
            Err(InspectError::OutOfRange { .. })
        ));
        assert!(matches!(
            camera.set_property("far", PropertyValue::Float(0.1)),
            Err(InspectError::OutOfRange { .. })
        ));
        assert!(camera.set_property("near", PropertyValue::Float(0.0)).is_err());
        assert_eq!((camera.near, camera.far), (0.1, 100.0));

        camera.set_property("near", PropertyValue::Float(99.0)).unwrap();
        let cascades = crate::light::cascade::compute_cascades(
            &camera,
            Vec3::NEG_Y,
            &crate::light::cascade::CascadeSettings::default(),
        );
        assert!(cascades.iter().all(|c| c.view.is_finite() && c.sphere.center.is_finite()));
    }

    #[test]
    fn test_up_right_forward_orthogonal() {
        let camera = Camera {
            rotation: Quat::from_euler(glam::EulerRot::YXZ, 0.4, -0.3, 0.1),
            ..Camera::default()
        };
        let (f, u, r) = (camera.forward(), camera.up(), camera.right());
        assert!(f.dot(u).abs() < 1e-5);
        assert!(f.dot(r).abs() < 1e-5);
        assert!(u.dot(r).abs() < 1e-5);
    }
}
