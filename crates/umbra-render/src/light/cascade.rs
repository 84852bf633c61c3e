//! Cascaded shadow frustum splitting.
//!
//! The main camera frustum is cut into depth slices. Each slice gets a
//! bounding sphere and an orthographic light camera that encloses it. Nothing
//! here is cached: callers recompute every frame the camera or light moves.

use glam::{Mat4, Vec3, Vec4};

use crate::camera::Camera;

/// Near plane of every cascade camera.
pub const CASCADE_NEAR: f32 = 1.0;

/// Smallest bounding radius; keeps the orthographic volume non-degenerate.
pub const MIN_RADIUS: f32 = 1e-3;

/// Tunables for the split scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeSettings {
    pub count: u32,
    /// 0 = purely logarithmic splits, 1 = purely linear.
    pub split_blend: f32,
    /// Extra far-plane distance added per cascade index.
    pub far_stagger: f32,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            count: 4,
            split_blend: 0.0005,
            far_stagger: 2000.0,
        }
    }
}

/// Center and radius enclosing one frustum slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn contains(&self, point: Vec3, tolerance: f32) -> bool {
        self.center.distance(point) <= self.radius + tolerance
    }
}

/// One shadow cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    pub index: u32,
    /// View-space distance of the slice's near boundary.
    pub near: f32,
    pub far: f32,
    /// World-space bounds of the slice.
    pub sphere: BoundingSphere,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Cascade {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// `count + 1` depths from `near` to `far`, blending logarithmic and linear schemes.
///
/// The first and last values are exactly `near` and `far`.
pub fn split_depths(near: f32, far: f32, count: u32, blend: f32) -> Vec<f32> {
    let count = count.max(1);
    let blend = blend.clamp(0.0, 1.0);
    let mut splits: Vec<f32> = (0..=count)
        .map(|i| {
            let t = i as f32 / count as f32;
            let logarithmic = near * (far / near).powf(t);
            let linear = near + (far - near) * t;
            logarithmic + (linear - logarithmic) * blend
        })
        .collect();
    splits[0] = near;
    splits[count as usize] = far;
    splits
}

/// Frustum corners in camera space, near plane first then far plane.
///
/// Built from the conventional projection so z interpolates linearly between them.
fn view_space_corners(camera: &Camera) -> [Vec3; 8] {
    let inverse = camera.standard_projection_matrix().inverse();
    let mut corners = [Vec3::ZERO; 8];
    let ndc = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    for (plane, z) in [0.0f32, 1.0].into_iter().enumerate() {
        for (i, (x, y)) in ndc.iter().enumerate() {
            let p = inverse * Vec4::new(*x, *y, z, 1.0);
            corners[plane * 4 + i] = p.truncate() / p.w;
        }
    }
    corners
}

/// The eight camera-space corners of the slice between view depths `near` and `far`.
pub fn slice_corners(camera: &Camera, near: f32, far: f32) -> [Vec3; 8] {
    let corners = view_space_corners(camera);
    let span = camera.far - camera.near;
    let mut slice = [Vec3::ZERO; 8];
    for i in 0..4 {
        let ray_near = corners[i];
        let ray_far = corners[i + 4];
        slice[i] = ray_near.lerp(ray_far, (near - camera.near) / span);
        slice[i + 4] = ray_near.lerp(ray_far, (far - camera.near) / span);
    }
    slice
}

/// Recompute every cascade for `camera` and a light shining along `light_dir`.
pub fn compute_cascades(
    camera: &Camera,
    light_dir: Vec3,
    settings: &CascadeSettings,
) -> Vec<Cascade> {
    let splits = split_depths(camera.near, camera.far, settings.count, settings.split_blend);
    let world = camera.world_matrix();
    let dir = light_dir.try_normalize().unwrap_or(Vec3::NEG_Y);
    let up = if dir.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };

    splits
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (near, far) = (pair[0], pair[1]);
            let corners = slice_corners(camera, near, far);
            let centroid = corners.iter().copied().sum::<Vec3>() / 8.0;
            let radius = corners
                .iter()
                .map(|c| c.distance(centroid))
                .fold(0.0f32, f32::max)
                .max(MIN_RADIUS);
            let center = world.transform_point3(centroid);

            // The range always spans the sphere's diameter past the near plane.
            let depth_far = CASCADE_NEAR + 2.0 * radius + settings.far_stagger * i as f32;
            // The sphere center lands halfway through the light camera's depth range.
            let eye = center - dir * ((CASCADE_NEAR + depth_far) * 0.5);
            let view = Mat4::look_at_rh(eye, center, up);
            let projection =
                Mat4::orthographic_rh(-radius, radius, -radius, radius, CASCADE_NEAR, depth_far);

            Cascade {
                index: i as u32,
                near,
                far,
                sphere: BoundingSphere { center, radius },
                view,
                projection,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn camera() -> Camera {
        Camera {
            position: Vec3::new(5.0, 3.0, -2.0),
            rotation: Quat::from_euler(glam::EulerRot::YXZ, 0.6, -0.2, 0.0),
            ..Camera::perspective(1.0, 16.0 / 9.0, 0.1, 500.0)
        }
    }

    #[test]
    fn test_split_endpoints_are_exact() {
        for count in 1..=8 {
            for blend in [0.0, 0.0005, 0.5, 1.0] {
                let splits = split_depths(0.1, 500.0, count, blend);
                assert_eq!(splits.len(), count as usize + 1);
                assert_eq!(splits[0], 0.1);
                assert_eq!(splits[count as usize], 500.0);
                assert!(splits.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_linear_blend_gives_even_splits() {
        let splits = split_depths(10.0, 110.0, 4, 1.0);
        for (split, expected) in splits.iter().zip([10.0, 35.0, 60.0, 85.0, 110.0]) {
            assert!((split - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_slice_corners_sit_at_requested_depth() {
        let camera = Camera::perspective(1.0, 1.0, 0.5, 100.0);
        let corners = slice_corners(&camera, 10.0, 40.0);
        for corner in &corners[..4] {
            assert!((corner.z + 10.0).abs() < 1e-2);
        }
        for corner in &corners[4..] {
            assert!((corner.z + 40.0).abs() < 1e-2);
        }
    }

    #[test]
    fn test_spheres_contain_their_slice() {
        let camera = camera();
        let settings = CascadeSettings::default();
        let cascades = compute_cascades(&camera, Vec3::new(-0.5, -1.0, -0.5), &settings);
        assert_eq!(cascades.len(), 4);

        let world = camera.world_matrix();
        for cascade in &cascades {
            let radius_tolerance = cascade.sphere.radius * 1e-4 + 1e-4;
            for corner in slice_corners(&camera, cascade.near, cascade.far) {
                let corner = world.transform_point3(corner);
                assert!(
                    cascade.sphere.contains(corner, radius_tolerance),
                    "cascade {} misses {corner}",
                    cascade.index
                );
            }
        }
    }

    #[test]
    fn test_sphere_center_sits_mid_depth() {
        let camera = camera();
        let settings = CascadeSettings::default();
        for cascade in compute_cascades(&camera, Vec3::new(0.3, -1.0, 0.2), &settings) {
            let clip = cascade.view_projection() * cascade.sphere.center.extend(1.0);
            let depth = clip.z / clip.w;
            assert!((depth - 0.5).abs() < 1e-3, "cascade {} depth {depth}", cascade.index);
            assert!(clip.x.abs() < 1e-3 && clip.y.abs() < 1e-3);
        }
    }

    #[test]
    fn test_single_cascade_covers_whole_frustum() {
        let camera = camera();
        let settings = CascadeSettings {
            count: 1,
            ..CascadeSettings::default()
        };
        let cascades = compute_cascades(&camera, Vec3::NEG_Y, &settings);
        assert_eq!(cascades.len(), 1);
        assert_eq!(cascades[0].near, camera.near);
        assert_eq!(cascades[0].far, camera.far);
    }

    fn shadow_depth(cascade: &Cascade, point: Vec3) -> f32 {
        let clip = cascade.view_projection() * point.extend(1.0);
        clip.z / clip.w
    }

    /// Points further along the light direction must land deeper in the map.
    fn assert_depth_follows_light(cascades: &[Cascade], dir: Vec3) {
        for cascade in cascades {
            let r = cascade.sphere.radius;
            let center = cascade.sphere.center;
            let toward_light = shadow_depth(cascade, center - dir * (0.5 * r));
            let mid = shadow_depth(cascade, center);
            let away = shadow_depth(cascade, center + dir * (0.5 * r));
            assert!(
                toward_light < mid && mid < away,
                "cascade {} depths {toward_light} {mid} {away}",
                cascade.index
            );
            assert!((0.0..=1.0).contains(&toward_light) && (0.0..=1.0).contains(&away));
        }
    }

    #[test]
    fn test_degenerate_frustum_gets_min_radius() {
        let camera = Camera::perspective(1e-6, 1.0, 10.0, 10.001);
        let cascades = compute_cascades(&camera, Vec3::NEG_Y, &CascadeSettings::default());
        assert!(cascades.iter().all(|c| c.sphere.radius >= MIN_RADIUS));
        assert!(cascades.iter().all(|c| c.projection.is_finite()));

        let unstaggered = CascadeSettings {
            far_stagger: 0.0,
            ..CascadeSettings::default()
        };
        assert_depth_follows_light(
            &compute_cascades(&camera, Vec3::NEG_Y, &unstaggered),
            Vec3::NEG_Y,
        );
    }

    #[test]
    fn test_small_frustum_keeps_depth_order() {
        let camera = Camera::perspective(1.0, 1.0, 0.05, 2.0);
        let cascades = compute_cascades(&camera, Vec3::NEG_Y, &CascadeSettings::default());
        assert!(cascades[0].sphere.radius < 0.5);
        assert_depth_follows_light(&cascades, Vec3::NEG_Y);
    }

    #[test]
    fn test_far_planes_are_staggered() {
        let camera = camera();
        let settings = CascadeSettings {
            count: 3,
            far_stagger: 100.0,
            ..CascadeSettings::default()
        };
        let cascades = compute_cascades(&camera, Vec3::NEG_Y, &settings);
        for cascade in &cascades {
            // Depth 1 of the orthographic projection sits at the far plane.
            let far = CASCADE_NEAR + 2.0 * cascade.sphere.radius + 100.0 * cascade.index as f32;
            let clip = cascade.projection * Vec4::new(0.0, 0.0, -far, 1.0);
            assert!((clip.z / clip.w - 1.0).abs() < 1e-3);
        }
    }
}
