//! The scene the viewer shows: a ground plane with a row of cubes receding
//! from the camera, so every cascade has something to shadow.

use glam::{Mat4, Quat, Vec3, Vec4};
use umbra_config::{CameraConfig, Config, RenderConfig, ShadowConfig};
use umbra_render::device::GpuDevice;
use umbra_render::{
    Camera, DirectionalLight, GpuScene, MaterialBlock, MeshData, ResourceTable, SceneError,
};

pub const GROUND: &str = "ground";
pub const CUBE_COUNT: usize = 6;

/// Camera described by `config`, looking down the row of cubes.
pub fn camera_from_config(config: &CameraConfig, width: u32, height: u32) -> Camera {
    let mut camera = Camera::perspective(
        config.fov_y_degrees.to_radians(),
        width.max(1) as f32 / height.max(1) as f32,
        config.near,
        config.far,
    );
    camera.position = Vec3::new(0.0, 4.0, 10.0);
    camera.look_at(Vec3::new(0.0, 0.0, -10.0), Vec3::Y);
    camera
}

/// Copy shadow settings onto the light. Changing the cascade count takes
/// effect at the next scene update.
pub fn apply_shadow_config(light: &mut DirectionalLight, shadow: &ShadowConfig) {
    light.cascade.count = shadow.cascade_count;
    light.cascade.split_blend = shadow.split_blend;
    light.cascade.far_stagger = shadow.far_stagger;
    light.depth_bias = shadow.depth_bias;
    light.normal_bias = shadow.normal_bias;
    light.show_cascades = shadow.show_cascades;
}

pub fn clear_color(render: &RenderConfig) -> wgpu::Color {
    let [r, g, b, a] = render.clear_color.map(f64::from);
    wgpu::Color { r, g, b, a }
}

/// An uninitialized scene configured from `config`.
pub fn scene_from_config(config: &Config) -> GpuScene {
    let camera = camera_from_config(&config.camera, config.window.width, config.window.height);
    let mut scene = GpuScene::new(camera, config.render.instance_growth);
    scene.clear_color = clear_color(&config.render);
    if let Some(light) = scene.directional_light_mut() {
        apply_shadow_config(light, &config.shadow);
    }
    scene
}

pub fn cube_id(index: usize) -> String {
    format!("cube-{index}")
}

/// Upload the ground and cubes into an initialized scene.
pub fn populate<D: GpuDevice>(
    scene: &mut GpuScene,
    table: &mut ResourceTable<D>,
) -> Result<(), SceneError> {
    scene.add_mesh(
        table,
        GROUND,
        &MeshData::plane(200.0),
        Mat4::IDENTITY,
        MaterialBlock::default()
            .with_base_color(Vec4::new(0.55, 0.55, 0.5, 1.0))
            .with_roughness_metallic(0.9, 0.0),
    )?;

    let cube = MeshData::cube(1.0);
    for index in 0..CUBE_COUNT {
        let hue = index as f32 / CUBE_COUNT as f32;
        let material = MaterialBlock::default()
            .with_base_color(Vec4::new(0.9 - hue * 0.6, 0.3 + hue * 0.4, 0.2 + hue * 0.6, 1.0))
            .with_roughness_metallic(0.4, if index % 3 == 0 { 1.0 } else { 0.0 });
        let transform = cube_transform(index, hue * std::f32::consts::PI);
        scene.add_mesh(table, &cube_id(index), &cube, transform, material)?;
    }
    Ok(())
}

/// Cubes alternate sides and grow as they recede.
fn cube_transform(index: usize, angle: f32) -> Mat4 {
    let scale = 1.0 + index as f32 * 0.5;
    let side = if index % 2 == 0 { -3.0 } else { 3.0 };
    let distance = 4.0 * (index as f32 + 1.0).powf(1.6);
    Mat4::from_scale_rotation_translation(
        Vec3::splat(scale),
        Quat::from_rotation_y(angle),
        Vec3::new(side, scale, -distance),
    )
}

/// Spin the cubes around their vertical axis.
pub fn animate(scene: &mut GpuScene, elapsed: f32) -> Result<(), SceneError> {
    for index in 0..CUBE_COUNT {
        let angle = elapsed * (0.3 + index as f32 * 0.1);
        scene.set_transform(&cube_id(index), cube_transform(index, angle))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use umbra_render::HeadlessDevice;

    fn initialized_scene(config: &Config) -> (GpuScene, ResourceTable<HeadlessDevice>) {
        let mut table = ResourceTable::with_device(HeadlessDevice::new());
        let mut scene = scene_from_config(config);
        scene.init(&mut table).unwrap();
        (scene, table)
    }

    #[test]
    fn test_scene_takes_shadow_settings_from_config() {
        let mut config = Config::default();
        config.shadow.cascade_count = 3;
        config.shadow.show_cascades = true;
        let scene = scene_from_config(&config);

        let light = scene.directional_light().unwrap();
        assert_eq!(light.cascade.count, 3);
        assert!(light.show_cascades);
        assert_eq!(light.normal_bias, config.shadow.normal_bias);
    }

    #[test]
    fn test_camera_uses_configured_planes() {
        let camera = camera_from_config(&CameraConfig::default(), 1600, 900);
        assert_eq!(camera.near, 0.1);
        assert_eq!(camera.far, 1000.0);
        assert!((camera.aspect_ratio() - 16.0 / 9.0).abs() < 1e-5);
        assert!(camera.forward().z < 0.0);
    }

    #[test]
    fn test_populate_adds_ground_and_cubes() {
        let (mut scene, mut table) = initialized_scene(&Config::default());
        populate(&mut scene, &mut table).unwrap();
        assert_eq!(scene.mesh_count(), CUBE_COUNT + 1);
    }

    #[test]
    fn test_animate_updates_existing_cubes() {
        let (mut scene, mut table) = initialized_scene(&Config::default());
        populate(&mut scene, &mut table).unwrap();
        animate(&mut scene, 1.5).unwrap();
        assert_eq!(scene.mesh_count(), CUBE_COUNT + 1);
    }

    #[test]
    fn test_animate_without_cubes_fails() {
        let (mut scene, _table) = initialized_scene(&Config::default());
        assert!(matches!(
            animate(&mut scene, 0.0),
            Err(SceneError::UnknownMesh(_))
        ));
    }
}
