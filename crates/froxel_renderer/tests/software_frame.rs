use froxel_core::RenderConfig;
use froxel_renderer::{
    RenderError, Scene, SoftwareGBuffer, SoftwareRenderer, material::MaterialData, mesh::MeshData,
};
use glam::{Mat4, Vec3, Vec4};

fn small_config() -> RenderConfig {
    let mut config = RenderConfig::default();
    config.cluster.dims = [16, 8, 32];
    config.cluster.max_lights_per_cluster = 64;
    config.lights.capacity = 600;
    config.lights.active_count = 500;
    config.clear_color = [0.2, 0.3, 0.4, 1.0];
    config
}

/// Unit-square wall facing the camera at the origin, 5 units away.
fn wall_scene() -> Scene {
    let mut scene = Scene::default();
    let plane = scene.add_mesh(MeshData::plane(2.0, 1.0));
    let white = scene.add_material(MaterialData::solid("white", [1.0; 4]));
    let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0))
        * Mat4::from_rotation_x(std::f32::consts::FRAC_PI_2);
    scene.add_object("wall", plane, white, transform);
    scene
}

#[test]
fn background_pixels_are_clear_color() {
    let mut config = small_config();
    config.camera.position = Vec3::ZERO;
    config.camera.target = Vec3::NEG_Z;
    // Put every light around the wall so background pixels sit inside lit clusters.
    config.motion.bounds_min = Vec3::new(-3.0, -3.0, -7.0);
    config.motion.bounds_max = Vec3::new(3.0, 3.0, -1.0);

    let mut renderer = SoftwareRenderer::new(config, wall_scene(), 64, 64).unwrap();
    let frame = renderer.render_frame(1.0 / 60.0).unwrap();
    let clear = Vec4::new(0.2, 0.3, 0.4, 1.0);

    assert_eq!(frame.pixel(0, 0), clear);
    assert_eq!(frame.pixel(63, 63), clear);

    let center = frame.pixel(32, 32);
    assert_ne!(center, clear);
    assert!(center.truncate().max_element() > 0.0);
    assert_eq!(center.w, 1.0);
}

#[test]
fn demo_scene_renders_lit_pixels() {
    let mut renderer = SoftwareRenderer::new(small_config(), Scene::demo(), 96, 54).unwrap();
    for _ in 0..3 {
        renderer.render_frame(1.0 / 60.0).unwrap();
    }

    let clear = Vec4::new(0.2, 0.3, 0.4, 1.0);
    let frame = renderer.frame();
    let lit = frame
        .pixels()
        .iter()
        .filter(|p| **p != clear && p.truncate().max_element() > 0.0)
        .count();
    assert!(lit > 0);
    assert!(frame.pixels().iter().all(|p| p.is_finite()));
}

#[test]
fn resize_reallocates_surfaces_before_next_frame() {
    let mut renderer = SoftwareRenderer::new(small_config(), Scene::demo(), 64, 36).unwrap();
    renderer.render_frame(0.016).unwrap();
    assert_eq!(renderer.gbuffer().extent(), (64, 36));

    renderer.resize(80, 60);
    assert_eq!(renderer.gbuffer().extent(), (80, 60));
    let frame = renderer.render_frame(0.016).unwrap();
    assert_eq!(frame.extent(), (80, 60));
    assert!((renderer.camera().aspect_ratio - 80.0 / 60.0).abs() < 1e-6);
}

#[test]
fn mismatched_gbuffer_is_a_fatal_error() {
    let mut renderer = SoftwareRenderer::new(small_config(), Scene::demo(), 64, 36).unwrap();
    renderer.attach_gbuffer(SoftwareGBuffer::new(32, 18));

    let err = renderer.render_frame(0.016).unwrap_err();
    assert!(matches!(
        err,
        RenderError::TargetSizeMismatch {
            expected: (64, 36),
            found: (32, 18),
            ..
        }
    ));
}

#[test]
fn active_light_count_is_clamped_not_rejected() {
    let mut renderer = SoftwareRenderer::new(small_config(), Scene::demo(), 32, 18).unwrap();
    assert_eq!(renderer.set_active_lights(10_000), 600);
    assert_eq!(renderer.lights().active_count(), 600);
    renderer.render_frame(0.016).unwrap();
}

#[test]
fn assignment_is_stable_without_motion() {
    let mut renderer = SoftwareRenderer::new(small_config(), Scene::demo(), 32, 18).unwrap();
    renderer.render_frame(0.0).unwrap();
    let first = renderer.records().clone();
    renderer.render_frame(0.0).unwrap();
    assert_eq!(&first, renderer.records());
}

#[test]
fn per_cluster_capacity_holds_through_frames() {
    let mut config = small_config();
    config.cluster.max_lights_per_cluster = 2;
    let mut renderer = SoftwareRenderer::new(config, Scene::demo(), 32, 18).unwrap();
    for _ in 0..5 {
        renderer.render_frame(0.1).unwrap();
    }

    let records = renderer.records();
    assert!((0..records.cluster_count()).all(|i| records.record(i).count <= 2));
    assert!((0..records.cluster_count()).any(|i| records.record(i).count == 2));

    let motion = &renderer.config().motion;
    for light in renderer.lights().lights() {
        assert!(light.position.cmpge(motion.bounds_min).all());
        assert!(light.position.cmple(motion.bounds_max).all());
    }
}
