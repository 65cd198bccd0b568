//! End-to-end checks of the server contract through the public API
//!
//! Every test drives a headless server: create handles, mutate them, publish
//! with `sync` and execute with `draw`.

use render_server::foundation::math::{Transform, Vec3};
use render_server::frame::{FramePhase, HeadlessBackend};
use render_server::prelude::*;
use render_server::resources::mesh::{MeshArrays, PrimitiveType};
use render_server::resources::texture::{CubeMapSide, PixelFormat, TextureFlags};
use render_server::scene::ViewportClearMode;

fn server() -> RenderServer {
    RenderServer::headless(ServerConfig::default())
}

/// Mesh whose single surface spans the unit box
fn unit_box_mesh(vs: &mut RenderServer) -> Rid {
    let mesh = vs.mesh_create();
    let arrays = MeshArrays {
        vertices: vec![Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0)],
        ..MeshArrays::default()
    };
    vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Triangles, &arrays, &[])
        .expect("surface");
    mesh
}

fn placed(vs: &mut RenderServer, mesh: Rid, scenario: Rid, position: Vec3, id: u64) -> Rid {
    let instance = vs.instance_create2(mesh, scenario).expect("instance");
    vs.instance_set_transform(instance, Transform::from_position(position)).expect("transform");
    vs.instance_attach_object_id(instance, Some(ObjectId(id))).expect("object id");
    instance
}

#[test]
fn test_kind_is_stable_until_free() {
    let mut vs = server();
    let created = [
        (vs.texture_create(), ResourceKind::Texture),
        (vs.mesh_create(), ResourceKind::Mesh),
        (vs.material_create(), ResourceKind::Material),
        (vs.scenario_create(), ResourceKind::Scenario),
        (vs.instance_create(), ResourceKind::Instance),
        (vs.viewport_create(), ResourceKind::Viewport),
        (vs.canvas_create(), ResourceKind::Canvas),
        (vs.canvas_item_create(), ResourceKind::CanvasItem),
        (vs.camera_create(), ResourceKind::Camera),
        (vs.environment_create(), ResourceKind::Environment),
    ];

    for (rid, kind) in created {
        assert_eq!(vs.kind_of(rid), Ok(kind));
    }
    vs.sync();
    vs.draw();
    for (rid, kind) in created {
        assert_eq!(vs.kind_of(rid), Ok(kind));
    }
}

#[test]
fn test_freed_handle_never_aliases() {
    let mut vs = server();
    let old = vs.texture_create();
    vs.free(old).expect("free");

    let fresh: Vec<Rid> = (0..8).map(|_| vs.texture_create()).collect();
    assert!(!fresh.contains(&old));
    assert!(matches!(vs.texture_get_flags(old), Err(ServerError::InvalidHandle { .. })));
    assert!(matches!(
        vs.texture_set_flags(old, TextureFlags::FILTER),
        Err(ServerError::InvalidHandle { .. })
    ));
}

#[test]
fn test_sync_twice_is_idempotent() {
    let mut vs = server();
    let scenario = vs.scenario_create();
    let mesh = unit_box_mesh(&mut vs);
    placed(&mut vs, mesh, scenario, Vec3::zeros(), 1);

    vs.sync();
    let first = vs.published_frame();
    vs.sync();
    let second = vs.published_frame();

    assert_eq!(first.revision, second.revision);
    assert_eq!(*first, *second);
    assert_eq!(vs.phase(), FramePhase::Published);
}

#[test]
fn test_setter_visible_before_sync() {
    let mut vs = server();
    let texture = vs.texture_create();
    assert_eq!(vs.texture_get_flags(texture), Ok(TextureFlags::REPEAT | TextureFlags::MIPMAPS | TextureFlags::FILTER));

    let flags = TextureFlags::FILTER | TextureFlags::ANISOTROPIC_FILTER;
    vs.texture_set_flags(texture, flags).expect("flags");
    assert_eq!(vs.texture_get_flags(texture), Ok(flags));
}

#[test]
fn test_once_viewport_disables_after_draw() {
    let backend = HeadlessBackend::new();
    let stats = backend.stats();
    let mut vs = RenderServer::new(ServerConfig::default(), Box::new(backend));

    let viewport = vs.viewport_create();
    vs.viewport_set_update_mode(viewport, ViewportUpdateMode::Once).expect("mode");
    vs.sync();
    vs.draw();

    assert_eq!(stats.last_viewport_count(), 1);
    assert_eq!(vs.viewport_get_update_mode(viewport), Ok(ViewportUpdateMode::Disabled));

    vs.sync();
    vs.draw();
    assert_eq!(stats.last_viewport_count(), 0);
}

#[test]
fn test_repeated_draw_runs_once_viewport_once() {
    let backend = HeadlessBackend::new();
    let stats = backend.stats();
    let mut vs = RenderServer::new(ServerConfig::default(), Box::new(backend));

    let once = vs.viewport_create();
    vs.viewport_set_update_mode(once, ViewportUpdateMode::Once).expect("mode");
    vs.sync();
    let revision = vs.published_frame().revision;

    vs.draw();
    assert_eq!(stats.last_viewport_count(), 1);
    vs.draw();
    assert_eq!(stats.frames_executed(), 2);
    assert_eq!(stats.last_viewport_count(), 0);
    assert!(vs.published_frame().viewport(once).is_none());

    vs.sync();
    assert_eq!(vs.published_frame().revision, revision);
    assert!(!vs.has_changed());
}

#[test]
fn test_repeated_draw_clears_only_next_frame_once() {
    let mut vs = server();
    let viewport = vs.viewport_create();
    vs.viewport_set_clear_mode(viewport, ViewportClearMode::OnlyNextFrame).expect("clear");
    vs.sync();

    vs.draw();
    let frame = vs.published_frame();
    assert_eq!(frame.viewport(viewport).map(|v| v.clear_mode), Some(ViewportClearMode::Never));
    vs.draw();
    assert_eq!(vs.viewport_get_clear_mode(viewport), Ok(ViewportClearMode::Never));
}

#[test]
fn test_shrink_x2_is_stable_across_uploads() {
    let mut vs = server();
    vs.texture_set_shrink_all_x2_on_set_data(true);
    let pixels = image::DynamicImage::ImageRgba8(image::RgbaImage::new(64, 64));

    let flat = vs.texture_create();
    vs.texture_allocate(flat, 64, 64, PixelFormat::Rgba8, TextureFlags::DEFAULT).expect("allocate");
    for _ in 0..3 {
        vs.texture_set_data(flat, &pixels, CubeMapSide::Left).expect("upload");
    }
    assert_eq!(vs.texture_get_width(flat), Ok(32));
    assert_eq!(vs.texture_get_height(flat), Ok(32));

    let cube = vs.texture_create();
    vs.texture_allocate(cube, 64, 64, PixelFormat::Rgba8, TextureFlags::CUBEMAP).expect("allocate");
    for side in [CubeMapSide::Left, CubeMapSide::Top, CubeMapSide::Back] {
        vs.texture_set_data(cube, &pixels, side).expect("side");
    }
    let widths: Vec<u32> = [CubeMapSide::Left, CubeMapSide::Top, CubeMapSide::Back]
        .into_iter()
        .map(|side| vs.texture_get_data(cube, side).expect("data").expect("uploaded").width())
        .collect();
    assert_eq!(widths, vec![32, 32, 32]);
    assert_eq!(vs.texture_get_width(cube), Ok(32));
}

#[test]
fn test_aabb_query_returns_only_overlapping() {
    let mut vs = server();
    let scenario = vs.scenario_create();
    let mesh = unit_box_mesh(&mut vs);
    placed(&mut vs, mesh, scenario, Vec3::zeros(), 1);
    placed(&mut vs, mesh, scenario, Vec3::new(5.0, 5.0, 5.0), 2);
    vs.sync();

    let query = AABB::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));
    assert_eq!(vs.instances_cull_aabb(query, scenario), Ok(vec![ObjectId(1)]));
}

#[test]
fn test_queries_read_published_state_only() {
    let mut vs = server();
    let scenario = vs.scenario_create();
    let mesh = unit_box_mesh(&mut vs);
    let query = AABB::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));

    placed(&mut vs, mesh, scenario, Vec3::zeros(), 1);
    assert_eq!(vs.instances_cull_aabb(query, scenario), Ok(vec![]));

    vs.sync();
    assert_eq!(vs.instances_cull_aabb(query, scenario), Ok(vec![ObjectId(1)]));
}

#[test]
fn test_ray_and_convex_queries() {
    let mut vs = server();
    let scenario = vs.scenario_create();
    let mesh = unit_box_mesh(&mut vs);
    placed(&mut vs, mesh, scenario, Vec3::zeros(), 1);
    placed(&mut vs, mesh, scenario, Vec3::new(5.0, 5.0, 5.0), 2);
    vs.sync();

    let ray = vs
        .instances_cull_ray(Vec3::new(-1.0, 0.5, 0.5), Vec3::new(10.0, 0.5, 0.5), scenario)
        .expect("ray");
    assert_eq!(ray, vec![ObjectId(1)]);

    let right_of_three = ConvexVolume::new(vec![Plane::from_point_normal(Vec3::new(3.0, 0.0, 0.0), Vec3::x())]);
    assert_eq!(vs.instances_cull_convex(right_of_three, scenario), Ok(vec![ObjectId(2)]));
}

#[test]
fn test_identical_bounds_in_insertion_order() {
    let mut vs = server();
    let scenario = vs.scenario_create();
    let mesh = unit_box_mesh(&mut vs);
    for id in [30, 10, 20] {
        placed(&mut vs, mesh, scenario, Vec3::zeros(), id);
    }
    vs.sync();

    let query = AABB::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
    assert_eq!(
        vs.instances_cull_aabb(query, Rid::empty()),
        Ok(vec![ObjectId(30), ObjectId(10), ObjectId(20)])
    );
}

#[test]
fn test_leaving_scenario_keeps_instance() {
    let mut vs = server();
    let scenario = vs.scenario_create();
    let mesh = unit_box_mesh(&mut vs);
    let instance = placed(&mut vs, mesh, scenario, Vec3::zeros(), 1);
    let query = AABB::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0));
    vs.sync();
    assert_eq!(vs.instances_cull_aabb(query, scenario), Ok(vec![ObjectId(1)]));

    vs.instance_set_scenario(instance, Rid::empty()).expect("leave");
    vs.sync();
    assert_eq!(vs.instances_cull_aabb(query, scenario), Ok(vec![]));
    assert_eq!(vs.kind_of(instance), Ok(ResourceKind::Instance));

    let other = unit_box_mesh(&mut vs);
    vs.instance_set_base(instance, other).expect("set base after leaving");
}

#[test]
fn test_freed_material_resolves_absent() {
    let mut vs = server();
    let scenario = vs.scenario_create();
    let mesh = unit_box_mesh(&mut vs);
    let instance = placed(&mut vs, mesh, scenario, Vec3::zeros(), 1);
    let material = vs.material_create();
    vs.instance_set_surface_material(instance, 0, material).expect("override");
    assert_eq!(vs.instance_get_surface_material(instance, 0), Ok(Some(material)));

    vs.free(material).expect("free");
    assert_eq!(vs.instance_get_surface_material(instance, 0), Ok(None));

    vs.sync();
    let frame = vs.published_frame();
    let published = frame.scenario(scenario).expect("scenario");
    assert_eq!(published.instances[0].surfaces[0].material, None);
    assert!(vs.draw());
}

#[test]
fn test_remove_middle_surface_shifts_down() {
    let mut vs = server();
    let mesh = vs.mesh_create();
    for count in [3_usize, 4, 5] {
        let arrays = MeshArrays {
            vertices: (0..count).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect(),
            ..MeshArrays::default()
        };
        vs.mesh_add_surface_from_arrays(mesh, PrimitiveType::Points, &arrays, &[])
            .expect("surface");
    }

    vs.mesh_remove_surface(mesh, 1).expect("remove");
    assert_eq!(vs.mesh_get_surface_count(mesh), Ok(2));
    assert_eq!(vs.mesh_surface_get_array_len(mesh, 0), Ok(3));
    assert_eq!(vs.mesh_surface_get_array_len(mesh, 1), Ok(5));
    assert!(matches!(
        vs.mesh_surface_get_array_len(mesh, 2),
        Err(ServerError::OutOfRange { .. })
    ));
}

#[test]
fn test_has_changed_tracks_published_content() {
    let mut vs = server();
    assert!(!vs.has_changed());

    let scenario = vs.scenario_create();
    vs.sync();
    assert!(vs.has_changed());
    vs.draw();
    assert!(!vs.has_changed());

    vs.sync();
    assert!(!vs.has_changed());

    vs.scenario_set_debug(scenario, render_server::scene::ScenarioDebugMode::Wireframe)
        .expect("debug");
    vs.sync();
    assert!(vs.has_changed());
}

#[test]
fn test_reader_follows_sync_from_another_thread() {
    let mut vs = server();
    let reader = vs.reader();
    vs.scenario_create();
    vs.sync();
    let revision = vs.published_frame().revision;

    let seen = std::thread::spawn(move || reader.load().scenarios.len())
        .join()
        .expect("reader thread");
    assert_eq!(seen, 1);
    assert_eq!(revision, 1);
}

#[test]
fn test_render_info_counts_drawn_instances() {
    let mut vs = server();
    vs.init().expect("init");
    let scenario = vs.scenario_create();
    let viewport = vs.viewport_create();
    vs.viewport_set_scenario(viewport, scenario).expect("scenario");
    let cube = vs.get_test_cube();
    placed(&mut vs, cube, scenario, Vec3::zeros(), 1);
    placed(&mut vs, cube, scenario, Vec3::new(3.0, 0.0, 0.0), 2);

    vs.sync();
    vs.draw();
    assert_eq!(vs.get_render_info(RenderInfo::ObjectsInFrame), 2);
    assert_eq!(vs.get_render_info(RenderInfo::VerticesInFrame), 48);
    assert_eq!(vs.get_render_info(RenderInfo::DrawCallsInFrame), 2);
    assert!(vs.get_render_info(RenderInfo::VideoMemUsed) > 0);
    vs.finish();
}
