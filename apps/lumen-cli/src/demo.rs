use glam::{Vec3, Vec4};
use lumen_common::Entity;
use lumen_scene::{LightFlags, LightType, Scene, primitives};
use std::f32::consts::FRAC_PI_3;

/// Entity names the demo loop animates.
pub const SPINNER: &str = "spinner";

/// A floor, a `grid` x `grid` field of cubes, a spinning parent with an
/// orbiting child, a shadow-casting sun, a point light and a camera.
pub fn build_scene(grid: u32, width: u32, height: u32) -> anyhow::Result<Scene> {
    let mut scene = Scene::new();

    let cube = scene.entity_create_mesh("cube");
    *scene.meshes.get_mut(cube).ok_or_else(missing)? = primitives::cube(0.5);

    let stone = scene.entity_create_material("stone");
    if let Some(material) = scene.materials.get_mut(stone) {
        material.set_base_color(Vec4::new(0.6, 0.6, 0.55, 1.0));
        material.set_roughness(0.9);
    }
    let glass = scene.entity_create_material("glass");
    if let Some(material) = scene.materials.get_mut(glass) {
        material.set_base_color(Vec4::new(0.7, 0.8, 1.0, 0.35));
        material.set_roughness(0.05);
    }
    if let Some(mesh) = scene.meshes.get_mut(cube) {
        for subset in &mut mesh.subsets {
            subset.material_id = stone;
        }
    }
    let glass_cube = scene.entity_create_mesh("glass_cube");
    let mut mesh = primitives::cube(0.5);
    for subset in &mut mesh.subsets {
        subset.material_id = glass;
    }
    *scene.meshes.get_mut(glass_cube).ok_or_else(missing)? = mesh;

    let floor = object(&mut scene, "floor", cube, Vec3::new(0.0, -0.5, 0.0))?;
    if let Some(t) = scene.transforms.get_mut(floor) {
        t.scale(Vec3::new(40.0, 0.2, 40.0));
    }

    let half = grid as f32 / 2.0;
    for x in 0..grid {
        for z in 0..grid {
            let mesh = if (x + z) % 3 == 0 { glass_cube } else { cube };
            let position = Vec3::new((x as f32 - half) * 2.0, 0.5, (z as f32 - half) * 2.0);
            object(&mut scene, &format!("cube_{x}_{z}"), mesh, position)?;
        }
    }

    let spinner = object(&mut scene, SPINNER, cube, Vec3::new(0.0, 3.0, 0.0))?;
    let moon = object(&mut scene, "moon", cube, Vec3::new(2.5, 0.0, 0.0))?;
    if let Some(t) = scene.transforms.get_mut(moon) {
        t.scale(Vec3::splat(0.4));
    }
    scene.component_attach(moon, spinner, true)?;

    let sun = scene.entity_create_light("sun", Vec3::new(0.0, 20.0, 0.0), Vec3::new(1.0, 0.95, 0.85), 4.0, 100.0);
    if let Some(light) = scene.lights.get_mut(sun) {
        light.light_type = LightType::Directional;
        light.flags.insert(LightFlags::CAST_SHADOW);
    }
    if let Some(t) = scene.transforms.get_mut(sun) {
        t.rotate_roll_pitch_yaw(Vec3::new(-1.0, 0.4, 0.0));
    }
    let lamp = scene.entity_create_light("lamp", Vec3::new(-3.0, 2.0, 3.0), Vec3::new(1.0, 0.6, 0.3), 2.0, 12.0);
    if let Some(light) = scene.lights.get_mut(lamp) {
        light.flags.insert(LightFlags::CAST_SHADOW);
    }

    let camera = scene.entity_create_camera("camera", width as f32, height as f32, 0.1, 200.0, FRAC_PI_3)?;
    if let Some(t) = scene.transforms.get_mut(camera) {
        t.rotate_roll_pitch_yaw(Vec3::new(-0.3, 0.0, 0.0));
        t.translate(Vec3::new(0.0, 8.0, half * 2.0 + 12.0));
    }
    Ok(scene)
}

fn object(scene: &mut Scene, name: &str, mesh: Entity, position: Vec3) -> anyhow::Result<Entity> {
    let entity = scene.entity_create_object(name);
    scene.objects.get_mut(entity).ok_or_else(missing)?.mesh_id = mesh;
    scene.transforms.get_mut(entity).ok_or_else(missing)?.translate(position);
    Ok(entity)
}

fn missing() -> anyhow::Error {
    anyhow::anyhow!("freshly created component is missing")
}
