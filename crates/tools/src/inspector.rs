use lumen_common::{Aabb, Entity};
use lumen_scene::Scene;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;

/// Read-only queries over a scene for debugging and command-line tools.
pub struct SceneInspector;

impl SceneInspector {
    pub fn summary(scene: &Scene) -> SceneSummary {
        let stats = scene.stats();
        SceneSummary {
            entities: scene.entity_count(),
            objects: scene.objects.len(),
            meshes: scene.meshes.len(),
            materials: scene.materials.len(),
            lights: scene.lights.len(),
            cameras: scene.cameras.len(),
            animations: scene.animations.len(),
            hierarchy_links: scene.hierarchy.len(),
            bounds: scene.bounds(),
            frame: stats.frame,
            skipped_objects: stats.skipped_objects,
            dangling_parents: stats.dangling_parents,
        }
    }

    /// `None` when no component array knows `entity`.
    pub fn inspect_entity(scene: &Scene, entity: Entity) -> Option<EntityInfo> {
        let components = component_names(scene, entity);
        if components.is_empty() {
            return None;
        }
        let transform = scene.transforms.get(entity);
        Some(EntityInfo {
            entity,
            name: scene.names.get(entity).map(|n| n.as_str().to_owned()),
            parent: scene.parent_of(entity),
            position: transform.map(|t| t.position().to_array()),
            rotation: transform.map(|t| t.rotation().to_array()),
            scale: transform.map(|t| t.scale_world().to_array()),
            components,
        })
    }

    /// Every entity that owns at least one component, in handle order.
    pub fn list_entities(scene: &Scene) -> Vec<Entity> {
        let mut all = BTreeSet::new();
        all.extend(scene.names.entities().iter().copied());
        all.extend(scene.transforms.entities().iter().copied());
        all.extend(scene.materials.entities().iter().copied());
        all.extend(scene.meshes.entities().iter().copied());
        all.extend(scene.lights.entities().iter().copied());
        all.extend(scene.cameras.entities().iter().copied());
        all.extend(scene.animations.entities().iter().copied());
        all.extend(scene.animation_datas.entities().iter().copied());
        all.extend(scene.rigidbodies.entities().iter().copied());
        all.extend(scene.armatures.entities().iter().copied());
        all.into_iter().collect()
    }

    /// Indented parent/child listing of every entity with a transform.
    pub fn hierarchy_tree(scene: &Scene) -> String {
        let mut children: BTreeMap<Entity, Vec<Entity>> = BTreeMap::new();
        for (child, link) in scene.hierarchy.iter() {
            children.entry(link.parent).or_default().push(child);
        }
        for list in children.values_mut() {
            list.sort();
        }
        let mut roots: Vec<Entity> = scene
            .transforms
            .entities()
            .iter()
            .copied()
            .filter(|e| !scene.hierarchy.contains(*e))
            .collect();
        // Parents that lost their transform still anchor their subtree.
        roots.extend(
            children
                .keys()
                .copied()
                .filter(|p| !scene.transforms.contains(*p) && !scene.hierarchy.contains(*p)),
        );
        roots.sort();
        roots.dedup();

        let mut out = String::new();
        let mut visited = HashSet::new();
        for root in roots {
            write_subtree(scene, &children, root, 0, &mut visited, &mut out);
        }
        out
    }
}

fn write_subtree(
    scene: &Scene,
    children: &BTreeMap<Entity, Vec<Entity>>,
    entity: Entity,
    depth: usize,
    visited: &mut HashSet<Entity>,
    out: &mut String,
) {
    if !visited.insert(entity) {
        tracing::warn!(%entity, "hierarchy cycle while listing");
        return;
    }
    let name = scene.names.get(entity).map_or("<unnamed>", |n| n.as_str());
    let _ = writeln!(out, "{:indent$}{name} {entity}", "", indent = depth * 2);
    for &child in children.get(&entity).map(Vec::as_slice).unwrap_or_default() {
        write_subtree(scene, children, child, depth + 1, visited, out);
    }
}

fn component_names(scene: &Scene, entity: Entity) -> Vec<&'static str> {
    let checks = [
        ("name", scene.names.contains(entity)),
        ("layer", scene.layers.contains(entity)),
        ("transform", scene.transforms.contains(entity)),
        ("hierarchy", scene.hierarchy.contains(entity)),
        ("material", scene.materials.contains(entity)),
        ("mesh", scene.meshes.contains(entity)),
        ("object", scene.objects.contains(entity)),
        ("rigidbody", scene.rigidbodies.contains(entity)),
        ("armature", scene.armatures.contains(entity)),
        ("light", scene.lights.contains(entity)),
        ("camera", scene.cameras.contains(entity)),
        ("animation", scene.animations.contains(entity)),
        ("animation_data", scene.animation_datas.contains(entity)),
    ];
    checks
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneSummary {
    pub entities: usize,
    pub objects: usize,
    pub meshes: usize,
    pub materials: usize,
    pub lights: usize,
    pub cameras: usize,
    pub animations: usize,
    pub hierarchy_links: usize,
    pub bounds: Aabb,
    /// Frame of the last update, 0 before the first one.
    pub frame: u64,
    pub skipped_objects: usize,
    pub dangling_parents: usize,
}

impl std::fmt::Display for SceneSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scene: entities={} objects={} meshes={} materials={} lights={} cameras={} \
             animations={} links={} frame={}",
            self.entities,
            self.objects,
            self.meshes,
            self.materials,
            self.lights,
            self.cameras,
            self.animations,
            self.hierarchy_links,
            self.frame,
        )?;
        if self.bounds.is_valid() {
            let (min, max) = (self.bounds.min, self.bounds.max);
            write!(
                f,
                " bounds=({:.2}, {:.2}, {:.2})..({:.2}, {:.2}, {:.2})",
                min.x, min.y, min.z, max.x, max.y, max.z
            )?;
        }
        if self.skipped_objects > 0 || self.dangling_parents > 0 {
            write!(
                f,
                " skipped_objects={} dangling_parents={}",
                self.skipped_objects, self.dangling_parents
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub entity: Entity,
    pub name: Option<String>,
    pub parent: Option<Entity>,
    /// World-space pose as of the last update.
    pub position: Option<[f32; 3]>,
    pub rotation: Option<[f32; 4]>,
    pub scale: Option<[f32; 3]>,
    pub components: Vec<&'static str>,
}

impl std::fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entity {} \"{}\"",
            self.entity,
            self.name.as_deref().unwrap_or("<unnamed>")
        )?;
        if let Some(parent) = self.parent {
            write!(f, " parent={parent}")?;
        }
        if let (Some(p), Some(s)) = (self.position, self.scale) {
            write!(
                f,
                " pos=({:.2}, {:.2}, {:.2}) scale=({:.2}, {:.2}, {:.2})",
                p[0], p[1], p[2], s[0], s[1], s[2]
            )?;
        }
        write!(f, " [{}]", self.components.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_jobs::JobSystem;
    use lumen_scene::primitives;

    fn scene() -> Scene {
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);
        let parent = scene.entity_create_object("parent");
        scene.objects.get_mut(parent).unwrap().mesh_id = mesh;
        scene.transforms.get_mut(parent).unwrap().translate(Vec3::new(1.0, 0.0, 0.0));
        let child = scene.entity_create_object("child");
        scene.transforms.get_mut(child).unwrap().translate(Vec3::new(0.0, 1.0, 0.0));
        scene.component_attach(child, parent, true).unwrap();
        let grandchild = scene.entity_create_object("grandchild");
        scene.component_attach(grandchild, child, true).unwrap();
        scene.update(0.0, &JobSystem::inline()).unwrap();
        scene
    }

    #[test]
    fn summary_empty_scene() {
        let summary = SceneInspector::summary(&Scene::new());
        assert_eq!(summary.entities, 0);
        assert_eq!(summary.frame, 0);
        assert!(format!("{summary}").contains("entities=0"));
    }

    #[test]
    fn summary_counts_components() {
        let scene = scene();
        let summary = SceneInspector::summary(&scene);
        assert_eq!(summary.entities, 4);
        assert_eq!(summary.objects, 3);
        assert_eq!(summary.meshes, 1);
        assert_eq!(summary.hierarchy_links, 2);
        assert_eq!(summary.skipped_objects, 2);
        let text = format!("{summary}");
        assert!(text.contains("objects=3"), "{text}");
        assert!(text.contains("bounds="), "{text}");
    }

    #[test]
    fn inspect_entity_reports_world_pose() {
        let scene = scene();
        let child = scene.find_by_name("child").unwrap();
        let info = SceneInspector::inspect_entity(&scene, child).unwrap();
        assert_eq!(info.name.as_deref(), Some("child"));
        assert_eq!(info.parent, scene.find_by_name("parent"));
        let p = info.position.unwrap();
        assert!((p[0] - 1.0).abs() < 1e-5 && (p[1] - 1.0).abs() < 1e-5, "{p:?}");
        assert!(info.components.contains(&"hierarchy"));
        assert!(format!("{info}").contains("\"child\""));
    }

    #[test]
    fn inspect_unknown_entity() {
        assert!(SceneInspector::inspect_entity(&scene(), Entity::create()).is_none());
    }

    #[test]
    fn list_entities_is_sorted_and_unique() {
        let scene = scene();
        let list = SceneInspector::list_entities(&scene);
        assert_eq!(list.len(), 4);
        assert!(list.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn hierarchy_tree_indents_children() {
        let tree = SceneInspector::hierarchy_tree(&scene());
        let lines: Vec<&str> = tree.lines().collect();
        assert_eq!(lines.len(), 3, "{tree}");
        assert!(lines[0].starts_with("parent #"));
        assert!(lines[1].starts_with("  child #"));
        assert!(lines[2].starts_with("    grandchild #"));
    }
}
