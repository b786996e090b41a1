use crate::RenderError;
use crate::config::{RenderFeatures, RenderPathConfig, RenderTechnique};
use crate::context::{FrameConstants, ReflectionView, RenderContext, RenderStats, ShadowView};
use crate::passes::{self, RenderPass};
use crate::pipelines::RenderPipelines;
use crate::targets::{RenderTargets, SHADOW_ATLAS_TILES};
use glam::{Mat4, Vec3};
use lumen_common::Entity;
use lumen_cull::{CullingConfig, CullingSystem, Visibility, batch_objects, shadow_casters};
use lumen_graphics::{
    CommandList, DefaultTextures, GraphicsCapabilities, GraphicsDevice, RaytracingAccelerationStructure,
    RaytracingAsDesc, ShaderSource, SwapChain,
};
use lumen_jobs::JobSystem;
use lumen_scene::{CameraComponent, LightComponent, LightType, MaterialFlags, Scene};
use std::f32::consts::FRAC_PI_2;
use std::time::Instant;

const SHADOW_NEAR: f32 = 0.1;

const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// 3D render path: camera selection, culling, shadow and reflection views,
/// and recording of the technique's passes into one shadow and one main
/// command list.
pub struct RenderPath3D {
    config: RenderPathConfig,
    technique: RenderTechnique,
    passes: Vec<RenderPass>,
    culling: CullingSystem,
    textures: DefaultTextures,
    pipelines: RenderPipelines,
    targets: Option<RenderTargets>,
    tlas: Option<RaytracingAccelerationStructure>,
    camera_entity: Option<Entity>,
    camera: CameraComponent,
    visibility: Visibility,
    shadow_views: Vec<ShadowView>,
    reflection: Option<ReflectionView>,
    time: f32,
    frame: u64,
    prev_view_projection: Mat4,
    accumulation_frames: u32,
    warned_default_camera: bool,
    last_stats: RenderStats,
}

impl RenderPath3D {
    pub fn new(
        config: RenderPathConfig,
        culling: CullingConfig,
        textures: DefaultTextures,
    ) -> Result<Self, RenderError> {
        config.validate()?;
        let culling = CullingSystem::new(culling)?;
        let technique = config.technique;
        Ok(Self {
            passes: passes::build_pass_list(&config, technique),
            config,
            technique,
            culling,
            textures,
            pipelines: RenderPipelines::default(),
            targets: None,
            tlas: None,
            camera_entity: None,
            camera: CameraComponent::default(),
            visibility: Visibility::default(),
            shadow_views: Vec::new(),
            reflection: None,
            time: 0.0,
            frame: 0,
            prev_view_projection: Mat4::IDENTITY,
            accumulation_frames: 0,
            warned_default_camera: false,
            last_stats: RenderStats::default(),
        })
    }

    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    /// Technique in effect, which may differ from the configured one when
    /// the device lacks raytracing.
    pub fn technique(&self) -> RenderTechnique {
        self.technique
    }

    pub fn config(&self) -> &RenderPathConfig {
        &self.config
    }

    /// Render from `entity`'s camera; `None` picks the scene's first camera.
    pub fn set_camera_entity(&mut self, entity: Option<Entity>) {
        self.camera_entity = entity;
    }

    pub fn camera(&self) -> &CameraComponent {
        &self.camera
    }

    pub fn visibility(&self) -> &Visibility {
        &self.visibility
    }

    pub fn shadow_views(&self) -> &[ShadowView] {
        &self.shadow_views
    }

    pub fn reflection(&self) -> Option<&ReflectionView> {
        self.reflection.as_ref()
    }

    pub fn targets(&self) -> Option<&RenderTargets> {
        self.targets.as_ref()
    }

    pub fn pipelines(&self) -> &RenderPipelines {
        &self.pipelines
    }

    pub fn last_stats(&self) -> &RenderStats {
        &self.last_stats
    }

    pub fn load_pipelines(&mut self, device: &dyn GraphicsDevice, source: &dyn ShaderSource) {
        self.pipelines = RenderPipelines::load(device, source);
    }

    /// Create GPU buffers for every mesh that has none yet. Returns how many
    /// meshes were uploaded.
    pub fn prepare_meshes(&self, device: &dyn GraphicsDevice, scene: &mut Scene) -> usize {
        let mut created = 0;
        for (entity, mesh) in scene.meshes.iter_mut() {
            if mesh.buffers.is_some() || !mesh.is_renderable() {
                continue;
            }
            match mesh.create_render_data(device) {
                Ok(()) => created += 1,
                Err(err) => tracing::warn!(%entity, %err, "mesh upload failed"),
            }
        }
        created
    }

    /// (Re)create the render targets at `width` x `height`.
    pub fn resize_buffers(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        let mut technique = self.config.technique;
        if technique == RenderTechnique::PathTraced
            && !device.check_capability(GraphicsCapabilities::RAYTRACING)
        {
            tracing::warn!("device has no raytracing, path tracing falls back to forward");
            technique = RenderTechnique::Forward;
        }
        let targets =
            RenderTargets::create(device, &self.config, technique, &self.textures, width, height)?;
        self.technique = technique;
        self.passes = passes::build_pass_list(&self.config, technique);
        self.targets = Some(targets);
        self.accumulation_frames = 0;
        Ok(())
    }

    /// Select the camera, cull the scene and derive shadow and reflection
    /// views for the next [`render`](Self::render).
    pub fn update(&mut self, scene: &Scene, dt: f32) -> Result<(), RenderError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(RenderError::InvalidParameter(format!(
                "delta time must be finite and non-negative, got {dt}"
            )));
        }
        let _span = tracing::info_span!("render_path_update", frame = self.frame).entered();
        self.camera = self.select_camera(scene);
        self.visibility = self
            .culling
            .cull(scene, &self.camera.frustum, self.config.layer_mask);

        self.shadow_views = if self.passes.contains(&RenderPass::Shadows) {
            self.compute_shadow_views(scene)
        } else {
            Vec::new()
        };
        self.reflection = if self.config.has(RenderFeatures::REFLECTIONS)
            && self.technique != RenderTechnique::PathTraced
        {
            self.compute_reflection(scene)
        } else {
            None
        };

        if self.camera.view_projection == self.prev_view_projection {
            self.accumulation_frames = self.accumulation_frames.saturating_add(1);
        } else {
            self.accumulation_frames = 0;
        }
        self.time += dt;
        Ok(())
    }

    /// Record the frame: shadow list and main list in parallel jobs, shadow
    /// list begun first so it is submitted first.
    pub fn render(
        &mut self,
        device: &dyn GraphicsDevice,
        scene: &Scene,
        jobs: &JobSystem,
    ) -> Result<RenderStats, RenderError> {
        let _span = tracing::info_span!("render_path", frame = self.frame).entered();
        let started = Instant::now();
        if self.targets.is_none() {
            return Err(RenderError::MissingTargets);
        }
        if self.passes.contains(&RenderPass::PathTrace) {
            self.update_tlas(device)?;
        }

        let this = &*self;
        let Some(targets) = this.targets.as_ref() else {
            return Err(RenderError::MissingTargets);
        };
        let frame = this.frame_constants(targets);
        let shadow_cmd = (this.passes.contains(&RenderPass::Shadows) && !this.shadow_views.is_empty())
            .then(|| device.begin_command_list());
        let main_cmd = device.begin_command_list();

        let mut shadow_stats = RenderStats::default();
        let mut main_stats = RenderStats::default();
        let (shadow_out, main_out) = (&mut shadow_stats, &mut main_stats);
        jobs.scope(|s| {
            if let Some(cmd) = shadow_cmd {
                let out = shadow_out;
                s.execute(move |_| {
                    let mut ctx = this.context(device, scene, targets, frame, cmd);
                    passes::execute(RenderPass::Shadows, &mut ctx);
                    *out = ctx.stats;
                    Ok(())
                });
            }
            let out = main_out;
            s.execute(move |_| {
                let mut ctx = this.context(device, scene, targets, frame, main_cmd);
                for &pass in &this.passes {
                    if pass != RenderPass::Shadows {
                        passes::execute(pass, &mut ctx);
                    }
                }
                *out = ctx.stats;
                Ok(())
            });
        })?;

        let mut stats = shadow_stats;
        stats.merge(main_stats);
        stats.frame = self.frame;
        stats.visible_objects = self.visibility.visible_objects.len();
        stats.visible_lights = self.visibility.visible_lights.len();
        stats.shadow_views = self.shadow_views.len();
        stats.skipped_objects += self.visibility.stats.skipped;
        stats.record_time = started.elapsed();
        tracing::debug!(
            frame = stats.frame,
            draws = stats.draw_calls,
            shadow_draws = stats.shadow_draw_calls,
            skipped = stats.skipped_objects,
            elapsed_us = stats.record_time.as_micros() as u64,
            "frame recorded"
        );

        self.prev_view_projection = self.camera.view_projection;
        self.frame += 1;
        self.last_stats = stats.clone();
        Ok(stats)
    }

    /// Blend the final image onto `swap_chain`.
    pub fn compose(
        &self,
        device: &dyn GraphicsDevice,
        swap_chain: &SwapChain,
        cmd: CommandList,
    ) -> Result<(), RenderError> {
        let targets = self.targets.as_ref().ok_or(RenderError::MissingTargets)?;
        passes::compose(device, targets, &self.pipelines, swap_chain, cmd);
        Ok(())
    }

    fn context<'a>(
        &'a self,
        device: &'a dyn GraphicsDevice,
        scene: &'a Scene,
        targets: &'a RenderTargets,
        frame: FrameConstants,
        cmd: CommandList,
    ) -> RenderContext<'a> {
        RenderContext {
            device,
            cmd,
            scene,
            config: &self.config,
            targets,
            pipelines: &self.pipelines,
            textures: &self.textures,
            camera: &self.camera,
            visibility: &self.visibility,
            reflection: self.reflection.as_ref(),
            shadows: &self.shadow_views,
            tlas: self.tlas.as_ref(),
            frame,
            stats: RenderStats::default(),
        }
    }

    fn frame_constants(&self, targets: &RenderTargets) -> FrameConstants {
        let camera = &self.camera;
        FrameConstants {
            view_projection: camera.view_projection.to_cols_array_2d(),
            inv_view_projection: camera.inv_view_projection.to_cols_array_2d(),
            prev_view_projection: self.prev_view_projection.to_cols_array_2d(),
            camera_position: camera.eye.extend(1.0).to_array(),
            resolution: [targets.width as f32, targets.height as f32],
            time: self.time,
            exposure: self.config.exposure,
            frame_index: self.frame as u32,
            light_count: self.visibility.visible_lights.len() as u32,
            accumulation_frames: self.accumulation_frames,
            padding: 0,
        }
    }

    fn select_camera(&mut self, scene: &Scene) -> CameraComponent {
        let chosen = match self.camera_entity {
            Some(entity) => scene.cameras.get(entity),
            None => scene.cameras.components().first(),
        };
        if let Some(camera) = chosen {
            let mut camera = *camera;
            if camera.flags.contains(lumen_scene::CameraFlags::DIRTY) {
                camera.update_camera();
            }
            return camera;
        }
        if !self.warned_default_camera {
            tracing::warn!("scene has no camera, rendering from a default one");
            self.warned_default_camera = true;
        }
        let mut camera = CameraComponent::default();
        let (width, height) = (self.config.width as f32, self.config.height as f32);
        let (near, far, fov) = (camera.z_near, camera.z_far, camera.fov);
        if camera.create_perspective(width, height, near, far, fov).is_err() {
            camera.update_camera();
        }
        camera
    }

    /// Assign atlas tiles to visible shadow-casting lights in index order.
    /// Lights that no longer fit are left without shadows.
    fn compute_shadow_views(&self, scene: &Scene) -> Vec<ShadowView> {
        let mut views = Vec::new();
        let mut next_tile = 0;
        let mut dropped = 0usize;
        for &index in &self.visibility.visible_lights {
            let Some(light) = scene.lights.components().get(index as usize) else {
                continue;
            };
            if !light.is_cast_shadow() {
                continue;
            }
            let Some(view_projections) = shadow_matrices(light, scene) else {
                continue;
            };
            let tiles = view_projections.len() as u32;
            if next_tile + tiles > SHADOW_ATLAS_TILES {
                dropped += 1;
                continue;
            }
            let casters = shadow_casters(scene, index as usize);
            views.push(ShadowView {
                light_index: index,
                view_projections,
                first_tile: next_tile,
                batches: batch_objects(scene, &casters),
            });
            next_tile += tiles;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "shadow atlas full, lights left unshadowed");
        }
        views
    }

    /// Mirror the camera about the first visible object whose material
    /// requests a planar reflection.
    fn compute_reflection(&mut self, scene: &Scene) -> Option<ReflectionView> {
        let (reflector, plane) = self.visibility.visible_objects.iter().find_map(|&index| {
            let object = scene.objects.components().get(index as usize)?;
            let mesh = scene.meshes.get(object.mesh_id)?;
            let reflective = mesh.subsets.iter().any(|subset| {
                scene
                    .materials
                    .get(subset.material_id)
                    .is_some_and(|m| m.flags.contains(MaterialFlags::PLANAR_REFLECTION))
            });
            if !reflective {
                return None;
            }
            let transform = scene.transforms.get(scene.objects.entity(index as usize))?;
            let normal = (transform.rotation() * Vec3::Y).normalize_or(Vec3::Y);
            let point = transform.position();
            Some((index, normal.extend(-normal.dot(point))))
        })?;

        let mut camera = self.camera;
        camera.reflect(plane);
        let mut visibility = self.culling.cull(scene, &camera.frustum, self.config.layer_mask);
        visibility.visible_objects.retain(|&index| index != reflector);
        visibility.batches = batch_objects(scene, &visibility.visible_objects);
        Some(ReflectionView {
            plane,
            camera,
            visibility,
        })
    }

    fn update_tlas(&mut self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        let instance_count = self.visibility.visible_objects.len() as u32;
        let current = self.tlas.as_ref().map(|tlas| &tlas.desc);
        if matches!(current, Some(RaytracingAsDesc::TopLevel { instance_count: n }) if *n == instance_count) {
            return Ok(());
        }
        match device.create_raytracing_acceleration_structure(&RaytracingAsDesc::TopLevel {
            instance_count,
        }) {
            Ok(tlas) => {
                device.set_name(&tlas, "scene_tlas");
                self.tlas = Some(tlas);
                self.accumulation_frames = 0;
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                tracing::warn!(%err, "acceleration structure creation failed");
                self.tlas = None;
                Ok(())
            }
        }
    }
}

/// One view-projection per atlas tile the light needs, or `None` when the
/// light cannot cast a usable shadow.
fn shadow_matrices(light: &LightComponent, scene: &Scene) -> Option<Vec<Mat4>> {
    match light.light_type {
        LightType::Directional => {
            let bounds = scene.bounds();
            if !bounds.is_valid() || bounds.is_infinite() {
                return None;
            }
            let radius = bounds.radius().max(1.0);
            let forward = (-light.direction).normalize_or(Vec3::NEG_Y);
            let eye = bounds.center() - forward * radius * 2.0;
            let view = Mat4::look_to_rh(eye, forward, stable_up(forward));
            let projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, radius * 4.0);
            Some(vec![projection * view])
        }
        LightType::Spot => {
            let far = light.range_global.max(SHADOW_NEAR * 2.0);
            let forward = (-light.direction).normalize_or(Vec3::NEG_Y);
            let fov = light.fov.clamp(0.01, std::f32::consts::PI - 0.01);
            let view = Mat4::look_to_rh(light.position, forward, stable_up(forward));
            Some(vec![Mat4::perspective_rh(fov, 1.0, SHADOW_NEAR, far) * view])
        }
        LightType::Point => {
            let far = light.range_global.max(SHADOW_NEAR * 2.0);
            let projection = Mat4::perspective_rh(FRAC_PI_2, 1.0, SHADOW_NEAR, far);
            Some(
                CUBE_FACES
                    .iter()
                    .map(|&(forward, up)| projection * Mat4::look_to_rh(light.position, forward, up))
                    .collect(),
            )
        }
    }
}

fn stable_up(forward: Vec3) -> Vec3 {
    if forward.dot(Vec3::Y).abs() > 0.99 { Vec3::Z } else { Vec3::Y }
}

impl std::fmt::Debug for RenderPath3D {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderPath3D")
            .field("technique", &self.technique)
            .field("passes", &self.passes)
            .field("frame", &self.frame)
            .field("has_targets", &self.targets.is_some())
            .finish_non_exhaustive()
    }
}
