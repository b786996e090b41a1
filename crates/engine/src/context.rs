use crate::EngineError;
use crate::config::EngineConfig;
use crate::timer::FrameTimer;
use lumen_graphics::{
    DefaultTextures, EmbeddedShaders, GraphicsDevice, HeadlessDevice, ShaderLibrary,
    ShaderSource, SwapChain, SwapChainDesc,
};
use lumen_jobs::JobSystem;
use lumen_render::{RenderPath3D, RenderStats};
use lumen_scene::{Scene, UpdateStats};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What one [`EngineContext::run_frame`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    /// Clamped delta the frame simulated.
    pub dt: f32,
    pub update: UpdateStats,
    pub render: RenderStats,
    /// Validation messages the device produced during this frame.
    pub diagnostics: Vec<String>,
    pub frame_time: Duration,
}

/// Owner of every engine-wide service: configuration, timer, job system,
/// graphics device and default textures.
///
/// Created explicitly with [`initialize`](Self::initialize); dropping it
/// drains the job system and releases the device.
pub struct EngineContext {
    config: EngineConfig,
    timer: FrameTimer,
    jobs: JobSystem,
    device: Arc<dyn GraphicsDevice>,
    textures: DefaultTextures,
    shaders: Box<dyn ShaderSource>,
    diagnostics_seen: usize,
}

impl EngineContext {
    /// Start the engine. Shaders come from `graphics.shader_dir` when it is
    /// set; otherwise pipelines stay unavailable and passes record without
    /// them.
    pub fn initialize(config: EngineConfig) -> Result<Self, EngineError> {
        let shaders: Box<dyn ShaderSource> = match &config.graphics.shader_dir {
            Some(dir) => Box::new(ShaderLibrary::new(dir.clone())),
            None => Box::new(EmbeddedShaders::new()),
        };
        Self::initialize_with_shaders(config, shaders)
    }

    pub fn initialize_with_shaders(
        config: EngineConfig,
        shaders: Box<dyn ShaderSource>,
    ) -> Result<Self, EngineError> {
        let _span = tracing::info_span!("engine_initialize").entered();
        config.validate()?;
        let jobs = JobSystem::new(config.jobs_config())?;
        let device: Arc<dyn GraphicsDevice> =
            Arc::new(HeadlessDevice::new(config.graphics.headless())?);
        let textures = DefaultTextures::create(device.as_ref())?;
        tracing::info!(
            threads = jobs.thread_count(),
            technique = ?config.render.technique,
            width = config.render.width,
            height = config.render.height,
            "engine initialized"
        );
        Ok(Self {
            timer: FrameTimer::new(config.timer.max_delta_seconds),
            config,
            jobs,
            device,
            textures,
            shaders,
            diagnostics_seen: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut FrameTimer {
        &mut self.timer
    }

    pub fn jobs(&self) -> &JobSystem {
        &self.jobs
    }

    pub fn device(&self) -> &dyn GraphicsDevice {
        self.device.as_ref()
    }

    pub fn device_arc(&self) -> Arc<dyn GraphicsDevice> {
        Arc::clone(&self.device)
    }

    pub fn textures(&self) -> &DefaultTextures {
        &self.textures
    }

    /// Render path for the configured technique, with pipelines loaded and
    /// targets sized to the configured resolution.
    pub fn create_render_path(&self) -> Result<RenderPath3D, EngineError> {
        let render = self.config.render;
        let mut path = RenderPath3D::new(render, self.config.culling, self.textures.clone())?;
        path.load_pipelines(self.device(), self.shaders.as_ref());
        path.resize_buffers(self.device(), render.width, render.height)?;
        Ok(path)
    }

    pub fn create_swap_chain(&self) -> Result<SwapChain, EngineError> {
        let desc = SwapChainDesc {
            width: self.config.render.width,
            height: self.config.render.height,
            ..SwapChainDesc::default()
        };
        Ok(self.device.create_swap_chain(&desc)?)
    }

    /// Run one frame: tick the timer, update the scene, upload new meshes,
    /// cull and record, compose onto `swap_chain` and submit.
    pub fn run_frame(
        &mut self,
        scene: &mut Scene,
        path: &mut RenderPath3D,
        swap_chain: &SwapChain,
    ) -> Result<FrameReport, EngineError> {
        let started = Instant::now();
        let dt = self.timer.tick();
        let frame = self.timer.frame_count();
        let _span = tracing::info_span!("frame", frame).entered();

        let result = self.record_and_submit(scene, path, swap_chain, dt);
        if let Err(err) = &result {
            if err.is_fatal() {
                tracing::error!(%err, frame, "fatal engine error");
            } else {
                tracing::warn!(%err, frame, "frame failed");
            }
        }
        let render = result?;

        let all = self.device.diagnostics();
        let diagnostics = all.get(self.diagnostics_seen..).unwrap_or_default().to_vec();
        self.diagnostics_seen = all.len();
        if !diagnostics.is_empty() {
            tracing::warn!(count = diagnostics.len(), frame, "graphics validation messages");
        }
        Ok(FrameReport {
            frame,
            dt,
            update: scene.stats().clone(),
            render,
            diagnostics,
            frame_time: started.elapsed(),
        })
    }

    fn record_and_submit(
        &self,
        scene: &mut Scene,
        path: &mut RenderPath3D,
        swap_chain: &SwapChain,
        dt: f32,
    ) -> Result<RenderStats, EngineError> {
        let device = self.device();
        scene.update(dt, &self.jobs)?;
        let uploaded = path.prepare_meshes(device, scene);
        if uploaded > 0 {
            tracing::debug!(uploaded, "mesh buffers created");
        }
        path.update(scene, dt)?;
        let recorded = path.render(device, scene, &self.jobs).and_then(|stats| {
            let cmd = device.begin_command_list();
            path.compose(device, swap_chain, cmd).map(|()| stats)
        });
        match recorded {
            Ok(stats) => {
                device.submit_command_lists()?;
                Ok(stats)
            }
            Err(err) => {
                // Lists begun by a failed frame must not carry into the next one.
                if let Err(flush) = device.submit_command_lists() {
                    tracing::warn!(%flush, "flushing a failed frame");
                }
                Err(err.into())
            }
        }
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.device.wait_for_gpu();
        tracing::info!(frames = self.timer.frame_count(), "engine shut down");
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .field("timer", &self.timer)
            .field("threads", &self.jobs.thread_count())
            .field("frame_count", &self.device.frame_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use lumen_graphics::ShaderFormat;
    use lumen_render::{RenderTechnique, SHADER_NAMES};
    use lumen_scene::{LightFlags, primitives};
    use std::f32::consts::FRAC_PI_3;

    fn shaders() -> Box<dyn ShaderSource> {
        let mut shaders = EmbeddedShaders::new();
        for (name, _) in SHADER_NAMES {
            shaders.insert(name, ShaderFormat::Hlsl6, vec![0x5A; 32]);
        }
        Box::new(shaders)
    }

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.jobs.thread_count = Some(2);
        config.render.width = 320;
        config.render.height = 180;
        config
    }

    /// E1 at (0,2,0) with a cube, its child E2 at local (0,0,3), a far
    /// object at (100,100,100) and a camera at (0,2,12) looking down -Z.
    fn demo_scene() -> Scene {
        let mut scene = Scene::new();
        let mesh = scene.entity_create_mesh("cube");
        *scene.meshes.get_mut(mesh).unwrap() = primitives::cube(0.5);

        let e1 = scene.entity_create_object("e1");
        scene.objects.get_mut(e1).unwrap().mesh_id = mesh;
        scene.transforms.get_mut(e1).unwrap().translate(Vec3::new(0.0, 2.0, 0.0));
        let e2 = scene.entity_create_object("e2");
        scene.objects.get_mut(e2).unwrap().mesh_id = mesh;
        scene.transforms.get_mut(e2).unwrap().translate(Vec3::new(0.0, 0.0, 3.0));
        scene.component_attach(e2, e1, true).unwrap();
        let far = scene.entity_create_object("far");
        scene.objects.get_mut(far).unwrap().mesh_id = mesh;
        scene
            .transforms
            .get_mut(far)
            .unwrap()
            .translate(Vec3::new(100.0, 100.0, 100.0));

        let light = scene.entity_create_light("lamp", Vec3::new(0.0, 6.0, 0.0), Vec3::ONE, 2.0, 30.0);
        scene.lights.get_mut(light).unwrap().flags.insert(LightFlags::CAST_SHADOW);
        let camera = scene
            .entity_create_camera("camera", 320.0, 180.0, 0.1, 100.0, FRAC_PI_3)
            .unwrap();
        scene
            .transforms
            .get_mut(camera)
            .unwrap()
            .translate(Vec3::new(0.0, 2.0, 12.0));
        scene
    }

    #[test]
    fn end_to_end_frame() {
        let mut engine = EngineContext::initialize_with_shaders(config(), shaders()).unwrap();
        let mut path = engine.create_render_path().unwrap();
        let swap_chain = engine.create_swap_chain().unwrap();
        let mut scene = demo_scene();

        let report = engine.run_frame(&mut scene, &mut path, &swap_chain).unwrap();
        assert_eq!(report.frame, 1);
        assert_eq!(report.dt, 0.0);

        let e2 = scene.find_by_name("e2").unwrap();
        let world = scene.transforms.get(e2).unwrap().position();
        assert!(world.abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-5), "{world}");

        let visible: Vec<_> = path
            .visibility()
            .visible_objects
            .iter()
            .map(|&i| scene.objects.entity(i as usize))
            .collect();
        let e1 = scene.find_by_name("e1").unwrap();
        let far = scene.find_by_name("far").unwrap();
        assert!(visible.contains(&e1));
        assert!(visible.contains(&e2));
        assert!(!visible.contains(&far));

        assert_eq!(report.render.visible_objects, 2);
        assert!(report.render.draw_calls >= 1);
        assert_eq!(report.render.skipped_objects, 0);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
        assert_eq!(engine.device().frame_count(), 1);
    }

    #[test]
    fn frames_advance_the_timer_and_device() {
        let mut engine = EngineContext::initialize_with_shaders(config(), shaders()).unwrap();
        let mut path = engine.create_render_path().unwrap();
        let swap_chain = engine.create_swap_chain().unwrap();
        let mut scene = demo_scene();
        for expected in 1..=3 {
            let report = engine.run_frame(&mut scene, &mut path, &swap_chain).unwrap();
            assert_eq!(report.frame, expected);
            assert!(report.dt <= engine.config().timer.max_delta_seconds);
        }
        assert_eq!(engine.timer().frame_count(), 3);
        assert_eq!(engine.device().frame_count(), 3);
    }

    #[test]
    fn failed_frame_flushes_open_command_lists() {
        let mut engine = EngineContext::initialize_with_shaders(config(), shaders()).unwrap();
        let swap_chain = engine.create_swap_chain().unwrap();
        let mut scene = demo_scene();
        // No resize_buffers: recording fails for lack of targets.
        let mut r#unsized = RenderPath3D::new(
            engine.config().render,
            engine.config().culling,
            engine.textures().clone(),
        )
        .unwrap();
        let stray = engine.device().begin_command_list();
        engine.device().set_marker("partial", stray);
        assert!(matches!(
            engine.run_frame(&mut scene, &mut r#unsized, &swap_chain),
            Err(EngineError::Render(lumen_render::RenderError::MissingTargets))
        ));
        assert_eq!(engine.device().frame_count(), 1);

        let mut path = engine.create_render_path().unwrap();
        let report = engine.run_frame(&mut scene, &mut path, &swap_chain).unwrap();
        assert_eq!(engine.device().frame_count(), 2);
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    }

    #[test]
    fn path_tracing_without_raytracing_falls_back() {
        let mut config = config();
        config.render.technique = RenderTechnique::PathTraced;
        config.graphics.capabilities = lumen_graphics::GraphicsCapabilities::empty();
        let engine = EngineContext::initialize_with_shaders(config, shaders()).unwrap();
        let path = engine.create_render_path().unwrap();
        assert_eq!(path.technique(), RenderTechnique::Forward);
    }

    #[test]
    fn missing_shaders_still_render() {
        let mut engine = EngineContext::initialize(config()).unwrap();
        let mut path = engine.create_render_path().unwrap();
        let swap_chain = engine.create_swap_chain().unwrap();
        let mut scene = demo_scene();
        let report = engine.run_frame(&mut scene, &mut path, &swap_chain).unwrap();
        assert_eq!(report.render.visible_objects, 2);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = config();
        config.graphics.frames_in_flight = 0;
        assert!(matches!(
            EngineContext::initialize(config),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn swap_chain_failure_is_reported() {
        let mut config = config();
        config.graphics.memory_budget_mb = 1;
        config.graphics.upload_buffer_kb = 64;
        config.render.width = 4096;
        config.render.height = 4096;
        let engine = EngineContext::initialize_with_shaders(config, shaders()).unwrap();
        assert!(matches!(
            engine.create_swap_chain(),
            Err(EngineError::Graphics(lumen_graphics::GraphicsError::OutOfMemory { .. }))
        ));
    }
}
