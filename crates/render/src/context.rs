use crate::config::RenderPathConfig;
use crate::pipelines::RenderPipelines;
use crate::targets::RenderTargets;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use lumen_cull::{RenderBatch, Visibility};
use lumen_graphics::{
    CommandList, DefaultTextures, GraphicsDevice, RaytracingAccelerationStructure,
};
use lumen_scene::{CameraComponent, LightComponent, LightType, Scene};
use std::time::Duration;

/// Per-frame constants bound at slot 0 of every stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct FrameConstants {
    pub view_projection: [[f32; 4]; 4],
    pub inv_view_projection: [[f32; 4]; 4],
    pub prev_view_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub resolution: [f32; 2],
    pub time: f32,
    pub exposure: f32,
    pub frame_index: u32,
    pub light_count: u32,
    pub accumulation_frames: u32,
    pub padding: u32,
}

/// Per-instance data streamed next to the mesh vertices.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ShaderMeshInstance {
    pub transform: [[f32; 4]; 4],
    pub transform_prev: [[f32; 4]; 4],
    pub color: [f32; 4],
    pub emissive: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ShaderLight {
    pub position_range: [f32; 4],
    pub direction_type: [f32; 4],
    pub color_energy: [f32; 4],
    /// First atlas tile, or -1 without shadows.
    pub shadow_tile: i32,
    pub shadow_tile_count: u32,
    pub cone_cos: f32,
    pub padding: u32,
}

impl ShaderLight {
    pub fn from_component(light: &LightComponent) -> Self {
        let type_id = match light.light_type {
            LightType::Directional => 0.0,
            LightType::Point => 1.0,
            LightType::Spot => 2.0,
        };
        Self {
            position_range: light.position.extend(light.range_global).to_array(),
            direction_type: light.direction.extend(type_id).to_array(),
            color_energy: light.color.extend(light.energy).to_array(),
            shadow_tile: -1,
            shadow_tile_count: 0,
            cone_cos: (light.fov * 0.5).cos(),
            padding: 0,
        }
    }
}

/// Shadow camera for one light, rendered into consecutive atlas tiles.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowView {
    pub light_index: u32,
    /// One matrix per atlas tile (six for point lights).
    pub view_projections: Vec<Mat4>,
    pub first_tile: u32,
    pub batches: Vec<RenderBatch>,
}

/// Mirrored camera and its visibility for planar reflections.
#[derive(Debug, Clone)]
pub struct ReflectionView {
    pub plane: Vec4,
    pub camera: CameraComponent,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderStats {
    pub frame: u64,
    pub draw_calls: usize,
    pub instances: usize,
    pub triangles: usize,
    pub visible_objects: usize,
    pub visible_lights: usize,
    pub shadow_views: usize,
    pub shadow_draw_calls: usize,
    /// Batch instances whose mesh had no GPU buffers.
    pub skipped_objects: usize,
    pub upload_failures: usize,
    pub dispatches: usize,
    /// Pass names in recording order, shadow list first.
    pub passes: Vec<&'static str>,
    pub record_time: Duration,
}

impl RenderStats {
    pub fn merge(&mut self, other: RenderStats) {
        self.draw_calls += other.draw_calls;
        self.instances += other.instances;
        self.triangles += other.triangles;
        self.shadow_draw_calls += other.shadow_draw_calls;
        self.skipped_objects += other.skipped_objects;
        self.upload_failures += other.upload_failures;
        self.dispatches += other.dispatches;
        self.passes.extend(other.passes);
    }
}

/// Everything a pass function reads, plus the list it records into.
pub struct RenderContext<'a> {
    pub device: &'a dyn GraphicsDevice,
    pub cmd: CommandList,
    pub scene: &'a Scene,
    pub config: &'a RenderPathConfig,
    pub targets: &'a RenderTargets,
    pub pipelines: &'a RenderPipelines,
    pub textures: &'a DefaultTextures,
    pub camera: &'a CameraComponent,
    pub visibility: &'a Visibility,
    pub reflection: Option<&'a ReflectionView>,
    pub shadows: &'a [ShadowView],
    pub tlas: Option<&'a RaytracingAccelerationStructure>,
    pub frame: FrameConstants,
    pub stats: RenderStats,
}

impl RenderContext<'_> {
    pub(crate) fn frame_constants_for(&self, view_projection: Mat4) -> FrameConstants {
        FrameConstants {
            view_projection: view_projection.to_cols_array_2d(),
            inv_view_projection: view_projection.inverse().to_cols_array_2d(),
            ..self.frame
        }
    }
}
