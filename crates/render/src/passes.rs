use crate::config::{RenderFeatures, RenderPathConfig, RenderTechnique};
use crate::context::{RenderContext, ShaderLight, ShaderMeshInstance};
use crate::pipelines::RenderPipelines;
use crate::targets::{RenderTargets, SHADOW_ATLAS_TILES_PER_ROW};
use glam::Mat4;
use lumen_common::Entity;
use lumen_cull::RenderBatch;
use lumen_graphics::{
    CommandList, DefaultTexture, GpuAllocation, GpuBarrier, GraphicsDevice, LoadOp, PipelineState,
    Rect, RenderPassDesc, RenderPassImage, ResourceState, ShaderStage, StoreOp, SwapChain,
    Texture, Viewport,
};
use lumen_scene::{MaterialComponent, MeshSubset};

pub const FRAME_SLOT: u32 = 0;
pub const MATERIAL_SLOT: u32 = 1;
pub const POSTPROCESS_SLOT: u32 = 2;
pub const LIGHTS_SLOT: u32 = 10;
pub const SHADOW_ATLAS_SLOT: u32 = 11;
pub const SSAO_SLOT: u32 = 12;
pub const REFLECTION_SLOT: u32 = 13;
pub const DEPTH_SLOT: u32 = 14;
pub const GBUFFER_SLOT: u32 = 20;
pub const TLAS_SLOT: u32 = 30;

const COMPUTE_TILE: u32 = 8;

/// Named stages of a render path, in recording order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    FrameSetup,
    Shadows,
    OpaqueForward,
    GBuffer,
    DeferredLighting,
    PathTrace,
    Transparents,
    Postprocess,
    Compose,
}

impl RenderPass {
    pub fn name(self) -> &'static str {
        match self {
            RenderPass::FrameSetup => "FrameSetup",
            RenderPass::Shadows => "Shadows",
            RenderPass::OpaqueForward => "OpaqueForward",
            RenderPass::GBuffer => "GBuffer",
            RenderPass::DeferredLighting => "DeferredLighting",
            RenderPass::PathTrace => "PathTrace",
            RenderPass::Transparents => "Transparents",
            RenderPass::Postprocess => "Postprocess",
            RenderPass::Compose => "Compose",
        }
    }
}

impl std::fmt::Display for RenderPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Pass pipeline for a technique and feature set.
pub fn build_pass_list(config: &RenderPathConfig, technique: RenderTechnique) -> Vec<RenderPass> {
    let mut passes = Vec::new();
    if technique != RenderTechnique::PathTraced && config.has(RenderFeatures::SHADOWS) {
        passes.push(RenderPass::Shadows);
    }
    passes.push(RenderPass::FrameSetup);
    match technique {
        RenderTechnique::Forward => passes.push(RenderPass::OpaqueForward),
        RenderTechnique::Deferred => {
            passes.push(RenderPass::GBuffer);
            passes.push(RenderPass::DeferredLighting);
        }
        RenderTechnique::PathTraced => passes.push(RenderPass::PathTrace),
    }
    if technique != RenderTechnique::PathTraced && config.has(RenderFeatures::TRANSPARENTS) {
        passes.push(RenderPass::Transparents);
    }
    let post = RenderFeatures::POSTPROCESS
        | RenderFeatures::SSAO
        | RenderFeatures::SSR
        | RenderFeatures::BLOOM
        | RenderFeatures::FXAA
        | RenderFeatures::TEMPORAL_AA;
    if config.features.intersects(post) {
        passes.push(RenderPass::Postprocess);
    }
    passes.push(RenderPass::Compose);
    passes
}

/// Record `pass` into `ctx.cmd`, wrapped in a debug event.
///
/// `Compose` records nothing here; it targets a swap chain, see [`compose`].
pub fn execute(pass: RenderPass, ctx: &mut RenderContext<'_>) {
    let f: fn(&mut RenderContext<'_>) = match pass {
        RenderPass::FrameSetup => frame_setup,
        RenderPass::Shadows => shadows,
        RenderPass::OpaqueForward => opaque_forward,
        RenderPass::GBuffer => gbuffer,
        RenderPass::DeferredLighting => deferred_lighting,
        RenderPass::PathTrace => path_trace,
        RenderPass::Transparents => transparents,
        RenderPass::Postprocess => postprocess,
        RenderPass::Compose => return,
    };
    ctx.device.event_begin(pass.name(), ctx.cmd);
    f(ctx);
    ctx.device.event_end(ctx.cmd);
    ctx.stats.passes.push(pass.name());
}

pub fn frame_setup(ctx: &mut RenderContext<'_>) {
    let (device, cmd) = (ctx.device, ctx.cmd);
    let (w, h) = (ctx.targets.width, ctx.targets.height);
    device.bind_viewports(&[Viewport::new(w as f32, h as f32)], cmd);
    device.bind_scissor_rects(
        &[Rect {
            left: 0,
            top: 0,
            right: w as i32,
            bottom: h as i32,
        }],
        cmd,
    );
    let frame = ctx.frame;
    bind_frame_constants(ctx, &frame);

    let lights: Vec<ShaderLight> = ctx
        .visibility
        .visible_lights
        .iter()
        .filter_map(|&index| {
            let light = ctx.scene.lights.components().get(index as usize)?;
            let mut packed = ShaderLight::from_component(light);
            if let Some(view) = ctx.shadows.iter().find(|v| v.light_index == index) {
                packed.shadow_tile = view.first_tile as i32;
                packed.shadow_tile_count = view.view_projections.len() as u32;
            }
            Some(packed)
        })
        .collect();
    if !lights.is_empty()
        && let Some(alloc) = upload(ctx, bytemuck::cast_slice(&lights))
    {
        for stage in [ShaderStage::Ps, ShaderStage::Cs] {
            device.bind_resource(stage, (&alloc.buffer).into(), LIGHTS_SLOT, cmd);
        }
    }
    if let Some(atlas) = &ctx.targets.shadow_atlas {
        device.bind_resource(ShaderStage::Ps, atlas.into(), SHADOW_ATLAS_SLOT, cmd);
    }
}

pub fn shadows(ctx: &mut RenderContext<'_>) {
    let Some(atlas) = ctx.targets.shadow_atlas.clone() else {
        return;
    };
    if ctx.shadows.is_empty() {
        return;
    }
    let (device, cmd) = (ctx.device, ctx.cmd);
    let tile = ctx.targets.shadow_tile_size();
    device.render_pass_begin(
        &RenderPassDesc {
            images: vec![
                RenderPassImage::depth_stencil(&atlas, LoadOp::Clear, StoreOp::Store).with_layouts(
                    ResourceState::SHADER_RESOURCE,
                    ResourceState::DEPTHSTENCIL,
                    ResourceState::SHADER_RESOURCE,
                ),
            ],
            ..RenderPassDesc::default()
        },
        cmd,
    );
    bind_pipeline(device, ctx.pipelines.shadow.as_ref(), cmd);
    let views = ctx.shadows;
    for view in views {
        for (face, view_projection) in view.view_projections.iter().enumerate() {
            let index = view.first_tile + face as u32;
            let x = (index % SHADOW_ATLAS_TILES_PER_ROW) * tile;
            let y = (index / SHADOW_ATLAS_TILES_PER_ROW) * tile;
            device.bind_viewports(
                &[Viewport {
                    x: x as f32,
                    y: y as f32,
                    ..Viewport::new(tile as f32, tile as f32)
                }],
                cmd,
            );
            let constants = ctx.frame_constants_for(*view_projection);
            bind_frame_constants(ctx, &constants);
            draw_batches(ctx, &view.batches, DrawFilter::ShadowCasters);
        }
    }
    device.render_pass_end(cmd);
}

pub fn opaque_forward(ctx: &mut RenderContext<'_>) {
    render_reflection(ctx);
    let targets = ctx.targets;
    let mut images = Vec::with_capacity(3);
    match &targets.color_msaa {
        Some(msaa) => {
            images.push(RenderPassImage::render_target(msaa, LoadOp::Clear));
            images.push(depth_image(&targets.depth, LoadOp::Clear));
            images.push(RenderPassImage::resolve(&targets.color));
        }
        None => {
            images.push(RenderPassImage::render_target(&targets.color, LoadOp::Clear));
            images.push(depth_image(&targets.depth, LoadOp::Clear));
        }
    }
    ctx.device.render_pass_begin(&RenderPassDesc { images, ..RenderPassDesc::default() }, ctx.cmd);
    bind_pipeline(ctx.device, ctx.pipelines.object_opaque.as_ref(), ctx.cmd);
    if let Some(reflection) = &targets.reflection {
        ctx.device
            .bind_resource(ShaderStage::Ps, reflection.into(), REFLECTION_SLOT, ctx.cmd);
    }
    let visibility = ctx.visibility;
    draw_batches(ctx, &visibility.batches, DrawFilter::Opaque);
    ctx.device.render_pass_end(ctx.cmd);
}

pub fn gbuffer(ctx: &mut RenderContext<'_>) {
    render_reflection(ctx);
    let targets = ctx.targets;
    let mut images: Vec<RenderPassImage> = targets
        .gbuffer
        .iter()
        .map(|t| RenderPassImage::render_target(t, LoadOp::Clear))
        .collect();
    images.push(depth_image(&targets.depth, LoadOp::Clear));
    ctx.device.render_pass_begin(&RenderPassDesc { images, ..RenderPassDesc::default() }, ctx.cmd);
    bind_pipeline(ctx.device, ctx.pipelines.object_gbuffer.as_ref(), ctx.cmd);
    let visibility = ctx.visibility;
    draw_batches(ctx, &visibility.batches, DrawFilter::Opaque);
    ctx.device.render_pass_end(ctx.cmd);
}

pub fn deferred_lighting(ctx: &mut RenderContext<'_>) {
    let targets = ctx.targets;
    let mut inputs: Vec<(&Texture, u32)> = targets
        .gbuffer
        .iter()
        .enumerate()
        .map(|(i, t)| (t, GBUFFER_SLOT + i as u32))
        .collect();
    inputs.push((&targets.depth, DEPTH_SLOT));
    if let Some(reflection) = &targets.reflection {
        inputs.push((reflection, REFLECTION_SLOT));
    }
    compute_into(ctx, &targets.color, &inputs);
}

pub fn path_trace(ctx: &mut RenderContext<'_>) {
    let Some(tlas) = ctx.tlas else {
        tracing::debug!("no acceleration structure, path trace skipped");
        return;
    };
    ctx.device.build_raytracing_acceleration_structure(tlas, ctx.cmd);
    ctx.device.bind_resource(ShaderStage::Cs, tlas.into(), TLAS_SLOT, ctx.cmd);
    let color = &ctx.targets.color;
    compute_into(ctx, color, &[]);
}

pub fn transparents(ctx: &mut RenderContext<'_>) {
    let targets = ctx.targets;
    let depth = RenderPassImage::depth_stencil(&targets.depth, LoadOp::Load, StoreOp::Store).with_layouts(
        ResourceState::SHADER_RESOURCE,
        ResourceState::DEPTHSTENCIL_READONLY,
        ResourceState::SHADER_RESOURCE,
    );
    let images = match &targets.color_msaa {
        Some(msaa) => vec![
            RenderPassImage::render_target(msaa, LoadOp::Load),
            depth,
            RenderPassImage::resolve(&targets.color),
        ],
        None => vec![RenderPassImage::render_target(&targets.color, LoadOp::Load), depth],
    };
    ctx.device.render_pass_begin(&RenderPassDesc { images, ..RenderPassDesc::default() }, ctx.cmd);
    bind_pipeline(ctx.device, ctx.pipelines.object_transparent.as_ref(), ctx.cmd);
    let visibility = ctx.visibility;
    draw_batches(ctx, &visibility.batches, DrawFilter::Transparent);
    ctx.device.render_pass_end(ctx.cmd);
}

/// Screen-space effects in a fixed order, then tonemapping into the
/// post target.
pub fn postprocess(ctx: &mut RenderContext<'_>) {
    let targets = ctx.targets;
    let config = ctx.config;
    let depth = (&targets.depth, DEPTH_SLOT);

    if config.has(RenderFeatures::SSAO)
        && let Some(ssao) = &targets.ssao
    {
        effect(ctx, "SSAO", ssao, &[depth]);
    }
    if config.has(RenderFeatures::SSR) {
        effect(ctx, "SSR", &targets.color, &[depth]);
    }
    if config.has(RenderFeatures::TEMPORAL_AA) {
        effect(ctx, "TemporalAA", &targets.color, &[depth]);
    }
    if config.has(RenderFeatures::BLOOM) {
        effect(ctx, "Bloom", &targets.color, &[]);
    }
    let Some(post) = &targets.post else {
        return;
    };
    let mut inputs = vec![(&targets.color, 0)];
    if let Some(ssao) = &targets.ssao {
        inputs.push((ssao, SSAO_SLOT));
    }
    effect(ctx, "Tonemap", post, &inputs);
    if config.has(RenderFeatures::FXAA) {
        effect(ctx, "FXAA", post, &[]);
    }
}

/// Draw the final image onto a swap chain's back buffer.
pub fn compose(
    device: &dyn GraphicsDevice,
    targets: &RenderTargets,
    pipelines: &RenderPipelines,
    swap_chain: &SwapChain,
    cmd: CommandList,
) {
    device.event_begin(RenderPass::Compose.name(), cmd);
    device.render_pass_begin_swap_chain(swap_chain, cmd);
    bind_pipeline(device, pipelines.compose.as_ref(), cmd);
    device.bind_viewports(
        &[Viewport::new(swap_chain.desc.width as f32, swap_chain.desc.height as f32)],
        cmd,
    );
    device.bind_resource(ShaderStage::Ps, targets.final_output().into(), 0, cmd);
    // Fullscreen triangle.
    device.draw(3, 0, cmd);
    device.render_pass_end(cmd);
    device.event_end(cmd);
}

fn render_reflection(ctx: &mut RenderContext<'_>) {
    let Some(reflection) = ctx.reflection else {
        return;
    };
    let (Some(color), Some(depth)) = (&ctx.targets.reflection, &ctx.targets.reflection_depth) else {
        return;
    };
    let (device, cmd) = (ctx.device, ctx.cmd);
    device.event_begin("PlanarReflection", cmd);
    device.render_pass_begin(
        &RenderPassDesc {
            images: vec![
                RenderPassImage::render_target(color, LoadOp::Clear),
                depth_image(depth, LoadOp::Clear),
            ],
            ..RenderPassDesc::default()
        },
        cmd,
    );
    device.bind_viewports(
        &[Viewport::new(color.desc.width as f32, color.desc.height as f32)],
        cmd,
    );
    bind_pipeline(device, ctx.pipelines.object_opaque.as_ref(), cmd);
    let constants = ctx.frame_constants_for(reflection.camera.view_projection);
    bind_frame_constants(ctx, &constants);
    draw_batches(ctx, &reflection.visibility.batches, DrawFilter::Opaque);
    device.render_pass_end(cmd);
    device.event_end(cmd);

    // Restore the main view.
    device.bind_viewports(
        &[Viewport::new(ctx.targets.width as f32, ctx.targets.height as f32)],
        cmd,
    );
    let frame = ctx.frame;
    bind_frame_constants(ctx, &frame);
}

fn depth_image(texture: &Texture, load_op: LoadOp) -> RenderPassImage {
    RenderPassImage::depth_stencil(texture, load_op, StoreOp::Store).with_layouts(
        ResourceState::SHADER_RESOURCE,
        ResourceState::DEPTHSTENCIL,
        ResourceState::SHADER_RESOURCE,
    )
}

fn bind_pipeline(device: &dyn GraphicsDevice, pso: Option<&PipelineState>, cmd: CommandList) {
    if let Some(pso) = pso {
        device.bind_pipeline_state(pso, cmd);
    }
}

fn upload(ctx: &mut RenderContext<'_>, data: &[u8]) -> Option<GpuAllocation> {
    match ctx.device.allocate_gpu(data, ctx.cmd) {
        Ok(alloc) => Some(alloc),
        Err(err) => {
            ctx.stats.upload_failures += 1;
            tracing::warn!(%err, bytes = data.len(), "upload allocation failed");
            None
        }
    }
}

fn bind_frame_constants(ctx: &mut RenderContext<'_>, constants: &crate::context::FrameConstants) {
    let Some(alloc) = upload(ctx, bytemuck::bytes_of(constants)) else {
        return;
    };
    for stage in [ShaderStage::Vs, ShaderStage::Ps, ShaderStage::Cs] {
        ctx.device
            .bind_constant_buffer(stage, &alloc.buffer, FRAME_SLOT, alloc.offset, ctx.cmd);
    }
}

/// Full-screen compute work writing `output` through a UAV.
fn compute_into(ctx: &mut RenderContext<'_>, output: &Texture, inputs: &[(&Texture, u32)]) {
    let (device, cmd) = (ctx.device, ctx.cmd);
    for (texture, slot) in inputs {
        device.bind_resource(ShaderStage::Cs, (*texture).into(), *slot, cmd);
    }
    let to_uav = GpuBarrier::image(output, ResourceState::SHADER_RESOURCE, ResourceState::UNORDERED_ACCESS);
    let to_srv = GpuBarrier::image(output, ResourceState::UNORDERED_ACCESS, ResourceState::SHADER_RESOURCE);
    let (Some(to_uav), Some(to_srv)) = (to_uav, to_srv) else {
        tracing::debug!("compute target has no handle, dispatch skipped");
        return;
    };
    device.barrier(&[to_uav], cmd);
    device.bind_uav(ShaderStage::Cs, output.into(), 0, cmd);
    device.dispatch(
        output.desc.width.div_ceil(COMPUTE_TILE),
        output.desc.height.div_ceil(COMPUTE_TILE),
        1,
        cmd,
    );
    device.barrier(&[to_srv], cmd);
    ctx.stats.dispatches += 1;
}

fn effect(ctx: &mut RenderContext<'_>, name: &str, output: &Texture, inputs: &[(&Texture, u32)]) {
    ctx.device.event_begin(name, ctx.cmd);
    let exposure = ctx.config.exposure;
    if let Some(alloc) = upload(ctx, bytemuck::bytes_of(&exposure)) {
        ctx.device.bind_constant_buffer(
            ShaderStage::Cs,
            &alloc.buffer,
            POSTPROCESS_SLOT,
            alloc.offset,
            ctx.cmd,
        );
    }
    compute_into(ctx, output, inputs);
    ctx.device.event_end(ctx.cmd);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawFilter {
    Opaque,
    Transparent,
    ShadowCasters,
}

impl DrawFilter {
    fn accepts(self, material: Option<&MaterialComponent>) -> bool {
        let transparent = material.is_some_and(MaterialComponent::is_transparent);
        match self {
            DrawFilter::Opaque => !transparent,
            DrawFilter::Transparent => transparent,
            DrawFilter::ShadowCasters => {
                !transparent && material.is_none_or(MaterialComponent::is_cast_shadow)
            }
        }
    }
}

/// One `draw_indexed_instanced` per accepted subset per batch. Instances
/// are streamed through the upload ring next to the mesh vertices.
fn draw_batches(ctx: &mut RenderContext<'_>, batches: &[RenderBatch], filter: DrawFilter) {
    let (device, cmd, scene) = (ctx.device, ctx.cmd, ctx.scene);
    let mut fallback_material = MaterialComponent::default();
    fallback_material.update_shader_data();

    for batch in batches {
        let instance_count = batch.instance_count();
        let Some(mesh) = scene.meshes.get(batch.mesh) else {
            ctx.stats.skipped_objects += instance_count;
            continue;
        };
        let Some(buffers) = mesh.buffers.get() else {
            tracing::debug!(mesh = %batch.mesh, instance_count, "mesh has no GPU buffers, skipped");
            ctx.stats.skipped_objects += instance_count;
            continue;
        };
        let whole = [MeshSubset {
            material_id: Entity::INVALID,
            index_offset: 0,
            index_count: mesh.indices.len() as u32,
        }];
        let subsets: &[MeshSubset] = if mesh.subsets.is_empty() { &whole } else { &mesh.subsets };
        if !subsets
            .iter()
            .any(|s| s.index_count > 0 && filter.accepts(scene.materials.get(s.material_id)))
        {
            continue;
        }

        let instances: Vec<ShaderMeshInstance> = batch
            .objects
            .iter()
            .filter_map(|&index| {
                let object = scene.objects.components().get(index as usize)?;
                let entity = scene.objects.entity(index as usize);
                let world = scene.transforms.get(entity).map_or(Mat4::IDENTITY, |t| t.world);
                let prev = scene.prev_transforms.get(entity).map_or(world, |p| p.world_prev);
                Some(ShaderMeshInstance {
                    transform: world.to_cols_array_2d(),
                    transform_prev: prev.to_cols_array_2d(),
                    color: object.color.to_array(),
                    emissive: object.emissive_color.to_array(),
                })
            })
            .collect();
        let Some(instance_alloc) = upload(ctx, bytemuck::cast_slice(&instances)) else {
            continue;
        };
        device.bind_vertex_buffers(
            &[&buffers.position_normal, &instance_alloc.buffer],
            0,
            &[0, instance_alloc.offset],
            cmd,
        );
        device.bind_index_buffer(&buffers.index_buffer, buffers.index_format, 0, cmd);

        for subset in subsets {
            let material = scene.materials.get(subset.material_id);
            if subset.index_count == 0 || !filter.accepts(material) {
                continue;
            }
            if filter != DrawFilter::ShadowCasters {
                let material = material.unwrap_or(&fallback_material);
                if let Some(alloc) = upload(ctx, bytemuck::bytes_of(&material.shader_data)) {
                    device.bind_constant_buffer(
                        ShaderStage::Ps,
                        &alloc.buffer,
                        MATERIAL_SLOT,
                        alloc.offset,
                        cmd,
                    );
                }
                let maps = &material.textures;
                let bindings = [
                    (&maps.base_color, DefaultTexture::White),
                    (&maps.normal, DefaultTexture::Normal),
                    (&maps.surface, DefaultTexture::White),
                    (&maps.emissive, DefaultTexture::Black),
                    (&maps.occlusion, DefaultTexture::White),
                ];
                for (slot, (texture, fallback)) in bindings.into_iter().enumerate() {
                    let texture = ctx.textures.resolve(texture.as_ref(), fallback);
                    device.bind_resource(ShaderStage::Ps, texture.into(), slot as u32, cmd);
                }
            }
            device.draw_indexed_instanced(
                subset.index_count,
                instances.len() as u32,
                subset.index_offset,
                0,
                0,
                cmd,
            );
            if filter == DrawFilter::ShadowCasters {
                ctx.stats.shadow_draw_calls += 1;
            } else {
                ctx.stats.draw_calls += 1;
                ctx.stats.instances += instances.len();
                ctx.stats.triangles += (subset.index_count / 3) as usize * instances.len();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_pipeline_order() {
        let passes = build_pass_list(&RenderPathConfig::default(), RenderTechnique::Forward);
        assert_eq!(
            passes,
            vec![
                RenderPass::Shadows,
                RenderPass::FrameSetup,
                RenderPass::OpaqueForward,
                RenderPass::Transparents,
                RenderPass::Postprocess,
                RenderPass::Compose,
            ]
        );
    }

    #[test]
    fn deferred_replaces_forward_opaque() {
        let passes = build_pass_list(&RenderPathConfig::default(), RenderTechnique::Deferred);
        assert!(passes.contains(&RenderPass::GBuffer));
        assert!(passes.contains(&RenderPass::DeferredLighting));
        assert!(!passes.contains(&RenderPass::OpaqueForward));
    }

    #[test]
    fn path_traced_skips_raster_only_passes() {
        let passes = build_pass_list(&RenderPathConfig::default(), RenderTechnique::PathTraced);
        assert_eq!(
            passes,
            vec![
                RenderPass::FrameSetup,
                RenderPass::PathTrace,
                RenderPass::Postprocess,
                RenderPass::Compose,
            ]
        );
    }

    #[test]
    fn bare_features_leave_the_minimum() {
        let config = RenderPathConfig {
            features: RenderFeatures::empty(),
            ..RenderPathConfig::default()
        };
        let passes = build_pass_list(&config, RenderTechnique::Forward);
        assert_eq!(
            passes,
            vec![RenderPass::FrameSetup, RenderPass::OpaqueForward, RenderPass::Compose]
        );
    }

    #[test]
    fn shadow_filter_respects_materials() {
        let mut transparent = MaterialComponent::default();
        transparent.set_base_color(glam::Vec4::new(1.0, 1.0, 1.0, 0.5));
        let mut no_shadow = MaterialComponent::default();
        no_shadow.flags.remove(lumen_scene::MaterialFlags::CAST_SHADOW);
        assert!(DrawFilter::ShadowCasters.accepts(None));
        assert!(!DrawFilter::ShadowCasters.accepts(Some(&no_shadow)));
        assert!(!DrawFilter::ShadowCasters.accepts(Some(&transparent)));
        assert!(DrawFilter::Transparent.accepts(Some(&transparent)));
        assert!(!DrawFilter::Opaque.accepts(Some(&transparent)));
    }
}
