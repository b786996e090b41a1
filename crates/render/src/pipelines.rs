use lumen_graphics::{
    BlendMode, BlendState, CullMode, DepthStencilState, GraphicsDevice, PipelineState,
    PipelineStateDesc, RasterizerState, ShaderSource, ShaderStage, load_shader,
};

/// Graphics pipelines used by the render passes.
///
/// A pipeline whose shaders cannot be loaded stays `None`; passes still
/// record their draws without binding it.
#[derive(Debug, Clone, Default)]
pub struct RenderPipelines {
    pub object_opaque: Option<PipelineState>,
    pub object_transparent: Option<PipelineState>,
    pub object_gbuffer: Option<PipelineState>,
    pub shadow: Option<PipelineState>,
    pub compose: Option<PipelineState>,
    pub missing: Vec<String>,
}

impl RenderPipelines {
    pub fn load(device: &dyn GraphicsDevice, source: &dyn ShaderSource) -> Self {
        let _span = tracing::info_span!("load_pipelines").entered();
        let mut pipelines = RenderPipelines::default();
        let mut missing = Vec::new();
        let mut build = |name: &str,
                         vs: &str,
                         ps: Option<&str>,
                         blend: BlendMode,
                         depth_write: bool,
                         rasterizer: RasterizerState| {
            let shader = |shader_name: &str, stage: ShaderStage| match load_shader(device, source, shader_name, stage) {
                Ok(shader) => Some(shader),
                Err(err) => {
                    tracing::warn!(shader = shader_name, %err, "shader unavailable");
                    None
                }
            };
            let vs = shader(vs, ShaderStage::Vs);
            let ps = ps.map(|ps| shader(ps, ShaderStage::Ps));
            let ps_missing = matches!(ps, Some(None));
            let (Some(vs), false) = (vs, ps_missing) else {
                missing.push(name.to_string());
                return None;
            };
            let desc = PipelineStateDesc {
                vs: Some(vs),
                ps: ps.flatten(),
                rasterizer,
                depth_stencil: DepthStencilState {
                    depth_write,
                    ..DepthStencilState::default()
                },
                blend: BlendState {
                    mode: blend,
                    ..BlendState::default()
                },
                ..PipelineStateDesc::default()
            };
            match device.create_pipeline_state(&desc) {
                Ok(pso) => {
                    device.set_name(&pso, name);
                    Some(pso)
                }
                Err(err) => {
                    tracing::warn!(pipeline = name, %err, "pipeline creation failed");
                    missing.push(name.to_string());
                    None
                }
            }
        };
        let solid = RasterizerState::default();
        let shadow_bias = RasterizerState {
            depth_bias: 1,
            slope_scaled_depth_bias: 2.0,
            ..RasterizerState::default()
        };
        let fullscreen = RasterizerState {
            cull_mode: CullMode::None,
            ..RasterizerState::default()
        };
        pipelines.object_opaque =
            build("object_opaque", "objectVS", Some("objectPS"), BlendMode::Opaque, true, solid);
        pipelines.object_transparent = build(
            "object_transparent",
            "objectVS",
            Some("objectPS_transparent"),
            BlendMode::Alpha,
            false,
            solid,
        );
        pipelines.object_gbuffer = build(
            "object_gbuffer",
            "objectVS",
            Some("objectPS_gbuffer"),
            BlendMode::Opaque,
            true,
            solid,
        );
        pipelines.shadow = build("shadow", "shadowVS", None, BlendMode::Opaque, true, shadow_bias);
        pipelines.compose = build(
            "compose",
            "fullscreenVS",
            Some("composePS"),
            BlendMode::Opaque,
            false,
            fullscreen,
        );
        pipelines.missing = missing;
        if !pipelines.missing.is_empty() {
            tracing::warn!(missing = ?pipelines.missing, "render pipelines incomplete");
        }
        pipelines
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Shader names the pipelines load, in the device's shader format.
pub const SHADER_NAMES: [(&str, ShaderStage); 7] = [
    ("objectVS", ShaderStage::Vs),
    ("objectPS", ShaderStage::Ps),
    ("objectPS_transparent", ShaderStage::Ps),
    ("objectPS_gbuffer", ShaderStage::Ps),
    ("shadowVS", ShaderStage::Vs),
    ("fullscreenVS", ShaderStage::Vs),
    ("composePS", ShaderStage::Ps),
];
