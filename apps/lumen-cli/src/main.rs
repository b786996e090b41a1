mod demo;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use glam::Quat;
use lumen_engine::{EngineConfig, EngineContext};
use lumen_graphics::{EmbeddedShaders, ShaderSource};
use lumen_jobs::JobSystem;
use lumen_persist::SceneStore;
use lumen_render::{RenderTechnique, SHADER_NAMES};
use lumen_tools::SceneInspector;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lumen", about = "Headless lumen engine tools")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Technique {
    Forward,
    Deferred,
    PathTraced,
}

impl From<Technique> for RenderTechnique {
    fn from(value: Technique) -> Self {
        match value {
            Technique::Forward => RenderTechnique::Forward,
            Technique::Deferred => RenderTechnique::Deferred,
            Technique::PathTraced => RenderTechnique::PathTraced,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Run the frame loop over the demo scene on the headless device
    Demo {
        /// Engine config (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of frames to run
        #[arg(short, long, default_value = "10")]
        frames: u64,
        /// Cubes per side of the demo grid
        #[arg(short, long, default_value = "8")]
        grid: u32,
        /// Override the configured render technique
        #[arg(short, long, value_enum)]
        technique: Option<Technique>,
    },
    /// Write the demo scene to a scene file
    Save {
        output: PathBuf,
        #[arg(short, long, default_value = "8")]
        grid: u32,
    },
    /// Print a summary of a scene file
    Inspect {
        path: PathBuf,
        /// Show the entity with this name
        #[arg(short, long)]
        entity: Option<String>,
        /// Print the transform hierarchy
        #[arg(short, long)]
        tree: bool,
    },
    /// Commit a scene file as the next revision of a store
    Commit { scene: PathBuf, store: PathBuf },
    /// Check a store's hash chain and every revision
    Verify { store: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            println!("lumen v{}", env!("CARGO_PKG_VERSION"));
            println!("ecs: {}", lumen_ecs::crate_info());
            println!("jobs: {}", lumen_jobs::crate_info());
            println!("graphics: {}", lumen_graphics::crate_info());
            println!("scene: {}", lumen_scene::crate_info());
            println!("cull: {}", lumen_cull::crate_info());
            println!("render: {}", lumen_render::crate_info());
            println!("persist: {}", lumen_persist::crate_info());
            println!("engine: {}", lumen_engine::crate_info());
            println!("tools: {}", lumen_tools::crate_info());
        }
        Commands::Demo {
            config,
            frames,
            grid,
            technique,
        } => run_demo(config.as_deref(), frames, grid, technique)?,
        Commands::Save { output, grid } => {
            let scene = demo::build_scene(grid, 1280, 720)?;
            lumen_persist::save_scene(&scene, &output)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("{}", SceneInspector::summary(&scene));
            println!("Saved to {}", output.display());
        }
        Commands::Inspect { path, entity, tree } => {
            let mut scene = lumen_persist::load_scene(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            // World matrices are derived state; compute them once.
            scene.update(0.0, &JobSystem::inline())?;
            println!("{}", SceneInspector::summary(&scene));
            if let Some(name) = entity {
                let found = scene
                    .find_by_name(&name)
                    .and_then(|e| SceneInspector::inspect_entity(&scene, e));
                match found {
                    Some(info) => println!("{info}"),
                    None => anyhow::bail!("no entity named {name:?}"),
                }
            }
            if tree {
                print!("{}", SceneInspector::hierarchy_tree(&scene));
            }
        }
        Commands::Commit { scene, store } => {
            let loaded = lumen_persist::load_scene(&scene)
                .with_context(|| format!("reading {}", scene.display()))?;
            let mut store = SceneStore::open(&store)?;
            let revision = store.commit(&loaded)?;
            println!("Committed revision {revision} to {}", store.root().display());
        }
        Commands::Verify { store } => {
            let store = SceneStore::open(&store)?;
            store.verify_integrity()?;
            println!(
                "Store {}: {} revision(s), integrity OK",
                store.root().display(),
                store.meta().revision_count
            );
            if store.meta().revision_count > 0 {
                let (scene, report) = store.load_latest()?;
                println!("{}", SceneInspector::summary(&scene));
                if !report.skipped_sections.is_empty() {
                    println!("Skipped sections: {}", report.skipped_sections.join(", "));
                }
            }
        }
    }

    Ok(())
}

fn run_demo(
    config_path: Option<&Path>,
    frames: u64,
    grid: u32,
    technique: Option<Technique>,
) -> anyhow::Result<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(technique) = technique {
        config.render.technique = technique.into();
    }
    let mut engine = match config.graphics.shader_dir {
        Some(_) => EngineContext::initialize(config)?,
        None => {
            let shaders = placeholder_shaders(&config);
            EngineContext::initialize_with_shaders(config, shaders)?
        }
    };
    let mut path = engine.create_render_path()?;
    let swap_chain = engine.create_swap_chain()?;
    let render = engine.config().render;
    let mut scene = demo::build_scene(grid, render.width, render.height)?;
    let spinner = scene.find_by_name(demo::SPINNER);

    println!(
        "Demo: {frames} frame(s), {} objects, technique {:?}",
        scene.objects.len(),
        path.technique()
    );
    for _ in 0..frames {
        if let Some(t) = spinner.and_then(|e| scene.transforms.get_mut(e)) {
            t.rotate(Quat::from_rotation_y(0.05));
        }
        let report = engine.run_frame(&mut scene, &mut path, &swap_chain)?;
        println!(
            "frame {:>4}: dt={:.4}s visible={} lights={} draws={} shadow_draws={} dispatches={} diagnostics={} time={:.2}ms",
            report.frame,
            report.dt,
            report.render.visible_objects,
            report.render.visible_lights,
            report.render.draw_calls,
            report.render.shadow_draw_calls,
            report.render.dispatches,
            report.diagnostics.len(),
            report.frame_time.as_secs_f64() * 1000.0,
        );
    }
    println!(
        "Average frame delta: {:.4}s over {} frame(s)",
        engine.timer().average_delta(),
        engine.timer().frame_count()
    );
    println!("Passes: {}", path.passes().iter().map(|p| p.name()).collect::<Vec<_>>().join(" -> "));
    tracing::debug!(stats = ?path.last_stats(), "last frame");
    Ok(())
}

/// The headless device never executes bytecode, so any non-empty blob
/// stands in for a compiled shader.
fn placeholder_shaders(config: &EngineConfig) -> Box<dyn ShaderSource> {
    let mut shaders = EmbeddedShaders::new();
    for (name, _) in SHADER_NAMES {
        shaders.insert(name, config.graphics.shader_format, vec![0u8; 16]);
    }
    Box::new(shaders)
}
