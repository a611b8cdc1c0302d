use std::env;
use std::fs;

use anyhow::{anyhow, Context, Result};
use log::info;

use planar_shadows::app::{run_interactive, WindowInitError};
use planar_shadows::headless::simulate;
use planar_shadows::mesh::uv_sphere;
use planar_shadows::{load_obj_from_str, Mesh, SceneConfig};

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse(env::args().skip(1))?;
    let scene = match options.scene.as_deref() {
        Some(path) => {
            let xml = fs::read_to_string(path)
                .with_context(|| format!("failed to read scene {path}"))?;
            SceneConfig::from_xml(&xml).with_context(|| format!("failed to parse scene {path}"))?
        }
        None => SceneConfig::demo(),
    };
    let plane = scene.plane()?;
    println!(
        "Receiver plane normal=({:.2}, {:.2}, {:.2}) offset={:.2}",
        plane.normal().x,
        plane.normal().y,
        plane.normal().z,
        plane.offset()
    );
    println!(
        "Loaded scene with {} caster ring(s), {} caster(s)",
        scene.rings.len(),
        scene.rings.iter().map(|ring| ring.count).sum::<u32>()
    );

    let model = load_model(options.mesh.as_deref())?;
    if let Some(frames) = options.headless {
        return run_headless(&scene, frames);
    }

    match run_interactive(scene.clone(), model) {
        Ok(()) => Ok(()),
        Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
            eprintln!("{err}. Falling back to --headless mode.");
            run_headless(&scene, DEFAULT_FALLBACK_FRAMES)
        }
        Err(err) => Err(err),
    }
}

const DEFAULT_FALLBACK_FRAMES: u64 = 3;

fn load_model(path: Option<&str>) -> Result<Mesh> {
    let Some(path) = path else {
        return Ok(uv_sphere(5.0, 24, 32));
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read mesh {path}"))?;
    let mesh =
        load_obj_from_str(&contents).with_context(|| format!("failed to parse OBJ mesh {path}"))?;
    info!(
        "loaded {path}: {} vertices, {} triangles",
        mesh.vertex_count(),
        mesh.triangles.len()
    );
    Ok(mesh)
}

fn run_headless(scene: &SceneConfig, frames: u64) -> Result<()> {
    let summaries = simulate(scene, frames, 16.0 / 9.0)?;
    for summary in &summaries {
        let probe = match summary.probe {
            Some((point, Some(shadow))) => format!(
                " probe=({:.2}, {:.2}, {:.2}) -> ({:.2}, {:.2}, {:.2})",
                point.x, point.y, point.z, shadow.x, shadow.y, shadow.z
            ),
            Some((point, None)) => format!(
                " probe=({:.2}, {:.2}, {:.2}) -> degenerate",
                point.x, point.y, point.z
            ),
            None => String::new(),
        };
        println!(
            "frame {} light_y={:.2} receiver={} shadow={} caster={}{probe}",
            summary.tick,
            summary.light.y,
            summary.receiver_draws,
            summary.shadow_draws,
            summary.caster_draws
        );
    }
    println!("Rendered {} frame(s) in receiver -> shadow -> caster order", summaries.len());
    Ok(())
}

#[derive(Debug, Default, PartialEq)]
struct CliOptions {
    scene: Option<String>,
    mesh: Option<String>,
    headless: Option<u64>,
}

impl CliOptions {
    const USAGE: &'static str =
        "Usage: planar-shadows [scene.xml] [--mesh model.obj] [--headless <frames>]";

    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--mesh" => {
                    let path = args
                        .next()
                        .ok_or_else(|| anyhow!("--mesh needs a path. {}", Self::USAGE))?;
                    options.mesh = Some(path);
                }
                "--headless" => {
                    let frames = args
                        .next()
                        .ok_or_else(|| anyhow!("--headless needs a frame count. {}", Self::USAGE))?;
                    let frames = frames
                        .parse::<u64>()
                        .with_context(|| format!("invalid frame count {frames:?}"))?;
                    options.headless = Some(frames);
                }
                other if other.starts_with("--") => {
                    return Err(anyhow!("Unknown argument: {other}. {}", Self::USAGE));
                }
                _ if options.scene.is_none() => options.scene = Some(arg),
                other => {
                    return Err(anyhow!("Unexpected argument: {other}. {}", Self::USAGE));
                }
            }
        }
        Ok(options)
    }
}
