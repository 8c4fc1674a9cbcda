//! modeltrace CLI - inspect and query prebuilt trace models
//!
//! Models are read as JSON when the file ends in `.json` and as the packed
//! binary layout otherwise.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use modeltrace::{ModelTrace, ModelTraceData, TraceResult};
use modeltrace_math::{Aabb3, Point3, Transform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "modeltrace")]
#[command(about = "Query static triangle meshes through their KD-tree", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display counts and bounds of a model
    Info {
        /// Model file (.json or binary)
        file: PathBuf,
    },
    /// Trace one segment and print the result as JSON
    Trace {
        /// Model file (.json or binary)
        file: PathBuf,
        /// Segment start as x,y,z
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        start: Point3,
        /// Segment end as x,y,z
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        end: Point3,
        /// Test every triangle instead of walking the tree
        #[arg(long, conflicts_with_all = ["translate", "rotate_z", "scale"])]
        exhaustive: bool,
        /// Place the model in the world: translation as x,y,z
        #[arg(long, value_parser = parse_point, allow_hyphen_values = true)]
        translate: Option<Point3>,
        /// Place the model in the world: rotation about z in degrees
        #[arg(long, allow_hyphen_values = true)]
        rotate_z: Option<f32>,
        /// Place the model in the world: uniform scale
        #[arg(long)]
        scale: Option<f32>,
    },
    /// Compare tree traversal against brute force on random segments
    Verify {
        /// Model file (.json or binary)
        file: PathBuf,
        /// Number of random segments
        #[arg(long, default_value_t = 10_000)]
        rays: usize,
        /// RNG seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Largest accepted difference in hit fraction
        #[arg(long, default_value_t = 1e-5)]
        tolerance: f32,
    },
    /// Convert between the JSON and binary layouts (by output extension)
    Convert {
        /// Input model
        input: PathBuf,
        /// Output model
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Info { file } => show_info(&file)?,
        Commands::Trace {
            file,
            start,
            end,
            exhaustive,
            translate,
            rotate_z,
            scale,
        } => {
            let pose = model_pose(translate, rotate_z, scale);
            trace_segment(&file, &start, &end, exhaustive, pose.as_ref())?
        }
        Commands::Verify {
            file,
            rays,
            seed,
            tolerance,
        } => verify(&file, rays, seed, tolerance)?,
        Commands::Convert { input, output } => convert(&input, &output)?,
    }

    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

fn read_data(path: &Path) -> Result<ModelTraceData> {
    let data = if is_json(path) {
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        ModelTraceData::from_json(&json)?
    } else {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        ModelTraceData::from_bytes(&bytes)?
    };
    Ok(data)
}

fn load_model(path: &Path) -> Result<ModelTrace> {
    let model = ModelTrace::new(read_data(path)?)
        .with_context(|| format!("invalid trace model {}", path.display()))?;
    Ok(model)
}

fn parse_point(s: &str) -> Result<Point3, String> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f32>().map_err(|e| format!("{c:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    match coords[..] {
        [x, y, z] => Ok(Point3::new(x, y, z)),
        _ => Err(format!("expected x,y,z, got {} values", coords.len())),
    }
}

/// Model-to-world transform: scale first, then rotate, then translate.
fn model_pose(
    translate: Option<Point3>,
    rotate_z: Option<f32>,
    scale: Option<f32>,
) -> Option<Transform> {
    if translate.is_none() && rotate_z.is_none() && scale.is_none() {
        return None;
    }
    let t = translate.unwrap_or_else(Point3::origin);
    let s = scale.unwrap_or(1.0);
    let pose = Transform::translation(t.x, t.y, t.z)
        .then(&Transform::rotation_z(rotate_z.unwrap_or(0.0).to_radians()))
        .then(&Transform::scale(s, s, s));
    Some(pose)
}

fn show_info(file: &Path) -> Result<()> {
    let model = load_model(file)?;
    let h = model.header();

    println!("trace model: {}", file.display());
    println!("  Vertices: {}", h.num_vertices);
    println!("  UVs: {}", h.num_uvs);
    println!("  Triangles: {}", model.num_triangles());
    println!("  Nodes: {}", h.num_nodes);
    println!("  Leafs: {}", h.num_leafs);
    println!("  Overflow entries: {}", h.num_overflow);
    let (lo, hi) = (h.bounds.min, h.bounds.max);
    println!(
        "  Bounds: [{}, {}, {}] - [{}, {}, {}]",
        lo.x, lo.y, lo.z, hi.x, hi.y, hi.z
    );

    let fit = Aabb3::from_points(model.vertices());
    if !fit.is_empty() && !(h.bounds.contains(&fit.min) && h.bounds.contains(&fit.max)) {
        warn!("stored bounds do not enclose every vertex, some triangles can never be hit");
    }
    if h.num_nodes == 0 && model.num_triangles() > 0 {
        info!("no tree, traces test every triangle");
    }

    let filled = model
        .leafs()
        .iter()
        .filter(|leaf| leaf.triangles[0] != modeltrace::kdtree::SLOT_END)
        .count();
    println!("\nTree stats:");
    println!("  Non-empty leafs: {}", filled);
    println!("  Empty leafs: {}", h.num_leafs - filled);

    Ok(())
}

fn result_json(result: &TraceResult) -> serde_json::Value {
    serde_json::json!({
        "hit": result.is_hit(),
        "triangleIndex": result.triangle_index,
        "triangle": result.triangle(),
        "fraction": result.fraction,
        "uv": [result.uv.x, result.uv.y],
        "normal": [result.normal.x, result.normal.y, result.normal.z],
    })
}

fn trace_segment(
    file: &Path,
    start: &Point3,
    end: &Point3,
    exhaustive: bool,
    pose: Option<&Transform>,
) -> Result<()> {
    if start == end {
        anyhow::bail!("segment start and end coincide");
    }
    let model = load_model(file)?;
    let result = match pose {
        Some(pose) => {
            if pose.inverse().is_none() {
                warn!("model pose is singular, nothing can be hit");
            }
            model.trace_transformed(pose, start, end)
        }
        None if exhaustive => model.trace_exhaustive(start, end),
        None => model.trace(start, end),
    };

    let mut json = result_json(&result);
    if result.is_hit() {
        let p = result.hit_point(start, end);
        json["point"] = serde_json::json!([p.x, p.y, p.z]);
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn verify(file: &Path, rays: usize, seed: u64, tolerance: f32) -> Result<()> {
    let model = load_model(file)?;

    // Sample endpoints from a box a bit larger than the scene so segments
    // start inside, outside and on both sides of it.
    let mut bounds = *model.bounds();
    let pad = bounds.extent().norm().max(1.0) * 0.25;
    bounds.expand(pad);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut sample = || {
        Point3::new(
            rng.gen_range(bounds.min.x..=bounds.max.x),
            rng.gen_range(bounds.min.y..=bounds.max.y),
            rng.gen_range(bounds.min.z..=bounds.max.z),
        )
    };

    let mut hits = 0;
    let mut mismatches = 0;
    let mut traced = 0;
    while traced < rays {
        let start = sample();
        let end = sample();
        if start == end {
            continue;
        }
        traced += 1;

        let fast = model.trace(&start, &end);
        let slow = model.trace_exhaustive(&start, &end);
        hits += slow.is_hit() as usize;

        if fast.triangle_index != slow.triangle_index
            || (fast.fraction - slow.fraction).abs() > tolerance
        {
            mismatches += 1;
            warn!(
                "mismatch on {start} -> {end}: tree {:?} at {}, exhaustive {:?} at {}",
                fast.triangle_index, fast.fraction, slow.triangle_index, slow.fraction
            );
        }
    }

    info!("{traced} segments, {hits} hits, {mismatches} mismatches");
    println!("Verified {} segments ({} hits)", traced, hits);
    if mismatches > 0 {
        anyhow::bail!("{} of {} segments disagree with brute force", mismatches, traced);
    }
    println!("Tree traversal agrees with brute force");
    Ok(())
}

fn convert(input: &Path, output: &Path) -> Result<()> {
    // Round-trip through the validated model so broken input never gets written.
    let data = load_model(input)?.to_data();

    if is_json(output) {
        fs::write(output, data.to_json()?)?;
    } else {
        fs::write(output, data.to_bytes())?;
    }
    println!("Wrote {}", output.display());
    Ok(())
}
