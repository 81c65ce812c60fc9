//! blockmodel CLI - block model filtering and grade-tonnage analysis
//!
//! Runs a full analysis from a JSON block table, a TOML configuration and
//! DXF boundary meshes, or inspects a single DXF mesh.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use blockmodel_analysis::{
    analyze, AnalysisConfig, AnalysisReport, BlockTable, CancelToken, MeshSet,
};
use blockmodel_math::Tolerance;
use blockmodel_mesh::{read_dxf, MeshBuilder, MeshKind};

#[derive(Parser)]
#[command(name = "blockmodel")]
#[command(about = "Block model analysis with DXF spatial constraints", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter a block model and compute its grade-tonnage curve
    Analyze {
        /// Block table as a JSON array of row objects
        #[arg(long)]
        blocks: PathBuf,
        /// Analysis configuration (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Named DXF mesh, as NAME=PATH (repeatable)
        #[arg(long = "mesh", value_parser = parse_mesh_arg)]
        meshes: Vec<(String, PathBuf)>,
        /// Write the JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the retained rows (with spatial flags) here as JSON
        #[arg(long)]
        retained: Option<PathBuf>,
    },
    /// Display information about the mesh in a DXF file
    MeshInfo {
        /// Path to the DXF file
        file: PathBuf,
        /// Build as an open surface instead of a closed envelope
        #[arg(long)]
        surface: bool,
        /// Vertex deduplication tolerance
        #[arg(long, default_value_t = Tolerance::DEFAULT.linear)]
        tolerance: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            blocks,
            config,
            meshes,
            output,
            retained,
        } => {
            run_analysis(
                &blocks,
                &config,
                &meshes,
                output.as_deref(),
                retained.as_deref(),
            )?;
        }
        Commands::MeshInfo {
            file,
            surface,
            tolerance,
        } => {
            show_mesh_info(&file, surface, tolerance)?;
        }
    }

    Ok(())
}

fn parse_mesh_arg(arg: &str) -> std::result::Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", arg)),
    }
}

fn run_analysis(
    blocks: &Path,
    config: &Path,
    meshes: &[(String, PathBuf)],
    output: Option<&Path>,
    retained: Option<&Path>,
) -> Result<()> {
    let config = AnalysisConfig::from_path(config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;
    let table = BlockTable::from_path(blocks)
        .with_context(|| format!("Failed to load block table {}", blocks.display()))?;
    tracing::info!(rows = table.len(), "Loaded block table");

    let mesh_set = load_meshes(meshes);
    let analysis = analyze(&table, &config, &mesh_set, &CancelToken::new())?;
    print_report(&analysis.report);

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&analysis.report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote report to {}", path.display());
    }

    if let Some(path) = retained {
        let rows = table.retained_rows(&analysis.retained);
        let json = serde_json::to_string_pretty(&rows)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {} retained rows to {}", rows.len(), path.display());
    }

    Ok(())
}

/// Read every named DXF file. Unreadable files are logged and left out of
/// the set; a spatial filter that needs one fails later with missing geometry.
fn load_meshes(meshes: &[(String, PathBuf)]) -> MeshSet {
    let mut mesh_set = MeshSet::new();
    for (name, path) in meshes {
        match mesh_set.load_dxf(name.as_str(), path) {
            Ok(count) => tracing::info!(mesh = %name, entities = count, "Loaded DXF"),
            Err(e) => tracing::warn!(
                mesh = %name,
                path = %path.display(),
                error = %e,
                "Skipping unreadable DXF"
            ),
        }
    }
    mesh_set
}

fn print_report(report: &AnalysisReport) {
    let pct = if report.total_blocks > 0 {
        100.0 * report.retained_blocks as f64 / report.total_blocks as f64
    } else {
        0.0
    };
    println!(
        "Blocks retained: {} / {} ({:.1}%)",
        report.retained_blocks, report.total_blocks, pct
    );
    for stage in &report.stages {
        print!(
            "  {:<20} {:>10} -> {:>10}",
            stage.stage,
            stage.input,
            stage.retained()
        );
        if stage.degenerate > 0 {
            print!("  ({} degenerate)", stage.degenerate);
        }
        println!();
    }

    if let Some(stats) = &report.statistics {
        println!();
        println!("Grade statistics:");
        println!("  Count:    {}", stats.count);
        println!("  Min:      {:.4}", stats.min);
        println!("  Max:      {:.4}", stats.max);
        println!("  Mean:     {:.4}", stats.mean);
        println!("  Median:   {:.4}", stats.median);
        println!("  Std dev:  {:.4}", stats.std_dev);
        match stats.coefficient_of_variation {
            Some(cv) => println!("  CV:       {:.4}", cv),
            None => println!("  CV:       n/a"),
        }
        println!("  Q25/Q75:  {:.4} / {:.4}", stats.q25, stats.q75);
        println!("  Tonnage:  {:.1}", stats.total_tonnage);
    }

    println!();
    println!(
        "{:>10} {:>14} {:>8} {:>10} {:>14}",
        "Cutoff", "Tonnage", "%", "Grade", "Metal"
    );
    for row in &report.curve.rows {
        println!(
            "{:>10.4} {:>14.1} {:>8.2} {:>10.4} {:>14.2}",
            row.cutoff, row.tonnage, row.percent, row.avg_grade, row.metal
        );
    }
}

fn show_mesh_info(file: &Path, surface: bool, tolerance: f64) -> Result<()> {
    let faces =
        read_dxf(file).with_context(|| format!("Failed to read DXF {}", file.display()))?;
    let kind = if surface {
        MeshKind::Surface
    } else {
        MeshKind::Solid
    };
    let (mesh, report) =
        MeshBuilder::new(Tolerance::new(tolerance)).build_with_report(&faces, kind)?;

    let bounds = mesh.bounds();
    println!("File: {}", file.display());
    println!("Kind: {:?}", kind);
    println!(
        "Entities: {} ({} ignored, {} skipped)",
        report.entities, report.ignored, report.skipped
    );
    println!("Vertices: {}", report.vertices);
    println!("Triangles: {}", report.triangles);
    println!(
        "Bounds: ({:.3}, {:.3}, {:.3}) - ({:.3}, {:.3}, {:.3})",
        bounds.min.x,
        bounds.min.y,
        bounds.min.z,
        bounds.max.x,
        bounds.max.y,
        bounds.max.z
    );
    if kind == MeshKind::Solid {
        let open = mesh.open_edge_count();
        if open == 0 {
            println!("Closed: yes");
        } else {
            println!("Closed: no ({} open edges)", open);
        }
    }

    Ok(())
}
