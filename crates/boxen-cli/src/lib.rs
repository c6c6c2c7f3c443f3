//! # Boxen CLI
//!
//! Command-line tools for the Boxen asset pipeline. Models are loaded on
//! the headless backend, so no GPU or window is needed.
//!
//! ## Commands
//! - `inspect` - Load a model and print meshes, statistics, bounds and textures
//! - `config` - Print the effective asset configuration as JSON

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use boxen_assets::{AssetConfig, ImportFlags, Model};
use boxen_core::Bounds;
use boxen_renderer::{HeadlessBackend, SharedBackend, TextureKind, TextureSource};
use clap::{Parser, Subcommand};
use serde::Serialize;

/// Boxen model pipeline CLI
#[derive(Parser)]
#[command(name = "boxen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Asset configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Load a model and report what was imported
    Inspect {
        /// Model file
        path: PathBuf,

        /// Lower-detail model and its switch distance, as PATH:DISTANCE
        #[arg(long = "lod", value_parser = parse_lod)]
        lods: Vec<(PathBuf, f32)>,

        /// Camera distance used to report the selected LOD
        #[arg(short, long)]
        distance: Option<f32>,

        /// List cached textures
        #[arg(short, long)]
        textures: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Mirror texture coordinates vertically
        #[arg(long)]
        flip_uvs: bool,

        /// Bake node transforms into the vertices
        #[arg(long)]
        pre_transform: bool,

        /// Skip all post-processing
        #[arg(long, conflicts_with_all = ["flip_uvs", "pre_transform"])]
        raw: bool,
    },

    /// Print the effective asset configuration
    Config,
}

/// Parse `PATH:DISTANCE`; the split happens at the last colon
fn parse_lod(value: &str) -> std::result::Result<(PathBuf, f32), String> {
    let (path, distance) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PATH:DISTANCE, got '{value}'"))?;
    let distance: f32 = distance
        .parse()
        .map_err(|err| format!("invalid distance '{distance}': {err}"))?;
    if path.is_empty() {
        return Err("LOD path is empty".to_string());
    }
    Ok((PathBuf::from(path), distance))
}

/// Per-mesh summary
#[derive(Debug, Serialize)]
pub struct MeshReport {
    pub name: String,
    pub vertices: usize,
    pub indices: usize,
    pub triangles: usize,
    pub textures: Vec<TextureKind>,
    pub bounds: Bounds,
}

/// Cached texture summary
#[derive(Debug, Serialize)]
pub struct TextureReport {
    pub key: PathBuf,
    pub kind: TextureKind,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub procedural: bool,
}

/// LOD level summary
#[derive(Debug, Serialize)]
pub struct LodReport {
    pub switch_distance: f32,
    pub meshes: usize,
    pub triangles: usize,
}

/// Everything `inspect` prints
#[derive(Debug, Serialize)]
pub struct ModelReport {
    pub path: PathBuf,
    pub meshes: Vec<MeshReport>,
    pub total_vertices: usize,
    pub total_triangles: usize,
    pub memory_bytes: usize,
    pub bounds: Bounds,
    pub lods: Vec<LodReport>,
    /// Triangle count of the model chosen for `--distance`
    pub selected_triangles: Option<usize>,
    pub textures: Vec<TextureReport>,
}

/// Import settings derived from the configuration and command-line overrides
pub fn import_flags(
    config: &AssetConfig,
    flip_uvs: bool,
    pre_transform: bool,
    raw: bool,
) -> ImportFlags {
    if raw {
        return ImportFlags::empty();
    }
    let mut flags = config.import_flags;
    flags.set(ImportFlags::FLIP_UVS, flip_uvs || flags.contains(ImportFlags::FLIP_UVS));
    flags.set(
        ImportFlags::PRE_TRANSFORM_VERTICES,
        pre_transform || flags.contains(ImportFlags::PRE_TRANSFORM_VERTICES),
    );
    flags
}

/// Load a model and its LOD levels and summarize them
pub fn inspect_model(
    gpu: SharedBackend,
    config: &AssetConfig,
    path: &Path,
    lods: &[(PathBuf, f32)],
    flags: ImportFlags,
    distance: Option<f32>,
) -> Result<ModelReport> {
    let mut model = Model::with_config(gpu.clone(), config.clone());
    model
        .load_from_file_with(path, flags)
        .with_context(|| format!("Failed to load model {}", path.display()))?;

    for (lod_path, switch_distance) in lods {
        let mut lod = Model::with_config(gpu.clone(), config.clone());
        lod.load_from_file_with(lod_path, flags)
            .with_context(|| format!("Failed to load LOD model {}", lod_path.display()))?;
        model.add_lod_level(lod, *switch_distance);
    }

    let meshes = model
        .meshes()
        .iter()
        .map(|mesh| MeshReport {
            name: mesh.name().to_string(),
            vertices: mesh.vertex_count(),
            indices: mesh.index_count(),
            triangles: mesh.triangle_count(),
            textures: mesh
                .textures()
                .iter()
                .filter_map(|texture| texture.upgrade())
                .map(|texture| texture.kind())
                .collect(),
            bounds: *mesh.bounds(),
        })
        .collect();

    let textures = model
        .texture_cache()
        .iter()
        .map(|(key, texture)| TextureReport {
            key: key.to_path_buf(),
            kind: texture.kind(),
            width: texture.width(),
            height: texture.height(),
            channels: texture.channels(),
            procedural: *texture.source() == TextureSource::Procedural,
        })
        .collect();

    let lods = model
        .lod_levels()
        .iter()
        .map(|level| LodReport {
            switch_distance: level.switch_distance,
            meshes: level.model.mesh_count(),
            triangles: level.model.total_triangles(),
        })
        .collect();

    Ok(ModelReport {
        path: path.to_path_buf(),
        meshes,
        total_vertices: model.total_vertices(),
        total_triangles: model.total_triangles(),
        memory_bytes: model.total_memory_usage(),
        bounds: *model.bounds(),
        lods,
        selected_triangles: distance.map(|d| model.select_lod(d).total_triangles()),
        textures,
    })
}

fn print_report(report: &ModelReport, show_textures: bool) {
    println!("{}", report.path.display());
    println!(
        "  {} meshes, {} vertices, {} triangles, {:.1} KiB",
        report.meshes.len(),
        report.total_vertices,
        report.total_triangles,
        report.memory_bytes as f64 / 1024.0
    );
    println!(
        "  bounds {} .. {}, center {}, radius {:.3}",
        report.bounds.min, report.bounds.max, report.bounds.center, report.bounds.radius
    );
    for mesh in &report.meshes {
        let kinds: Vec<&str> = mesh.textures.iter().map(|kind| kind.name()).collect();
        println!(
            "  - '{}': {} vertices, {} indices, {} triangles [{}]",
            mesh.name,
            mesh.vertices,
            mesh.indices,
            mesh.triangles,
            kinds.join(", ")
        );
    }
    for lod in &report.lods {
        println!(
            "  LOD from {}: {} meshes, {} triangles",
            lod.switch_distance, lod.meshes, lod.triangles
        );
    }
    if let Some(triangles) = report.selected_triangles {
        println!("  selected LOD draws {triangles} triangles");
    }
    if show_textures {
        println!("  {} cached textures", report.textures.len());
        for texture in &report.textures {
            println!(
                "  - {} ({}, {}x{}, {} channels{})",
                texture.key.display(),
                texture.kind,
                texture.width,
                texture.height,
                texture.channels,
                if texture.procedural { ", procedural" } else { "" }
            );
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AssetConfig> {
    match path {
        Some(path) => AssetConfig::from_json_file(path)
            .with_context(|| format!("Failed to read configuration {}", path.display())),
        None => Ok(AssetConfig::default()),
    }
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect {
            path,
            lods,
            distance,
            textures,
            json,
            flip_uvs,
            pre_transform,
            raw,
        } => {
            let gpu: SharedBackend = Arc::new(HeadlessBackend::new());
            let flags = import_flags(&config, flip_uvs, pre_transform, raw);
            log::debug!("Import flags: {:?}", flags);

            let report = inspect_model(gpu, &config, &path, &lods, flags, distance)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, textures);
            }
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One triangle in glTF with an external `.bin` buffer
    fn write_triangle(dir: &Path, name: &str, scale: f32) -> PathBuf {
        let positions = [0.0f32, 0.0, 0.0, scale, 0.0, 0.0, 0.0, scale, 0.0];
        let bytes: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
        std::fs::write(dir.join(format!("{name}.bin")), bytes).unwrap();

        let gltf = format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "mesh": 0 }}],
  "meshes": [{{ "name": "{name}", "primitives": [{{ "attributes": {{ "POSITION": 0 }} }}] }}],
  "buffers": [{{ "byteLength": 36, "uri": "{name}.bin" }}],
  "bufferViews": [{{ "buffer": 0, "byteLength": 36 }}],
  "accessors": [{{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                   "min": [0.0, 0.0, 0.0], "max": [{scale}, {scale}, 0.0] }}]
}}"#
        );
        let path = dir.join(format!("{name}.gltf"));
        std::fs::write(&path, gltf).unwrap();
        path
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("boxen_cli_tests").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["boxen", "inspect", "model.gltf"]);
        assert!(matches!(cli.command, Commands::Inspect { .. }));
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_inspect_command() {
        let cli = Cli::parse_from([
            "boxen",
            "-v",
            "inspect",
            "model.gltf",
            "--lod",
            "far.gltf:40",
            "--lod",
            "C:/models/near.gltf:10.5",
            "-d",
            "25",
            "--json",
        ]);
        assert!(cli.verbose);
        if let Commands::Inspect {
            path,
            lods,
            distance,
            json,
            ..
        } = cli.command
        {
            assert_eq!(path, PathBuf::from("model.gltf"));
            assert_eq!(
                lods,
                vec![
                    (PathBuf::from("far.gltf"), 40.0),
                    (PathBuf::from("C:/models/near.gltf"), 10.5)
                ]
            );
            assert_eq!(distance, Some(25.0));
            assert!(json);
        } else {
            panic!("Expected Inspect command");
        }
    }

    #[test]
    fn test_parse_lod_errors() {
        assert!(parse_lod("far.gltf").is_err());
        assert!(parse_lod("far.gltf:near").is_err());
        assert!(parse_lod(":10").is_err());
    }

    #[test]
    fn test_raw_conflicts_with_overrides() {
        let result = Cli::try_parse_from(["boxen", "inspect", "m.gltf", "--raw", "--flip-uvs"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_import_flags_overrides() {
        let config = AssetConfig::default();
        assert_eq!(import_flags(&config, false, false, false), config.import_flags);
        assert!(import_flags(&config, true, false, false).contains(ImportFlags::FLIP_UVS));
        assert!(
            import_flags(&config, false, true, false)
                .contains(ImportFlags::PRE_TRANSFORM_VERTICES)
        );
        assert!(import_flags(&config, true, true, true).is_empty());
    }

    #[test]
    fn test_inspect_model_report() {
        let dir = scratch_dir("inspect");
        let near = write_triangle(&dir, "near", 1.0);
        let far = write_triangle(&dir, "far", 2.0);

        let gpu: SharedBackend = Arc::new(HeadlessBackend::new());
        let config = AssetConfig::default();
        let report = inspect_model(
            gpu,
            &config,
            &near,
            &[(far, 30.0)],
            config.import_flags,
            Some(50.0),
        )
        .unwrap();

        assert_eq!(report.meshes.len(), 1);
        assert_eq!(report.meshes[0].name, "near");
        assert_eq!(report.total_vertices, 3);
        assert_eq!(report.total_triangles, 1);
        assert_eq!(report.bounds.max.to_array(), [1.0, 1.0, 0.0]);
        assert_eq!(report.lods.len(), 1);
        assert_eq!(report.selected_triangles, Some(1));
        assert_eq!(report.meshes[0].textures.len(), TextureKind::MATERIAL_ORDER.len());
        assert!(report.textures.iter().all(|texture| texture.procedural));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_triangles"], 1);
        assert_eq!(json["textures"][0]["kind"], "diffuse");
    }

    #[test]
    fn test_inspect_missing_model() {
        let gpu: SharedBackend = Arc::new(HeadlessBackend::new());
        let config = AssetConfig::default();
        let err = inspect_model(
            gpu,
            &config,
            Path::new("missing.gltf"),
            &[],
            config.import_flags,
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing.gltf"));
    }
}
