//! # meshbake CLI
//!
//! Command-line interface for the meshbake level tools.
//!
//! ## Commands
//! - `mesh` - Combine a subtree into one multi-material mesh prefab
//! - `collider` - Build a convex building collider from a subtree
//! - `floor-colliders` - Split floor pieces into convex and exact colliders
//! - `bounds` - Print the footprint of a subtree
//! - `remesh` - Run the external remeshing tool over a model

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use meshbake_assets::AssetDatabase;
use meshbake_core::ToolConfig;
use meshbake_editor::{ColliderReport, Editor, ProcessLoader, load_config, start_remeshing};

/// Config file picked up from the project root when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "meshbake.json";

/// meshbake level tools CLI
#[derive(Parser)]
#[command(name = "meshbake")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project directory
    #[arg(short, long, default_value = ".", global = true)]
    pub project: PathBuf,

    /// Tool configuration (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Scene and selection shared by the editing commands
#[derive(clap::Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Scene document (JSON)
    #[arg(short, long)]
    pub scene: PathBuf,

    /// Name of the node to operate on
    #[arg(long)]
    pub select: String,
}

/// CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Combine the selection into one multi-material mesh prefab
    Mesh {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Build a convex building collider from the selection
    Collider {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Split floor pieces under the selected quadtree into colliders
    FloorColliders {
        #[command(flatten)]
        selection: SelectionArgs,
    },

    /// Print the footprint of the selection
    Bounds {
        #[command(flatten)]
        selection: SelectionArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remesh a model with the external remeshing tool
    Remesh {
        /// Model to remesh
        input: PathBuf,

        /// Remeshing tool executable
        #[arg(short, long)]
        tool: PathBuf,

        /// Extra arguments passed to the tool before its own
        #[arg(long = "tool-arg", allow_hyphen_values = true)]
        tool_args: Vec<String>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

/// Resolve the tool configuration: explicit file, then the project's
/// `meshbake.json`, then defaults
pub fn resolve_config(project: &Path, config: Option<&Path>) -> Result<ToolConfig> {
    match config {
        Some(path) => load_config(path),
        None => {
            let path = project.join(DEFAULT_CONFIG_FILE);
            if path.is_file() {
                load_config(&path)
            } else {
                Ok(ToolConfig::default())
            }
        }
    }
}

fn open_editor(project: &Path, config: ToolConfig, selection: &SelectionArgs) -> Result<Editor> {
    let mut editor = Editor::open(project.to_path_buf(), config, &selection.scene)?;
    if !editor.select_by_name(&selection.select) {
        bail!("no node named \"{}\" in {}", selection.select, selection.scene.display());
    }
    Ok(editor)
}

fn report_colliders(report: &ColliderReport) {
    for (name, outcome) in &report.inserted {
        log::debug!("  {} ({:?})", name, outcome);
    }
    println!(
        "{} colliders under \"{}\" ({} replaced) -> {}",
        report.inserted.len(),
        report.group,
        report.replaced(),
        report.prefab.display()
    );
}

/// Execute the CLI command
pub fn execute(cli: Cli) -> Result<()> {
    init_logging(cli.verbose);
    let config = resolve_config(&cli.project, cli.config.as_deref())?;

    match cli.command {
        Commands::Mesh { selection } => {
            let mut editor = open_editor(&cli.project, config, &selection)?;
            let result = editor.create_building_mesh()?;
            let combined = &result.combined;
            println!(
                "Mesh \"{}\": {} sources, {} submeshes, {} vertices, {}-bit indices -> {}",
                combined.name,
                combined.source_count,
                combined.submesh_count(),
                combined.vertex_count,
                combined.index_width.bytes() * 8,
                result.prefab.display()
            );
        }

        Commands::Collider { selection } => {
            let mut editor = open_editor(&cli.project, config, &selection)?;
            report_colliders(&editor.create_building_collider()?);
        }

        Commands::FloorColliders { selection } => {
            let mut editor = open_editor(&cli.project, config, &selection)?;
            report_colliders(&editor.separate_floor_colliders()?);
        }

        Commands::Bounds { selection, json } => {
            let editor = open_editor(&cli.project, config, &selection)?;
            let bounds = editor.selection_bounds()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&bounds)?);
            } else {
                println!(
                    "min ({}, {}, {}) max ({}, {}, {})",
                    bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
                );
            }
        }

        Commands::Remesh { input, tool, tool_args } => {
            let loader = ProcessLoader::new(tool).with_args(tool_args);
            let database = Arc::new(AssetDatabase::new(cli.project.clone()));
            let outcome = start_remeshing(&loader, &input, &database, &config.remesh)
                .with_context(|| format!("remeshing {}", input.display()))?;
            if let Some(prefab) = &outcome.prefab {
                println!("Remeshed {} -> {}", input.display(), prefab.display());
            }
            if !outcome.errors.is_empty() {
                log::warn!("Remeshing finished with {} errors", outcome.errors.len());
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse() {
        let cli = Cli::parse_from(["meshbake", "mesh", "--scene", "level.json", "--select", "House"]);
        match cli.command {
            Commands::Mesh { selection } => {
                assert_eq!(selection.scene, PathBuf::from("level.json"));
                assert_eq!(selection.select, "House");
            }
            _ => panic!("Expected Mesh command"),
        }
        assert_eq!(cli.project, PathBuf::from("."));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "meshbake",
            "floor-colliders",
            "-s",
            "level.json",
            "--select",
            "quadtree",
            "--project",
            "game",
            "-v",
        ]);
        assert!(matches!(cli.command, Commands::FloorColliders { .. }));
        assert_eq!(cli.project, PathBuf::from("game"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_remesh_command() {
        let cli = Cli::parse_from([
            "meshbake",
            "remesh",
            "models/Tower.obj",
            "--tool",
            "remesher",
            "--tool-arg=--license=site",
        ]);
        if let Commands::Remesh { input, tool, tool_args } = cli.command {
            assert_eq!(input, PathBuf::from("models/Tower.obj"));
            assert_eq!(tool, PathBuf::from("remesher"));
            assert_eq!(tool_args, vec!["--license=site"]);
        } else {
            panic!("Expected Remesh command");
        }
    }

    #[test]
    fn test_bounds_json_flag() {
        let cli = Cli::parse_from(["meshbake", "bounds", "-s", "l.json", "--select", "A", "--json"]);
        assert!(matches!(cli.command, Commands::Bounds { json: true, .. }));
    }

    #[test]
    fn test_selection_is_required() {
        assert!(Cli::try_parse_from(["meshbake", "collider", "--scene", "l.json"]).is_err());
    }

    #[test]
    fn test_resolve_config_defaults() {
        let config = resolve_config(Path::new("/nonexistent/project"), None).unwrap();
        assert_eq!(config, ToolConfig::default());
        assert!(resolve_config(Path::new("."), Some(Path::new("/nonexistent/meshbake.json"))).is_err());
    }
}
