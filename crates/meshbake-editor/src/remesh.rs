//! Remeshing driver
//!
//! Runs an external remeshing engine over a model file: import, remesh with
//! hole filling, replace materials with a single empty one (the remeshed
//! surface has a new UV set), export, then report the engine's log. The
//! exported model is copied into the project's asset folder and wrapped in a
//! prefab.
//!
//! Import, export and initialisation failures abort the run. Errors and
//! warnings the engine accumulates along the way are only logged.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use meshbake_assets::{AssetDatabase, AssetError, AssetType, PrefabStore};
use meshbake_core::{HoleFilling, RemeshConfig};
use thiserror::Error;

/// Extension of the exported model
pub const MODEL_SUFFIX: &str = "fbx";

/// Asset folder the exported model is copied under
pub const ASSET_FOLDER: &str = "Assets";

/// Engine initialisation failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("ErrorCode({code}) {message}")]
pub struct InitError {
    pub code: i32,
    pub message: String,
}

/// Remeshing errors
#[derive(Error, Debug)]
pub enum RemeshError {
    #[error("Failed to initialize remeshing engine: {0}")]
    Init(#[from] InitError),

    #[error("Failed to load scene {path}: {reason}")]
    Import { path: PathBuf, reason: String },

    /// `errors` holds what the engine logged before the save failed
    #[error("Failed to save scene {path}: {reason}")]
    Export {
        path: PathBuf,
        reason: String,
        errors: Vec<String>,
    },

    #[error("Input has no file name: {0}")]
    InvalidInput(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),
}

/// Result type for remeshing
pub type RemeshResult<T> = Result<T, RemeshError>;

/// Remeshing processor settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemeshSettings {
    /// On-screen size target in pixels
    pub on_screen_size: u32,
    pub hole_filling: HoleFilling,
}

impl Default for RemeshSettings {
    fn default() -> Self {
        Self {
            on_screen_size: 80,
            hole_filling: HoleFilling::Medium,
        }
    }
}

impl From<&RemeshConfig> for RemeshSettings {
    fn from(config: &RemeshConfig) -> Self {
        Self {
            on_screen_size: config.on_screen_size,
            hole_filling: config.hole_filling,
        }
    }
}

/// An initialised remeshing engine holding one scene
pub trait RemeshingEngine {
    /// Load the scene to process. The error is the engine's reason.
    fn import_scene(&mut self, path: &Path) -> Result<(), String>;

    fn remesh(&mut self, settings: &RemeshSettings);

    /// Clear the texture and material tables and add one empty material
    fn strip_materials(&mut self);

    fn export_scene(&mut self, path: &Path) -> Result<(), String>;

    /// Drain accumulated error messages
    fn take_errors(&mut self) -> Vec<String>;

    /// Drain accumulated warning messages
    fn take_warnings(&mut self) -> Vec<String>;
}

/// Creates initialised engines
pub trait EngineLoader {
    type Engine: RemeshingEngine;

    fn init(&self) -> Result<Self::Engine, InitError>;
}

/// What a remeshing run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemeshOutcome {
    /// Exported model path
    pub exported: PathBuf,
    /// Model copy inside the project, relative to the project root
    pub model: Option<PathBuf>,
    /// Prefab wrapping the model, relative to the project root
    pub prefab: Option<PathBuf>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Remesh `input` and export it as `out_dir/out_name`
pub fn run_remeshing<L: EngineLoader>(
    loader: &L,
    input: &Path,
    out_dir: &Path,
    out_name: &str,
    settings: &RemeshSettings,
) -> RemeshResult<RemeshOutcome> {
    let mut engine = loader.init().inspect_err(|e| {
        log::error!("Failed to initialize remeshing engine: {}", e);
    })?;

    log::info!("Load scene to process.");
    engine.import_scene(input).map_err(|reason| RemeshError::Import {
        path: input.to_path_buf(),
        reason,
    })?;

    log::info!("Start the remeshing process.");
    engine.remesh(settings);
    engine.strip_materials();

    log::info!("Save processed scene.");
    let exported = out_dir.join(out_name);
    let saved = engine.export_scene(&exported);

    log::info!("Check log for any warnings or errors.");
    let (errors, warnings) = check_log(&mut engine);
    if let Err(reason) = saved {
        return Err(RemeshError::Export {
            path: exported,
            reason,
            errors,
        });
    }

    Ok(RemeshOutcome {
        exported,
        errors,
        warnings,
        ..Default::default()
    })
}

fn check_log<E: RemeshingEngine>(engine: &mut E) -> (Vec<String>, Vec<String>) {
    let errors = engine.take_errors();
    if errors.is_empty() {
        log::info!("No errors.");
    } else {
        log::error!("Errors:");
        for error in &errors {
            log::error!("{}", error);
        }
    }

    let warnings = engine.take_warnings();
    if warnings.is_empty() {
        log::info!("No warnings.");
    } else {
        log::warn!("Warnings:");
        for warning in &warnings {
            log::warn!("{}", warning);
        }
    }

    (errors, warnings)
}

/// Remesh `input` into the project.
///
/// The engine writes `<output_folder>/<stem>.fbx` under the project root.
/// That file is copied to `Assets/<output_folder>/`, replacing any earlier
/// copy, registered as a model, and wrapped in a prefab next to it.
pub fn start_remeshing<L: EngineLoader>(
    loader: &L,
    input: &Path,
    database: &Arc<AssetDatabase>,
    config: &RemeshConfig,
) -> RemeshResult<RemeshOutcome> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RemeshError::InvalidInput(input.to_path_buf()))?;
    let out_name = format!("{}.{}", stem, MODEL_SUFFIX);

    let out_dir = database.project_root().join(&config.output_folder);
    std::fs::create_dir_all(&out_dir)?;

    let mut outcome = run_remeshing(loader, input, &out_dir, &out_name, &config.into())?;

    let asset_dir = Path::new(ASSET_FOLDER).join(&config.output_folder);
    let model = asset_dir.join(&out_name);
    let destination = database.project_root().join(&model);
    std::fs::create_dir_all(database.project_root().join(&asset_dir))?;
    if destination.exists() {
        std::fs::remove_file(&destination)?;
    }
    std::fs::copy(&outcome.exported, &destination)?;
    database.import(&model, AssetType::Model, Vec::new())?;

    let store = PrefabStore::new(database.clone(), asset_dir);
    let prefab = store.save_model_prefab(stem, &model)?;

    outcome.model = Some(model);
    outcome.prefab = Some(prefab);
    Ok(outcome)
}

/// Loader for [`ProcessEngine`]
#[derive(Debug, Clone)]
pub struct ProcessLoader {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLoader {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments passed ahead of the engine's own
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl EngineLoader for ProcessLoader {
    type Engine = ProcessEngine;

    /// Checks the tool runs by calling it with `--version`
    fn init(&self) -> Result<ProcessEngine, InitError> {
        let output = self.command().arg("--version").output().map_err(|e| InitError {
            code: e.raw_os_error().unwrap_or(-1),
            message: format!("{}: {}", self.program.display(), e),
        })?;
        if !output.status.success() {
            return Err(InitError {
                code: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        log::debug!(
            "Remeshing tool {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );

        Ok(ProcessEngine {
            loader: self.clone(),
            input: None,
            settings: RemeshSettings::default(),
            strip_materials: false,
            errors: Vec::new(),
            warnings: Vec::new(),
        })
    }
}

/// Remeshing engine backed by an external command-line tool.
///
/// The tool runs once, at export, as
/// `<program> [args] --input <in> --output <out> --on-screen-size <n>
/// --hole-filling <mode> [--strip-materials]`. Output lines starting with
/// `error:` or `warning:` are collected into the engine log.
#[derive(Debug)]
pub struct ProcessEngine {
    loader: ProcessLoader,
    input: Option<PathBuf>,
    settings: RemeshSettings,
    strip_materials: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ProcessEngine {
    fn collect_log(&mut self, text: &str) {
        for line in text.lines().map(str::trim) {
            if let Some(message) = line.strip_prefix("error:") {
                self.errors.push(message.trim().to_string());
            } else if let Some(message) = line.strip_prefix("warning:") {
                self.warnings.push(message.trim().to_string());
            }
        }
    }
}

impl RemeshingEngine for ProcessEngine {
    fn import_scene(&mut self, path: &Path) -> Result<(), String> {
        if !path.is_file() {
            return Err(format!("{} does not exist", path.display()));
        }
        self.input = Some(path.to_path_buf());
        Ok(())
    }

    fn remesh(&mut self, settings: &RemeshSettings) {
        self.settings = *settings;
    }

    fn strip_materials(&mut self) {
        self.strip_materials = true;
    }

    fn export_scene(&mut self, path: &Path) -> Result<(), String> {
        let input = self.input.clone().ok_or_else(|| String::from("no scene loaded"))?;

        let mut command = self.loader.command();
        command
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(path)
            .arg("--on-screen-size")
            .arg(self.settings.on_screen_size.to_string())
            .arg("--hole-filling")
            .arg(self.settings.hole_filling.as_str());
        if self.strip_materials {
            command.arg("--strip-materials");
        }

        let output = command.output().map_err(|e| e.to_string())?;
        self.collect_log(&String::from_utf8_lossy(&output.stdout));
        self.collect_log(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(format!("tool exited with {}", output.status));
        }
        if !path.is_file() {
            return Err(format!("tool did not write {}", path.display()));
        }
        Ok(())
    }

    fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }
}
