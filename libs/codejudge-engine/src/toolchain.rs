// Toolchain strategy table: how each language is compiled and run
use crate::error::{EngineError, Result};
use codejudge_common::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Paths a command template may refer to
#[derive(Debug, Clone)]
pub struct StagePaths {
    pub source: PathBuf,
    pub artifact: PathBuf,
    pub dir: PathBuf,
}

/// Program plus arguments; `{source}`, `{artifact}` and `{dir}` are substituted per job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandTemplate {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn render(&self, paths: &StagePaths) -> (String, Vec<String>) {
        let substitute = |raw: &str| {
            raw.replace("{source}", &paths.source.to_string_lossy())
                .replace("{artifact}", &paths.artifact.to_string_lossy())
                .replace("{dir}", &paths.dir.to_string_lossy())
        };
        (
            substitute(&self.program),
            self.args.iter().map(|a| substitute(a)).collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileStage {
    pub command: CommandTemplate,
    /// Whether the stage writes an executable to `{artifact}`
    #[serde(default)]
    pub produces_artifact: bool,
    /// Substrings in the compiler's stderr that mean the build failed
    #[serde(default)]
    pub error_markers: Vec<String>,
}

/// How the prepared program is started. Whatever it does from here on is a
/// runtime matter; source rejection belongs to the compile stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStage {
    pub command: CommandTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toolchain {
    #[serde(rename = "name")]
    pub language: Language,
    pub file_extension: String,
    #[serde(default)]
    pub compile: Option<CompileStage>,
    pub run: RunStage,
}

impl Toolchain {
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    pub fn produces_artifact(&self) -> bool {
        self.compile.as_ref().map_or(false, |c| c.produces_artifact)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LanguagesJson {
    languages: Vec<Toolchain>,
}

/// Language-keyed registry of toolchains
#[derive(Debug, Clone)]
pub struct ToolchainRegistry {
    toolchains: HashMap<Language, Toolchain>,
}

impl ToolchainRegistry {
    pub fn empty() -> Self {
        Self {
            toolchains: HashMap::new(),
        }
    }

    /// Toolchains assumed present on a typical Linux judge host
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for toolchain in builtin_toolchains() {
            registry.register(toolchain);
        }
        registry
    }

    /// Load toolchains from a languages.json file
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path).map_err(|e| {
            EngineError::InvalidRequest(format!(
                "failed to read {}: {}",
                config_path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let parsed: LanguagesJson = serde_json::from_str(content).map_err(|e| {
            EngineError::InvalidRequest(format!("failed to parse languages.json: {}", e))
        })?;

        if parsed.languages.is_empty() {
            return Err(EngineError::InvalidRequest(
                "no languages configured in languages.json".to_string(),
            ));
        }

        let mut registry = Self::empty();
        for toolchain in parsed.languages {
            if let Some(previous) = registry.register(toolchain) {
                return Err(EngineError::InvalidRequest(format!(
                    "language '{}' configured more than once",
                    previous.language
                )));
            }
        }
        Ok(registry)
    }

    /// Load from `config_path` if it exists, otherwise fall back to the built-in table
    pub fn load_or_builtin(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let registry = Self::load(config_path)?;
            info!(path = %config_path.display(), languages = ?registry.languages(), "Loaded toolchains");
            Ok(registry)
        } else {
            warn!(
                path = %config_path.display(),
                "Toolchain config not found, using built-in toolchains"
            );
            Ok(Self::builtin())
        }
    }

    /// Add or replace the strategy for a language, returning the one it displaced
    pub fn register(&mut self, toolchain: Toolchain) -> Option<Toolchain> {
        self.toolchains.insert(toolchain.language, toolchain)
    }

    pub fn get(&self, language: Language) -> Result<&Toolchain> {
        self.toolchains
            .get(&language)
            .ok_or_else(|| EngineError::UnsupportedLanguage(language.to_string()))
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.toolchains.keys().copied().collect();
        languages.sort_by_key(|l| l.as_str());
        languages
    }
}

const PYTHON_CHECK: &str =
    "import sys; compile(open(sys.argv[1], 'rb').read(), sys.argv[1], 'exec')";

fn builtin_toolchains() -> Vec<Toolchain> {
    let gcc_markers = vec!["error:".to_string()];

    vec![
        Toolchain {
            language: Language::Cpp,
            file_extension: "cpp".to_string(),
            compile: Some(CompileStage {
                command: CommandTemplate::new(
                    "g++",
                    &["-std=c++17", "-O2", "-pipe", "{source}", "-o", "{artifact}"],
                ),
                produces_artifact: true,
                error_markers: gcc_markers.clone(),
            }),
            run: RunStage {
                command: CommandTemplate::new("{artifact}", &[]),
            },
        },
        Toolchain {
            language: Language::C,
            file_extension: "c".to_string(),
            compile: Some(CompileStage {
                command: CommandTemplate::new(
                    "gcc",
                    &["-std=c11", "-O2", "-pipe", "{source}", "-o", "{artifact}", "-lm"],
                ),
                produces_artifact: true,
                error_markers: gcc_markers,
            }),
            run: RunStage {
                command: CommandTemplate::new("{artifact}", &[]),
            },
        },
        Toolchain {
            language: Language::Rust,
            file_extension: "rs".to_string(),
            compile: Some(CompileStage {
                command: CommandTemplate::new(
                    "rustc",
                    &["--edition", "2021", "-O", "{source}", "-o", "{artifact}"],
                ),
                produces_artifact: true,
                error_markers: vec!["error:".to_string(), "error[".to_string()],
            }),
            run: RunStage {
                command: CommandTemplate::new("{artifact}", &[]),
            },
        },
        // Interpreters get a parse-only check so syntax errors surface before
        // any of the program runs. compile() writes no bytecode next to the source.
        Toolchain {
            language: Language::Python,
            file_extension: "py".to_string(),
            compile: Some(CompileStage {
                command: CommandTemplate::new("python3", &["-c", PYTHON_CHECK, "{source}"]),
                produces_artifact: false,
                error_markers: vec![],
            }),
            run: RunStage {
                command: CommandTemplate::new("python3", &["{source}"]),
            },
        },
        Toolchain {
            language: Language::JavaScript,
            file_extension: "js".to_string(),
            compile: Some(CompileStage {
                command: CommandTemplate::new("node", &["--check", "{source}"]),
                produces_artifact: false,
                error_markers: vec![],
            }),
            run: RunStage {
                command: CommandTemplate::new("node", &["{source}"]),
            },
        },
        Toolchain {
            language: Language::Shell,
            file_extension: "sh".to_string(),
            compile: Some(CompileStage {
                command: CommandTemplate::new("sh", &["-n", "{source}"]),
                produces_artifact: false,
                error_markers: vec!["Syntax error".to_string(), "syntax error".to_string()],
            }),
            run: RunStage {
                command: CommandTemplate::new("sh", &["{source}"]),
            },
        },
    ]
}
