//! Process bootstrap: paths, configuration, environment and state
//!
//! Every command runs against a [`Context`] built once at startup. Building it
//! loads the config root, resolves the environment (prompting only when the
//! loaded packages need it) and opens the state file.

use crate::config::{self, AppConfig};
use crate::env::{Environment, Prompter, Variable};
use crate::error::{AfxError, Result};
use crate::package::PackageSet;
use crate::state::State;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const STATE_FILE: &str = "state.json";

/// Default on-disk layout, derived from the home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
    pub config_root: PathBuf,
    pub command_path: PathBuf,
}

impl Paths {
    pub fn from_home(home: &Path) -> Self {
        Self {
            root: home.join(".afx"),
            config_root: home.join(".config").join("afx"),
            command_path: home.join("bin"),
        }
    }

    pub fn detect() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| AfxError::config("cannot determine home directory"))?;
        Ok(Self::from_home(&home))
    }

    pub fn with_config_root(mut self, config_root: PathBuf) -> Self {
        self.config_root = config_root;
        self
    }
}

/// Variables every afx process resolves, in resolution order
pub fn variables(paths: &Paths) -> Vec<Variable> {
    vec![
        Variable::new("AFX_ROOT").with_default(paths.root.display().to_string()),
        Variable::new("AFX_CONFIG_ROOT").with_value(paths.config_root.display().to_string()),
        Variable::new("AFX_LOG"),
        Variable::new("AFX_LOG_PATH"),
        Variable::new("AFX_COMMAND_PATH").with_default(paths.command_path.display().to_string()),
        Variable::new("AFX_SUDO_PASSWORD").with_prompt(
            PackageSet::has_sudo_in_build_steps,
            "Please enter sudo command password",
            "Some packages build steps requires sudo command",
        ),
        Variable::new("GITHUB_TOKEN").with_prompt(
            PackageSet::has_github_release,
            "Please type your GITHUB_TOKEN",
            "To fetch GitHub Releases, GitHub token is required",
        ),
    ]
}

/// Snapshot of the process environment. Non-UTF-8 entries are skipped.
pub fn process_env() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

/// Everything a command needs
#[derive(Debug)]
pub struct Context {
    pub env: Environment,
    pub packages: PackageSet,
    pub app: AppConfig,
    pub state: State,
}

impl Context {
    /// Load config, resolve the environment and open the state file.
    ///
    /// Creates `AFX_ROOT` and `AFX_COMMAND_PATH` if they do not exist.
    pub fn init(
        paths: &Paths,
        inherited: &HashMap<String, String>,
        prompter: &mut dyn Prompter,
    ) -> Result<Self> {
        let loaded = config::load_dir(&paths.config_root)?;
        debug!(
            files = loaded.files.len(),
            packages = loaded.packages.len(),
            "Configuration loaded"
        );

        let env = Environment::resolve(&variables(paths), &loaded.packages, inherited, prompter)?;

        let root = env_path(&env, "AFX_ROOT", &paths.root);
        let command_path = env_path(&env, "AFX_COMMAND_PATH", &paths.command_path);

        let state = State::open(root.join(STATE_FILE), &loaded.packages)?;

        for dir in [&root, &command_path] {
            fs::create_dir_all(dir)
                .map_err(|e| AfxError::io(format!("create {}", dir.display()), e))?;
        }

        info!(root = %root.display(), "Bootstrap complete");
        Ok(Self {
            env,
            packages: loaded.packages,
            app: loaded.app,
            state,
        })
    }
}

fn env_path(env: &Environment, name: &str, fallback: &Path) -> PathBuf {
    env.get(name)
        .map(PathBuf::from)
        .unwrap_or_else(|| fallback.to_path_buf())
}
