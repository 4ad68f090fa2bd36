//! Configuration discovery and loading.
//!
//! Every `*.yaml` / `*.yml` file under the config root is read in path order.
//! Package lists from all files are concatenated; the last `main` block wins.
//!
//! ```yaml
//! github:
//!   - name: b4b4r07/enhancd
//!     owner: b4b4r07
//!     repo: enhancd
//!     plugin:
//!       sources: [init.sh]
//! main:
//!   filter:
//!     command: fzf
//!     args: [--reverse]
//! ```

use crate::error::{AfxError, Result};
use crate::package::{CommandSpec, Package, PackageSet, PackageSource, PluginSpec, Release};
use crate::selector::Filter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Application-level settings from the `main` block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub filter: Filter,
}

#[derive(Debug, Deserialize)]
struct GitHubEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    owner: String,
    repo: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    release: Option<Release>,
    #[serde(default)]
    command: Option<CommandSpec>,
    #[serde(default)]
    plugin: Option<PluginSpec>,
}

#[derive(Debug, Deserialize)]
struct GistEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    owner: String,
    id: String,
    #[serde(default)]
    command: Option<CommandSpec>,
    #[serde(default)]
    plugin: Option<PluginSpec>,
}

#[derive(Debug, Deserialize)]
struct LocalEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    directory: PathBuf,
    #[serde(default)]
    command: Option<CommandSpec>,
    #[serde(default)]
    plugin: Option<PluginSpec>,
}

#[derive(Debug, Deserialize)]
struct HttpEntry {
    name: String,
    #[serde(default)]
    description: Option<String>,
    url: String,
    #[serde(default)]
    command: Option<CommandSpec>,
    #[serde(default)]
    plugin: Option<PluginSpec>,
}

/// One configuration file as written by the user
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    github: Vec<GitHubEntry>,
    #[serde(default)]
    gist: Vec<GistEntry>,
    #[serde(default)]
    local: Vec<LocalEntry>,
    #[serde(default)]
    http: Vec<HttpEntry>,
    #[serde(default)]
    main: Option<AppConfig>,
}

impl ConfigFile {
    fn split(mut self) -> (Vec<Package>, Option<AppConfig>) {
        let main = self.main.take();
        (self.into_packages(), main)
    }

    fn into_packages(self) -> Vec<Package> {
        let mut packages = Vec::new();

        for e in self.github {
            packages.push(Package {
                name: e.name,
                description: e.description,
                source: PackageSource::GitHub {
                    owner: e.owner,
                    repo: e.repo,
                    branch: e.branch,
                    release: e.release,
                },
                command: e.command,
                plugin: e.plugin,
            });
        }
        for e in self.gist {
            packages.push(Package {
                name: e.name,
                description: e.description,
                source: PackageSource::Gist {
                    owner: e.owner,
                    id: e.id,
                },
                command: e.command,
                plugin: e.plugin,
            });
        }
        for e in self.local {
            packages.push(Package {
                name: e.name,
                description: e.description,
                source: PackageSource::Local {
                    directory: e.directory,
                },
                command: e.command,
                plugin: e.plugin,
            });
        }
        for e in self.http {
            packages.push(Package {
                name: e.name,
                description: e.description,
                source: PackageSource::Http { url: e.url },
                command: e.command,
                plugin: e.plugin,
            });
        }

        packages
    }
}

/// Everything loaded from the config root
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub packages: PackageSet,
    pub app: AppConfig,
    pub files: Vec<PathBuf>,
}

/// Parse a single YAML document into its packages and optional `main` block
pub fn parse_str(content: &str) -> Result<(Vec<Package>, Option<AppConfig>)> {
    let file = parse_file(content).map_err(|e| AfxError::config(e.to_string()))?;
    Ok(file.split())
}

fn parse_file(content: &str) -> std::result::Result<ConfigFile, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(content)
}

/// Load every YAML file under `root`.
///
/// A missing root yields an empty configuration.
pub fn load_dir(root: &Path) -> Result<LoadedConfig> {
    if !root.exists() {
        warn!(root = %root.display(), "Config root does not exist, no packages configured");
        return Ok(LoadedConfig::default());
    }

    let mut packages = Vec::new();
    let mut app = AppConfig::default();
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            AfxError::config(format!("failed to walk {}: {}", root.display(), e))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_yaml(path) {
            continue;
        }

        let content = fs::read_to_string(path)
            .map_err(|e| AfxError::io(format!("read {}", path.display()), e))?;
        let (pkgs, main) = parse_file(&content)
            .map_err(|e| AfxError::config(format!("{}: {}", path.display(), e)))?
            .split();

        debug!(file = %path.display(), packages = pkgs.len(), "Loaded config file");
        packages.extend(pkgs);
        if let Some(main) = main {
            app = main;
        }
        files.push(path.to_path_buf());
    }

    Ok(LoadedConfig {
        packages: PackageSet::new(packages)?,
        app,
        files,
    })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageKind;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
github:
  - name: b4b4r07/enhancd
    owner: b4b4r07
    repo: enhancd
    plugin:
      sources: [init.sh]
  - name: cli/cli
    owner: cli
    repo: cli
    release:
      name: gh
      tag: v2.0.0
    command:
      link:
        - from: gh
local:
  - name: zsh
    directory: ~/.zsh
"#;

    #[test]
    fn test_parse_sample() {
        let (packages, main) = parse_str(SAMPLE).unwrap();
        assert!(main.is_none());
        assert_eq!(packages.len(), 3);
        assert_eq!(packages[0].kind(), PackageKind::GitHub);
        assert!(packages[1].has_github_release());
        assert_eq!(packages[2].kind(), PackageKind::Local);
    }

    #[test]
    fn test_parse_rejects_unknown_sections() {
        assert!(parse_str("bogus: []").is_err());
    }

    #[test]
    fn test_load_dir_merges_files_and_last_main_wins() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), SAMPLE).unwrap();
        fs::write(
            dir.path().join("b.yml"),
            "http:\n  - name: tool\n    url: https://example.com/tool\nmain:\n  filter:\n    command: peco\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let loaded = load_dir(dir.path()).unwrap();
        assert_eq!(loaded.packages.len(), 4);
        assert_eq!(loaded.app.filter.command, "peco");
        assert_eq!(loaded.files.len(), 2);
    }

    #[test]
    fn test_load_dir_rejects_duplicates_across_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), SAMPLE).unwrap();
        fs::write(dir.path().join("b.yaml"), SAMPLE).unwrap();

        let err = load_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate package name"));
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let loaded = load_dir(&dir.path().join("absent")).unwrap();
        assert!(loaded.packages.is_empty());
        assert_eq!(loaded.app, AppConfig::default());
    }
}
