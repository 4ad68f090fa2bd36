//! Package descriptors and the desired-state package set.
//!
//! A package is identified by its name alone. The kind-specific payload lives
//! in [`PackageSource`]; the reconciliation engine only ever looks at
//! [`Package::name`], [`Package::kind`] and [`Package::fingerprint`].

use crate::error::{AfxError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use strum::{Display, EnumIter, EnumString};

/// Package kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
pub enum PackageKind {
    #[strum(serialize = "GitHub")]
    GitHub,
    #[strum(serialize = "Gist")]
    Gist,
    #[strum(serialize = "Local")]
    Local,
    #[strum(serialize = "HTTP")]
    #[serde(rename = "HTTP")]
    Http,
}

impl PackageKind {
    /// Lowercase prefix used in resource identifiers
    pub const fn id_prefix(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Gist => "gist",
            Self::Local => "local",
            Self::Http => "http",
        }
    }
}

/// GitHub release asset to fetch instead of cloning the repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Where a package comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PackageSource {
    GitHub {
        owner: String,
        repo: String,
        #[serde(default)]
        branch: Option<String>,
        #[serde(default)]
        release: Option<Release>,
    },
    Gist {
        owner: String,
        id: String,
    },
    Local {
        directory: PathBuf,
    },
    #[serde(rename = "HTTP")]
    Http {
        url: String,
    },
}

/// Shell commands run after fetching, before linking
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
}

/// Install steps for packages that provide executables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub build: Option<Build>,
    #[serde(default)]
    pub link: Vec<Link>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub alias: BTreeMap<String, String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Install steps for packages sourced into the shell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Content hash of a package descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The hashed part of a [`Package`]
#[derive(Serialize)]
struct InstallView<'a> {
    name: &'a str,
    source: &'a PackageSource,
    command: &'a Option<CommandSpec>,
    plugin: &'a Option<PluginSpec>,
}

/// A declaratively configured tool or plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source: PackageSource,
    #[serde(default)]
    pub command: Option<CommandSpec>,
    #[serde(default)]
    pub plugin: Option<PluginSpec>,
}

impl Package {
    /// Create a package with no install steps
    pub fn new(name: impl Into<String>, source: PackageSource) -> Self {
        Self {
            name: name.into(),
            description: None,
            source,
            command: None,
            plugin: None,
        }
    }

    pub fn with_command(mut self, command: CommandSpec) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_plugin(mut self, plugin: PluginSpec) -> Self {
        self.plugin = Some(plugin);
        self
    }

    pub fn kind(&self) -> PackageKind {
        match self.source {
            PackageSource::GitHub { .. } => PackageKind::GitHub,
            PackageSource::Gist { .. } => PackageKind::Gist,
            PackageSource::Local { .. } => PackageKind::Local,
            PackageSource::Http { .. } => PackageKind::Http,
        }
    }

    /// SHA-256 over the canonical JSON encoding of the fields that drive
    /// installation. `description` is not hashed.
    ///
    /// All maps in the descriptor are `BTreeMap`, so the encoding is stable
    /// across runs.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let view = InstallView {
            name: &self.name,
            source: &self.source,
            command: &self.command,
            plugin: &self.plugin,
        };
        let mut hasher = Sha256::new();
        serde_json::to_writer(&mut hasher, &view)?;
        Ok(Fingerprint(hex::encode(hasher.finalize())))
    }

    /// True if any build step invokes sudo
    pub fn uses_sudo(&self) -> bool {
        self.command
            .as_ref()
            .and_then(|c| c.build.as_ref())
            .is_some_and(|b| {
                b.steps
                    .iter()
                    .any(|step| step.split_whitespace().any(|word| word == "sudo"))
            })
    }

    /// True if the package is fetched from GitHub Releases
    pub fn has_github_release(&self) -> bool {
        matches!(
            self.source,
            PackageSource::GitHub {
                release: Some(_),
                ..
            }
        )
    }
}

/// The desired state: uniquely named packages in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageSet {
    packages: Vec<Package>,
}

impl PackageSet {
    /// Build a set, rejecting empty or duplicate names
    pub fn new(packages: Vec<Package>) -> Result<Self> {
        let mut seen = HashSet::new();
        for pkg in &packages {
            if pkg.name.trim().is_empty() {
                return Err(AfxError::config(format!(
                    "package of kind {} has an empty name",
                    pkg.kind()
                )));
            }
            if !seen.insert(pkg.name.as_str()) {
                return Err(AfxError::config(format!(
                    "duplicate package name: {}",
                    pkg.name
                )));
            }
        }
        Ok(Self { packages })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Package> {
        self.packages.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|pkg| pkg.name == name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Does any package require elevated-privilege build steps
    pub fn has_sudo_in_build_steps(&self) -> bool {
        self.packages.iter().any(Package::uses_sudo)
    }

    /// Does any package require a remote-release fetch
    pub fn has_github_release(&self) -> bool {
        self.packages.iter().any(Package::has_github_release)
    }
}

impl<'a> IntoIterator for &'a PackageSet {
    type Item = &'a Package;
    type IntoIter = std::slice::Iter<'a, Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}
