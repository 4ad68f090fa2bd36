//! afx library
//!
//! Declarative manager for command-line tools and shell plugins: packages
//! are declared in YAML, reconciled against an on-disk state record, and
//! reported or picked from the command line.

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod env;
pub mod error;
pub mod package;
pub mod process_guard;
pub mod selector;
pub mod show;
pub mod state;

pub use config::{AppConfig, LoadedConfig};
pub use context::{Context, Paths};
pub use env::{ConsolePrompter, Environment, Prompt, Prompter, Variable};
pub use error::{AfxError, Result};
pub use package::{Fingerprint, Package, PackageKind, PackageSet, PackageSource};
pub use process_guard::{ChildRegistry, ProcessGuard};
pub use selector::{Filter, select_one};
pub use state::{Bucket, Buckets, Resource, ResourceId, State};
