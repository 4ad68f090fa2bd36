//! Persistent install state and reconciliation
//!
//! This module is the single source of truth for what afx believes is
//! installed. On every run the desired [`PackageSet`] is diffed against the
//! record written by the previous run, producing four buckets:
//!
//! ```text
//!                 in record        not in record
//! in config    Changes/NoChanges     Additions
//! not in cfg      Deletions             -
//! ```
//!
//! # Invariants
//!
//! - **Partition**: every name in (config ∪ record) lands in exactly one bucket
//! - **Atomic writes**: the state file is only ever replaced by rename, so a
//!   reader sees either the old record or the new one, never a torn file
//! - **Derived buckets**: buckets are recomputed after every mutation and are
//!   never written to disk

use crate::error::{AfxError, Result};
use crate::package::{Fingerprint, Package, PackageKind, PackageSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// On-disk format version
pub const STATE_VERSION: u32 = 1;

/// Opaque identifier used for targeted removal.
///
/// Known ids are `"<kind>.<name>"`. Kind prefixes never contain a dot, so the
/// mapping is injective over package names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Known(String),
    /// Returned by [`State::to_id`] for input that matches nothing
    Unknown,
}

impl ResourceId {
    pub fn for_package(kind: PackageKind, name: &str) -> Self {
        Self::Known(format!("{}.{}", kind.id_prefix(), name))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(id) => f.write_str(id),
            Self::Unknown => f.write_str("<unknown>"),
        }
    }
}

/// Reconciliation outcome for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Bucket {
    Additions,
    Changes,
    Deletions,
    NoChanges,
}

/// One persisted record entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub kind: PackageKind,
    pub fingerprint: Fingerprint,
    /// Seconds since UNIX_EPOCH when this entry was first recorded
    #[serde(default)]
    pub recorded_at: u64,
}

/// A package as seen by the reconciliation engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub kind: PackageKind,
    pub fingerprint: Fingerprint,
}

/// The four disjoint reconciliation buckets, each sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets {
    pub additions: Vec<Resource>,
    pub changes: Vec<Resource>,
    pub deletions: Vec<Resource>,
    pub no_changes: Vec<Resource>,
}

impl Buckets {
    /// Every resource with its bucket, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = (Bucket, &Resource)> {
        let mut all: Vec<(Bucket, &Resource)> = self
            .additions
            .iter()
            .map(|r| (Bucket::Additions, r))
            .chain(self.changes.iter().map(|r| (Bucket::Changes, r)))
            .chain(self.deletions.iter().map(|r| (Bucket::Deletions, r)))
            .chain(self.no_changes.iter().map(|r| (Bucket::NoChanges, r)))
            .collect();
        all.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        all.into_iter()
    }

    pub fn len(&self) -> usize {
        self.additions.len() + self.changes.len() + self.deletions.len() + self.no_changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if there is nothing to install, update or uninstall
    pub fn is_settled(&self) -> bool {
        self.additions.is_empty() && self.changes.is_empty() && self.deletions.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Desired {
    kind: PackageKind,
    fingerprint: Fingerprint,
}

#[derive(Deserialize)]
struct StateFile {
    version: u32,
    #[serde(default)]
    resources: BTreeMap<String, Entry>,
}

#[derive(Serialize)]
struct StateFileRef<'a> {
    version: u32,
    resources: &'a BTreeMap<String, Entry>,
}

/// Reconciled install state backed by a JSON file
#[derive(Debug, Clone)]
pub struct State {
    path: PathBuf,
    desired: BTreeMap<String, Desired>,
    record: BTreeMap<String, Entry>,
    buckets: Buckets,
}

impl State {
    /// Load the previous record from `path`, diff it against `packages`, and
    /// write the record back before returning.
    ///
    /// A missing or empty file is an empty record. An unparsable file is
    /// [`AfxError::StateCorrupt`] and is left untouched.
    pub fn open(path: impl Into<PathBuf>, packages: &PackageSet) -> Result<Self> {
        let path = path.into();
        let record = load_record(&path)?;

        let mut desired = BTreeMap::new();
        for pkg in packages {
            desired.insert(
                pkg.name.clone(),
                Desired {
                    kind: pkg.kind(),
                    fingerprint: pkg.fingerprint()?,
                },
            );
        }

        let mut state = Self {
            path,
            desired,
            record,
            buckets: Buckets::default(),
        };
        state.recompute();
        state.save()?;

        info!(
            path = %state.path.display(),
            additions = state.buckets.additions.len(),
            changes = state.buckets.changes.len(),
            deletions = state.buckets.deletions.len(),
            no_changes = state.buckets.no_changes.len(),
            "State opened"
        );
        Ok(state)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buckets(&self) -> &Buckets {
        &self.buckets
    }

    pub fn additions(&self) -> &[Resource] {
        &self.buckets.additions
    }

    pub fn changes(&self) -> &[Resource] {
        &self.buckets.changes
    }

    pub fn deletions(&self) -> &[Resource] {
        &self.buckets.deletions
    }

    pub fn no_changes(&self) -> &[Resource] {
        &self.buckets.no_changes
    }

    /// Bucket a name currently falls into, if it is known at all
    pub fn bucket_of(&self, name: &str) -> Option<Bucket> {
        self.buckets
            .iter()
            .find(|(_, r)| r.name == name)
            .map(|(bucket, _)| bucket)
    }

    /// The persisted entry for a name
    pub fn recorded(&self, name: &str) -> Option<&Entry> {
        self.record.get(name)
    }

    /// One `"<id> (<bucket>)"` line per known package, sorted by name.
    ///
    /// Every line round-trips through [`State::to_id`].
    pub fn list(&self) -> Vec<String> {
        self.buckets
            .iter()
            .map(|(bucket, r)| format!("{} ({})", r.id, bucket))
            .collect()
    }

    /// Resolve a package name, an id, or a [`State::list`] line to an id.
    ///
    /// A list line is matched against ids only. Otherwise an exact id wins
    /// over a package name. Names resolve with the configured kind, falling
    /// back to the recorded kind for packages no longer configured.
    pub fn to_id(&self, input: &str) -> ResourceId {
        let input = input.trim();

        if let Some(id) = strip_annotation(input) {
            return self
                .resolve_id(id)
                .map(|(kind, name)| ResourceId::for_package(kind, name))
                .unwrap_or(ResourceId::Unknown);
        }

        self.resolve_id(input)
            .or_else(|| self.kinds_of(input).next().map(|kind| (kind, input)))
            .map(|(kind, name)| ResourceId::for_package(kind, name))
            .unwrap_or(ResourceId::Unknown)
    }

    /// Delete a record entry in memory. Does not persist.
    ///
    /// Either the configured or the recorded kind identifies an entry, so a
    /// package whose kind changed can be removed by its current id. Returns
    /// `false` when nothing was removed, which covers unknown ids and
    /// repeated removals of the same id.
    pub fn remove(&mut self, id: &ResourceId) -> bool {
        let ResourceId::Known(wanted) = id else {
            return false;
        };

        let Some(name) = self.resolve_id(wanted).map(|(_, name)| name.to_string()) else {
            debug!(id = %wanted, "No such resource, nothing to remove");
            return false;
        };

        if self.record.remove(&name).is_some() {
            self.recompute();
            debug!(id = %wanted, "Removed resource from state");
            true
        } else {
            debug!(id = %wanted, "Resource not in state, nothing to remove");
            false
        }
    }

    /// Kinds a name is known under: configured first, then recorded
    fn kinds_of(&self, name: &str) -> impl Iterator<Item = PackageKind> {
        self.desired
            .get(name)
            .map(|d| d.kind)
            .into_iter()
            .chain(self.record.get(name).map(|e| e.kind))
    }

    /// Split `"<prefix>.<name>"` and check the name is known under that kind
    fn resolve_id<'a>(&self, id: &'a str) -> Option<(PackageKind, &'a str)> {
        let (prefix, name) = id.split_once('.')?;
        self.kinds_of(name)
            .find(|kind| kind.id_prefix() == prefix)
            .map(|kind| (kind, name))
    }

    /// Record a successful install. Does not persist.
    pub fn add(&mut self, pkg: &Package) -> Result<()> {
        let entry = entry_for(pkg.kind(), &pkg.name, pkg.fingerprint()?, unix_now());
        self.record.insert(pkg.name.clone(), entry);
        self.recompute();
        Ok(())
    }

    /// Record a successful update, keeping the first `recorded_at`. Does not persist.
    pub fn update(&mut self, pkg: &Package) -> Result<()> {
        let recorded_at = self
            .record
            .get(&pkg.name)
            .map(|e| e.recorded_at)
            .unwrap_or_else(unix_now);
        let entry = entry_for(pkg.kind(), &pkg.name, pkg.fingerprint()?, recorded_at);
        self.record.insert(pkg.name.clone(), entry);
        self.recompute();
        Ok(())
    }

    /// Accept the current configuration as the new baseline.
    ///
    /// Every configured package becomes NoChanges; entries for packages no
    /// longer configured are dropped; surviving entries keep `recorded_at`.
    /// On failure neither the file nor the in-memory record changes.
    pub fn refresh(&mut self) -> Result<()> {
        let now = unix_now();
        let next: BTreeMap<String, Entry> = self
            .desired
            .iter()
            .map(|(name, d)| {
                let recorded_at = self.record.get(name).map(|e| e.recorded_at).unwrap_or(now);
                (
                    name.clone(),
                    entry_for(d.kind, name, d.fingerprint.clone(), recorded_at),
                )
            })
            .collect();

        write_record(&self.path, &next).map_err(|e| AfxError::RefreshFailed(Box::new(e)))?;
        self.record = next;
        self.recompute();
        info!(path = %self.path.display(), "State refreshed");
        Ok(())
    }

    /// Discard history and write a fresh baseline of the current configuration.
    pub fn reset(&mut self) -> Result<()> {
        let now = unix_now();
        let next: BTreeMap<String, Entry> = self
            .desired
            .iter()
            .map(|(name, d)| (name.clone(), entry_for(d.kind, name, d.fingerprint.clone(), now)))
            .collect();

        write_record(&self.path, &next)?;
        self.record = next;
        self.recompute();
        info!(path = %self.path.display(), "State reset");
        Ok(())
    }

    /// Atomically write the in-memory record to disk
    pub fn save(&self) -> Result<()> {
        write_record(&self.path, &self.record)
    }

    fn recompute(&mut self) {
        self.buckets = reconcile(&self.desired, &self.record);
    }
}

fn reconcile(desired: &BTreeMap<String, Desired>, record: &BTreeMap<String, Entry>) -> Buckets {
    let mut buckets = Buckets::default();

    for (name, d) in desired {
        let resource = Resource {
            id: ResourceId::for_package(d.kind, name),
            name: name.clone(),
            kind: d.kind,
            fingerprint: d.fingerprint.clone(),
        };
        match record.get(name) {
            None => buckets.additions.push(resource),
            Some(entry) if entry.fingerprint != d.fingerprint => buckets.changes.push(resource),
            Some(_) => buckets.no_changes.push(resource),
        }
    }

    for (name, entry) in record {
        if !desired.contains_key(name) {
            buckets.deletions.push(Resource {
                id: ResourceId::for_package(entry.kind, name),
                name: name.clone(),
                kind: entry.kind,
                fingerprint: entry.fingerprint.clone(),
            });
        }
    }

    buckets
}

fn entry_for(kind: PackageKind, name: &str, fingerprint: Fingerprint, recorded_at: u64) -> Entry {
    Entry {
        id: ResourceId::for_package(kind, name).to_string(),
        kind,
        fingerprint,
        recorded_at,
    }
}

/// The id part of a [`State::list`] line, if `input` carries a bucket suffix
fn strip_annotation(input: &str) -> Option<&str> {
    let (id, bucket) = input.strip_suffix(')')?.rsplit_once(" (")?;
    bucket.parse::<Bucket>().ok().map(|_| id)
}

fn load_record(path: &Path) -> Result<BTreeMap<String, Entry>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state file, starting from an empty record");
            return Ok(BTreeMap::new());
        }
        Err(e) => return Err(AfxError::io(format!("read {}", path.display()), e)),
    };

    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let corrupt = |reason: String| AfxError::StateCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let file: StateFile = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
    if file.version > STATE_VERSION {
        return Err(corrupt(format!(
            "unsupported version {} (expected at most {})",
            file.version, STATE_VERSION
        )));
    }

    let mut resources = file.resources;
    for (name, entry) in resources.iter_mut() {
        if name.trim().is_empty() {
            return Err(corrupt("entry with an empty package name".to_string()));
        }
        entry.id = ResourceId::for_package(entry.kind, name).to_string();
    }
    Ok(resources)
}

fn write_record(path: &Path, resources: &BTreeMap<String, Entry>) -> Result<()> {
    let json = serde_json::to_vec_pretty(&StateFileRef {
        version: STATE_VERSION,
        resources,
    })?;
    write_atomic(path, &json)?;
    debug!(path = %path.display(), entries = resources.len(), "State written");
    Ok(())
}

/// Write to a temporary file in the target's directory, fsync, then rename
/// over the target.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| AfxError::io(format!("create {}", dir.display()), e))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| AfxError::io(format!("create temporary file in {}", dir.display()), e))?;
    tmp.write_all(contents)
        .map_err(|e| AfxError::io("write state", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| AfxError::io("sync state", e))?;
    tmp.persist(path)
        .map_err(|e| AfxError::io(format!("replace {}", path.display()), e.error))?;
    Ok(())
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
