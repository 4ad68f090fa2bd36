//! Package selection through an external filter
//!
//! The filter is a single-shot batch program such as `fzf` or `peco`: it
//! reads candidates on stdin and prints the chosen ones on stdout.
//!
//! # Protocol
//!
//! 1. Spawn the filter with the resolved environment plus its own `env`
//! 2. Write every package name, one per line, then close stdin
//! 3. Wait for the filter to exit (optionally bounded by `timeout`)
//! 4. Return the first stdout line that exactly matches a package name
//!
//! Candidates are written while output is drained, so a filter that echoes
//! as it reads (e.g. `cat`) cannot deadlock against a full pipe, and the
//! timeout bounds the whole exchange. A filter that closes stdin early
//! (e.g. `head -1`) is not an error.

use crate::env::Environment;
use crate::error::{AfxError, Result};
use crate::package::{Package, PackageSet};
use crate::process_guard::{CommandDeathSignal, ProcessGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// External filter command configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Seconds to wait before killing the filter; unbounded when unset
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            command: "fzf".to_string(),
            args: vec!["--ansi".to_string(), "--no-preview".to_string()],
            env: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl Filter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_secs().max(1));
        self
    }
}

/// Let the user pick one package with the filter.
///
/// `SelectionNotFound` means the filter ran but printed no known name;
/// `FilterProcessFailed` means the filter itself could not run or failed.
pub fn select_one<'a>(
    packages: &'a PackageSet,
    filter: &Filter,
    env: &Environment,
) -> Result<&'a Package> {
    let input: String = packages.iter().map(|pkg| format!("{}\n", pkg.name)).collect();
    let output = run_filter(filter, env, input.as_bytes())?;

    let selected = match_output(packages, &output)?;
    info!(package = %selected.name, "Package selected");
    Ok(selected)
}

/// First line of `output` that names a package in `packages`
pub fn match_output<'a>(packages: &'a PackageSet, output: &str) -> Result<&'a Package> {
    output
        .lines()
        .find_map(|line| packages.get(line))
        .ok_or(AfxError::SelectionNotFound)
}

/// Run the filter over `input` and return its stdout
pub fn run_filter(filter: &Filter, env: &Environment, input: &[u8]) -> Result<String> {
    let mut cmd = Command::new(&filter.command);
    cmd.args(&filter.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .with_parent_death_signal();
    env.apply_to(&mut cmd);
    cmd.envs(&filter.env);

    debug!(command = %filter.command, args = ?filter.args, "Spawning filter");

    let mut child = cmd
        .spawn()
        .map_err(|e| AfxError::filter(&filter.command, format!("failed to start: {}", e)))?;
    let _guard = ProcessGuard::register(child.id());

    let (Some(mut stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
        kill_and_reap(&mut child);
        return Err(AfxError::filter(&filter.command, "stdio was not captured"));
    };

    // Both pipes are serviced off this thread; the wait below bounds the exchange
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).map(|_| buf)
    });
    let input = input.to_vec();
    // stdin is dropped when the writer returns, so the filter sees EOF
    let writer = thread::spawn(move || match stdin.write_all(&input) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(false),
        Err(e) => Err(e),
    });

    let status = match filter.timeout {
        Some(secs) => match child.wait_timeout(Duration::from_secs(secs)) {
            Ok(Some(status)) => status,
            Ok(None) => {
                kill_and_reap(&mut child);
                return Err(AfxError::filter(
                    &filter.command,
                    format!("timed out after {}s", secs),
                ));
            }
            Err(e) => {
                kill_and_reap(&mut child);
                return Err(AfxError::filter(&filter.command, format!("wait failed: {}", e)));
            }
        },
        None => child
            .wait()
            .map_err(|e| AfxError::filter(&filter.command, format!("wait failed: {}", e)))?,
    };

    let stdout = reader
        .join()
        .map_err(|_| AfxError::filter(&filter.command, "stdout reader panicked"))?
        .map_err(|e| AfxError::filter(&filter.command, format!("failed to read output: {}", e)))?;
    let consumed = writer
        .join()
        .map_err(|_| AfxError::filter(&filter.command, "stdin writer panicked"))?;

    if !status.success() {
        return Err(AfxError::filter(&filter.command, format!("exited with {}", status)));
    }

    match consumed {
        Ok(true) => {}
        Ok(false) => debug!(command = %filter.command, "Filter closed stdin early"),
        Err(e) => {
            return Err(AfxError::filter(
                &filter.command,
                format!("failed to write candidates: {}", e),
            ));
        }
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageSource;

    fn packages(names: &[&str]) -> PackageSet {
        PackageSet::new(
            names
                .iter()
                .map(|name| {
                    Package::new(
                        *name,
                        PackageSource::Http {
                            url: format!("https://example.com/{}", name),
                        },
                    )
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_match_output_first_known_line_wins() {
        let set = packages(&["alpha", "beta", "gamma"]);
        let pkg = match_output(&set, "noise\ngamma\nbeta\n").unwrap();
        assert_eq!(pkg.name, "gamma");
    }

    #[test]
    fn test_match_output_requires_exact_line() {
        let set = packages(&["alpha"]);
        let err = match_output(&set, " alpha\nalph\n").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_match_output_handles_crlf() {
        let set = packages(&["alpha"]);
        assert_eq!(match_output(&set, "alpha\r\n").unwrap().name, "alpha");
    }

    #[test]
    fn test_default_filter_is_fzf() {
        assert_eq!(Filter::default().command, "fzf");
    }
}
