//! Command handlers
//!
//! Handlers write user-facing output to the given writers so they can be
//! driven from tests; `main` passes stdout and stderr.

use crate::context::Context;
use crate::env::Prompter;
use crate::selector;
use crate::show;
use anyhow::{Context as _, Result};
use std::io::Write;
use tracing::{info, warn};

/// Print the NAME / TYPE / STATUS table
pub fn show(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let rows = show::rows(&ctx.state);
    writeln!(out, "{}", show::render(&rows))?;
    Ok(())
}

/// Run the configured filter and print the chosen package name
pub fn select(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    let pkg = selector::select_one(&ctx.packages, &ctx.app.filter, &ctx.env)
        .with_context(|| format!("failed to select a package with {}", ctx.app.filter.command))?;
    writeln!(out, "{}", pkg.name)?;
    Ok(())
}

pub fn state_list(ctx: &Context, out: &mut dyn Write) -> Result<()> {
    for line in ctx.state.list() {
        writeln!(out, "{}", line)?;
    }
    Ok(())
}

/// Rewrite the state file from the current config.
///
/// `force` discards recorded install times as well.
pub fn state_refresh(ctx: &mut Context, force: bool, out: &mut dyn Write) -> Result<()> {
    if force {
        ctx.state.reset().context("failed to reset state")?;
    } else {
        ctx.state.refresh()?;
    }
    info!(force, "State refreshed");
    writeln!(out, "Successfully refreshed")?;
    Ok(())
}

/// Drop entries from the state file.
///
/// With no `names` the user picks one entry interactively. Names that do not
/// resolve to a recorded entry are reported on `err` and skipped.
pub fn state_remove(
    ctx: &mut Context,
    names: &[String],
    prompter: &mut dyn Prompter,
    err: &mut dyn Write,
) -> Result<()> {
    let targets = if names.is_empty() {
        let items = ctx.state.list();
        if items.is_empty() {
            writeln!(err, "state is empty, nothing to remove")?;
            return Ok(());
        }
        vec![prompter.choose("Choose a package:", &items)?]
    } else {
        names.to_vec()
    };

    for target in &targets {
        let id = ctx.state.to_id(target);
        if id.is_unknown() {
            warn!(input = %target, "No such resource in state");
            writeln!(err, "warning: {}: not found in state, skipped", target)?;
            continue;
        }
        if ctx.state.remove(&id) {
            info!(id = %id, "Removed from state");
        } else {
            writeln!(err, "warning: {}: not recorded in state, skipped", id)?;
        }
    }

    ctx.state.save().context("failed to save state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::env::{Environment, Prompt};
    use crate::error::AfxError;
    use crate::package::{Package, PackageSet, PackageSource};
    use crate::state::{Bucket, State};
    use tempfile::TempDir;

    struct Pick(Option<String>);

    impl Prompter for Pick {
        fn ask_secret(&mut self, name: &str, _prompt: &Prompt) -> crate::error::Result<String> {
            Err(AfxError::input_aborted(name, "not interactive"))
        }

        fn choose(&mut self, message: &str, options: &[String]) -> crate::error::Result<String> {
            let wanted = self
                .0
                .take()
                .ok_or_else(|| AfxError::input_aborted(message, "no answer"))?;
            options
                .iter()
                .find(|o| o.contains(&wanted))
                .cloned()
                .ok_or_else(|| AfxError::input_aborted(message, "no such option"))
        }
    }

    fn local(name: &str) -> Package {
        Package::new(
            name,
            PackageSource::Local {
                directory: format!("/opt/{}", name).into(),
            },
        )
    }

    fn context(dir: &TempDir, names: &[&str]) -> Context {
        let packages = PackageSet::new(names.iter().map(|n| local(n)).collect()).unwrap();
        let mut state = State::open(dir.path().join("state.json"), &packages).unwrap();
        for pkg in &packages {
            state.add(pkg).unwrap();
        }
        state.save().unwrap();
        Context {
            env: Environment::default(),
            packages,
            app: AppConfig::default(),
            state,
        }
    }

    #[test]
    fn test_state_list_prints_ids() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir, &["zsh"]);
        let mut out = Vec::new();
        state_list(&ctx, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "local.zsh (NoChanges)\n");
    }

    #[test]
    fn test_remove_by_name_persists() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, &["a", "b"]);
        let mut err = Vec::new();

        state_remove(&mut ctx, &["a".to_string()], &mut Pick(None), &mut err).unwrap();

        assert!(err.is_empty());
        assert_eq!(ctx.state.bucket_of("a"), Some(Bucket::Additions));
        let reopened = State::open(dir.path().join("state.json"), &ctx.packages).unwrap();
        assert!(reopened.recorded("a").is_none());
        assert!(reopened.recorded("b").is_some());
    }

    #[test]
    fn test_remove_unknown_warns_and_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, &["a"]);
        let mut err = Vec::new();

        state_remove(&mut ctx, &["ghost".to_string()], &mut Pick(None), &mut err).unwrap();

        let msg = String::from_utf8(err).unwrap();
        assert!(msg.contains("ghost"));
        assert!(ctx.state.recorded("a").is_some());
    }

    #[test]
    fn test_remove_without_names_prompts() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, &["a", "b"]);
        let mut err = Vec::new();

        state_remove(&mut ctx, &[], &mut Pick(Some("local.b".into())), &mut err).unwrap();

        assert!(ctx.state.recorded("b").is_none());
        assert!(ctx.state.recorded("a").is_some());
    }

    #[test]
    fn test_refresh_prints_success() {
        let dir = TempDir::new().unwrap();
        let mut ctx = context(&dir, &["a"]);
        let mut out = Vec::new();
        state_refresh(&mut ctx, false, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Successfully refreshed\n");
    }
}
