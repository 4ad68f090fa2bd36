//! Environment bootstrap
//!
//! Resolves the variables every other component (and every installer child
//! process) depends on. Resolution happens exactly once at startup:
//!
//! 1. explicit `value` from the descriptor
//! 2. value inherited from the process environment
//! 3. `default` from the descriptor
//! 4. interactive prompt, only if the descriptor's predicate holds
//! 5. otherwise left unset
//!
//! All predicates are evaluated against the package set before the first
//! prompt is shown, so nothing interactive happens for a variable whose
//! predicate is false.

use crate::error::{AfxError, Result};
use crate::package::PackageSet;
use dialoguer::{Password, Select};
use dialoguer::theme::ColorfulTheme;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::process::Command;
use std::sync::OnceLock;
use tracing::debug;

/// Process-wide environment, set once by [`Environment::install`]
static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// Pure gate over an immutable package set
pub type Predicate = fn(&PackageSet) -> bool;

/// Interactive fallback for a variable
#[derive(Debug, Clone)]
pub struct Prompt {
    pub when: Predicate,
    pub message: String,
    pub help: String,
}

/// Environment variable descriptor
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub value: Option<String>,
    pub default: Option<String>,
    pub prompt: Option<Prompt>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            default: None,
            prompt: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_prompt(
        mut self,
        when: Predicate,
        message: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        self.prompt = Some(Prompt {
            when,
            message: message.into(),
            help: help.into(),
        });
        self
    }
}

/// Source of interactive answers
pub trait Prompter {
    /// Ask for a secret value. Blocks until answered or aborted.
    fn ask_secret(&mut self, name: &str, prompt: &Prompt) -> Result<String>;

    /// Pick one of `options`
    fn choose(&mut self, message: &str, options: &[String]) -> Result<String>;
}

/// Prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn ask_secret(&mut self, name: &str, prompt: &Prompt) -> Result<String> {
        eprintln!("  {}", prompt.help);
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt.message.as_str())
            .allow_empty_password(true)
            .interact()
            .map_err(|e| AfxError::input_aborted(name, e))
    }

    fn choose(&mut self, message: &str, options: &[String]) -> Result<String> {
        let index = Select::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .items(options)
            .default(0)
            .interact()
            .map_err(|e| AfxError::input_aborted("selection", e))?;
        options
            .get(index)
            .cloned()
            .ok_or_else(|| AfxError::input_aborted("selection", "index out of range"))
    }
}

/// Resolved variables, immutable once built
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
    secrets: BTreeSet<String>,
}

impl Environment {
    /// Resolve every descriptor in order.
    ///
    /// `inherited` is a snapshot of the process environment; empty values
    /// count as unset. A failed prompt aborts the whole bootstrap.
    pub fn resolve(
        vars: &[Variable],
        packages: &PackageSet,
        inherited: &HashMap<String, String>,
        prompter: &mut dyn Prompter,
    ) -> Result<Self> {
        let gates: Vec<bool> = vars
            .iter()
            .map(|v| v.prompt.as_ref().is_some_and(|p| (p.when)(packages)))
            .collect();

        let mut env = Self::default();
        for (var, gate) in vars.iter().zip(gates) {
            let inherited_value = inherited
                .get(&var.name)
                .filter(|v| !v.is_empty())
                .cloned();

            let (value, source) = if let Some(value) = var.value.clone() {
                (value, "value")
            } else if let Some(value) = inherited_value {
                (value, "inherited")
            } else if let Some(value) = var.default.clone() {
                (value, "default")
            } else if let (true, Some(prompt)) = (gate, var.prompt.as_ref()) {
                let answer = prompter.ask_secret(&var.name, prompt)?;
                env.secrets.insert(var.name.clone());
                (answer, "prompt")
            } else {
                debug!(name = %var.name, "Variable left unset");
                continue;
            };

            debug!(name = %var.name, source, "Variable resolved");
            env.vars.insert(var.name.clone(), value);
        }
        Ok(env)
    }

    /// Build directly from known values (no prompting)
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            secrets: BTreeSet::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Export every resolved variable into a child process
    pub fn apply_to(&self, cmd: &mut Command) {
        cmd.envs(&self.vars);
    }

    /// Publish as the process-wide environment. Fails if already installed.
    pub fn install(self) -> Result<&'static Environment> {
        let mut fresh = false;
        let env = ENVIRONMENT.get_or_init(|| {
            fresh = true;
            self
        });
        if fresh {
            Ok(env)
        } else {
            Err(AfxError::config("environment is already initialized"))
        }
    }

    /// The process-wide environment, if bootstrap has completed
    pub fn global() -> Option<&'static Environment> {
        ENVIRONMENT.get()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.vars {
            if self.secrets.contains(name) {
                map.entry(name, &"<redacted>");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}
