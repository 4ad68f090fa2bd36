use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// afx - declarative command-line tool and shell plugin manager
#[derive(Parser, Debug)]
#[command(name = "afx")]
#[command(about = "Manage command-line tools and shell plugins declared in YAML")]
#[command(version)]
pub struct Cli {
    /// Config root to read instead of ~/.config/afx
    #[arg(long, global = true)]
    pub config_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show packages managed by afx
    Show,
    /// Pick a package with the configured filter and print its name
    Select,
    /// Advanced state management
    #[command(hide = true)]
    State {
        #[command(subcommand)]
        action: StateCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// List your state items
    List,
    /// Refresh your state file
    Refresh {
        /// Discard history and rebuild the state from the current config
        #[arg(long)]
        force: bool,
    },
    /// Remove selected packages from state file
    #[command(visible_alias = "rm")]
    Remove {
        /// Package names or ids; prompts for one when omitted
        names: Vec<String>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
