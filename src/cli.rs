// src/cli.rs
//! CLI definitions for the starnet binary
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand, ValueEnum};
use starnet::{HolonKind, InstallMode, ProviderType};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "starnet")]
#[command(author = "STARNET Contributors")]
#[command(version)]
#[command(about = "Create, publish, install and link holons", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $STARNET_HOME/starnet.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Acting avatar id (default: the id stored in the home directory)
    #[arg(long, global = true)]
    pub actor: Option<Uuid>,

    /// Display name of the acting avatar
    #[arg(long, global = true, default_value = "avatar")]
    pub actor_name: String,

    /// Storage provider for publish (default, local, memory)
    #[arg(long, global = true, default_value = "default")]
    pub provider: ProviderType,

    /// Ask on the terminal when a name is ambiguous or a confirmation is needed
    #[arg(short, long, global = true)]
    pub interactive: bool,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Install modes as accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    DownloadOnly,
    InstallOnly,
    DownloadAndInstall,
    Reinstall,
    DownloadAndReinstall,
}

impl From<ModeArg> for InstallMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::DownloadOnly => InstallMode::DownloadOnly,
            ModeArg::InstallOnly => InstallMode::InstallOnly,
            ModeArg::DownloadAndInstall => InstallMode::DownloadAndInstall,
            ModeArg::Reinstall => InstallMode::ReInstall,
            ModeArg::DownloadAndReinstall => InstallMode::DownloadAndReInstall,
        }
    }
}

/// Which holons `list` shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFilter {
    All,
    Installed,
    Uninstalled,
    Unpublished,
    Deactivated,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new draft holon
    Create {
        /// Holon kind (Library, Runtime, OAPP, Quest, ...)
        kind: HolonKind,
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Initial version (default: 1.0.0)
        #[arg(long)]
        version: Option<String>,

        /// Source directory (default: <home>/Source/<Kind>/<name>)
        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        launch_target: Option<String>,
    },

    /// Change the name, description, category or launch target of a holon
    Update {
        kind: HolonKind,
        /// Name, id or search text
        holon: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Empty string clears the category
        #[arg(long)]
        category: Option<String>,

        /// Empty string clears the launch target
        #[arg(long)]
        launch_target: Option<String>,
    },

    /// Copy a holon's source into a new draft
    Clone {
        kind: HolonKind,
        holon: String,
        /// Name of the new holon
        new_name: String,
    },

    /// Publish the current source as a new revision
    Publish {
        kind: HolonKind,
        /// Name, id or search text
        holon: String,

        /// Version of the new revision (default: the source manifest's)
        #[arg(long)]
        version: Option<String>,
    },

    /// Withdraw the latest published revision
    Unpublish { kind: HolonKind, holon: String },

    /// Publish the last revision again
    Republish { kind: HolonKind, holon: String },

    /// Download a published revision
    Download {
        kind: HolonKind,
        holon: String,

        /// Version sequence (default: latest published)
        #[arg(long)]
        sequence: Option<u32>,
    },

    /// Install a holon from the registry or a package file
    Install {
        kind: HolonKind,
        /// Name, id or search text (ignored with --package)
        #[arg(default_value = "")]
        holon: String,

        #[arg(long, value_enum, default_value = "download-and-install")]
        mode: ModeArg,

        /// Version sequence (default: latest published)
        #[arg(long)]
        sequence: Option<u32>,

        /// Install this package file instead of a registry revision
        #[arg(long)]
        package: Option<PathBuf>,

        /// Install location (default: <home>/Installed/<Kind>/<name>_<id8>_v<version>)
        #[arg(long)]
        dest: Option<PathBuf>,
    },

    /// Uninstall an installed holon (soft, re-installable)
    Uninstall {
        kind: HolonKind,
        holon: String,

        #[arg(long)]
        sequence: Option<u32>,
    },

    /// Permanently delete a holon and everything published from it
    Delete { kind: HolonKind, holon: String },

    /// Show a deactivated holon in listings again
    Activate { kind: HolonKind, holon: String },

    /// Hide a holon from listings and searches
    Deactivate { kind: HolonKind, holon: String },

    /// Search active holons by name and description
    Search {
        kind: HolonKind,
        text: String,

        /// Only holons created by the acting avatar
        #[arg(long)]
        mine: bool,
    },

    /// List every revision of a holon
    Versions { kind: HolonKind, holon: String },

    /// List holons
    List {
        #[arg(long)]
        kind: Option<HolonKind>,

        #[arg(long, value_enum, default_value = "all")]
        filter: ListFilter,
    },

    /// Attach a dependency to a parent holon
    AddDependency {
        parent_kind: HolonKind,
        parent: String,
        kind: HolonKind,
        dependency: String,

        /// Publish an unpublished dependency after confirmation
        #[arg(long)]
        publish_if_needed: bool,
    },

    /// Detach a dependency from a parent holon
    RemoveDependency {
        parent_kind: HolonKind,
        parent: String,
        kind: HolonKind,
        dependency: String,
    },

    /// Show one holon's manifest
    Show { kind: HolonKind, holon: String },
}
