// src/commands.rs
//! Command handlers for the starnet CLI

use crate::cli::{Cli, Commands, ListFilter};
use anyhow::{Context, Result, anyhow};
use starnet::prompt::InteractivePrompt;
use starnet::{
    Artifact, ConfirmationPolicy, CreateRequest, DisambiguationPolicy, EngineConfig,
    EnginePaths, InstallOutcome, InstallRequest, InstalledHolon, LifecycleEngine, LogProgress,
    OperationOptions, Outcome, Session, UpdateRequest,
};
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// File under the home directory holding this machine's default avatar id
const ACTOR_FILE: &str = "actor.id";

/// Avatar id from the flag, else the stored one, else a fresh stored one
fn actor_id(paths: &EnginePaths, flag: Option<Uuid>) -> Result<Uuid> {
    if let Some(actor) = flag {
        return Ok(actor);
    }
    let path = paths.home.join(ACTOR_FILE);
    if let Ok(content) = fs::read_to_string(&path) {
        return Uuid::parse_str(content.trim())
            .with_context(|| format!("Invalid avatar id in {}", path.display()));
    }
    let actor = Uuid::new_v4();
    fs::create_dir_all(&paths.home)?;
    fs::write(&path, actor.to_string())?;
    info!("Created avatar id {} in {}", actor, path.display());
    Ok(actor)
}

fn build_options(cli: &Cli) -> OperationOptions {
    let mut options = OperationOptions::new().with_progress(Arc::new(LogProgress::new("starnet")));

    if cli.interactive && InteractivePrompt::stdin_is_terminal() {
        let prompt = Arc::new(InteractivePrompt::stdio());
        options = options.with_disambiguation(DisambiguationPolicy::Custom(prompt.clone()));
        if !cli.yes {
            options = options.with_confirmation(ConfirmationPolicy::Custom(prompt));
        }
    } else if !cli.yes {
        options = options.with_confirmation(ConfirmationPolicy::Decline);
    }
    options
}

/// Print the value, report a cancellation, or fail with the error message
fn finish<T>(result: starnet::Result<T>, show: impl FnOnce(&T)) -> Result<()> {
    let outcome = Outcome::from(result);
    match outcome.value {
        Some(ref value) => {
            show(value);
            Ok(())
        }
        None if outcome.is_cancelled() => {
            println!("Cancelled: {}", outcome.message);
            Ok(())
        }
        None => Err(anyhow!(outcome.message)),
    }
}

fn print_summary(artifact: &Artifact) {
    let state = if artifact.is_published {
        format!("published #{}", artifact.version_sequence)
    } else {
        "draft".to_string()
    };
    let active = if artifact.is_active { "" } else { " [deactivated]" };
    println!(
        "{} {} v{} ({}) {}{}",
        artifact.kind, artifact.name, artifact.version, artifact.id, state, active
    );
}

fn print_installed(installed: &InstalledHolon) {
    println!(
        "{} {} v{} #{} {} at {}",
        installed.artifact.kind,
        installed.artifact.name,
        installed.artifact.version,
        installed.artifact.version_sequence,
        installed.status.as_str(),
        installed.path.display()
    );
}

fn print_details(artifact: &Artifact) {
    print_summary(artifact);
    if !artifact.description.is_empty() {
        println!("  {}", artifact.description);
    }
    println!("  Created by {} on {}", artifact.created_by_name, artifact.created_on.to_rfc3339());
    if let Some(source) = &artifact.source_path {
        println!("  Source: {}", source.display());
    }
    if let Some(published) = &artifact.published_path {
        println!(
            "  Package: {} ({} bytes, sha256 {})",
            published.display(),
            artifact.published_size,
            artifact.checksum.as_deref().unwrap_or("-")
        );
    }
    println!("  Downloads: {}, installs: {}", artifact.downloads, artifact.installs);
    for (kind, refs) in &artifact.dependencies {
        println!("  {}:", kind.collection_name());
        for dependency in refs {
            println!(
                "    {} v{} ({}) -> {}",
                dependency.target_name,
                dependency.target_version,
                dependency.target_id,
                dependency.installed_to.display()
            );
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = EngineConfig::load_or_default(cli.config.as_deref())?;
    let paths = config.paths();
    let actor = actor_id(&paths, cli.actor)?;
    let session = Session::new(actor, cli.actor_name.clone()).with_provider(cli.provider);
    let options = build_options(&cli);
    debug!("Acting as {} ({}) on {}", session.actor_name, actor, paths.home.display());

    let engine = LifecycleEngine::open(config)?;

    match cli.command {
        Commands::Create {
            kind,
            name,
            description,
            version,
            source,
            category,
            launch_target,
        } => {
            let mut request = CreateRequest::new(kind, name, description);
            request.version = version;
            request.source_dir = source;
            request.category = category;
            request.launch_target = launch_target;
            finish(engine.create(&session, request), |a| {
                print_summary(a);
                if let Some(source) = &a.source_path {
                    println!("Source directory: {}", source.display());
                }
            })
        }
        Commands::Update {
            kind,
            holon,
            name,
            description,
            category,
            launch_target,
        } => {
            let request = UpdateRequest {
                name,
                description,
                category,
                launch_target,
                ..UpdateRequest::default()
            };
            finish(engine.update(&session, kind, &holon, request, &options), print_summary)
        }
        Commands::Clone { kind, holon, new_name } => finish(
            engine.clone_holon(&session, kind, &holon, &new_name, &options),
            |a| {
                print_summary(a);
                if let Some(source) = &a.source_path {
                    println!("Source directory: {}", source.display());
                }
            },
        ),
        Commands::Publish { kind, holon, version } => finish(
            engine.publish(&session, kind, &holon, version.as_deref(), &options),
            print_summary,
        ),
        Commands::Unpublish { kind, holon } => {
            finish(engine.unpublish(&session, kind, &holon, &options), print_summary)
        }
        Commands::Republish { kind, holon } => {
            finish(engine.republish(&session, kind, &holon, &options), print_summary)
        }
        Commands::Download { kind, holon, sequence } => finish(
            engine.download(&session, kind, &holon, sequence, &options),
            |d| println!("Downloaded {} to {}", d.artifact.display_name(), d.path.display()),
        ),
        Commands::Install {
            kind,
            holon,
            mode,
            sequence,
            package,
            dest,
        } => {
            let request = InstallRequest {
                mode: mode.into(),
                version_sequence: sequence,
                package,
                destination: dest,
            };
            finish(
                engine.install(&session, kind, &holon, request, &options),
                |outcome| match outcome {
                    InstallOutcome::Installed(installed) => print_installed(installed),
                    InstallOutcome::Downloaded(d) => {
                        println!("Downloaded {} to {}", d.artifact.display_name(), d.path.display())
                    }
                },
            )
        }
        Commands::Uninstall { kind, holon, sequence } => finish(
            engine.uninstall(&session, kind, &holon, sequence, &options),
            print_installed,
        ),
        Commands::Delete { kind, holon } => {
            let target = engine.load(kind, &holon, &options)?;
            let confirmed = options.confirmation.require(&format!(
                "Permanently delete {} '{}' and all {} published versions?",
                kind, target.name, target.number_of_versions
            ));
            let result = confirmed.and_then(|()| {
                engine.delete(&session, kind, &target.id.to_string(), &options)
            });
            finish(result, |a| println!("Deleted {} '{}'", a.kind, a.name))
        }
        Commands::Activate { kind, holon } => {
            finish(engine.activate(&session, kind, &holon, &options), print_summary)
        }
        Commands::Deactivate { kind, holon } => {
            finish(engine.deactivate(&session, kind, &holon, &options), print_summary)
        }
        Commands::Search { kind, text, mine } => {
            finish(engine.search(&session, kind, &text, mine), |found| {
                for artifact in found {
                    print_summary(artifact);
                }
                println!("{} found", found.len());
            })
        }
        Commands::Versions { kind, holon } => {
            finish(engine.list_versions(kind, &holon, &options), |versions| {
                for revision in versions {
                    let published = if revision.is_published { "" } else { " (unpublished)" };
                    println!(
                        "#{} v{} {}{}",
                        revision.version_sequence,
                        revision.version,
                        revision
                            .published_on
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_default(),
                        published
                    );
                }
            })
        }
        Commands::List { kind, filter } => match filter {
            ListFilter::All => finish(engine.list_all(kind), |all| all.iter().for_each(print_summary)),
            ListFilter::Unpublished => finish(engine.list_unpublished(&session, kind), |all| {
                all.iter().for_each(print_summary)
            }),
            ListFilter::Deactivated => finish(engine.list_deactivated(kind), |all| {
                all.iter().for_each(print_summary)
            }),
            ListFilter::Installed => finish(engine.list_installed(kind), |all| {
                all.iter().for_each(print_installed)
            }),
            ListFilter::Uninstalled => finish(engine.list_uninstalled(kind), |all| {
                all.iter().for_each(print_installed)
            }),
        },
        Commands::AddDependency {
            parent_kind,
            parent,
            kind,
            dependency,
            publish_if_needed,
        } => {
            let options = options.publish_if_needed(publish_if_needed);
            finish(
                engine.add_dependency(&session, parent_kind, &parent, kind, &dependency, &options),
                |r| {
                    println!(
                        "Added {} {} v{} to {} at {}",
                        r.kind,
                        r.target_name,
                        r.target_version,
                        parent,
                        r.installed_to.display()
                    )
                },
            )
        }
        Commands::RemoveDependency {
            parent_kind,
            parent,
            kind,
            dependency,
        } => finish(
            engine.remove_dependency(&session, parent_kind, &parent, kind, &dependency, &options),
            |r| println!("Removed {} {} from {}", r.kind, r.target_name, parent),
        ),
        Commands::Show { kind, holon } => {
            finish(engine.load(kind, &holon, &options), print_details)
        }
    }
}
