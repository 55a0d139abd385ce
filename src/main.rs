//! reagent CLI - rule-driven automation agent.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use reagent::agent::{Agent, TickInput};
use reagent::cli::args::{CheckArgs, InitArgs, RunArgs, StatusArgs};
use reagent::cli::{Cli, Command};
use reagent::config::{default_settings_path, load_settings, save_settings, Settings};
use reagent::lua::LuaEngine;
use reagent::profile::Profile;
use reagent::state::WorldState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init(args) => run_init(args),
        Command::Check(args) => run_check(args),
        Command::Status(args) => run_status(args),
        Command::Run(args) => run_ticks(args).await,
    }
}

fn settings_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => default_settings_path(),
    }
}

fn read_settings(explicit: Option<PathBuf>) -> Result<Settings> {
    let path = settings_path(explicit)?;
    load_settings(&path).context("No usable settings, run `reagent init` first")
}

fn select_profile(settings: &mut Settings, requested: Option<String>) -> Result<&mut Profile> {
    match requested {
        Some(name) => settings
            .profile_mut(&name)
            .with_context(|| format!("Profile '{name}' not found")),
        None => Ok(settings.ensure_current_profile()),
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    let path = settings_path(args.settings)?;
    if path.exists() {
        if args.if_needed {
            println!("Settings already exist at {}", path.display());
            return Ok(());
        }
        bail!(
            "Settings already exist at {}, pass --if-needed to keep them",
            path.display()
        );
    }

    let mut settings = Settings::default();
    settings.ensure_current_profile();
    save_settings(&settings, &path)?;
    println!("Initialized settings at {}", path.display());
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<()> {
    let mut settings = read_settings(args.settings)?;
    let profile = select_profile(&mut settings, args.profile)?;
    let engine = LuaEngine::new()?;

    let mut total = 0;
    let mut failures = 0;
    for group in profile.groups_mut() {
        let group_name = group.name.clone();
        for (index, rule) in group.rules_mut().iter_mut().enumerate() {
            total += 1;
            match rule.compile(&engine) {
                Some(error) => {
                    failures += 1;
                    println!("FAIL  {group_name} #{}: {error}", index + 1);
                }
                None => println!("ok    {group_name} #{}", index + 1),
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {total} rules failed to compile");
    }
    println!("All {total} rules compile");
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<()> {
    let settings = read_settings(args.settings)?;

    println!(
        "Agent: {}",
        if settings.enable { "enabled" } else { "disabled" }
    );
    println!(
        "Key press cooldown: {} ms",
        settings.key_press_cooldown().as_millis()
    );
    for (name, profile) in &settings.profiles {
        let marker = if *name == settings.current_profile {
            " (current)"
        } else {
            ""
        };
        println!("Profile '{name}'{marker}: {} rules", profile.rule_count());
        for group in profile.groups() {
            println!(
                "  [{}] {} {} - {} rules",
                if group.enabled { "x" } else { " " },
                group.name,
                group.area_marker(),
                group.rules().len()
            );
        }
    }
    Ok(())
}

fn load_snapshots(path: &Path) -> Result<Vec<WorldState>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;

    let snapshots = match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<WorldState>, _>>()
            .context("Invalid world snapshot")?,
        single => vec![serde_json::from_value(single).context("Invalid world snapshot")?],
    };

    if snapshots.is_empty() {
        bail!("{} contains no snapshots", path.display());
    }
    Ok(snapshots)
}

async fn run_ticks(args: RunArgs) -> Result<()> {
    let snapshots = load_snapshots(&args.snapshot)?;
    let mut settings = read_settings(args.settings)?;
    let agent_settings = settings.agent_settings();
    let profile = select_profile(&mut settings, args.profile)?;

    let mut agent = Agent::new(LuaEngine::new()?, agent_settings);
    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));

    info!(snapshots = snapshots.len(), "Starting agent");
    let mut tick: u64 = 0;
    while args.ticks.map_or(true, |limit| tick < limit) {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }

        // The last snapshot repeats once the list is exhausted.
        let world = usize::try_from(tick)
            .ok()
            .and_then(|index| snapshots.get(index))
            .or(snapshots.last())
            .context("No snapshot to tick against")?;
        let output = agent.tick(profile, world, TickInput::at(Instant::now()));
        println!("{}", serde_json::to_string(&output)?);
        tick += 1;
    }

    for group in profile.groups() {
        for rule in group.rules() {
            if let Some(fault) = rule.fault() {
                warn!(group = %group.name, "{fault}");
            }
        }
    }
    Ok(())
}
