//! cgraph CLI - task dependency graphs from source comments.
//!
//! Usage:
//!   cgraph scan [--json]          # Scan and summarize (uses the snapshot cache)
//!   cgraph check                  # Fail on diagnostics or manifest drift
//!   cgraph generate [--format json] # Write .comment-graph (or .comment-graph.json)
//!   cgraph deps <id>              # Dependencies and dependents of a task
//!   cgraph order                  # Tasks in dependency order
//!   cgraph watch                  # Rescan on change until stdin closes
//!   cgraph fix                    # Add placeholder ids to bare TODOs
//!   cgraph set-deps <id> <dep>... # Rewrite a task's dependency line
//!   cgraph detach <id> <dep>|--all # Drop dependencies of a task

use anyhow::Result;
use clap::Parser;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use cgraph::cli::{
    format_deps, format_diagnostics, format_summary, Cli, Commands, ScanReport, EXIT_DIAGNOSTICS,
    EXIT_DRIFT, EXIT_OK,
};
use cgraph::config::{GraphConfig, StrictPolicy, CONFIG_DIR};
use cgraph::{
    detach_deps, fix_missing_ids, update_deps, update_deps_allow_empty, GraphError, Manifest,
    ManifestFormat, ScanOptions, Scanner, Snapshot, SnapshotStore,
};
use tracing::{info, warn};

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_DIAGNOSTICS);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = cli.root.canonicalize().unwrap_or(cli.root);
    let config_dir = root.join(CONFIG_DIR);
    let config = GraphConfig::discover(&root);

    let mut options = config.scan_options([root.clone()]);
    if cli.strict {
        options.strict = StrictPolicy::all();
    }

    match cli.command {
        Commands::Scan { json, no_cache } => {
            let cache_path = (!no_cache && !config.cache.disabled)
                .then(|| config.resolve_cache_path(&config_dir));
            let snapshot = match load_or_scan(&options, cache_path.as_deref()) {
                Ok(snapshot) => snapshot,
                Err(GraphError::Strict { diagnostics, .. }) => return Ok(report_strict(&diagnostics)),
                Err(e) => return Err(e.into()),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&ScanReport::new(&snapshot))?);
            } else {
                print!("{}", format_summary(&snapshot));
                if !snapshot.is_clean() {
                    println!();
                    print!("{}", format_diagnostics(snapshot.diagnostics()));
                }
            }
            Ok(EXIT_OK)
        }

        Commands::Check => {
            let snapshot = match Scanner::new(options).scan() {
                Ok(snapshot) => snapshot,
                Err(GraphError::Strict { diagnostics, .. }) => return Ok(report_strict(&diagnostics)),
                Err(e) => return Err(e.into()),
            };

            if !snapshot.is_clean() {
                eprintln!("✗ Check failed");
                eprint!("{}", format_diagnostics(snapshot.diagnostics()));
                return Ok(EXIT_DIAGNOSTICS);
            }

            let current = Manifest::from_snapshot(&snapshot, &root);
            for format in ManifestFormat::ALL {
                let manifest_path = root.join(format.file_name());
                if !manifest_path.exists() {
                    continue;
                }
                if !Manifest::read(&manifest_path)?.matches(&current) {
                    eprintln!("✗ {} is out of date; run `cgraph generate`", format.file_name());
                    return Ok(EXIT_DRIFT);
                }
            }

            println!("✓ Check passed");
            println!("  Tasks: {}", snapshot.nodes().len());
            println!("  Roots: {}", count_roots(&snapshot));
            Ok(EXIT_OK)
        }

        Commands::Generate {
            allow_errors,
            format,
        } => {
            options.strict = StrictPolicy::none();
            let snapshot = Scanner::new(options).scan()?;
            let failed = !snapshot.is_clean();
            if failed {
                eprint!("{}", format_diagnostics(snapshot.diagnostics()));
            }

            let manifest_path = root.join(format.file_name());
            Manifest::from_snapshot(&snapshot, &root).write(&manifest_path)?;
            println!("✓ Generated {}", manifest_path.display());
            if failed && allow_errors {
                eprintln!("  validation failed; output written due to --allow-errors");
            }

            Ok(if failed && !allow_errors {
                EXIT_DIAGNOSTICS
            } else {
                EXIT_OK
            })
        }

        Commands::Deps { id } => {
            let cache_path = (!config.cache.disabled).then(|| config.resolve_cache_path(&config_dir));
            options.strict = StrictPolicy::none();
            let snapshot = load_or_scan(&options, cache_path.as_deref())?;
            match format_deps(&snapshot, &id) {
                Some(text) => {
                    print!("{}", text);
                    Ok(EXIT_OK)
                }
                None => {
                    println!("No task '{}'", id);
                    Ok(EXIT_DIAGNOSTICS)
                }
            }
        }

        Commands::Order => {
            let snapshot = match Scanner::new(options).scan() {
                Ok(snapshot) => snapshot,
                Err(GraphError::Strict { diagnostics, .. }) => return Ok(report_strict(&diagnostics)),
                Err(e) => return Err(e.into()),
            };
            for (i, id) in snapshot.topological_order().iter().enumerate() {
                println!("{:>4}. {}", i + 1, id);
            }
            for cycle in snapshot.cycles() {
                println!("   ✗ cycle: {}", cycle.join(" -> "));
            }
            Ok(EXIT_OK)
        }

        Commands::Fix => {
            options.strict = StrictPolicy::none();
            let snapshot = Scanner::new(options).scan()?;
            let report = fix_missing_ids(&snapshot)?;
            for (id, location) in &report.added {
                println!("  + {} ({})", id, location);
            }
            println!("✓ Added {} ids in {} files", report.added.len(), report.files.len());
            Ok(EXIT_OK)
        }

        Commands::SetDeps {
            id,
            deps,
            allow_empty,
        } => {
            options.strict = StrictPolicy::none();
            let snapshot = Scanner::new(options).scan()?;
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            let edited = if allow_empty {
                update_deps_allow_empty(&snapshot, &id, &deps)?
            } else {
                update_deps(&snapshot, &id, &deps)?
            };
            println!("✓ Updated {}", edited.display());
            Ok(EXIT_OK)
        }

        Commands::Detach { id, dep, .. } => {
            options.strict = StrictPolicy::none();
            let snapshot = Scanner::new(options).scan()?;
            let edited = detach_deps(&snapshot, &id, dep.as_deref())?;
            println!("✓ Updated {}", edited.display());
            Ok(EXIT_OK)
        }

        Commands::Watch => {
            options.strict = StrictPolicy::none();
            let initial = Scanner::new(options.clone()).scan()?;
            print!("{}", format_summary(&initial));

            let store = Arc::new(SnapshotStore::new(initial));
            let handle = cgraph::watcher::start_watching_with(
                Arc::clone(&store),
                options,
                config.watch.debounce_ms,
                |snapshot| {
                    println!();
                    print!("{}", format_summary(&snapshot));
                    print!("{}", format_diagnostics(snapshot.diagnostics()));
                },
            )?;

            eprintln!("Watching {} (close stdin to stop)", root.display());
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if line.is_err() {
                    break;
                }
            }
            handle.stop();
            Ok(EXIT_OK)
        }
    }
}

/// Refresh a cached snapshot when it was taken for the same options,
/// otherwise scan from scratch. The result is cached again.
fn load_or_scan(options: &ScanOptions, cache_path: Option<&Path>) -> cgraph::Result<Snapshot> {
    let Some(cache_path) = cache_path else {
        return Scanner::new(options.clone()).scan();
    };

    // The cache always holds the best-effort snapshot; strictness is applied after.
    let mut lenient = options.clone();
    lenient.strict = StrictPolicy::none();

    let cached = if cache_path.exists() {
        match Snapshot::load(cache_path) {
            Ok(prior) if prior.options() == &lenient => Some(prior),
            Ok(_) => {
                info!("cached snapshot was taken with different options, rescanning");
                None
            }
            Err(e) => {
                warn!(error = %e, "cache load failed, rescanning");
                None
            }
        }
    } else {
        None
    };

    let scanner = Scanner::new(lenient);
    let snapshot = match &cached {
        Some(prior) => scanner.refresh(prior)?,
        None => scanner.scan()?,
    };

    if let Err(e) = snapshot.save(cache_path) {
        warn!(error = %e, cache = %cache_path.display(), "failed to cache snapshot");
    }

    options.strict.check(snapshot.diagnostics())?;
    Ok(snapshot)
}

fn report_strict(diagnostics: &[cgraph::Diagnostic]) -> i32 {
    eprintln!("✗ Strict mode: diagnostics reported");
    eprint!("{}", format_diagnostics(diagnostics));
    EXIT_DIAGNOSTICS
}

/// Tasks nothing else depends on.
fn count_roots(snapshot: &Snapshot) -> usize {
    snapshot
        .nodes()
        .iter()
        .filter(|n| snapshot.dependents_of(&n.id).is_empty())
        .count()
}
