use clap::Parser;
use ferry::cli::{Cli, Command, HistoryArgs, PruneArgs, RunArgs, SnapshotsArgs};
use ferry::config::Config;
use ferry::error::{ConfigError, RotationError};
use ferry::platform;
use ferry::remote::{self, BackendKind};
use ferry::report;
use ferry::rotation::{self, naming, CycleReport};
use ferry::store::Store;
use std::path::Path;
use std::process;

const EXIT_CONFIG: i32 = 2;

fn load_config(cli: &Cli) -> Config {
    match Config::load(&cli.global) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(EXIT_CONFIG);
        }
    }
}

fn open_remote(config: &Config) -> Box<dyn remote::RemoteStore> {
    let backend = config.backend.resolve(&config.remote_target);
    if backend == BackendKind::Rclone && !platform::rclone_available(&config.rclone_binary) {
        tracing::warn!(binary = %config.rclone_binary, "rclone does not seem to be installed, transfers will fail");
    }
    tracing::debug!(backend = backend.as_str(), remote = %config.remote_target, "opening remote");
    remote::open(config)
}

fn record_cycle(config: &Config, report: &CycleReport) {
    if !config.history {
        return;
    }

    let Some(path) = config.history_path() else {
        tracing::warn!("could not determine history location, cycle not recorded");
        return;
    };

    match Store::open(&path).and_then(|mut store| store.record_cycle(report)) {
        Ok(id) => tracing::debug!(id, path = %path.display(), "cycle recorded"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to record cycle"),
    }
}

fn run(config: &Config, args: &RunArgs) -> i32 {
    let remote = open_remote(config);
    let now = chrono::Local::now().naive_local();

    let cycle = rotation::run_cycle(remote.as_ref(), config, now);
    report::print_cycle(&cycle, args.json);
    record_cycle(config, &cycle);

    cycle.exit_code()
}

fn list_snapshots(config: &Config, args: &SnapshotsArgs) -> i32 {
    let remote = open_remote(config);

    match remote.list(&config.archive_dir) {
        Ok(entries) => {
            let snapshots = naming::archived_snapshots(&config.live_name(), &entries);
            if args.json {
                println!("{}", report::json::render_snapshots(&snapshots));
            } else {
                print!("{}", report::table::render_snapshots(&snapshots));
            }
            rotation::EXIT_OK
        }
        Err(e) => {
            eprintln!("Error listing snapshots in {}: {e}", config.archive_dir);
            rotation::EXIT_FAILED
        }
    }
}

fn prune(config: &Config, args: &PruneArgs) -> i32 {
    let remote = open_remote(config);
    let live = config.live_name();

    let result = if args.dry_run {
        remote
            .list(&config.archive_dir)
            .map_err(|e| RotationError::Listing {
                dir: config.archive_dir.clone(),
                source: e,
            })
            .and_then(|entries| rotation::plan_prune(&entries, &live, config.retention_count))
            .map(|plan| report::table::render_prune_plan(&plan))
    } else {
        rotation::prune(remote.as_ref(), &config.archive_dir, &live, config.retention_count)
            .map(|pruned| report::table::render_prune_report(&pruned))
    };

    match result {
        Ok(output) => {
            print!("{output}");
            rotation::EXIT_OK
        }
        Err(e) => {
            eprintln!("Error pruning {}: {e}", config.archive_dir);
            rotation::EXIT_FAILED
        }
    }
}

fn history(cli: &Cli, args: &HistoryArgs) -> i32 {
    // the ledger is readable without a complete backup config
    let path = match Config::load(&cli.global) {
        Ok(config) => config.history_path(),
        Err(ConfigError::Missing(_)) => platform::default_history_path(),
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_CONFIG;
        }
    };

    let Some(path) = path else {
        eprintln!("Could not determine history location.");
        return rotation::EXIT_FAILED;
    };

    if !path.exists() {
        println!("No cycles recorded yet. Run 'ferry' to start.");
        return rotation::EXIT_OK;
    }

    if let Some(id) = args.id {
        return show_cycle(&path, id, args.json);
    }

    let cycles = match Store::open(&path).and_then(|store| store.list_cycles(args.limit)) {
        Ok(cycles) => cycles,
        Err(e) => {
            eprintln!("Error loading history: {e}");
            return rotation::EXIT_FAILED;
        }
    };

    if args.json {
        println!("{}", report::json::render_history(&cycles));
    } else {
        print!("{}", report::table::render_history(&cycles));
    }

    rotation::EXIT_OK
}

fn show_cycle(path: &Path, id: i64, json_output: bool) -> i32 {
    match Store::open(path).and_then(|store| store.get_cycle(id)) {
        Ok(Some(cycle)) => {
            if json_output {
                println!("{}", report::json::render_cycle_record(&cycle));
            } else {
                print!("{}", report::table::render_cycle_record(&cycle));
            }
            rotation::EXIT_OK
        }
        Ok(None) => {
            eprintln!("No cycle with id {id}. Run 'ferry history' to list recorded cycles.");
            rotation::EXIT_FAILED
        }
        Err(e) => {
            eprintln!("Error loading cycle {id}: {e}");
            rotation::EXIT_FAILED
        }
    }
}

fn main() {
    let cli = Cli::parse();
    ferry::logging::init(cli.global.verbose);

    let code = match &cli.command {
        None => run(&load_config(&cli), &RunArgs::default()),
        Some(Command::Run(args)) => run(&load_config(&cli), args),
        Some(Command::Snapshots(args)) => list_snapshots(&load_config(&cli), args),
        Some(Command::Prune(args)) => prune(&load_config(&cli), args),
        Some(Command::History(args)) => history(&cli, args),
    };

    process::exit(code);
}
