//! `keeperd` serves the JSON-lines bridge on stdin and stdout.

use std::io::{self, Write};
use std::process::{self, ExitCode};
use std::sync::Arc;
use std::thread;

use tracing::{error, info, warn};

use keeper_config::{Config, OrthoConfig};
use keeperd::dispatch::bridge::{Bridge, ResponseWriter};
use keeperd::shutdown::{ShutdownSignal, SystemShutdownSignal};
use keeperd::{
    CommandDispatcher, LifecycleManager, StructuredHealthReporter, initialise_telemetry,
};

const MAIN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::main");

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            let _ = writeln!(io::stderr(), "keeperd: failed to load configuration: {error}");
            return ExitCode::FAILURE;
        }
    };
    let _telemetry = match initialise_telemetry(&config) {
        Ok(handle) => handle,
        Err(error) => {
            let _ = writeln!(io::stderr(), "keeperd: {error}");
            return ExitCode::FAILURE;
        }
    };

    let manager = Arc::new(LifecycleManager::new(
        &config,
        Arc::new(StructuredHealthReporter::new()),
    ));
    let dispatcher = CommandDispatcher::new(manager);
    watch_for_shutdown(dispatcher.clone());

    info!(target: MAIN_TARGET, "serving bridge on stdin");
    let bridge = Bridge::new(dispatcher);
    let writer = Arc::new(ResponseWriter::new(io::stdout()));
    let served = bridge.serve(io::stdin().lock(), &writer);
    bridge.shutdown();
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: MAIN_TARGET, error = %err, "bridge failed");
            ExitCode::FAILURE
        }
    }
}

fn watch_for_shutdown(dispatcher: CommandDispatcher) {
    let spawned = thread::Builder::new()
        .name("keeper-shutdown".to_owned())
        .spawn(move || match SystemShutdownSignal::new().wait() {
            Ok(()) => {
                info!(target: MAIN_TARGET, "shutdown signal received");
                dispatcher.shutdown();
                process::exit(0);
            }
            Err(err) => warn!(target: MAIN_TARGET, error = %err, "signal handling unavailable"),
        });
    if let Err(err) = spawned {
        warn!(target: MAIN_TARGET, error = %err, "failed to spawn shutdown watcher");
    }
}
