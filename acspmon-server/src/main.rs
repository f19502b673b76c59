use std::process::exit;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use env_logger::Env;
use miette::{miette, Result};
use tokio_graceful_shutdown::{SubsystemBuilder, Toplevel};

use acspmon_core::TargetSpec;
use acspmon_server::shell::Credentials;
use acspmon_server::{
    Cli, MonitorError, Session, EXIT_BAD_USAGE, EXIT_INTERRUPT, EXIT_USER_QUIT, VERSION,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::from_env(Env::default())
        .filter_level(args.verbose.log_level_filter())
        .init();

    let Some(subnet) = args.subnet.clone() else {
        log::error!("Subnet must be provided, see --help");
        exit(EXIT_BAD_USAGE);
    };
    let spec: TargetSpec = match subnet.parse() {
        Ok(spec) => spec,
        Err(e) => {
            log::error!("{}", e);
            exit(EXIT_BAD_USAGE);
        }
    };
    let creds: Credentials = match args.userpass.parse() {
        Ok(creds) => creds,
        Err(e) => {
            log::error!("{}", e);
            exit(EXIT_BAD_USAGE);
        }
    };

    let targets = spec.expand();
    log::info!(
        "acspmon {} monitoring {} ({} probe targets)",
        VERSION,
        spec,
        targets.len()
    );

    let session_slot: Arc<Mutex<Option<Session>>> = Arc::new(Mutex::new(None));
    let slot = session_slot.clone();

    let result = Toplevel::new(move |s| async move {
        let session = Session::new(&s, &args, targets, creds);
        *slot.lock().unwrap() = Some(session.clone());

        // Record why we are exiting, then bring all subsystems down
        let watcher = session.clone();
        s.start(SubsystemBuilder::new("Signals", move |sub| async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    watcher.exit_code.store(EXIT_INTERRUPT, Ordering::Relaxed);
                }
                _ = watcher.quit_requested() => {
                    watcher.exit_code.store(EXIT_USER_QUIT, Ordering::Relaxed);
                }
            }
            sub.request_shutdown();
            Ok::<(), MonitorError>(())
        }));
    })
    .handle_shutdown_requests(Duration::from_millis(2000))
    .await;

    // Close every open shell session before the process ends
    let session = session_slot.lock().unwrap().take();
    let code = match session {
        Some(session) => {
            for handle in session.store.aps_snapshot() {
                handle.session.close().await;
            }
            session.exit_code.load(Ordering::Relaxed)
        }
        None => 0,
    };

    result.map_err(|e| miette!("{}", e))?;
    exit(code)
}
