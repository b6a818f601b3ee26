use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tenement::host::Host;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Multi-tenant HTTP application host.
#[derive(Parser)]
#[command(name = "tenement", version, about)]
struct Args {
    /// Base directory holding host.yaml, apps/ and shared/
    #[arg(long, default_value = ".", env = "TENEMENT_BASE")]
    base_dir: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut host = match Host::from_dir(&args.base_dir) {
        Ok(host) => host,
        Err(e) => {
            error!(error = %e, "cannot load host configuration");
            std::process::exit(1);
        }
    };

    match host.deploy() {
        Ok(deployed) => info!(deployed, "applications deployed"),
        Err(e) => {
            error!(error = %e, "cannot scan applications directory");
            std::process::exit(1);
        }
    }

    let host = Arc::new(host);
    let handle = match host.start() {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };

    #[cfg(unix)]
    spawn_signal_handler(Arc::clone(&host));

    if handle.join().is_err() {
        error!("server terminated abnormally");
        std::process::exit(1);
    }
}

#[cfg(unix)]
fn spawn_signal_handler(host: Arc<Host>) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    std::thread::spawn(move || {
        let mut signals = match Signals::new([SIGINT, SIGTERM]) {
            Ok(signals) => signals,
            Err(e) => {
                error!(error = %e, "cannot install signal handler");
                return;
            }
        };
        if let Some(signal) = signals.forever().next() {
            info!(signal, "termination signal received");
            host.shutdown();
            std::process::exit(0);
        }
    });
}
