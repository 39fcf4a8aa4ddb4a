pub mod models {
    pub mod ecobee;
}

pub mod client;
pub mod config;
pub mod console;
pub mod db {
    pub mod models;
}
pub mod schema;
pub mod session;
pub mod utils;
pub mod services {
    pub mod credentials;
    pub mod duty_cycle;
    #[cfg(test)]
    pub mod fakes;
    pub mod lifecycle;
}

use crate::client::EcobeeClient;
use crate::config::Config;
use crate::console::Terminal;
use crate::services::credentials::CredentialStore;
use crate::services::duty_cycle::{DutyCycle, InterruptiblePause};
use crate::services::lifecycle;
use log::{error, info};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::mpsc;

pub fn run(cfg: &Config) -> Result<(), String> {
    info!(
        "Config loaded (device={}, store={}, log_file={}, api={}, request_timeout={}s, scope={})",
        cfg.device_name,
        cfg.store_path.display(),
        cfg.log_file.display(),
        cfg.api_base_url,
        cfg.request_timeout.as_secs(),
        cfg.scope
    );

    // 1) Resolve the session, pairing interactively if needed
    let store = CredentialStore::new(cfg.store_path.clone());
    let client = EcobeeClient::new(cfg.api_base_url.clone(), cfg.request_timeout);
    let session = lifecycle::bootstrap(&client, &store, &mut Terminal, &cfg.device_name, &cfg.scope)
        .map_err(|e| format!("session bootstrap failed: {}", e))?;

    // 2) Interrupts only end the duty loop; before this point they keep their default behaviour
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| format!("installing interrupt handler failed: {}", e))?;

    // 3) Duty cycle, forever
    let mut cycle = DutyCycle::new(session);
    info!("Starting duty cycle for {}", cycle.session().record().device_name);
    cycle
        .run(&mut InterruptiblePause::new(rx))
        .map_err(|e| format!("duty cycle failed: {}", e))?;

    info!("Interrupted; exiting");
    Ok(())
}

/// Duplicates every log line to stderr and the log file.
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

fn init_logging(log_file: &Path) -> Result<(), String> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| format!("failed to open log file {}: {}", log_file.display(), e))?;

    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .write_style(env_logger::WriteStyle::Never)
        .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
        .init();
    Ok(())
}

fn main() {
    let cfg = Config::default();
    if let Err(err) = init_logging(&cfg.log_file) {
        eprintln!("fatal: {}", err);
        std::process::exit(1);
    }

    info!(
        "ecobee-antifreeze {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&cfg) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
