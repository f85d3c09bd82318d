use std::env;
use log::{error, info, LevelFilter};
use tokio::spawn;
use tokio_util::sync::CancellationToken;

use crate::config::args::Args;
use crate::config::io::ConfigIO;
use crate::device::btle::BtleTransport;
use crate::device::connection::{Supervisor, SupervisorSettings};
use crate::error::AppRunError;
use crate::server::AppState;
use crate::telemetry::publisher::{Publisher, PUSH_CHANNEL_CAPACITY};
use crate::telemetry::state::SharedState;

pub mod config;
pub mod device;
pub mod error;
pub mod server;
pub mod telemetry;

pub fn init_logging(level: LevelFilter) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339_millis(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        match fern::log_file(&log_file) {
            Ok(file) => dispatch = dispatch.chain(file),
            Err(err) => eprintln!("Failed to open LOG_FILE {}: {}", log_file, err),
        }
    }

    if let Err(err) = dispatch.apply() {
        eprintln!("Failed to initialize logger: {}", err);
    }
}

pub async fn run(args: Args) -> Result<(), AppRunError> {
    let config_io = ConfigIO::open_sync(args.config.as_deref())?;
    // held for the lifetime of the process: one bridge per config file (and peripheral)
    let mut locker = config_io.locker()?;
    let _lock = locker.lock()?;

    let mut config = config_io.read().await?;
    args.apply(&mut config);
    config.validate()?;

    if args.save_config {
        config_io.save(&config).await?;
    }

    let state = SharedState::new();
    let publisher = Publisher::new(state, PUSH_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let supervisor = Supervisor::new(
        BtleTransport::new(&config),
        SupervisorSettings::from(&config),
        publisher.clone(),
    );
    let supervisor_handle = spawn(supervisor.run(cancel.child_token()));

    let shutdown = cancel.clone();
    spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                shutdown.cancel();
            },
            Err(err) => error!("Failed to listen for ctrl-c: {}", err),
        }
    });

    let app_state = AppState::new(publisher, &config.device_name);
    let result = server::serve(config.socket_addr(), app_state, cancel.clone()).await;

    cancel.cancel();
    if let Err(err) = supervisor_handle.await {
        error!("Connection supervisor task failed: {}", err);
    }

    result
}
