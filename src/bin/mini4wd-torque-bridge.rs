use clap::Parser;
use log::{error, info};
use mini4wd_torque_bridge::{init_logging, run};
use mini4wd_torque_bridge::config::args::Args;
use mini4wd_torque_bridge::error::{AppRunError, ConfigError};

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();
    init_logging(args.log_level);
    info!(concat!("Mini 4WD Torque Bridge ", env!("CARGO_PKG_VERSION")));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| AppRunError::Runtime { source })?;

    match runtime.block_on(run(args)) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            error!("Another bridge is already running with this config file");
            Ok(())
        },
        Err(err) => {
            error!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(()) => Ok(()),
    }
}
