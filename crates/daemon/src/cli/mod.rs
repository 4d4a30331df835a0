pub mod op;
pub mod ops;

use clap::Parser;

use ops::{Auth, Cat, Daemon, Init, Ls, Status};

crate::command_enum! {
    (Init, Init),
    (Auth, Auth),
    (Daemon, Daemon),
    (Ls, Ls),
    (Cat, Cat),
    (Status, Status),
}

#[derive(Parser, Debug)]
#[command(name = "nimbus", version, about = "Locally cached view of a remote object store")]
pub struct Args {
    /// Config directory (default: ~/.nimbus)
    #[arg(long, global = true, env = "NIMBUS_CONFIG_DIR")]
    pub config_dir: Option<std::path::PathBuf>,

    /// Log verbosity: 0 error, 1 warn, 2 info, 3 debug, 4 trace
    #[arg(long, global = true, default_value_t = 2)]
    pub log_level: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Map the numeric verbosity to a level; anything out of range is `WARN`.
pub fn log_level(level: u8) -> tracing::Level {
    match level {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        4 => tracing::Level::TRACE,
        _ => tracing::Level::WARN,
    }
}
