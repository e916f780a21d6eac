use std::process::ExitCode;

use clap::Parser;

use xrayfe::cli::{self, CliArgs};
use xrayfe::logger;

fn main() -> ExitCode {
    logger::init();
    let args = CliArgs::parse();
    let code = cli::run(args);
    if let Some(path) = logger::log_path() {
        xrayfe::log_info!("session log: {}", path.display());
    }
    code
}
