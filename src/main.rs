use pipesh::{config::Config, helper::DynError, shell::Shell};
use std::process::exit;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), DynError> {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_filter)?)
        .with_writer(std::io::stderr)
        .init();

    let mut sh = Shell::new(config);
    let exit_val = sh.run()?;
    exit(exit_val);
}
