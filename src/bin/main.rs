use std::{error::Error, path::Path, process};

use tracing::debug;
use tracing_subscriber::EnvFilter;

use daemonctl::{
    cli::{Cli, Operation, parse_args},
    config::{Config, RunMode, load_config},
    daemon::Daemon,
    payload::CommandPayload,
};

fn main() {
    let args = parse_args();
    init_logging(&args);

    if let Err(err) = run(&args) {
        debug!("{} failed: {err:?}", args.command.name());
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: &Cli) -> Result<(), Box<dyn Error>> {
    let mode_override = args.debug.then_some(RunMode::Debug);
    let config = load_config(Path::new(&args.config), mode_override)?;
    debug!(
        "Loaded {:?} (mode {:?}, pidfile {:?})",
        args.config,
        config.daemon.mode(),
        config.daemon.pidfile()
    );

    let mut payload = if args.command.launches_payload() {
        Some(command_payload(&config, &args.config)?)
    } else {
        None
    };

    let mut daemon = Daemon::new(config.daemon).with_colour(!args.no_color);

    match (args.command, payload.as_mut()) {
        (Operation::Start, Some(payload)) => daemon.start(payload)?,
        (Operation::Restart, Some(payload)) => daemon.restart(payload)?,
        (Operation::Monitor, Some(payload)) => {
            daemon.monitor(payload)?;
        }
        (Operation::Stop, _) => {
            daemon.stop()?;
        }
        (Operation::Status { json: true }, _) => {
            println!("{}", daemon.inspect().to_json()?);
        }
        (Operation::Status { json: false }, _) => {
            daemon.status();
        }
        (Operation::Pid, _) => {
            daemon.pid();
        }
        (operation, None) => {
            return Err(format!("{} requires a payload", operation.name()).into());
        }
    }

    Ok(())
}

fn command_payload(
    config: &Config,
    config_path: &str,
) -> Result<CommandPayload, Box<dyn Error>> {
    match config.command.as_deref().map(str::trim) {
        Some(command) if !command.is_empty() => {
            let payload = CommandPayload::new(command);
            debug!("Payload command: {}", payload.command());
            Ok(payload)
        }
        _ => Err(format!("no `command` configured in {config_path}").into()),
    }
}
