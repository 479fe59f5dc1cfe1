//! Command-line access to a pigpio daemon.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use pigpio_client::config::ClientConfig;
use pigpio_client::{Edge, EdgeMode, Level, Mode, Pi, logging};

#[derive(Parser)]
#[command(name = "pigpio")]
#[command(about = "Talk to a pigpio daemon over its socket interface")]
struct Args {
    /// Config file path (optional, CLI args override config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Daemon address (host:port)
    #[arg(short, long, global = true)]
    address: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the daemon's pigpio version
    Version,
    /// Read the level of a gpio
    Read { gpio: u32 },
    /// Set the level of a gpio
    Write {
        gpio: u32,
        #[arg(value_parser = clap::value_parser!(u32).range(0..=1))]
        level: u32,
    },
    /// Set the mode of a gpio
    Mode {
        gpio: u32,
        #[arg(value_enum)]
        mode: ModeArg,
    },
    /// Print edges on one or more gpios until interrupted
    Watch {
        #[arg(required = true)]
        gpios: Vec<u32>,
        #[arg(long, value_enum, default_value_t = EdgeArg::Either)]
        edge: EdgeArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Input,
    Output,
    Alt0,
    Alt1,
    Alt2,
    Alt3,
    Alt4,
    Alt5,
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Input => Mode::Input,
            ModeArg::Output => Mode::Output,
            ModeArg::Alt0 => Mode::Alt0,
            ModeArg::Alt1 => Mode::Alt1,
            ModeArg::Alt2 => Mode::Alt2,
            ModeArg::Alt3 => Mode::Alt3,
            ModeArg::Alt4 => Mode::Alt4,
            ModeArg::Alt5 => Mode::Alt5,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EdgeArg {
    Rising,
    Falling,
    Either,
}

impl From<EdgeArg> for EdgeMode {
    fn from(arg: EdgeArg) -> Self {
        match arg {
            EdgeArg::Rising => EdgeMode::Rising,
            EdgeArg::Falling => EdgeMode::Falling,
            EdgeArg::Either => EdgeMode::Either,
        }
    }
}

fn main() {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ClientConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => ClientConfig::default(),
    };
    if let Some(address) = args.address {
        config.address = address;
    }

    logging::init(&config.logging);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config, args.command)) {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run(config: ClientConfig, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let pi = Pi::connect_with(&config).await?;
    let result = execute(&pi, command).await;
    pi.close().await;
    result
}

async fn execute(pi: &Pi, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Version => println!("{}", pi.get_pigpio_version().await?),
        Command::Read { gpio } => println!("{}", pi.read(gpio).await?),
        Command::Write { gpio, level } => {
            pi.write(gpio, level).await?;
        }
        Command::Mode { gpio, mode } => {
            pi.set_mode(gpio, mode.into()).await?;
        }
        Command::Watch { gpios, edge } => {
            let mut subscriptions = Vec::with_capacity(gpios.len());
            for gpio in gpios {
                subscriptions.push(pi.subscribe(gpio, edge.into(), print_edge).await?);
            }
            tracing::info!(count = subscriptions.len(), "watching; ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            for subscription in subscriptions {
                pi.unsubscribe(subscription.id()).await?;
            }
        }
    }
    Ok(())
}

fn print_edge(edge: Edge) {
    let level = match edge.level {
        Level::Low => "0",
        Level::High => "1",
        Level::Timeout => "timeout",
    };
    println!("{} {} {}", edge.tick, edge.gpio, level);
}
