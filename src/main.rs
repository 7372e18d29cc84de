use clap::Parser as _;
use sessy_tools::commands;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(clap::Parser)]
#[clap(version, about)]
enum Commands {
    Sensors(commands::sensors::Args),
    Status(commands::status::Args),
    Monitor(commands::monitor::Args),
}

fn end<E: std::error::Error>(r: Result<(), E>) {
    std::process::exit(match r {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            let mut cause = e.source();
            while let Some(e) = cause {
                eprintln!("  because: {e}");
                cause = e.source();
            }
            1
        }
    });
}

fn main() {
    let filter = match std::env::var("SESSY_TOOLS_LOG") {
        Ok(description) => match description.parse::<tracing_subscriber::filter::Targets>() {
            Ok(filter) => filter,
            Err(e) => {
                eprintln!("error: could not parse SESSY_TOOLS_LOG: {e}");
                std::process::exit(2);
            }
        },
        Err(_) => tracing_subscriber::filter::Targets::new()
            .with_default(tracing::level_filters::LevelFilter::INFO),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    match Commands::parse() {
        Commands::Sensors(args) => end(commands::sensors::run(args)),
        Commands::Status(args) => end(commands::status::run(args)),
        Commands::Monitor(args) => end(commands::monitor::run(args)),
    }
}
