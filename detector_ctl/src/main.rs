use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use detector_ctl::client::{describe, DetectorClient};
use env_logger::TimestampPrecision;

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// Address of the detector server
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current status
    Status,
    /// Start or stop detection
    Detect,
    /// Mute or unmute speech
    Mute,
    /// Print the status whenever it changes
    Watch {
        /// Polling interval in milliseconds
        #[clap(long, default_value_t = 500)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let client = DetectorClient::new(&args.server_address);

    match args.command {
        Command::Status => println!("{}", describe(&client.status().await?)),
        Command::Detect => println!("{}", describe(&client.toggle_detect().await?)),
        Command::Mute => println!("{}", describe(&client.toggle_mute().await?)),
        Command::Watch { interval_ms } => {
            let period = Duration::from_millis(interval_ms.max(1));
            let mut poll_interval = tokio::time::interval(period);
            let mut last_line = String::new();
            loop {
                poll_interval.tick().await;
                match client.status().await {
                    Ok(report) => {
                        let line = describe(&report);
                        if line != last_line {
                            println!("{line}");
                            last_line = line;
                        }
                    }
                    Err(e) => log::warn!("{e:#}"),
                }
            }
        }
    }

    Ok(())
}
