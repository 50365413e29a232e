use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use weatherd::config::AppConfig;
use weatherd::context::AppContext;
use weatherd::core::{DayRangeReport, DayReport, ShortDate, ShortDateRange, WeatherInfo};
use weatherd::daemon::Daemon;
use weatherd::logging::{self, LogConfig};
use weatherd::rpc::{Argument, ChannelInfoClient, Client, Command, ServerAvailabilityProvider};

#[derive(Parser)]
#[command(name = "weatherd")]
#[command(about = "Weather monitoring server and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor and the three servers until Ctrl-C
    Daemon(ServerArgs),
    /// Probe the status server
    Status,
    /// Ask the channel-info server when the next reading is due
    NextWeather,
    /// Send one query to the repo server and print the answer as JSON
    Query(QueryArgs),
}

#[derive(Args, Serialize)]
struct ServerArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    simulation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    weather_interval_ms: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum QueryCommand {
    DayReport,
    DayRangeReport,
    AvailableDateRange,
    LastWeather,
}

#[derive(Args)]
struct QueryArgs {
    command: QueryCommand,

    /// Day to report on, or first day of a range (YYYY-MM-DD)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Last day of a range (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Daemon(args) => AppConfig::load(cli.config.as_deref(), Some(args))?,
        _ => AppConfig::load(cli.config.as_deref(), None::<&ServerArgs>)?,
    };

    match &cli.command {
        Commands::Daemon(_) => {
            logging::init(LogConfig {
                json: config.json_logs,
                verbose: config.verbose,
            });
            let ctx = AppContext::new(config)?;
            Daemon::new(ctx).run().await.context("Failed to run daemon")?
        }
        Commands::Status => run_status(&config).await,
        Commands::NextWeather => run_next_weather(&config)
            .await
            .context("Failed to get next weather time")?,
        Commands::Query(args) => run_query(&config, args)
            .await
            .context("Query failed")?,
    }

    Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_status(config: &AppConfig) {
    let provider = ServerAvailabilityProvider::new(config.status_addr(), config.client_timeout());
    let status = provider.status().await;
    println!("{}", serde_json::json!({ "status": status }));
}

async fn run_next_weather(config: &AppConfig) -> Result<()> {
    let client = ChannelInfoClient::new(config.channel_info_addr(), config.client_timeout());
    let millis = client.millis_until_next_weather().await?;
    print_json(&serde_json::json!({ "millisUntilNextWeather": millis }))
}

fn short_date(date: NaiveDate) -> Result<ShortDate> {
    ShortDate::from_naive(date).with_context(|| format!("{date} is out of range"))
}

async fn run_query(config: &AppConfig, args: &QueryArgs) -> Result<()> {
    let client = Client::new(config.repo_addr(), config.contract(), config.client_timeout());

    match args.command {
        QueryCommand::DayReport => {
            let date = short_date(args.date.context("--date is required")?)?;
            let report = client
                .request::<DayReport>(Command::GetDayReport, date)
                .await?;
            print_json(&report)
        }
        QueryCommand::DayRangeReport => {
            let start = short_date(args.date.context("--date is required")?)?;
            let end = short_date(args.end.context("--end is required")?)?;
            let range = ShortDateRange::new(start, end)?;
            let report = client
                .request::<DayRangeReport>(Command::GetDayRangeReport, range)
                .await?;
            print_json(&report)
        }
        QueryCommand::AvailableDateRange => {
            let range = client
                .request::<ShortDateRange>(Command::GetAvailableDateRange, Argument::None)
                .await?;
            print_json(&range)
        }
        QueryCommand::LastWeather => {
            let weather = client
                .request::<WeatherInfo>(Command::GetLastWeather, Argument::None)
                .await?;
            print_json(&weather)
        }
    }
}
