//! CLI argument parsing for the dispatch-worker binary.

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};

use crate::types::VehicleType;

#[derive(Parser)]
#[command(name = "dispatch-worker", about = "Delivery route dispatch worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Optimize a list of addresses and print the plan as JSON
    Optimize(OptimizeArgs),
}

#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Start address
    #[arg(long)]
    pub start: String,

    /// Stop address, repeat for each stop
    #[arg(long = "stop", required = true)]
    pub stops: Vec<String>,

    #[arg(long, default_value = "car")]
    pub vehicle: VehicleType,

    /// Account for time-of-day traffic
    #[arg(long)]
    pub traffic: bool,

    /// Local departure time, e.g. 2026-03-02T08:30:00 (defaults to now)
    #[arg(long)]
    pub departure: Option<NaiveDateTime>,

    #[arg(long)]
    pub max_stops: Option<usize>,

    #[arg(long)]
    pub service_minutes: Option<u32>,
}
