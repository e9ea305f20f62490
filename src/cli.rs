use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(name = "steward", version, about, long_about = None)]
pub struct Cli {
    /// JSON cluster config; defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Number of controller replicas contending on the shared store
    #[arg(short, long, default_value_t = 3)]
    pub replicas: usize,

    /// Status endpoint address, overrides `status_addr` from the config
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Seconds between singleton duty runs
    #[arg(long, default_value_t = 10)]
    pub duty_interval: u64,

    /// Verbose mode (-v, -vv)
    #[arg(short, action = ArgAction::Count)]
    pub verbosity: u8,
}
