use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "scrutineer")]
#[command(about = "Live integrity monitor for voting sessions", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Print version information
    Version,
    /// Inspect the local session journal
    Sessions(SessionsCliArgs),
}

#[derive(ClapArgs, Debug)]
pub struct SessionsCliArgs {
    /// Show one session with its violations
    #[arg(long)]
    pub id: Option<i64>,
    /// Maximum sessions to list
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}
