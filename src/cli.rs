use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "catalogctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Provision and manage self-service catalog deployments", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Request a new deployment from the catalog
    Create(ResourceArgs),

    /// Refresh persisted state from the remote deployment
    Read(ResourceArgs),

    /// Reconfigure machines whose settings changed
    Update(ResourceArgs),

    /// Destroy the deployment
    Delete(DeleteArgs),

    /// Show persisted state without contacting the remote system
    Show(ResourceArgs),

    /// Resolve ids and print the request that create would submit
    Plan(ResourceArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
pub struct ResourceArgs {
    /// Resource definition file (TOML)
    pub definition: PathBuf,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub resource: ResourceArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
