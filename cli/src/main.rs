mod cli;
mod opts;

use anyhow::Result;
use clap::Parser;
use opts::{Mcstack, SubCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Mcstack::parse();

    pretty_env_logger::init();

    match &opts.commands {
        SubCommands::Synth(sub) => cli::synth(&opts, sub),
        SubCommands::Userdata(sub) => cli::userdata(&opts, sub),
        SubCommands::Plan => cli::plan(&opts).await,
        SubCommands::Deploy(sub) => cli::deploy(&opts, sub).await,
        SubCommands::Output => cli::output(&opts),
        SubCommands::Info(sub) => cli::info(&opts, sub).await,
        SubCommands::Ssh(sub) => cli::ssh(&opts, sub),
        SubCommands::Wait(sub) => cli::wait(&opts, sub).await,
        SubCommands::Ranges => cli::ranges(&opts).await,
        SubCommands::Destroy(sub) => cli::destroy(&opts, sub),
        SubCommands::Completions(sub) => cli::completions(sub),
    }
}
