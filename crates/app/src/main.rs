// CLI modules
mod args;
mod logging;
mod op;
mod ops;
mod state;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Directory, Init, Keys, Read, SendMessage, Version, Watch};

command_enum! {
    (Init, Init),
    (Keys, Keys),
    (Directory, Directory),
    (Send, SendMessage),
    (Read, Read),
    (Watch, Watch),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = op::OpContext::new(args.config_path);

    // Logging settings live in the profile; before init there is none
    let (log_level, log_dir) = match ctx.state() {
        Ok(state) => (state.config.log_level.clone(), state.logs_path()),
        Err(_) => ("warn".to_string(), None),
    };
    let guards = logging::init_logging(&log_level, log_dir.as_deref());
    tracing::debug!(build = %common::build_info!(), "cipherchat starting");

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            drop(guards);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            drop(guards);
            std::process::exit(1);
        }
    }
}
