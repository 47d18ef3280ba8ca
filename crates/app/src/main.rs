// CLI modules
mod args;
mod op;
mod ops;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{AutoStart, Backup, Ls, MountDir, Passwd, Run, Source, Test, Version};

command_enum! {
    (Source, Source),
    (Ls, Ls),
    (Test, Test),
    (MountDir, MountDir),
    (Passwd, Passwd),
    (Backup, Backup),
    (Autostart, AutoStart),
    (Run, Run),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let ctx = op::OpContext::new(args.config_path, args.passphrase);

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
