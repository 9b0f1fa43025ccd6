use std::path::PathBuf;

use clap::Parser;
use log::info;

use google_drive_upload::cli_factories::{credentials_from_env, set_up_logging};
use google_drive_upload::errors::{self, Result};
use google_drive_upload::Command;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local file to upload. The path, as given, becomes the file name in Drive.
    #[arg()]
    source: PathBuf,

    /// Destination in Drive. Accepted for compatibility; files always go to the root folder.
    #[arg()]
    destination: Option<String>,

    /// Overwrite the content of the first file with the same name instead of
    /// creating another file
    #[arg(long)]
    replace: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    set_up_logging();
    info!("Starting");

    let result = run(&args).await;
    if let Err(ref e) = result {
        eprintln!("{}", errors::render(e));
        ::std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    let command = Command::new(credentials_from_env()?).replace_existing(args.replace);
    command.run(&args.source, args.destination.as_deref()).await
}
