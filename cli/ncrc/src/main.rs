// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ncrc - Manage NCRC applications

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use ncrc::{Client, ClientConfig, Command, EnvSnapshot, Invocation, Settings};
use ncutils::{ConfigFile, PromptError};
use securid::TerminalPrompt;

/// Manage NCRC packages
#[derive(Parser, Debug)]
#[command(name = "ncrc")]
#[command(about = "Manage NCRC applications", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Suppress conda's output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Embed credentials in the channel URL (deprecated)
    #[arg(long, global = true)]
    basic_auth: bool,
}

#[derive(ClapArgs, Debug)]
struct Target {
    /// The application you wish to work with
    application: Option<String>,

    /// The server containing the conda packages [default: conda.software.inl.gov]
    server: Option<String>,

    /// Allow untrusted connections
    #[arg(short = 'k', long)]
    insecure: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install application
    Install(Target),

    /// Update the application in the active environment
    Update(Target),

    /// Prints information on how to remove application
    Remove(Target),

    /// Perform a regular expression search for NCRC application
    Search(Target),

    /// List all available NCRC applications
    List(Target),
}

impl Commands {
    fn split(self) -> (Command, Target) {
        match self {
            Commands::Install(t) => (Command::Install, t),
            Commands::Update(t) => (Command::Update, t),
            Commands::Remove(t) => (Command::Remove, t),
            Commands::Search(t) => (Command::Search, t),
            Commands::List(t) => (Command::List, t),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn run(args: Args) -> Result<()> {
    let (command, target) = args.command.split();
    let invocation = Invocation {
        application: target.application,
        server: target.server,
        insecure: target.insecure,
        quiet: args.quiet,
        basic_auth: args.basic_auth,
    };

    let config = ClientConfig::load()?;
    let settings = Settings::resolve(command, invocation, &config, EnvSnapshot::capture())?;
    log::debug!("resolved settings: {:?}", settings);

    let client = Client::new(settings)?;
    client.run(&mut TerminalPrompt).await
}

fn interrupted(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| matches!(cause.downcast_ref::<PromptError>(), Some(PromptError::Interrupted)))
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(err) = run(args) {
        if interrupted(&err) {
            println!("\nExiting...");
        } else {
            eprintln!("{:#}", err);
        }
        std::process::exit(1);
    }
}
