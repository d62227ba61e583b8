pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use supportdesk_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

use crate::commands::onboard::OnboardArgs;

#[derive(Debug, Parser)]
#[command(
    name = "supportdesk",
    about = "Customer support agent CLI",
    long_about = "Onboard, inspect and talk to the customer support agent.",
    after_help = "Examples:\n  supportdesk onboard --company-name \"Acme\" --company-overview \"Acme sells anvils.\"\n  supportdesk doctor --json\n  supportdesk ask \"How do I reset my password?\"\n  supportdesk chat"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Runtime config file (defaults to supportdesk.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Onboarding configuration file to use")]
    onboarding: Option<PathBuf>,
    #[arg(long, global = true, help = "Override logging.level")]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Write the onboarding configuration the agent is built from")]
    Onboard(Box<OnboardArgs>),
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, onboarding, templates, tools and credentials")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Talk to the agent in the terminal")]
    Chat,
    #[command(about = "Send one message to the agent and print the reply")]
    Ask {
        #[arg(help = "Message to send")]
        message: String,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config.clone(),
            require_file: self.config.is_some(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                onboarding_path: self.onboarding.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    // Commands report config errors themselves; logging just stays off.
    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Onboard(args) => commands::onboard::run(&options, *args),
        Command::Config => commands::config::run(&options),
        Command::Doctor { json } => commands::doctor::run(&options, json),
        Command::Chat => commands::chat::run(&options),
        Command::Ask { message } => commands::ask::run(&options, &message),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(error) = installed {
        eprintln!("supportdesk: logging disabled: {error}");
    }
}
