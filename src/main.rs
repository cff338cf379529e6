use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;

mod commands;

/// sc4pac - a package manager for SimCity 4 plugins
#[derive(Parser)]
#[command(name = "sc4pac")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Profile directory (defaults to SC4PAC_PROFILE_DIR or the current directory)
    #[arg(long, global = true)]
    profile: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add packages to the list of explicitly installed packages
    Add {
        /// Packages as group:name (e.g. memo:essential-fixes)
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Update all installed packages to their latest versions
    Update {
        /// Answer yes to confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Remove packages from the list of explicitly installed packages
    Remove {
        /// Select packages to remove interactively
        #[arg(short = 'i', long)]
        interactive: bool,

        /// Packages as group:name
        packages: Vec<String>,
    },

    /// List installed packages
    List,

    /// Show metadata of a package
    Info {
        /// Package as group:name
        package: String,
    },

    /// Search for packages in the configured channels
    Search {
        /// Minimal fuzzy-match score (0-100)
        #[arg(long, default_value_t = 50)]
        threshold: u8,

        /// Search text
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Manage variant choices
    Variant {
        #[command(subcommand)]
        action: VariantAction,
    },

    /// Manage the channels packages are fetched from
    Channel {
        #[command(subcommand)]
        action: ChannelAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum VariantAction {
    /// Forget variant choices so the next update asks again
    Reset {
        /// Select variant keys to reset interactively
        #[arg(short = 'i', long)]
        interactive: bool,

        /// Variant keys to reset
        keys: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ChannelAction {
    /// Add a channel URL (lowest priority)
    Add {
        /// Channel root URL
        url: String,
    },

    /// Remove a channel URL
    Remove {
        /// Channel root URL
        url: String,
    },

    /// List configured channels in priority order
    List,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SC4PAC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile;

    let result = match cli.command {
        Commands::Add { packages } => commands::add::run(profile, packages),
        Commands::Update { yes } => commands::update::run(profile, yes),
        Commands::Remove {
            interactive,
            packages,
        } => commands::remove::run(profile, interactive, packages),
        Commands::List => commands::list::run(profile),
        Commands::Info { package } => commands::info::run(profile, package),
        Commands::Search { threshold, text } => {
            commands::search::run(profile, threshold, text.join(" "))
        }
        Commands::Variant { action } => match action {
            VariantAction::Reset { interactive, keys } => {
                commands::variant::run_reset(profile, interactive, keys)
            }
        },
        Commands::Channel { action } => match action {
            ChannelAction::Add { url } => commands::channel::run_add(profile, url),
            ChannelAction::Remove { url } => commands::channel::run_remove(profile, url),
            ChannelAction::List => commands::channel::run_list(profile),
        },
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sc4pac", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        match e.downcast_ref::<sc4pac::Error>() {
            Some(sc4pac::Error::Abort) => {
                eprintln!("Operation aborted.");
                std::process::exit(1);
            }
            Some(expected) => {
                eprintln!("Operation aborted. {}", expected);
                std::process::exit(1);
            }
            None => {
                // Anything that is not one of our errors is a defect
                eprintln!("Unexpected error: {:?}", e);
                std::process::exit(2);
            }
        }
    }
}
