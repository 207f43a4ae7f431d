use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use apk_domain_config::utils::write_properties;
use apk_domain_config::{ConfigStore, MissingToolPolicy, PathStyle, Settings, store};

#[derive(Parser, Debug)]
#[command(
    name = "apk_domain_config",
    about = "Derive and cache per-domain package names and signing keystores"
)]
struct Cli {
    /// Directory holding the config document and keystores
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Settings file (defaults to <base-dir>/apk_domain_config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// How keystore paths are recorded in the config document
    #[arg(long, value_enum)]
    path_style: Option<PathStyle>,

    /// What to do when keytool is not installed
    #[arg(long, value_enum)]
    missing_keytool: Option<MissingToolPolicy>,

    /// keytool command name or path
    #[arg(long)]
    keytool: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the config for a URL, creating it on first use
    Get {
        url: String,

        /// Also write a Gradle key.properties file here
        #[arg(long)]
        key_properties: Option<PathBuf>,
    },
    /// Print the derived config for a URL without storing anything
    Derive { url: String },
    /// List configured domains and their package names
    List,
    /// Remove a domain's config (its keystore file is kept)
    Remove { domain: String },
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(&cli.base_dir, cli.config.as_deref())
        .with_context(|| format!("Failed to load settings for {}", cli.base_dir.display()))?;
    if let Some(style) = cli.path_style {
        settings.path_style = style;
    }
    if let Some(policy) = cli.missing_keytool {
        settings.missing_keytool = policy;
    }
    if let Some(keytool) = &cli.keytool {
        settings.keytool = keytool.clone();
    }
    Ok(settings)
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Get {
            url,
            key_properties,
        } => {
            let mut store = ConfigStore::open(settings);
            let config = store
                .get_or_create(&url)
                .with_context(|| format!("Failed to get config for {url}"))?;
            if let Some(path) = key_properties {
                write_properties(&path, &config.key_properties())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(file = %path.display(), "wrote key.properties");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Derive { url } => {
            let config = store::derive(&url, &settings)
                .with_context(|| format!("Failed to derive config for {url}"))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::List => {
            let store = ConfigStore::open(settings);
            let mut entries = store.entries().peekable();
            if entries.peek().is_none() {
                println!("No domains configured");
            }
            for config in entries {
                println!("{} -> {}", config.domain, config.package_name);
            }
        }
        Commands::Remove { domain } => {
            let mut store = ConfigStore::open(settings);
            if !store.remove(&domain)? {
                eprintln!("Domain not found: {domain}");
                return Ok(ExitCode::FAILURE);
            }
            println!("Removed domain: {domain}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
