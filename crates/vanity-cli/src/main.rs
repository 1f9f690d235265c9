//! Vanity - Go module redirect fetcher
//!
//! Usage:
//!   vanity fetch <module> <version>   # Write .info, .mod and .zip
//!   vanity match <module>             # Show the redirect rule for a module
//!   vanity rules                      # List configured redirect rules

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vanity_core::config::{self, VanityConfig, rules_to_toml, to_toml};
use vanity_core::context::FetchContext;
use vanity_core::fetch::{FetchResult, ModuleFetcher, ProxyFetcher, SubdirFetcher, escape_path};
use vanity_core::prefix::RedirectRule;

#[derive(Parser)]
#[command(name = "vanity")]
#[command(about = "Fetch Go modules redirected into repository subdirectories", long_about = None)]
struct Cli {
    /// Configuration file (defaults to <config dir>/vanity/vanity.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a module version into a module proxy layout
    Fetch {
        /// Module path (e.g. foo.com/go/pkg/test/sub)
        module: String,
        /// Version query: a tag, pseudo-version, branch, commit or "latest"
        version: String,
        /// Output directory
        #[arg(long, short, default_value = ".")]
        out: PathBuf,
    },

    /// Show which redirect rule applies to a module path
    Match {
        /// Module path
        module: String,
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List redirect rules in match order
    Rules {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// vanity.toml syntax (`match` prints only the matched rule)
    Toml,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Fetch {
            module,
            version,
            out,
        } => run_fetch(&config, &module, &version, &out).await,
        Commands::Match { module, format } => run_match(&config, &module, format),
        Commands::Rules { format } => run_rules(&config, format),
    }
}

async fn run_fetch(config: &VanityConfig, module: &str, version: &str, out: &Path) -> Result<()> {
    let fallback = ProxyFetcher::new(&config.fetch.proxy)?
        .with_spool_threshold(config.fetch.spool_threshold);
    let fetcher = SubdirFetcher::from_config(config, fallback)?;

    let ctx = match config.fetch.timeout_secs {
        Some(secs) => FetchContext::with_timeout(std::time::Duration::from_secs(secs)),
        None => FetchContext::new(),
    };

    let result = tokio::select! {
        result = fetcher.fetch(&ctx, module, version) => result,
        _ = tokio::signal::ctrl_c() => {
            ctx.cancel();
            anyhow::bail!("Interrupted, fetch of {}@{} cancelled", module, version);
        }
    };
    let result = result.with_context(|| format!("Failed to fetch {}@{}", module, version))?;

    let dir = write_result(out, module, result)?;
    tracing::debug!(dir = %dir.display(), "Wrote module files");
    Ok(())
}

/// Write `<out>/<escaped module>/@v/<version>.{info,mod,zip}`.
fn write_result(out: &Path, module: &str, mut result: FetchResult) -> Result<PathBuf> {
    let dir = out.join(escape_path(module)?).join("@v");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let stem = escape_path(&result.version)?;
    let info_path = dir.join(format!("{}.info", stem));
    fs::write(&info_path, &result.info)
        .with_context(|| format!("Failed to write {}", info_path.display()))?;
    let mod_path = dir.join(format!("{}.mod", stem));
    fs::write(&mod_path, &result.manifest)
        .with_context(|| format!("Failed to write {}", mod_path.display()))?;

    let zip_path = dir.join(format!("{}.zip", stem));
    let mut file = fs::File::create(&zip_path)
        .with_context(|| format!("Failed to create {}", zip_path.display()))?;
    std::io::copy(&mut result.archive, &mut file)
        .with_context(|| format!("Failed to write {}", zip_path.display()))?;

    println!("{}", result.version);
    Ok(dir)
}

fn run_match(config: &VanityConfig, module: &str, format: OutputFormat) -> Result<()> {
    let table = config.prefix_table()?;
    let rule = table.find_prefix(module);
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rule)?);
        }
        OutputFormat::Toml => match rule {
            Some(rule) => print!("{}", rules_to_toml(std::slice::from_ref(rule))?),
            None => println!("# No redirect rule matches {}", module),
        },
        OutputFormat::Table => match rule {
            Some(rule) => print_rules(std::slice::from_ref(rule)),
            None => println!("No redirect rule matches {}; the proxy fallback applies.", module),
        },
    }
    Ok(())
}

fn run_rules(config: &VanityConfig, format: OutputFormat) -> Result<()> {
    let table = config.prefix_table()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(table.rules())?),
        OutputFormat::Toml => print!("{}", to_toml(config)?),
        OutputFormat::Table if table.is_empty() => println!("No redirect rules configured."),
        OutputFormat::Table => print_rules(table.rules()),
    }
    Ok(())
}

fn print_rules(rules: &[RedirectRule]) {
    let prefix_width = rules
        .iter()
        .map(|r| r.prefix.len())
        .max()
        .unwrap_or(0)
        .max("Prefix".len());
    let repo_width = rules
        .iter()
        .map(|r| r.repository.len())
        .max()
        .unwrap_or(0)
        .max("Repository".len());

    println!(
        "{:<pw$}  {:<rw$}  Subdir",
        "Prefix",
        "Repository",
        pw = prefix_width,
        rw = repo_width
    );
    for rule in rules {
        let subdir = if rule.subdir().is_empty() {
            "/"
        } else {
            rule.subdir()
        };
        println!(
            "{:<pw$}  {:<rw$}  {}",
            rule.prefix,
            rule.repository,
            subdir,
            pw = prefix_width,
            rw = repo_width
        );
    }
}
