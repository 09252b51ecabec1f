//! Image Harvest CLI — entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use image_harvest::{EngineTable, InvocationOrigin, Platform};
use image_harvest_cli::config::{load_settings, resolve_config_path};
use image_harvest_cli::input::PageSource;
use image_harvest_cli::{run_extract, ExtractOptions, StdoutSink};

#[derive(Parser)]
#[command(
    name = "image-harvest",
    about = "Find the images around a point in a page and prepare them for reverse image search",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OriginArg {
    Action,
    ContextMenu,
}

impl From<OriginArg> for InvocationOrigin {
    fn from(arg: OriginArg) -> Self {
        match arg {
            OriginArg::Action => InvocationOrigin::Action,
            OriginArg::ContextMenu => InvocationOrigin::ContextMenu,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformArg {
    Chromium,
    Gecko,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Chromium => Platform::Chromium,
            PlatformArg::Gecko => Platform::Gecko,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline and print messages as JSON lines on stdout.
    #[command(group(ArgGroup::new("page").required(true).args(["snapshot", "html"])))]
    Extract {
        /// Page snapshot JSON produced by a renderer.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Static HTML file.
        #[arg(long)]
        html: Option<PathBuf>,

        /// Base URL for --html (defaults to the file's own URL).
        #[arg(long, requires = "html")]
        base_url: Option<String>,

        /// Element id of the touch target.
        #[arg(long)]
        target_id: Option<String>,

        /// Touch point x in viewport pixels.
        #[arg(long, requires = "y")]
        x: Option<f64>,

        /// Touch point y in viewport pixels.
        #[arg(long, requires = "x")]
        y: Option<f64>,

        /// Destination search engine id.
        #[arg(long, default_value = "google")]
        engine: String,

        #[arg(long, value_enum, default_value = "action")]
        origin: OriginArg,

        #[arg(long, value_enum, default_value = "chromium")]
        platform: PlatformArg,

        /// Settings file (JSON).
        #[arg(long)]
        config: Option<String>,
    },

    /// Print the engine table as JSON.
    Engines,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   image-harvest completions bash > ~/.local/share/bash-completion/completions/image-harvest
    ///   image-harvest completions zsh > ~/.zfunc/_image-harvest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Extract {
            snapshot,
            html,
            base_url,
            target_id,
            x,
            y,
            engine,
            origin,
            platform,
            config,
        } => {
            let source = match (snapshot, html) {
                (Some(path), _) => PageSource::Snapshot(path),
                (None, Some(path)) => PageSource::Html { path, base_url },
                (None, None) => anyhow::bail!("one of --snapshot or --html is required"),
            };
            let config_path = resolve_config_path(config.as_deref());
            let settings = load_settings(config_path.as_deref())?;

            let options = ExtractOptions {
                source,
                target_id,
                point: x.zip(y),
                engine,
                origin: origin.into(),
                platform: platform.into(),
                settings,
            };

            if let Err(e) = run_extract(options, Arc::new(StdoutSink::stdout())).await {
                eprintln!("Extraction failed: {e}");
                std::process::exit(1);
            }
        }

        Commands::Engines => {
            let engines: Vec<_> = EngineTable::new()
                .entries()
                .into_iter()
                .map(|(engine, supports_url)| {
                    serde_json::json!({ "engine": engine, "supportsUrl": supports_url })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&engines)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "image-harvest", &mut std::io::stdout());
        }
    }

    Ok(())
}
