//! # certpress CLI
//!
//! Command-line interface for certificate rendering.
//!
//! ## Usage
//!
//! ```bash
//! # Run the HTTP API
//! certpress serve --listen 0.0.0.0:5000
//!
//! # Render one certificate into generated/
//! certpress render --template-id default-1 --row name=Ann --row course=Rust --out ann.pdf
//!
//! # Run a whole batch offline
//! certpress generate --file attendees.csv --template-id default-1 --map name="Full Name"
//! ```

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use certpress::{
    CertError,
    batch::{BatchParams, GenerateRequest, OutputFormat},
    config::Settings,
    render::{ItemRenderer, RenderOutput, Renderer},
    rows::{FieldMapping, Row},
    server::{self, AppState},
    template::TemplateStore,
};

/// certpress - certificate template rendering and batch generation
#[derive(Parser, Debug)]
#[command(name = "certpress")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:5000")]
        listen: String,

        #[command(flatten)]
        settings: Settings,
    },

    /// Render a single certificate
    Render {
        /// Template identifier
        #[arg(long)]
        template_id: String,

        /// Row value as key=value (repeatable)
        #[arg(long = "row", value_name = "KEY=VALUE", value_parser = parse_pair)]
        rows: Vec<(String, String)>,

        /// Output file name inside the generated directory
        #[arg(long, default_value = "preview.png")]
        out: String,

        #[command(flatten)]
        settings: Settings,
    },

    /// Generate certificates for every row of an uploaded spreadsheet
    Generate {
        /// Spreadsheet name inside the uploads directory
        #[arg(long)]
        file: String,

        /// Template identifier
        #[arg(long)]
        template_id: String,

        /// Field mapping as field=column (repeatable)
        #[arg(long = "map", value_name = "FIELD=COLUMN", value_parser = parse_pair)]
        map: Vec<(String, String)>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Png)]
        format: OutputFormat,

        #[command(flatten)]
        settings: Settings,
    },
}

fn parse_pair(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", value))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), CertError> {
    match command {
        Commands::Serve { listen, settings } => server::serve(settings, &listen).await,

        Commands::Render {
            template_id,
            rows,
            out,
            settings,
        } => {
            settings.ensure_dirs()?;
            let templates = TemplateStore::new(settings.templates_path());
            templates.seed_if_missing().await?;
            let template = templates
                .get(&template_id)
                .await?
                .ok_or(CertError::TemplateNotFound(template_id))?;

            let row: Row = rows.into_iter().collect();
            let renderer = Renderer::from_settings(&settings)?;
            match renderer.render(&template, &row, Some(out.as_str())).await? {
                RenderOutput::File(path) => println!("{}", path.display()),
                RenderOutput::Bytes(bytes) => info!(bytes = bytes.len(), "rendered in memory"),
            }
            Ok(())
        }

        Commands::Generate {
            file,
            template_id,
            map,
            format,
            settings,
        } => {
            settings.ensure_dirs()?;
            let state = Arc::new(AppState::new(settings)?);
            state.templates.seed_if_missing().await?;

            let mapping: FieldMapping = map.into_iter().collect();
            let batch = state
                .batches
                .create(BatchParams {
                    filename: Some(file),
                    template_id: Some(template_id),
                    mapping,
                    format,
                })
                .await?;

            let summary = state
                .orchestrator
                .generate(&batch.id, GenerateRequest::default())
                .await?;
            let json = serde_json::to_string_pretty(&summary)
                .map_err(|e| CertError::Render(e.to_string()))?;
            println!("{}", json);
            Ok(())
        }
    }
}
