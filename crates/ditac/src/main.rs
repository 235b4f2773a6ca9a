//! ditac CLI - Main entry point

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use ditac_diagnostics::{DiagnosticMessage, DiagnosticSink};
use ditac_preprocess::{FileSystemSource, Media, PreProcessor, PreprocessOptions, uri};
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod output;

#[derive(Parser)]
#[command(name = "ditac")]
#[command(version)]
#[command(about = "Resolve the keys, references and conditions of DITA maps and topics", long_about = None)]
struct Cli {
    /// Input maps or topics (paths or URLs). The first map is the main map
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<String>,

    /// Ditaval profile applied to the whole deliverable
    #[arg(long, value_name = "DITAVAL")]
    filter: Option<String>,

    /// Target medium, selecting which `print` values are excluded
    #[arg(long, value_enum)]
    media: Option<MediaArg>,

    /// Keep topicrefs having processing-role="resource-only" in the map
    #[arg(long)]
    keep_resource_only: bool,

    /// JSON file with preprocessing options; flags override it
    #[arg(long, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Write the resolved map and topics to DIR
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Print the key spaces of the main map
    #[arg(long)]
    dump_keys: bool,

    /// Report diagnostics as JSON
    #[arg(long)]
    json_diagnostics: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MediaArg {
    Screen,
    Print,
}

impl From<MediaArg> for Media {
    fn from(media: MediaArg) -> Self {
        match media {
            MediaArg::Screen => Media::Screen,
            MediaArg::Print => Media::Print,
        }
    }
}

impl Cli {
    fn options(&self) -> Result<PreprocessOptions> {
        let mut options = match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Cannot read {}", path.display()))?;
                PreprocessOptions::from_json_str(&json)
                    .with_context(|| format!("Invalid options in {}", path.display()))?
            }
            None => PreprocessOptions::default(),
        };
        if let Some(filter) = &self.filter {
            options.external_filter = Some(filter.clone());
        }
        if let Some(media) = self.media {
            options.media = media.into();
        }
        if self.keep_resource_only {
            options.exclude_resource_only = false;
        }
        Ok(options)
    }
}

fn report(messages: &[DiagnosticMessage], json: bool) {
    if json {
        let values: Vec<serde_json::Value> = messages.iter().map(DiagnosticMessage::to_json).collect();
        eprintln!("{}", serde_json::Value::Array(values));
    } else {
        for message in messages {
            eprintln!("{}", message.to_text());
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging. Diagnostics are rendered below, not logged.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ditac=info,ditac_diagnostics=off".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let options = cli.options()?;

    let mut inputs = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        match uri::from_path_or_url(input) {
            Some(url) => inputs.push(url),
            None => bail!("Invalid input `{}`", input),
        }
    }

    let sink = DiagnosticSink::new();
    let result = PreProcessor::new(options, Rc::new(FileSystemSource), sink.clone()).run(&inputs);
    let mut messages = sink.take();
    let preprocessed = match result {
        Ok(preprocessed) => preprocessed,
        Err(err) => {
            messages.push(err.to_diagnostic());
            report(&messages, cli.json_diagnostics);
            bail!("Preprocessing failed");
        }
    };
    report(&messages, cli.json_diagnostics);

    if cli.dump_keys {
        print!("{}", preprocessed.key_spaces);
    }

    if let Some(dir) = &cli.out {
        let written = output::write_documents(&preprocessed, dir)?;
        tracing::info!(files = written.len(), dir = %dir.display(), "wrote documents");
    }

    let errors = messages
        .iter()
        .filter(|m| m.kind == ditac_diagnostics::DiagnosticKind::Error)
        .count();
    if errors > 0 {
        bail!("{} error(s) reported", errors);
    }
    Ok(())
}
