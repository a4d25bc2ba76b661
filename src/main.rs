//! # mise CLI
//!
//! Command-line interface for kitchen label printing.
//!
//! ## Usage
//!
//! ```bash
//! # Run the HTTP service
//! mise serve --config mise.toml
//!
//! # Encode a request to a TSPL command buffer
//! mise encode label.json --output label.tspl
//!
//! # Render the monochrome bitmap the printer would receive
//! mise preview label.json --output label.png
//!
//! # Summarise a command buffer
//! mise decode label.tspl
//!
//! # Print through the local bridge
//! mise print label.json --transport bridge
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use mise::{
    Config, Dispatcher, LabelPipeline, MiseError, PrintRequest,
    protocol::CommandBuffer,
    server::{self, AppState},
    session::PrinterSession,
    transport::{BridgeTransport, TransportKind, WirelessTransport},
};

/// mise - Kitchen label printer utility
#[derive(Parser, Debug)]
#[command(name = "mise")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags that take precedence over the configuration file.
#[derive(Args, Debug)]
struct Overrides {
    /// Luminance cut-off for monochrome conversion
    #[arg(long, global = true)]
    threshold: Option<u8>,

    /// Render deadline in milliseconds
    #[arg(long, global = true)]
    render_timeout_ms: Option<u64>,

    /// Bridge endpoint (host:port)
    #[arg(long, global = true)]
    bridge: Option<String>,

    /// Wireless printer address (skips discovery)
    #[arg(long, global = true)]
    address: Option<String>,

    /// Wireless printer name prefix for discovery
    #[arg(long, global = true)]
    name_prefix: Option<String>,

    /// Largest single wireless write in bytes
    #[arg(long, global = true)]
    chunk_bytes: Option<usize>,

    /// Connect attempts per session (1 = no retry)
    #[arg(long, global = true)]
    connect_attempts: Option<u32>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(threshold) = self.threshold {
            config.threshold = threshold;
        }
        if let Some(ms) = self.render_timeout_ms {
            config.render_timeout_ms = ms;
        }
        if let Some(endpoint) = self.bridge {
            config.bridge.endpoint = endpoint;
        }
        if self.address.is_some() {
            config.wireless.address = self.address;
        }
        if let Some(prefix) = self.name_prefix {
            config.wireless.name_prefix = prefix;
        }
        if let Some(bytes) = self.chunk_bytes {
            config.wireless.max_chunk_bytes = bytes;
        }
        if let Some(attempts) = self.connect_attempts {
            config.retry.max_attempts = attempts;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on (overrides the config file)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Encode a label request (JSON) to a TSPL command buffer
    Encode {
        /// Request file, `-` for stdin
        input: PathBuf,

        /// Write the raw buffer here instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print the buffer base64 encoded
        #[arg(long)]
        base64: bool,
    },

    /// Render a label request to a PNG of the monochrome bitmap
    Preview {
        /// Request file, `-` for stdin
        input: PathBuf,

        #[arg(long, short, value_name = "FILE")]
        output: PathBuf,
    },

    /// Summarise the labels in a TSPL command buffer
    Decode {
        /// Buffer file, `-` for stdin
        input: PathBuf,
    },

    /// Encode a label request and send it to a printer
    Print {
        /// Request file, `-` for stdin
        input: PathBuf,

        #[arg(long, default_value = "bridge")]
        transport: TransportKind,

        /// Number of copies (overrides the request)
        #[arg(long)]
        copies: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mise=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), MiseError> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.overrides.apply(&mut config);
    config.validate()?;

    match cli.command {
        Commands::Serve { listen } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }

            let pipeline = pipeline(&config);
            let dispatcher = dispatcher(&config);
            server::serve(AppState::new(config, pipeline, dispatcher)).await
        }

        Commands::Encode {
            input,
            output,
            base64,
        } => {
            let request = read_request(&input)?;
            let buffer = pipeline(&config).encode(&request).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, buffer.as_bytes())?;
                    info!(path = %path.display(), bytes = buffer.len(), "wrote command buffer");
                }
                None if base64 => println!("{}", STANDARD.encode(buffer.as_bytes())),
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(buffer.as_bytes())?;
                }
            }
            Ok(())
        }

        Commands::Preview { input, output } => {
            let request = read_request(&input)?;
            let png = pipeline(&config).preview(&request).await?;
            std::fs::write(&output, png)?;
            println!("Saved to {}", output.display());
            Ok(())
        }

        Commands::Decode { input } => {
            let bytes = read_input(&input)?;
            let labels = CommandBuffer::parse_all(&bytes)?;
            for (i, label) in labels.iter().enumerate() {
                println!(
                    "#{} {}x{} mm, gap {} mm, bitmap {}x{} px (mode {}), {} cop{}{}",
                    i,
                    label.width_mm,
                    label.height_mm,
                    label.gap_mm,
                    label.bitmap.width_bytes * 8,
                    label.bitmap.height,
                    label.bitmap.mode.code(),
                    label.copies,
                    if label.copies == 1 { "y" } else { "ies" },
                    if label.cut { ", cut" } else { "" },
                );
            }
            Ok(())
        }

        Commands::Print {
            input,
            transport,
            copies,
        } => {
            let mut request = read_request(&input)?;
            if let Some(copies) = copies {
                request.copies = copies;
            }
            let job = pipeline(&config).job(&request).await?;

            let dispatcher = dispatcher(&config);
            dispatcher.connect(transport).await?;
            let result = dispatcher.dispatch(transport, std::slice::from_ref(&job)).await;
            dispatcher.disconnect(transport).await?;
            let report = result?;

            println!(
                "Printed {} cop{} of '{}' over {} ({} bytes, {} writes)",
                report.copies,
                if report.copies == 1 { "y" } else { "ies" },
                job.label_id,
                transport,
                report.bytes,
                report.writes,
            );
            Ok(())
        }
    }
}

fn pipeline(config: &Config) -> LabelPipeline {
    LabelPipeline::default()
        .with_render_timeout(config.render_timeout())
        .with_threshold(config.threshold)
        .with_options(config.encode.options())
}

fn dispatcher(config: &Config) -> Dispatcher {
    let retry = config.retry_config();
    Dispatcher::new()
        .with_session(PrinterSession::with_retry(
            Box::new(BridgeTransport::tcp(config.bridge.clone())),
            retry.clone(),
        ))
        .with_session(PrinterSession::with_retry(
            Box::new(WirelessTransport::rfcomm(config.wireless.clone())),
            retry,
        ))
}

fn read_input(path: &Path) -> Result<Vec<u8>, MiseError> {
    if path == Path::new("-") {
        use std::io::Read;
        let mut bytes = Vec::new();
        std::io::stdin().read_to_end(&mut bytes)?;
        Ok(bytes)
    } else {
        Ok(std::fs::read(path)?)
    }
}

fn read_request(path: &Path) -> Result<PrintRequest, MiseError> {
    let bytes = read_input(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| MiseError::Validation(format!("{}: {}", path.display(), e)))
}
