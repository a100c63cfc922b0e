#![doc = include_str!("../README.md")]

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use richdoc::{DocxExporter, ExportConfig, Node};

/// Exports a rich-document tree to DOCX, or to PDF through an office suite.
#[derive(Debug, Clone, Parser)]
#[clap(name = "richdoc", version, about)]
pub struct ExportArgs {
    /// Path to the document tree as JSON, or `-` to read it from stdin
    #[clap(value_name = "INPUT")]
    pub input: String,

    /// Path to output file, or `-` to write it to stdout
    #[clap(value_name = "OUTPUT", default_value = None)]
    pub output: Option<String>,

    /// Path to a TOML export configuration
    #[clap(long, value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Converts the package to PDF
    #[clap(long)]
    pub pdf: bool,

    /// The office suite executable used for PDF conversion
    #[clap(
        long,
        value_name = "PROGRAM",
        env = "RICHDOC_SOFFICE",
        default_value = "soffice"
    )]
    pub soffice: PathBuf,

    /// The time limit of the PDF conversion, in seconds
    #[clap(long, value_name = "SECS", default_value_t = 120)]
    pub timeout: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = ExportArgs::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime.block_on(run(args))
}

async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let from_stdin = args.input == "-";
    let is_stdout = args.output.as_deref() == Some("-") || (from_stdin && args.output.is_none());
    let extension = if args.pdf { "pdf" } else { "docx" };
    let output_path = args
        .output
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(&args.input).with_extension(extension));

    let json = if from_stdin {
        let mut json = String::new();
        std::io::stdin()
            .read_to_string(&mut json)
            .context("failed to read from stdin")?;
        json
    } else {
        tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("failed to read {}", args.input))?
    };
    let doc = Node::from_json(&json).context("invalid document tree")?;

    let config = match &args.config {
        Some(path) => ExportConfig::load(path).await?,
        None => ExportConfig::default(),
    };

    let docx = DocxExporter::new(config)?.export(&doc).await?;
    let result = if args.pdf {
        to_pdf(&args.soffice, args.timeout, docx, &output_path).await?
    } else {
        docx
    };

    if is_stdout {
        std::io::stdout()
            .write_all(&result)
            .context("failed to write to stdout")?;
    } else if let Err(err) = tokio::fs::write(&output_path, &result).await {
        bail!("failed to write file {output_path:?}: {err}");
    }

    Ok(())
}

async fn to_pdf(
    soffice: &Path,
    timeout: u64,
    docx: Vec<u8>,
    output: &Path,
) -> anyhow::Result<Vec<u8>> {
    use richdoc_convert::{ConverterSession, SessionConfig, SofficeBackend};

    let session = ConverterSession::open(
        SofficeBackend::new(soffice),
        SessionConfig {
            timeout: Duration::from_secs(timeout),
        },
    );
    session.ready().await?;

    let name = output.with_extension("docx");
    let name = name
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.docx");
    let pdf = session.convert(docx, name)?.wait().await;
    session.close().await;
    Ok(pdf?.to_vec())
}
