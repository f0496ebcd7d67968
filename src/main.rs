use anyhow::{bail, Context, Result};
use clap::Parser;
use ggspec::backend::{to_png, to_svg};
use ggspec::data::{self, Dataset};
use ggspec::{gg, ChartSpec, OutputFormat, RenderOptions};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ggspec")]
#[command(about = "Render declarative JSON chart specs to PNG or SVG", long_about = None)]
struct Args {
    /// Chart spec: a path to a JSON file, or inline JSON
    spec: String,

    /// Data file (.csv or .json). Read from stdin when omitted
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Padding around the plotting area, in pixels
    #[arg(long)]
    padding: Option<f64>,

    #[arg(short, long, value_parser = ["png", "svg"])]
    format: Option<String>,

    /// Output file. Written to stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let spec_text = if Path::new(&args.spec).is_file() {
        fs::read_to_string(&args.spec).with_context(|| format!("Failed to read spec file '{}'", args.spec))?
    } else {
        args.spec.clone()
    };
    let spec = ChartSpec::parse(&spec_text).context("Failed to parse chart spec")?;

    let dataset = match &args.data {
        Some(path) => read_data_file(path)?,
        None => read_data_stdin().context("Failed to read data from stdin")?,
    };
    debug!(records = dataset.len(), "Loaded data");

    let options = resolve_options(&args, spec.options.clone())?;
    let scene = gg(&spec, &dataset, &options).context("Failed to render chart")?;

    let bytes = match options.format {
        OutputFormat::Png => to_png(&scene)?,
        OutputFormat::Svg => to_svg(&scene).into_bytes(),
    };

    match &args.output {
        Some(path) => {
            fs::write(path, &bytes).with_context(|| format!("Failed to write '{}'", path.display()))?;
            info!(path = %path.display(), bytes = bytes.len(), "Wrote chart");
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(&bytes).context("Failed to write chart to stdout")?;
            handle.flush().context("Failed to flush stdout")?;
        }
    }

    Ok(())
}

/// Command line flags override the spec's own `options`.
fn resolve_options(args: &Args, from_spec: Option<RenderOptions>) -> Result<RenderOptions> {
    let mut options = from_spec.unwrap_or_default();
    if let Some(width) = args.width {
        options.width = width;
    }
    if let Some(height) = args.height {
        options.height = height;
    }
    if let Some(padding) = args.padding {
        options.padding = padding;
    }
    match args.format.as_deref() {
        Some("png") => options.format = OutputFormat::Png,
        Some("svg") => options.format = OutputFormat::Svg,
        Some(other) => bail!("Unknown output format '{}'", other),
        None => {
            // the output extension picks the format when nothing else does
            if args.output.as_ref().and_then(|p| p.extension()).is_some_and(|e| e == "svg") {
                options.format = OutputFormat::Svg;
            }
        }
    }
    if options.width == 0 || options.height == 0 {
        bail!("Width and height must be positive");
    }
    Ok(options)
}

fn read_data_file(path: &Path) -> Result<Dataset> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read data file '{}'", path.display()))?;
    let is_json = path.extension().is_some_and(|e| e == "json");
    parse_data(&content, is_json).with_context(|| format!("Failed to parse data file '{}'", path.display()))
}

fn read_data_stdin() -> Result<Dataset> {
    let mut content = String::new();
    io::stdin().read_to_string(&mut content)?;
    let is_json = content.trim_start().starts_with('[');
    parse_data(&content, is_json)
}

fn parse_data(content: &str, is_json: bool) -> Result<Dataset> {
    if content.trim().is_empty() {
        return Ok(Dataset::new());
    }
    let dataset = if is_json {
        let value: serde_json::Value = serde_json::from_str(content)?;
        data::from_json(&value)?
    } else {
        data::from_csv(content.as_bytes())?
    };
    Ok(dataset)
}
