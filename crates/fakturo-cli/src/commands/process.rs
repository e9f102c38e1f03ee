//! Process command - run one invoice file through the pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use console::style;
use tracing::{debug, info, warn};

use fakturo_core::{
    CancelToken, Document, OcrResult, PipelineConfig, PipelineCoordinator, ValidationStatus,
};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Show per-field confidence scores
    #[arg(long)]
    show_confidence: bool,

    /// Exit non-zero when overall confidence falls below this value
    #[arg(long)]
    fail_under: Option<f32>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Plain text summary
    Text,
}

pub fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();

    let config = if let Some(path) = config_path {
        PipelineConfig::from_file(Path::new(path))?
    } else {
        PipelineConfig::default()
    };

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }
    if config.engines.is_empty() {
        warn!("no engines configured; only text-based PDFs will produce results");
    }

    info!("Processing file: {}", args.input.display());

    let bytes = fs::read(&args.input)?;
    let id = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();
    let document = Document::from_bytes(id, bytes);

    let coordinator = PipelineCoordinator::from_config(config);
    let result = coordinator
        .submit(&document, &CancelToken::new())
        .map_err(|e| anyhow::anyhow!("processing failed: {}", e))?;

    let output = match args.format {
        OutputFormat::Json => serde_json::to_string_pretty(&result)?,
        OutputFormat::Text => format_text(&result),
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.show_confidence {
        println!();
        println!(
            "{} Overall confidence: {:.1}%",
            style("ℹ").blue(),
            result.overall_confidence.value() * 100.0
        );
        for field in &result.fields {
            println!(
                "  {:<16} {:.1}%",
                field.field.name(),
                field.confidence.value() * 100.0
            );
        }
    }

    if result.needs_review {
        let names: Vec<&str> = result.review_fields.iter().map(|f| f.name()).collect();
        eprintln!(
            "{} Manual review needed: {}",
            style("!").yellow(),
            names.join(", ")
        );
    }
    if result.degraded {
        eprintln!(
            "{} Result produced in degraded mode (fallback engine or truncated run)",
            style("!").yellow()
        );
    }

    debug!("Total processing time: {:?}", start.elapsed());

    if let Some(floor) = args.fail_under {
        if !result.overall_confidence.at_least(floor) {
            anyhow::bail!(
                "overall confidence {:.2} below required {:.2}",
                result.overall_confidence.value(),
                floor
            );
        }
    }

    Ok(())
}

fn format_text(result: &OcrResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("Document: {}\n", result.document_id));
    output.push_str(&format!(
        "Overall confidence: {:.1}%\n\n",
        result.overall_confidence.value() * 100.0
    ));

    for field in &result.fields {
        let value = field
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = match field.status {
            ValidationStatus::Valid => "",
            ValidationStatus::Invalid => "  [INVALID]",
            ValidationStatus::Unverifiable => "  [unverified]",
        };
        output.push_str(&format!("{:<16} {}{}\n", field.field.name(), value, marker));
    }

    if !result.review_fields.is_empty() {
        let names: Vec<&str> = result.review_fields.iter().map(|f| f.name()).collect();
        output.push_str(&format!("\nReview: {}\n", names.join(", ")));
    }

    output
}
