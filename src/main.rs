use anyhow::{bail, Context, Result};
use clap::Parser;
use prettytable::{Cell, Row as PrettyRow, Table};
use scrivener::backend::http::HttpVisionBackend;
use scrivener::document::{DocumentPayload, DocumentType};
use scrivener::logging::configure_logging;
use scrivener::pipeline::Pipeline;
use scrivener::reconcile::diff::ChangeSet;
use scrivener::store::http::HttpRecordStore;
use scrivener::RunParams;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[clap(
    name = "scrivener",
    about = "Extract intake-form data and propose record-store changes for review"
)]
struct Cli {
    /// Pre-rendered page images of one document, in page order
    #[clap(required = true)]
    pages: Vec<PathBuf>,

    /// Skip detection and treat the document as this type
    #[clap(long)]
    document_type: Option<String>,

    /// Write the full change-set as JSON to this path
    #[clap(long)]
    output: Option<PathBuf>,

    /// Per-call extraction backend timeout in seconds
    #[clap(long, default_value = "120")]
    backend_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    configure_logging();
    let cli = Cli::parse();

    let backend_url =
        env::var("SCRIVENER_BACKEND_URL").context("SCRIVENER_BACKEND_URL is required")?;
    let backend_key =
        env::var("SCRIVENER_BACKEND_KEY").context("SCRIVENER_BACKEND_KEY is required")?;
    let model = env::var("SCRIVENER_MODEL").unwrap_or_else(|_| "vision-default".to_string());
    let store_url = env::var("SCRIVENER_STORE_URL").context("SCRIVENER_STORE_URL is required")?;
    let store_key = env::var("SCRIVENER_STORE_KEY").context("SCRIVENER_STORE_KEY is required")?;

    let document = load_document(&cli.pages)?;
    let document_type = cli
        .document_type
        .as_deref()
        .map(DocumentType::from)
        .filter(|t| *t != DocumentType::Unknown);

    let backend = HttpVisionBackend::new(&backend_url, &backend_key, &model);
    let store = HttpRecordStore::new(&store_url, &store_key);
    let params = RunParams {
        backend_timeout: Duration::from_secs(cli.backend_timeout),
        ..RunParams::default()
    };

    let pipeline = Pipeline::new(&backend, &store).with_params(params);
    let change_set = pipeline.process(&document, document_type).await?;

    print_change_set(&change_set);

    if let Some(path) = cli.output {
        let json = serde_json::to_string_pretty(&change_set)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing change-set to {}", path.display()))?;
        info!("Change-set written to {}", path.display());
    }

    Ok(())
}

fn load_document(pages: &[PathBuf]) -> Result<DocumentPayload> {
    let media_type = media_type_for(&pages[0])?;
    let mut images = Vec::with_capacity(pages.len());

    for page in pages {
        if media_type_for(page)? != media_type {
            bail!("all pages of one document must share a media type");
        }
        let bytes =
            std::fs::read(page).with_context(|| format!("reading {}", page.display()))?;
        images.push(bytes);
    }

    let source_name = pages[0]
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(DocumentPayload::from_page_images(
        images,
        media_type,
        &source_name,
    ))
}

fn media_type_for(path: &Path) -> Result<&'static str> {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => Ok("image/png"),
        Some("jpg") | Some("jpeg") => Ok("image/jpeg"),
        Some("gif") => Ok("image/gif"),
        Some("webp") => Ok("image/webp"),
        Some("pdf") => bail!("render PDF pages to images before running extraction"),
        other => bail!("unsupported page format: {:?}", other),
    }
}

fn print_change_set(change_set: &ChangeSet) {
    println!(
        "\n{} ({}), confidence {:.0}%",
        change_set.contact_name,
        change_set
            .contact_id
            .map(|id| format!("record {}", id))
            .unwrap_or_else(|| "new contact".to_string()),
        change_set.extraction_confidence * 100.0
    );

    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("Field"),
        Cell::new("Current"),
        Cell::new("Proposed"),
        Cell::new("Change"),
        Cell::new("Confidence"),
    ]));

    for change in &change_set.changes {
        table.add_row(PrettyRow::new(vec![
            Cell::new(&change.label),
            Cell::new(change.current_value.as_deref().unwrap_or("-")),
            Cell::new(&change.proposed_value),
            Cell::new(&change.classification.to_string()),
            Cell::new(&format!("{:.0}%", change.confidence * 100.0)),
        ]));
    }
    table.printstd();

    if !change_set.family_members.is_empty() {
        println!("\nFamily members:");
        for member in &change_set.family_members {
            let action = member
                .action
                .map(|a| a.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} {} -> {}",
                member.relationship,
                member.display_name(),
                action
            );
        }
    }

    if !change_set.primary_candidates.is_empty() {
        println!(
            "\n{} candidate records need manual disambiguation before applying.",
            change_set.primary_candidates.len()
        );
    }

    let metrics = &change_set.metrics;
    println!(
        "\n{} iterations, {} backend calls, {} critique corrections, errors {} -> {}",
        metrics.iterations,
        metrics.total_backend_calls,
        metrics.critique_corrections,
        metrics.validation_errors_initial,
        metrics.validation_errors_final
    );

    if !change_set.validation_issues.is_empty() {
        println!("\nOutstanding validation issues:");
        for issue in &change_set.validation_issues {
            println!("  [{}] {}", issue.severity, issue.message);
        }
    }
}
