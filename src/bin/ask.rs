use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use pagewise::{
    config::Config,
    logging,
    processing::{DocumentApi, DocumentService},
};
use walkdir::WalkDir;

const PAGE_BREAK: char = '\x0c';

#[derive(Parser)]
#[command(
    name = "pagewise-ask",
    about = "Answer questions about a local text document with page references"
)]
struct Cli {
    /// Text file whose pages are separated by form feeds.
    #[arg(
        long,
        conflicts_with = "pages_dir",
        required_unless_present = "pages_dir"
    )]
    file: Option<PathBuf>,
    /// Directory of per-page `.txt` files, read in file-name order.
    #[arg(long)]
    pages_dir: Option<PathBuf>,
    /// Chunks retrieved per question (overrides `RETRIEVAL_TOP_K`).
    #[arg(long)]
    top_k: Option<usize>,
    /// Print a welcome summary and suggested questions before answering.
    #[arg(long)]
    overview: bool,
    /// Emit service logs.
    #[arg(long)]
    verbose: bool,
    /// Questions to answer.
    questions: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    if cli.verbose {
        logging::init_tracing();
    }

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(top_k) = cli.top_k {
        config.retrieval_top_k = top_k;
        config.validate().context("Invalid --top-k")?;
    }

    let (pages, source) = match (&cli.file, &cli.pages_dir) {
        (Some(file), _) => (read_paged_file(file)?, display_name(file)),
        (None, Some(dir)) => (read_pages_dir(dir)?, display_name(dir)),
        (None, None) => bail!("either --file or --pages-dir is required"),
    };

    let service = DocumentService::from_config(&config)?;
    let session_id = service.create_session().await;
    let outcome = service
        .ingest_document(&session_id, pages, &source)
        .await
        .context("Failed to ingest document")?;
    println!(
        "Indexed '{}': {} pages, {} chunks",
        outcome.source, outcome.page_count, outcome.chunk_count
    );

    if cli.overview {
        let overview = service.document_overview(&session_id, 3).await?;
        println!("\n{}", overview.summary);
        for question in &overview.questions {
            println!("  - {question}");
        }
    }

    for question in &cli.questions {
        println!("\nQ: {question}");
        match service.answer_query(&session_id, question).await {
            Ok(answer) => {
                for segment in &answer.answer_segments {
                    match segment.page_number {
                        Some(page) => println!("  {} [p. {page}]", segment.text),
                        None => println!("  {}", segment.text),
                    }
                }
            }
            Err(error) => eprintln!("  {}", error.user_message()),
        }
    }

    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn read_paged_file(path: &Path) -> Result<Vec<String>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(split_pages(&text))
}

fn split_pages(text: &str) -> Vec<String> {
    let mut pages: Vec<String> = text.split(PAGE_BREAK).map(str::to_string).collect();
    // A trailing form feed closes the last page rather than opening a new one.
    if pages.len() > 1 && pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }
    pages
}

fn read_pages_dir(dir: &Path) -> Result<Vec<String>> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "txt") {
            continue;
        }
        let page =
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        pages.push(page);
    }
    if pages.is_empty() {
        bail!("no .txt pages found in {}", dir.display());
    }
    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_separate_pages() {
        let pages = split_pages("first page\x0csecond page\x0c");
        assert_eq!(pages, vec!["first page", "second page"]);
    }

    #[test]
    fn text_without_form_feed_is_one_page() {
        assert_eq!(split_pages("only page"), vec!["only page"]);
    }

    #[test]
    fn pages_dir_is_read_in_name_order() {
        let dir = std::env::temp_dir().join(format!("pagewise-ask-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).expect("temp dir");
        fs::write(dir.join("02.txt"), "second").expect("write");
        fs::write(dir.join("01.txt"), "first").expect("write");
        fs::write(dir.join("notes.md"), "ignored").expect("write");

        let pages = read_pages_dir(&dir).expect("pages");

        fs::remove_dir_all(&dir).ok();
        assert_eq!(pages, vec!["first", "second"]);
    }
}
