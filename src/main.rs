// src/main.rs
use clap::{ArgGroup, Parser};
use filing_sections::edgar::{EdgarClient, FilingInfo, FilingSource};
use filing_sections::edgar::client::DEFAULT_REQUEST_DELAY_MS;
use filing_sections::oracle::anthropic::DEFAULT_MODEL;
use filing_sections::oracle::{AnthropicClient, LlmOracle};
use filing_sections::utils::{logging, AppError};
use filing_sections::{FilingParser, FilingSection, ParsedFiling, ParserConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Command Line Interface for the 10-K structure parser
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("source").required(true).args(["ticker", "cik", "url", "file"])))]
struct Args {
    /// Ticker symbol of the company
    #[arg(short, long)]
    ticker: Option<String>,

    /// Company CIK (digits, leading zeros optional)
    #[arg(long)]
    cik: Option<String>,

    /// URL of a filing document on EDGAR
    #[arg(long)]
    url: Option<String>,

    /// Local filing document (HTML)
    #[arg(long)]
    file: Option<String>,

    /// Form type to look up when resolving by ticker or CIK
    #[arg(long, default_value = "10-K")]
    form_type: String,

    /// Section paths to print, e.g. "part_2.item_7" or "Part1.Item1A" (repeatable)
    #[arg(short, long)]
    path: Vec<String>,

    /// Comma-separated keywords to search section content for
    #[arg(short, long, value_delimiter = ',')]
    keywords: Vec<String>,

    /// Number of leading chunks offered to the oracle
    #[arg(long)]
    max_chunks: Option<usize>,

    /// Target chunk size in characters
    #[arg(long)]
    max_chunk_size: Option<usize>,

    /// Parse with the deterministic fallbacks only
    #[arg(long)]
    no_oracle: bool,

    /// Print the parsed structure as JSON on stdout
    #[arg(long)]
    json: bool,

    /// User-Agent sent to EDGAR (SEC asks for "Name email")
    #[arg(long, env = "SEC_USER_AGENT", default_value = "filing_sections research@example.com")]
    user_agent: String,

    /// Delay before every EDGAR request, in milliseconds
    #[arg(long, env = "EDGAR_REQUEST_DELAY_MS", default_value_t = DEFAULT_REQUEST_DELAY_MS)]
    request_delay_ms: u64,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "ANTHROPIC_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
}

#[derive(Serialize)]
struct Report<'p> {
    filing: Option<&'p FilingInfo>,
    parsed: &'p ParsedFiling,
    lookups: Vec<Lookup<'p>>,
    keyword_matches: Vec<String>,
}

#[derive(Serialize)]
struct Lookup<'p> {
    requested: String,
    section: Option<&'p FilingSection>,
}

fn build_parser(args: &Args) -> Result<FilingParser, AppError> {
    let mut config = ParserConfig::default();
    if let Some(n) = args.max_chunks {
        config.max_oracle_chunks = n;
    }
    if let Some(size) = args.max_chunk_size {
        if size == 0 {
            return Err(AppError::Config("--max-chunk-size must be positive".to_string()));
        }
        config.max_chunk_size = size;
    }

    let parser = FilingParser::new(config);
    match (&args.api_key, args.no_oracle) {
        (Some(key), false) if !key.trim().is_empty() => {
            let client = AnthropicClient::new(key.trim(), &args.model)?;
            tracing::info!("Oracle enabled (model {})", client.model());
            Ok(parser.with_oracle(Arc::new(LlmOracle::new(client))))
        }
        (_, true) => {
            tracing::info!("Oracle disabled by --no-oracle");
            Ok(parser)
        }
        _ => {
            tracing::info!("No ANTHROPIC_API_KEY set; using deterministic fallbacks only");
            Ok(parser)
        }
    }
}

fn print_summary(parsed: &ParsedFiling, filing: Option<&FilingInfo>) {
    if let Some(f) = filing {
        println!("{} {} filed {} ({})", f.company_name, f.form_type, f.filing_date, f.accession_number);
    }
    println!("Source: {}", parsed.filing_url);
    println!(
        "Length: {} chars ({} after cleaning), {} chunk(s), {} section(s)",
        parsed.total_length,
        parsed.cleaned_length,
        parsed.chunks_processed,
        parsed.section_count()
    );
    for (path, section) in parsed.walk() {
        println!(
            "  {:<28} {:<55} {:>8} chars {:>2} visual(s)",
            path,
            section.title,
            section.content.chars().count(),
            section.visual_elements.len()
        );
    }
}

fn preview(content: &str, limit: usize) -> String {
    let mut out: String = content.chars().take(limit).collect();
    if content.chars().count() > limit {
        out.push_str("...");
    }
    out
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    logging::setup_logging();

    // 2. Parse CLI Arguments
    let args = Args::parse();
    tracing::debug!(
        "Starting processing for ticker={:?} cik={:?} url={:?} file={:?} form={}",
        args.ticker,
        args.cik,
        args.url,
        args.file,
        args.form_type
    );

    // 3. Build the parser, with the oracle when a key is configured
    let parser = build_parser(&args)?;

    // 4. Obtain the raw filing
    let edgar = EdgarClient::new(&args.user_agent)?
        .with_request_delay(Duration::from_millis(args.request_delay_ms));
    let (filing, raw, source_url) = if let Some(file) = &args.file {
        tracing::info!("Reading filing from {}", file);
        (None, std::fs::read_to_string(file)?, file.clone())
    } else if let Some(url) = &args.url {
        (None, edgar.fetch_raw_document(url).await?, url.clone())
    } else {
        let company = args
            .cik
            .as_deref()
            .or(args.ticker.as_deref())
            .ok_or_else(|| AppError::Config("one of --ticker, --cik, --url or --file is required".to_string()))?;
        let info = edgar.resolve_latest_filing(company, &args.form_type).await?;
        tracing::info!(
            "Latest {} for {}: {} filed {}",
            info.form_type,
            info.company_name,
            info.accession_number,
            info.filing_date
        );
        let raw = edgar.fetch_raw_document(&info.document_url).await?;
        let url = info.document_url.clone();
        (Some(info), raw, url)
    };
    tracing::info!("Loaded document ({} bytes)", raw.len());

    // 5. Parse
    let parsed = parser.parse_filing(&raw, &source_url).await;
    if parsed.is_empty() {
        tracing::warn!("No sections recognised in {}", source_url);
    }

    // 6. Path lookups and keyword search
    let mut lookups = Vec::new();
    for requested in &args.path {
        let section = parser.get_section_by_path(&parsed, requested).await?;
        if section.is_none() {
            tracing::warn!("No section found for path '{}'", requested);
        }
        lookups.push(Lookup {
            requested: requested.clone(),
            section,
        });
    }
    let keyword_matches: Vec<String> = parser
        .find_sections_by_keywords(&parsed, &args.keywords)
        .into_iter()
        .map(|(path, _)| path)
        .collect();

    // 7. Output
    if args.json {
        let report = Report {
            filing: filing.as_ref(),
            parsed: &parsed,
            lookups,
            keyword_matches,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_summary(&parsed, filing.as_ref());
    for lookup in &lookups {
        match lookup.section {
            Some(section) => {
                println!("\n== {} -> {} {} ==", lookup.requested, section.section_id.label(), section.title);
                println!("{}", preview(&section.content, 2_000));
                for visual in &section.visual_elements {
                    println!("  [{}] {}", visual.id, visual.description);
                }
            }
            None => println!("\n== {} -> not found ==", lookup.requested),
        }
    }
    if !args.keywords.is_empty() {
        println!("\nKeyword matches ({}): {}", args.keywords.join(", "), keyword_matches.join(", "));
    }

    Ok(())
}
