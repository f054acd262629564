// tests/parse_pipeline.rs
use async_trait::async_trait;
use filing_sections::filing::ElementKind;
use filing_sections::oracle::{ChunkAnalysis, FilingOracle, PathCandidate, SectionClaim};
use filing_sections::outline::{self, ItemId};
use filing_sections::utils::error::{OracleError, QueryError};
use filing_sections::{FilingParser, ParsedFiling, ParserConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const URL: &str = "https://www.sec.gov/Archives/edgar/data/874766/000087476624000010/hig-20231231.htm";

fn premium_table(first: &str, second: &str) -> String {
    format!(
        "<table>\
         <tr><td>Year</td><td>Premium</td><td>Loss Ratio</td></tr>\
         <tr><td>2023</td><td>{first}</td><td>62%</td></tr>\
         <tr><td>2022</td><td>{second}</td><td>64%</td></tr>\
         </table>"
    )
}

fn sample_filing() -> String {
    let business = "The Company is a leading provider of property and casualty insurance products \
                    to businesses and individuals across the United States and in select international markets. "
        .repeat(4);
    let risks = "A severe catastrophe could materially reduce our earnings and capital, and our models \
                 may understate the frequency and severity of such events. "
        .repeat(4);
    let mdna = "The combined ratio improved by two points as net premiums earned grew and current \
                accident year losses declined across the commercial lines segment. "
        .repeat(4);
    let financials = "The consolidated balance sheets and statements of operations that follow were \
                      audited by our independent registered public accounting firm. "
        .repeat(4);

    format!(
        r##"<html><head><style>td {{ padding: 2px }}</style></head><body>
<p>UNITED STATES SECURITIES AND EXCHANGE COMMISSION</p>
<p>FORM 10-K</p>
<p>Table of Contents</p>
<table>
<tr><td><a href="#i1">Item 1.</a></td><td>Business</td><td>3</td></tr>
<tr><td><a href="#i1a">Item 1A.</a></td><td>Risk Factors</td><td>9</td></tr>
<tr><td><a href="#i7">Item 7.</a></td><td>Management's Discussion and Analysis</td><td>30</td></tr>
<tr><td><a href="#i8">Item 8.</a></td><td>Financial Statements</td><td>60</td></tr>
</table>
<p>PART I</p>
<p><b>Item 1. Business</b></p>
<p>{business}</p>
<p><b>Item 1A. Risk Factors</b></p>
<p>{risks}</p>
<p>PART II</p>
<p><b>Item 7. Management's Discussion and Analysis of Financial Condition and Results of Operations</b></p>
<p>{mdna}</p>
{table_a}
<img src="ratio.png" alt="Combined ratio trend 2019-2023" width="400" height="300">
{table_b}
<img src="premium.png" alt="Written premium by segment" width="400" height="300">
<img src="spacer.gif" alt="spacer" width="1" height="1">
<p><b>Item 8. Financial Statements and Supplementary Data</b></p>
<p>{financials}</p>
<p>SIGNATURES</p>
<p>Pursuant to the requirements of Section 13 of the Securities Exchange Act of 1934, the registrant has duly caused this report to be signed on its behalf.</p>
</body></html>"##,
        table_a = premium_table("$100M", "$95M"),
        table_b = premium_table("$210M", "$190M"),
    )
}

fn item(id: &str) -> ItemId {
    outline::item(id).unwrap()
}

fn paths(parsed: &ParsedFiling) -> Vec<String> {
    parsed.walk().into_iter().map(|(path, _)| path).collect()
}

fn assert_well_formed(parsed: &ParsedFiling, config: &ParserConfig) {
    for (path, section) in parsed.walk() {
        let id = section.section_id.as_str();
        assert!(outline::item(id).is_some(), "{} is not an outline item", id);
        assert!(path.ends_with(id), "{} does not end with {}", path, id);
        assert!(path.starts_with(section.section_id.part().as_str()));
        assert!(section.visual_elements.len() <= config.max_visuals_per_section);
        assert!(!section.title.is_empty());
    }
}

#[tokio::test]
async fn test_parse_without_oracle() {
    let parser = FilingParser::default();
    let parsed = parser.parse_filing(&sample_filing(), URL).await;

    assert_eq!(parsed.filing_url, URL);
    assert_eq!(parsed.chunks_processed, 1);
    assert!(parsed.cleaned_length < parsed.total_length, "front matter should be removed");
    assert_well_formed(&parsed, parser.config());
    assert_eq!(
        paths(&parsed),
        vec![
            "part_1.item_1",
            "part_1.item_1.item_1a",
            "part_2.item_7",
            "part_2.item_8",
            "part_4.signatures",
        ]
    );

    let business = parsed.find(item("item_1")).unwrap();
    assert_eq!(business.title, "Business");
    assert!(business.content.starts_with("Item 1. Business"));
    assert!(!business.content.contains("Risk Factors"));

    let mdna = parsed.find(item("item_7")).unwrap();
    assert!(mdna.content.contains("combined ratio improved"));
    assert!(!mdna.content.contains("Supplementary Data"));
    assert!(!mdna.content.contains("independent registered public accounting firm"));
    assert!(mdna.key_contents.iter().any(|k| k == "combined ratio"));

    let ids: Vec<&str> = mdna.visual_elements.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["item_7_table_0", "item_7_chart_0", "item_7_table_1"]);
    assert_eq!(mdna.visual_elements[1].kind, ElementKind::Chart);
    assert!(mdna.visual_elements[0].description.starts_with("Table: Year | Premium | Loss Ratio"));
    assert!(mdna.visual_elements[0].context.starts_with("Found in Management's Discussion"));

    // Nothing in Item 1A mentions the MD&A tables.
    assert!(parsed.find(item("item_1a")).unwrap().visual_elements.is_empty());
}

#[tokio::test]
async fn test_parse_on_spawned_task() {
    let parser = Arc::new(FilingParser::default());
    let raw = sample_filing();
    let task_parser = Arc::clone(&parser);
    let parsed = tokio::spawn(async move { task_parser.parse_filing(&raw, URL).await })
        .await
        .unwrap();

    assert_eq!(paths(&parsed).len(), 5);
    assert!(parsed.find(item("item_7")).is_some());
}

#[tokio::test]
async fn test_small_chunks_keep_sections_intact() {
    let config = ParserConfig {
        max_chunk_size: 600,
        ..ParserConfig::default()
    };
    let parser = FilingParser::new(config);
    let parsed = parser.parse_filing(&sample_filing(), URL).await;

    assert!(parsed.chunks_processed > 1);
    assert_well_formed(&parsed, parser.config());
    assert_eq!(parsed.section_count(), 5);

    let mdna = parsed.find(item("item_7")).unwrap();
    assert!(mdna.content.contains("combined ratio improved"));
    assert!(!mdna.content.contains("independent registered public accounting firm"));
}

#[tokio::test]
async fn test_queries_round_trip() {
    let parser = FilingParser::default();
    let parsed = parser.parse_filing(&sample_filing(), URL).await;

    for (path, section) in parsed.walk() {
        let found = parser.get_section_by_path(&parsed, &path).await.unwrap().unwrap();
        assert!(std::ptr::eq(found, section), "{} did not round-trip", path);
    }

    let risks = parser.get_section_by_path(&parsed, "Part1.Item1A").await.unwrap();
    assert_eq!(risks.unwrap().section_id.as_str(), "item_1a");
    assert!(parser.get_section_by_path(&parsed, "part_3.item_10").await.unwrap().is_none());
    assert!(matches!(
        parser.get_section_by_path(&parsed, "part_2..item_7").await,
        Err(QueryError::InvalidPath { .. })
    ));

    let hits = parser.find_sections_by_keywords(&parsed, &["CATASTROPHE"]);
    let hit_paths: Vec<&str> = hits.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(hit_paths, vec!["part_1.item_1.item_1a"]);
    assert!(parser.find_sections_by_keywords(&parsed, &["reinsurance recoverables"]).is_empty());
}

#[tokio::test]
async fn test_empty_and_unstructured_documents() {
    let parser = FilingParser::default();

    let parsed = parser.parse_filing("", URL).await;
    assert!(parsed.is_empty());
    assert_eq!(parsed.section_count(), 0);
    assert_eq!(parsed.total_length, 0);

    let parsed = parser
        .parse_filing("<html><body><p>Quarterly newsletter with no filing structure.</p></body></html>", URL)
        .await;
    assert!(parsed.is_empty());
    assert!(parser.get_section_by_path(&parsed, "part_2.item_7").await.unwrap().is_none());
}

/// Oracle answering from fixed responses.
struct FixedOracle {
    fail_mapping: bool,
    mapping_calls: AtomicUsize,
}

impl FixedOracle {
    fn new(fail_mapping: bool) -> Self {
        Self {
            fail_mapping,
            mapping_calls: AtomicUsize::new(0),
        }
    }
}

fn claim(section_id: &str, part: &str, start: &str) -> SectionClaim {
    SectionClaim {
        section_id: section_id.into(),
        part: part.into(),
        title: String::new(),
        content_start: start.into(),
        content_length: 0,
        contains_key_info: vec!["combined ratio".into()],
    }
}

#[async_trait]
impl FilingOracle for FixedOracle {
    async fn locate_sections(&self, _chunk: &str, _chunk_index: usize) -> Result<ChunkAnalysis, OracleError> {
        self.mapping_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_mapping {
            return Err(OracleError::Malformed("not json".into()));
        }
        Ok(ChunkAnalysis {
            sections_found: vec![
                claim("item_7", "part_2", "Item 7. Management's Discussion"),
                claim("Item 8", "Part II", "Item 8. Financial Statements"),
                claim("item_99", "part_9", "Item 99."),
            ],
            chunk_summary: "MD&A and financial statements".into(),
        })
    }

    async fn locate_boundary(&self, _w: &str, _c: ItemId, _u: &[ItemId]) -> Result<Option<usize>, OracleError> {
        Ok(None)
    }

    async fn resolve_path(&self, requested: &str, _c: &[PathCandidate]) -> Result<Option<String>, OracleError> {
        Ok(requested.contains("md&a").then(|| "part_2.item_7".to_string()))
    }

    async fn describe_visual(&self, kind: ElementKind, _sample: &str) -> Result<String, OracleError> {
        Ok(format!("{} summarising premiums and loss ratios.", kind.label()))
    }
}

#[tokio::test]
async fn test_parse_with_oracle() {
    let oracle = Arc::new(FixedOracle::new(false));
    let parser = FilingParser::default().with_oracle(oracle.clone());
    assert!(parser.has_oracle());

    let parsed = parser.parse_filing(&sample_filing(), URL).await;
    assert_eq!(oracle.mapping_calls.load(Ordering::SeqCst), 1);
    assert_well_formed(&parsed, parser.config());
    assert_eq!(paths(&parsed), vec!["part_2.item_7", "part_2.item_8"]);

    let mdna = parsed.find(item("item_7")).unwrap();
    assert_eq!(mdna.title, "Management's Discussion and Analysis");
    assert!(!mdna.content.contains("independent registered public accounting firm"));
    assert_eq!(mdna.visual_elements.len(), 3);
    assert_eq!(mdna.visual_elements[0].description, "Table summarising premiums and loss ratios.");
    assert!(mdna.content.contains("Chart summarising premiums and loss ratios."));

    let found = parser.get_section_by_path(&parsed, "the md&a please").await.unwrap();
    assert!(std::ptr::eq(found.unwrap(), mdna));
    // Oracle declines; alias substitution resolves.
    let found = parser.get_section_by_path(&parsed, "PartII.Item8").await.unwrap();
    assert_eq!(found.unwrap().section_id.as_str(), "item_8");
}

#[tokio::test]
async fn test_failed_mapping_skips_chunk() {
    let oracle = Arc::new(FixedOracle::new(true));
    let parser = FilingParser::default().with_oracle(oracle.clone());
    let parsed = parser.parse_filing(&sample_filing(), URL).await;

    assert_eq!(oracle.mapping_calls.load(Ordering::SeqCst), 1);
    assert_eq!(parsed.chunks_processed, 1);
    assert!(parsed.is_empty());
}

#[tokio::test]
async fn test_chunks_beyond_oracle_cap_use_header_scan() {
    let oracle = Arc::new(FixedOracle::new(true));
    let config = ParserConfig {
        max_oracle_chunks: 0,
        ..ParserConfig::default()
    };
    let parser = FilingParser::new(config).with_oracle(oracle.clone());
    let parsed = parser.parse_filing(&sample_filing(), URL).await;

    assert_eq!(oracle.mapping_calls.load(Ordering::SeqCst), 0);
    assert_eq!(parsed.section_count(), 5);
}
