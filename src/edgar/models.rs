// src/edgar/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The parts of the EDGAR submissions index we read.
/// Example: https://data.sec.gov/submissions/CIK0000320193.json
#[derive(Debug, Deserialize)]
pub struct CompanySubmission {
    pub cik: String,
    pub name: String,
    pub filings: Filings,
}

#[derive(Debug, Deserialize)]
pub struct Filings {
    pub recent: FilingsList,
}

/// Column-oriented listing of recent filings; index `i` of every vector describes
/// the same filing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingsList {
    pub accession_number: Vec<String>,
    pub filing_date: Vec<String>,
    #[serde(default)]
    pub report_date: Vec<String>,
    pub form: Vec<String>,
    pub primary_document: Vec<String>,
}

/// One entry of https://www.sec.gov/files/company_tickers.json
#[derive(Debug, Deserialize)]
pub struct CompanyTicker {
    pub cik_str: u64,
    pub ticker: String,
    pub title: String,
}

/// A filing resolved from the registry, ready to download.
#[derive(Debug, Clone, Serialize)]
pub struct FilingInfo {
    pub accession_number: String,
    pub filing_date: NaiveDate,
    pub report_date: Option<NaiveDate>,
    pub form_type: String,
    pub company_name: String,
    /// Ten digit, zero padded.
    pub cik: String,
    pub primary_doc: String,
    pub document_url: String,
}

/// Archive URL of a filing's primary document.
pub fn archive_url(www_base: &str, cik: &str, accession_number: &str, primary_doc: &str) -> String {
    let cik = cik.trim_start_matches('0');
    let acc_no_dashes = accession_number.replace('-', "");
    format!(
        "{}/Archives/edgar/data/{}/{}/{}",
        www_base, cik, acc_no_dashes, primary_doc
    )
}
