// src/edgar/client.rs
use crate::edgar::models::{archive_url, CompanySubmission, CompanyTicker, FilingInfo};
use crate::edgar::FilingSource;
use crate::utils::error::EdgarError;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header;
use std::collections::HashMap;
use std::time::Duration;

pub const SEC_WWW_BASE: &str = "https://www.sec.gov";
pub const SEC_DATA_BASE: &str = "https://data.sec.gov";
// SEC asks for 10 requests/second max. Be conservative. >100ms delay.
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 150;

/// Registry client. Holds only its identity header and base URLs, so it can be
/// shared between concurrent parses.
#[derive(Debug, Clone)]
pub struct EdgarClient {
    http: reqwest::Client,
    request_delay: Duration,
    www_base: String,
    data_base: String,
}

impl EdgarClient {
    /// `user_agent` must identify the caller (name and contact email); the registry
    /// rejects anonymous clients.
    pub fn new(user_agent: &str) -> Result<Self, EdgarError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent) // Set the required User-Agent
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            www_base: SEC_WWW_BASE.to_string(),
            data_base: SEC_DATA_BASE.to_string(),
        })
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Points the client at other hosts (used by tests).
    pub fn with_base_urls(mut self, www_base: impl Into<String>, data_base: impl Into<String>) -> Self {
        self.www_base = www_base.into().trim_end_matches('/').to_string();
        self.data_base = data_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Rate-limited GET with the registry's status conventions mapped to errors.
    async fn get(&self, url: &str) -> Result<reqwest::Response, EdgarError> {
        // --- Basic Rate Limiting ---
        tokio::time::sleep(self.request_delay).await;

        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json,text/html,text/plain,*/*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("HTTP error status: {} for URL: {}", status, url);
            if status == reqwest::StatusCode::FORBIDDEN {
                tracing::warn!("Received 403 Forbidden - check User-Agent and rate limits.");
                return Err(EdgarError::RateLimited);
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(EdgarError::FilingDocNotFound(url.to_string()));
            }
            return Err(EdgarError::Http(status));
        }
        Ok(response)
    }

    /// Resolves a ticker or a numeric CIK to a ten digit CIK.
    pub async fn resolve_cik(&self, company: &str) -> Result<String, EdgarError> {
        let company = company.trim();
        if !company.is_empty() && company.chars().all(|c| c.is_ascii_digit()) {
            let cik: u64 = company
                .parse()
                .map_err(|_| EdgarError::Parse(format!("Invalid CIK '{}'", company)))?;
            return Ok(format!("{:010}", cik));
        }

        let ticker = company.to_uppercase();
        let url = format!("{}/files/company_tickers.json", self.www_base);
        let tickers: HashMap<String, CompanyTicker> = self.get(&url).await?.json().await?;

        tickers
            .values()
            .find(|entry| entry.ticker.eq_ignore_ascii_case(&ticker))
            .map(|entry| {
                tracing::debug!("Resolved {} to CIK {} ({})", ticker, entry.cik_str, entry.title);
                format!("{:010}", entry.cik_str)
            })
            .ok_or(EdgarError::CompanyNotFound(ticker))
    }

    pub async fn company_submissions(&self, cik: &str) -> Result<CompanySubmission, EdgarError> {
        let url = format!("{}/submissions/CIK{}.json", self.data_base, cik);
        let submission: CompanySubmission = self.get(&url).await?.json().await?;
        Ok(submission)
    }

    /// Most recent filing of `form_type` for a ticker or CIK.
    pub async fn latest_filing(&self, company: &str, form_type: &str) -> Result<FilingInfo, EdgarError> {
        let cik = self.resolve_cik(company).await?;
        let submissions = self.company_submissions(&cik).await?;
        let recent = &submissions.filings.recent;

        let mut latest: Option<(NaiveDate, usize)> = None;
        for (i, form) in recent.form.iter().enumerate() {
            if !form.eq_ignore_ascii_case(form_type) {
                continue;
            }
            let raw_date = recent
                .filing_date
                .get(i)
                .ok_or_else(|| EdgarError::Parse("Missing filing date".to_string()))?;
            let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
                .map_err(|_| EdgarError::Parse(format!("Invalid filing date '{}'", raw_date)))?;
            if latest.map_or(true, |(best, _)| date > best) {
                latest = Some((date, i));
            }
        }

        let (filing_date, i) = latest.ok_or_else(|| EdgarError::FilingNotFound {
            cik: cik.clone(),
            form_type: form_type.to_string(),
        })?;

        let accession_number = recent
            .accession_number
            .get(i)
            .ok_or_else(|| EdgarError::Parse("Missing accession number".to_string()))?
            .clone();
        let primary_doc = recent
            .primary_document
            .get(i)
            .ok_or_else(|| EdgarError::Parse("Missing primary document".to_string()))?
            .clone();
        let report_date = recent
            .report_date
            .get(i)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        let info = FilingInfo {
            document_url: archive_url(&self.www_base, &cik, &accession_number, &primary_doc),
            accession_number,
            filing_date,
            report_date,
            form_type: recent.form[i].clone(),
            company_name: submissions.name.clone(),
            cik,
            primary_doc,
        };
        tracing::info!(
            "Latest {} for {}: {} filed {}",
            info.form_type,
            info.company_name,
            info.accession_number,
            info.filing_date
        );
        Ok(info)
    }

    /// Downloads a filing document from its URL.
    pub async fn download_filing_doc(&self, url: &str) -> Result<String, EdgarError> {
        tracing::info!("Downloading document from: {}", url);
        let body = self.get(url).await?.text().await?;
        tracing::debug!("Successfully downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[async_trait]
impl FilingSource for EdgarClient {
    async fn resolve_latest_filing(&self, company: &str, form_type: &str) -> Result<FilingInfo, EdgarError> {
        self.latest_filing(company, form_type).await
    }

    async fn fetch_raw_document(&self, url: &str) -> Result<String, EdgarError> {
        self.download_filing_doc(url).await
    }
}
