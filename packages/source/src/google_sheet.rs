//! Published Google Sheet fetcher.
//!
//! A sheet shared as "anyone with the link" can be exported as CSV through
//! the visualization endpoint without credentials. When the sheet is not
//! shared, Google answers with an HTML login page and a `200`, so the
//! response is sniffed before it reaches the CSV reader.

use std::sync::LazyLock;

use regex::Regex;

use crate::{SourceError, Table, csv_file};

const EXPORT_BASE: &str = "https://docs.google.com/spreadsheets/d";

static SHEET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/d/([a-zA-Z0-9_-]+)").expect("valid regex"));

/// Extracts the spreadsheet id from a sheet URL.
///
/// # Errors
///
/// Returns [`SourceError::InvalidSheetUrl`] if the URL has no `/d/{id}`
/// segment.
pub fn sheet_id(url: &str) -> Result<&str, SourceError> {
    SHEET_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| SourceError::InvalidSheetUrl {
            url: url.to_owned(),
        })
}

/// Builds the CSV export endpoint for a spreadsheet id.
#[must_use]
pub fn export_url(id: &str) -> String {
    format!("{EXPORT_BASE}/{id}/gviz/tq")
}

/// Rejects responses that are web pages rather than tabular data.
///
/// # Errors
///
/// Returns [`SourceError::NotTabular`] when the content type is
/// `text/html` or the body opens with an HTML document marker.
pub fn ensure_tabular(content_type: Option<&str>, body: &str) -> Result<(), SourceError> {
    if let Some(ct) = content_type
        && ct.to_ascii_lowercase().contains("text/html")
    {
        return Err(SourceError::NotTabular {
            content_type: ct.to_owned(),
        });
    }

    let head: String = body
        .trim_start()
        .chars()
        .take(32)
        .collect::<String>()
        .to_ascii_lowercase();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        return Err(SourceError::NotTabular {
            content_type: "an HTML document".to_owned(),
        });
    }

    Ok(())
}

/// Downloads one tab of a published sheet as CSV and parses it.
///
/// # Errors
///
/// Returns [`SourceError`] if the URL is invalid, the request fails, the
/// response is not tabular, or the CSV cannot be read.
pub async fn fetch_sheet(
    client: &reqwest::Client,
    url: &str,
    sheet_name: &str,
) -> Result<Table, SourceError> {
    let id = sheet_id(url)?;
    let endpoint = export_url(id);

    log::info!("Fetching sheet {id} tab {sheet_name:?}");

    let response = crate::retry::send_with_retry(|| {
        client
            .get(&endpoint)
            .query(&[("tqx", "out:csv"), ("sheet", sheet_name)])
    })
    .await?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let body = response.text().await?;

    log::debug!(
        "Downloaded {} bytes ({})",
        body.len(),
        content_type.as_deref().unwrap_or("no content type")
    );

    ensure_tabular(content_type.as_deref(), &body)?;
    csv_file::read_csv(body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_sheet_id() {
        let url = "https://docs.google.com/spreadsheets/d/1AbC-d_9xYz/edit#gid=0";
        assert_eq!(sheet_id(url).unwrap(), "1AbC-d_9xYz");
        assert_eq!(
            export_url("1AbC-d_9xYz"),
            "https://docs.google.com/spreadsheets/d/1AbC-d_9xYz/gviz/tq"
        );
    }

    #[test]
    fn rejects_url_without_id() {
        let err = sheet_id("https://example.org/sheet.csv").unwrap_err();
        assert!(matches!(err, SourceError::InvalidSheetUrl { .. }));
    }

    #[test]
    fn rejects_login_pages() {
        assert!(matches!(
            ensure_tabular(Some("text/html; charset=utf-8"), "a,b\n"),
            Err(SourceError::NotTabular { .. })
        ));
        assert!(matches!(
            ensure_tabular(Some("text/csv"), "  <!DOCTYPE html><html>"),
            Err(SourceError::NotTabular { .. })
        ));
        assert!(ensure_tabular(Some("text/csv"), "Work Id Number,Block\n").is_ok());
        assert!(ensure_tabular(None, "a,b\n").is_ok());
    }
}
