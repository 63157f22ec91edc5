use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct FetchedPage {
    pub success: bool,
    pub text: String,
}

impl FetchedPage {
    fn failed() -> Self {
        FetchedPage {
            success: false,
            text: String::new(),
        }
    }
}

/// Fetch-and-render seam for company websites. Ordinary network failures
/// come back as `success: false`; only programming errors may panic.
#[async_trait]
pub trait WebsiteFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchedPage;
}

pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        ReqwestFetcher::new()
    }
}

impl ReqwestFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build reqwest client");
        ReqwestFetcher { client }
    }
}

#[async_trait]
impl WebsiteFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> FetchedPage {
        let url = match url.starts_with("http://") || url.starts_with("https://") {
            true => url.to_string(),
            false => format!("https://{}", url),
        };

        let response = match self.client.get(&url).send().await {
            Ok(res) => res,
            Err(e) => {
                log::info!("Fetch failed for {}: {:?}", url, e);
                return FetchedPage::failed();
            }
        };
        if !response.status().is_success() {
            log::info!("Fetch for {} returned status {}", url, response.status());
            return FetchedPage::failed();
        }

        let html = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                log::info!("Failed to read body from {}: {:?}", url, e);
                return FetchedPage::failed();
            }
        };

        let text = extract_visible_text(&html);
        FetchedPage {
            success: !text.is_empty(),
            text,
        }
    }
}

/// Pull the human-visible text out of a page, skipping script/style noise.
pub fn extract_visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title, h1, h2, h3, h4, p, li, td, address, footer").unwrap();

    let mut parts: Vec<String> = vec![];
    for element in document.select(&selector) {
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join("\n")
}
