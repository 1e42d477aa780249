//! Sitemap discovery.
//!
//! Probes the usual sitemap locations of a site and follows one level of
//! sitemap index. Every failure here is soft: the caller falls back to link
//! extraction when no sitemap yields URLs.

use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Url};

use dealbrief_resilience::ServiceError;

use super::http_client;

const SITEMAP_PATHS: &[&str] = &["sitemap.xml", "sitemap_index.xml", "sitemap/sitemap.xml"];

/// Child sitemap names that usually hold the main public pages.
const PREFERRED_HINTS: &[&str] = &["page", "main", "marketing"];
/// Child sitemap names that usually hold auxiliary content.
const AUXILIARY_HINTS: &[&str] = &["post", "blog", "product", "news", "tag", "author"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sitemap {
    /// `<sitemapindex>`: locations of child sitemaps.
    Index(Vec<String>),
    /// `<urlset>`: page locations.
    UrlSet(Vec<String>),
}

/// Parse a sitemap or sitemap index document.
///
/// # Errors
///
/// Returns [`quick_xml::Error`] if the XML is malformed.
pub fn parse_sitemap(xml: &str) -> Result<Sitemap, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut is_index = false;
    let mut in_loc = false;
    let mut locations = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"sitemapindex" => is_index = true,
                b"loc" => in_loc = true,
                _ => {}
            },
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Text(e)) if in_loc => {
                let text = e.unescape().unwrap_or_default().trim().to_string();
                if !text.is_empty() {
                    locations.push(text);
                }
            }
            Ok(Event::CData(e)) if in_loc => {
                let text = String::from_utf8_lossy(e.as_ref()).trim().to_string();
                if !text.is_empty() {
                    locations.push(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e),
            _ => {}
        }
    }

    Ok(if is_index {
        Sitemap::Index(locations)
    } else {
        Sitemap::UrlSet(locations)
    })
}

/// Pick the child sitemap most likely to list the main public pages: the
/// first with a preferred hint, else the first without an auxiliary hint,
/// else the first.
#[must_use]
pub fn choose_child_sitemap(children: &[String]) -> Option<&str> {
    let lower = |s: &String| s.to_lowercase();
    children
        .iter()
        .find(|c| PREFERRED_HINTS.iter().any(|h| lower(c).contains(h)))
        .or_else(|| {
            children
                .iter()
                .find(|c| !AUXILIARY_HINTS.iter().any(|h| lower(c).contains(h)))
        })
        .or_else(|| children.first())
        .map(String::as_str)
}

/// Fetches and resolves sitemaps over plain HTTP.
pub struct SitemapFetcher {
    client: Client,
}

impl SitemapFetcher {
    /// # Errors
    ///
    /// Returns [`ServiceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, ServiceError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
        })
    }

    async fn get_text(&self, url: &str) -> Option<String> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url, error = %e, "sitemap request failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::debug!(url, status = response.status().as_u16(), "no sitemap at location");
            return None;
        }
        response.text().await.ok()
    }

    async fn get_sitemap(&self, url: &str) -> Option<Sitemap> {
        let body = self.get_text(url).await?;
        match parse_sitemap(&body) {
            Ok(sitemap) => Some(sitemap),
            Err(e) => {
                tracing::warn!(url, error = %e, "malformed sitemap, ignoring");
                None
            }
        }
    }

    /// Page URLs from the first sitemap found under `site_url`, or `None`
    /// when no location yields a usable sitemap.
    pub async fn discover(&self, site_url: &str) -> Option<Vec<String>> {
        let normalised = format!("{}/", site_url.trim_end_matches('/'));
        let base = match Url::parse(&normalised) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(site_url, error = %e, "invalid site URL, skipping sitemap probe");
                return None;
            }
        };

        for path in SITEMAP_PATHS {
            let Ok(candidate) = base.join(path) else {
                continue;
            };
            let urls = match self.get_sitemap(candidate.as_str()).await {
                Some(Sitemap::UrlSet(urls)) => urls,
                Some(Sitemap::Index(children)) => {
                    let Some(child) = choose_child_sitemap(&children) else {
                        continue;
                    };
                    tracing::debug!(index = %candidate, child, "following sitemap index");
                    match self.get_sitemap(child).await {
                        Some(Sitemap::UrlSet(urls)) => urls,
                        _ => continue,
                    }
                }
                None => continue,
            };
            if !urls.is_empty() {
                tracing::info!(sitemap = %candidate, pages = urls.len(), "sitemap found");
                return Some(urls);
            }
        }
        None
    }
}
