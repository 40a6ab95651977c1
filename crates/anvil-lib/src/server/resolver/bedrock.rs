//! Bedrock has no version API; the download page is scraped instead.

use regex::Regex;

use crate::config::{fill_template, ProvisionerConfig};
use crate::server::core::downloader::Downloader;
use crate::utils::version::sort_descending;

const LINK_PATTERN: &str = r"bedrock-server-(\d+(?:\.\d+)+)\.zip";

/// Bytes inspected on each side of a link when looking for "preview".
const PREVIEW_WINDOW: usize = 64;

/// Versions linked from a download page, previews dropped, newest first.
pub fn scrape_versions(html: &str) -> Vec<String> {
    let re = match Regex::new(LINK_PATTERN) {
        Ok(re) => re,
        Err(e) => {
            log::error!("Bedrock link pattern failed to compile: {}", e);
            return Vec::new();
        }
    };

    let mut versions: Vec<String> = Vec::new();
    for caps in re.captures_iter(html) {
        let (Some(whole), Some(version)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let window = surrounding(html, whole.start(), whole.end());
        if window.to_ascii_lowercase().contains("preview") {
            log::debug!("Ignoring preview build {}", version.as_str());
            continue;
        }
        if !versions.iter().any(|v| v == version.as_str()) {
            versions.push(version.as_str().to_string());
        }
    }

    sort_descending(&mut versions);
    versions
}

fn surrounding(text: &str, start: usize, end: usize) -> &str {
    let mut from = start.saturating_sub(PREVIEW_WINDOW);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + PREVIEW_WINDOW).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    &text[from..to]
}

/// Try each configured locale page in order and return the first non-empty scrape.
pub async fn fetch_versions(downloader: &Downloader, config: &ProvisionerConfig) -> Option<Vec<String>> {
    for locale in &config.bedrock_locales {
        let url = fill_template(&config.bedrock_page_template, &[("locale", locale)]);
        match downloader.get_text(&url).await {
            Ok(html) => {
                let versions = scrape_versions(&html);
                if versions.is_empty() {
                    log::warn!("No Bedrock server links found on {}", url);
                    continue;
                }
                log::info!(
                    "Found {} Bedrock versions on {} (latest {})",
                    versions.len(),
                    url,
                    versions[0]
                );
                return Some(versions);
            }
            Err(e) => log::warn!("Bedrock page {} unavailable: {}", url, e),
        }
    }
    None
}

/// `linux` or `win`, as used in the download path.
pub fn platform() -> &'static str {
    if cfg!(windows) {
        "win"
    } else {
        "linux"
    }
}
