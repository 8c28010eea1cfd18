//! Media link discovery in fetched page markup.

use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::MediaContainer;

/// Attributes that may carry a media URL, checked in this order per element
const LINK_ATTRIBUTES: &[&str] = &["href", "src", "content", "data-src"];

static LINK_SELECTOR: OnceLock<Selector> = OnceLock::new();

fn link_selector() -> &'static Selector {
    LINK_SELECTOR.get_or_init(|| {
        Selector::parse("[href], [src], [content], [data-src]")
            .expect("Failed to compile link selector")
    })
}

/// Collect absolute media URLs referenced by `html`, in document order.
///
/// Attribute values are resolved against `base`; only http(s) targets whose
/// path ends in a known media extension are kept. Duplicates are dropped.
pub fn scan_media_links(html: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut found: Vec<Url> = Vec::new();

    for element in document.select(link_selector()) {
        for &attr in LINK_ATTRIBUTES {
            let Some(value) = element.value().attr(attr).map(str::trim) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }

            let Ok(url) = base.join(value) else {
                continue;
            };

            if !matches!(url.scheme(), "http" | "https") {
                continue;
            }

            if MediaContainer::from_url(&url).is_some() && !found.contains(&url) {
                found.push(url);
            }
        }
    }

    found
}
