//! Decides which pages to fetch next.
//!
//! [`derive_identifier`] is the only place a listing identifier is read from a
//! URL. The detail parser uses it too, so a listing keeps the same identifier
//! whether it was seen on a results page or parsed from its own page.

use crate::error::{IdentifierError, StructuralError};
use crate::models::{FetchIntent, FetchedDocument, PageKind, RequestMeta};
use crate::parsing::embedded::extract_coordinates;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

pub const SITE_ROOT: &str = "https://www.hemnet.se";

fn resolve(url: &str) -> Option<Url> {
    Url::parse(url)
        .or_else(|_| Url::parse(SITE_ROOT).and_then(|root| root.join(url)))
        .ok()
}

/// Last non-empty path segment, e.g. "lagenhet-2rum-sodermalm-stockholms-kommun-tavastgatan-3-1234567"
fn final_segment(url: &str) -> Option<String> {
    let parsed = resolve(url)?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    Some(segment.to_string())
}

/// The site's listing identifier: the last dash-separated token of the final path segment
pub fn derive_identifier(url: &str) -> Result<i64, IdentifierError> {
    final_segment(url)
        .and_then(|segment| segment.rsplit('-').next().and_then(|id| id.parse::<i64>().ok()))
        .ok_or_else(|| IdentifierError {
            url: url.to_string(),
        })
}

/// The property type: the first dash-separated token of the final path segment
pub fn derive_property_type(url: &str) -> Option<String> {
    final_segment(url)?
        .split('-')
        .next()
        .filter(|kind| !kind.is_empty())
        .map(str::to_string)
}

/// Links whose identifier is not yet stored, in page order
pub fn select_new_candidates(links: &[String], known: &HashSet<i64>) -> Vec<String> {
    links
        .iter()
        .filter(|link| match derive_identifier(link) {
            Ok(id) => !known.contains(&id),
            Err(e) => {
                tracing::warn!("Skipping result link: {}", e);
                false
            }
        })
        .cloned()
        .collect()
}

/// Listing identifiers that have no comparables record yet
pub fn select_missing_comparables(listing_ids: &[i64], comparable_ids: &[i64]) -> Vec<i64> {
    let have: HashSet<i64> = comparable_ids.iter().copied().collect();
    listing_ids
        .iter()
        .copied()
        .filter(|id| !have.contains(id))
        .collect()
}

/// Results pages `start..stop` for a search URL
pub fn start_urls(base_url: &str, start: u32, stop: u32) -> Vec<FetchIntent> {
    (start..stop)
        .map(|page| FetchIntent::new(format!("{}&page={}", base_url, page), PageKind::ResultsPage))
        .collect()
}

/// Detail page links on a results page
pub fn result_page_links(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let selector = match Selector::parse("#search-results li > div > a") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| match resolve(href) {
            Some(url) => url.to_string(),
            None => href.to_string(),
        })
        .collect()
}

/// Detail pages to fetch from one results page
pub fn plan_detail_fetches(body: &str, known: &HashSet<i64>) -> Vec<FetchIntent> {
    let links = result_page_links(body);
    let candidates = select_new_candidates(&links, known);

    tracing::debug!("{} of {} result links are new", candidates.len(), links.len());

    candidates
        .into_iter()
        .map(|url| FetchIntent::new(url, PageKind::ListingDetail))
        .collect()
}

/// Listing pages to re-fetch for their coordinates, one per listing without comparables
pub fn plan_location_fetches(listings: &[(i64, String)], comparable_ids: &[i64]) -> Vec<FetchIntent> {
    let listing_ids: Vec<i64> = listings.iter().map(|(id, _)| *id).collect();
    let missing: HashSet<i64> = select_missing_comparables(&listing_ids, comparable_ids)
        .into_iter()
        .collect();

    listings
        .iter()
        .filter(|(id, _)| missing.contains(id))
        .map(|(id, url)| FetchIntent {
            url: url.clone(),
            page: PageKind::ListingLocation,
            meta: RequestMeta {
                salda_id: Some(*id),
                ..RequestMeta::default()
            },
        })
        .collect()
}

/// From a sold listing page, the request for its comparables page.
///
/// The comparables page is the one the listing links to as `rel=prev`. The
/// listing's coordinates (when the page has them) and identifier travel along.
pub fn plan_comparable_fetch(document: &FetchedDocument) -> Result<FetchIntent, StructuralError> {
    let html = Html::parse_document(&document.body);
    let selector = Selector::parse("link[rel=prev]").map_err(|_| StructuralError {
        section: "previous page link",
    })?;

    let href = html
        .select(&selector)
        .find_map(|link| link.value().attr("href"))
        .ok_or(StructuralError {
            section: "previous page link",
        })?;

    let url = match Url::parse(&document.url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    };

    let salda_id = document
        .meta
        .salda_id
        .or_else(|| derive_identifier(&document.url).ok());

    let (latitude, longitude) = match extract_coordinates(&document.body) {
        Some((lat, lon)) => (Some(lat), Some(lon)),
        None => (None, None),
    };

    Ok(FetchIntent {
        url,
        page: PageKind::Comparable,
        meta: RequestMeta {
            salda_id,
            latitude,
            longitude,
        },
    })
}
