use crate::database::Database;
use crate::error::ErrorKind;
use crate::error_sink::ErrorSink;
use crate::fetcher::Fetcher;
use crate::models::{FetchIntent, FetchedDocument};
use crate::parsing::{parse_comparable, parse_listing};
use crate::planner;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CrawlSummary {
    pub pages_fetched: usize,
    pub records_stored: usize,
    pub documents_failed: usize,
}

/// Runs the fetch/parse/store loop, one request at a time
pub struct Crawler<F: Fetcher> {
    fetcher: F,
    db: Database,
    sink: Arc<dyn ErrorSink>,
    request_delay: Duration,
}

impl<F: Fetcher> Crawler<F> {
    pub fn new(fetcher: F, db: Database, sink: Arc<dyn ErrorSink>, request_delay: Duration) -> Self {
        Self {
            fetcher,
            db,
            sink,
            request_delay,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn fetch(&self, intent: &FetchIntent, summary: &mut CrawlSummary) -> Option<FetchedDocument> {
        tracing::debug!("Fetching {:?} {}", intent.page, intent.url);
        let result = self.fetcher.fetch(&intent.url).await;

        // Be nice to the server
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        match result {
            Ok(body) => {
                summary.pages_fetched += 1;
                Some(FetchedDocument::new(intent.url.clone(), body).with_meta(intent.meta.clone()))
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {}: {}", intent.url, e);
                self.sink.report(e.kind(), &intent.url);
                summary.documents_failed += 1;
                None
            }
        }
    }

    /// Walk the results pages and store every listing that is not stored yet
    pub async fn crawl_listings(&self, results_pages: &[FetchIntent]) -> Result<CrawlSummary> {
        let mut summary = CrawlSummary::default();

        for page in results_pages {
            let Some(document) = self.fetch(page, &mut summary).await else {
                continue;
            };

            let known = self.db.known_listing_ids()?;
            let intents = planner::plan_detail_fetches(&document.body, &known);
            tracing::info!("{}: {} new listings to fetch", page.url, intents.len());

            for intent in &intents {
                let Some(detail) = self.fetch(intent, &mut summary).await else {
                    continue;
                };

                let Some(record) = parse_listing(&detail, self.sink.as_ref()) else {
                    summary.documents_failed += 1;
                    continue;
                };

                match self.db.insert_listing(&record) {
                    Ok(true) => {
                        tracing::info!("Stored listing {}", record.hemnet_id);
                        summary.records_stored += 1;
                    }
                    Ok(false) => tracing::debug!("Listing {} already stored", record.hemnet_id),
                    Err(e) => tracing::error!("Failed to insert listing {}: {}", record.hemnet_id, e),
                }
            }
        }

        Ok(summary)
    }

    /// Fetch comparables for every stored listing that has none yet
    pub async fn crawl_comparables(&self) -> Result<CrawlSummary> {
        let mut summary = CrawlSummary::default();

        let listings = self.db.known_listing_refs()?;
        let with_comparables = self.db.known_comparable_salda_ids()?;
        let intents = planner::plan_location_fetches(&listings, &with_comparables);
        tracing::info!("{} listings without comparables", intents.len());

        for intent in &intents {
            let Some(listing_page) = self.fetch(intent, &mut summary).await else {
                continue;
            };

            let comparable_intent = match planner::plan_comparable_fetch(&listing_page) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!("No comparables link on {}: {}", listing_page.url, e);
                    self.sink.report(ErrorKind::Structural, &listing_page.url);
                    summary.documents_failed += 1;
                    continue;
                }
            };

            let Some(salda_id) = comparable_intent.meta.salda_id else {
                self.sink.report(ErrorKind::Other, &listing_page.url);
                summary.documents_failed += 1;
                continue;
            };

            let Some(page) = self.fetch(&comparable_intent, &mut summary).await else {
                continue;
            };

            let Some(record) = parse_comparable(
                &page,
                page.meta.latitude,
                page.meta.longitude,
                salda_id,
                self.sink.as_ref(),
            ) else {
                summary.documents_failed += 1;
                continue;
            };

            match self.db.insert_comparable(&record) {
                Ok(()) => {
                    tracing::info!("Stored comparable for listing {}", salda_id);
                    summary.records_stored += 1;
                }
                Err(e) => tracing::error!("Failed to insert comparable for {}: {}", salda_id, e),
            }
        }

        Ok(summary)
    }
}
