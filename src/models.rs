use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One sold listing as read from its detail page
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListingRecord {
    pub hemnet_id: i64,
    pub url: String,

    pub broker_name: Option<String>,
    pub broker_phone: Option<String>,
    pub broker_email: Option<String>,
    pub broker_firm: Option<String>,
    pub broker_firm_phone: Option<String>,

    pub sold_date: Option<NaiveDate>,

    pub price: Option<i64>,
    pub asked_price: Option<i64>,
    pub price_per_square_meter: Option<i64>,
    pub price_trend_flat: Option<i64>,
    pub price_trend_percentage: Option<i64>,

    pub rooms: Option<f64>,
    pub monthly_fee: Option<i64>,
    pub square_meters: Option<f64>,
    pub cost_per_year: Option<i64>,
    pub year: Option<String>, // May be a range like "2008-2009"
    pub property_type: Option<String>,
    pub association: Option<String>,
    pub lot_size: Option<i64>,
    pub biarea: Option<i64>,

    pub address: Option<String>,
    pub geographic_area: Option<String>,
}

/// Location and listing data of a comparables page, linked to a sold listing by `salda_id`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComparableRecord {
    pub hemnet_id: Option<i64>,
    pub salda_id: i64,
    pub url: String,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub city: Option<String>,
    pub postal_city: Option<String>,
    pub district: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub municipality: Option<String>,
    pub street: Option<String>,
    pub location: Option<String>,
    pub main_location: Option<String>,
    pub street_address: Option<String>,

    pub offers_selling_price: Option<bool>,
    pub new_production: Option<bool>,
    pub upcoming_open_houses: Option<bool>,
    pub home_swapping: Option<bool>,
    pub has_price_change: Option<bool>,
    pub has_active_toplisting: Option<bool>,

    pub living_area: Option<f64>,
    pub rooms: Option<f64>,
    pub broker_firm: Option<String>,
    pub status: Option<String>,
    pub price: Option<i64>,
    pub monthly_fee: Option<i64>,
    pub cost_per_year: Option<i64>,
    pub publication_date: Option<NaiveDate>,
    pub images_count: Option<i64>,
    pub item_type: Option<String>,
    pub price_per_m2: Option<i64>,
}

/// Values handed from one request to the follow-up request it caused
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub salda_id: Option<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A page body as returned by the fetcher
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub url: String,
    pub body: String,
    pub meta: RequestMeta,
}

impl FetchedDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            meta: RequestMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: RequestMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Which parser a fetched page should go to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    ResultsPage,
    ListingDetail,
    ListingLocation,
    Comparable,
}

/// A request the crawler should issue next
#[derive(Debug, Clone, PartialEq)]
pub struct FetchIntent {
    pub url: String,
    pub page: PageKind,
    pub meta: RequestMeta,
}

impl FetchIntent {
    pub fn new(url: impl Into<String>, page: PageKind) -> Self {
        Self {
            url: url.into(),
            page,
            meta: RequestMeta::default(),
        }
    }
}
