use crate::error::{ParseError, StructuralError};
use crate::error_sink::ErrorSink;
use crate::models::{ComparableRecord, FetchedDocument};
use crate::parsing::embedded::{
    extract_embedded_array, find_object_with_key, json_bool, json_date, json_decimal, json_integer,
    json_object, json_string,
};

/// Parse a comparables page.
///
/// Everything comes from the data layer's `property` object; coordinates and
/// the linked listing's identifier are handed in by the request that led here.
pub fn parse_comparable(
    document: &FetchedDocument,
    latitude: Option<f64>,
    longitude: Option<f64>,
    salda_id: i64,
    sink: &dyn ErrorSink,
) -> Option<ComparableRecord> {
    match build_comparable(document, latitude, longitude, salda_id) {
        Ok(record) => {
            tracing::debug!("Parsed comparable for listing {} from {}", salda_id, document.url);
            Some(record)
        }
        Err(e) => {
            tracing::warn!("No comparable from {}: {}", document.url, e);
            sink.report(e.kind(), &document.url);
            None
        }
    }
}

fn build_comparable(
    document: &FetchedDocument,
    latitude: Option<f64>,
    longitude: Option<f64>,
    salda_id: i64,
) -> Result<ComparableRecord, ParseError> {
    let array = extract_embedded_array(&document.body)?;
    let property = find_object_with_key(&array, "property")
        .ok_or(StructuralError { section: "property data" })?;
    let property = Some(property);
    let locations = json_object(property, "locations");

    Ok(ComparableRecord {
        hemnet_id: json_integer(property, "id"),
        salda_id,
        url: document.url.clone(),

        latitude,
        longitude,

        city: json_string(locations, "city"),
        postal_city: json_string(locations, "postal_city"),
        district: json_string(locations, "district"),
        country: json_string(locations, "country"),
        region: json_string(locations, "region"),
        municipality: json_string(locations, "municipality"),
        street: json_string(locations, "street"),
        location: json_string(property, "location"),
        main_location: json_string(property, "main_location"),
        street_address: json_string(property, "street_address"),

        offers_selling_price: json_bool(property, "offers_selling_price"),
        new_production: json_bool(property, "new_production"),
        upcoming_open_houses: json_bool(property, "upcoming_open_houses"),
        home_swapping: json_bool(property, "home_swapping"),
        has_price_change: json_bool(property, "has_price_change"),
        has_active_toplisting: json_bool(property, "has_active_toplisting"),

        living_area: json_decimal(property, "living_area"),
        rooms: json_decimal(property, "rooms"),
        broker_firm: json_string(property, "broker_firm"),
        status: json_string(property, "status"),
        price: json_integer(property, "price"),
        monthly_fee: json_integer(property, "borattavgift"),
        cost_per_year: json_integer(property, "driftkostnad"),
        publication_date: json_date(property, "publication_date"),
        images_count: json_integer(property, "images_count"),
        item_type: json_string(property, "item_type"),
        price_per_m2: json_integer(property, "price_per_m2"),
    })
}
