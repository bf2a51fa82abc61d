//! Sold listing detail pages.
//!
//! A detail page comes in one of two layouts. Newer pages carry an analytics
//! data layer next to the rendered fact tables; older ones only have the
//! tables. The layout is decided once per page ([`LayoutVariant`]) and every
//! field is read with the same precedence: the data layer when it has the
//! field, the rendered page otherwise.

use crate::error::{DecodeError, ErrorKind, ParseError, StructuralError};
use crate::error_sink::ErrorSink;
use crate::models::{FetchedDocument, ListingRecord};
use crate::normalize::{
    decode_obfuscated_email, extract_municipality, parse_currency, parse_date, parse_decimal,
    parse_leading_integer, parse_price_trend, strip_phone, strip_unit,
};
use crate::parsing::attributes::attribute_table_for;
use crate::parsing::embedded::{
    find_object_with_key, json_decimal, json_integer, json_object, json_string, probe_locators,
};
use crate::planner::{derive_identifier, derive_property_type};
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashMap;

const BROKER_BLOCK: &str = ".broker-info > .broker";
const PRICE_STATS: &str = ".sold-property__price-stats";
const ATTRIBUTES: &str = ".sold-property__attributes";
const PRICE_VALUE: &str = ".sold-property__price-value";
const METADATA: &str = ".sold-property__metadata";
const ADDRESS: &str = ".sold-property__address";

/// Data layer keys holding the viewed property, in lookup order
const PROPERTY_KEYS: [&str; 2] = ["sold_property", "property"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutVariant {
    /// Data layer with a property object; the attribute table is optional
    Embedded,
    /// No usable data layer; the attribute table is required
    Legacy,
}

struct ParsedListing {
    record: ListingRecord,
    decode_error: Option<DecodeError>,
}

#[derive(Debug, Default, PartialEq)]
struct BrokerContact {
    name: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    firm: Option<String>,
    firm_phone: Option<String>,
}

/// Parse one sold listing page.
///
/// Returns `None` when the page cannot produce a record; the reason is then
/// reported to `sink` once. A data layer that is present but unreadable is
/// also reported, but the record is still built from the rendered page.
pub fn parse_listing(document: &FetchedDocument, sink: &dyn ErrorSink) -> Option<ListingRecord> {
    match build_listing(document) {
        Ok(parsed) => {
            if let Some(e) = parsed.decode_error {
                tracing::warn!("Ignoring data layer of {}: {}", document.url, e);
                sink.report(ErrorKind::Decode, &document.url);
            }
            tracing::debug!("Parsed listing {} from {}", parsed.record.hemnet_id, document.url);
            Some(parsed.record)
        }
        Err(e) => {
            tracing::warn!("No listing from {}: {}", document.url, e);
            sink.report(e.kind(), &document.url);
            None
        }
    }
}

fn select_first<'a>(scope: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    scope.select(&selector).next()
}

fn select_all<'a>(scope: ElementRef<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(selector) => scope.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Text nodes of an element, each trimmed, joined by single spaces
fn joined_text(element: ElementRef) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn build_listing(document: &FetchedDocument) -> Result<ParsedListing, ParseError> {
    let hemnet_id = derive_identifier(&document.url)?;

    let (array, decode_error) = match probe_locators(&document.body).map(|b| b.decode()) {
        Some(Ok(array)) => (array, None),
        Some(Err(e)) => (Vec::new(), Some(e)),
        None => (Vec::new(), None),
    };
    let property = PROPERTY_KEYS
        .iter()
        .find_map(|key| find_object_with_key(&array, key));

    // A data layer without the property object describes nothing on its own
    let variant = if property.is_some() {
        LayoutVariant::Embedded
    } else {
        LayoutVariant::Legacy
    };

    let html = Html::parse_document(&document.body);
    let root = html.root_element();

    let broker = select_first(root, BROKER_BLOCK).ok_or(StructuralError { section: "broker" })?;
    let stats = attribute_table_for(&html, PRICE_STATS).ok_or(StructuralError {
        section: "price stats",
    })?;
    let attributes = match (attribute_table_for(&html, ATTRIBUTES), variant) {
        (Some(table), _) => table,
        (None, LayoutVariant::Embedded) => HashMap::new(),
        (None, LayoutVariant::Legacy) => {
            return Err(StructuralError {
                section: "attributes",
            }
            .into())
        }
    };

    tracing::trace!("{}: {:?} layout", document.url, variant);

    let contact = read_broker(broker);
    let metadata = select_first(root, METADATA);

    let mut record = ListingRecord {
        hemnet_id,
        url: document.url.clone(),
        property_type: derive_property_type(&document.url),
        broker_name: contact.name,
        broker_phone: contact.phone,
        broker_email: contact.email,
        broker_firm: json_string(property, "broker_firm").or(contact.firm),
        broker_firm_phone: contact.firm_phone,
        ..ListingRecord::default()
    };

    read_prices(&mut record, property, root, &stats);
    read_attributes(&mut record, property, &attributes);

    record.sold_date = json_string(property, "sold_at_date")
        .or_else(|| {
            metadata
                .and_then(|m| select_first(m, "time"))
                .and_then(|t| t.value().attr("datetime").map(str::to_string))
        })
        .and_then(|raw| parse_date(&raw).ok());

    record.address = json_string(property, "street_address").or_else(|| {
        let parts: Vec<String> = select_all(root, ADDRESS).into_iter().map(joined_text).collect();
        non_empty(&parts.join(" "))
    });

    record.geographic_area = json_string(json_object(property, "locations"), "municipality")
        .or_else(|| metadata.and_then(|m| extract_municipality(&joined_text(m))));

    Ok(ParsedListing {
        record,
        decode_error,
    })
}

fn read_prices(
    record: &mut ListingRecord,
    property: Option<&Map<String, Value>>,
    root: ElementRef,
    stats: &HashMap<String, String>,
) {
    record.price = json_integer(property, "selling_price").or_else(|| {
        select_first(root, PRICE_VALUE).and_then(|el| parse_currency(&joined_text(el)).ok())
    });

    record.asked_price = json_integer(property, "price")
        .or_else(|| stats.get("Begärt pris").and_then(|v| parse_currency(v).ok()));

    record.price_per_square_meter = json_integer(property, "price_per_m2").or_else(|| {
        stats
            .get("Pris per kvadratmeter")
            .and_then(|v| parse_leading_integer(v).ok())
    });

    if let Some((flat, percentage)) = stats
        .get("Prisutveckling")
        .and_then(|v| parse_price_trend(v).ok())
    {
        record.price_trend_flat = Some(flat);
        record.price_trend_percentage = Some(percentage);
    }
}

fn read_attributes(
    record: &mut ListingRecord,
    property: Option<&Map<String, Value>>,
    attributes: &HashMap<String, String>,
) {
    let attr = |label: &str| attributes.get(label).map(String::as_str);

    record.rooms = json_decimal(property, "rooms")
        .or_else(|| attr("Antal rum").and_then(|v| parse_decimal(strip_unit(v, "rum")).ok()));

    record.square_meters = json_decimal(property, "living_area")
        .or_else(|| attr("Boarea").and_then(|v| parse_decimal(strip_unit(v, "m²")).ok()));

    record.monthly_fee = json_integer(property, "borattavgift")
        .or_else(|| attr("Avgift/månad").and_then(|v| parse_currency(v).ok()));

    record.cost_per_year = json_integer(property, "driftkostnad")
        .or_else(|| attr("Driftskostnad").and_then(|v| parse_currency(v).ok()));

    record.year = json_string(property, "construction_year").or_else(|| attr("Byggår").and_then(non_empty));

    record.association = attr("Förening").and_then(non_empty);
    record.lot_size = attr("Tomtarea").and_then(|v| parse_leading_integer(v).ok());
    record.biarea = attr("Biarea").and_then(|v| parse_leading_integer(v).ok());
}

/// Read the broker block.
///
/// The block holds a few contact links. The first is the broker's phone.
/// A later link is either an obfuscated email address or the firm's phone;
/// the email decoding is tried first and the phone reading is the fallback.
fn read_broker(broker: ElementRef) -> BrokerContact {
    let mut contact = BrokerContact {
        name: select_first(broker, "b").and_then(|b| non_empty(&joined_text(b))),
        ..BrokerContact::default()
    };

    contact.firm = select_first(broker, "a:not(.phone-number):not(.broker__email)")
        .and_then(|a| non_empty(&joined_text(a)))
        .or_else(|| select_first(broker, "p:nth-child(2)").and_then(|p| non_empty(&joined_text(p))));

    let links: Vec<&str> = select_all(broker, "a.phone-number, a.broker__email")
        .into_iter()
        .filter_map(|a| a.value().attr("href"))
        .collect();

    let mut links = links.into_iter();
    contact.phone = non_empty(&strip_phone(links.next()));

    for href in links {
        match decode_obfuscated_email(href) {
            Ok(email) if email.contains('@') => {
                if contact.email.is_none() {
                    contact.email = Some(email);
                }
            }
            _ => {
                if contact.firm_phone.is_none() && href.starts_with("tel:") {
                    contact.firm_phone = non_empty(&strip_phone(Some(href)));
                }
            }
        }
    }

    contact
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_sink::testing::MemorySink;
    use chrono::NaiveDate;

    const URL: &str =
        "https://www.hemnet.se/salda/lagenhet-2rum-sodermalm-stockholms-kommun-tavastgatan-3-1234567";

    const BROKER: &str = r#"
        <div class="broker-info">
          <div class="broker">
            <p><b> Jesper Lindqvist </b></p>
            <p><a href="https://www.husmanhagberg.se">Husman Hagberg Södermalm</a></p>
            <a class="phone-number" href="tel:070-123 45 67">Visa telefonnummer</a>
            <a class="broker__email" href="/cdn-cgi/l/email-protection#b2d8d7c1c2d7c09cdedbdcd6c3c4dbc1c6f2dac7c1dfd3dcdad3d5d0d7c0d59cc1d7">E-post</a>
            <a class="phone-number" href="tel:08-555 000 00">Kontor</a>
          </div>
        </div>"#;

    const PRICE_BLOCK: &str = r#"
        <span class="sold-property__price-value">2&nbsp;650&nbsp;000 kr</span>
        <dl class="sold-property__price-stats">
          <dt>Pris per kvadratmeter</dt><dd>35&nbsp;099 kr/m²</dd>
          <dt>Begärt pris</dt><dd>2&nbsp;595&nbsp;000 kr</dd>
          <dt>Prisutveckling</dt><dd>+55&nbsp;000 kr (+2&nbsp;%)</dd>
        </dl>"#;

    const ATTRIBUTE_BLOCK: &str = r#"
        <dl class="sold-property__attributes">
          <dt>Antal rum</dt><dd>2,5 rum</dd>
          <dt>Boarea</dt><dd>64,5 m²</dd>
          <dt>Avgift/månad</dt><dd>3&nbsp;120 kr/mån</dd>
          <dt>Driftskostnad</dt><dd>6&nbsp;000 kr/år</dd>
          <dt>Byggår</dt><dd>2008-2009</dd>
          <dt>Förening</dt><dd> BRF Tavasten </dd>
          <dt>Tomtarea</dt><dd>N/A</dd>
        </dl>"#;

    const METADATA_BLOCK: &str = r#"
        <h1 class="sold-property__address">Tavastgatan 3</h1>
        <p class="sold-property__metadata">
          <time datetime="2017-05-12">Såld 12 maj 2017</time>
          Lägenhet - Södermalm,
          Stockholms kommun
        </p>"#;

    fn page(parts: &[&str]) -> String {
        format!("<html><head></head><body>{}</body></html>", parts.join("\n"))
    }

    fn parse(body: String) -> (Option<ListingRecord>, Vec<String>) {
        let sink = MemorySink::default();
        let record = parse_listing(&FetchedDocument::new(URL, body), &sink);
        (record, sink.entries())
    }

    #[test]
    fn test_legacy_page() {
        let (record, entries) = parse(page(&[BROKER, PRICE_BLOCK, ATTRIBUTE_BLOCK, METADATA_BLOCK]));
        let record = record.unwrap();

        assert!(entries.is_empty());
        assert_eq!(record.hemnet_id, 1234567);
        assert_eq!(record.url, URL);
        assert_eq!(record.property_type.as_deref(), Some("lagenhet"));

        assert_eq!(record.price, Some(2650000));
        assert_eq!(record.asked_price, Some(2595000));
        assert_eq!(record.price_per_square_meter, Some(35099));
        assert_eq!(record.price_trend_flat, Some(55000));
        assert_eq!(record.price_trend_percentage, Some(2));

        assert_eq!(record.rooms, Some(2.5));
        assert_eq!(record.square_meters, Some(64.5));
        assert_eq!(record.monthly_fee, Some(3120));
        assert_eq!(record.cost_per_year, Some(6000));
        assert_eq!(record.year.as_deref(), Some("2008-2009"));
        assert_eq!(record.association.as_deref(), Some("BRF Tavasten"));
        assert_eq!(record.lot_size, None);
        assert_eq!(record.biarea, None);

        assert_eq!(record.sold_date, NaiveDate::from_ymd_opt(2017, 5, 12));
        assert_eq!(record.address.as_deref(), Some("Tavastgatan 3"));
        assert_eq!(record.geographic_area.as_deref(), Some("Stockholms"));
    }

    #[test]
    fn test_broker_contact_links() {
        let (record, _) = parse(page(&[BROKER, PRICE_BLOCK, ATTRIBUTE_BLOCK]));
        let record = record.unwrap();

        assert_eq!(record.broker_name.as_deref(), Some("Jesper Lindqvist"));
        assert_eq!(record.broker_firm.as_deref(), Some("Husman Hagberg Södermalm"));
        assert_eq!(record.broker_phone.as_deref(), Some("070-123 45 67"));
        assert_eq!(record.broker_email.as_deref(), Some("jesper.lindqvist@husmanhagberg.se"));
        assert_eq!(record.broker_firm_phone.as_deref(), Some("08-555 000 00"));
    }

    #[test]
    fn test_second_contact_link_as_phone() {
        let broker = r#"
            <div class="broker-info"><div class="broker">
              <b>Anna</b>
              <a class="phone-number" href="tel:070-1">Mobil</a>
              <a class="phone-number" href="tel:08-2">Kontor</a>
            </div></div>"#;
        let (record, _) = parse(page(&[broker, PRICE_BLOCK, ATTRIBUTE_BLOCK]));
        let record = record.unwrap();

        assert_eq!(record.broker_phone.as_deref(), Some("070-1"));
        assert_eq!(record.broker_email, None);
        assert_eq!(record.broker_firm_phone.as_deref(), Some("08-2"));
    }

    #[test]
    fn test_embedded_page() {
        let script = r#"<script>dataLayer = [{"page":{"type":"sold"}},{"property":{"id":1234567,"rooms":3,"living_area":75.5,"price":2995000,"borattavgift":2800,"locations":{"municipality":"Stockholms kommun"}}}];</script>"#;
        let (record, entries) = parse(page(&[script, BROKER, PRICE_BLOCK]));
        let record = record.unwrap();

        assert!(entries.is_empty());
        assert_eq!(record.rooms, Some(3.0));
        assert_eq!(record.square_meters, Some(75.5));
        assert_eq!(record.asked_price, Some(2995000));
        assert_eq!(record.monthly_fee, Some(2800));
        assert_eq!(record.price, Some(2650000));
        assert_eq!(record.geographic_area.as_deref(), Some("Stockholms kommun"));
    }

    #[test]
    fn test_embedded_values_win_over_attribute_table() {
        let script = r#"<script>dataLayer = [{"property":{"rooms":3,"driftkostnad":"7 200 kr/år"}}];</script>"#;
        let (record, _) = parse(page(&[script, BROKER, PRICE_BLOCK, ATTRIBUTE_BLOCK]));
        let record = record.unwrap();

        assert_eq!(record.rooms, Some(3.0));
        assert_eq!(record.cost_per_year, Some(7200));
        assert_eq!(record.square_meters, Some(64.5));
    }

    #[test]
    fn test_missing_broker_block() {
        let (record, entries) = parse(page(&[PRICE_BLOCK, ATTRIBUTE_BLOCK]));

        assert!(record.is_none());
        assert_eq!(entries, vec![format!("StructuralError: {}", URL)]);
    }

    #[test]
    fn test_missing_price_stats() {
        let (record, entries) = parse(page(&[BROKER, ATTRIBUTE_BLOCK]));

        assert!(record.is_none());
        assert_eq!(entries, vec![format!("StructuralError: {}", URL)]);
    }

    #[test]
    fn test_legacy_page_requires_attributes() {
        let (record, entries) = parse(page(&[BROKER, PRICE_BLOCK]));

        assert!(record.is_none());
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_data_layer_without_property_requires_attributes() {
        let script = r#"<script>dataLayer = [{"page":{"type":"sold"}}];</script>"#;
        let (record, entries) = parse(page(&[script, BROKER, PRICE_BLOCK]));

        assert!(record.is_none());
        assert_eq!(entries, vec![format!("StructuralError: {}", URL)]);
    }

    #[test]
    fn test_broken_data_layer_requires_attributes() {
        let script = "<script>dataLayer = [{\"property\": broken}];</script>";
        let (record, entries) = parse(page(&[script, BROKER, PRICE_BLOCK]));

        assert!(record.is_none());
        assert_eq!(entries, vec![format!("StructuralError: {}", URL)]);
    }

    #[test]
    fn test_broken_data_layer_falls_back_to_tables() {
        let script = "<script>dataLayer = [{\"property\": broken}];</script>";
        let (record, entries) = parse(page(&[script, BROKER, PRICE_BLOCK, ATTRIBUTE_BLOCK]));
        let record = record.unwrap();

        assert_eq!(entries, vec![format!("DecodeError: {}", URL)]);
        assert_eq!(record.rooms, Some(2.5));
    }

    #[test]
    fn test_unparsable_fields_are_left_unset() {
        let attributes = r#"
            <dl class="sold-property__attributes">
              <dt>Antal rum</dt><dd>okänt</dd>
              <dt>Avgift/månad</dt><dd>-</dd>
            </dl>"#;
        let stats = r#"
            <dl class="sold-property__price-stats">
              <dt>Begärt pris</dt><dd>Saknas</dd>
              <dt>Prisutveckling</dt><dd>+55 000 kr</dd>
            </dl>"#;
        let (record, entries) = parse(page(&[BROKER, stats, attributes]));
        let record = record.unwrap();

        assert!(entries.is_empty());
        assert_eq!(record.rooms, None);
        assert_eq!(record.monthly_fee, None);
        assert_eq!(record.asked_price, None);
        assert_eq!(record.price_trend_flat, None);
        assert_eq!(record.price, None);
    }

    #[test]
    fn test_url_without_identifier() {
        let sink = MemorySink::default();
        let document = FetchedDocument::new(
            "https://www.hemnet.se/salda/bostader",
            page(&[BROKER, PRICE_BLOCK, ATTRIBUTE_BLOCK]),
        );

        assert!(parse_listing(&document, &sink).is_none());
        assert_eq!(sink.entries(), vec!["Other: https://www.hemnet.se/salda/bostader".to_string()]);
    }
}
