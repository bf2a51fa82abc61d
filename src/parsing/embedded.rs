//! Reading the analytics data layer that listing pages embed in a script block.
//!
//! Pages have shipped the data layer in more than one shape over time. Each
//! shape has its own [`EmbeddedDataLocator`]; [`probe_locators`] tries them in
//! a fixed order and the first hit wins, so an unrelated script that happens to
//! contain JSON is never picked up by a loose catch-all pattern.

use crate::error::DecodeError;
use crate::normalize::{parse_currency, parse_date, parse_decimal, strip_unit};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

// Both patterns end on the opening bracket; the JSON itself is read by serde_json
static DATA_LAYER_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"dataLayer\s*=\s*\[").expect("valid dataLayer assignment regex")
});

static DATA_LAYER_PUSH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"dataLayer\.push\(\s*\{").expect("valid dataLayer push regex")
});

static COORDINATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"coordinate.*\[(\d{2}\.\d+),(\d{2}\.\d+)\]").expect("valid coordinate regex")
});

/// The text of the single JSON value `rest` starts with.
///
/// When no complete value can be read, the rest of the line is returned so
/// the failure surfaces when the block is decoded.
fn one_json_value(rest: &str) -> &str {
    let mut values = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    match values.next() {
        Some(Ok(_)) => &rest[..values.byte_offset()],
        _ => rest.lines().next().unwrap_or(rest),
    }
}

/// Finds the raw JSON array text of one data layer shape
pub trait EmbeddedDataLocator: Send + Sync {
    fn name(&self) -> &'static str;

    fn locate(&self, text: &str) -> Option<String>;
}

/// `dataLayer = [{...}, {...}];`
pub struct DataLayerAssignment;

impl EmbeddedDataLocator for DataLayerAssignment {
    fn name(&self) -> &'static str {
        "dataLayer assignment"
    }

    fn locate(&self, text: &str) -> Option<String> {
        DATA_LAYER_ASSIGNMENT
            .find(text)
            .map(|m| one_json_value(&text[m.end() - 1..]).to_string())
    }
}

/// One or more `dataLayer.push({...});` calls, gathered into an array
pub struct DataLayerPush;

impl EmbeddedDataLocator for DataLayerPush {
    fn name(&self) -> &'static str {
        "dataLayer push"
    }

    fn locate(&self, text: &str) -> Option<String> {
        let objects: Vec<&str> = DATA_LAYER_PUSH
            .find_iter(text)
            .map(|m| one_json_value(&text[m.end() - 1..]))
            .collect();

        if objects.is_empty() {
            None
        } else {
            Some(format!("[{}]", objects.join(",")))
        }
    }
}

static LOCATORS: [&dyn EmbeddedDataLocator; 2] = [&DataLayerAssignment, &DataLayerPush];

/// Raw data layer text and the locator that found it
#[derive(Debug, Clone)]
pub struct EmbeddedBlock {
    pub locator: &'static str,
    pub raw: String,
}

impl EmbeddedBlock {
    pub fn decode(&self) -> Result<Vec<Value>, DecodeError> {
        let value: Value = serde_json::from_str(&self.raw).map_err(|source| DecodeError::Json {
            locator: self.locator,
            source,
        })?;

        match value {
            Value::Array(items) => Ok(items),
            _ => Err(DecodeError::NotAnArray {
                locator: self.locator,
            }),
        }
    }
}

/// Try every locator in priority order and return the first block found
pub fn probe_locators(text: &str) -> Option<EmbeddedBlock> {
    LOCATORS.iter().find_map(|locator| {
        locator.locate(text).map(|raw| {
            tracing::trace!("Embedded data found by {}", locator.name());
            EmbeddedBlock {
                locator: locator.name(),
                raw,
            }
        })
    })
}

/// Locate and decode the embedded data array of a page
pub fn extract_embedded_array(text: &str) -> Result<Vec<Value>, DecodeError> {
    probe_locators(text).ok_or(DecodeError::Missing)?.decode()
}

/// The object stored under `key` in the first array element that has that key
pub fn find_object_with_key<'a>(array: &'a [Value], key: &str) -> Option<&'a Map<String, Value>> {
    array
        .iter()
        .find_map(|element| element.get(key))
        .and_then(Value::as_object)
}

/// Latitude and longitude from a `coordinate...[59.31,18.07]` literal
pub fn extract_coordinates(text: &str) -> Option<(f64, f64)> {
    let caps = COORDINATES.captures(text)?;
    let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let lon = caps.get(2)?.as_str().parse::<f64>().ok()?;
    Some((lat, lon))
}

/// String field of an embedded object; numbers are rendered as text
pub fn json_string(object: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    match object?.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Whole-number field; numbers are used as given, strings go through the currency parser
pub fn json_integer(object: Option<&Map<String, Value>>, key: &str) -> Option<i64> {
    match object?.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => parse_currency(s).ok(),
        _ => None,
    }
}

/// Decimal field; strings may carry a "rum" or "m²" unit
pub fn json_decimal(object: Option<&Map<String, Value>>, key: &str) -> Option<f64> {
    match object?.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_decimal(strip_unit(strip_unit(s, "rum"), "m²")).ok(),
        _ => None,
    }
}

pub fn json_bool(object: Option<&Map<String, Value>>, key: &str) -> Option<bool> {
    object?.get(key)?.as_bool()
}

pub fn json_date(object: Option<&Map<String, Value>>, key: &str) -> Option<NaiveDate> {
    object?.get(key)?.as_str().and_then(|s| parse_date(s).ok())
}

pub fn json_object<'a>(object: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Map<String, Value>> {
    object?.get(key)?.as_object()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ASSIGNMENT_PAGE: &str = r#"<html><head>
        <script>dataLayer = [{"page":{"type":"listing"}},{"property":{"id":123,"price":2500000}}];</script>
        </head><body></body></html>"#;

    #[test]
    fn test_extract_embedded_array_from_assignment() {
        let array = extract_embedded_array(ASSIGNMENT_PAGE).unwrap();
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn test_extract_embedded_array_from_push_calls() {
        let page = r#"<script>
            window.dataLayer = window.dataLayer || [];
            dataLayer.push({"page":{"type":"listing"}});
            dataLayer.push({"property":{"id":7}});
        </script>"#;

        let array = extract_embedded_array(page).unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[1], json!({"property": {"id": 7}}));
    }

    #[test]
    fn test_minified_assignment_stops_at_closing_bracket() {
        let page = r#"<script>dataLayer = [{"property":{"rooms":3}}];var other = [1,2];</script>"#;

        let block = probe_locators(page).unwrap();
        assert_eq!(block.raw, r#"[{"property":{"rooms":3}}]"#);

        let array = block.decode().unwrap();
        assert_eq!(array, vec![json!({"property": {"rooms": 3}})]);
    }

    #[test]
    fn test_minified_push_calls_on_one_line() {
        let page = r#"<script>dataLayer.push({"page":{"type":"listing"}});dataLayer.push({"property":{"id":7}});track([1]);</script>"#;

        let array = extract_embedded_array(page).unwrap();
        assert_eq!(
            array,
            vec![json!({"page": {"type": "listing"}}), json!({"property": {"id": 7}})]
        );
    }

    #[test]
    fn test_brackets_inside_strings_do_not_end_the_block() {
        let page = r#"<script>dataLayer = [{"property":{"street_address":"Gatan 1 ];"}}];x();</script>"#;

        let array = extract_embedded_array(page).unwrap();
        let property = find_object_with_key(&array, "property");
        assert_eq!(json_string(property, "street_address").as_deref(), Some("Gatan 1 ];"));
    }

    #[test]
    fn test_assignment_has_priority_over_push() {
        let page = r#"<script>
            dataLayer = [{"source":"assignment"}];
            dataLayer.push({"source":"push"});
        </script>"#;

        let block = probe_locators(page).unwrap();
        assert_eq!(block.locator, "dataLayer assignment");
    }

    #[test]
    fn test_missing_block_is_decode_error() {
        let result = extract_embedded_array("<html><script>var x = 1;</script></html>");
        assert!(matches!(result, Err(DecodeError::Missing)));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let result = extract_embedded_array("<script>dataLayer = [{broken];</script>");
        assert!(matches!(result, Err(DecodeError::Json { .. })));
    }

    #[test]
    fn test_find_object_with_key() {
        let array = extract_embedded_array(ASSIGNMENT_PAGE).unwrap();

        let property = find_object_with_key(&array, "property").unwrap();
        assert_eq!(property.get("id"), Some(&json!(123)));

        assert!(find_object_with_key(&array, "sold_property").is_none());
    }

    #[test]
    fn test_find_object_with_key_requires_object() {
        let array = vec![json!({"property": 5}), json!({"property": {"id": 1}})];
        assert!(find_object_with_key(&array, "property").is_none());
    }

    #[test]
    fn test_extract_coordinates() {
        let page = r#"<div data-map='{"coordinate":[59.3145,18.0736],"zoom":14}'></div>"#;
        assert_eq!(extract_coordinates(page), Some((59.3145, 18.0736)));
    }

    #[test]
    fn test_extract_coordinates_absent() {
        assert_eq!(extract_coordinates("<div>no map here</div>"), None);
        assert_eq!(extract_coordinates(r#"{"coordinate":[5.1,18.0]}"#), None);
    }

    #[test]
    fn test_json_field_helpers() {
        let value = json!({
            "rooms": "3,5 rum",
            "living_area": 75.5,
            "price": 2500000,
            "borattavgift": "3\u{00a0}450 kr/mån",
            "new_production": false,
            "publication_date": "2017-05-12",
            "status": "  ",
            "locations": {"city": "Stockholm"}
        });
        let object = value.as_object();

        assert_eq!(json_decimal(object, "rooms"), Some(3.5));
        assert_eq!(json_decimal(object, "living_area"), Some(75.5));
        assert_eq!(json_integer(object, "price"), Some(2500000));
        assert_eq!(json_integer(object, "borattavgift"), Some(3450));
        assert_eq!(json_bool(object, "new_production"), Some(false));
        assert_eq!(json_date(object, "publication_date"), NaiveDate::from_ymd_opt(2017, 5, 12));
        assert_eq!(json_string(object, "status"), None);
        assert_eq!(json_string(object, "price").as_deref(), Some("2500000"));
        assert_eq!(
            json_string(json_object(object, "locations"), "city").as_deref(),
            Some("Stockholm")
        );
        assert_eq!(json_string(None, "city"), None);
    }
}
