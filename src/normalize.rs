//! Locale-aware parsing of the raw strings found on Swedish listing pages.
//!
//! Every function here is pure. Callers decide what a failure means; for
//! record fields it always means "leave the field unset".

use crate::error::FormatError;
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

const NBSP: char = '\u{00a0}';
const NARROW_NBSP: char = '\u{202f}';

static PRICE_TREND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<sign>[+-])(?P<flat>\d+)\((?P<psign>[+-]?)(?P<percentage>\d+)%\)$")
        .expect("valid price trend regex")
});

static MUNICIPALITY_AFTER_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(.*)kommun").expect("valid municipality regex"));

static MUNICIPALITY_AFTER_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(.*)kommun").expect("valid municipality regex"));

/// Currency unit suffixes, longest first so "kr/mån" is not left as "/mån"
const CURRENCY_SUFFIXES: [&str; 4] = ["kr/mån", "kr/år", "kr/m²", "kr"];

fn remove_spaces(text: &str) -> String {
    text.chars()
        .filter(|c| *c != NBSP && *c != NARROW_NBSP && *c != ' ')
        .collect()
}

/// Parse an amount like "1 234 567 kr" or "3 450 kr/mån" into whole kronor
pub fn parse_currency(text: &str) -> Result<i64, FormatError> {
    let compact = remove_spaces(text.trim());

    let digits = CURRENCY_SUFFIXES
        .iter()
        .find_map(|suffix| compact.strip_suffix(suffix))
        .unwrap_or(&compact);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '-') {
        return Err(FormatError::new("currency", text));
    }

    digits
        .parse::<i64>()
        .map_err(|_| FormatError::new("currency", text))
}

/// Parse a decimal number written with a comma separator ("3,5" or "75,5")
pub fn parse_decimal(text: &str) -> Result<f64, FormatError> {
    let value = text
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| FormatError::new("decimal", text))?;

    if !value.is_finite() {
        return Err(FormatError::new("decimal", text));
    }

    Ok(value)
}

/// Remove a trailing unit such as "rum" or "m²" from a value
pub fn strip_unit<'a>(text: &'a str, unit: &str) -> &'a str {
    let trimmed = text.trim();
    trimmed.strip_suffix(unit).unwrap_or(trimmed).trim()
}

/// Parse the leading integer of a value like "1 234 m²" or "45 000 kr/m²"
pub fn parse_leading_integer(text: &str) -> Result<i64, FormatError> {
    let number: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || c.is_whitespace())
        .filter(|c| c.is_ascii_digit())
        .collect();

    number
        .parse::<i64>()
        .map_err(|_| FormatError::new("integer", text))
}

/// Remove the "tel:" prefix of a phone link
pub fn strip_phone(text: Option<&str>) -> String {
    match text {
        Some(phone) if !phone.is_empty() => phone.replace("tel:", "").trim().to_string(),
        _ => String::new(),
    }
}

/// Decode an email address hidden by the site's email protection.
///
/// The payload is hex: the first byte is an XOR key, every following byte
/// XORed with it is one character of the address. Anything after `?` is
/// ignored, as is anything up to a `#` so a whole link target can be passed.
pub fn decode_obfuscated_email(encoded: &str) -> Result<String, FormatError> {
    let payload = encoded.rsplit('#').next().unwrap_or(encoded);
    let payload = payload.split('?').next().unwrap_or(payload).trim();

    let bytes = hex::decode(payload).map_err(|_| FormatError::new("obfuscated email", encoded))?;

    let (key, body) = match bytes.split_first() {
        Some((key, body)) if !body.is_empty() => (*key, body),
        _ => return Err(FormatError::new("obfuscated email", encoded)),
    };

    let decoded: String = body.iter().map(|b| char::from(b ^ key)).collect();

    if decoded.chars().any(|c| c.is_ascii_control()) {
        return Err(FormatError::new("obfuscated email", encoded));
    }

    Ok(decoded)
}

/// Parse a price trend like "+50 000 kr (+3 %)" into (flat amount, percentage)
pub fn parse_price_trend(text: &str) -> Result<(i64, i64), FormatError> {
    let compact = remove_spaces(text).replace("kr", "");

    let caps = PRICE_TREND
        .captures(&compact)
        .ok_or_else(|| FormatError::new("price trend", text))?;

    let flat: i64 = format!("{}{}", &caps["sign"], &caps["flat"])
        .parse()
        .map_err(|_| FormatError::new("price trend", text))?;

    let percentage: i64 = caps["percentage"]
        .parse()
        .map_err(|_| FormatError::new("price trend", text))?;

    let percentage = if &caps["psign"] == "-" { -percentage } else { percentage };

    Ok((flat, percentage))
}

/// Extract the municipality name from a free-text location line.
/// "Lägenhet - Södermalm, Stockholms kommun" gives "Stockholms".
pub fn extract_municipality(text: &str) -> Option<String> {
    let line = text.replace('\n', "");

    let caps = MUNICIPALITY_AFTER_COMMA
        .captures(&line)
        .or_else(|| MUNICIPALITY_AFTER_DASH.captures(&line))?;

    let name = caps.get(1)?.as_str().trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Parse an ISO date, or the date part of an ISO datetime
pub fn parse_date(text: &str) -> Result<NaiveDate, FormatError> {
    let trimmed = text.trim();

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| {
            trimmed
                .get(..10)
                .ok_or(())
                .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| ()))
        })
        .map_err(|_| FormatError::new("date", text))
}
