use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>()
}

/// Pair the `dt` labels of a definition list with its `dd` values.
///
/// Labels and values are matched by position. When the counts differ the
/// extra labels or values are dropped. Labels are trimmed, values are
/// returned as rendered and left to the normalizers.
pub fn extract_attribute_table(fragment: ElementRef) -> HashMap<String, String> {
    let children: Vec<ElementRef> = fragment.children().filter_map(ElementRef::wrap).collect();

    let labels = children
        .iter()
        .filter(|el| el.value().name() == "dt")
        .map(|el| element_text(el).trim().to_string());

    let values = children
        .iter()
        .filter(|el| el.value().name() == "dd")
        .map(element_text);

    labels.zip(values).collect()
}

/// Attribute table of the first element matching `selector`, or `None` when
/// the page has no such element
pub fn attribute_table_for(document: &Html, selector: &str) -> Option<HashMap<String, String>> {
    let selector = Selector::parse(selector).ok()?;
    document.select(&selector).next().map(extract_attribute_table)
}
