use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::table::{Grid, TableError, extract_table};
use crate::types::RemarksBundle;

static SEL_SUMMARY: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.core-view-summary").expect("invalid selector: summary")
});

static SEL_SUMMARY_LINE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.core-view-summary div.core-view-line")
        .expect("invalid selector: summary line")
});

static SEL_FIELD_NAME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.core-view-field-name").expect("invalid selector: field name")
});

static SEL_FIELD_VALUE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.core-view-field-value").expect("invalid selector: field value")
});

static RE_REMARK_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^remark\s+part\s+(\d)$").expect("invalid regex: remark part")
});

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ")
}

/// Whether the rendered page reached the point where the summary panel exists.
pub fn has_summary_panel(html: &str) -> bool {
    Html::parse_document(html)
        .select(&SEL_SUMMARY)
        .next()
        .is_some()
}

/// Extracts the first table after the "Change history" heading, or an empty
/// grid when the page has none.
pub fn parse_changes_table(html: &str) -> Result<Grid, TableError> {
    let document = Html::parse_document(html);

    let mut past_heading = false;
    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        let name = element.value().name();
        if !past_heading {
            past_heading = HEADINGS.contains(&name)
                && elem_text(element).to_lowercase().contains("change history");
        } else if name == "table" {
            return extract_table(Some(element));
        }
    }

    log::debug!("No change history table on catalogue page");
    Ok(Grid::new())
}

pub fn parse_remarks(html: &str) -> RemarksBundle {
    let document = Html::parse_document(html);
    let mut remarks = RemarksBundle::default();

    for line in document.select(&SEL_SUMMARY_LINE) {
        let Some(name) = line.select(&SEL_FIELD_NAME).next() else {
            continue;
        };
        let name = elem_text(name);
        let Some(part) = RE_REMARK_PART
            .captures(name.trim())
            .and_then(|caps| caps[1].parse::<usize>().ok())
        else {
            continue;
        };
        if let Some(value) = line.select(&SEL_FIELD_VALUE).next() {
            let value = elem_text(value);
            remarks.set(part, &value.split_whitespace().collect::<Vec<_>>().join(" "));
        }
    }

    remarks
}
