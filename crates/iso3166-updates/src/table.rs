use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;
use scraper::node::Node;

use crate::types::{CODE_SUBDIVISION_CHANGE, DATE_ISSUED, DESCRIPTION_OF_CHANGE, EDITION_NEWSLETTER};

/// Rectangular rows of cell text; row 0 is the header.
pub type Grid = Vec<Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Expected a <table> element, found <{0}>")]
    NotATable(String),
}

static RE_SPACE_BEFORE_PUNCT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+([,;:])").expect("invalid regex: punctuation spacing"));

/// Historical header spellings, checked in order by case-insensitive
/// substring. Canonical names map onto themselves.
const HEADER_RULES: &[(&str, &str)] = &[
    ("date issued", DATE_ISSUED),
    ("effective date", DATE_ISSUED),
    ("date of change", DATE_ISSUED),
    ("description of change", DESCRIPTION_OF_CHANGE),
    ("changes made", DESCRIPTION_OF_CHANGE),
    ("description", DESCRIPTION_OF_CHANGE),
    ("code/subdivision", CODE_SUBDIVISION_CHANGE),
    ("subdivision change", CODE_SUBDIVISION_CHANGE),
    ("code change", CODE_SUBDIVISION_CHANGE),
    ("edition/newsletter", EDITION_NEWSLETTER),
    ("newsletter", EDITION_NEWSLETTER),
    ("edition", EDITION_NEWSLETTER),
    ("source", EDITION_NEWSLETTER),
];

/// Converts a `<table>` into a grid, expanding row and column spans so every
/// covered position holds the spanning cell's text. `None` yields an empty
/// grid.
pub fn extract_table(table: Option<ElementRef>) -> Result<Grid, TableError> {
    let Some(table) = table else {
        return Ok(Grid::new());
    };
    if table.value().name() != "table" {
        return Err(TableError::NotATable(table.value().name().to_string()));
    }

    let rows: Vec<Vec<ElementRef>> = table_rows(table).into_iter().map(row_cells).collect();
    let row_count = rows.len();

    // The last cell of a row is counted as one column wide so a trailing
    // colspan cannot invent columns no other row fills.
    let mut column_count = 0;
    let mut pending: Vec<usize> = Vec::new();
    for (r, cells) in rows.iter().enumerate() {
        let leading: usize = cells
            .iter()
            .rev()
            .skip(1)
            .map(|c| span(*c, "colspan").max(1))
            .sum();
        column_count = column_count.max(leading + cells.len().min(1) + pending.len());

        pending.extend(cells.iter().map(|c| match span(*c, "rowspan") {
            0 => row_count - r,
            n => n,
        }));
        pending = pending.into_iter().filter(|&s| s > 1).map(|s| s - 1).collect();
    }

    let mut grid: Vec<Vec<Option<String>>> = vec![vec![None; column_count]; row_count];
    let mut active: HashMap<usize, usize> = HashMap::new();

    for (r, cells) in rows.iter().enumerate() {
        let mut offset = 0;
        for (c, cell) in cells.iter().enumerate() {
            let mut col = c + offset;
            while active.get(&col).is_some_and(|&s| s > 0) {
                offset += 1;
                col += 1;
            }

            let rowspan = match span(*cell, "rowspan") {
                0 => row_count - r,
                n => n,
            };
            let colspan = match span(*cell, "colspan") {
                0 => column_count.saturating_sub(col).max(1),
                n => n,
            };
            active.insert(col, rowspan);
            offset += colspan - 1;

            let text = cell_text(*cell, r > 0);
            for dr in 0..rowspan.min(row_count - r) {
                for dc in 0..colspan {
                    if let Some(slot) = grid.get_mut(r + dr).and_then(|row| row.get_mut(col + dc)) {
                        *slot = Some(text.clone());
                        active.insert(col + dc, rowspan);
                    }
                }
            }
        }
        active = active
            .into_iter()
            .filter(|&(_, s)| s > 1)
            .map(|(c, s)| (c, s - 1))
            .collect();
    }

    Ok(grid
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect())
}

fn table_rows(table: ElementRef) -> Vec<ElementRef> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|e| e.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn row_cells(row: ElementRef) -> Vec<ElementRef> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|e| matches!(e.value().name(), "td" | "th"))
        .collect()
}

// Browser limits on span attributes.
const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

fn span(cell: ElementRef, attr: &str) -> usize {
    let limit = if attr == "colspan" { MAX_COLSPAN } else { MAX_ROWSPAN };
    cell.value()
        .attr(attr)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map_or(1, |n| n.min(limit))
}

fn is_citation(element: ElementRef) -> bool {
    element.value().name() == "sup" && element.value().classes().any(|c| c == "reference")
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                match el.name() {
                    "br" => out.push(' '),
                    "style" | "script" => {}
                    _ if is_citation(child) => {}
                    _ => collect_text(child, out),
                }
            }
            _ => {}
        }
    }
}

fn is_internal_link(href: &str) -> bool {
    href.starts_with('#')
        || href.starts_with("./")
        || (href.starts_with('/') && !href.starts_with("//"))
        || href.contains("wikipedia.org/wiki/")
}

fn external_link(cell: ElementRef) -> Option<String> {
    cell.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "a")
        .filter(|a| !a.ancestors().filter_map(ElementRef::wrap).any(is_citation))
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty() && !is_internal_link(href))
        .map(|href| match href.strip_prefix("//") {
            Some(rest) => format!("https://{}", rest),
            None => href.to_string(),
        })
}

/// Whitespace-collapsed text of a single cell. Body cells gain a trailing
/// period and external link targets are appended in parentheses.
pub fn cell_text(cell: ElementRef, body_row: bool) -> String {
    let mut raw = String::new();
    collect_text(cell, &mut raw);
    let raw = raw.replace('\u{a0}', " ");
    if raw.trim().is_empty() {
        return String::new();
    }

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut text = RE_SPACE_BEFORE_PUNCT.replace_all(&collapsed, "$1").into_owned();

    if let Some(url) = external_link(cell) {
        text = format!("{} ({})", text, url);
    }
    if body_row && !text.ends_with('.') {
        text.push('.');
    }
    text.replace(['\n', '\r'], "")
}

/// Maps one header cell onto its canonical column name, or returns it
/// unchanged when no rule matches.
pub fn normalize_header(header: &str) -> String {
    let key = header
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    for canonical in [DATE_ISSUED, EDITION_NEWSLETTER, CODE_SUBDIVISION_CHANGE, DESCRIPTION_OF_CHANGE] {
        if key == canonical.to_lowercase() {
            return canonical.to_string();
        }
    }
    HEADER_RULES
        .iter()
        .find(|(trigger, _)| key.contains(trigger))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| header.to_string())
}

pub fn normalize_headers(headers: &[String]) -> Vec<String> {
    headers.iter().map(|h| normalize_header(h)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn grid_of(html: &str) -> Grid {
        let document = Html::parse_fragment(html);
        let selector = Selector::parse("table").unwrap();
        extract_table(document.select(&selector).next()).expect("Failed to extract table")
    }

    #[test]
    fn test_extract_plain_table() {
        let grid = grid_of(
            "<table><tr><th>Date issued</th><th>Newsletter</th></tr>\
             <tr><td>2014-11-03</td><td>Newsletter II-3</td></tr></table>",
        );
        assert_eq!(
            grid,
            vec![
                vec!["Date issued".to_string(), "Newsletter".to_string()],
                vec!["2014-11-03.".to_string(), "Newsletter II-3.".to_string()],
            ]
        );
    }

    #[test]
    fn test_extract_expands_row_and_col_spans() {
        let grid = grid_of(
            r#"<table>
                <tr><th>A</th><th>B</th><th>C</th></tr>
                <tr><td rowspan="2">a1</td><td colspan="2">bc1</td></tr>
                <tr><td>b2</td><td>c2</td></tr>
                <tr><td>a3</td><td rowspan="0">b3</td><td>c3</td></tr>
                <tr><td>a4</td><td>c4</td></tr>
            </table>"#,
        );
        assert_eq!(grid.len(), 5);
        assert!(grid.iter().all(|row| row.len() == 3), "grid not rectangular: {grid:?}");
        assert_eq!(grid[1], vec!["a1.", "bc1.", "bc1."]);
        assert_eq!(grid[2], vec!["a1.", "b2.", "c2."]);
        assert_eq!(grid[3], vec!["a3.", "b3.", "c3."]);
        assert_eq!(grid[4], vec!["a4.", "b3.", "c4."]);
    }

    #[test]
    fn test_trailing_colspan_does_not_add_columns() {
        let grid = grid_of(
            r#"<table>
                <tr><th>A</th><th>B</th></tr>
                <tr><td>a1</td><td colspan="5">wide</td></tr>
            </table>"#,
        );
        assert!(grid.iter().all(|row| row.len() == 2), "{grid:?}");
        assert_eq!(grid[1], vec!["a1.", "wide."]);
    }

    #[test]
    fn test_overflowing_rowspan_is_dropped() {
        let grid = grid_of(
            r#"<table>
                <tr><th>A</th><th>B</th></tr>
                <tr><td rowspan="9">a1</td><td>b1</td></tr>
            </table>"#,
        );
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1], vec!["a1.", "b1."]);
    }

    #[test]
    fn test_huge_spans_are_clamped() {
        let grid = grid_of(
            r#"<table>
                <tr><th>A</th><th>B</th><th>C</th></tr>
                <tr><td>a1</td><td colspan="100000000" rowspan="100000000">wide</td><td>c1</td></tr>
            </table>"#,
        );
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[1].len(), MAX_COLSPAN + 2);
        assert!(grid.iter().all(|row| row.len() == grid[1].len()));
        assert_eq!(grid[1][1], "wide.");
        assert_eq!(grid[1][MAX_COLSPAN + 1], "c1.");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let grid = grid_of(
            "<table><tr><th>A</th><th>B</th><th>C</th></tr><tr><td>only</td></tr></table>",
        );
        assert_eq!(grid[1], vec!["only.", "", ""]);
    }

    #[test]
    fn test_cell_text_rules() {
        let grid = grid_of(
            r##"<table>
                <tr><th>Newsletter</th><th>Change</th><th>Empty</th></tr>
                <tr>
                  <td><a href="https://www.iso.org/files/newsletter_ii-3.pdf">Newsletter II-3</a><sup class="reference"><a href="#cite_note-1">[1]</a></sup></td>
                  <td>Subdivisions  added :&nbsp;FI-13 ,<br>FI-14</td>
                  <td>
</td>
                </tr>
                <tr><td><a href="/wiki/ISO_3166-2:FI">Finland</a></td><td>Done.</td><td></td></tr>
            </table>"##,
        );
        assert_eq!(
            grid[1][0],
            "Newsletter II-3 (https://www.iso.org/files/newsletter_ii-3.pdf)."
        );
        assert_eq!(grid[1][1], "Subdivisions added: FI-13, FI-14.");
        assert_eq!(grid[1][2], "");
        assert_eq!(grid[2][0], "Finland.");
        assert_eq!(grid[2][1], "Done.");
    }

    #[test]
    fn test_absent_table_is_empty_grid() {
        assert!(extract_table(None).unwrap().is_empty());
    }

    #[test]
    fn test_non_table_is_rejected() {
        let document = Html::parse_fragment("<div><p>not a table</p></div>");
        let selector = Selector::parse("div").unwrap();
        let div = document.select(&selector).next();
        assert!(matches!(extract_table(div), Err(TableError::NotATable(tag)) if tag == "div"));
    }

    #[test]
    fn test_normalize_headers_maps_synonyms() {
        let headers: Vec<String> = [
            "Effective date of change",
            "Short description of change (en)",
            "Newsletter",
            "Code/Subdivision change",
            "Changes made",
            "Comments",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(
            normalize_headers(&headers),
            vec![
                DATE_ISSUED,
                DESCRIPTION_OF_CHANGE,
                EDITION_NEWSLETTER,
                CODE_SUBDIVISION_CHANGE,
                DESCRIPTION_OF_CHANGE,
                "Comments",
            ]
        );
    }

    #[test]
    fn test_normalize_headers_is_idempotent() {
        let canonical: Vec<String> = [
            DATE_ISSUED,
            EDITION_NEWSLETTER,
            CODE_SUBDIVISION_CHANGE,
            DESCRIPTION_OF_CHANGE,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(normalize_headers(&canonical), canonical);

        let once = normalize_headers(&["Description of change in newsletter".to_string()]);
        assert_eq!(normalize_headers(&once), once);
        assert_eq!(once, vec![DESCRIPTION_OF_CHANGE]);
    }
}
