use scraper::{ElementRef, Html};

use crate::table::{Grid, TableError, extract_table, normalize_headers};
use crate::types::DATE_ISSUED;

fn inside_table(element: ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| a.value().name() == "table")
}

fn has_date_column(grid: &Grid) -> bool {
    grid.first()
        .is_some_and(|header| normalize_headers(header).iter().any(|h| h == DATE_ISSUED))
}

/// Every top-level table with a date column between the `Changes` anchor and
/// the next `h2`. Pages without the section yield no grids.
pub fn parse_changes_tables(html: &str) -> Result<Vec<Grid>, TableError> {
    let document = Html::parse_document(html);

    let mut grids = Vec::new();
    let mut in_section = false;
    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        if !in_section {
            in_section = element.value().id() == Some("Changes");
            continue;
        }
        match element.value().name() {
            "h2" => break,
            "table" if !inside_table(element) => {
                let grid = extract_table(Some(element))?;
                if has_date_column(&grid) {
                    grids.push(grid);
                } else {
                    log::debug!("Skipping changes table without a date column: {:?}", grid.first());
                }
            }
            _ => {}
        }
    }

    if !in_section {
        log::debug!("No Changes section on wiki page");
    }
    Ok(grids)
}
