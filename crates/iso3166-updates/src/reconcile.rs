use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use crate::records::ParsedRecord;
use crate::types::{ChangeRecord, RemarksBundle};

fn lowercase_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn append_remark(description: &mut String, remark: &str) {
    let trimmed = description.trim_end().trim_end_matches('.').to_string();
    *description = format!("{} ({}).", trimmed, lowercase_first(remark));
}

/// Folds each catalogue remark into the most recent record whose description
/// refers to it. A remark slot is used at most once.
pub fn merge_remarks(records: &mut [ParsedRecord], remarks: &RemarksBundle) {
    if remarks.is_empty() {
        return;
    }

    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by_key(|&i| Reverse(records[i].issue_date()));

    for part in 1..=RemarksBundle::SLOTS {
        let Some(remark) = remarks.get(part) else {
            continue;
        };
        let needle = format!("remark part {}", part);
        let target = order.iter().copied().find(|&i| {
            records[i]
                .description_of_change
                .to_lowercase()
                .contains(&needle)
        });
        if let Some(i) = target {
            log::debug!("Appending remark part {} to record dated {}", part, records[i].date_issued);
            append_remark(&mut records[i].description_of_change, remark);
        }
    }
}

/// Merges wiki and catalogue records for one country into the final list:
/// corrected rows replace their uncorrected twins, one record per issue date,
/// newest first.
pub fn reconcile(wiki: Vec<ParsedRecord>, iso: Vec<ParsedRecord>) -> Vec<ChangeRecord> {
    let mut records: Vec<ParsedRecord> = wiki.into_iter().chain(iso).collect();

    let mut corrected: HashMap<String, ParsedRecord> = HashMap::new();
    for record in records.iter().filter(|r| r.corrected.is_some()) {
        corrected
            .entry(record.date_issued.clone())
            .or_insert_with(|| record.clone());
    }
    for record in records.iter_mut() {
        if record.corrected.is_none()
            && let Some(replacement) = corrected.get(&record.date_issued)
        {
            *record = replacement.clone();
        }
    }

    for record in records.iter_mut() {
        if let Some(date) = &record.corrected {
            record.date_issued = date.clone();
        }
        if let Some(date) = record.issue_date() {
            record.date_issued = date.format("%Y-%m-%d").to_string();
        }
    }

    // Unparseable dates sort last; the sort is stable so ties keep wiki first.
    records.sort_by_key(|r| Reverse(r.issue_date()));

    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.date_issued.clone()));

    records
        .into_iter()
        .map(|record| {
            let note = record.corrected_note();
            let mut change = ChangeRecord {
                date_issued: format!("{}{}", record.date_issued, note),
                code_subdivision_change: record.code_subdivision_change,
                description_of_change: record.description_of_change,
                edition_newsletter: record.edition_newsletter,
            };
            if change.code_subdivision_change.is_empty() && !change.description_of_change.is_empty()
            {
                std::mem::swap(
                    &mut change.code_subdivision_change,
                    &mut change.description_of_change,
                );
            }
            change
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::parse_records;
    use crate::table::Grid;
    use crate::utils::YearExpression;

    fn record(date: &str, corrected: Option<&str>, code: &str, description: &str) -> ParsedRecord {
        ParsedRecord {
            date_issued: date.to_string(),
            corrected: corrected.map(str::to_string),
            code_subdivision_change: code.to_string(),
            description_of_change: description.to_string(),
            edition_newsletter: "Newsletter II-3.".to_string(),
        }
    }

    #[test]
    fn test_corrected_row_replaces_uncorrected_twin() {
        let grid: Grid = vec![
            vec!["Date Issued".into(), "Code/Subdivision Change".into()],
            vec!["2014-05-13".into(), "Subdivisions added: FI-13 FI-14.".into()],
            vec![
                "2014-05-13 (corrected 2014-06-01)".into(),
                "Subdivisions added: FI-13.".into(),
            ],
        ];
        let fi = "FI".parse().unwrap();
        let wiki = parse_records(&grid, &YearExpression::Any, &fi).unwrap();

        let result = reconcile(wiki, Vec::new());
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].date_issued, "2014-06-01 (corrected 2014-06-01)");
        assert_eq!(result[0].code_subdivision_change, "Subdivisions added: FI-13.");
    }

    #[test]
    fn test_corrected_fields_win_across_sources() {
        let wiki = vec![record("2011-12-13", None, "Old wording.", "")];
        let iso = vec![record("2011-12-13", Some("2011-12-15"), "New wording.", "Details.")];
        let result = reconcile(wiki, iso);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].code_subdivision_change, "New wording.");
        assert_eq!(result[0].description_of_change, "Details.");
        assert!(result[0].date_issued.ends_with("(corrected 2011-12-15)"));
    }

    #[test]
    fn test_reconcile_orders_newest_first_and_dedups() {
        let wiki = vec![
            record("2018-11-26", None, "Wiki 2018.", ""),
            record("2022-11-29", None, "Wiki 2022.", ""),
        ];
        let iso = vec![
            record("2020-11-24", None, "ISO 2020.", ""),
            record("2022-11-29", None, "ISO 2022.", ""),
            record("unknown", None, "Undated.", ""),
        ];
        let result = reconcile(wiki, iso);
        let dates: Vec<&str> = result.iter().map(|r| r.date_issued.as_str()).collect();
        assert_eq!(dates, vec!["2022-11-29", "2020-11-24", "2018-11-26", "unknown"]);
        assert_eq!(result[0].code_subdivision_change, "Wiki 2022.");
    }

    #[test]
    fn test_reconcile_repairs_swapped_columns() {
        let result = reconcile(vec![record("2007-04-17", None, "", "Subdivision layout.")], vec![]);
        assert_eq!(result[0].code_subdivision_change, "Subdivision layout.");
        assert_eq!(result[0].description_of_change, "");
    }

    #[test]
    fn test_merge_remarks_uses_each_slot_once() {
        let mut records = vec![
            record("2010-02-03", None, "", "See Remark part 2."),
            record("2015-11-27", None, "", "Update of remark part 2."),
            record("2012-06-14", None, "", "Change of remark part 2."),
            record("2014-10-29", None, "", "Update of Remark Part 1."),
        ];
        let mut remarks = RemarksBundle::default();
        remarks.set(1, "Includes the islands.");
        remarks.set(2, "Territory comprises two regions.");

        merge_remarks(&mut records, &remarks);

        assert_eq!(records[0].description_of_change, "See Remark part 2.");
        assert_eq!(
            records[1].description_of_change,
            "Update of remark part 2 (territory comprises two regions)."
        );
        assert_eq!(records[2].description_of_change, "Change of remark part 2.");
        assert_eq!(
            records[3].description_of_change,
            "Update of Remark Part 1 (includes the islands)."
        );
    }

    #[test]
    fn test_merge_remarks_without_remarks_is_noop() {
        let mut records = vec![record("2010-02-03", None, "", "See remark part 1.")];
        let before = records.clone();
        merge_remarks(&mut records, &RemarksBundle::default());
        assert_eq!(records, before);
    }
}
