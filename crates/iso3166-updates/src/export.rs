use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{
    Aggregate, CODE_SUBDIVISION_CHANGE, CountryCode, DATE_ISSUED, DESCRIPTION_OF_CHANGE,
    EDITION_NEWSLETTER,
};
use crate::utils::YearExpression;

pub const DEFAULT_EXPORT_NAME: &str = "iso3166-updates";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("I/O error on {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |error| ExportError::Io {
        path: path.to_path_buf(),
        error,
    }
}

/// `iso3166-updates`, `iso3166-updates-AD,FI` or `iso3166-updates-FI_gt2020`
/// depending on what was requested. No extension.
pub fn export_filename(name: &str, countries: &[CountryCode], year: &YearExpression) -> String {
    let mut filename = name.to_string();
    if !countries.is_empty() {
        let codes: Vec<&str> = countries.iter().map(CountryCode::as_str).collect();
        filename.push('-');
        filename.push_str(&codes.join(","));
    }
    if !year.is_any() {
        filename.push('_');
        filename.push_str(&year.slug());
    }
    filename
}

pub fn write_json(aggregate: &Aggregate, dir: &Path, filename: &str) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(format!("{}.json", filename));
    let json = serde_json::to_string_pretty(aggregate)?;
    fs::write(&path, json).map_err(io_error(&path))?;
    log::info!("Exported {} country(ies) to {}", aggregate.len(), path.display());
    Ok(path)
}

/// Writes one row per record. A leading `Country Code` column is added when
/// the aggregate spans more than one country.
pub fn write_csv(aggregate: &Aggregate, dir: &Path, filename: &str) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = dir.join(format!("{}.csv", filename));
    let with_country = aggregate.len() > 1;

    let mut writer = csv::Writer::from_path(&path)?;
    let mut header = vec![
        DATE_ISSUED,
        CODE_SUBDIVISION_CHANGE,
        DESCRIPTION_OF_CHANGE,
        EDITION_NEWSLETTER,
    ];
    if with_country {
        header.insert(0, "Country Code");
    }
    writer.write_record(&header)?;

    for (code, records) in aggregate {
        for record in records {
            let mut row = vec![
                record.date_issued.as_str(),
                record.code_subdivision_change.as_str(),
                record.description_of_change.as_str(),
                record.edition_newsletter.as_str(),
            ];
            if with_country {
                row.insert(0, code.as_str());
            }
            writer.write_record(&row)?;
        }
    }
    writer.flush().map_err(io_error(&path))?;

    log::info!("Exported CSV to {}", path.display());
    Ok(path)
}

/// Reads a previously exported JSON aggregate.
pub fn load_aggregate(path: &Path) -> Result<Aggregate, ExportError> {
    let json = fs::read_to_string(path).map_err(io_error(path))?;
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChangeRecord;

    fn aggregate(codes: &[&str]) -> Aggregate {
        codes
            .iter()
            .map(|code| {
                (
                    code.to_string(),
                    vec![ChangeRecord {
                        date_issued: "2022-11-29".to_string(),
                        code_subdivision_change: "Change of subdivision category, region.".to_string(),
                        description_of_change: String::new(),
                        edition_newsletter: format!("https://www.iso.org/obp/ui/#iso:code:3166:{code}"),
                    }],
                )
            })
            .collect()
    }

    #[test]
    fn test_export_filename() {
        let codes = vec!["AD".parse().unwrap(), "FI".parse().unwrap()];
        assert_eq!(
            export_filename(DEFAULT_EXPORT_NAME, &[], &YearExpression::Any),
            "iso3166-updates"
        );
        assert_eq!(
            export_filename(DEFAULT_EXPORT_NAME, &codes, &">2020".parse().unwrap()),
            "iso3166-updates-AD,FI_gt2020"
        );
        assert_eq!(
            export_filename("out", &[], &"2010-2015".parse().unwrap()),
            "out_2010-2015"
        );
    }

    #[test]
    fn test_json_export_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let original = aggregate(&["FI"]);
        let path = write_json(&original, &dir.path().join("nested"), "updates").unwrap();
        assert!(path.ends_with("nested/updates.json"));

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"Date Issued\": \"2022-11-29\""));
        assert_eq!(load_aggregate(&path).unwrap(), original);
    }

    #[test]
    fn test_csv_country_column_only_for_many_countries() {
        let dir = tempfile::tempdir().unwrap();

        let single = write_csv(&aggregate(&["FI"]), dir.path(), "single").unwrap();
        let text = fs::read_to_string(single).unwrap();
        assert!(text.starts_with("Date Issued,Code/Subdivision Change,"));
        assert!(text.contains("\"Change of subdivision category, region.\""));

        let many = write_csv(&aggregate(&["AD", "FI"]), dir.path(), "many").unwrap();
        let text = fs::read_to_string(many).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Country Code,Date Issued"));
        assert!(lines[1].starts_with("AD,2022-11-29"));
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = load_aggregate(Path::new("/nonexistent/updates.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/updates.json"));
    }
}
