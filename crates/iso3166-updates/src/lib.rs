pub mod countries;
pub mod export;
pub mod harvest;
pub mod iso;
pub mod reconcile;
pub mod records;
pub mod table;
pub mod types;
pub mod utils;
pub mod wiki;

pub use harvest::{HarvestError, HarvestOptions, HarvestReport, Harvester, country_updates};
pub use types::{Aggregate, ChangeRecord, CountryCode};
pub use utils::{UpdatesFilter, YearExpression};
