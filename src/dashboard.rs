//! Pipeline boundary for presentation code.
//!
//! Every call recomputes from the cached table and returns an [`Outcome`];
//! failures become an empty or partial result with a readable reason.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, warn};

use crate::{
    aggregate::{self, BandCount, HistoryPoint, IndexPoint, MetroEntry, Metric, RegionYear, SeriesPoint, YearSummary},
    cache::{cache_key, TableCache},
    config::Config,
    error::{Error, Result},
    export,
    load::{load_sources, Table},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub rows: Vec<T>,
    pub reason: Option<String>,
}

impl<T> Outcome<T> {
    pub fn ok(rows: Vec<T>) -> Self {
        Self { rows, reason: None }
    }

    fn failed(err: Error) -> Self {
        error!("{}", err);
        Self { rows: Vec::new(), reason: Some(err.to_string()) }
    }

    fn partial(rows: Vec<T>, err: Error) -> Self {
        warn!("{}", err);
        Self { rows, reason: Some(err.to_string()) }
    }

    /// Empty rows become a failure carrying `err`.
    fn or_empty(rows: Vec<T>, err: impl FnOnce() -> Error) -> Self {
        if rows.is_empty() {
            Self::failed(err())
        } else {
            Self::ok(rows)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A CSV file ready for download.
#[derive(Debug, Clone, PartialEq)]
pub struct Download {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub reason: Option<String>,
}

pub struct Dashboard {
    config: Config,
    cache: TableCache,
}

impl Dashboard {
    pub fn new(config: Config) -> Self {
        let cache = TableCache::new(config.cache_ttl());
        Self { config, cache }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    pub fn table(&self) -> Result<Arc<Table>> {
        let sources = self.config.sources();
        self.cache.get_or_load(&cache_key(&sources), || load_sources(&sources))
    }

    fn with_table<T>(&self, f: impl FnOnce(&Table) -> Outcome<T>) -> Outcome<T> {
        match self.table() {
            Ok(table) => f(&table),
            Err(e) => Outcome::failed(e),
        }
    }

    pub fn years(&self) -> Outcome<u32> {
        self.with_table(|t| Outcome::ok(t.years()))
    }

    pub fn metros(&self) -> Outcome<MetroEntry> {
        self.with_table(|t| Outcome::ok(aggregate::metro_directory(t)))
    }

    pub fn metro_view(&self, year: u32, metric: Metric) -> Outcome<RegionYear> {
        self.with_table(|t| {
            let rows = aggregate::metro_year(t, year, metric);
            yoy_outcome(rows, year, || Error::EmptyAfterFilter(format!("for {}", year)))
        })
    }

    pub fn zip_view(&self, metro: &str, year: u32, metric: Metric) -> Outcome<RegionYear> {
        self.with_table(|t| {
            let rows = aggregate::zips_in_metro(t, metro, year, metric);
            yoy_outcome(rows, year, || {
                Error::EmptyAfterFilter(format!("for {} in {}", metro, year))
            })
        })
    }

    pub fn summary(&self, year: u32, metric: Metric) -> Outcome<YearSummary> {
        let view = self.metro_view(year, metric);
        if view.is_empty() {
            return Outcome { rows: Vec::new(), reason: view.reason };
        }
        Outcome { rows: vec![aggregate::summarize(&view.rows, year, metric)], reason: view.reason }
    }

    pub fn metro_history(&self, metro: &str) -> Outcome<HistoryPoint> {
        self.with_table(|t| {
            Outcome::or_empty(aggregate::metro_history(t, metro), || {
                Error::EmptyAfterFilter(format!("for metro {}", metro))
            })
        })
    }

    pub fn zip_history(&self, zip: &str, metric: Metric) -> Outcome<SeriesPoint> {
        self.with_table(|t| {
            Outcome::or_empty(aggregate::zip_history(t, zip, metric), || {
                Error::EmptyAfterFilter(format!("for ZIP {}", zip))
            })
        })
    }

    pub fn affordability_bands(&self) -> Outcome<BandCount> {
        self.with_table(|t| Outcome::ok(aggregate::affordability_counts(t)))
    }

    pub fn composite_index(&self) -> Outcome<IndexPoint> {
        let base = self.config.base_year;
        self.with_table(|t| {
            Outcome::or_empty(aggregate::composite_index(t, base), || {
                Error::EmptyAfterFilter(format!("for base year {}", base))
            })
        })
    }

    /// ZIP table of one metro as CSV.
    pub fn zip_download(&self, metro: &str, year: u32, metric: Metric) -> Download {
        let view = self.zip_view(metro, year, metric);
        let file_name = format!("{}_{}_zip_data.csv", metro, year);
        match export::zip_table_csv(&view.rows) {
            Ok(bytes) => Download { file_name, bytes, reason: view.reason },
            Err(e) => {
                error!("{}", e);
                Download { file_name, bytes: Vec::new(), reason: Some(e.to_string()) }
            }
        }
    }
}

/// Flags a year where no region could be compared with the year before.
fn yoy_outcome(rows: Vec<RegionYear>, year: u32, empty: impl FnOnce() -> Error) -> Outcome<RegionYear> {
    if rows.is_empty() {
        Outcome::failed(empty())
    } else if rows.iter().all(|r| r.yoy_pct.is_none()) {
        Outcome::partial(rows, Error::NoPriorYear(year))
    } else {
        Outcome::ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dashboard_for(csv: &str) -> (Dashboard, tempfile::NamedTempFile) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(csv.as_bytes()).unwrap();
        let config = Config {
            sources: vec![f.path().display().to_string()],
            ..Config::default()
        };
        (Dashboard::new(config), f)
    }

    const DATA: &str = "\
city,city_full,zipcode,year,median_sale_price,per_capita_income
ATL,Atlanta,30301,2019,200000,40000
ATL,Atlanta,30301,2020,250000,40000
BOS,Boston,02134,2020,650000,52000
";

    #[test]
    fn views_from_file() {
        let (d, _f) = dashboard_for(DATA);
        let view = d.metro_view(2020, Metric::Pti);
        assert_eq!(view.rows.len(), 2);
        assert_eq!(view.reason, None);
        assert_eq!(d.years().rows, vec![2019, 2020]);
        assert_eq!(d.cache().len(), 1);
    }

    #[test]
    fn first_year_is_partial() {
        let (d, _f) = dashboard_for(DATA);
        let view = d.metro_view(2019, Metric::SalePrice);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.reason.as_deref(), Some("no prior-year data for 2019"));
    }

    #[test]
    fn missing_year_is_empty_with_reason() {
        let (d, _f) = dashboard_for(DATA);
        let view = d.metro_view(2030, Metric::Pti);
        assert!(view.is_empty());
        assert_eq!(view.reason.as_deref(), Some("no data available for 2030"));
        assert!(d.summary(2030, Metric::Pti).is_empty());
    }

    #[test]
    fn lfs_stub_is_reported_not_raised() {
        let (d, _f) = dashboard_for("version https://git-lfs.github.com/spec/v1\noid sha256:0\n");
        let view = d.metro_view(2020, Metric::Pti);
        assert!(view.is_empty());
        assert!(view.reason.unwrap().contains("Git LFS pointer"));
        assert!(d.cache().is_empty());
    }

    #[test]
    fn download_has_zip_rows() {
        let (d, _f) = dashboard_for(DATA);
        let dl = d.zip_download("BOS", 2020, Metric::Pti);
        assert_eq!(dl.file_name, "BOS_2020_zip_data.csv");
        let text = String::from_utf8(dl.bytes).unwrap();
        assert!(text.starts_with("zip_code_str,year,metric_value,city_full,rank"));
        assert!(text.contains("02134,2020,"));
    }

    #[test]
    fn composite_needs_base_year() {
        let (d, _f) = dashboard_for(DATA);
        let idx = d.composite_index();
        assert!(idx.is_empty());
        assert_eq!(idx.reason.as_deref(), Some("no data available for base year 2012"));
    }
}
