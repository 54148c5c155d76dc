use std::collections::{BTreeMap, HashMap, HashSet};

use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    classify::{classify, is_affordable, Affordability},
    load::{Observation, Table},
    ratio::ratio,
    stats::{pct_change, Sample},
};

/// Value that regions are ranked and compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Mean price-to-income ratio
    Pti,
    /// Median sale price
    SalePrice,
}

impl Metric {
    pub fn label(&self) -> &'static str {
        match self {
            Metric::Pti => "Price-to-Income Ratio (PTI)",
            Metric::SalePrice => "Median Sale Price",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Metro,
    Zip,
}

/// Rollup of one region (metro or ZIP) for one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionYear {
    pub key: String,
    pub metro: String,
    pub metro_full: String,
    pub year: u32,
    pub n: usize,
    pub zips: usize,
    pub median_price: f64,
    pub median_income: f64,
    pub mean_ratio: f64,
    pub median_ratio: f64,
    pub metric_value: f64,
    pub rank: usize,
    pub rank_total: usize,
    pub percentile: f64,
    pub yoy_pct: Option<f64>,
    /// Percent difference from the mean metric of the scope. Only set for
    /// drill-downs restricted to one metro.
    pub vs_scope_mean_pct: Option<f64>,
    pub affordability: Option<Affordability>,
    pub affordable: bool,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

struct Group<'a> {
    key: &'a str,
    rows: Vec<&'a Observation>,
}

fn key_of(obs: &Observation, level: Level) -> &str {
    match level {
        Level::Metro => &obs.metro,
        Level::Zip => &obs.zip,
    }
}

/// Groups in order of first appearance.
fn group<'a, I>(rows: I, level: Level) -> Vec<Group<'a>>
where
    I: Iterator<Item = &'a Observation>,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for obs in rows {
        let key = key_of(obs, level);
        match index.get(key) {
            Some(&i) => groups[i].rows.push(obs),
            None => {
                index.insert(key, groups.len());
                groups.push(Group { key, rows: vec![obs] });
            }
        }
    }
    groups
}

fn rollup(g: &Group, year: u32, metric: Metric) -> RegionYear {
    let prices: Sample = g.rows.iter().map(|r| r.price).collect();
    let incomes: Sample = g.rows.iter().map(|r| r.income).collect();
    let ratios: Sample = g.rows.iter().map(|r| r.ratio).collect();
    let lats: Sample = g.rows.iter().filter_map(|r| r.lat).collect();
    let lons: Sample = g.rows.iter().filter_map(|r| r.lon).collect();

    let median_price = prices.median().unwrap_or(f64::NAN);
    let mean_ratio = ratios.mean().unwrap_or(f64::NAN);
    let first = g.rows[0];

    RegionYear {
        key: g.key.to_owned(),
        metro: first.metro.clone(),
        metro_full: first.metro_full.clone(),
        year,
        n: g.rows.len(),
        zips: g.rows.iter().map(|r| r.zip.as_str()).collect::<HashSet<_>>().len(),
        median_price,
        median_income: incomes.median().unwrap_or(f64::NAN),
        mean_ratio,
        median_ratio: ratios.median().unwrap_or(f64::NAN),
        metric_value: match metric {
            Metric::Pti => mean_ratio,
            Metric::SalePrice => median_price,
        },
        rank: 0,
        rank_total: 0,
        percentile: 0.0,
        yoy_pct: None,
        vs_scope_mean_pct: None,
        affordability: classify(mean_ratio),
        affordable: is_affordable(mean_ratio),
        lat: lats.mean(),
        lon: lons.mean(),
    }
}

/// Sorts by metric value descending (stable) and fills rank and percentile.
pub fn assign_ranks(rows: &mut [RegionYear]) {
    rows.sort_by(|a, b| b.metric_value.total_cmp(&a.metric_value));
    let total = rows.len();
    for (i, row) in rows.iter_mut().enumerate() {
        row.rank = i + 1;
        row.rank_total = total;
        row.percentile = (total - row.rank) as f64 / total as f64 * 100.0;
    }
}

fn rollups(table: &Table, level: Level, year: u32, metric: Metric, within: Option<&str>) -> Vec<RegionYear> {
    let rows = table
        .in_year(year)
        .filter(|r| within.map(|m| r.metro == m).unwrap_or(true));
    let groups = group(rows, level);
    groups.par_iter().map(|g| rollup(g, year, metric)).collect()
}

/// Aggregates one year at the given level, optionally restricted to one
/// metro's rows. Ranks compare regions inside the same scope; YoY compares
/// against the same scope one year earlier.
pub fn aggregate(
    table: &Table,
    level: Level,
    year: u32,
    metric: Metric,
    within: Option<&str>,
) -> Vec<RegionYear> {
    let mut rows = rollups(table, level, year, metric, within);
    if rows.is_empty() {
        return rows;
    }

    if let Some(prev_year) = year.checked_sub(1) {
        let prev: HashMap<String, f64> = rollups(table, level, prev_year, metric, within)
            .into_iter()
            .map(|r| (r.key, r.metric_value))
            .collect();
        for row in rows.iter_mut() {
            row.yoy_pct = prev.get(&row.key).and_then(|p| pct_change(row.metric_value, *p));
        }
    }

    if within.is_some() {
        if let Some(mean) = rows.iter().map(|r| r.metric_value).collect::<Sample>().mean() {
            for row in rows.iter_mut() {
                row.vs_scope_mean_pct = Some(pct_diff(row.metric_value, mean));
            }
        }
    }

    assign_ranks(&mut rows);
    rows
}

/// Zero when the mean is zero.
fn pct_diff(value: f64, mean: f64) -> f64 {
    if mean == 0.0 {
        0.0
    } else {
        (value - mean) / mean * 100.0
    }
}

pub fn metro_year(table: &Table, year: u32, metric: Metric) -> Vec<RegionYear> {
    aggregate(table, Level::Metro, year, metric, None)
}

pub fn zip_year(table: &Table, year: u32, metric: Metric) -> Vec<RegionYear> {
    aggregate(table, Level::Zip, year, metric, None)
}

/// ZIPs of one metro, ranked against each other.
pub fn zips_in_metro(table: &Table, metro: &str, year: u32, metric: Metric) -> Vec<RegionYear> {
    aggregate(table, Level::Zip, year, metric, Some(metro))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extreme {
    pub key: String,
    pub name: String,
    pub value: f64,
}

impl Extreme {
    fn of(row: &RegionYear) -> Self {
        Self { key: row.key.clone(), name: row.metro_full.clone(), value: row.metric_value }
    }
}

/// Headline numbers for one aggregated year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearSummary {
    pub year: u32,
    pub metric: Metric,
    pub count: usize,
    pub mean_value: Option<f64>,
    pub highest: Option<Extreme>,
    pub lowest: Option<Extreme>,
    pub mean_yoy: Option<f64>,
}

pub fn summarize(rows: &[RegionYear], year: u32, metric: Metric) -> YearSummary {
    let values: Sample = rows.iter().map(|r| r.metric_value).collect();
    let yoys: Sample = rows.iter().filter_map(|r| r.yoy_pct).collect();
    YearSummary {
        year,
        metric,
        count: rows.len(),
        mean_value: values.mean(),
        highest: rows.iter().find(|r| r.rank == 1).map(Extreme::of),
        lowest: rows.iter().find(|r| r.rank == r.rank_total).map(Extreme::of),
        mean_yoy: yoys.mean(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub year: u32,
    pub n: usize,
    pub median_price: f64,
    pub median_income: f64,
    pub median_ratio: f64,
    pub affordability: Option<Affordability>,
}

/// Year-by-year medians for one metro, oldest first.
pub fn metro_history(table: &Table, metro: &str) -> Vec<HistoryPoint> {
    let mut years: BTreeMap<u32, (Sample, Sample, Sample)> = BTreeMap::new();
    for obs in table.rows().iter().filter(|r| r.metro == metro) {
        let e = years.entry(obs.year).or_default();
        e.0.add(obs.price);
        e.1.add(obs.income);
        e.2.add(obs.ratio);
    }
    years
        .into_iter()
        .map(|(year, (p, i, r))| {
            let median_ratio = r.median().unwrap_or(f64::NAN);
            HistoryPoint {
                year,
                n: p.len(),
                median_price: p.median().unwrap_or(f64::NAN),
                median_income: i.median().unwrap_or(f64::NAN),
                median_ratio,
                affordability: classify(median_ratio),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub year: u32,
    pub value: f64,
}

/// Metric value of one ZIP per year, oldest first.
pub fn zip_history(table: &Table, zip: &str, metric: Metric) -> Vec<SeriesPoint> {
    let rows = table.rows().iter().filter(|r| r.zip == zip);
    let mut by_year: BTreeMap<u32, Vec<&Observation>> = BTreeMap::new();
    for obs in rows {
        by_year.entry(obs.year).or_default().push(obs);
    }
    by_year
        .into_iter()
        .map(|(year, rows)| {
            let g = Group { key: zip, rows };
            SeriesPoint { year, value: rollup(&g, year, metric).metric_value }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandCount {
    pub year: u32,
    pub band: Affordability,
    pub label: &'static str,
    pub count: usize,
}

/// Number of metros in each affordability band, per year. Every band is
/// listed, including empty ones.
pub fn affordability_counts(table: &Table) -> Vec<BandCount> {
    let mut out = Vec::new();
    for year in table.years() {
        let metros = rollups(table, Level::Metro, year, Metric::Pti, None);
        let counts = metros.iter().filter_map(|m| m.affordability).counts();
        for band in Affordability::ALL {
            out.push(BandCount {
                year,
                band,
                label: band.label(),
                count: counts.get(&band).copied().unwrap_or(0),
            });
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexPoint {
    pub year: u32,
    pub median_price: f64,
    pub median_income: f64,
    pub price_index: f64,
    pub income_index: f64,
    pub ratio: f64,
}

/// National median price and income per year, each indexed to
/// `base_year = 100`. Empty when the base year has no rows.
pub fn composite_index(table: &Table, base_year: u32) -> Vec<IndexPoint> {
    let mut years: BTreeMap<u32, (Sample, Sample)> = BTreeMap::new();
    for obs in table.rows() {
        let e = years.entry(obs.year).or_default();
        e.0.add(obs.price);
        e.1.add(obs.income);
    }
    let medians: Vec<(u32, f64, f64)> = years
        .into_iter()
        .filter_map(|(y, (p, i))| Some((y, p.median()?, i.median()?)))
        .collect();

    let Some(&(_, base_price, base_income)) = medians.iter().find(|(y, _, _)| *y == base_year) else {
        return Vec::new();
    };

    medians
        .into_iter()
        .map(|(year, price, income)| IndexPoint {
            year,
            median_price: price,
            median_income: income,
            price_index: price / base_price * 100.0,
            income_index: income / base_income * 100.0,
            ratio: ratio(price, income),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetroEntry {
    pub code: String,
    pub full: String,
}

/// Distinct metros sorted by full name.
pub fn metro_directory(table: &Table) -> Vec<MetroEntry> {
    table
        .rows()
        .iter()
        .unique_by(|r| r.metro.clone())
        .map(|r| MetroEntry { code: r.metro.clone(), full: r.metro_full.clone() })
        .sorted_by(|a, b| a.full.cmp(&b.full).then_with(|| a.code.cmp(&b.code)))
        .collect()
}
