use std::{
    collections::BTreeSet,
    fmt,
    io::Read,
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, StringRecord, Trim};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result, LFS_POINTER_MARKER},
    ratio::{monthly, ratio, valid_pair},
};

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]+").expect("separator regex"));
static ZIP_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,5}").expect("zip regex"));
static DATE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})").expect("date regex"));
static WHOLE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})(?:\.0+)?$").expect("year regex"));

/// Years outside this range are treated as unreadable.
const YEAR_RANGE: std::ops::RangeInclusive<u32> = 1900..=2100;

const METRO_ALIASES: [&str; 5] = ["city", "city_geojson_code", "cbsa", "metro", "metro_code"];
const FULL_NAME_ALIASES: [&str; 3] = ["city_full", "metro_full", "metro_name"];
const ZIP_ALIASES: [&str; 5] = ["zipcode", "zip_code", "zip", "zip_code_str", "zcta"];
const PRICE_ALIASES: [&str; 1] = ["median_sale_price"];
const INCOME_ALIASES: [&str; 1] = ["per_capita_income"];
const LAT_ALIASES: [&str; 2] = ["lat", "latitude"];
const LON_ALIASES: [&str; 3] = ["lon", "lng", "longitude"];

/// Where a dataset can be read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    Url(String),
    Path(PathBuf),
}

impl Source {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.starts_with("http://") || s.starts_with("https://") {
            Source::Url(s.to_owned())
        } else {
            Source::Path(PathBuf::from(s))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(u) => f.write_str(u),
            Source::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// One ZIP-level row with its derived values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub metro: String,
    pub metro_full: String,
    pub zip: String,
    pub year: u32,
    pub price: f64,
    pub income: f64,
    pub monthly_income_pc: f64,
    pub ratio: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Observation {
    /// Returns `None` for rows that cannot carry a ratio.
    pub fn new(
        metro: &str,
        metro_full: Option<&str>,
        zip: &str,
        year: u32,
        price: f64,
        income: f64,
    ) -> Option<Self> {
        let metro = metro.trim();
        if metro.is_empty() || !valid_pair(price, income) {
            return None;
        }
        let zip = normalize_zip(zip)?;
        Some(Self {
            metro: metro.to_owned(),
            metro_full: full_name(metro, metro_full),
            zip,
            year,
            price,
            income,
            monthly_income_pc: monthly(income),
            ratio: ratio(price, income),
            lat: None,
            lon: None,
        })
    }

    pub fn with_location(mut self, lat: Option<f64>, lon: Option<f64>) -> Self {
        self.lat = lat.filter(|v| v.is_finite());
        self.lon = lon.filter(|v| v.is_finite());
        self
    }
}

fn full_name(metro: &str, full: Option<&str>) -> String {
    match full.map(str::trim) {
        Some(f) if !f.is_empty() => f.to_owned(),
        _ => format!("{} Metro Area", metro),
    }
}

/// Loaded dataset. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Table {
    rows: Vec<Observation>,
    dropped: usize,
    origin: String,
}

impl Table {
    pub fn from_rows(rows: Vec<Observation>) -> Self {
        Self { rows, dropped: 0, origin: "memory".to_owned() }
    }

    pub fn rows(&self) -> &[Observation] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows skipped while loading.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn years(&self) -> Vec<u32> {
        self.rows.iter().map(|r| r.year).collect::<BTreeSet<_>>().into_iter().collect()
    }

    pub fn in_year(&self, year: u32) -> impl Iterator<Item = &Observation> {
        self.rows.iter().filter(move |r| r.year == year)
    }
}

pub fn normalize_header(h: &str) -> String {
    let h = h.trim().trim_start_matches('\u{feff}').to_lowercase();
    SEPARATORS.replace_all(&h, "_").into_owned()
}

/// Five-digit, zero-padded ZIP. Accepts float renderings such as `2134.0`.
pub fn normalize_zip(raw: &str) -> Option<String> {
    let m = ZIP_DIGITS.find(raw.trim())?;
    let n: u32 = m.as_str().parse().ok()?;
    Some(format!("{:05}", n))
}

fn parse_num(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',' && *c != '$').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Whole four-digit year, allowing a float rendering such as `2020.0`.
fn parse_year(raw: &str) -> Option<u32> {
    let y: u32 = WHOLE_YEAR.captures(raw.trim())?.get(1)?.as_str().parse().ok()?;
    YEAR_RANGE.contains(&y).then_some(y)
}

fn position(names: &[String], aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|a| names.iter().position(|n| n == a))
}

struct Columns {
    metro: usize,
    full: Option<usize>,
    zip: usize,
    year: Option<usize>,
    date: Option<usize>,
    price: usize,
    income: usize,
    lat: Option<usize>,
    lon: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let names: Vec<String> = headers.iter().map(normalize_header).collect();

        let price = position(&names, &PRICE_ALIASES).or_else(|| {
            names
                .iter()
                .position(|n| n.contains("median") && n.contains("sale") && n.contains("price"))
        });
        let income = position(&names, &INCOME_ALIASES)
            .or_else(|| names.iter().position(|n| n.contains("capita") && n.contains("income")));
        let metro = position(&names, &METRO_ALIASES);
        let zip = position(&names, &ZIP_ALIASES);
        let year = position(&names, &["year"]);
        let date = position(&names, &["date"]);

        let mut missing = Vec::new();
        if metro.is_none() {
            missing.push("metro code (city)");
        }
        if zip.is_none() {
            missing.push("zip code (zipcode)");
        }
        if year.is_none() && date.is_none() {
            missing.push("year");
        }
        if price.is_none() {
            missing.push("median_sale_price");
        }
        if income.is_none() {
            missing.push("per_capita_income");
        }

        match (metro, zip, price, income) {
            (Some(metro), Some(zip), Some(price), Some(income)) if missing.is_empty() => Ok(Self {
                metro,
                full: position(&names, &FULL_NAME_ALIASES),
                zip,
                year,
                date,
                price,
                income,
                lat: position(&names, &LAT_ALIASES),
                lon: position(&names, &LON_ALIASES),
            }),
            _ => Err(Error::SchemaMismatch {
                missing: missing.iter().join(", "),
                available: headers.iter().join(", "),
            }),
        }
    }

    fn year(&self, rec: &StringRecord) -> Option<u32> {
        if let Some(raw) = self.year.and_then(|i| rec.get(i)).filter(|v| !v.trim().is_empty()) {
            return parse_year(raw);
        }
        let date = self.date.and_then(|i| rec.get(i))?;
        parse_year(DATE_YEAR.captures(date.trim())?.get(1)?.as_str())
    }

    fn observation(&self, rec: &StringRecord) -> Option<Observation> {
        let num = |i: usize| rec.get(i).and_then(parse_num);
        let obs = Observation::new(
            rec.get(self.metro)?,
            self.full.and_then(|i| rec.get(i)),
            rec.get(self.zip)?,
            self.year(rec)?,
            num(self.price)?,
            num(self.income)?,
        )?;
        Some(obs.with_location(self.lat.and_then(num), self.lon.and_then(num)))
    }
}

/// Reads a CSV stream into a table, dropping rows that cannot be used.
pub fn read_table<R: Read>(input: R, origin: &str) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input);

    let headers = rdr.headers()?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(Error::EmptyFile(origin.to_owned()));
    }
    if headers.get(0).map(|h| h.contains(LFS_POINTER_MARKER)).unwrap_or(false) {
        return Err(Error::LfsPointer(origin.to_owned()));
    }

    let cols = Columns::resolve(&headers)?;

    let mut rows = Vec::new();
    let mut dropped = 0;
    for result in rdr.records() {
        match result {
            Ok(record) => match cols.observation(&record) {
                Some(obs) => rows.push(obs),
                None => dropped += 1,
            },
            Err(e) => {
                debug!("Skipping unreadable record: {}", e);
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!("Dropped {} invalid rows from {}", dropped, origin);
    }
    if rows.is_empty() {
        return Err(Error::EmptyAfterFilter(format!("in {} after removing invalid rows", origin)));
    }

    info!("Loaded {} rows from {}", rows.len(), origin);
    Ok(Table { rows, dropped, origin: origin.to_owned() })
}

pub fn load_path<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    read_table(file, &path.display().to_string())
}

pub fn load_url(url: &str) -> Result<Table> {
    let resp = reqwest::blocking::get(url)?.error_for_status()?;
    read_table(resp, url)
}

/// Tries each source in order. A missing file falls through to the next
/// source; any other failure ends the search.
pub fn load_sources(sources: &[Source]) -> Result<Table> {
    for source in sources {
        match source {
            Source::Path(p) if !p.exists() => {
                warn!("Data file not found at {}, trying next source", p.display());
                continue;
            }
            Source::Path(p) => return load_path(p),
            Source::Url(u) => {
                info!("Fetching data from {}", u);
                return load_url(u);
            }
        }
    }
    Err(Error::SourceMissing(sources.iter().join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SNAKE: &str = "\
city,city_full,zipcode,year,median_sale_price,per_capita_income,lat,lon
ATL,\"Atlanta-Sandy Springs, GA\",30301,2020,300000,50000,33.7,-84.4
ATL,,30302,2020,250000,40000,,
DEN,,80014.0,2021,0,40000,,
";

    const TITLE: &str = "\
city,zip_code,date,Median Sale Price,Per Capita Income
BOS,2134,2019-03-01,\"$650,000\",\"45,000\"
";

    #[test]
    fn loads_snake_case_headers() {
        let t = read_table(SNAKE.as_bytes(), "snake").unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.dropped(), 1);
        let first = &t.rows()[0];
        assert_eq!(first.metro_full, "Atlanta-Sandy Springs, GA");
        assert_eq!(first.lat, Some(33.7));
        assert!((first.monthly_income_pc - 50000.0 / 12.0).abs() < 1e-9);
        assert_eq!(t.rows()[1].metro_full, "ATL Metro Area");
    }

    #[test]
    fn loads_title_case_headers_and_dates() {
        let t = read_table(TITLE.as_bytes(), "title").unwrap();
        let row = &t.rows()[0];
        assert_eq!(row.zip, "02134");
        assert_eq!(row.year, 2019);
        assert_eq!(row.price, 650000.0);
        assert_eq!(row.income, 45000.0);
    }

    #[test]
    fn detects_lfs_pointer() {
        let stub = "version https://git-lfs.github.com/spec/v1\noid sha256:abc\nsize 271000000\n";
        let err = read_table(stub.as_bytes(), "HouseTS.csv").unwrap_err();
        assert!(matches!(err, Error::LfsPointer(_)));
        assert_eq!(err.kind(), ErrorKind::Source);
    }

    #[test]
    fn empty_input() {
        let err = read_table("".as_bytes(), "empty.csv").unwrap_err();
        assert!(matches!(err, Error::EmptyFile(_)));
    }

    #[test]
    fn reports_missing_columns() {
        let err = read_table("city,year,price\nATL,2020,1\n".as_bytes(), "bad").unwrap_err();
        match err {
            Error::SchemaMismatch { missing, available } => {
                assert!(missing.contains("median_sale_price"));
                assert!(missing.contains("per_capita_income"));
                assert_eq!(available, "city, year, price");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn all_rows_invalid_is_empty() {
        let csv = "city,zipcode,year,median_sale_price,per_capita_income\nATL,30301,2020,100,0\n";
        let err = read_table(csv.as_bytes(), "zeros").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Empty);
    }

    #[test]
    fn impossible_years_are_dropped() {
        let csv = "\
city,zipcode,year,median_sale_price,per_capita_income
ATL,30301,-2020,100000,40000
ATL,30302,2020.9,100000,40000
ATL,30303,20200,100000,40000
ATL,30304,0,100000,40000
ATL,30305,2020.0,100000,40000
ATL,30306,2021,100000,40000
";
        let t = read_table(csv.as_bytes(), "years").unwrap();
        assert_eq!(t.years(), vec![2020, 2021]);
        assert_eq!(t.dropped(), 4);
    }

    #[test]
    fn year_parsing() {
        assert_eq!(parse_year(" 2019 "), Some(2019));
        assert_eq!(parse_year("2019.00"), Some(2019));
        assert_eq!(parse_year("2019.5"), None);
        assert_eq!(parse_year("1066"), None);
        assert_eq!(parse_year("abc"), None);
    }

    #[test]
    fn zip_normalization() {
        assert_eq!(normalize_zip("2134").as_deref(), Some("02134"));
        assert_eq!(normalize_zip("2134.0").as_deref(), Some("02134"));
        assert_eq!(normalize_zip("02134-1234").as_deref(), Some("02134"));
        assert_eq!(normalize_zip("abc"), None);
    }

    #[test]
    fn header_normalization() {
        assert_eq!(normalize_header("Median Sale Price"), "median_sale_price");
        assert_eq!(normalize_header("\u{feff}Per-Capita  Income"), "per_capita_income");
    }

    #[test]
    fn missing_sources_fall_through() {
        let sources = vec![Source::parse("/nonexistent/a.csv"), Source::parse("/nonexistent/b.csv")];
        let err = load_sources(&sources).unwrap_err();
        assert!(matches!(err, Error::SourceMissing(_)));
        assert!(err.to_string().contains("/nonexistent/b.csv"));
    }

    #[test]
    fn source_parsing() {
        assert_eq!(Source::parse("https://x/y.csv"), Source::Url("https://x/y.csv".into()));
        assert_eq!(Source::parse("data/HouseTS.csv"), Source::Path("data/HouseTS.csv".into()));
    }
}
