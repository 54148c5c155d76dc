use std::{io::Write, path::Path};

use csv::Writer;
use serde::Serialize;

use crate::{
    aggregate::RegionYear,
    error::{Error, Result},
};

/// Row of the downloadable ZIP table.
#[derive(Serialize)]
struct ZipExportRow<'a> {
    zip_code_str: &'a str,
    year: u32,
    metric_value: f64,
    city_full: &'a str,
    rank: usize,
}

pub fn write_zip_table<W: Write>(rows: &[RegionYear], out: W) -> Result<()> {
    let mut writer = Writer::from_writer(out);
    for row in rows {
        writer.serialize(ZipExportRow {
            zip_code_str: &row.key,
            year: row.year,
            metric_value: row.metric_value,
            city_full: &row.metro_full,
            rank: row.rank,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// ZIP table as CSV bytes, ready to hand to a download.
pub fn zip_table_csv(rows: &[RegionYear]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_zip_table(rows, &mut buf)?;
    Ok(buf)
}

/// Every aggregate column, one row per region-year.
pub fn write_aggregates<W: Write>(rows: &[RegionYear], out: W) -> Result<()> {
    let mut writer = Writer::from_writer(out);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(Error::from)
}

pub fn write_aggregates_to_path<P: AsRef<Path>>(rows: &[RegionYear], path: P) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_aggregates(rows, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregate::{zips_in_metro, Metric},
        load::{Observation, Table},
    };

    fn table() -> Table {
        Table::from_rows(vec![
            Observation::new("BOS", Some("Boston, MA"), "2134", 2020, 650_000.0, 52_000.0).unwrap(),
            Observation::new("BOS", Some("Boston, MA"), "2135", 2020, 700_000.0, 50_000.0).unwrap(),
        ])
    }

    #[test]
    fn zip_table_columns() {
        let rows = zips_in_metro(&table(), "BOS", 2020, Metric::SalePrice);
        let csv = String::from_utf8(zip_table_csv(&rows).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "zip_code_str,year,metric_value,city_full,rank");
        assert_eq!(lines[1], "02135,2020,700000.0,\"Boston, MA\",1");
        assert_eq!(lines[2], "02134,2020,650000.0,\"Boston, MA\",2");
    }

    #[test]
    fn empty_table_writes_nothing() {
        assert!(zip_table_csv(&[]).unwrap().is_empty());
    }

    #[test]
    fn full_aggregates_round_header() {
        let rows = zips_in_metro(&table(), "BOS", 2020, Metric::Pti);
        let mut buf = Vec::new();
        write_aggregates(&rows, &mut buf).unwrap();
        let csv = String::from_utf8(buf).unwrap();
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("key,metro,metro_full,year,n,zips,median_price"));
        assert!(header.contains("yoy_pct,vs_scope_mean_pct,affordability,affordable"));
        assert_eq!(csv.lines().count(), 3);
    }
}
