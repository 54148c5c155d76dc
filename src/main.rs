use std::{error::Error, io, path::PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use housebrowse::{
    aggregate::{self, BandCount, HistoryPoint, IndexPoint, MetroEntry, SeriesPoint, YearSummary},
    classify::label,
    config::load_config,
    export, Dashboard, Level, Metric, Outcome, RegionYear,
};

#[derive(Parser)]
#[command(name = "housebrowse", version, about = "Housing affordability by metro and ZIP code")]
struct Cli {
    /// Config file (otherwise HOUSEBROWSE_CONFIG, ./housebrowse.toml, user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data source path or URL; repeat to give fallbacks. Replaces configured sources.
    #[arg(long = "source", global = true)]
    sources: Vec<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Years present in the dataset
    Years,
    /// Metro names and codes
    Directory,
    /// Ranked metros for a year
    Metros {
        #[arg(long)]
        year: u32,
        #[arg(long, value_enum, default_value_t = Metric::Pti)]
        metric: Metric,
        /// Print headline numbers instead of the table
        #[arg(long)]
        summary: bool,
    },
    /// Ranked ZIPs of one metro for a year
    Zips {
        #[arg(long)]
        metro: String,
        #[arg(long)]
        year: u32,
        #[arg(long, value_enum, default_value_t = Metric::Pti)]
        metric: Metric,
        /// Write the downloadable ZIP table here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Year-by-year history of a metro or a ZIP
    History {
        #[arg(long, conflicts_with = "zip", required_unless_present = "zip")]
        metro: Option<String>,
        #[arg(long)]
        zip: Option<String>,
        #[arg(long, value_enum, default_value_t = Metric::Pti)]
        metric: Metric,
    },
    /// Metros per affordability band, per year
    Bands,
    /// Median price and income indexed to the base year
    Index,
    /// Ratio and band for a single price and income
    Classify {
        #[arg(long)]
        price: f64,
        #[arg(long)]
        income: f64,
    },
    /// Write every aggregate for a range of years as CSV
    Export {
        #[arg(long)]
        from: u32,
        #[arg(long)]
        to: u32,
        #[arg(long, value_enum, default_value_t = Level::Metro)]
        level: Level,
        #[arg(long, value_enum, default_value_t = Metric::Pti)]
        metric: Metric,
        /// Defaults to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    let default_level = config.as_ref().map(|c| c.log_level.clone()).unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(io::stderr)
        .init();

    info!("Starting housebrowse v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config?;
    if !cli.sources.is_empty() {
        config.sources = cli.sources.clone();
        config.validate()?;
    }
    let dashboard = Dashboard::new(config);
    let json = cli.json;

    match cli.command {
        Command::Years => emit(json, &dashboard.years(), |y: &u32| y.to_string()),
        Command::Directory => emit(json, &dashboard.metros(), |m: &MetroEntry| {
            format!("{:<8} {}", m.code, m.full)
        }),
        Command::Metros { year, metric, summary } => {
            if summary {
                emit(json, &dashboard.summary(year, metric), summary_line)
            } else {
                emit(json, &dashboard.metro_view(year, metric), region_line)
            }
        }
        Command::Zips { metro, year, metric, out } => match out {
            Some(path) => {
                let download = dashboard.zip_download(&metro, year, metric);
                if let Some(reason) = &download.reason {
                    warn!("{}", reason);
                }
                std::fs::write(&path, &download.bytes)?;
                info!("Wrote {} ({} bytes)", path.display(), download.bytes.len());
                Ok(())
            }
            None => emit(json, &dashboard.zip_view(&metro, year, metric), region_line),
        },
        Command::History { metro, zip, metric } => match (metro, zip) {
            (Some(metro), _) => emit(json, &dashboard.metro_history(&metro), |p: &HistoryPoint| {
                format!(
                    "{}  n={:<6} price={:>12.0}  income={:>10.0}  ratio={:>6.2}  {}",
                    p.year,
                    p.n,
                    p.median_price,
                    p.median_income,
                    p.median_ratio,
                    label(p.affordability)
                )
            }),
            (None, Some(zip)) => emit(json, &dashboard.zip_history(&zip, metric), |p: &SeriesPoint| {
                format!("{}  {:>12.2}", p.year, p.value)
            }),
            (None, None) => Ok(()),
        },
        Command::Bands => emit(json, &dashboard.affordability_bands(), |b: &BandCount| {
            format!("{}  {:<24} {}", b.year, b.label, b.count)
        }),
        Command::Index => emit(json, &dashboard.composite_index(), |p: &IndexPoint| {
            format!(
                "{}  price={:>7.1}  income={:>7.1}  ratio={:>5.2}",
                p.year, p.price_index, p.income_index, p.ratio
            )
        }),
        Command::Classify { price, income } => {
            let r = housebrowse::ratio(price, income);
            let band = housebrowse::classify(r);
            if json {
                println!("{}", serde_json::json!({ "ratio": r, "band": label(band) }));
            } else {
                println!("ratio={:.3}  {}", r, label(band));
            }
            Ok(())
        }
        Command::Export { from, to, level, metric, out } => {
            run_export(&dashboard, from, to, level, metric, out)
        }
    }
}

fn run_export(
    dashboard: &Dashboard,
    from: u32,
    to: u32,
    level: Level,
    metric: Metric,
    out: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let table = dashboard.table()?;
    let mut rows: Vec<RegionYear> = Vec::new();
    for year in from..=to {
        let yr = aggregate::aggregate(&table, level, year, metric, None);
        if yr.is_empty() {
            warn!("No rows found for {}", year);
        } else {
            info!("Aggregated {} regions for {}", yr.len(), year);
        }
        rows.extend(yr);
    }

    match out {
        Some(path) => export::write_aggregates_to_path(&rows, &path)?,
        None => export::write_aggregates(&rows, io::stdout().lock())?,
    }
    Ok(())
}

fn emit<T: Serialize>(
    json: bool,
    outcome: &Outcome<T>,
    line: impl Fn(&T) -> String,
) -> Result<(), Box<dyn Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    if let Some(reason) = &outcome.reason {
        eprintln!("{}", reason);
    }
    for row in &outcome.rows {
        println!("{}", line(row));
    }
    Ok(())
}

fn fmt_pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:+.1}%", x)).unwrap_or_else(|| "N/A".to_owned())
}

fn region_line(r: &RegionYear) -> String {
    let line = format!(
        "#{:<4} {:<8} {:<40} {:>12.2}  yoy={:>7}  top {:>3.0}%  {}",
        r.rank,
        r.key,
        r.metro_full,
        r.metric_value,
        fmt_pct(r.yoy_pct),
        100.0 - r.percentile,
        label(r.affordability)
    );
    match r.vs_scope_mean_pct {
        Some(d) => format!("{}  vs metro avg {}", line, fmt_pct(Some(d))),
        None => line,
    }
}

fn summary_line(s: &YearSummary) -> String {
    let extreme = |e: &Option<aggregate::Extreme>| {
        e.as_ref()
            .map(|e| format!("{} ({:.2})", e.name, e.value))
            .unwrap_or_else(|| "N/A".to_owned())
    };
    format!(
        "{} {}: {} metros, mean {:.2}, highest {}, lowest {}, avg YoY {}",
        s.year,
        s.metric.label(),
        s.count,
        s.mean_value.unwrap_or(f64::NAN),
        extreme(&s.highest),
        extreme(&s.lowest),
        fmt_pct(s.mean_yoy)
    )
}
