//! Chart data for the event count report.
//!
//! The count table is flattened into a DataFrame of
//! `(date, network_id, network_name, event_type, count)` rows, then split
//! into one chart per event type with a zero-filled series per network and
//! a total line.

use chrono::{Days, NaiveDate};
use itertools::Itertools;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::EventVizError;
use crate::models::{EventCountTable, NetworkSummary};

/// Name of the synthesized sum-of-all-networks series.
pub const TOTAL_SERIES: &str = "Total Events";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<u64>,
    pub is_total: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventChart {
    pub event_type: String,
    pub title: String,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub days_lookback: u32,
    /// Shared x axis, `YYYY-MM-DD`, oldest first.
    pub dates: Vec<String>,
    pub charts: Vec<EventChart>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}

/// The `days_lookback` calendar days ending with `today`.
pub fn date_axis(today: NaiveDate, days_lookback: u32) -> Vec<String> {
    let days = days_lookback.max(1);
    let start = today - Days::new(u64::from(days - 1));
    start
        .iter_days()
        .take(days as usize)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect()
}

fn network_label(id: &str, names: &HashMap<&str, &str>) -> String {
    names
        .get(id)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("Unknown Network ({})", id))
}

/// Flattens the count table into one row per `(network, day, type)` cell.
pub fn flatten_counts(
    table: &EventCountTable,
    names: &HashMap<&str, &str>,
) -> Result<DataFrame, EventVizError> {
    let mut dates = Vec::new();
    let mut network_ids = Vec::new();
    let mut network_names = Vec::new();
    let mut event_types = Vec::new();
    let mut counts: Vec<u64> = Vec::new();

    for (network_id, daily) in table {
        let label = network_label(network_id, names);
        for (date, by_type) in daily {
            for (event_type, count) in by_type {
                dates.push(date.clone());
                network_ids.push(network_id.clone());
                network_names.push(label.clone());
                event_types.push(event_type.clone());
                counts.push(*count);
            }
        }
    }

    let df = df!(
        "date" => dates,
        "network_id" => network_ids,
        "network_name" => network_names,
        "event_type" => event_types,
        "count" => counts
    )?;
    Ok(df)
}

fn column_strings(df: &DataFrame, name: &str) -> Result<Vec<String>, EventVizError> {
    Ok(df
        .column(name)?
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}

fn column_counts(df: &DataFrame, name: &str) -> Result<Vec<u64>, EventVizError> {
    let cast = df.column(name)?.cast(&DataType::UInt64)?;
    let values = cast.u64()?.into_iter().map(|v| v.unwrap_or(0)).collect();
    Ok(values)
}

/// Builds one chart per event type found in `table`.
///
/// Series are emitted for the given networks (by name) and then for any
/// network id in the table that the list does not know about. Series and
/// totals that are zero on every day of the axis are left out, as are charts
/// left without any series. Counts dated outside the axis are ignored.
pub fn build_report(
    table: &EventCountTable,
    networks: &[NetworkSummary],
    days_lookback: u32,
    today: NaiveDate,
) -> Result<Report, EventVizError> {
    let dates = date_axis(today, days_lookback);
    let names: HashMap<&str, &str> = networks
        .iter()
        .map(|n| (n.id.as_str(), n.name.as_str()))
        .collect();

    let order: Vec<(String, String)> = networks
        .iter()
        .sorted_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)))
        .map(|n| (n.id.clone(), n.name.clone()))
        .chain(
            table
                .keys()
                .filter(|id| !names.contains_key(id.as_str()))
                .map(|id| (id.clone(), network_label(id, &names))),
        )
        .collect();

    let frame = flatten_counts(table, &names)?;
    let event_types: Vec<String> = column_strings(&frame, "event_type")?
        .into_iter()
        .sorted()
        .dedup()
        .collect();

    let mut charts = Vec::new();
    for event_type in event_types {
        let subset = frame
            .clone()
            .lazy()
            .filter(col("event_type").eq(lit(event_type.as_str())))
            .select([col("network_id"), col("date"), col("count")])
            .collect()?;

        let ids = column_strings(&subset, "network_id")?;
        let days = column_strings(&subset, "date")?;
        let counts = column_counts(&subset, "count")?;
        let cells: HashMap<(&str, &str), u64> = ids
            .iter()
            .zip(days.iter())
            .zip(counts.iter())
            .map(|((id, day), count)| ((id.as_str(), day.as_str()), *count))
            .collect();

        let mut total = vec![0u64; dates.len()];
        let mut series = Vec::new();
        for (network_id, label) in &order {
            let data: Vec<u64> = dates
                .iter()
                .map(|d| {
                    cells
                        .get(&(network_id.as_str(), d.as_str()))
                        .copied()
                        .unwrap_or(0)
                })
                .collect();
            if data.iter().all(|&c| c == 0) {
                continue;
            }
            for (sum, count) in total.iter_mut().zip(&data) {
                *sum += count;
            }
            series.push(ChartSeries {
                name: label.clone(),
                data,
                is_total: false,
            });
        }

        if total.iter().any(|&c| c > 0) {
            series.push(ChartSeries {
                name: TOTAL_SERIES.to_string(),
                data: total,
                is_total: true,
            });
        }

        if !series.is_empty() {
            charts.push(EventChart {
                title: format!("Daily '{}' Events", event_type),
                event_type,
                series,
            });
        }
    }

    Ok(Report {
        days_lookback,
        dates,
        charts,
    })
}
