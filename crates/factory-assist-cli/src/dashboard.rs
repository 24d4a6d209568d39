//! Lifecycle dashboard figures.
//!
//! Summarises the production-log rows returned by `POST /api/upload_lifecycle`:
//! data integrity, task totals, station ranking, part-type distribution and
//! the points of the workshop map. Values follow the loose numeric rules of
//! the upload format: blanks and unparsable cells count as zero.

use std::collections::HashSet;

use serde_json::Value;

use crate::types::LifecycleRecord;

/// Column holding the unique part number.
pub const COL_UNIQUE_ID: &str = "唯一编号 (Unique ID)";
/// Column holding the part type.
pub const COL_TYPE: &str = "零件类型 (Type)";
/// Column holding the frame code.
pub const COL_FRAME: &str = "料框号 (Frame Code)";
/// Column holding the task number.
pub const COL_TASK: &str = "任务号 (Task No)";
/// Column holding the latest station.
pub const COL_STATION: &str = "最新工位 (Station)";
/// Column holding the X coordinate.
pub const COL_X: &str = "坐标 X";
/// Column holding the Y coordinate.
pub const COL_Y: &str = "坐标 Y";
/// Column holding the total time in minutes.
pub const COL_TOTAL_MINUTES: &str = "总耗时(分钟)";
/// Column holding the start time.
pub const COL_START: &str = "开始时间";
/// Column holding the end time.
pub const COL_END: &str = "结束时间";

/// Label for rows without a station.
pub const UNKNOWN_STATION: &str = "未知";
/// Label for rows without a part type.
pub const OTHER_TYPE: &str = "其他";

/// Number of stations kept in the ranking.
pub const STATION_RANKING_LIMIT: usize = 10;
/// Map weight used when a row has no usable total time.
pub const DEFAULT_MAP_WEIGHT: f64 = 10.0;

/// One point on the workshop map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapPoint {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Bubble weight: total minutes, or [`DEFAULT_MAP_WEIGHT`].
    pub weight: f64,
    /// Unique part number.
    pub name: Option<String>,
    /// Latest station.
    pub station: Option<String>,
}

/// Figures shown on the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSummary {
    /// Share of non-empty cells, in percent.
    pub integrity: f64,
    /// Number of rows.
    pub total_tasks: usize,
    /// Mean of the total-time column.
    pub average_minutes: f64,
    /// Number of distinct station values.
    pub station_count: usize,
    /// Busiest stations first.
    pub station_ranking: Vec<(String, usize)>,
    /// Rows per part type, in first-seen order.
    pub type_distribution: Vec<(String, usize)>,
    /// One point per row.
    pub map_points: Vec<MapPoint>,
}

impl DashboardSummary {
    /// Compute every figure for `rows`.
    #[must_use]
    pub fn from_rows(rows: &[LifecycleRecord]) -> Self {
        Self {
            integrity: integrity(rows),
            total_tasks: rows.len(),
            average_minutes: average_minutes(rows),
            station_count: station_count(rows),
            station_ranking: station_ranking(rows),
            type_distribution: count_by(rows, COL_TYPE, OTHER_TYPE),
            map_points: rows.iter().map(map_point).collect(),
        }
    }
}

/// Percentage of filled cells, where `null` and `""` are empty and `0` is filled.
#[must_use]
pub fn integrity(rows: &[LifecycleRecord]) -> f64 {
    let (total, filled) = rows
        .iter()
        .flat_map(|row| row.values())
        .fold((0_usize, 0_usize), |(total, filled), value| {
            let empty = matches!(value, Value::Null) || value.as_str() == Some("");
            (total + 1, filled + usize::from(!empty))
        });
    if total == 0 {
        0.0
    } else {
        as_f64(filled) / as_f64(total) * 100.0
    }
}

fn average_minutes(rows: &[LifecycleRecord]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let sum: f64 = rows
        .iter()
        .map(|row| number(row.get(COL_TOTAL_MINUTES)).unwrap_or(0.0))
        .sum();
    sum / as_f64(rows.len())
}

fn station_count(rows: &[LifecycleRecord]) -> usize {
    rows.iter()
        .map(|row| row.get(COL_STATION).unwrap_or(&Value::Null).to_string())
        .collect::<HashSet<_>>()
        .len()
}

fn station_ranking(rows: &[LifecycleRecord]) -> Vec<(String, usize)> {
    let mut ranking = count_by(rows, COL_STATION, UNKNOWN_STATION);
    // Stable: ties keep first-seen order.
    ranking.sort_by(|a, b| b.1.cmp(&a.1));
    ranking.truncate(STATION_RANKING_LIMIT);
    ranking
}

/// Count rows per value of `column`, substituting `fallback` for blank cells.
fn count_by(rows: &[LifecycleRecord], column: &str, fallback: &str) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for row in rows {
        let key = label(row.get(column)).unwrap_or_else(|| fallback.to_string());
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => counts.push((key, 1)),
        }
    }
    counts
}

fn map_point(row: &LifecycleRecord) -> MapPoint {
    MapPoint {
        x: number(row.get(COL_X)).unwrap_or(0.0),
        y: number(row.get(COL_Y)).unwrap_or(0.0),
        weight: number(row.get(COL_TOTAL_MINUTES))
            .filter(|w| *w != 0.0)
            .unwrap_or(DEFAULT_MAP_WEIGHT),
        name: label(row.get(COL_UNIQUE_ID)),
        station: label(row.get(COL_STATION)),
    }
}

/// Rows whose JSON rendering contains `term`, ignoring case. An empty term keeps all rows.
#[must_use]
pub fn filter_rows<'a>(rows: &'a [LifecycleRecord], term: &str) -> Vec<&'a LifecycleRecord> {
    let needle = term.to_lowercase();
    rows.iter()
        .filter(|row| {
            needle.is_empty()
                || serde_json::to_string(row)
                    .is_ok_and(|json| json.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Columns of the detail table, in display order.
pub const TABLE_COLUMNS: [&str; 10] = [
    COL_UNIQUE_ID,
    COL_TYPE,
    COL_FRAME,
    COL_TASK,
    COL_STATION,
    COL_X,
    COL_Y,
    COL_TOTAL_MINUTES,
    COL_START,
    COL_END,
];

/// Cell text for the detail table. Timestamps lose their fractional seconds.
#[must_use]
pub fn cell_text(row: &LifecycleRecord, column: &str) -> String {
    let text = match row.get(column) {
        None | Some(Value::Null) => return "-".to_string(),
        Some(Value::String(s)) if s.is_empty() => return "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    if column == COL_START || column == COL_END {
        text.split('.').next().unwrap_or_default().to_string()
    } else {
        text
    }
}

/// Numeric reading of a cell: numbers as-is, numeric strings parsed, blanks as zero.
///
/// Returns `None` for values with no numeric meaning.
fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Text of a cell, or `None` when the cell is blank (missing, null, empty, zero or false).
fn label(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(n: usize) -> f64 {
    n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> Vec<LifecycleRecord> {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> Vec<LifecycleRecord> {
        rows(json!([
            {"唯一编号 (Unique ID)": "P-1", "零件类型 (Type)": "Bracket", "最新工位 (Station)": "Weld-2",
             "坐标 X": 3, "坐标 Y": "4.5", "总耗时(分钟)": 30},
            {"唯一编号 (Unique ID)": "P-2", "零件类型 (Type)": "", "最新工位 (Station)": "Weld-2",
             "坐标 X": null, "坐标 Y": 1, "总耗时(分钟)": "n/a"},
            {"唯一编号 (Unique ID)": "P-3", "零件类型 (Type)": "Bracket", "最新工位 (Station)": null,
             "坐标 X": 0, "坐标 Y": 0, "总耗时(分钟)": 0}
        ]))
    }

    #[test]
    fn integrity_counts_zero_as_filled() {
        // 18 cells: two nulls and one empty string are blank.
        let value = integrity(&sample());
        assert_eq!(format!("{value:.1}"), "83.3");
        assert!(integrity(&[]).abs() < f64::EPSILON);
    }

    #[test]
    fn summary_figures() {
        let summary = DashboardSummary::from_rows(&sample());
        assert_eq!(summary.total_tasks, 3);
        assert_eq!(format!("{:.1}", summary.average_minutes), "10.0");
        // "Weld-2" and null.
        assert_eq!(summary.station_count, 2);
        assert_eq!(
            summary.station_ranking,
            vec![("Weld-2".to_string(), 2), ("未知".to_string(), 1)]
        );
        assert_eq!(
            summary.type_distribution,
            vec![("Bracket".to_string(), 2), ("其他".to_string(), 1)]
        );
    }

    #[test]
    fn map_points_fall_back_to_defaults() {
        let summary = DashboardSummary::from_rows(&sample());
        let first = &summary.map_points[0];
        assert!((first.x - 3.0).abs() < f64::EPSILON);
        assert!((first.y - 4.5).abs() < f64::EPSILON);
        assert!((first.weight - 30.0).abs() < f64::EPSILON);
        assert_eq!(first.name.as_deref(), Some("P-1"));

        // Unparsable and zero totals both use the default weight.
        assert!((summary.map_points[1].weight - DEFAULT_MAP_WEIGHT).abs() < f64::EPSILON);
        assert!((summary.map_points[2].weight - DEFAULT_MAP_WEIGHT).abs() < f64::EPSILON);
        assert!(summary.map_points[1].x.abs() < f64::EPSILON);
    }

    #[test]
    fn ranking_keeps_top_ten() {
        let data: Vec<Value> = (0..12)
            .flat_map(|i| {
                let station = format!("S{i}");
                (0..=i).map(move |_| json!({"最新工位 (Station)": station.clone()}))
            })
            .collect();
        let ranking = station_ranking(&rows(Value::Array(data)));
        assert_eq!(ranking.len(), STATION_RANKING_LIMIT);
        assert_eq!(ranking[0], ("S11".to_string(), 12));
        assert_eq!(ranking[9], ("S2".to_string(), 3));
    }

    #[test]
    fn search_is_case_insensitive_over_all_cells() {
        let data = sample();
        assert_eq!(filter_rows(&data, "weld").len(), 2);
        assert_eq!(filter_rows(&data, "p-3").len(), 1);
        assert_eq!(filter_rows(&data, "").len(), 3);
        assert!(filter_rows(&data, "paint").is_empty());
    }

    #[test]
    fn empty_rows_yield_zeroes() {
        let summary = DashboardSummary::from_rows(&[]);
        assert_eq!(summary.total_tasks, 0);
        assert!(summary.average_minutes.abs() < f64::EPSILON);
        assert!(summary.station_ranking.is_empty());
    }

    #[test]
    fn timestamps_drop_fractional_seconds() {
        let data = rows(json!([{"开始时间": "2026-03-01 08:00:00.123", "坐标 X": 5, "坐标 Y": 0}]));
        assert_eq!(cell_text(&data[0], COL_START), "2026-03-01 08:00:00");
        assert_eq!(cell_text(&data[0], COL_X), "5");
        assert_eq!(cell_text(&data[0], COL_Y), "0");
        assert_eq!(cell_text(&data[0], COL_END), "-");
    }
}
