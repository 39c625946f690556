use crate::db::Connector;
use crate::error::Result;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use snowflake_connector_rs::SnowflakeRow;
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

impl QueryResult {
    pub fn new(columns: Vec<ColumnDef>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            execution_time_ms: 0,
        }
    }

    /// Index of the named column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Run `sql` verbatim on a fresh connection.
pub async fn execute_query(connector: &dyn Connector, sql: &str) -> Result<QueryResult> {
    let start = Instant::now();
    let mut cursor = connector.cursor(None).await?;
    let mut result = cursor.execute(sql).await?;
    if result.execution_time_ms == 0 {
        result.execution_time_ms = start.elapsed().as_millis();
    }
    Ok(result)
}

/// Find the first ```` ```sql ```` block in a reply and return the text between
/// the fences, exactly as written.
pub fn extract_sql(reply: &str) -> Option<&str> {
    const FENCE: &str = "```";
    let mut from = 0;

    while let Some(pos) = reply[from..].find(FENCE) {
        let tag_start = from + pos + FENCE.len();
        let line_end = tag_start + reply[tag_start..].find('\n')?;
        let tag = reply[tag_start..line_end].trim();

        if tag.eq_ignore_ascii_case("sql") {
            let body_start = line_end + 1;
            let body_len = reply[body_start..].find("\n```")?;
            return Some(&reply[body_start..body_start + body_len]);
        }
        from = tag_start;
    }
    None
}

pub(crate) fn rows_to_result(rows: Vec<SnowflakeRow>, execution_time_ms: u128) -> QueryResult {
    // Snowflake only describes columns on rows, so an empty result has none
    let columns: Vec<ColumnDef> = rows.first().map_or_else(Vec::new, |first| {
        first
            .column_types()
            .into_iter()
            .map(|col| ColumnDef {
                name: col.name().to_string(),
                data_type: col.column_type().snowflake_type().to_string(),
            })
            .collect()
    });

    let mut result_rows = Vec::with_capacity(rows.len());
    for row in &rows {
        let values = columns
            .iter()
            .map(|col| {
                let raw = row.get::<Option<String>>(&col.name).ok().flatten();
                snowflake_value_to_json(raw, &col.data_type)
            })
            .collect();
        result_rows.push(values);
    }

    let mut result = QueryResult::new(columns, result_rows);
    result.execution_time_ms = execution_time_ms;
    result
}

/// Convert a raw Snowflake cell into JSON based on its column type.
pub fn snowflake_value_to_json(raw: Option<String>, snowflake_type: &str) -> serde_json::Value {
    let Some(raw) = raw else {
        return serde_json::Value::Null;
    };

    let converted = match snowflake_type.to_lowercase().as_str() {
        "fixed" => parse_fixed(&raw),
        "real" => parse_float(&raw),
        "boolean" => match raw.to_lowercase().as_str() {
            "true" | "1" => Some(serde_json::Value::Bool(true)),
            "false" | "0" => Some(serde_json::Value::Bool(false)),
            _ => None,
        },
        "date" => raw
            .parse::<i64>()
            .ok()
            .and_then(|days| {
                NaiveDate::from_ymd_opt(1970, 1, 1)?
                    .checked_add_signed(chrono::Duration::days(days))
            })
            .map(|d| serde_json::Value::String(d.format("%Y-%m-%d").to_string())),
        "time" => split_epoch(&raw)
            .and_then(|(secs, nanos)| {
                NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(secs).ok()?, nanos)
            })
            .map(|t| serde_json::Value::String(t.format("%H:%M:%S%.3f").to_string())),
        "timestamp_ntz" | "timestamp_ltz" => split_epoch(&raw)
            .and_then(|(secs, nanos)| DateTime::from_timestamp(secs, nanos))
            .map(|dt| {
                serde_json::Value::String(dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            }),
        "timestamp_tz" => parse_timestamp_tz(&raw).map(serde_json::Value::String),
        _ => None,
    };

    converted.unwrap_or(serde_json::Value::String(raw))
}

/// Render a cell for prompt text; null becomes an empty string.
pub fn value_as_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Integers that fit 64 bits and decimals an f64 holds exactly become numbers;
/// anything wider stays text so no digits are lost.
fn parse_fixed(raw: &str) -> Option<serde_json::Value> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(serde_json::Value::Number(v.into()));
    }
    if let Ok(v) = raw.parse::<u64>() {
        return Some(serde_json::Value::Number(v.into()));
    }
    if raw.contains('.') && significant_digits(raw) <= F64_EXACT_DIGITS {
        return parse_float(raw);
    }
    None
}

const F64_EXACT_DIGITS: usize = 15;

fn significant_digits(raw: &str) -> usize {
    raw.chars()
        .filter(char::is_ascii_digit)
        .skip_while(|c| *c == '0')
        .count()
}

fn parse_float(raw: &str) -> Option<serde_json::Value> {
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
}

/// `"1700000000.123456789"` -> (seconds, nanoseconds)
fn split_epoch(raw: &str) -> Option<(i64, u32)> {
    let (secs, frac) = raw.split_once('.').unwrap_or((raw, ""));
    let secs = secs.parse::<i64>().ok()?;
    let nanos = if frac.is_empty() {
        0
    } else {
        format!("{:0<9}", &frac[..frac.len().min(9)]).parse::<u32>().ok()?
    };
    Some((secs, nanos))
}

/// `"<epoch> <offset minutes + 1440>"`
fn parse_timestamp_tz(raw: &str) -> Option<String> {
    let (epoch, offset) = raw.split_once(' ')?;
    let (secs, nanos) = split_epoch(epoch)?;
    let offset_minutes = offset.trim().parse::<i32>().ok()? - 1440;
    let offset = FixedOffset::east_opt(offset_minutes * 60)?;
    let dt = DateTime::from_timestamp(secs, nanos)?.with_timezone(&offset);
    Some(dt.format("%Y-%m-%d %H:%M:%S%.3f %:z").to_string())
}
