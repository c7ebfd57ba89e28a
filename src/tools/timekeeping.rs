use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde_json::{json, Value};
use sqlx::Row;

use super::{db_error, require_str, Tool, ToolContext};

pub struct TimekeepingTool;

const BASE_QUERY: &str = "SELECT t.id, t.date, t.check_in_time, t.check_out_time, \
     t.is_late, t.is_early_leave, t.note, s.shift_name, s.start_time, s.end_time \
     FROM timekeeping t \
     LEFT JOIN shift s ON t.shift_id = s.id \
     WHERE t.employee_id = ?1";

fn month_filter(n: u32) -> String {
    format!("{:02}", n)
}

fn format_records(records: &[Value], month: Option<u32>, year: Option<i32>) -> String {
    let mut out = String::from("--- TIMEKEEPING ---\n");
    if records.is_empty() {
        out.push_str("No timekeeping data.\n");
        return out;
    }
    let period = match (month, year) {
        (Some(m), Some(y)) => format!("month {} of {}", m, y),
        (Some(m), None) => format!("month {}", m),
        (None, Some(y)) => format!("year {}", y),
        (None, None) => unreachable!("filters defaulted before formatting"),
    };
    out.push_str(&format!("Records for {}:\n", period));
    for r in records {
        let str_or = |key: &str, fallback: &str| {
            r[key].as_str().map(str::to_string).unwrap_or_else(|| fallback.into())
        };
        out.push_str(&format!("- Date: {}\n", str_or("date", "?")));
        out.push_str(&format!("  Shift: {}\n", str_or("shift_name", "Unknown")));
        out.push_str(&format!("  Check-in: {}\n", str_or("check_in_time", "Not recorded")));
        out.push_str(&format!("  Check-out: {}\n", str_or("check_out_time", "Not recorded")));
        out.push_str(&format!(
            "  Late: {}\n",
            if r["is_late"].as_bool().unwrap_or(false) { "Yes" } else { "No" }
        ));
        out.push_str(&format!(
            "  Early leave: {}\n",
            if r["is_early_leave"].as_bool().unwrap_or(false) { "Yes" } else { "No" }
        ));
        if let Some(note) = r["note"].as_str() {
            out.push_str(&format!("  Note: {}\n", note));
        }
        out.push_str("  ---\n");
    }
    out
}

#[async_trait]
impl Tool for TimekeepingTool {
    fn name(&self) -> &'static str {
        "get_employee_timekeeping"
    }

    async fn run(&self, ctx: ToolContext<'_>, params: &Value) -> anyhow::Result<Value> {
        let employee_id = match require_str(params, "employee_id") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };
        let mut month = params.get("month").and_then(|v| v.as_u64()).map(|m| m as u32);
        let mut year = params.get("year").and_then(|v| v.as_i64()).map(|y| y as i32);
        // Default to the current month when no filter is given.
        if month.is_none() && year.is_none() {
            let now = Utc::now();
            month = Some(now.month());
            year = Some(now.year());
        }

        let mut query = String::from(BASE_QUERY);
        if month.is_some() {
            query.push_str(" AND strftime('%m', t.date) = ?2");
        }
        if year.is_some() {
            // Positional index depends on whether month is also bound.
            query.push_str(if month.is_some() {
                " AND strftime('%Y', t.date) = ?3"
            } else {
                " AND strftime('%Y', t.date) = ?2"
            });
        }
        query.push_str(" ORDER BY t.date DESC");

        let mut q = sqlx::query(&query).bind(employee_id);
        if let Some(m) = month {
            q = q.bind(month_filter(m));
        }
        if let Some(y) = year {
            q = q.bind(y.to_string());
        }

        match q.fetch_all(ctx.pool).await {
            Ok(rows) => {
                let records: Vec<Value> = rows
                    .iter()
                    .map(|r| {
                        json!({
                            "id": r.get::<String, _>("id"),
                            "date": r.get::<String, _>("date"),
                            "check_in_time": r.get::<Option<String>, _>("check_in_time"),
                            "check_out_time": r.get::<Option<String>, _>("check_out_time"),
                            "is_late": r.get::<i64, _>("is_late") != 0,
                            "is_early_leave": r.get::<i64, _>("is_early_leave") != 0,
                            "note": r.get::<Option<String>, _>("note"),
                            "shift_name": r.get::<Option<String>, _>("shift_name"),
                            "start_time": r.get::<Option<String>, _>("start_time"),
                            "end_time": r.get::<Option<String>, _>("end_time"),
                        })
                    })
                    .collect();
                tracing::info!(employee_id, count = records.len(), "retrieved timekeeping records");
                let formatted = format_records(&records, month, year);
                Ok(json!({
                    "timekeeping_records": records,
                    "formatted_response": formatted,
                }))
            }
            Err(e) => Ok(db_error(e)),
        }
    }
}
