use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::Row;

use super::{db_error, require_str, Tool, ToolContext};

pub struct DescribeTableTool;

fn format_columns(table: &str, columns: &[Value]) -> String {
    let mut out = format!("--- TABLE {} ---\n", table);
    for c in columns {
        let mut line = format!(
            "{}: {}{}",
            c["name"].as_str().unwrap_or("?"),
            c["type"].as_str().unwrap_or("?"),
            if c["nullable"].as_bool().unwrap_or(true) { "" } else { " NOT NULL" },
        );
        if c["is_primary_key"].as_bool().unwrap_or(false) {
            line.push_str(" PRIMARY KEY");
        }
        if c["is_foreign_key"].as_bool().unwrap_or(false) {
            line.push_str(&format!(
                " REFERENCES {}({})",
                c["references"]["table"].as_str().unwrap_or("?"),
                c["references"]["column"].as_str().unwrap_or("?"),
            ));
        }
        out.push_str(&line);
        out.push('\n');
    }
    out
}

#[async_trait]
impl Tool for DescribeTableTool {
    fn name(&self) -> &'static str {
        "describe_table"
    }

    async fn run(&self, ctx: ToolContext<'_>, params: &Value) -> anyhow::Result<Value> {
        let table = match require_str(params, "table") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };
        // SQLite has a single schema; reject anything but the default so a
        // model-supplied "public" still resolves.
        if let Some(schema) = params.get("schema").and_then(|v| v.as_str()) {
            if !matches!(schema, "main" | "public") {
                return Ok(json!({ "error": format!("Unknown schema: {}", schema) }));
            }
        }

        let result: Result<Value, sqlx::Error> = async {
            // PRAGMA statements cannot bind parameters; verify the table
            // exists first so only a known identifier is interpolated.
            let known = sqlx::query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            )
            .bind(table)
            .fetch_optional(ctx.pool)
            .await?;
            if known.is_none() {
                return Ok(json!({ "error": format!("Table {} not found", table) }));
            }

            let mut columns: Vec<Value> = sqlx::query(&format!(
                "PRAGMA table_info({table})"
            ))
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(|r| {
                json!({
                    "name": r.get::<String, _>("name"),
                    "type": r.get::<String, _>("type"),
                    "nullable": r.get::<i64, _>("notnull") == 0,
                    "default": r.get::<Option<String>, _>("dflt_value"),
                    "is_primary_key": r.get::<i64, _>("pk") > 0,
                    "is_foreign_key": false,
                })
            })
            .collect();

            let fks = sqlx::query(&format!("PRAGMA foreign_key_list({table})"))
                .fetch_all(ctx.pool)
                .await?;
            for fk in &fks {
                let from: String = fk.get("from");
                let ref_table: String = fk.get("table");
                let ref_column: Option<String> = fk.get("to");
                if let Some(column) = columns.iter_mut().find(|c| c["name"] == from.as_str()) {
                    column["is_foreign_key"] = json!(true);
                    column["references"] = json!({
                        "table": ref_table,
                        "column": ref_column.unwrap_or_else(|| "id".into()),
                    });
                }
            }

            let formatted = format_columns(table, &columns);
            tracing::info!(table, "described table");
            Ok(json!({ "columns": columns, "formatted_columns": formatted }))
        }
        .await;

        match result {
            Ok(v) => Ok(v),
            Err(e) => Ok(db_error(e)),
        }
    }
}
