use async_trait::async_trait;
use serde_json::{json, Value};

use super::{db_error, require_str, Tool, ToolContext};

pub struct UpdateContactInfoTool;

/// Updatable column per optional parameter, with the label used in the
/// formatted confirmation.
const UPDATABLE: &[(&str, &str, &str)] = &[
    ("phone_number", "phone_number", "phone number"),
    ("address", "address", "address"),
    ("avatar", "avatar", "avatar"),
];

fn format_confirmation(updated: &[&str], employee_id: &str) -> String {
    let fields = match updated {
        [] => return "No fields were updated.".into(),
        [one] => one.to_string(),
        [a, b] => format!("{} and {}", a, b),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    };
    format!(
        "Successfully updated {} for employee ID: {}.\n\nThe changes have been saved to the database.",
        fields, employee_id
    )
}

#[async_trait]
impl Tool for UpdateContactInfoTool {
    fn name(&self) -> &'static str {
        "update_contact_info"
    }

    async fn run(&self, ctx: ToolContext<'_>, params: &Value) -> anyhow::Result<Value> {
        let employee_id = match require_str(params, "employee_id") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };

        let supplied: Vec<(&str, &str, &str)> = UPDATABLE
            .iter()
            .filter_map(|(param, column, label)| {
                params
                    .get(*param)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(|v| (*column, v, *label))
            })
            .collect();

        if supplied.is_empty() {
            return Ok(json!({
                "error": "No fields to update provided. Please provide at least one of: phone_number, address, avatar"
            }));
        }

        let result: Result<Value, sqlx::Error> = async {
            let exists = sqlx::query("SELECT id FROM employee WHERE id = ?1")
                .bind(employee_id)
                .fetch_optional(ctx.pool)
                .await?;
            if exists.is_none() {
                return Ok(json!({
                    "error": format!("Employee with ID {} not found", employee_id)
                }));
            }

            let assignments: Vec<String> = supplied
                .iter()
                .enumerate()
                .map(|(i, (column, _, _))| format!("{} = ?{}", column, i + 1))
                .collect();
            let sql = format!(
                "UPDATE employee SET {} WHERE id = ?{}",
                assignments.join(", "),
                supplied.len() + 1
            );
            let mut query = sqlx::query(&sql);
            for (_, value, _) in &supplied {
                query = query.bind(*value);
            }
            query.bind(employee_id).execute(ctx.pool).await?;

            let updated: Vec<&str> = supplied.iter().map(|(_, _, label)| *label).collect();
            tracing::info!(employee_id, fields = ?updated, "updated contact information");
            Ok(json!({
                "success": true,
                "updated_fields": updated,
                "formatted_response": format_confirmation(&updated, employee_id),
            }))
        }
        .await;

        match result {
            Ok(v) => Ok(v),
            Err(e) => Ok(db_error(e)),
        }
    }
}
