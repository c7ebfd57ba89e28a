use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::Row;

use super::{db_error, require_str, Tool, ToolContext};

pub struct EmployeeProjectsTool;

fn project_row(row: &sqlx::sqlite::SqliteRow, with_manager: bool) -> Value {
    let mut v = json!({
        "id": row.get::<String, _>("id"),
        "name": row.get::<String, _>("name"),
        "description": row.get::<Option<String>, _>("description"),
        "status": row.get::<Option<String>, _>("status"),
        "start_date": row.get::<Option<String>, _>("start_date"),
        "end_date": row.get::<Option<String>, _>("end_date"),
        "department_name": row.get::<Option<String>, _>("department_name"),
    });
    if with_manager {
        v["manager_name"] = json!(row.get::<Option<String>, _>("manager_name"));
    }
    v
}

async fn attach_team_members(
    pool: &sqlx::Pool<sqlx::Sqlite>,
    projects: &mut [Value],
) -> Result<(), sqlx::Error> {
    for project in projects.iter_mut() {
        let Some(project_id) = project["id"].as_str().map(str::to_string) else {
            continue;
        };
        let members: Vec<Value> = sqlx::query(
            "SELECT e.id, e.full_name, e.email, e.position \
             FROM employee e \
             JOIN project_employee pe ON e.id = pe.employee_id \
             WHERE pe.project_id = ?1",
        )
        .bind(project_id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|r| {
            json!({
                "id": r.get::<String, _>("id"),
                "full_name": r.get::<String, _>("full_name"),
                "email": r.get::<Option<String>, _>("email"),
                "position": r.get::<Option<String>, _>("position"),
            })
        })
        .collect();
        project["team_members"] = json!(members);
    }
    Ok(())
}

fn opt(v: &Value, fallback: &str) -> String {
    match v.as_str() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => fallback.to_string(),
    }
}

fn format_projects(managed: &[Value], participating: &[Value]) -> String {
    let mut out = String::from("--- EMPLOYEE PROJECTS ---\n");

    out.push_str("\n### MANAGED PROJECTS ###\n");
    if managed.is_empty() {
        out.push_str("No managed projects.\n");
    } else {
        for p in managed {
            out.push_str(&format!("- ID: {}\n", opt(&p["id"], "?")));
            out.push_str(&format!("  Name: {}\n", opt(&p["name"], "?")));
            out.push_str(&format!("  Department: {}\n", opt(&p["department_name"], "Unknown")));
            out.push_str(&format!("  Description: {}\n", opt(&p["description"], "No description")));
            out.push_str(&format!("  Start date: {}\n", opt(&p["start_date"], "Not set")));
            out.push_str(&format!("  End date: {}\n", opt(&p["end_date"], "Not set")));
            out.push_str(&format!("  Status: {}\n", opt(&p["status"], "?")));
            if let Some(members) = p["team_members"].as_array() {
                if !members.is_empty() {
                    out.push_str("  Members:\n");
                    for m in members {
                        out.push_str(&format!(
                            "    - {} ({})\n",
                            opt(&m["full_name"], "?"),
                            opt(&m["position"], "no position")
                        ));
                    }
                }
            }
            out.push_str("  ---\n");
        }
    }

    out.push_str("\n### PARTICIPATING PROJECTS ###\n");
    if participating.is_empty() {
        out.push_str("No participating projects.\n");
    } else {
        for p in participating {
            out.push_str(&format!("- ID: {}\n", opt(&p["id"], "?")));
            out.push_str(&format!("  Name: {}\n", opt(&p["name"], "?")));
            out.push_str(&format!("  Department: {}\n", opt(&p["department_name"], "Unknown")));
            out.push_str(&format!("  Manager: {}\n", opt(&p["manager_name"], "Unknown")));
            out.push_str(&format!("  Description: {}\n", opt(&p["description"], "No description")));
            out.push_str(&format!("  Start date: {}\n", opt(&p["start_date"], "Not set")));
            out.push_str(&format!("  End date: {}\n", opt(&p["end_date"], "Not set")));
            out.push_str(&format!("  Status: {}\n", opt(&p["status"], "?")));
            out.push_str("  ---\n");
        }
    }
    out
}

#[async_trait]
impl Tool for EmployeeProjectsTool {
    fn name(&self) -> &'static str {
        "get_employee_projects"
    }

    async fn run(&self, ctx: ToolContext<'_>, params: &Value) -> anyhow::Result<Value> {
        let employee_id = match require_str(params, "employee_id") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };

        let result: Result<Value, sqlx::Error> = async {
            let mut projects: Vec<Value> = sqlx::query(
                "SELECT p.id, p.name, p.description, p.status, p.start_date, p.end_date, \
                        d.department_name, e.full_name AS manager_name \
                 FROM project p \
                 JOIN project_employee pe ON p.id = pe.project_id \
                 LEFT JOIN department d ON p.department_id = d.id \
                 LEFT JOIN employee e ON p.manager_id = e.id \
                 WHERE pe.employee_id = ?1 \
                 ORDER BY p.status, p.start_date DESC",
            )
            .bind(employee_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(|r| project_row(r, true))
            .collect();

            let mut managed: Vec<Value> = sqlx::query(
                "SELECT p.id, p.name, p.description, p.status, p.start_date, p.end_date, \
                        d.department_name \
                 FROM project p \
                 LEFT JOIN department d ON p.department_id = d.id \
                 WHERE p.manager_id = ?1 \
                 ORDER BY p.status, p.start_date DESC",
            )
            .bind(employee_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(|r| project_row(r, false))
            .collect();

            attach_team_members(ctx.pool, &mut projects).await?;
            attach_team_members(ctx.pool, &mut managed).await?;

            let managed_ids: Vec<&str> =
                managed.iter().filter_map(|p| p["id"].as_str()).collect();
            let participating: Vec<Value> = projects
                .iter()
                .filter(|p| {
                    p["id"].as_str().map(|id| !managed_ids.contains(&id)).unwrap_or(true)
                })
                .cloned()
                .collect();

            let formatted = format_projects(&managed, &participating);
            tracing::info!(
                employee_id,
                projects = projects.len(),
                managed = managed.len(),
                "retrieved employee projects"
            );
            Ok(json!({
                "projects": projects,
                "managed_projects": managed,
                "formatted_response": formatted,
            }))
        }
        .await;

        match result {
            Ok(v) => Ok(v),
            Err(e) => Ok(db_error(e)),
        }
    }
}
