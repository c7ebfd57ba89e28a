use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{db_error, require_str, Tool, ToolContext};

pub struct EmployeeInfoTool;

/// Columns exposed for an employee. The password column never leaves the
/// database layer.
const EMPLOYEE_COLUMNS: &str = "id, full_name, email, phone_number, address, avatar, \
     position, birth_date, join_date, is_active, role, department_id, base_salary";

pub(crate) fn employee_json(row: &SqliteRow) -> Value {
    json!({
        "id": row.get::<String, _>("id"),
        "full_name": row.get::<String, _>("full_name"),
        "email": row.get::<Option<String>, _>("email"),
        "phone_number": row.get::<Option<String>, _>("phone_number"),
        "address": row.get::<Option<String>, _>("address"),
        "avatar": row.get::<Option<String>, _>("avatar"),
        "position": row.get::<Option<String>, _>("position"),
        "birth_date": row.get::<Option<String>, _>("birth_date"),
        "join_date": row.get::<Option<String>, _>("join_date"),
        "is_active": row.get::<i64, _>("is_active") != 0,
        "role": row.get::<Option<String>, _>("role"),
        "department_id": row.get::<Option<String>, _>("department_id"),
        "base_salary": row.get::<Option<f64>, _>("base_salary"),
    })
}

pub(crate) fn project_json(row: &SqliteRow) -> Value {
    json!({
        "id": row.get::<String, _>("id"),
        "name": row.get::<String, _>("name"),
        "description": row.get::<Option<String>, _>("description"),
        "status": row.get::<Option<String>, _>("status"),
        "start_date": row.get::<Option<String>, _>("start_date"),
        "end_date": row.get::<Option<String>, _>("end_date"),
    })
}

pub(crate) fn task_json(row: &SqliteRow) -> Value {
    json!({
        "id": row.get::<String, _>("id"),
        "title": row.get::<String, _>("title"),
        "description": row.get::<Option<String>, _>("description"),
        "priority": row.get::<Option<String>, _>("priority"),
        "status": row.get::<Option<String>, _>("status"),
        "due_date": row.get::<Option<String>, _>("due_date"),
        "completed_at": row.get::<Option<String>, _>("completed_at"),
        "created_at": row.get::<Option<String>, _>("created_at"),
        "updated_at": row.get::<Option<String>, _>("updated_at"),
    })
}

fn opt(v: &Value, fallback: &str) -> String {
    match v.as_str() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => fallback.to_string(),
    }
}

fn push_project_lines(lines: &mut Vec<String>, projects: &[Value]) {
    if projects.is_empty() {
        lines.push("No data.".into());
        return;
    }
    for p in projects {
        lines.push(format!("- ID: {}", opt(&p["id"], "?")));
        lines.push(format!("  Name: {}", opt(&p["name"], "?")));
        lines.push(format!("  Description: {}", opt(&p["description"], "No description")));
        lines.push(format!("  Start date: {}", opt(&p["start_date"], "Not set")));
        lines.push(format!("  End date: {}", opt(&p["end_date"], "Not set")));
        lines.push(format!("  Status: {}", opt(&p["status"], "?")));
        lines.push("  ---".into());
    }
}

fn push_task_lines(lines: &mut Vec<String>, tasks: &[Value]) {
    if tasks.is_empty() {
        lines.push("No data.".into());
        return;
    }
    for t in tasks {
        lines.push(format!("- ID: {}", opt(&t["id"], "?")));
        lines.push(format!("  Title: {}", opt(&t["title"], "?")));
        lines.push(format!("  Status: {}", opt(&t["status"], "-")));
        lines.push(format!("  Due date: {}", opt(&t["due_date"], "No deadline")));
        lines.push("  ---".into());
    }
}

fn format_employee_report(
    employee: Option<&Value>,
    department: Option<&Value>,
    projects: &[Value],
    managed_projects: &[Value],
    assigned_tasks: &[Value],
    assigned_by: &[Value],
    supervised: &[Value],
) -> String {
    let mut lines = Vec::new();

    lines.push("--- EMPLOYEE ---".into());
    match employee {
        Some(e) => {
            lines.push(format!("ID: {}", opt(&e["id"], "?")));
            lines.push(format!("Full name: {}", opt(&e["full_name"], "?")));
            lines.push(format!("Email: {}", opt(&e["email"], "-")));
            lines.push(format!("Phone number: {}", opt(&e["phone_number"], "-")));
            lines.push(format!("Address: {}", opt(&e["address"], "-")));
            lines.push(format!("Position: {}", opt(&e["position"], "-")));
            lines.push(format!("Birth date: {}", opt(&e["birth_date"], "-")));
            lines.push(format!("Join date: {}", opt(&e["join_date"], "-")));
            lines.push(format!(
                "Active: {}",
                if e["is_active"].as_bool().unwrap_or(false) { "Yes" } else { "No" }
            ));
            lines.push(format!("Role: {}", opt(&e["role"], "-")));
        }
        None => lines.push("No data.".into()),
    }

    lines.push("\n--- DEPARTMENT ---".into());
    match department {
        Some(d) => {
            lines.push(format!("ID: {}", opt(&d["id"], "?")));
            lines.push(format!("Name: {}", opt(&d["department_name"], "?")));
            lines.push(format!("Description: {}", opt(&d["description"], "No description")));
        }
        None => lines.push("No data.".into()),
    }

    lines.push("\n--- PROJECTS ---".into());
    push_project_lines(&mut lines, projects);

    lines.push("\n--- MANAGED PROJECTS ---".into());
    push_project_lines(&mut lines, managed_projects);

    lines.push("\n--- ASSIGNED TASKS ---".into());
    if assigned_tasks.is_empty() {
        lines.push("No data.".into());
    } else {
        let (open, done): (Vec<_>, Vec<_>) = assigned_tasks
            .iter()
            .partition(|t| t["status"].as_str() != Some("completed"));
        if !open.is_empty() {
            lines.push("Open tasks:".into());
            for t in open {
                lines.push(format!("- ID: {}", opt(&t["id"], "?")));
                lines.push(format!("  Title: {}", opt(&t["title"], "?")));
                lines.push(format!("  Description: {}", opt(&t["description"], "No description")));
                lines.push(format!("  Priority: {}", opt(&t["priority"], "-")));
                lines.push(format!("  Status: {}", opt(&t["status"], "-")));
                lines.push(format!("  Due date: {}", opt(&t["due_date"], "No deadline")));
                lines.push("  ---".into());
            }
        }
        if !done.is_empty() {
            lines.push("Completed tasks:".into());
            for t in done {
                lines.push(format!("- ID: {}", opt(&t["id"], "?")));
                lines.push(format!("  Title: {}", opt(&t["title"], "?")));
                lines.push(format!("  Completed at: {}", opt(&t["completed_at"], "-")));
                lines.push("  ---".into());
            }
        }
    }

    lines.push("\n--- TASKS ASSIGNED BY EMPLOYEE ---".into());
    push_task_lines(&mut lines, assigned_by);

    lines.push("\n--- SUPERVISED TASKS ---".into());
    push_task_lines(&mut lines, supervised);

    lines.join("\n")
}

#[async_trait]
impl Tool for EmployeeInfoTool {
    fn name(&self) -> &'static str {
        "get_employee_info"
    }

    async fn run(&self, ctx: ToolContext<'_>, params: &Value) -> anyhow::Result<Value> {
        let employee_id = match require_str(params, "employee_id") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };

        let result: Result<Value, sqlx::Error> = async {
            let employee = sqlx::query(&format!(
                "SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE id = ?1"
            ))
            .bind(employee_id)
            .fetch_optional(ctx.pool)
            .await?
            .map(|r| employee_json(&r));

            let department = match employee
                .as_ref()
                .and_then(|e| e["department_id"].as_str().map(str::to_string))
            {
                Some(dep_id) => sqlx::query(
                    "SELECT id, department_name, description, is_active FROM department WHERE id = ?1",
                )
                .bind(dep_id)
                .fetch_optional(ctx.pool)
                .await?
                .map(|r| {
                    json!({
                        "id": r.get::<String, _>("id"),
                        "department_name": r.get::<String, _>("department_name"),
                        "description": r.get::<Option<String>, _>("description"),
                        "is_active": r.get::<i64, _>("is_active") != 0,
                    })
                }),
                None => None,
            };

            let projects: Vec<Value> = sqlx::query(
                "SELECT p.id, p.name, p.description, p.status, p.start_date, p.end_date \
                 FROM project p \
                 JOIN project_employee pe ON p.id = pe.project_id \
                 WHERE pe.employee_id = ?1",
            )
            .bind(employee_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(project_json)
            .collect();

            let managed_projects: Vec<Value> = sqlx::query(
                "SELECT id, name, description, status, start_date, end_date \
                 FROM project WHERE manager_id = ?1",
            )
            .bind(employee_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(project_json)
            .collect();

            let assigned_tasks: Vec<Value> = sqlx::query(
                "SELECT t.id, t.title, t.description, t.priority, t.status, t.due_date, \
                        t.completed_at, t.created_at, t.updated_at \
                 FROM task t \
                 JOIN task_assignee ta ON t.id = ta.task_id \
                 WHERE ta.employee_id = ?1 \
                 ORDER BY CASE WHEN t.status <> 'completed' THEN 1 ELSE 2 END, \
                          t.due_date IS NULL, t.due_date ASC",
            )
            .bind(employee_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(task_json)
            .collect();

            let assigned_by: Vec<Value> = sqlx::query(
                "SELECT id, title, description, priority, status, due_date, \
                        completed_at, created_at, updated_at \
                 FROM task WHERE assigner_id = ?1 ORDER BY created_at DESC",
            )
            .bind(employee_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(task_json)
            .collect();

            let supervised: Vec<Value> = sqlx::query(
                "SELECT id, title, description, priority, status, due_date, \
                        completed_at, created_at, updated_at \
                 FROM task WHERE supervisor_id = ?1 ORDER BY created_at DESC",
            )
            .bind(employee_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(task_json)
            .collect();

            let formatted = format_employee_report(
                employee.as_ref(),
                department.as_ref(),
                &projects,
                &managed_projects,
                &assigned_tasks,
                &assigned_by,
                &supervised,
            );
            Ok(json!({ "employee_info": formatted }))
        }
        .await;

        match result {
            Ok(v) => {
                tracing::info!(employee_id, "retrieved employee info");
                Ok(v)
            }
            Err(e) => Ok(db_error(e)),
        }
    }
}
