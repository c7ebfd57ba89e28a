use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::Row;

use super::{db_error, require_str, Tool, ToolContext};

pub struct TaskDetailsTool;

fn opt(v: &Value, fallback: &str) -> String {
    match v.as_str() {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => fallback.to_string(),
    }
}

fn format_task(task: &Value, subtasks: &[Value], comments: &[Value]) -> String {
    let mut out = String::from("--- TASK DETAILS ---\n");
    out.push_str(&format!("ID: {}\n", opt(&task["id"], "?")));
    out.push_str(&format!("Title: {}\n", opt(&task["title"], "?")));
    out.push_str(&format!("Description: {}\n", opt(&task["description"], "No description")));
    out.push_str(&format!("Priority: {}\n", opt(&task["priority"], "-")));
    out.push_str(&format!("Status: {}\n", opt(&task["status"], "-")));
    out.push_str(&format!("Project: {}\n", opt(&task["project_name"], "No project")));
    out.push_str(&format!("Assigned by: {}\n", opt(&task["assigner_name"], "Unknown")));
    out.push_str(&format!("Supervisor: {}\n", opt(&task["supervisor_name"], "None")));
    out.push_str(&format!("Due date: {}\n", opt(&task["due_date"], "No deadline")));
    if let Some(done) = task["completed_at"].as_str() {
        out.push_str(&format!("Completed at: {}\n", done));
    }
    out.push_str(&format!("Created at: {}\n", opt(&task["created_at"], "Unknown")));

    out.push_str("\n### SUBTASKS ###\n");
    if subtasks.is_empty() {
        out.push_str("No subtasks.\n");
    } else {
        let (open, done): (Vec<_>, Vec<_>) =
            subtasks.iter().partition(|s| !s["completed"].as_bool().unwrap_or(false));
        if !open.is_empty() {
            out.push_str("Open subtasks:\n");
            for s in open {
                out.push_str(&format!("- ID: {}\n", opt(&s["id"], "?")));
                out.push_str(&format!("  Content: {}\n", opt(&s["content"], "?")));
                out.push_str("  ---\n");
            }
        }
        if !done.is_empty() {
            out.push_str("Completed subtasks:\n");
            for s in done {
                out.push_str(&format!("- ID: {}\n", opt(&s["id"], "?")));
                out.push_str(&format!("  Content: {}\n", opt(&s["content"], "?")));
                out.push_str("  ---\n");
            }
        }
    }

    out.push_str("\n### COMMENTS ###\n");
    if comments.is_empty() {
        out.push_str("No comments.\n");
    } else {
        for c in comments {
            out.push_str(&format!(
                "- {} ({}):\n  {}\n  ---\n",
                opt(&c["author_name"], "?"),
                opt(&c["created_at"], "?"),
                opt(&c["content"], "")
            ));
        }
    }
    out
}

#[async_trait]
impl Tool for TaskDetailsTool {
    fn name(&self) -> &'static str {
        "get_task_details"
    }

    async fn run(&self, ctx: ToolContext<'_>, params: &Value) -> anyhow::Result<Value> {
        let task_id = match require_str(params, "task_id") {
            Ok(v) => v,
            Err(e) => return Ok(e),
        };

        let result: Result<Value, sqlx::Error> = async {
            let task = sqlx::query(
                "SELECT t.id, t.title, t.description, t.priority, t.status, t.due_date, \
                        t.completed_at, t.created_at, t.updated_at, \
                        p.name AS project_name, \
                        a.full_name AS assigner_name, \
                        s.full_name AS supervisor_name \
                 FROM task t \
                 LEFT JOIN project p ON t.project_id = p.id \
                 LEFT JOIN employee a ON t.assigner_id = a.id \
                 LEFT JOIN employee s ON t.supervisor_id = s.id \
                 WHERE t.id = ?1",
            )
            .bind(task_id)
            .fetch_optional(ctx.pool)
            .await?;

            let Some(task) = task else {
                return Ok(json!({ "error": "Task not found" }));
            };
            let task = json!({
                "id": task.get::<String, _>("id"),
                "title": task.get::<String, _>("title"),
                "description": task.get::<Option<String>, _>("description"),
                "priority": task.get::<Option<String>, _>("priority"),
                "status": task.get::<Option<String>, _>("status"),
                "due_date": task.get::<Option<String>, _>("due_date"),
                "completed_at": task.get::<Option<String>, _>("completed_at"),
                "created_at": task.get::<Option<String>, _>("created_at"),
                "updated_at": task.get::<Option<String>, _>("updated_at"),
                "project_name": task.get::<Option<String>, _>("project_name"),
                "assigner_name": task.get::<Option<String>, _>("assigner_name"),
                "supervisor_name": task.get::<Option<String>, _>("supervisor_name"),
            });

            let subtasks: Vec<Value> = sqlx::query(
                "SELECT id, content, completed, created_at, updated_at \
                 FROM sub_task WHERE task_id = ?1 ORDER BY completed",
            )
            .bind(task_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(|r| {
                json!({
                    "id": r.get::<String, _>("id"),
                    "content": r.get::<String, _>("content"),
                    "completed": r.get::<i64, _>("completed") != 0,
                    "created_at": r.get::<Option<String>, _>("created_at"),
                    "updated_at": r.get::<Option<String>, _>("updated_at"),
                })
            })
            .collect();

            let comments: Vec<Value> = sqlx::query(
                "SELECT c.id, c.content, c.created_at, e.full_name AS author_name \
                 FROM comment c \
                 JOIN employee e ON c.employee_id = e.id \
                 WHERE c.task_id = ?1 ORDER BY c.created_at DESC",
            )
            .bind(task_id)
            .fetch_all(ctx.pool)
            .await?
            .iter()
            .map(|r| {
                json!({
                    "id": r.get::<String, _>("id"),
                    "content": r.get::<String, _>("content"),
                    "created_at": r.get::<Option<String>, _>("created_at"),
                    "author_name": r.get::<String, _>("author_name"),
                })
            })
            .collect();

            let formatted = format_task(&task, &subtasks, &comments);
            tracing::info!(task_id, "retrieved task details");
            Ok(json!({
                "task": task,
                "subtasks": subtasks,
                "comments": comments,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::fixture_db;
    use tempfile::tempdir;

    #[tokio::test]
    async fn full_task_with_subtasks_and_comments() {
        let dir = tempdir().unwrap();
        let db = fixture_db(dir.path()).await;
        let result = TaskDetailsTool
            .run(ToolContext { pool: db.pool() }, &json!({"task_id": "T-1"}))
            .await
            .unwrap();

        assert_eq!(result["task"]["title"], "Fix tax rounding");
        assert_eq!(result["task"]["project_name"], "Payroll Revamp");
        assert_eq!(result["task"]["supervisor_name"], "Binh Tran");

        let subtasks = result["subtasks"].as_array().unwrap();
        assert_eq!(subtasks.len(), 2);
        // Incomplete subtask ordered first.
        assert_eq!(subtasks[0]["id"], "ST-1");
        assert_eq!(subtasks[0]["completed"], false);

        let comments = result["comments"].as_array().unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["author_name"], "Binh Tran");

        let formatted = result["formatted_response"].as_str().unwrap();
        assert!(formatted.contains("Title: Fix tax rounding"));
        assert!(formatted.contains("Open subtasks:"));
        assert!(formatted.contains("Check the VND rounding rule first."));
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let dir = tempdir().unwrap();
        let db = fixture_db(dir.path()).await;
        let result = TaskDetailsTool
            .run(ToolContext { pool: db.pool() }, &json!({"task_id": "T-404"}))
            .await
            .unwrap();
        assert_eq!(result["error"], "Task not found");
    }

    #[tokio::test]
    async fn missing_task_id() {
        let dir = tempdir().unwrap();
        let db = fixture_db(dir.path()).await;
        let result = TaskDetailsTool
            .run(ToolContext { pool: db.pool() }, &json!({}))
            .await
            .unwrap();
        assert_eq!(result["error"], "Missing task_id parameter");
    }
}
