use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{Pool, Sqlite};

pub mod contact;
pub mod employee;
pub mod projects;
pub mod schema;
pub mod tasks;
pub mod timekeeping;

/// Declared contract for one tool: the schema shared between the model's
/// function declarations and the executor's implementation.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
    /// Whether the employee_id argument is auto-filled from the session.
    pub identity_scoped: bool,
    /// Argument the direct-command parser maps the remainder of the line to.
    pub positional_arg: Option<&'static str>,
}

/// Static catalog of the available tools. The chat side uses it for direct
/// command matching, identity scoping, and the model's tool declarations;
/// the executor side uses it for /mcp/tools metadata.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
}

impl ToolRegistry {
    pub fn with_default_tools() -> Self {
        let employee_id_param = json!({
            "type": "string",
            "description": "UUID of the employee"
        });
        let specs = vec![
            ToolSpec {
                name: "get_employee_info",
                description: "Retrieves comprehensive information about an employee including profile, department, projects, tasks, and related data.",
                parameters: json!({
                    "type": "object",
                    "properties": { "employee_id": employee_id_param.clone() },
                    "required": ["employee_id"]
                }),
                identity_scoped: true,
                positional_arg: Some("employee_id"),
            },
            ToolSpec {
                name: "get_employee_timekeeping",
                description: "Retrieves timekeeping records for a specific employee, optionally filtered by month and year.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "employee_id": employee_id_param.clone(),
                        "month": { "type": "integer", "description": "Month to filter records (1-12, optional)" },
                        "year": { "type": "integer", "description": "Year to filter records (e.g. 2025, optional)" }
                    },
                    "required": ["employee_id"]
                }),
                identity_scoped: true,
                positional_arg: Some("employee_id"),
            },
            ToolSpec {
                name: "get_employee_projects",
                description: "Retrieves all projects an employee is participating in or managing.",
                parameters: json!({
                    "type": "object",
                    "properties": { "employee_id": employee_id_param.clone() },
                    "required": ["employee_id"]
                }),
                identity_scoped: true,
                positional_arg: Some("employee_id"),
            },
            ToolSpec {
                name: "get_task_details",
                description: "Retrieves detailed information about a specific task, including subtasks, comments, and related entities.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "task_id": { "type": "string", "description": "UUID of the task" }
                    },
                    "required": ["task_id"]
                }),
                identity_scoped: false,
                positional_arg: Some("task_id"),
            },
            ToolSpec {
                name: "describe_table",
                description: "Retrieves schema information about a database table.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "table": { "type": "string", "description": "Name of the table to describe" },
                        "schema": { "type": "string", "description": "Database schema (optional)" }
                    },
                    "required": ["table"]
                }),
                identity_scoped: false,
                positional_arg: Some("table"),
            },
            ToolSpec {
                name: "update_contact_info",
                description: "Updates basic contact information for an employee such as phone number, address, and avatar URL.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "employee_id": employee_id_param,
                        "phone_number": { "type": "string", "description": "New phone number (optional)" },
                        "address": { "type": "string", "description": "New address (optional)" },
                        "avatar": { "type": "string", "description": "New avatar URL (optional)" }
                    },
                    "required": ["employee_id"]
                }),
                identity_scoped: true,
                positional_arg: None,
            },
        ];
        Self { specs }
    }

    pub fn specs(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.iter().find(|s| s.name == name)
    }
}

/// Shared context passed to tool implementations.
pub struct ToolContext<'a> {
    pub pool: &'a Pool<Sqlite>,
}

/// A database-backed tool. Domain failures (not found, missing fields, SQL
/// errors) come back as an `{"error": ...}` map; `Err` is reserved for
/// unexpected conditions that should surface as 500.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: ToolContext<'_>, params: &Value) -> anyhow::Result<Value>;
}

/// Runtime table of tool implementations for the executor service.
pub struct ToolSet {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolSet {
    pub fn with_default_tools() -> Self {
        Self {
            tools: vec![
                Box::new(employee::EmployeeInfoTool),
                Box::new(timekeeping::TimekeepingTool),
                Box::new(projects::EmployeeProjectsTool),
                Box::new(tasks::TaskDetailsTool),
                Box::new(schema::DescribeTableTool),
                Box::new(contact::UpdateContactInfoTool),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().map(|b| b.as_ref()).find(|t| t.name() == name)
    }
}

/// Pull a required string parameter, or produce the standard
/// missing-parameter error map.
pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, Value> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| json!({ "error": format!("Missing {} parameter", key) }))
}

/// Fold a database failure into the error shape tools report.
pub(crate) fn db_error(e: sqlx::Error) -> Value {
    json!({ "error": format!("Database error: {}", e) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_six_tools_with_schemas() {
        let registry = ToolRegistry::with_default_tools();
        assert_eq!(registry.specs().len(), 6);
        for spec in registry.specs() {
            assert_eq!(spec.parameters["type"], "object");
            assert!(spec.parameters["properties"].is_object());
            assert!(spec.parameters["required"].is_array());
        }
    }

    #[test]
    fn identity_scoped_set() {
        let registry = ToolRegistry::with_default_tools();
        let scoped: Vec<_> = registry
            .specs()
            .iter()
            .filter(|s| s.identity_scoped)
            .map(|s| s.name)
            .collect();
        assert_eq!(
            scoped,
            vec![
                "get_employee_info",
                "get_employee_timekeeping",
                "get_employee_projects",
                "update_contact_info"
            ]
        );
    }

    #[test]
    fn positional_arg_mapping() {
        let registry = ToolRegistry::with_default_tools();
        assert_eq!(
            registry.get("get_task_details").unwrap().positional_arg,
            Some("task_id")
        );
        assert_eq!(
            registry.get("describe_table").unwrap().positional_arg,
            Some("table")
        );
        assert_eq!(registry.get("update_contact_info").unwrap().positional_arg, None);
        assert!(registry.get("no_such_tool").is_none());
    }

    #[test]
    fn toolset_matches_registry() {
        let registry = ToolRegistry::with_default_tools();
        let set = ToolSet::with_default_tools();
        for spec in registry.specs() {
            assert!(set.get(spec.name).is_some(), "no implementation for {}", spec.name);
        }
    }

    #[test]
    fn require_str_rejects_missing_and_empty() {
        let params = json!({"task_id": "T-1", "empty": ""});
        assert_eq!(require_str(&params, "task_id").unwrap(), "T-1");
        let err = require_str(&params, "employee_id").unwrap_err();
        assert_eq!(err["error"], "Missing employee_id parameter");
        assert!(require_str(&params, "empty").is_err());
    }
}
