use regex::Regex;
use serde_json::json;

use crate::session::ToolCall;
use crate::tools::ToolRegistry;

/// The one tool the heuristic is allowed to trigger with a detected
/// identifier. Mentions of any other tool are ignored.
const DETECTABLE_TOOL: &str = "get_employee_info";

/// Scans free-text model output for naturally-worded tool mentions, as a
/// fallback trigger when the model answers in prose instead of issuing a
/// structured call. Best-effort: the orchestrator treats a miss as
/// "no tool needed".
pub struct ImplicitToolDetector {
    tool_names: Vec<String>,
    id_patterns: Vec<Regex>,
    any_number: Regex,
}

impl ImplicitToolDetector {
    pub fn new(registry: &ToolRegistry) -> Self {
        let id_patterns = [
            r"employee\s+id\s+(\d+)",
            r"employee\s*id:\s*(\d+)",
            r"id\s+(\d+)",
            r"id:\s*(\d+)",
        ]
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){p}")).expect("detector pattern is literal")
        })
        .collect();
        Self {
            tool_names: registry.specs().iter().map(|s| s.name.to_string()).collect(),
            id_patterns,
            any_number: Regex::new(r"\d+").expect("detector pattern is literal"),
        }
    }

    pub fn detect(&self, text: &str) -> Option<ToolCall> {
        let lowered = text.to_lowercase();
        for name in &self.tool_names {
            let mentioned = lowered.contains(&format!("use {name}"))
                || lowered.contains(&format!("using {name}"))
                || lowered.contains(name.as_str());
            if !mentioned || name != DETECTABLE_TOOL {
                continue;
            }
            // Prefer an identifier mentioned next to "id"; first pattern wins.
            for pattern in &self.id_patterns {
                if let Some(caps) = pattern.captures(text) {
                    let args = json!({ "employee_id": &caps[1] });
                    return Some(ToolCall {
                        name: name.clone(),
                        args: args.as_object().cloned().unwrap_or_default(),
                    });
                }
            }
            // Otherwise settle for the first bare number anywhere.
            if let Some(m) = self.any_number.find(text) {
                let args = json!({ "employee_id": m.as_str() });
                return Some(ToolCall {
                    name: name.clone(),
                    args: args.as_object().cloned().unwrap_or_default(),
                });
            }
        }
        None
    }
}
