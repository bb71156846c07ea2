//! Prompt templates for common editor workflows.

use std::collections::BTreeMap;

use serde_json::json;

use super::{PromptDefinition, PromptHandler};

/// Parameterized prompt templates the user can select from an MCP client.
pub struct WorkflowPrompts;

impl WorkflowPrompts {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WorkflowPrompts {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptHandler for WorkflowPrompts {
    fn prompt_name(&self) -> &str {
        "workflow"
    }

    fn description(&self) -> &str {
        "Guided editor workflows (diagnose console errors, drive menu items)"
    }

    fn prompt_definitions(&self) -> BTreeMap<String, PromptDefinition> {
        let mut prompts = BTreeMap::new();

        let mut fix_props = BTreeMap::new();
        fix_props.insert(
            "errorMessage".to_string(),
            json!({"description": "The console error text to diagnose", "required": true}),
        );
        fix_props.insert(
            "scriptPath".to_string(),
            json!({"description": "Path of the script the error points at", "required": false}),
        );
        prompts.insert(
            "unity_fix_console_error".to_string(),
            PromptDefinition {
                description: "Diagnose a Unity console error and propose a fix".to_string(),
                template: "The Unity console reports the following error:\n\n{errorMessage}\n\n\
                           Inspect {scriptPath} with the available Unity tools, explain the \
                           root cause, and propose a minimal fix."
                    .to_string(),
                additional_properties: fix_props,
            },
        );

        prompts.insert(
            "unity_project_overview".to_string(),
            PromptDefinition {
                description: "Summarize the currently connected Unity project".to_string(),
                template: "Use the connected Unity client's resources (packages, assets, \
                           console logs) to produce a short overview of the open project: \
                           engine version, notable packages, and any outstanding errors."
                    .to_string(),
                additional_properties: BTreeMap::new(),
            },
        );

        prompts
    }
}
