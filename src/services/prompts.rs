//! Stage prompts and output parsers.
//!
//! Which prompt is sent at which stage, and how its output is parsed, is
//! fixed here; the wording itself is free to evolve. Every parser is a total
//! function from agent text to `Ok(value)` or `ParseFailure`.

use serde_json::Value;
use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{
    ClarificationOption, ClarificationQuestion, Condition, ConditionRole, McpServerConfig,
    McpSuggestion, Plan, PlanStep, ProjectAnalysis, Task,
};
use crate::infrastructure::utils::extract_json;

/// Appended to a prompt after a first parse failure.
pub const PARSE_REMINDER: &str =
    "\n\nIMPORTANT: your previous reply could not be parsed. Respond with ONLY the requested JSON object - no prose, no markdown fences.";

// ---------------------------------------------------------------------------
// Intake

pub fn intake_prompt(description: &str) -> String {
    format!(
        r#"Normalize this coding task into goals and constraints.

Task: {description}

Return a JSON object:
{{"goals": ["<goal>", ...], "constraints": ["<constraint>", ...]}}

Goals are observable outcomes; constraints are boundaries the work must respect.
Return ONLY the JSON."#
    )
}

pub fn parse_intake(text: &str) -> CoreResult<(Vec<String>, Vec<String>)> {
    let data = require_json(text)?;
    let goals = string_list(data.get("goals"));
    if goals.is_empty() {
        return Err(CoreError::ParseFailure(
            "intake output has no goals".to_string(),
        ));
    }
    Ok((goals, string_list(data.get("constraints"))))
}

// ---------------------------------------------------------------------------
// Strategy

pub fn strategy_prompt(task: &Task, inventory: &ProjectAnalysis) -> String {
    format!(
        r#"You are preparing to implement a coding task.

Task: {}
Goals:
{}
Project: {}

In a short paragraph, pick the high-level approach you would take (for
example "refactor first", "add a parallel implementation", "test-drive the
change") and why. Plain text, no JSON."#,
        task.description,
        bullet_list(&task.goals),
        inventory.summary(),
    )
}

// ---------------------------------------------------------------------------
// Clarification

pub fn clarification_prompt(task: &Task) -> String {
    format!(
        r#"Before planning this task, decide whether anything is ambiguous enough to ask the user about.

Task: {}
Goals:
{}
Constraints:
{}

Return a JSON object:
{{"questions": [
    {{"question": "<text>", "context": "<why it matters>",
      "options": [{{"key": "<short-key>", "label": "<label>", "description": "<detail>"}}, ...]}}
]}}

Ask at most 3 questions, and only for genuinely ambiguous decisions. Return
{{"questions": []}} when the task is clear. Return ONLY the JSON."#,
        task.description,
        bullet_list(&task.goals),
        bullet_list(&task.constraints),
    )
}

pub fn parse_clarifications(text: &str) -> CoreResult<Vec<ClarificationQuestion>> {
    let data = require_json(text)?;
    let Some(items) = data.get("questions").and_then(Value::as_array) else {
        return Err(CoreError::ParseFailure(
            "clarification output has no questions array".to_string(),
        ));
    };
    let mut questions = Vec::new();
    for item in items {
        let question = item
            .get("question")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::ParseFailure("question without text".to_string()))?;
        let options = item
            .get("options")
            .and_then(Value::as_array)
            .map(|opts| {
                opts.iter()
                    .filter_map(|opt| {
                        Some(ClarificationOption {
                            key: opt.get("key").and_then(Value::as_str)?.to_string(),
                            label: opt.get("label").and_then(Value::as_str)?.to_string(),
                            description: opt
                                .get("description")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        questions.push(ClarificationQuestion {
            id: Uuid::new_v4(),
            question: question.to_string(),
            context: item
                .get("context")
                .and_then(Value::as_str)
                .map(ToString::to_string),
            options,
        });
    }
    Ok(questions)
}

// ---------------------------------------------------------------------------
// Planning

pub fn planning_prompt(
    task: &Task,
    inventory: &ProjectAnalysis,
    strategy: Option<&str>,
    clarification_notes: &str,
    feedback: &[String],
) -> String {
    let mut prompt = format!(
        r#"Create an implementation plan for this task.

Task: {}
Goals:
{}
Constraints:
{}
Project: {}
"#,
        task.description,
        bullet_list(&task.goals),
        bullet_list(&task.constraints),
        inventory.summary(),
    );
    if let Some(strategy) = strategy {
        prompt.push_str(&format!("\nChosen approach:\n{strategy}\n"));
    }
    if !clarification_notes.is_empty() {
        prompt.push_str(&format!("\nClarifications:\n{clarification_notes}\n"));
    }
    for item in feedback {
        prompt.push_str(&format!("\nUser feedback on a previous plan:\n{item}\n"));
    }
    prompt.push_str(
        r#"
Return a JSON object:
{"goal": "<overall goal>",
 "steps": ["<step 1>", "<step 2>", ...],
 "boundaries": ["<thing this plan will not touch>", ...]}

Return ONLY the JSON."#,
    );
    prompt
}

pub fn parse_plan(text: &str) -> CoreResult<Plan> {
    let data = require_json(text)?;
    let goal = data
        .get("goal")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::ParseFailure("plan output has no goal".to_string()))?;
    let steps = string_list(data.get("steps"));
    if steps.is_empty() {
        return Err(CoreError::ParseFailure(
            "plan output has no steps".to_string(),
        ));
    }
    let mut plan = Plan {
        goal: goal.to_string(),
        steps: steps
            .into_iter()
            .enumerate()
            .map(|(i, description)| PlanStep {
                number: i as u32 + 1,
                description,
            })
            .collect(),
        boundaries: string_list(data.get("boundaries")),
    };
    plan.boundaries.retain(|b| !b.is_empty());
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Conditions

pub fn conditions_prompt(task: &Task, plan: &Plan, inventory: &ProjectAnalysis) -> String {
    format!(
        r#"Propose completion conditions for this task.

Task: {}
Plan goal: {}
Project: {}

Return a JSON object:
{{"conditions": [
    {{"description": "<what must hold>",
      "role": "blocking" or "signal",
      "check_command": "<shell command that exits 0 when satisfied>" or null}}
]}}

Blocking conditions gate completion and need a runnable check_command.
Signal conditions are informational. Return ONLY the JSON."#,
        task.description,
        plan.goal,
        inventory.summary(),
    )
}

pub fn parse_conditions(text: &str) -> CoreResult<Vec<Condition>> {
    let data = require_json(text)?;
    let Some(items) = data.get("conditions").and_then(Value::as_array) else {
        return Err(CoreError::ParseFailure(
            "conditions output has no conditions array".to_string(),
        ));
    };
    let mut conditions = Vec::new();
    for item in items {
        let description = item
            .get("description")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::ParseFailure("condition without description".to_string()))?;
        let role = match item.get("role").and_then(Value::as_str) {
            Some("signal") => ConditionRole::Signal,
            _ => ConditionRole::Blocking,
        };
        let mut condition = Condition::proposed(description, role);
        if let Some(cmd) = item.get("check_command").and_then(Value::as_str) {
            if !cmd.is_empty() {
                condition = condition.with_check_command(cmd);
            }
        }
        conditions.push(condition);
    }
    if conditions.is_empty() {
        return Err(CoreError::ParseFailure(
            "conditions output proposed nothing".to_string(),
        ));
    }
    Ok(conditions)
}

// ---------------------------------------------------------------------------
// MCP selection

pub fn mcp_suggestion_prompt(task: &Task, available: &[&McpServerConfig]) -> String {
    let listing: Vec<String> = available
        .iter()
        .map(|s| format!("- {}: {}", s.name, s.description))
        .collect();
    format!(
        r#"Given this task, pick the external tool servers that would genuinely help.

Task: {}

Available servers:
{}

Return a JSON object:
{{"suggestions": [{{"server": "<name>", "reason": "<why>"}}]}}

Suggest only servers from the list, or none. Return ONLY the JSON."#,
        task.description,
        listing.join("\n"),
    )
}

pub fn parse_mcp_suggestions(text: &str) -> CoreResult<Vec<McpSuggestion>> {
    let data = require_json(text)?;
    let Some(items) = data.get("suggestions").and_then(Value::as_array) else {
        return Err(CoreError::ParseFailure(
            "mcp output has no suggestions array".to_string(),
        ));
    };
    Ok(items
        .iter()
        .filter_map(|item| {
            Some(McpSuggestion {
                server: item.get("server").and_then(Value::as_str)?.to_string(),
                reason: item
                    .get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Delivery

pub struct DeliveryPromptContext<'a> {
    pub task: &'a Task,
    pub inventory: &'a ProjectAnalysis,
    /// (condition description, trailing check output) for currently failing
    /// blocking conditions.
    pub failing: &'a [(String, String)],
    pub command_summary: &'a str,
    pub iteration: u32,
}

pub fn delivery_prompt(ctx: &DeliveryPromptContext<'_>) -> String {
    let mut prompt = format!(
        r#"You are implementing a coding task. Iteration {}.

Task: {}
"#,
        ctx.iteration, ctx.task.description,
    );

    if let Some(plan) = &ctx.task.plan {
        prompt.push_str(&format!("\nPlan: {}\n", plan.goal));
        for step in &plan.steps {
            prompt.push_str(&format!("{}. {}\n", step.number, step.description));
        }
        if !plan.boundaries.is_empty() {
            prompt.push_str("Do not touch:\n");
            for boundary in &plan.boundaries {
                prompt.push_str(&format!("- {boundary}\n"));
            }
        }
    }

    prompt.push_str("\nCompletion conditions:\n");
    for condition in &ctx.task.conditions {
        let state = if condition.is_passing() {
            "passing"
        } else {
            "not passing"
        };
        prompt.push_str(&format!(
            "- [{}] {} ({state})\n",
            condition.role.as_str(),
            condition.description
        ));
    }

    prompt.push_str(&format!("\nProject: {}\n", ctx.inventory.summary()));

    if !ctx.failing.is_empty() {
        prompt.push_str("\nFailing checks from the last iteration:\n");
        for (description, output) in ctx.failing {
            prompt.push_str(&format!("### {description}\n{output}\n"));
        }
    }

    prompt.push_str(&format!("\n{}\n", ctx.command_summary));
    prompt.push_str(
        "\nMake the changes needed to satisfy every blocking condition. Work directly in the workspace.",
    );
    prompt
}

// ---------------------------------------------------------------------------
// Helpers

fn require_json(text: &str) -> CoreResult<Value> {
    extract_json(text).ok_or_else(|| {
        let preview: String = text.chars().take(120).collect();
        CoreError::ParseFailure(format!("no JSON object in agent output: {preview:?}"))
    })
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Note appended to planning context describing answered clarifications.
pub fn clarification_notes(task: &Task, questions: &[ClarificationQuestion]) -> String {
    let mut notes = Vec::new();
    for answer in &task.clarifications {
        let question_text = questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .map_or("(question)", |q| q.question.as_str());
        let answer_text = if answer.is_auto() {
            "decide for me at plan time".to_string()
        } else if let Some(custom) = &answer.custom_value {
            custom.clone()
        } else {
            answer.selected_option.clone()
        };
        notes.push(format!("- {question_text}: {answer_text}"));
    }
    notes.join("\n")
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        "- (none)".to_string()
    } else {
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ApprovalStatus;

    #[test]
    fn plan_parses_and_numbers_steps() {
        let plan = parse_plan(
            r#"{"goal": "add greet", "steps": ["write greet()", "write tests"], "boundaries": ["no CI changes"]}"#,
        )
        .unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[1].number, 2);
        assert_eq!(plan.boundaries, vec!["no CI changes"]);
    }

    #[test]
    fn plan_without_steps_is_a_parse_failure() {
        let err = parse_plan(r#"{"goal": "x", "steps": []}"#).unwrap_err();
        assert!(matches!(err, CoreError::ParseFailure(_)));
    }

    #[test]
    fn conditions_default_to_blocking() {
        let conditions = parse_conditions(
            r#"{"conditions": [
                {"description": "tests pass", "role": "blocking", "check_command": "pytest"},
                {"description": "coverage noted", "role": "signal"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].role, ConditionRole::Blocking);
        assert_eq!(conditions[0].check_command.as_deref(), Some("pytest"));
        assert_eq!(conditions[0].approval, ApprovalStatus::Pending);
        assert_eq!(conditions[1].role, ConditionRole::Signal);
    }

    #[test]
    fn empty_clarifications_parse_to_empty_list() {
        assert!(parse_clarifications(r#"{"questions": []}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn prose_is_a_parse_failure() {
        assert!(matches!(
            parse_plan("Sure! Here's my plan: first I will..."),
            Err(CoreError::ParseFailure(_))
        ));
    }

    #[test]
    fn intake_requires_goals() {
        assert!(parse_intake(r#"{"goals": [], "constraints": []}"#).is_err());
        let (goals, constraints) =
            parse_intake(r#"{"goals": ["add greet"], "constraints": ["keep API"]}"#).unwrap();
        assert_eq!(goals, vec!["add greet"]);
        assert_eq!(constraints, vec!["keep API"]);
    }

    #[test]
    fn mcp_suggestions_parse() {
        let suggestions = parse_mcp_suggestions(
            r#"{"suggestions": [{"server": "github", "reason": "issue linked"}]}"#,
        )
        .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].server, "github");
    }
}
