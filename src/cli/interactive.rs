//! Terminal implementation of the user gateway.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::models::{
    AgentMessage, ClarificationAnswer, ClarificationQuestion, Condition, ConditionRole,
    McpSuggestion, MessageRole, Plan, Stage,
};
use crate::domain::ports::{PlanDecision, UserGateway};
use crate::infrastructure::utils::format_duration;

/// Interactive gateway backed by stdin/stdout, with a spinner per stage.
#[derive(Default)]
pub struct InteractiveGateway {
    /// Echo tool activity while the agent works.
    pub show_agent_activity: bool,
    spinner: std::sync::Mutex<Option<ProgressBar>>,
}

impl InteractiveGateway {
    pub fn new() -> Self {
        Self {
            show_agent_activity: true,
            spinner: std::sync::Mutex::new(None),
        }
    }

    fn take_spinner(&self) -> Option<ProgressBar> {
        self.spinner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    fn set_spinner(&self, bar: ProgressBar) {
        if let Some(old) = self
            .spinner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .replace(bar)
        {
            old.finish_and_clear();
        }
    }
}

fn read_line(prompt: &str) -> String {
    print!("{prompt}");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}

async fn ask(prompt: String) -> String {
    tokio::task::spawn_blocking(move || read_line(&prompt))
        .await
        .unwrap_or_default()
}

fn print_plan(plan: &Plan) {
    println!("\n{}", style("=== PLAN REVIEW ===").magenta().bold());
    println!("{} {}", style("Goal:").bold(), plan.goal);
    for step in &plan.steps {
        println!("  {}. {}", step.number, step.description);
    }
    if !plan.boundaries.is_empty() {
        println!("{}", style("Boundaries:").bold());
        for boundary in &plan.boundaries {
            println!("  - {boundary}");
        }
    }
}

fn print_conditions(conditions: &[Condition]) {
    println!("\n{}", style("=== COMPLETION CONDITIONS ===").magenta().bold());
    if conditions.is_empty() {
        println!("  (none)");
        return;
    }
    for (i, condition) in conditions.iter().enumerate() {
        let role = match condition.role {
            ConditionRole::Blocking => style("blocking").red(),
            ConditionRole::Signal => style("signal").yellow(),
        };
        let command = condition
            .check_command
            .as_deref()
            .map(|c| format!(" [`{c}`]"))
            .unwrap_or_default();
        println!("  {}. [{role}] {}{command}", i + 1, condition.description);
    }
}

async fn edit_conditions(mut conditions: Vec<Condition>) -> Vec<Condition> {
    loop {
        print_conditions(&conditions);
        println!("\n{}", style("Options:").bold());
        println!("  done - finish editing");
        println!("  a    - add condition");
        println!("  e N  - edit condition N");
        println!("  d N  - delete condition N");
        println!("  t N  - toggle role of condition N");

        let choice = ask("Your choice: ".to_string()).await.to_lowercase();
        if choice.is_empty() || choice == "done" {
            break;
        }
        if choice == "a" {
            let description = ask("Description: ".to_string()).await;
            if description.is_empty() {
                println!("{}", style("Description cannot be empty").red());
                continue;
            }
            let role_choice = ask("Role? [1] blocking (default), [2] signal: ".to_string()).await;
            let role = if role_choice == "2" {
                ConditionRole::Signal
            } else {
                ConditionRole::Blocking
            };
            let command = ask("Check command (empty for none): ".to_string()).await;
            let mut condition = Condition::user_added(description, role);
            if !command.is_empty() {
                condition = condition.with_check_command(command);
            }
            conditions.push(condition);
            continue;
        }

        let (op, index) = match choice.split_once(' ') {
            Some((op, n)) => match n.parse::<usize>() {
                Ok(n) if n >= 1 && n <= conditions.len() => (op.to_string(), n - 1),
                _ => {
                    println!("{}", style("Invalid number").red());
                    continue;
                }
            },
            None => {
                println!("{}", style("Unknown command").red());
                continue;
            }
        };

        match op.as_str() {
            "e" => {
                let new_description =
                    ask("New description (empty to keep): ".to_string()).await;
                if !new_description.is_empty() {
                    conditions[index].description = new_description;
                }
            }
            "d" => {
                let removed = conditions.remove(index);
                println!("{} {}", style("Deleted:").yellow(), removed.description);
            }
            "t" => {
                conditions[index].role = match conditions[index].role {
                    ConditionRole::Blocking => ConditionRole::Signal,
                    ConditionRole::Signal => ConditionRole::Blocking,
                };
            }
            _ => println!("{}", style("Unknown command").red()),
        }
    }
    conditions
}

#[async_trait]
impl UserGateway for InteractiveGateway {
    async fn on_plan_and_conditions(
        &self,
        plan: &Plan,
        conditions: &[Condition],
    ) -> PlanDecision {
        print_plan(plan);
        print_conditions(conditions);
        println!("\n{}", style("Options:").bold());
        println!("  y - approve plan and conditions");
        println!("  n - reject");
        println!("  f - give feedback to refine the plan");
        println!("  c - edit conditions");

        loop {
            let choice = ask("Your choice [y/n/f/c]: ".to_string()).await.to_lowercase();
            match choice.as_str() {
                "y" | "" => return PlanDecision::Approved,
                "n" => return PlanDecision::Rejected,
                "f" => {
                    println!("Enter feedback (empty line to finish):");
                    let mut lines = Vec::new();
                    loop {
                        let line = ask(String::new()).await;
                        if line.is_empty() {
                            break;
                        }
                        lines.push(line);
                    }
                    if lines.is_empty() {
                        return PlanDecision::Rejected;
                    }
                    return PlanDecision::Feedback(lines.join("\n"));
                }
                "c" => {
                    let edited = edit_conditions(conditions.to_vec()).await;
                    return PlanDecision::Edit(edited);
                }
                other => println!("{}", style(format!("Unknown choice {other:?}")).yellow()),
            }
        }
    }

    async fn on_clarification(
        &self,
        questions: &[ClarificationQuestion],
    ) -> Vec<ClarificationAnswer> {
        println!("\n{}", style("=== CLARIFICATION NEEDED ===").cyan().bold());
        let mut answers = Vec::new();
        for question in questions {
            println!("\n{}", style(&question.question).bold());
            if let Some(context) = &question.context {
                println!("{}", style(context).dim());
            }
            for (i, option) in question.options.iter().enumerate() {
                println!("  [{}] {} - {}", i + 1, option.label, option.description);
            }
            println!("  [c] custom answer  [a] decide for me");

            let answer = loop {
                let choice = ask("Your choice: ".to_string()).await.to_lowercase();
                if choice == "c" {
                    let value = ask("Your answer: ".to_string()).await;
                    break ClarificationAnswer::custom(question.id, value);
                }
                if choice == "a" || choice.is_empty() {
                    break ClarificationAnswer::auto(question.id);
                }
                if let Ok(n) = choice.parse::<usize>() {
                    if n >= 1 && n <= question.options.len() {
                        break ClarificationAnswer::selected(
                            question.id,
                            question.options[n - 1].key.clone(),
                        );
                    }
                }
                if let Some(option) = question.options.iter().find(|o| o.key.to_lowercase() == choice)
                {
                    break ClarificationAnswer::selected(question.id, option.key.clone());
                }
                println!(
                    "{}",
                    style("Enter a number, an option key, 'c', or 'a'").red()
                );
            };
            answers.push(answer);
        }
        answers
    }

    async fn on_mcp_selection(&self, suggestions: &[McpSuggestion]) -> Vec<String> {
        println!("\n{}", style("=== SUGGESTED MCP SERVERS ===").cyan().bold());
        for (i, suggestion) in suggestions.iter().enumerate() {
            println!("  [{}] {} - {}", i + 1, suggestion.server, suggestion.reason);
        }
        let choice = ask("Enable which? (comma-separated numbers, 'all', or empty for none): ".to_string())
            .await
            .to_lowercase();
        if choice.is_empty() {
            return Vec::new();
        }
        if choice == "all" {
            return suggestions.iter().map(|s| s.server.clone()).collect();
        }
        choice
            .split(',')
            .filter_map(|part| part.trim().parse::<usize>().ok())
            .filter(|n| *n >= 1 && *n <= suggestions.len())
            .map(|n| suggestions[n - 1].server.clone())
            .collect()
    }

    fn on_agent_message(&self, msg: &AgentMessage) {
        if !self.show_agent_activity {
            return;
        }
        let line = match msg.role {
            MessageRole::ToolUse => msg.tool_name.as_ref().map(|tool| {
                let summary = msg
                    .tool_input
                    .as_ref()
                    .and_then(summarize_tool_input)
                    .unwrap_or_default();
                format!("{} {summary}", style(tool).cyan())
            }),
            MessageRole::Assistant => msg
                .content
                .lines()
                .next()
                .filter(|l| !l.is_empty())
                .map(ToString::to_string),
            _ => None,
        };
        let Some(line) = line else { return };

        let guard = self
            .spinner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match guard.as_ref() {
            Some(bar) => bar.set_message(line),
            None => println!("  {line}"),
        }
    }

    fn on_stage(&self, stage: Stage, is_starting: bool, duration: Duration) {
        if is_starting {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {prefix:.blue.bold} {wide_msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_prefix(stage.display_hint().to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            self.set_spinner(bar);
        } else if let Some(bar) = self.take_spinner() {
            bar.finish_and_clear();
            println!(
                "{} {} ({})",
                style("ok").green().bold(),
                stage.display_hint(),
                format_duration(duration)
            );
        }
    }
}

fn summarize_tool_input(input: &std::collections::BTreeMap<String, serde_json::Value>) -> Option<String> {
    for key in ["command", "file_path", "pattern", "query", "url"] {
        if let Some(value) = input.get(key) {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let short: String = text.chars().take(60).collect();
            let ellipsis = if text.chars().count() > 60 { "..." } else { "" };
            return Some(format!("{key}=\"{short}{ellipsis}\""));
        }
    }
    None
}
