//! Terminal output formatting.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use console::style;

use crate::domain::models::{Task, TaskRunResult, TaskStatus};

/// Render the final run result.
pub fn print_result(result: &TaskRunResult) {
    println!();
    match result.status {
        TaskStatus::Done => println!("{}", style("Task complete").green().bold()),
        TaskStatus::Blocked => println!(
            "{} ({})",
            style("Task blocked").red().bold(),
            result.reason.as_str()
        ),
        TaskStatus::Stopped => println!(
            "{} ({})",
            style("Task stopped").yellow().bold(),
            result.reason.as_str()
        ),
        _ => println!("Task ended in {}", result.status.as_str()),
    }
    if result.detail != result.reason.as_str() {
        println!("  {}", style(&result.detail).dim());
    }
    println!(
        "  {} iterations, {} files changed (+{} / -{})",
        result.iterations, result.files_changed, result.insertions, result.deletions
    );
    if !result.conditions_passed.is_empty() {
        println!("  {}", style("Conditions passed:").green());
        for condition in &result.conditions_passed {
            println!("    + {condition}");
        }
    }
    if !result.conditions_failed.is_empty() {
        println!("  {}", style("Conditions failed:").red());
        for condition in &result.conditions_failed {
            println!("    - {condition}");
        }
    }
}

/// Render `task list` as a table.
pub fn print_task_table(tasks: &[Task]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["ID", "Status", "Iterations", "Description", "Updated"]);
    for task in tasks {
        table.add_row(vec![
            Cell::new(task.id.simple().to_string()),
            Cell::new(task.status.as_str()),
            Cell::new(task.iterations.len().to_string()),
            Cell::new(truncate(&task.description, 60)),
            Cell::new(task.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    println!("{table}");
}

/// Render `task status` detail.
pub fn print_task_status(task: &Task) {
    println!("{} {}", style("Task:").bold(), task.id.simple());
    println!("{} {}", style("Status:").bold(), task.status.as_str());
    if let Some(reason) = &task.terminal_reason {
        println!("{} {}", style("Reason:").bold(), reason.as_str());
    }
    println!("{} {}", style("Description:").bold(), task.description);
    println!("{} {}", style("Iterations:").bold(), task.iterations.len());
    if let Some(last) = task.iterations.last() {
        println!(
            "{} #{} {}",
            style("Last iteration:").bold(),
            last.number,
            last.outcome.as_str()
        );
    }
    if !task.conditions.is_empty() {
        println!("{}", style("Conditions:").bold());
        for condition in &task.conditions {
            let mark = if condition.is_passing() { "+" } else { "-" };
            println!(
                "  {mark} [{}] {}",
                condition.role.as_str(),
                condition.description
            );
        }
    }
}

pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }
}
