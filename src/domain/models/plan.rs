//! Implementation plans.

use serde::{Deserialize, Serialize};

/// One numbered plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub number: u32,
    pub description: String,
}

/// An agent-produced plan. Immutable once approved; user feedback produces a
/// whole new plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<PlanStep>,
    #[serde(default)]
    pub boundaries: Vec<String>,
}

impl Plan {
    pub fn new(goal: impl Into<String>, steps: Vec<String>) -> Self {
        Self {
            goal: goal.into(),
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(i, description)| PlanStep {
                    number: i as u32 + 1,
                    description,
                })
                .collect(),
            boundaries: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_numbered_from_one() {
        let plan = Plan::new("add greet", vec!["write fn".into(), "write test".into()]);
        assert_eq!(plan.steps[0].number, 1);
        assert_eq!(plan.steps[1].number, 2);
    }
}
