//! Property-style invariants: repository round-trips and rate-limit
//! classification closure.

use std::path::PathBuf;

use proofloop::domain::models::{
    Budget, Condition, ConditionRole, Iteration, IterationOutcome, Task, TaskStatus,
};
use proofloop::domain::ports::TaskRepository;
use proofloop::infrastructure::agent::is_rate_limit_error;
use proofloop::infrastructure::persistence::JsonTaskRepository;
use proptest::prelude::*;

fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::Executing),
        Just(TaskStatus::Done),
        Just(TaskStatus::Blocked),
        Just(TaskStatus::Stopped),
    ]
}

fn outcome_strategy() -> impl Strategy<Value = IterationOutcome> {
    prop_oneof![
        Just(IterationOutcome::Progressed),
        Just(IterationOutcome::Stagnated),
        Just(IterationOutcome::Failed),
        Just(IterationOutcome::Completed),
    ]
}

prop_compose! {
    fn task_strategy()(
        description in "[a-zA-Z0-9 ]{1,40}",
        goals in prop::collection::vec("[a-z ]{1,20}", 0..4),
        status in status_strategy(),
        outcomes in prop::collection::vec(outcome_strategy(), 0..5),
        max_iterations in 1u32..50,
        blocking in prop::bool::ANY,
    ) -> Task {
        let mut task = Task::new(description, PathBuf::from("/workspace"));
        task.goals = goals;
        task.status = status;
        task.budget = Budget { max_iterations, max_wall_clock_minutes: 60 };
        if blocking {
            task.conditions.push(
                Condition::user_added("tests pass", ConditionRole::Blocking)
                    .with_check_command("true"),
            );
        }
        for (i, outcome) in outcomes.into_iter().enumerate() {
            let mut iteration = Iteration::started(i as u32 + 1);
            iteration.finish(outcome);
            task.iterations.push(iteration);
        }
        task
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// `load(save(T)) == T` for canonicalized timestamps.
    #[test]
    fn task_round_trips_through_the_repository(task in task_strategy()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let loaded = runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let repo = JsonTaskRepository::new(dir.path());
            repo.save(&task).await.unwrap();
            repo.load(task.id).await.unwrap().unwrap()
        });
        prop_assert_eq!(
            loaded.with_canonical_timestamps(),
            task.clone().with_canonical_timestamps()
        );
    }

    /// Iteration numbering stays contiguous from 1 under the builder.
    #[test]
    fn iteration_numbers_are_contiguous(task in task_strategy()) {
        for (i, iteration) in task.iterations.iter().enumerate() {
            prop_assert_eq!(iteration.number, i as u32 + 1);
        }
    }

    /// Rate-limit detection is idempotent and closed under ASCII case.
    #[test]
    fn rate_limit_detection_is_case_insensitive(
        prefix in "[a-zA-Z0-9 ]{0,20}",
        suffix in "[a-zA-Z0-9 ]{0,20}",
        marker in prop_oneof![
            Just("hit your limit"),
            Just("rate limit"),
            Just("usage limit"),
            Just("429"),
            Just("quota"),
        ],
    ) {
        let message = format!("{prefix}{marker}{suffix}");
        prop_assert!(is_rate_limit_error(&message));
        prop_assert!(is_rate_limit_error(&message.to_ascii_uppercase()));
        prop_assert!(is_rate_limit_error(&message.to_ascii_lowercase()));
        // Idempotence: a second application sees the same answer.
        prop_assert_eq!(is_rate_limit_error(&message), is_rate_limit_error(&message));
    }
}
