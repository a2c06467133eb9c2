//! Random data and proptest strategies for property tests.

use fake::faker::lorem::en::{Sentence, Words};
use fake::Fake;
use hive_core::models::{Priority, TaskStatus};
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;

/// A plausible random task title (within the 200-character bound).
pub fn random_title() -> String {
    let words: Vec<String> = Words(2..6).fake();
    let mut title = words.join(" ");
    title.truncate(200);
    title
}

/// A plausible random description (within the 2000-character bound).
pub fn random_description() -> String {
    let mut text: String = Sentence(3..12).fake();
    text.truncate(2000);
    text
}

/// A random registered assignee handle.
pub fn random_assignee() -> String {
    let mut rng = rand::thread_rng();
    hive_core::roles::ALL_ROLES
        .choose(&mut rng)
        .expect("registry is non-empty")
        .handle()
}

/// A random progress percentage in bounds.
pub fn random_percentage() -> i64 {
    rand::thread_rng().gen_range(0..=100)
}

/// Proptest strategy over all task statuses.
pub fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Todo),
        Just(TaskStatus::InProgress),
        Just(TaskStatus::Blocked),
        Just(TaskStatus::Review),
        Just(TaskStatus::Testing),
        Just(TaskStatus::Done),
        Just(TaskStatus::Cancelled),
    ]
}

/// Proptest strategy over all priorities.
pub fn priority_strategy() -> impl Strategy<Value = Priority> {
    prop_oneof![
        Just(Priority::Critical),
        Just(Priority::Urgent),
        Just(Priority::High),
        Just(Priority::Medium),
        Just(Priority::Low),
    ]
}

/// Proptest strategy for in-bounds percentages.
pub fn percentage_strategy() -> impl Strategy<Value = u8> {
    0u8..=100
}
