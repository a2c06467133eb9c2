//! Next-task scoring.
//!
//! Each eligible task receives a weighted score built from five factors:
//! base priority (30%), due-date urgency (25%), blocking factor (20%),
//! task age (15%) and progress status (10%), clamped to [0, 100]. The
//! weighted score is then adjusted by the dependency multipliers: incomplete
//! prerequisites pull it down (bounded at 0.5x), waiting dependents push it
//! up (bounded at 2.0x). Done and cancelled tasks are filtered upstream.

use crate::models::status::TaskStatus;
use crate::models::task::Task;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// The dependency picture for one task: how many of its own prerequisites
/// are still incomplete, and how many other tasks wait on it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyCounts {
    pub incomplete_prerequisites: usize,
    pub dependents: usize,
}

/// Per-factor breakdown included with recommendations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub base_priority: f64,
    pub urgency: f64,
    pub blocking: f64,
    pub age: f64,
    pub progress: f64,
    /// Combined dependency multiplier applied to the weighted sum
    pub dependency_adjustment: f64,
    pub total: f64,
}

/// A scored task plus the factors behind the score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredTask {
    pub task_id: String,
    pub title: String,
    pub priority_score: f64,
    pub breakdown: ScoreBreakdown,
}

/// The winner plus context for the `next` operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextTaskRecommendation {
    pub task_id: String,
    pub title: String,
    pub priority_score: f64,
    pub recommendation_reason: String,
    pub alternative_tasks: Vec<ScoredTask>,
    pub total_eligible_tasks: usize,
    pub priority_factors: Value,
}

/// Compute the weighted priority score for a task, then apply the
/// dependency adjustment multipliers.
pub fn calculate_priority_score(task: &Task, deps: DependencyCounts) -> ScoreBreakdown {
    let base_priority = task.priority.base_score() * 0.30;
    let urgency = urgency_score(task) * 0.25;
    let blocking = blocking_score(deps.dependents) * 0.20;
    let age = age_score(task) * 0.15;
    let progress = progress_score(task.status) * 0.10;

    let weighted = (base_priority + urgency + blocking + age + progress).clamp(0.0, 100.0);
    let dependency_adjustment = incomplete_dependency_multiplier(deps.incomplete_prerequisites)
        * dependent_multiplier(deps.dependents);
    let total = (weighted * dependency_adjustment).clamp(0.0, 100.0);

    ScoreBreakdown {
        base_priority,
        urgency,
        blocking,
        age,
        progress,
        dependency_adjustment,
        total,
    }
}

/// Urgency from due-date proximity. A due date equal to today counts as
/// due today. Tasks without a due date sit at medium urgency.
fn urgency_score(task: &Task) -> f64 {
    let Some(due_date) = task.due_date else {
        return 30.0;
    };

    let days_until_due = (due_date - Utc::now().date_naive()).num_days();
    match days_until_due {
        d if d < 0 => 100.0,
        0 => 90.0,
        1 => 80.0,
        2..=3 => 70.0,
        4..=7 => 50.0,
        8..=30 => 30.0,
        _ => 10.0,
    }
}

/// Blocking factor from the number of dependent tasks.
fn blocking_score(dependent_count: usize) -> f64 {
    match dependent_count {
        0 => 20.0,
        1 => 40.0,
        2..=3 => 60.0,
        4..=5 => 80.0,
        _ => 100.0,
    }
}

/// Older tasks score higher so stale work resurfaces.
fn age_score(task: &Task) -> f64 {
    let age_days = (Utc::now() - task.created_at).num_days();
    match age_days {
        d if d <= 1 => 10.0,
        2..=3 => 20.0,
        4..=7 => 40.0,
        8..=30 => 60.0,
        31..=90 => 80.0,
        _ => 100.0,
    }
}

/// In-flight work scores highest so it gets finished first.
fn progress_score(status: TaskStatus) -> f64 {
    match status {
        TaskStatus::InProgress => 100.0,
        TaskStatus::Review => 80.0,
        TaskStatus::Testing => 70.0,
        TaskStatus::Todo => 50.0,
        TaskStatus::Blocked => 0.0,
        TaskStatus::Done | TaskStatus::Cancelled => 0.0,
    }
}

/// Multiplier lowering priority while the task's own prerequisites are
/// incomplete. Bounded below at 0.5.
pub fn incomplete_dependency_multiplier(incomplete_deps: usize) -> f64 {
    (1.0 - 0.1 * incomplete_deps as f64).max(0.5)
}

/// Multiplier raising priority when other tasks wait on this one. Bounded
/// above at 2.0.
pub fn dependent_multiplier(dependents: usize) -> f64 {
    (1.0 + 0.2 * dependents as f64).min(2.0)
}

/// Compute the dependency picture of each task relative to the given set:
/// dependents are counted from the other tasks' dependency lists, and a
/// prerequisite counts as incomplete when it appears in the set with a
/// non-done status. Prerequisites outside the set cannot be inspected and
/// do not count.
pub fn dependency_counts(tasks: &[&Task]) -> BTreeMap<String, DependencyCounts> {
    let status_by_id: BTreeMap<&str, TaskStatus> =
        tasks.iter().map(|t| (t.id.as_str(), t.status)).collect();

    let mut counts: BTreeMap<String, DependencyCounts> = BTreeMap::new();
    for task in tasks {
        let incomplete = task
            .dependencies
            .iter()
            .filter(|dep| {
                status_by_id.get(dep.as_str()).map(|s| !s.is_done()).unwrap_or(false)
            })
            .count();
        counts.entry(task.id.clone()).or_default().incomplete_prerequisites = incomplete;

        for dep in &task.dependencies {
            counts.entry(dep.clone()).or_default().dependents += 1;
        }
    }
    counts
}

/// Order eligible tasks by score, highest first. `deps_of` supplies each
/// task's dependency picture.
pub fn order_tasks_by_priority<'a, F>(
    tasks: &[&'a Task],
    deps_of: F,
) -> Vec<(&'a Task, ScoreBreakdown)>
where
    F: Fn(&str) -> DependencyCounts,
{
    let mut scored: Vec<(&Task, ScoreBreakdown)> = tasks
        .iter()
        .map(|task| {
            let breakdown = calculate_priority_score(task, deps_of(&task.id));
            (*task, breakdown)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total.partial_cmp(&a.1.total).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Produce the `next` recommendation from a set of eligible tasks. Done and
/// cancelled tasks are excluded here as a second line of defence.
pub fn recommend_next_task<F>(tasks: &[&Task], deps_of: F) -> Option<NextTaskRecommendation>
where
    F: Fn(&str) -> DependencyCounts,
{
    let eligible: Vec<&Task> =
        tasks.iter().copied().filter(|t| !t.status.is_terminal()).collect();
    if eligible.is_empty() {
        return None;
    }

    let ordered = order_tasks_by_priority(&eligible, &deps_of);
    let (winner, breakdown) = ordered.first()?;

    let alternatives = ordered
        .iter()
        .skip(1)
        .take(2)
        .map(|(task, breakdown)| ScoredTask {
            task_id: task.id.clone(),
            title: task.title.clone(),
            priority_score: breakdown.total,
            breakdown: breakdown.clone(),
        })
        .collect();

    Some(NextTaskRecommendation {
        task_id: winner.id.clone(),
        title: winner.title.clone(),
        priority_score: breakdown.total,
        recommendation_reason: recommendation_reason(winner, breakdown.total),
        alternative_tasks: alternatives,
        total_eligible_tasks: eligible.len(),
        priority_factors: json!({
            "base_priority": { "value": winner.priority.as_str(), "score": breakdown.base_priority },
            "urgency": { "due_date": winner.due_date, "score": breakdown.urgency },
            "blocking_factor": { "score": breakdown.blocking },
            "age_factor": { "created_at": winner.created_at.to_rfc3339(), "score": breakdown.age },
            "progress_factor": { "status": winner.status.as_str(), "score": breakdown.progress },
            "dependency_adjustment": breakdown.dependency_adjustment,
        }),
    })
}

fn recommendation_reason(task: &Task, score: f64) -> String {
    let mut reasons = Vec::new();

    if score >= 80.0 {
        reasons.push("high priority score".to_string());
    }
    if let Some(due) = task.due_date {
        let days = (due - Utc::now().date_naive()).num_days();
        if days < 0 {
            reasons.push("overdue".to_string());
        } else if days <= 1 {
            reasons.push("due soon".to_string());
        }
    }
    if task.status == TaskStatus::InProgress {
        reasons.push("already in progress".to_string());
    }
    if task.priority.base_score() >= 75.0 {
        reasons.push(format!("{} priority", task.priority));
    }
    if reasons.is_empty() {
        reasons.push("best available option".to_string());
    }

    format!("Recommended because: {}", reasons.join(", "))
}
