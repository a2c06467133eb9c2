//! Inheritance resolution: merge a context chain (root first) into the
//! fully-resolved view, honouring truncation flags, and compute the
//! deterministic dependencies hash the cache keys freshness on.

use crate::context::merge::deep_merge;
use crate::context::models::ContextLevel;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The resolution view of one context level, detached from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextNode {
    pub level: ContextLevel,
    pub id: String,
    pub version: i64,
    pub inheritance_disabled: bool,
    pub force_local_only: bool,
    pub sections: BTreeMap<String, Value>,
}

/// The outcome of resolving a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedContext {
    pub context_id: String,
    pub level: ContextLevel,
    /// Merged sections, child values overriding ancestors
    pub resolved: Value,
    /// `level:id` entries actually traversed, root first
    pub resolution_path: Vec<String>,
    /// Ids of the ancestors above the leaf in the traversed chain
    pub parent_chain: Vec<String>,
    /// Hash over the ordered (level, id, version) triples traversed
    pub dependencies_hash: String,
}

/// Deterministic hash over the ordered (level, id, version) triples.
pub fn dependencies_hash(chain: &[&ContextNode]) -> String {
    let mut hasher = Sha256::new();
    for node in chain {
        hasher.update(node.level.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(node.id.as_bytes());
        hasher.update(b":");
        hasher.update(node.version.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Resolve a chain ordered root first (global, project, branch, task).
///
/// Truncation: walking up from the leaf, the first node with
/// `inheritance_disabled` ends the chain at that node inclusive (its values
/// are used, its ancestors are ignored). `force_local_only` on the leaf
/// disables inheritance outright, regardless of parent flags.
///
/// Merging is deep-merge-by-section with ancestors as the base; section
/// ordering within a level is fixed by the level definition, making the
/// merge deterministic.
pub fn resolve_chain(chain: &[ContextNode]) -> Option<ResolvedContext> {
    let leaf = chain.last()?;

    let start = if leaf.force_local_only {
        chain.len() - 1
    } else {
        // Closest-to-leaf node that disables inheritance truncates there.
        chain
            .iter()
            .enumerate()
            .rev()
            .find(|(_, node)| node.inheritance_disabled)
            .map(|(index, _)| index)
            .unwrap_or(0)
    };
    let effective = &chain[start..];

    let mut sections = Map::new();
    for node in effective {
        for section_name in node.level.section_names() {
            if let Some(section) = node.sections.get(*section_name) {
                match sections.get_mut(*section_name) {
                    Some(slot) => deep_merge(slot, section),
                    None => {
                        sections.insert(section_name.to_string(), section.clone());
                    }
                }
            }
        }
    }
    let resolved = Value::Object(sections);

    let traversed: Vec<&ContextNode> = effective.iter().collect();
    let resolution_path =
        traversed.iter().map(|node| format!("{}:{}", node.level, node.id)).collect();
    let parent_chain = traversed
        .iter()
        .take(traversed.len().saturating_sub(1))
        .map(|node| node.id.clone())
        .collect();

    Some(ResolvedContext {
        context_id: leaf.id.clone(),
        level: leaf.level,
        resolved: json!({
            "context_id": leaf.id,
            "level": leaf.level.as_str(),
            "sections": resolved,
        }),
        resolution_path,
        parent_chain,
        dependencies_hash: dependencies_hash(&traversed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::{BranchContext, GlobalContext, ProjectContext, TaskContext};
    use crate::id::new_id;

    fn chain() -> (GlobalContext, ProjectContext, BranchContext, TaskContext) {
        let user = "user-1".to_string();
        let mut global = GlobalContext::new(new_id(), user.clone());
        global
            .merge_into_section(
                "organization_standards",
                &json!({"review": "mandatory", "style": "strict"}),
            )
            .unwrap();

        let mut project =
            ProjectContext::new(new_id(), user.clone(), new_id(), Some(global.id.clone()));
        project
            .merge_into_section("technology_stack", &json!({"language": "rust"}))
            .unwrap();

        let mut branch =
            BranchContext::new(new_id(), user.clone(), new_id(), Some(project.id.clone()));
        branch.merge_into_section("feature_flags", &json!({"beta": true})).unwrap();

        let mut task = TaskContext::new(
            new_id(),
            user,
            new_id(),
            Some(branch.branch_id.clone()),
            Some(branch.id.clone()),
        );
        task.merge_into_section("task_data", &json!({"step": 1})).unwrap();

        (global, project, branch, task)
    }

    fn nodes(
        parts: &(GlobalContext, ProjectContext, BranchContext, TaskContext),
    ) -> Vec<ContextNode> {
        vec![parts.0.node(), parts.1.node(), parts.2.node(), parts.3.node()]
    }

    #[test]
    fn test_full_chain_merges_all_levels() {
        let parts = chain();
        let resolved = resolve_chain(&nodes(&parts)).unwrap();

        let sections = &resolved.resolved["sections"];
        assert_eq!(sections["organization_standards"]["review"], "mandatory");
        assert_eq!(sections["technology_stack"]["language"], "rust");
        assert_eq!(sections["feature_flags"]["beta"], true);
        assert_eq!(sections["task_data"]["step"], 1);

        assert_eq!(resolved.resolution_path.len(), 4);
        assert!(resolved.resolution_path[0].starts_with("global:"));
        assert_eq!(resolved.parent_chain.len(), 3);
        assert_eq!(resolved.level, ContextLevel::Task);
    }

    #[test]
    fn test_child_overrides_parent_by_section_key() {
        let (mut global, project, branch, mut task) = chain();
        global
            .merge_into_section("delegation_rules", &json!({"auto": false, "limit": 5}))
            .unwrap();
        // Task contexts do not have delegation_rules, so override via a
        // branch-level section present at both levels instead:
        task.merge_into_section("discovered_patterns", &json!({"pattern": "task-level"}))
            .unwrap();
        let mut branch = branch;
        branch
            .merge_into_section("discovered_patterns", &json!({"pattern": "branch-level", "extra": 1}))
            .unwrap();

        let parts = (global, project, branch, task);
        let resolved = resolve_chain(&nodes(&parts)).unwrap();
        let patterns = &resolved.resolved["sections"]["discovered_patterns"];
        // task (child) wins on the shared key, branch's extra key survives
        assert_eq!(patterns["pattern"], "task-level");
        assert_eq!(patterns["extra"], 1);
    }

    #[test]
    fn test_inheritance_disabled_truncates_inclusively() {
        let (global, project, mut branch, task) = chain();
        branch.inheritance_disabled = true;

        let parts = (global, project, branch, task);
        let resolved = resolve_chain(&nodes(&parts)).unwrap();

        let sections = &resolved.resolved["sections"];
        // Branch and task values present, ancestors gone
        assert_eq!(sections["feature_flags"]["beta"], true);
        assert_eq!(sections["task_data"]["step"], 1);
        assert!(sections.get("technology_stack").is_none());
        assert!(sections.get("organization_standards").is_none());
        assert_eq!(resolved.resolution_path.len(), 2);
    }

    #[test]
    fn test_force_local_only_beats_everything() {
        let (global, project, branch, mut task) = chain();
        task.force_local_only = true;

        let parts = (global, project, branch, task);
        let resolved = resolve_chain(&nodes(&parts)).unwrap();

        let sections = &resolved.resolved["sections"];
        assert_eq!(sections["task_data"]["step"], 1);
        assert!(sections.get("feature_flags").is_none());
        assert_eq!(resolved.resolution_path.len(), 1);
        assert!(resolved.parent_chain.is_empty());
    }

    #[test]
    fn test_hash_changes_with_version() {
        let parts = chain();
        let first = resolve_chain(&nodes(&parts)).unwrap();

        let (global, mut project, branch, task) = parts;
        project.merge_into_section("project_settings", &json!({"x": 1})).unwrap();
        let parts = (global, project, branch, task);
        let second = resolve_chain(&nodes(&parts)).unwrap();

        assert_ne!(first.dependencies_hash, second.dependencies_hash);
    }

    #[test]
    fn test_hash_deterministic_without_mutation() {
        let parts = chain();
        let first = resolve_chain(&nodes(&parts)).unwrap();
        let second = resolve_chain(&nodes(&parts)).unwrap();
        assert_eq!(first.dependencies_hash, second.dependencies_hash);
        assert_eq!(first.resolved, second.resolved);
    }

    #[test]
    fn test_empty_chain_resolves_to_none() {
        assert!(resolve_chain(&[]).is_none());
    }
}
