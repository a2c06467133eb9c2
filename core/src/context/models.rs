use crate::context::inheritance::ContextNode;
use crate::context::merge::deep_merge;
use crate::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// The four context resolution levels, root first.
#[derive(Debug, Clone, Copy, Hash, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    Global,
    Project,
    Branch,
    Task,
}

impl ContextLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextLevel::Global => "global",
            ContextLevel::Project => "project",
            ContextLevel::Branch => "branch",
            ContextLevel::Task => "task",
        }
    }

    pub fn parse(value: &str) -> Result<ContextLevel> {
        match value.trim().to_lowercase().as_str() {
            "global" => Ok(ContextLevel::Global),
            "project" => Ok(ContextLevel::Project),
            "branch" => Ok(ContextLevel::Branch),
            "task" => Ok(ContextLevel::Task),
            other => Err(DomainError::invalid_field(
                "level",
                &format!("unknown context level '{other}'"),
            )),
        }
    }

    pub fn parent(&self) -> Option<ContextLevel> {
        match self {
            ContextLevel::Global => None,
            ContextLevel::Project => Some(ContextLevel::Global),
            ContextLevel::Branch => Some(ContextLevel::Project),
            ContextLevel::Task => Some(ContextLevel::Branch),
        }
    }

    /// Section names of this level, in the fixed documented merge order.
    pub fn section_names(&self) -> &'static [&'static str] {
        match self {
            ContextLevel::Global => GLOBAL_SECTIONS,
            ContextLevel::Project => PROJECT_SECTIONS,
            ContextLevel::Branch => BRANCH_SECTIONS,
            ContextLevel::Task => TASK_SECTIONS,
        }
    }
}

impl std::fmt::Display for ContextLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global-level section names, in merge order.
pub const GLOBAL_SECTIONS: &[&str] = &[
    "organization_standards",
    "security_policies",
    "compliance_requirements",
    "shared_resources",
    "reusable_patterns",
    "global_preferences",
    "delegation_rules",
];

/// Project-level section names, in merge order.
pub const PROJECT_SECTIONS: &[&str] = &[
    "project_info",
    "team_preferences",
    "technology_stack",
    "project_workflow",
    "local_standards",
    "project_settings",
    "technical_specifications",
    "global_overrides",
    "delegation_rules",
];

/// Branch-level section names, in merge order.
pub const BRANCH_SECTIONS: &[&str] = &[
    "branch_info",
    "branch_workflow",
    "feature_flags",
    "discovered_patterns",
    "branch_decisions",
    "active_patterns",
    "local_overrides",
    "delegation_rules",
];

/// Task-level section names, in merge order.
pub const TASK_SECTIONS: &[&str] = &[
    "task_data",
    "execution_context",
    "discovered_patterns",
    "implementation_notes",
    "test_results",
    "blockers",
    "local_decisions",
    "delegation_queue",
    "local_overrides",
    "delegation_triggers",
];

fn empty_sections(names: &[&str]) -> BTreeMap<String, Value> {
    names.iter().map(|name| (name.to_string(), json!({}))).collect()
}

fn merge_section(
    sections: &mut BTreeMap<String, Value>,
    allowed: &[&str],
    name: &str,
    data: &Value,
) -> Result<()> {
    if !allowed.contains(&name) {
        return Err(DomainError::invalid_field(
            "section",
            &format!("unknown section '{name}' for this context level"),
        ));
    }
    let slot = sections.entry(name.to_string()).or_insert_with(|| json!({}));
    deep_merge(slot, data);
    Ok(())
}

/// Per-user root of the context tree. Not a process-wide singleton: every
/// user owns their own global context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalContext {
    pub id: String,
    pub user_id: String,
    pub sections: BTreeMap<String, Value>,
    pub nested_structure: Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GlobalContext {
    pub fn new(id: String, user_id: String) -> GlobalContext {
        let now = Utc::now();
        GlobalContext {
            id,
            user_id,
            sections: empty_sections(GLOBAL_SECTIONS),
            nested_structure: json!({}),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn merge_into_section(&mut self, name: &str, data: &Value) -> Result<()> {
        merge_section(&mut self.sections, GLOBAL_SECTIONS, name, data)?;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn node(&self) -> ContextNode {
        ContextNode {
            level: ContextLevel::Global,
            id: self.id.clone(),
            version: self.version,
            inheritance_disabled: false,
            force_local_only: false,
            sections: self.sections.clone(),
        }
    }
}

/// Project-level context. Parent: the owning user's global context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectContext {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub parent_global_id: Option<String>,
    pub sections: BTreeMap<String, Value>,
    pub inheritance_disabled: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectContext {
    pub fn new(
        id: String,
        user_id: String,
        project_id: String,
        parent_global_id: Option<String>,
    ) -> ProjectContext {
        let now = Utc::now();
        ProjectContext {
            id,
            user_id,
            project_id,
            parent_global_id,
            sections: empty_sections(PROJECT_SECTIONS),
            inheritance_disabled: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn merge_into_section(&mut self, name: &str, data: &Value) -> Result<()> {
        merge_section(&mut self.sections, PROJECT_SECTIONS, name, data)?;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn node(&self) -> ContextNode {
        ContextNode {
            level: ContextLevel::Project,
            id: self.id.clone(),
            version: self.version,
            inheritance_disabled: self.inheritance_disabled,
            force_local_only: false,
            sections: self.sections.clone(),
        }
    }
}

/// Branch-level context. Parent: the project context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchContext {
    pub id: String,
    pub user_id: String,
    pub branch_id: String,
    /// Id of the parent [`ProjectContext`]
    pub parent_project_id: Option<String>,
    pub sections: BTreeMap<String, Value>,
    pub inheritance_disabled: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BranchContext {
    pub fn new(
        id: String,
        user_id: String,
        branch_id: String,
        parent_project_id: Option<String>,
    ) -> BranchContext {
        let now = Utc::now();
        BranchContext {
            id,
            user_id,
            branch_id,
            parent_project_id,
            sections: empty_sections(BRANCH_SECTIONS),
            inheritance_disabled: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn merge_into_section(&mut self, name: &str, data: &Value) -> Result<()> {
        merge_section(&mut self.sections, BRANCH_SECTIONS, name, data)?;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn node(&self) -> ContextNode {
        ContextNode {
            level: ContextLevel::Branch,
            id: self.id.clone(),
            version: self.version,
            inheritance_disabled: self.inheritance_disabled,
            force_local_only: false,
            sections: self.sections.clone(),
        }
    }
}

/// Task-level context, the leaf of the chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskContext {
    pub id: String,
    pub user_id: String,
    pub task_id: String,
    pub parent_branch_id: Option<String>,
    /// Id of the parent [`BranchContext`]
    pub parent_branch_context_id: Option<String>,
    pub sections: BTreeMap<String, Value>,
    pub inheritance_disabled: bool,
    /// Disables inheritance regardless of parent flags
    pub force_local_only: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskContext {
    pub fn new(
        id: String,
        user_id: String,
        task_id: String,
        parent_branch_id: Option<String>,
        parent_branch_context_id: Option<String>,
    ) -> TaskContext {
        let now = Utc::now();
        TaskContext {
            id,
            user_id,
            task_id,
            parent_branch_id,
            parent_branch_context_id,
            sections: empty_sections(TASK_SECTIONS),
            inheritance_disabled: false,
            force_local_only: false,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn merge_into_section(&mut self, name: &str, data: &Value) -> Result<()> {
        merge_section(&mut self.sections, TASK_SECTIONS, name, data)?;
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    pub fn node(&self) -> ContextNode {
        ContextNode {
            level: ContextLevel::Task,
            id: self.id.clone(),
            version: self.version,
            inheritance_disabled: self.inheritance_disabled,
            force_local_only: self.force_local_only,
            sections: self.sections.clone(),
        }
    }
}

/// A row of the inheritance cache: the fully-merged view for one
/// `(context_id, level)` pair. Internal and rebuildable at will.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextCacheEntry {
    pub context_id: String,
    pub level: ContextLevel,
    pub user_id: String,
    pub resolved_context: Value,
    pub dependencies_hash: String,
    pub resolution_path: Vec<String>,
    pub parent_chain: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: i64,
    pub last_hit: Option<DateTime<Utc>>,
    pub cache_size_bytes: i64,
    pub invalidated: bool,
    pub invalidation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContextCacheEntry {
    /// A live entry is not invalidated and not expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.invalidated && self.expires_at > now
    }

    pub fn record_hit(&mut self) {
        self.hit_count += 1;
        self.last_hit = Some(Utc::now());
    }

    pub fn invalidate(&mut self, reason: &str) {
        self.invalidated = true;
        self.invalidation_reason = Some(reason.to_string());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::new_id;

    #[test]
    fn test_level_parent_chain() {
        assert_eq!(ContextLevel::Task.parent(), Some(ContextLevel::Branch));
        assert_eq!(ContextLevel::Branch.parent(), Some(ContextLevel::Project));
        assert_eq!(ContextLevel::Project.parent(), Some(ContextLevel::Global));
        assert_eq!(ContextLevel::Global.parent(), None);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(ContextLevel::parse("task").unwrap(), ContextLevel::Task);
        assert_eq!(ContextLevel::parse("GLOBAL").unwrap(), ContextLevel::Global);
        assert!(ContextLevel::parse("universe").is_err());
    }

    #[test]
    fn test_new_contexts_carry_all_sections() {
        let global = GlobalContext::new(new_id(), "user-1".into());
        assert_eq!(global.sections.len(), GLOBAL_SECTIONS.len());

        let task = TaskContext::new(new_id(), "user-1".into(), new_id(), None, None);
        assert_eq!(task.sections.len(), TASK_SECTIONS.len());
        assert!(task.sections.contains_key("delegation_triggers"));
    }

    #[test]
    fn test_merge_into_section_validates_name_and_bumps_version() {
        let mut ctx = ProjectContext::new(new_id(), "user-1".into(), new_id(), None);
        let v0 = ctx.version;

        ctx.merge_into_section("technology_stack", &json!({"language": "rust"})).unwrap();
        assert_eq!(ctx.version, v0 + 1);
        assert_eq!(ctx.sections["technology_stack"]["language"], "rust");

        assert!(ctx.merge_into_section("task_data", &json!({})).is_err());
    }

    #[test]
    fn test_merge_is_deep() {
        let mut ctx = BranchContext::new(new_id(), "user-1".into(), new_id(), None);
        ctx.merge_into_section("feature_flags", &json!({"flags": {"a": true}})).unwrap();
        ctx.merge_into_section("feature_flags", &json!({"flags": {"b": false}})).unwrap();
        assert_eq!(
            ctx.sections["feature_flags"]["flags"],
            json!({"a": true, "b": false})
        );
    }

    #[test]
    fn test_cache_entry_liveness() {
        let now = Utc::now();
        let mut entry = ContextCacheEntry {
            context_id: new_id(),
            level: ContextLevel::Task,
            user_id: "user-1".into(),
            resolved_context: json!({}),
            dependencies_hash: "abc".into(),
            resolution_path: vec![],
            parent_chain: vec![],
            expires_at: now + chrono::Duration::seconds(300),
            hit_count: 0,
            last_hit: None,
            cache_size_bytes: 2,
            invalidated: false,
            invalidation_reason: None,
            created_at: now,
            updated_at: now,
        };
        assert!(entry.is_live(now));

        entry.record_hit();
        assert_eq!(entry.hit_count, 1);
        assert!(entry.last_hit.is_some());

        entry.invalidate("parent context written");
        assert!(!entry.is_live(now));
        assert_eq!(entry.invalidation_reason.as_deref(), Some("parent context written"));

        let mut expired = entry.clone();
        expired.invalidated = false;
        expired.expires_at = now - chrono::Duration::seconds(1);
        assert!(!expired.is_live(now));
    }
}
