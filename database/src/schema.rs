//! Embedded schema bootstrap. The table and column names here are part of
//! the persisted-state contract; consumers outside the core query them.
//! `context_inheritance_cache` is internal and may be rebuilt at will.

use hive_core::error::Result;
use sqlx::SqlitePool;

use crate::common::map_sqlx_error;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'active',
        metadata TEXT NOT NULL DEFAULT '{}',
        cross_tree_dependencies TEXT NOT NULL DEFAULT '{}',
        resource_locks TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS git_branches (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        assigned_agent_id TEXT,
        status TEXT NOT NULL DEFAULT 'todo',
        task_count INTEGER NOT NULL DEFAULT 0,
        completed_task_count INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(project_id, name)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id TEXT PRIMARY KEY NOT NULL,
        branch_id TEXT NOT NULL REFERENCES git_branches(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'todo',
        priority TEXT NOT NULL DEFAULT 'medium',
        details TEXT NOT NULL DEFAULT '',
        estimated_effort TEXT NOT NULL DEFAULT '',
        due_date TEXT,
        context_id TEXT,
        overall_progress INTEGER NOT NULL DEFAULT 0,
        progress_state TEXT NOT NULL DEFAULT 'initial',
        progress_timeline TEXT,
        progress_history TEXT NOT NULL DEFAULT '[]',
        assignees TEXT NOT NULL DEFAULT '[]',
        labels TEXT NOT NULL DEFAULT '[]',
        dependencies TEXT NOT NULL DEFAULT '[]',
        subtask_ids TEXT NOT NULL DEFAULT '[]',
        status_before_block TEXT,
        completion_summary TEXT,
        testing_notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_branch ON tasks(branch_id)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_user_status ON tasks(user_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS subtasks (
        id TEXT PRIMARY KEY NOT NULL,
        parent_task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'todo',
        priority TEXT NOT NULL DEFAULT 'medium',
        assignees TEXT NOT NULL DEFAULT '[]',
        progress_percentage INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_subtasks_parent ON subtasks(parent_task_id)",
    r#"
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        capabilities TEXT NOT NULL DEFAULT '[]',
        preferred_languages TEXT NOT NULL DEFAULT '[]',
        status TEXT NOT NULL DEFAULT 'available',
        active_tasks TEXT NOT NULL DEFAULT '[]',
        priority_preference TEXT,
        max_concurrent_tasks INTEGER NOT NULL DEFAULT 3,
        registered_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (project_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS work_sessions (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        agent_id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        branch_id TEXT NOT NULL,
        started_at TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active',
        ended_at TEXT,
        paused_at TEXT,
        total_paused_seconds INTEGER NOT NULL DEFAULT 0,
        session_notes TEXT NOT NULL DEFAULT '',
        progress_updates TEXT NOT NULL DEFAULT '[]',
        resources_locked TEXT NOT NULL DEFAULT '[]',
        max_duration_seconds INTEGER,
        last_activity TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_project ON work_sessions(project_id, status)",
    r#"
    CREATE TABLE IF NOT EXISTS global_contexts (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL UNIQUE,
        sections TEXT NOT NULL DEFAULT '{}',
        nested_structure TEXT NOT NULL DEFAULT '{}',
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS project_contexts (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        project_id TEXT NOT NULL,
        parent_global_id TEXT REFERENCES global_contexts(id),
        sections TEXT NOT NULL DEFAULT '{}',
        inheritance_disabled INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS branch_contexts (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        branch_id TEXT NOT NULL,
        parent_project_id TEXT REFERENCES project_contexts(id),
        sections TEXT NOT NULL DEFAULT '{}',
        inheritance_disabled INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS task_contexts (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        task_id TEXT NOT NULL,
        parent_branch_id TEXT,
        parent_branch_context_id TEXT REFERENCES branch_contexts(id),
        sections TEXT NOT NULL DEFAULT '{}',
        inheritance_disabled INTEGER NOT NULL DEFAULT 0,
        force_local_only INTEGER NOT NULL DEFAULT 0,
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS context_delegations (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL,
        source_level TEXT NOT NULL,
        source_id TEXT NOT NULL,
        target_level TEXT NOT NULL,
        target_id TEXT NOT NULL,
        delegated_data TEXT NOT NULL DEFAULT '{}',
        delegation_reason TEXT NOT NULL DEFAULT '',
        trigger_type TEXT NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        approved INTEGER,
        confidence_score REAL,
        status TEXT NOT NULL DEFAULT 'pending',
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS context_inheritance_cache (
        context_id TEXT NOT NULL,
        context_level TEXT NOT NULL,
        user_id TEXT NOT NULL,
        resolved_context TEXT NOT NULL,
        dependencies_hash TEXT NOT NULL,
        resolution_path TEXT NOT NULL DEFAULT '[]',
        parent_chain TEXT NOT NULL DEFAULT '[]',
        expires_at TEXT NOT NULL,
        hit_count INTEGER NOT NULL DEFAULT 0,
        last_hit TEXT,
        cache_size_bytes INTEGER NOT NULL DEFAULT 0,
        invalidated INTEGER NOT NULL DEFAULT 0,
        invalidation_reason TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (context_id, context_level)
    )
    "#,
];

/// Create every table and index if missing. Idempotent.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = crate::test_pool().await;
        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(count >= 11, "expected all contract tables, got {count}");
    }
}
