use crate::common::{json_column, map_sqlx_error, with_retry};
use async_trait::async_trait;
use hive_core::context::{
    BranchContext, ContextDelegation, ContextLevel, DelegationStatus, DelegationTrigger,
    GlobalContext, ProjectContext, TaskContext,
};
use hive_core::error::{DomainError, Result};
use hive_core::repository::{ContextRepository, DelegationRepository, Scope};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// SQLite implementation of [`ContextRepository`].
///
/// Saves are upsert-with-version: the UPDATE only lands when it carries a
/// newer version than the stored row. A stale write fails with Conflict and
/// the caller re-reads and retries.
#[derive(Clone)]
pub struct SqliteContextRepository {
    pool: Arc<SqlitePool>,
    scope: Scope,
}

impl SqliteContextRepository {
    pub fn new(pool: Arc<SqlitePool>, scope: Scope) -> Self {
        Self { pool, scope }
    }

    fn user_filter(&self, base: &str) -> String {
        if self.scope.is_system() {
            base.to_string()
        } else {
            format!("{base} AND user_id = ?")
        }
    }

    fn require_owner(&self, row_user_id: &str) -> Result<()> {
        let user = self.scope.require_user()?;
        if row_user_id != user {
            return Err(DomainError::Forbidden("access denied".into()));
        }
        Ok(())
    }

    /// After a zero-row UPDATE: Conflict when the row exists at a newer or
    /// equal version, otherwise signal that an INSERT is needed.
    async fn stale_or_missing(&self, table: &str, id: &str, version: i64) -> Result<bool> {
        let stored: Option<(i64,)> =
            sqlx::query_as(&format!("SELECT version FROM {table} WHERE id = ?"))
                .bind(id)
                .fetch_optional(&*self.pool)
                .await
                .map_err(map_sqlx_error)?;
        match stored {
            Some((stored_version,)) => Err(DomainError::Conflict(format!(
                "{table} row {id} was modified concurrently (stored version {stored_version}, write carries {version})"
            ))),
            None => Ok(true),
        }
    }
}

fn row_to_global(row: &SqliteRow) -> Result<GlobalContext> {
    Ok(GlobalContext {
        id: row.get("id"),
        user_id: row.get("user_id"),
        sections: json_column(row, "sections")?,
        nested_structure: json_column(row, "nested_structure")?,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_project_context(row: &SqliteRow) -> Result<ProjectContext> {
    Ok(ProjectContext {
        id: row.get("id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        parent_global_id: row.get("parent_global_id"),
        sections: json_column(row, "sections")?,
        inheritance_disabled: row.get::<i64, _>("inheritance_disabled") != 0,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_branch_context(row: &SqliteRow) -> Result<BranchContext> {
    Ok(BranchContext {
        id: row.get("id"),
        user_id: row.get("user_id"),
        branch_id: row.get("branch_id"),
        parent_project_id: row.get("parent_project_id"),
        sections: json_column(row, "sections")?,
        inheritance_disabled: row.get::<i64, _>("inheritance_disabled") != 0,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_task_context(row: &SqliteRow) -> Result<TaskContext> {
    Ok(TaskContext {
        id: row.get("id"),
        user_id: row.get("user_id"),
        task_id: row.get("task_id"),
        parent_branch_id: row.get("parent_branch_id"),
        parent_branch_context_id: row.get("parent_branch_context_id"),
        sections: json_column(row, "sections")?,
        inheritance_disabled: row.get::<i64, _>("inheritance_disabled") != 0,
        force_local_only: row.get::<i64, _>("force_local_only") != 0,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn sections_text(sections: &std::collections::BTreeMap<String, serde_json::Value>) -> Result<String> {
    serde_json::to_string(sections).map_err(|e| DomainError::Serialization(e.to_string()))
}

#[async_trait]
impl ContextRepository for SqliteContextRepository {
    async fn save_global(&self, context: &GlobalContext) -> Result<()> {
        self.require_owner(&context.user_id)?;
        let sections = sections_text(&context.sections)?;
        let nested = serde_json::to_string(&context.nested_structure)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        let updated = sqlx::query(
            "UPDATE global_contexts SET sections = ?, nested_structure = ?, version = ?, updated_at = ? WHERE id = ? AND user_id = ? AND version < ?",
        )
        .bind(&sections)
        .bind(&nested)
        .bind(context.version)
        .bind(context.updated_at.to_rfc3339())
        .bind(&context.id)
        .bind(&context.user_id)
        .bind(context.version)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0
            && self.stale_or_missing("global_contexts", &context.id, context.version).await?
        {
            sqlx::query(
                "INSERT INTO global_contexts (id, user_id, sections, nested_structure, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&context.id)
            .bind(&context.user_id)
            .bind(&sections)
            .bind(&nested)
            .bind(context.version)
            .bind(context.created_at.to_rfc3339())
            .bind(context.updated_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn find_global_by_id(&self, id: &str) -> Result<Option<GlobalContext>> {
        let query = self.user_filter("SELECT * FROM global_contexts WHERE id = ?");
        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_global(&r)).transpose()
    }

    async fn find_global_for_user(&self) -> Result<Option<GlobalContext>> {
        let user = self.scope.require_user()?;
        let row = sqlx::query("SELECT * FROM global_contexts WHERE user_id = ?")
            .bind(user)
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.map(|r| row_to_global(&r)).transpose()
    }

    async fn save_project_context(&self, context: &ProjectContext) -> Result<()> {
        self.require_owner(&context.user_id)?;
        let sections = sections_text(&context.sections)?;

        let updated = sqlx::query(
            "UPDATE project_contexts SET sections = ?, inheritance_disabled = ?, version = ?, updated_at = ? WHERE id = ? AND user_id = ? AND version < ?",
        )
        .bind(&sections)
        .bind(context.inheritance_disabled as i64)
        .bind(context.version)
        .bind(context.updated_at.to_rfc3339())
        .bind(&context.id)
        .bind(&context.user_id)
        .bind(context.version)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0
            && self.stale_or_missing("project_contexts", &context.id, context.version).await?
        {
            sqlx::query(
                "INSERT INTO project_contexts (id, user_id, project_id, parent_global_id, sections, inheritance_disabled, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&context.id)
            .bind(&context.user_id)
            .bind(&context.project_id)
            .bind(&context.parent_global_id)
            .bind(&sections)
            .bind(context.inheritance_disabled as i64)
            .bind(context.version)
            .bind(context.created_at.to_rfc3339())
            .bind(context.updated_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn find_project_context(&self, id: &str) -> Result<Option<ProjectContext>> {
        let query = self.user_filter("SELECT * FROM project_contexts WHERE id = ?");
        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_project_context(&r)).transpose()
    }

    async fn find_project_contexts_by_parent(
        &self,
        global_context_id: &str,
    ) -> Result<Vec<ProjectContext>> {
        let query = self.user_filter("SELECT * FROM project_contexts WHERE parent_global_id = ?");
        let mut q = sqlx::query(&query).bind(global_context_id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let rows = q.fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_project_context).collect()
    }

    async fn save_branch_context(&self, context: &BranchContext) -> Result<()> {
        self.require_owner(&context.user_id)?;
        let sections = sections_text(&context.sections)?;

        let updated = sqlx::query(
            "UPDATE branch_contexts SET sections = ?, inheritance_disabled = ?, version = ?, updated_at = ? WHERE id = ? AND user_id = ? AND version < ?",
        )
        .bind(&sections)
        .bind(context.inheritance_disabled as i64)
        .bind(context.version)
        .bind(context.updated_at.to_rfc3339())
        .bind(&context.id)
        .bind(&context.user_id)
        .bind(context.version)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0
            && self.stale_or_missing("branch_contexts", &context.id, context.version).await?
        {
            sqlx::query(
                "INSERT INTO branch_contexts (id, user_id, branch_id, parent_project_id, sections, inheritance_disabled, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&context.id)
            .bind(&context.user_id)
            .bind(&context.branch_id)
            .bind(&context.parent_project_id)
            .bind(&sections)
            .bind(context.inheritance_disabled as i64)
            .bind(context.version)
            .bind(context.created_at.to_rfc3339())
            .bind(context.updated_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn find_branch_context(&self, id: &str) -> Result<Option<BranchContext>> {
        let query = self.user_filter("SELECT * FROM branch_contexts WHERE id = ?");
        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_branch_context(&r)).transpose()
    }

    async fn find_branch_contexts_by_parent(
        &self,
        project_context_id: &str,
    ) -> Result<Vec<BranchContext>> {
        let query = self.user_filter("SELECT * FROM branch_contexts WHERE parent_project_id = ?");
        let mut q = sqlx::query(&query).bind(project_context_id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let rows = q.fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_branch_context).collect()
    }

    async fn save_task_context(&self, context: &TaskContext) -> Result<()> {
        self.require_owner(&context.user_id)?;
        let sections = sections_text(&context.sections)?;

        let updated = sqlx::query(
            "UPDATE task_contexts SET sections = ?, inheritance_disabled = ?, force_local_only = ?, version = ?, updated_at = ? WHERE id = ? AND user_id = ? AND version < ?",
        )
        .bind(&sections)
        .bind(context.inheritance_disabled as i64)
        .bind(context.force_local_only as i64)
        .bind(context.version)
        .bind(context.updated_at.to_rfc3339())
        .bind(&context.id)
        .bind(&context.user_id)
        .bind(context.version)
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0
            && self.stale_or_missing("task_contexts", &context.id, context.version).await?
        {
            sqlx::query(
                "INSERT INTO task_contexts (id, user_id, task_id, parent_branch_id, parent_branch_context_id, sections, inheritance_disabled, force_local_only, version, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&context.id)
            .bind(&context.user_id)
            .bind(&context.task_id)
            .bind(&context.parent_branch_id)
            .bind(&context.parent_branch_context_id)
            .bind(&sections)
            .bind(context.inheritance_disabled as i64)
            .bind(context.force_local_only as i64)
            .bind(context.version)
            .bind(context.created_at.to_rfc3339())
            .bind(context.updated_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }
        Ok(())
    }

    async fn find_task_context(&self, id: &str) -> Result<Option<TaskContext>> {
        let query = self.user_filter("SELECT * FROM task_contexts WHERE id = ?");
        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_task_context(&r)).transpose()
    }

    async fn find_task_contexts_by_parent(
        &self,
        branch_context_id: &str,
    ) -> Result<Vec<TaskContext>> {
        let query =
            self.user_filter("SELECT * FROM task_contexts WHERE parent_branch_context_id = ?");
        let mut q = sqlx::query(&query).bind(branch_context_id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let rows = q.fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_task_context).collect()
    }
}

/// SQLite implementation of [`DelegationRepository`].
#[derive(Clone)]
pub struct SqliteDelegationRepository {
    pool: Arc<SqlitePool>,
    scope: Scope,
}

impl SqliteDelegationRepository {
    pub fn new(pool: Arc<SqlitePool>, scope: Scope) -> Self {
        Self { pool, scope }
    }
}

fn row_to_delegation(row: &SqliteRow) -> Result<ContextDelegation> {
    let source_level: String = row.get("source_level");
    let target_level: String = row.get("target_level");
    let trigger: String = row.get("trigger_type");
    let status: String = row.get("status");
    let approved: Option<i64> = row.get("approved");

    Ok(ContextDelegation {
        id: row.get("id"),
        user_id: row.get("user_id"),
        source_level: ContextLevel::parse(&source_level)?,
        source_id: row.get("source_id"),
        target_level: ContextLevel::parse(&target_level)?,
        target_id: row.get("target_id"),
        delegated_data: json_column(row, "delegated_data")?,
        delegation_reason: row.get("delegation_reason"),
        trigger_type: DelegationTrigger::parse(&trigger)?,
        processed: row.get::<i64, _>("processed") != 0,
        approved: approved.map(|a| a != 0),
        confidence_score: row.get("confidence_score"),
        status: match status.as_str() {
            "processed" => DelegationStatus::Processed,
            "error" => DelegationStatus::Error,
            _ => DelegationStatus::Pending,
        },
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl DelegationRepository for SqliteDelegationRepository {
    async fn save(&self, delegation: &ContextDelegation) -> Result<()> {
        let user = self.scope.require_user()?;
        if delegation.user_id != user {
            return Err(DomainError::Forbidden("access denied".into()));
        }
        let data = serde_json::to_string(&delegation.delegated_data)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        let pool = self.pool.clone();
        with_retry("context_delegations.save", || {
            let pool = pool.clone();
            let data = data.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO context_delegations (
                        id, user_id, source_level, source_id, target_level, target_id,
                        delegated_data, delegation_reason, trigger_type, processed,
                        approved, confidence_score, status, error_message, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        delegated_data = excluded.delegated_data,
                        processed = excluded.processed,
                        approved = excluded.approved,
                        confidence_score = excluded.confidence_score,
                        status = excluded.status,
                        error_message = excluded.error_message,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&delegation.id)
                .bind(&delegation.user_id)
                .bind(delegation.source_level.as_str())
                .bind(&delegation.source_id)
                .bind(delegation.target_level.as_str())
                .bind(&delegation.target_id)
                .bind(&data)
                .bind(&delegation.delegation_reason)
                .bind(delegation.trigger_type.as_str())
                .bind(delegation.processed as i64)
                .bind(delegation.approved.map(|a| a as i64))
                .bind(delegation.confidence_score)
                .bind(match delegation.status {
                    DelegationStatus::Pending => "pending",
                    DelegationStatus::Processed => "processed",
                    DelegationStatus::Error => "error",
                })
                .bind(&delegation.error_message)
                .bind(delegation.created_at.to_rfc3339())
                .bind(delegation.updated_at.to_rfc3339())
                .execute(&*pool)
                .await
                .map_err(map_sqlx_error)?;
                Ok(())
            }
        })
        .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ContextDelegation>> {
        let mut query = String::from("SELECT * FROM context_delegations WHERE id = ?");
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }
        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_delegation(&r)).transpose()
    }

    async fn list_unprocessed(&self) -> Result<Vec<ContextDelegation>> {
        let mut query = String::from("SELECT * FROM context_delegations WHERE processed = 0");
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }
        query.push_str(" ORDER BY created_at ASC");
        let mut q = sqlx::query(&query);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let rows = q.fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_delegation).collect()
    }
}
