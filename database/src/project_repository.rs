use crate::common::{json_column, map_sqlx_error, row_to_task, to_json_text, with_retry};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hive_core::error::{DomainError, Result};
use hive_core::models::{
    Agent, AgentStatus, GitBranch, Priority, Project, ProjectStatus, SessionStatus, TaskStatus,
    WorkSession,
};
use hive_core::repository::{ProjectRepository, Scope};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;

/// SQLite implementation of [`ProjectRepository`].
///
/// The aggregate persists across normalised tables: projects carry the
/// dependency graph and resource locks as JSON, branches and agents and
/// sessions have their own tables, and tasks are loaded into their branches
/// on read. Saving does not write tasks; those belong to the task
/// repository.
#[derive(Clone)]
pub struct SqliteProjectRepository {
    pool: Arc<SqlitePool>,
    scope: Scope,
}

impl SqliteProjectRepository {
    pub fn new(pool: Arc<SqlitePool>, scope: Scope) -> Self {
        Self { pool, scope }
    }

    async fn owner_of(&self, id: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT user_id FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(|(user,)| user))
    }

    async fn load_aggregate(&self, row: &SqliteRow) -> Result<Project> {
        let id: String = row.get("id");
        let status_str: String = row.get("status");

        let mut project = Project {
            id: id.clone(),
            name: row.get("name"),
            description: row.get("description"),
            status: if status_str == "archived" {
                ProjectStatus::Archived
            } else {
                ProjectStatus::Active
            },
            metadata: json_column(row, "metadata")?,
            branches: BTreeMap::new(),
            agents: BTreeMap::new(),
            assignments: BTreeMap::new(),
            cross_tree_dependencies: json_column(row, "cross_tree_dependencies")?,
            active_sessions: BTreeMap::new(),
            resource_locks: json_column(row, "resource_locks")?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        };

        let branch_rows = sqlx::query("SELECT * FROM git_branches WHERE project_id = ?")
            .bind(&id)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;

        for branch_row in &branch_rows {
            let branch_id: String = branch_row.get("id");
            let branch_status: String = branch_row.get("status");
            let mut branch = GitBranch {
                id: branch_id.clone(),
                project_id: id.clone(),
                name: branch_row.get("name"),
                description: branch_row.get("description"),
                assigned_agent_id: branch_row.get("assigned_agent_id"),
                status: TaskStatus::parse(&branch_status)?,
                task_count: branch_row.get::<i64, _>("task_count") as u32,
                completed_task_count: branch_row.get::<i64, _>("completed_task_count") as u32,
                tasks: BTreeMap::new(),
                created_at: branch_row.get("created_at"),
                updated_at: branch_row.get("updated_at"),
            };

            let task_rows = sqlx::query("SELECT * FROM tasks WHERE branch_id = ?")
                .bind(&branch_id)
                .fetch_all(&*self.pool)
                .await
                .map_err(map_sqlx_error)?;
            for task_row in &task_rows {
                let task = row_to_task(task_row)?;
                branch.tasks.insert(task.id.clone(), task);
            }
            branch.task_count = branch.tasks.len() as u32;
            branch.completed_task_count =
                branch.tasks.values().filter(|t| t.is_completed()).count() as u32;

            project.add_branch(branch);
        }

        let agent_rows = sqlx::query("SELECT * FROM agents WHERE project_id = ?")
            .bind(&id)
            .fetch_all(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for agent_row in &agent_rows {
            let agent = row_to_agent(agent_row)?;
            project.agents.insert(agent.id.clone(), agent);
        }

        let session_rows = sqlx::query(
            "SELECT * FROM work_sessions WHERE project_id = ? AND status IN ('active', 'paused')",
        )
        .bind(&id)
        .fetch_all(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;
        for session_row in &session_rows {
            let session = row_to_session(session_row)?;
            project.active_sessions.insert(session.id.clone(), session);
        }

        Ok(project)
    }

    async fn upsert_session(
        &self,
        project_id: &str,
        user_id: &str,
        session: &WorkSession,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO work_sessions (
                id, project_id, user_id, agent_id, task_id, branch_id,
                started_at, status, ended_at, paused_at, total_paused_seconds,
                session_notes, progress_updates, resources_locked,
                max_duration_seconds, last_activity
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                ended_at = excluded.ended_at,
                paused_at = excluded.paused_at,
                total_paused_seconds = excluded.total_paused_seconds,
                session_notes = excluded.session_notes,
                progress_updates = excluded.progress_updates,
                resources_locked = excluded.resources_locked,
                max_duration_seconds = excluded.max_duration_seconds,
                last_activity = excluded.last_activity
            "#,
        )
        .bind(&session.id)
        .bind(project_id)
        .bind(user_id)
        .bind(&session.agent_id)
        .bind(&session.task_id)
        .bind(&session.branch_id)
        .bind(session.started_at.to_rfc3339())
        .bind(session.status.as_str())
        .bind(session.ended_at.map(|t| t.to_rfc3339()))
        .bind(session.paused_at.map(|t| t.to_rfc3339()))
        .bind(session.total_paused_duration.num_seconds())
        .bind(&session.session_notes)
        .bind(to_json_text(&session.progress_updates)?)
        .bind(to_json_text(&session.resources_locked)?)
        .bind(session.max_duration.map(|d| d.num_seconds()))
        .bind(session.last_activity.to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn row_to_agent(row: &SqliteRow) -> Result<Agent> {
    let status: String = row.get("status");
    let priority_preference: Option<String> = row.get("priority_preference");

    Ok(Agent {
        id: row.get("id"),
        name: row.get("name"),
        capabilities: json_column(row, "capabilities")?,
        preferred_languages: json_column(row, "preferred_languages")?,
        status: match status.as_str() {
            "busy" => AgentStatus::Busy,
            "offline" => AgentStatus::Offline,
            _ => AgentStatus::Available,
        },
        active_tasks: json_column(row, "active_tasks")?,
        priority_preference: match priority_preference {
            Some(raw) => Some(Priority::parse(&raw)?),
            None => None,
        },
        max_concurrent_tasks: row.get::<i64, _>("max_concurrent_tasks") as u32,
        registered_at: row.get("registered_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_session(row: &SqliteRow) -> Result<WorkSession> {
    let status: String = row.get("status");
    let ended_at: Option<DateTime<Utc>> = row.get("ended_at");
    let paused_at: Option<DateTime<Utc>> = row.get("paused_at");
    let max_duration: Option<i64> = row.get("max_duration_seconds");

    Ok(WorkSession {
        id: row.get("id"),
        agent_id: row.get("agent_id"),
        task_id: row.get("task_id"),
        branch_id: row.get("branch_id"),
        started_at: row.get("started_at"),
        status: match status.as_str() {
            "paused" => SessionStatus::Paused,
            "completed" => SessionStatus::Completed,
            "cancelled" => SessionStatus::Cancelled,
            "timeout" => SessionStatus::Timeout,
            _ => SessionStatus::Active,
        },
        ended_at,
        paused_at,
        total_paused_duration: Duration::seconds(row.get::<i64, _>("total_paused_seconds")),
        session_notes: row.get("session_notes"),
        progress_updates: json_column(row, "progress_updates")?,
        resources_locked: json_column(row, "resources_locked")?,
        max_duration: max_duration.map(Duration::seconds),
        last_activity: row.get("last_activity"),
    })
}

#[async_trait]
impl ProjectRepository for SqliteProjectRepository {
    async fn save(&self, project: &Project) -> Result<()> {
        let user_id = self.scope.require_user()?.to_string();
        if let Some(owner) = self.owner_of(&project.id).await? {
            self.scope.owns(&owner)?;
        }

        let metadata = to_json_text(&project.metadata)?;
        let dependencies = to_json_text(&project.cross_tree_dependencies)?;
        let locks = to_json_text(&project.resource_locks)?;

        let pool = self.pool.clone();
        with_retry("projects.save", || {
            let pool = pool.clone();
            let user_id = user_id.clone();
            let metadata = metadata.clone();
            let dependencies = dependencies.clone();
            let locks = locks.clone();
            async move {
                sqlx::query(
                    r#"
                    INSERT INTO projects (
                        id, user_id, name, description, status, metadata,
                        cross_tree_dependencies, resource_locks, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        description = excluded.description,
                        status = excluded.status,
                        metadata = excluded.metadata,
                        cross_tree_dependencies = excluded.cross_tree_dependencies,
                        resource_locks = excluded.resource_locks,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(&project.id)
                .bind(&user_id)
                .bind(&project.name)
                .bind(&project.description)
                .bind(match project.status {
                    ProjectStatus::Active => "active",
                    ProjectStatus::Archived => "archived",
                })
                .bind(metadata)
                .bind(dependencies)
                .bind(locks)
                .bind(project.created_at.to_rfc3339())
                .bind(project.updated_at.to_rfc3339())
                .execute(&*pool)
                .await
                .map_err(map_sqlx_error)?;
                Ok(())
            }
        })
        .await?;

        // Branches: upsert present ones, remove those gone from the
        // aggregate (cascades their tasks by foreign key).
        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM git_branches WHERE project_id = ?")
                .bind(&project.id)
                .fetch_all(&*self.pool)
                .await
                .map_err(map_sqlx_error)?;
        for (branch_id,) in existing {
            if !project.branches.contains_key(&branch_id) {
                sqlx::query("DELETE FROM git_branches WHERE id = ?")
                    .bind(&branch_id)
                    .execute(&*self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            }
        }

        for branch in project.branches.values() {
            sqlx::query(
                r#"
                INSERT INTO git_branches (
                    id, project_id, user_id, name, description, assigned_agent_id,
                    status, task_count, completed_task_count, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    assigned_agent_id = excluded.assigned_agent_id,
                    status = excluded.status,
                    task_count = excluded.task_count,
                    completed_task_count = excluded.completed_task_count,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&branch.id)
            .bind(&project.id)
            .bind(&user_id)
            .bind(&branch.name)
            .bind(&branch.description)
            .bind(project.assignments.get(&branch.id).map(|s| s.as_str()))
            .bind(branch.status.as_str())
            .bind(branch.task_count as i64)
            .bind(branch.completed_task_count as i64)
            .bind(branch.created_at.to_rfc3339())
            .bind(branch.updated_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }

        // Agents: registry replacement is simplest and matches the
        // idempotent register semantics.
        sqlx::query("DELETE FROM agents WHERE project_id = ?")
            .bind(&project.id)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for agent in project.agents.values() {
            sqlx::query(
                r#"
                INSERT INTO agents (
                    id, project_id, user_id, name, capabilities, preferred_languages,
                    status, active_tasks, priority_preference, max_concurrent_tasks,
                    registered_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&agent.id)
            .bind(&project.id)
            .bind(&user_id)
            .bind(&agent.name)
            .bind(to_json_text(&agent.capabilities)?)
            .bind(to_json_text(&agent.preferred_languages)?)
            .bind(match agent.status {
                AgentStatus::Available => "available",
                AgentStatus::Busy => "busy",
                AgentStatus::Offline => "offline",
            })
            .bind(to_json_text(&agent.active_tasks)?)
            .bind(agent.priority_preference.map(|p| p.as_str()))
            .bind(agent.max_concurrent_tasks as i64)
            .bind(agent.registered_at.to_rfc3339())
            .bind(agent.updated_at.to_rfc3339())
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        }

        for session in project.active_sessions.values() {
            self.upsert_session(&project.id, &user_id, session).await?;
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Project>> {
        let mut query = String::from("SELECT * FROM projects WHERE id = ?");
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }

        let mut q = sqlx::query(&query).bind(id);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }

        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        match row {
            Some(row) => Ok(Some(self.load_aggregate(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<Project>> {
        let mut query = String::from("SELECT * FROM projects");
        if !self.scope.is_system() {
            query.push_str(" WHERE user_id = ?");
        }
        query.push_str(" ORDER BY created_at ASC");

        let mut q = sqlx::query(&query);
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }

        let rows = q.fetch_all(&*self.pool).await.map_err(map_sqlx_error)?;
        let mut projects = Vec::with_capacity(rows.len());
        for row in &rows {
            projects.push(self.load_aggregate(row).await?);
        }
        Ok(projects)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.owner_of(id).await? {
            None => return Err(DomainError::not_found("Project", id)),
            Some(owner) => self.scope.owns(&owner)?,
        }
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn save_session(&self, project_id: &str, session: &WorkSession) -> Result<()> {
        let user_id = self.scope.require_user()?.to_string();
        self.upsert_session(project_id, &user_id, session).await
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| DomainError::Database(format!("health check failed: {e}")))?;
        Ok(())
    }
}
