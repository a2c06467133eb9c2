use crate::common::{json_column, map_sqlx_error};
use async_trait::async_trait;
use hive_core::context::{ContextCacheEntry, ContextLevel};
use hive_core::error::Result;
use hive_core::repository::{ContextCacheRepository, Scope};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// SQLite implementation of [`ContextCacheRepository`]. Rows are per-user
/// and keyed by `(context_id, context_level)`; the table is internal and
/// may be rebuilt at will.
#[derive(Clone)]
pub struct SqliteContextCacheRepository {
    pool: Arc<SqlitePool>,
    scope: Scope,
}

impl SqliteContextCacheRepository {
    pub fn new(pool: Arc<SqlitePool>, scope: Scope) -> Self {
        Self { pool, scope }
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<ContextCacheEntry> {
    let level: String = row.get("context_level");
    Ok(ContextCacheEntry {
        context_id: row.get("context_id"),
        level: ContextLevel::parse(&level)?,
        user_id: row.get("user_id"),
        resolved_context: json_column(row, "resolved_context")?,
        dependencies_hash: row.get("dependencies_hash"),
        resolution_path: json_column(row, "resolution_path")?,
        parent_chain: json_column(row, "parent_chain")?,
        expires_at: row.get("expires_at"),
        hit_count: row.get("hit_count"),
        last_hit: row.get("last_hit"),
        cache_size_bytes: row.get("cache_size_bytes"),
        invalidated: row.get::<i64, _>("invalidated") != 0,
        invalidation_reason: row.get("invalidation_reason"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ContextCacheRepository for SqliteContextCacheRepository {
    async fn get(&self, context_id: &str, level: ContextLevel) -> Result<Option<ContextCacheEntry>> {
        let mut query = String::from(
            "SELECT * FROM context_inheritance_cache WHERE context_id = ? AND context_level = ?",
        );
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }

        let mut q = sqlx::query(&query).bind(context_id).bind(level.as_str());
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        let row = q.fetch_optional(&*self.pool).await.map_err(map_sqlx_error)?;
        row.map(|r| row_to_entry(&r)).transpose()
    }

    async fn put(&self, entry: &ContextCacheEntry) -> Result<()> {
        let user = self.scope.require_user()?;
        let resolved = serde_json::to_string(&entry.resolved_context)
            .map_err(|e| hive_core::DomainError::Serialization(e.to_string()))?;
        let path = serde_json::to_string(&entry.resolution_path)
            .map_err(|e| hive_core::DomainError::Serialization(e.to_string()))?;
        let chain = serde_json::to_string(&entry.parent_chain)
            .map_err(|e| hive_core::DomainError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO context_inheritance_cache (
                context_id, context_level, user_id, resolved_context,
                dependencies_hash, resolution_path, parent_chain, expires_at,
                hit_count, last_hit, cache_size_bytes, invalidated,
                invalidation_reason, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(context_id, context_level) DO UPDATE SET
                resolved_context = excluded.resolved_context,
                dependencies_hash = excluded.dependencies_hash,
                resolution_path = excluded.resolution_path,
                parent_chain = excluded.parent_chain,
                expires_at = excluded.expires_at,
                hit_count = excluded.hit_count,
                last_hit = excluded.last_hit,
                cache_size_bytes = excluded.cache_size_bytes,
                invalidated = excluded.invalidated,
                invalidation_reason = excluded.invalidation_reason,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&entry.context_id)
        .bind(entry.level.as_str())
        .bind(user)
        .bind(&resolved)
        .bind(&entry.dependencies_hash)
        .bind(&path)
        .bind(&chain)
        .bind(entry.expires_at.to_rfc3339())
        .bind(entry.hit_count)
        .bind(entry.last_hit.map(|t| t.to_rfc3339()))
        .bind(entry.cache_size_bytes)
        .bind(entry.invalidated as i64)
        .bind(&entry.invalidation_reason)
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.updated_at.to_rfc3339())
        .execute(&*self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn record_hit(&self, context_id: &str, level: ContextLevel) -> Result<()> {
        let mut query = String::from(
            "UPDATE context_inheritance_cache SET hit_count = hit_count + 1, last_hit = ? WHERE context_id = ? AND context_level = ?",
        );
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }

        let mut q = sqlx::query(&query)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(context_id)
            .bind(level.as_str());
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        q.execute(&*self.pool).await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn invalidate(&self, context_id: &str, level: ContextLevel, reason: &str) -> Result<()> {
        let mut query = String::from(
            "UPDATE context_inheritance_cache SET invalidated = 1, invalidation_reason = ?, updated_at = ? WHERE context_id = ? AND context_level = ?",
        );
        if !self.scope.is_system() {
            query.push_str(" AND user_id = ?");
        }

        let mut q = sqlx::query(&query)
            .bind(reason)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(context_id)
            .bind(level.as_str());
        if let Some(user) = self.scope.user_id() {
            q = q.bind(user);
        }
        q.execute(&*self.pool).await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn entry(context_id: &str) -> ContextCacheEntry {
        let now = Utc::now();
        let resolved = json!({"sections": {"task_data": {"step": 1}}});
        ContextCacheEntry {
            context_id: context_id.to_string(),
            level: ContextLevel::Task,
            user_id: "u1".into(),
            resolved_context: resolved.clone(),
            dependencies_hash: "hash-1".into(),
            resolution_path: vec!["global:g".into(), "task:t".into()],
            parent_chain: vec!["g".into()],
            expires_at: now + Duration::seconds(300),
            hit_count: 0,
            last_hit: None,
            cache_size_bytes: resolved.to_string().len() as i64,
            invalidated: false,
            invalidation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_put_get_and_hits() {
        let pool = Arc::new(test_pool().await);
        let repo = SqliteContextCacheRepository::new(pool, Scope::user("u1"));

        let id = hive_core::id::new_id();
        repo.put(&entry(&id)).await.unwrap();

        let loaded = repo.get(&id, ContextLevel::Task).await.unwrap().unwrap();
        assert!(loaded.is_live(Utc::now()));
        assert_eq!(loaded.dependencies_hash, "hash-1");
        assert_eq!(loaded.parent_chain, vec!["g"]);

        repo.record_hit(&id, ContextLevel::Task).await.unwrap();
        let loaded = repo.get(&id, ContextLevel::Task).await.unwrap().unwrap();
        assert_eq!(loaded.hit_count, 1);
        assert!(loaded.last_hit.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_marks_entry() {
        let pool = Arc::new(test_pool().await);
        let repo = SqliteContextCacheRepository::new(pool, Scope::user("u1"));

        let id = hive_core::id::new_id();
        repo.put(&entry(&id)).await.unwrap();
        repo.invalidate(&id, ContextLevel::Task, "parent context written").await.unwrap();

        let loaded = repo.get(&id, ContextLevel::Task).await.unwrap().unwrap();
        assert!(loaded.invalidated);
        assert!(!loaded.is_live(Utc::now()));
        assert_eq!(loaded.invalidation_reason.as_deref(), Some("parent context written"));
    }

    #[tokio::test]
    async fn test_put_replaces_row() {
        let pool = Arc::new(test_pool().await);
        let repo = SqliteContextCacheRepository::new(pool, Scope::user("u1"));

        let id = hive_core::id::new_id();
        repo.put(&entry(&id)).await.unwrap();

        let mut fresh = entry(&id);
        fresh.dependencies_hash = "hash-2".into();
        fresh.invalidated = false;
        repo.put(&fresh).await.unwrap();

        let loaded = repo.get(&id, ContextLevel::Task).await.unwrap().unwrap();
        assert_eq!(loaded.dependencies_hash, "hash-2");
        assert!(!loaded.invalidated);
    }

    #[tokio::test]
    async fn test_cache_rows_are_per_user() {
        let pool = Arc::new(test_pool().await);
        let repo_u1 = SqliteContextCacheRepository::new(pool.clone(), Scope::user("u1"));
        let repo_u2 = SqliteContextCacheRepository::new(pool, Scope::user("u2"));

        let id = hive_core::id::new_id();
        repo_u1.put(&entry(&id)).await.unwrap();
        assert!(repo_u2.get(&id, ContextLevel::Task).await.unwrap().is_none());
    }
}
