use chrono::{Duration, Utc};
use hive_core::context::{
    resolve_chain, BranchContext, ContextCacheEntry, ContextDelegation, ContextLevel, ContextNode,
    DelegationTrigger, GlobalContext, ProjectContext, ResolvedContext, TaskContext,
};
use hive_core::error::{DomainError, Result};
use hive_core::repository::{ContextCacheRepository, ContextRepository, DelegationRepository, Scope};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of attempts to land a cache write before returning the fresh
/// value uncached.
const CACHE_WRITE_ATTEMPTS: u8 = 3;

/// The context engine's application service: inheritance resolution with
/// the cache contract, mark-invalidation cascades, section updates and
/// delegation processing. All rows are scoped to the authenticated user.
pub struct ContextService<C, K, D> {
    contexts: Arc<C>,
    cache: Arc<K>,
    delegations: Arc<D>,
    scope: Scope,
    cache_ttl: Duration,
}

impl<C, K, D> ContextService<C, K, D>
where
    C: ContextRepository,
    K: ContextCacheRepository,
    D: DelegationRepository,
{
    pub fn new(
        contexts: Arc<C>,
        cache: Arc<K>,
        delegations: Arc<D>,
        scope: Scope,
        cache_ttl_seconds: i64,
    ) -> Self {
        Self {
            contexts,
            cache,
            delegations,
            scope,
            cache_ttl: Duration::seconds(cache_ttl_seconds),
        }
    }

    /// Load the chain for a context, root first, following the parent
    /// pointers upward from the leaf.
    async fn load_chain(&self, level: ContextLevel, context_id: &str) -> Result<Vec<ContextNode>> {
        let mut chain: Vec<ContextNode> = Vec::new();

        match level {
            ContextLevel::Global => {
                let global = self
                    .contexts
                    .find_global_by_id(context_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("GlobalContext", context_id))?;
                chain.push(global.node());
            }
            ContextLevel::Project => {
                let project = self
                    .contexts
                    .find_project_context(context_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("ProjectContext", context_id))?;
                if let Some(global_id) = &project.parent_global_id {
                    if let Some(global) = self.contexts.find_global_by_id(global_id).await? {
                        chain.push(global.node());
                    }
                }
                chain.push(project.node());
            }
            ContextLevel::Branch => {
                let branch = self
                    .contexts
                    .find_branch_context(context_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("BranchContext", context_id))?;
                if let Some(project_id) = branch.parent_project_id.clone() {
                    let mut upper = Box::pin(self.load_chain(ContextLevel::Project, &project_id));
                    match upper.as_mut().await {
                        Ok(parents) => chain.extend(parents),
                        Err(error) if error.is_not_found() => {
                            debug!(%project_id, "parent project context missing, truncating chain");
                        }
                        Err(error) => return Err(error),
                    }
                }
                chain.push(branch.node());
            }
            ContextLevel::Task => {
                let task = self
                    .contexts
                    .find_task_context(context_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("TaskContext", context_id))?;
                if let Some(branch_ctx_id) = task.parent_branch_context_id.clone() {
                    let mut upper = Box::pin(self.load_chain(ContextLevel::Branch, &branch_ctx_id));
                    match upper.as_mut().await {
                        Ok(parents) => chain.extend(parents),
                        Err(error) if error.is_not_found() => {
                            debug!(%branch_ctx_id, "parent branch context missing, truncating chain");
                        }
                        Err(error) => return Err(error),
                    }
                }
                chain.push(task.node());
            }
        }

        Ok(chain)
    }

    async fn resolve_fresh(
        &self,
        level: ContextLevel,
        context_id: &str,
    ) -> Result<ResolvedContext> {
        let chain = self.load_chain(level, context_id).await?;
        resolve_chain(&chain)
            .ok_or_else(|| DomainError::not_found(&format!("{level} context"), context_id))
    }

    /// Resolve a context through the inheritance cache.
    ///
    /// Cache contract: a live entry with a matching dependencies hash is a
    /// hit. On miss, the fresh resolution is written back; when ancestors
    /// move under the resolver the write is discarded and retried, bounded,
    /// then the fresh value is returned uncached.
    pub async fn resolve(
        &self,
        level: ContextLevel,
        context_id: &str,
        include_inherited: bool,
    ) -> Result<Value> {
        if !include_inherited {
            // Leaf only: no inheritance, no cache involvement.
            let chain = self.load_chain(level, context_id).await?;
            let leaf = chain.last().cloned().ok_or_else(|| {
                DomainError::not_found(&format!("{level} context"), context_id)
            })?;
            let resolved = resolve_chain(&[leaf])
                .ok_or_else(|| DomainError::not_found(&format!("{level} context"), context_id))?;
            return Ok(resolved.resolved);
        }

        // 1. Hash the traversed (level, id, version) chain.
        let chain = self.load_chain(level, context_id).await?;
        let chain_refs: Vec<&ContextNode> = chain.iter().collect();
        let current_hash = hive_core::context::dependencies_hash(&chain_refs);

        // 2. A live entry with an equal hash is a hit.
        if let Some(entry) = self.cache.get(context_id, level).await? {
            if entry.is_live(Utc::now()) && entry.dependencies_hash == current_hash {
                self.cache.record_hit(context_id, level).await?;
                debug!(%context_id, %level, "inheritance cache hit");
                return Ok(entry.resolved_context);
            }
        }

        // 3. Miss: merge the chain.
        let mut resolved = resolve_chain(&chain)
            .ok_or_else(|| DomainError::not_found(&format!("{level} context"), context_id))?;

        // 4. Write back, discarding the write if an ancestor advanced
        //    while resolution ran.
        let user_id = self.scope.require_user()?.to_string();
        for attempt in 0..CACHE_WRITE_ATTEMPTS {
            let verify = self.resolve_fresh(level, context_id).await?;
            if verify.dependencies_hash != resolved.dependencies_hash {
                warn!(%context_id, %level, attempt, "ancestor moved during resolution, retrying");
                resolved = verify;
                continue;
            }

            let now = Utc::now();
            let size = resolved.resolved.to_string().len() as i64;
            let entry = ContextCacheEntry {
                context_id: context_id.to_string(),
                level,
                user_id: user_id.clone(),
                resolved_context: resolved.resolved.clone(),
                dependencies_hash: resolved.dependencies_hash.clone(),
                resolution_path: resolved.resolution_path.clone(),
                parent_chain: resolved.parent_chain.clone(),
                expires_at: now + self.cache_ttl,
                hit_count: 0,
                last_hit: None,
                cache_size_bytes: size,
                invalidated: false,
                invalidation_reason: None,
                created_at: now,
                updated_at: now,
            };
            self.cache.put(&entry).await?;
            return Ok(resolved.resolved);
        }

        // Retries exhausted: serve the freshly-resolved value uncached.
        Ok(resolved.resolved)
    }

    /// Mark-invalidate the cache for a context write, cascading to every
    /// descendant whose resolved view can change.
    pub async fn invalidate_cascade(
        &self,
        level: ContextLevel,
        context_id: &str,
        reason: &str,
    ) -> Result<()> {
        info!(%context_id, %level, %reason, "invalidating inheritance cache subtree");
        self.cache.invalidate(context_id, level, reason).await?;

        match level {
            ContextLevel::Task => {}
            ContextLevel::Branch => {
                for task in self.contexts.find_task_contexts_by_parent(context_id).await? {
                    self.cache.invalidate(&task.id, ContextLevel::Task, reason).await?;
                }
            }
            ContextLevel::Project => {
                for branch in self.contexts.find_branch_contexts_by_parent(context_id).await? {
                    self.cache.invalidate(&branch.id, ContextLevel::Branch, reason).await?;
                    for task in self.contexts.find_task_contexts_by_parent(&branch.id).await? {
                        self.cache.invalidate(&task.id, ContextLevel::Task, reason).await?;
                    }
                }
            }
            ContextLevel::Global => {
                for project in self.contexts.find_project_contexts_by_parent(context_id).await? {
                    self.cache.invalidate(&project.id, ContextLevel::Project, reason).await?;
                    for branch in
                        self.contexts.find_branch_contexts_by_parent(&project.id).await?
                    {
                        self.cache.invalidate(&branch.id, ContextLevel::Branch, reason).await?;
                        for task in
                            self.contexts.find_task_contexts_by_parent(&branch.id).await?
                        {
                            self.cache.invalidate(&task.id, ContextLevel::Task, reason).await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Merge data into one named section, creating the context row when it
    /// does not exist yet. Version conflicts are retried by re-reading.
    pub async fn update_section(
        &self,
        level: ContextLevel,
        context_id: &str,
        section: &str,
        data: &Value,
    ) -> Result<Value> {
        let user_id = self.scope.require_user()?.to_string();

        for _attempt in 0..CACHE_WRITE_ATTEMPTS {
            let result = match level {
                ContextLevel::Global => {
                    let mut ctx = match self.contexts.find_global_by_id(context_id).await? {
                        Some(ctx) => {
                            self.scope.owns(&ctx.user_id)?;
                            ctx
                        }
                        None => GlobalContext::new(context_id.to_string(), user_id.clone()),
                    };
                    ctx.merge_into_section(section, data)?;
                    self.contexts.save_global(&ctx).await
                }
                ContextLevel::Project => {
                    let mut ctx = match self.contexts.find_project_context(context_id).await? {
                        Some(ctx) => {
                            self.scope.owns(&ctx.user_id)?;
                            ctx
                        }
                        None => ProjectContext::new(
                            context_id.to_string(),
                            user_id.clone(),
                            context_id.to_string(),
                            None,
                        ),
                    };
                    ctx.merge_into_section(section, data)?;
                    self.contexts.save_project_context(&ctx).await
                }
                ContextLevel::Branch => {
                    let mut ctx = match self.contexts.find_branch_context(context_id).await? {
                        Some(ctx) => {
                            self.scope.owns(&ctx.user_id)?;
                            ctx
                        }
                        None => BranchContext::new(
                            context_id.to_string(),
                            user_id.clone(),
                            context_id.to_string(),
                            None,
                        ),
                    };
                    ctx.merge_into_section(section, data)?;
                    self.contexts.save_branch_context(&ctx).await
                }
                ContextLevel::Task => {
                    let mut ctx = match self.contexts.find_task_context(context_id).await? {
                        Some(ctx) => {
                            self.scope.owns(&ctx.user_id)?;
                            ctx
                        }
                        None => TaskContext::new(
                            context_id.to_string(),
                            user_id.clone(),
                            context_id.to_string(),
                            None,
                            None,
                        ),
                    };
                    ctx.merge_into_section(section, data)?;
                    self.contexts.save_task_context(&ctx).await
                }
            };

            match result {
                Ok(()) => {
                    self.invalidate_cascade(level, context_id, "context section updated").await?;
                    return self.resolve(level, context_id, true).await;
                }
                Err(error) if error.is_conflict() => {
                    debug!(%context_id, %level, "concurrent context write, re-reading");
                    continue;
                }
                Err(error) => return Err(error),
            }
        }

        Err(DomainError::Conflict(format!(
            "context {context_id} kept moving under concurrent writers"
        )))
    }

    /// Append a timestamped progress note to the level's designated
    /// section.
    pub async fn add_progress(
        &self,
        level: ContextLevel,
        context_id: &str,
        content: &str,
        agent_id: Option<&str>,
    ) -> Result<Value> {
        if content.trim().is_empty() {
            return Err(DomainError::empty_field("content"));
        }

        let section = match level {
            ContextLevel::Global => "shared_resources",
            ContextLevel::Project => "project_info",
            ContextLevel::Branch => "branch_info",
            ContextLevel::Task => "execution_context",
        };

        // Read-modify-write: progress entries are an append-only array and
        // arrays replace on merge.
        let existing = self
            .resolve(level, context_id, false)
            .await
            .ok()
            .and_then(|v| v["sections"][section]["progress"].as_array().cloned())
            .unwrap_or_default();

        let mut entries = existing;
        entries.push(json!({
            "timestamp": Utc::now().to_rfc3339(),
            "content": content,
            "agent_id": agent_id,
        }));

        self.update_section(level, context_id, section, &json!({ "progress": entries })).await
    }

    /// Record a delegation; auto triggers are processed immediately, manual
    /// ones wait for approval.
    pub async fn delegate(
        &self,
        source_level: ContextLevel,
        source_id: &str,
        target_level: ContextLevel,
        target_id: &str,
        data: Value,
        reason: &str,
        trigger: DelegationTrigger,
    ) -> Result<ContextDelegation> {
        let user_id = self.scope.require_user()?.to_string();
        let mut delegation = ContextDelegation::create(
            user_id,
            source_level,
            source_id.to_string(),
            target_level,
            target_id.to_string(),
            data,
            reason.to_string(),
            trigger,
        )?;

        if delegation.requires_approval() {
            self.delegations.save(&delegation).await?;
            return Ok(delegation);
        }

        self.process_delegation(&mut delegation).await?;
        Ok(delegation)
    }

    /// Approve a pending manual delegation and process it.
    pub async fn approve_delegation(&self, delegation_id: &str) -> Result<ContextDelegation> {
        let mut delegation = self
            .delegations
            .find_by_id(delegation_id)
            .await?
            .ok_or_else(|| DomainError::not_found("ContextDelegation", delegation_id))?;
        self.scope.owns(&delegation.user_id)?;

        if delegation.processed {
            return Ok(delegation);
        }
        delegation.approve();
        self.process_delegation(&mut delegation).await?;
        Ok(delegation)
    }

    /// Merge the delegated data into the target level's sections and mark
    /// the record processed; a failed merge records the error instead.
    /// Successful promotion invalidates the target's subtree.
    async fn process_delegation(&self, delegation: &mut ContextDelegation) -> Result<()> {
        let data = delegation.delegated_data.clone();
        let object = data.as_object().cloned().unwrap_or_default();

        let mut merge_result: Result<()> = Ok(());
        for (section, value) in &object {
            if let Err(error) = self
                .update_section(delegation.target_level, &delegation.target_id, section, value)
                .await
            {
                merge_result = Err(error);
                break;
            }
        }

        match merge_result {
            Ok(()) => {
                delegation.mark_processed();
                self.invalidate_cascade(
                    delegation.target_level,
                    &delegation.target_id,
                    "delegated data promoted",
                )
                .await?;
            }
            Err(error) => {
                delegation.mark_failed(&error.to_string());
            }
        }

        self.delegations.save(delegation).await?;
        Ok(())
    }

    /// Explicit invalidation entry point for the manage_context surface.
    pub async fn invalidate(
        &self,
        level: ContextLevel,
        context_id: &str,
        reason: Option<&str>,
    ) -> Result<()> {
        self.invalidate_cascade(level, context_id, reason.unwrap_or("explicit invalidation")).await
    }

    /// Bootstrap helper: create a task context bound to a task if missing.
    pub async fn ensure_task_context(
        &self,
        task_id: &str,
        parent_branch_id: Option<&str>,
        parent_branch_context_id: Option<&str>,
    ) -> Result<TaskContext> {
        if let Some(existing) = self.contexts.find_task_context(task_id).await? {
            self.scope.owns(&existing.user_id)?;
            return Ok(existing);
        }

        let user_id = self.scope.require_user()?.to_string();
        let ctx = TaskContext::new(
            task_id.to_string(),
            user_id,
            task_id.to_string(),
            parent_branch_id.map(|s| s.to_string()),
            parent_branch_context_id.map(|s| s.to_string()),
        );
        self.contexts.save_task_context(&ctx).await?;
        Ok(ctx)
    }

    /// Latest update timestamp of a task context, used by task completion
    /// to verify context freshness.
    pub async fn task_context_updated_at(
        &self,
        context_id: &str,
    ) -> Result<Option<chrono::DateTime<Utc>>> {
        Ok(self.contexts.find_task_context(context_id).await?.map(|c| c.updated_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hive_core::id::new_id;
    use hive_mocks::{MockContextCacheRepository, MockContextRepository, MockDelegationRepository};

    fn service(
        contexts: Arc<MockContextRepository>,
    ) -> (
        ContextService<MockContextRepository, MockContextCacheRepository, MockDelegationRepository>,
        Arc<MockContextCacheRepository>,
    ) {
        let cache = Arc::new(MockContextCacheRepository::new());
        let delegations = Arc::new(MockDelegationRepository::new());
        let svc = ContextService::new(
            contexts,
            cache.clone(),
            delegations,
            Scope::user("u1"),
            300,
        );
        (svc, cache)
    }

    async fn seed_chain(contexts: &MockContextRepository) -> (String, String, String, String) {
        let mut global = GlobalContext::new(new_id(), "u1".into());
        global
            .merge_into_section("organization_standards", &json!({"review": "mandatory"}))
            .unwrap();
        contexts.save_global(&global).await.unwrap();

        let mut project = ProjectContext::new(new_id(), "u1".into(), new_id(), Some(global.id.clone()));
        project.merge_into_section("technology_stack", &json!({"language": "rust"})).unwrap();
        contexts.save_project_context(&project).await.unwrap();

        let mut branch = BranchContext::new(new_id(), "u1".into(), new_id(), Some(project.id.clone()));
        branch.merge_into_section("feature_flags", &json!({"beta": true})).unwrap();
        contexts.save_branch_context(&branch).await.unwrap();

        let mut task = TaskContext::new(
            new_id(),
            "u1".into(),
            new_id(),
            Some(branch.branch_id.clone()),
            Some(branch.id.clone()),
        );
        task.merge_into_section("task_data", &json!({"step": 1})).unwrap();
        contexts.save_task_context(&task).await.unwrap();

        (global.id, project.id, branch.id, task.id)
    }

    #[tokio::test]
    async fn test_resolve_merges_full_chain() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, _, _, task_ctx) = seed_chain(&contexts).await;
        let (svc, _) = service(contexts);

        let resolved = svc.resolve(ContextLevel::Task, &task_ctx, true).await.unwrap();
        assert_eq!(resolved["sections"]["organization_standards"]["review"], "mandatory");
        assert_eq!(resolved["sections"]["technology_stack"]["language"], "rust");
        assert_eq!(resolved["sections"]["feature_flags"]["beta"], true);
        assert_eq!(resolved["sections"]["task_data"]["step"], 1);
    }

    #[tokio::test]
    async fn test_second_resolve_is_cache_hit() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, _, _, task_ctx) = seed_chain(&contexts).await;
        let (svc, cache) = service(contexts);

        let first = svc.resolve(ContextLevel::Task, &task_ctx, true).await.unwrap();
        assert_eq!(cache.entry_count(), 1);

        let second = svc.resolve(ContextLevel::Task, &task_ctx, true).await.unwrap();
        assert_eq!(first, second);

        let entry = cache.get(&task_ctx, ContextLevel::Task).await.unwrap().unwrap();
        assert_eq!(entry.hit_count, 1);
        assert!(entry.last_hit.is_some());
    }

    #[tokio::test]
    async fn test_parent_write_invalidates_and_rehashes() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, project_ctx, _, task_ctx) = seed_chain(&contexts).await;
        let (svc, cache) = service(contexts.clone());

        svc.resolve(ContextLevel::Task, &task_ctx, true).await.unwrap();
        let before = cache.get(&task_ctx, ContextLevel::Task).await.unwrap().unwrap();

        // Write the parent project context through the service
        svc.update_section(
            ContextLevel::Project,
            &project_ctx,
            "project_settings",
            &json!({"tuned": true}),
        )
        .await
        .unwrap();

        // Resolve again: fresh computation with a new hash
        let resolved = svc.resolve(ContextLevel::Task, &task_ctx, true).await.unwrap();
        assert_eq!(resolved["sections"]["project_settings"]["tuned"], true);
        let after = cache.get(&task_ctx, ContextLevel::Task).await.unwrap().unwrap();
        assert_ne!(before.dependencies_hash, after.dependencies_hash);
    }

    #[tokio::test]
    async fn test_non_inherited_resolve_is_leaf_only() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, _, _, task_ctx) = seed_chain(&contexts).await;
        let (svc, cache) = service(contexts);

        let resolved = svc.resolve(ContextLevel::Task, &task_ctx, false).await.unwrap();
        assert_eq!(resolved["sections"]["task_data"]["step"], 1);
        assert!(resolved["sections"].get("organization_standards").is_none());
        // leaf-only resolution does not touch the cache
        assert_eq!(cache.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_global_write_cascades_to_descendants() {
        let contexts = Arc::new(MockContextRepository::new());
        let (global_ctx, project_ctx, branch_ctx, task_ctx) = seed_chain(&contexts).await;
        let (svc, cache) = service(contexts);

        // warm all four levels
        svc.resolve(ContextLevel::Task, &task_ctx, true).await.unwrap();
        svc.resolve(ContextLevel::Branch, &branch_ctx, true).await.unwrap();
        svc.resolve(ContextLevel::Project, &project_ctx, true).await.unwrap();

        svc.invalidate_cascade(ContextLevel::Global, &global_ctx, "global written").await.unwrap();

        for (id, level) in [
            (&task_ctx, ContextLevel::Task),
            (&branch_ctx, ContextLevel::Branch),
            (&project_ctx, ContextLevel::Project),
        ] {
            let entry = cache.get(id, level).await.unwrap().unwrap();
            assert!(entry.invalidated, "{level} entry should be invalidated");
            assert_eq!(entry.invalidation_reason.as_deref(), Some("global written"));
        }
    }

    #[tokio::test]
    async fn test_manual_delegation_waits_for_approval() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, _, branch_ctx, task_ctx) = seed_chain(&contexts).await;
        let (svc, _) = service(contexts.clone());

        let delegation = svc
            .delegate(
                ContextLevel::Task,
                &task_ctx,
                ContextLevel::Branch,
                &branch_ctx,
                json!({"discovered_patterns": {"pattern": "retry"}}),
                "worth sharing",
                DelegationTrigger::Manual,
            )
            .await
            .unwrap();
        assert!(!delegation.processed);

        // Target unchanged until approval
        let branch = contexts.find_branch_context(&branch_ctx).await.unwrap().unwrap();
        assert!(branch.sections["discovered_patterns"].as_object().unwrap().is_empty());

        let approved = svc.approve_delegation(&delegation.id).await.unwrap();
        assert!(approved.processed);
        let branch = contexts.find_branch_context(&branch_ctx).await.unwrap().unwrap();
        assert_eq!(branch.sections["discovered_patterns"]["pattern"], "retry");
    }

    #[tokio::test]
    async fn test_auto_delegation_processes_immediately() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, _, branch_ctx, task_ctx) = seed_chain(&contexts).await;
        let (svc, _) = service(contexts.clone());

        let delegation = svc
            .delegate(
                ContextLevel::Task,
                &task_ctx,
                ContextLevel::Branch,
                &branch_ctx,
                json!({"active_patterns": {"retry": true}}),
                "threshold crossed",
                DelegationTrigger::AutoThreshold,
            )
            .await
            .unwrap();
        assert!(delegation.processed);

        let branch = contexts.find_branch_context(&branch_ctx).await.unwrap().unwrap();
        assert_eq!(branch.sections["active_patterns"]["retry"], true);
    }

    #[tokio::test]
    async fn test_failed_delegation_merge_records_error() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, _, branch_ctx, task_ctx) = seed_chain(&contexts).await;
        let (svc, _) = service(contexts);

        let delegation = svc
            .delegate(
                ContextLevel::Task,
                &task_ctx,
                ContextLevel::Branch,
                &branch_ctx,
                // not a branch-level section name
                json!({"task_data": {"x": 1}}),
                "bad section",
                DelegationTrigger::AutoPattern,
            )
            .await
            .unwrap();
        assert!(!delegation.processed);
        assert_eq!(delegation.status, hive_core::context::DelegationStatus::Error);
        assert!(delegation.error_message.is_some());
    }

    #[tokio::test]
    async fn test_add_progress_appends_entries() {
        let contexts = Arc::new(MockContextRepository::new());
        let (_, _, _, task_ctx) = seed_chain(&contexts).await;
        let (svc, _) = service(contexts);

        svc.add_progress(ContextLevel::Task, &task_ctx, "started work", Some("agent-1"))
            .await
            .unwrap();
        let resolved =
            svc.add_progress(ContextLevel::Task, &task_ctx, "half done", None).await.unwrap();

        let progress = resolved["sections"]["execution_context"]["progress"].as_array().unwrap();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0]["content"], "started work");
        assert_eq!(progress[1]["content"], "half done");

        assert!(svc
            .add_progress(ContextLevel::Task, &task_ctx, "   ", None)
            .await
            .is_err());
    }
}
