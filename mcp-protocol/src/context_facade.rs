use crate::context_service::ContextService;
use async_trait::async_trait;
use hive_core::context::{ContextDelegation, DelegationTrigger};
use hive_core::error::Result;
use hive_core::protocol::{
    AddContextProgressParams, ContextProtocol, DelegateContextParams, InvalidateContextParams,
    ResolveContextParams, UpdateSectionParams,
};
use hive_core::repository::{ContextCacheRepository, ContextRepository, DelegationRepository};
use serde_json::Value;
use std::sync::Arc;

/// Facade for the manage_context surface. All logic lives in
/// [`ContextService`]; this adapter only maps parameters.
pub struct ContextFacade<C, K, D> {
    service: Arc<ContextService<C, K, D>>,
}

impl<C, K, D> ContextFacade<C, K, D>
where
    C: ContextRepository,
    K: ContextCacheRepository,
    D: DelegationRepository,
{
    pub fn new(service: Arc<ContextService<C, K, D>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<C, K, D> ContextProtocol for ContextFacade<C, K, D>
where
    C: ContextRepository + Send + Sync,
    K: ContextCacheRepository + Send + Sync,
    D: DelegationRepository + Send + Sync,
{
    async fn resolve_context(&self, params: ResolveContextParams) -> Result<Value> {
        self.service
            .resolve(params.level, &params.context_id, params.include_inherited)
            .await
    }

    async fn add_progress(&self, params: AddContextProgressParams) -> Result<Value> {
        self.service
            .add_progress(
                params.level,
                &params.context_id,
                &params.content,
                params.agent_id.as_deref(),
            )
            .await
    }

    async fn update_section(&self, params: UpdateSectionParams) -> Result<Value> {
        self.service
            .update_section(params.level, &params.context_id, &params.section, &params.data)
            .await
    }

    async fn delegate_context(&self, params: DelegateContextParams) -> Result<ContextDelegation> {
        let trigger = DelegationTrigger::parse(&params.trigger_type)?;
        self.service
            .delegate(
                params.source_level,
                &params.source_id,
                params.target_level,
                &params.target_id,
                params.data,
                &params.reason,
                trigger,
            )
            .await
    }

    async fn invalidate_context(&self, params: InvalidateContextParams) -> Result<()> {
        self.service
            .invalidate(params.level, &params.context_id, params.reason.as_deref())
            .await
    }
}
