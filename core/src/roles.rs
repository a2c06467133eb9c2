//! Agent-role registry.
//!
//! Assignees on tasks and subtasks are handles of the form `@<slug>` where
//! the slug belongs to this closed registry or resolves through the legacy
//! alias table. Unknown slugs are tolerated on the lenient path so existing
//! data is never dropped; the strict path rejects them.

use serde::{Deserialize, Serialize};

/// Closed set of agent roles the server knows how to route work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    // Development & coding
    AnalyticsSetup,
    Coding,
    CodeReviewer,
    Debugger,
    // Architecture & design
    CoreConcept,
    DesignSystem,
    SystemArchitect,
    UiSpecialist,
    // Testing & QA
    PerformanceLoadTester,
    TestOrchestrator,
    UatCoordinator,
    // DevOps & infrastructure
    Devops,
    // Documentation
    Documentation,
    // Project & planning
    Elicitation,
    MasterOrchestrator,
    ProjectInitiator,
    TaskPlanning,
    // Security & compliance
    ComplianceScope,
    EthicalReview,
    SecurityAuditor,
    // Analytics & optimization
    EfficiencyOptimization,
    HealthMonitor,
    // Marketing & branding
    Branding,
    CommunityStrategy,
    MarketingStrategyOrchestrator,
    // Research & analysis
    DeepResearch,
    LlmAiAgentsResearch,
    RootCauseAnalysis,
    TechnologyAdvisor,
    // AI & machine learning
    MlSpecialist,
    // Creative & ideation
    CreativeIdeation,
    // Prototyping
    Prototyping,
}

/// All roles in registry order.
pub const ALL_ROLES: &[AgentRole] = &[
    AgentRole::AnalyticsSetup,
    AgentRole::Coding,
    AgentRole::CodeReviewer,
    AgentRole::Debugger,
    AgentRole::CoreConcept,
    AgentRole::DesignSystem,
    AgentRole::SystemArchitect,
    AgentRole::UiSpecialist,
    AgentRole::PerformanceLoadTester,
    AgentRole::TestOrchestrator,
    AgentRole::UatCoordinator,
    AgentRole::Devops,
    AgentRole::Documentation,
    AgentRole::Elicitation,
    AgentRole::MasterOrchestrator,
    AgentRole::ProjectInitiator,
    AgentRole::TaskPlanning,
    AgentRole::ComplianceScope,
    AgentRole::EthicalReview,
    AgentRole::SecurityAuditor,
    AgentRole::EfficiencyOptimization,
    AgentRole::HealthMonitor,
    AgentRole::Branding,
    AgentRole::CommunityStrategy,
    AgentRole::MarketingStrategyOrchestrator,
    AgentRole::DeepResearch,
    AgentRole::LlmAiAgentsResearch,
    AgentRole::RootCauseAnalysis,
    AgentRole::TechnologyAdvisor,
    AgentRole::MlSpecialist,
    AgentRole::CreativeIdeation,
    AgentRole::Prototyping,
];

/// Legacy role names still accepted on input and mapped to current slugs.
const LEGACY_ROLE_MAPPINGS: &[(&str, &str)] = &[
    ("senior_developer", "coding-agent"),
    ("platform_engineer", "devops-agent"),
    ("qa_engineer", "test-orchestrator-agent"),
    ("code_reviewer", "code-reviewer-agent"),
    ("devops_engineer", "devops-agent"),
    ("security_engineer", "security-auditor-agent"),
    ("technical_writer", "documentation-agent"),
    ("task_planner", "task-planning-agent"),
    ("context_engineer", "core-concept-agent"),
    ("cache_engineer", "efficiency-optimization-agent"),
    ("metrics_engineer", "analytics-setup-agent"),
    ("cli_engineer", "coding-agent"),
];

impl AgentRole {
    /// The canonical kebab-case slug for this role.
    pub fn slug(&self) -> &'static str {
        match self {
            AgentRole::AnalyticsSetup => "analytics-setup-agent",
            AgentRole::Coding => "coding-agent",
            AgentRole::CodeReviewer => "code-reviewer-agent",
            AgentRole::Debugger => "debugger-agent",
            AgentRole::CoreConcept => "core-concept-agent",
            AgentRole::DesignSystem => "design-system-agent",
            AgentRole::SystemArchitect => "system-architect-agent",
            AgentRole::UiSpecialist => "ui-specialist-agent",
            AgentRole::PerformanceLoadTester => "performance-load-tester-agent",
            AgentRole::TestOrchestrator => "test-orchestrator-agent",
            AgentRole::UatCoordinator => "uat-coordinator-agent",
            AgentRole::Devops => "devops-agent",
            AgentRole::Documentation => "documentation-agent",
            AgentRole::Elicitation => "elicitation-agent",
            AgentRole::MasterOrchestrator => "master-orchestrator-agent",
            AgentRole::ProjectInitiator => "project-initiator-agent",
            AgentRole::TaskPlanning => "task-planning-agent",
            AgentRole::ComplianceScope => "compliance-scope-agent",
            AgentRole::EthicalReview => "ethical-review-agent",
            AgentRole::SecurityAuditor => "security-auditor-agent",
            AgentRole::EfficiencyOptimization => "efficiency-optimization-agent",
            AgentRole::HealthMonitor => "health-monitor-agent",
            AgentRole::Branding => "branding-agent",
            AgentRole::CommunityStrategy => "community-strategy-agent",
            AgentRole::MarketingStrategyOrchestrator => "marketing-strategy-orchestrator-agent",
            AgentRole::DeepResearch => "deep-research-agent",
            AgentRole::LlmAiAgentsResearch => "llm-ai-agents-research",
            AgentRole::RootCauseAnalysis => "root-cause-analysis-agent",
            AgentRole::TechnologyAdvisor => "technology-advisor-agent",
            AgentRole::MlSpecialist => "ml-specialist-agent",
            AgentRole::CreativeIdeation => "creative-ideation-agent",
            AgentRole::Prototyping => "prototyping-agent",
        }
    }

    /// Look a role up by its canonical slug.
    pub fn from_slug(slug: &str) -> Option<AgentRole> {
        ALL_ROLES.iter().copied().find(|r| r.slug() == slug)
    }

    /// Check whether a slug names a registered role.
    pub fn is_valid_slug(slug: &str) -> bool {
        Self::from_slug(slug).is_some()
    }

    /// The assignee handle for this role (`@<slug>`).
    pub fn handle(&self) -> String {
        format!("@{}", self.slug())
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// Resolve a possibly-legacy role name to a canonical slug.
///
/// Strips a leading `@`, then tries: the registry itself, the legacy alias
/// table, and hyphen/underscore variants. Returns `None` when nothing
/// resolves.
pub fn resolve_legacy_role(name: &str) -> Option<String> {
    let clean = name.trim().trim_start_matches('@');
    if clean.is_empty() {
        return None;
    }

    if AgentRole::is_valid_slug(clean) {
        return Some(clean.to_string());
    }

    if let Some((_, resolved)) = LEGACY_ROLE_MAPPINGS.iter().find(|(legacy, _)| *legacy == clean) {
        if AgentRole::is_valid_slug(resolved) {
            return Some((*resolved).to_string());
        }
    }

    let underscored = clean.replace('-', "_");
    if AgentRole::is_valid_slug(&underscored) {
        return Some(underscored);
    }

    let hyphenated = clean.replace('_', "-");
    if AgentRole::is_valid_slug(&hyphenated) {
        return Some(hyphenated);
    }

    None
}
