use hive_core::error::Result;
use hive_core::repository::ProjectRepository;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Periodic work-session timeout sweeper.
///
/// Every interval (default 30 s) it loads each project, transitions
/// sessions past their max duration to `timeout`, releases their resource
/// locks and persists the result. Sweeps are idempotent: already-terminal
/// sessions are never touched.
pub struct SessionSweeper<P> {
    projects: Arc<P>,
    interval: Duration,
}

impl<P: ProjectRepository> SessionSweeper<P> {
    pub fn new(projects: Arc<P>, interval: Duration) -> Self {
        Self { projects, interval }
    }

    /// One sweep over every project. Returns the number of sessions timed
    /// out.
    pub async fn sweep_once(&self) -> Result<usize> {
        let mut total = 0;
        for mut project in self.projects.list().await? {
            let swept = project.sweep_timed_out_sessions();
            if swept.is_empty() {
                continue;
            }
            total += swept.len();
            self.projects.save(&project).await?;
            for session in &swept {
                self.projects.save_session(&project.id, session).await?;
            }
            info!(project_id = %project.id, count = swept.len(), "timed out stale sessions");
        }
        Ok(total)
    }

    /// Run the sweep loop until the task is aborted.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep_once().await {
                error!(error = %err, "session sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hive_core::models::SessionStatus;
    use hive_mocks::{Fixtures, MockProjectRepository};

    #[tokio::test]
    async fn test_sweep_times_out_and_releases() {
        let projects = Arc::new(MockProjectRepository::new());
        let (mut project, _, task_id) = Fixtures::single_branch_project();

        let session_id = project
            .start_work_session("agent-1", &task_id, Some(chrono::Duration::seconds(1)))
            .unwrap()
            .id
            .clone();
        project.lock_resource(&session_id, "db:users").unwrap();
        // Backdate so the session is overdue
        project.active_sessions.get_mut(&session_id).unwrap().started_at =
            Utc::now() - chrono::Duration::seconds(10);
        projects.save(&project).await.unwrap();

        let sweeper = SessionSweeper::new(projects.clone(), Duration::from_secs(30));
        let swept = sweeper.sweep_once().await.unwrap();
        assert_eq!(swept, 1);

        let stored = projects.find_by_id(&project.id).await.unwrap().unwrap();
        assert!(stored.active_sessions.is_empty());
        assert!(stored.resource_locks.is_empty());
        assert!(!stored.agents.get("agent-1").unwrap().active_tasks.contains(&task_id));

        let ended = projects.ended_sessions();
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].status, SessionStatus::Timeout);
        assert!(ended[0].ended_at.is_some());

        // idempotent: nothing left to sweep
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_ignores_unbounded_sessions() {
        let projects = Arc::new(MockProjectRepository::new());
        let (mut project, _, task_id) = Fixtures::single_branch_project();
        project.start_work_session("agent-1", &task_id, None).unwrap();
        projects.save(&project).await.unwrap();

        let sweeper = SessionSweeper::new(projects.clone(), Duration::from_secs(30));
        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        let stored = projects.find_by_id(&project.id).await.unwrap().unwrap();
        assert_eq!(stored.active_sessions.len(), 1);
    }
}
