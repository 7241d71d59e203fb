//! Ingestion runs: departments, then programs, then curricula, then components.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sigaa_core::IngestResult;
use sigaa_portal::{BrowserSession, PortalBrowser, PortalUrls};
use sigaa_storage::CatalogStore;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

mod config;
mod resolve;
pub mod stages;
mod upsert;

pub use config::{CurriculumSelector, IngestConfig, IngestScope, ProgramSelector, StageKind};
pub use resolve::{
    resolve_parent, ComponentBySigaaId, CurriculumBySigaaId, DepartmentByAcronymAndTitle,
    DepartmentByTitle, ParentLookup, ProgramBySigaaId,
};
pub use stages::{CurriculumTarget, StageContext, StageReport};
pub use upsert::{upsert, NewCurriculumComponent, Upsert, UpsertOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub scope: IngestScope,
    pub stages: Vec<StageReport>,
    pub curricula: Vec<CurriculumTarget>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Departments,
    Programs,
    Curricula,
    Components,
    Done,
}

impl RunState {
    fn stage(self) -> Option<StageKind> {
        match self {
            Self::Departments => Some(StageKind::Departments),
            Self::Programs => Some(StageKind::Programs),
            Self::Curricula => Some(StageKind::Curricula),
            Self::Components => Some(StageKind::Components),
            Self::Done => None,
        }
    }

    fn after(stage: StageKind, until: StageKind) -> Self {
        if stage >= until {
            return Self::Done;
        }
        match stage {
            StageKind::Departments => Self::Programs,
            StageKind::Programs => Self::Curricula,
            StageKind::Curricula => Self::Components,
            StageKind::Components => Self::Done,
        }
    }
}

/// Owns the browser session for a whole run. Stages execute strictly in
/// order and the first failure halts the run; whatever earlier stages
/// committed stays committed.
pub struct IngestPipeline {
    session: BrowserSession,
    store: Arc<dyn CatalogStore>,
    urls: PortalUrls,
    pacing: Duration,
    curricula: Vec<CurriculumTarget>,
}

impl IngestPipeline {
    pub fn new(
        browser: Arc<dyn PortalBrowser>,
        store: Arc<dyn CatalogStore>,
        urls: PortalUrls,
        pacing: Duration,
    ) -> Self {
        Self {
            session: BrowserSession::new(browser),
            store,
            urls,
            pacing,
            curricula: Vec::new(),
        }
    }

    pub async fn run(&mut self, scope: &IngestScope) -> IngestResult<IngestRunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, until = %scope.until, "ingest run started");

        let mut stages = Vec::new();
        let mut state = RunState::Departments;
        while let Some(stage) = state.stage() {
            let span = info_span!("ingest_stage", %run_id, %stage);
            let report = match self.run_stage(stage, scope).instrument(span).await {
                Ok(report) => report,
                Err(err) => {
                    error!(%run_id, %stage, error = %err, "stage failed; halting run");
                    return Err(err);
                }
            };
            stages.push(report);
            state = RunState::after(stage, scope.until);
        }

        let finished_at = Utc::now();
        info!(%run_id, stages = stages.len(), "ingest run finished");
        Ok(IngestRunSummary {
            run_id,
            started_at,
            finished_at,
            scope: scope.clone(),
            stages,
            curricula: self.curricula.clone(),
        })
    }

    /// Run a single stage. The components stage walks the curricula persisted
    /// by the most recent curricula stage of this pipeline.
    pub async fn run_stage(&mut self, stage: StageKind, scope: &IngestScope) -> IngestResult<StageReport> {
        let ctx = StageContext {
            urls: &self.urls,
            scope,
            pacing: self.pacing,
        };
        let store = self.store.as_ref();
        match stage {
            StageKind::Departments => stages::departments(&mut self.session, store, &ctx).await,
            StageKind::Programs => stages::programs(&mut self.session, store, &ctx).await,
            StageKind::Curricula => {
                let (report, targets) = stages::curricula(&mut self.session, store, &ctx).await?;
                self.curricula = targets;
                Ok(report)
            }
            StageKind::Components => {
                stages::components(&mut self.session, store, &ctx, &self.curricula).await
            }
        }
    }

    pub fn open_tab_count(&self) -> usize {
        self.session.open_tab_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_state_stops_after_requested_stage() {
        assert_eq!(RunState::after(StageKind::Departments, StageKind::Components), RunState::Programs);
        assert_eq!(RunState::after(StageKind::Curricula, StageKind::Components), RunState::Components);
        assert_eq!(RunState::after(StageKind::Programs, StageKind::Programs), RunState::Done);
        assert_eq!(RunState::after(StageKind::Components, StageKind::Components), RunState::Done);
        assert_eq!(RunState::Done.stage(), None);
    }
}
