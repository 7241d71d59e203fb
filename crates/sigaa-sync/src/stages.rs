//! The four ingestion stages. Each one scrapes its pages, validates the whole
//! batch before writing, resolves parents that earlier stages persisted and
//! upserts. Every tab a stage opens is closed before the stage returns, on
//! success and on error.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sigaa_core::normalize::collapse_whitespace;
use sigaa_core::requisites::all_codes;
use sigaa_core::{
    validate_batch, ComponentDraft, CurriculumRole, DepartmentDraft, ExternallyIdentified,
    IngestError, IngestResult, NewComponent, NewCurriculum, NewDepartment, NewProgram,
    RequisiteGroups,
};
use sigaa_portal::parse::{
    parse_component_detail, parse_curriculum_component_codes, parse_curriculum_listing,
    parse_curriculum_report, parse_department_headers, parse_program_rows, parse_unit_options,
    UnitOption,
};
use sigaa_portal::{
    BrowserSession, ClickTarget, PortalPage, PortalUrls, TabId, COMPONENT_LINK_TITLE,
    REPORT_LINK_TITLE,
};
use sigaa_storage::{CatalogStore, CatalogTx, RequisiteKind};
use tracing::{debug, info, warn};

use crate::config::{CurriculumSelector, IngestScope, ProgramSelector, StageKind};
use crate::resolve::{
    resolve_parent, ComponentBySigaaId, CurriculumBySigaaId, DepartmentByAcronymAndTitle,
    DepartmentByTitle, ProgramBySigaaId,
};
use crate::upsert::{upsert, NewCurriculumComponent, UpsertOutcome};

/// Everything a stage reads besides the session and the store.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub urls: &'a PortalUrls,
    pub scope: &'a IngestScope,
    pub pacing: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: StageKind,
    pub scraped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Records seen but left out by the scope (inactive curricula, mandatory components).
    pub skipped: usize,
    pub links_written: usize,
    pub relations_replaced: usize,
}

impl StageReport {
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            scraped: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            links_written: 0,
            relations_replaced: 0,
        }
    }

    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// True when the stage wrote nothing at all.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.links_written == 0 && self.relations_replaced == 0
    }
}

/// A curriculum persisted by the curricula stage, handed on to the components stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumTarget {
    pub program_sigaa_id: i64,
    pub sigaa_id: String,
}

/// Pair listing headers with unit select options by exact title. Headers
/// without a matching option keep `sigaa_id: None`, which batch validation
/// then rejects.
pub fn join_departments(headers: &[(String, String)], units: &[UnitOption]) -> Vec<DepartmentDraft> {
    headers
        .iter()
        .map(|(acronym, title)| {
            let key = collapse_whitespace(title);
            let sigaa_id = units
                .iter()
                .find(|unit| collapse_whitespace(&unit.label) == key)
                .map(|unit| unit.sigaa_id);
            if sigaa_id.is_none() {
                debug!(acronym = %acronym, title = %title, "no unit option matches department header");
            }
            DepartmentDraft {
                sigaa_id,
                acronym: acronym.clone(),
                title: title.clone(),
            }
        })
        .collect()
}

pub async fn departments(
    session: &mut BrowserSession,
    store: &dyn CatalogStore,
    ctx: &StageContext<'_>,
) -> IngestResult<StageReport> {
    let mut report = StageReport::new(StageKind::Departments);

    let listing = session.acquire_page(&ctx.urls.program_listing()).await?;
    let headers = extract_and_close(session, listing, |page| parse_department_headers(&page.html))?;
    let search = session.acquire_page(&ctx.urls.component_search()).await?;
    let units = extract_and_close(session, search, |page| parse_unit_options(&page.html, &page.url))?;

    let drafts = join_departments(&headers, &units);
    report.scraped = drafts.len();
    validate_batch(&drafts)?;

    let mut tx = store.begin().await?;
    for draft in &drafts {
        let payload = NewDepartment {
            sigaa_id: required_id(draft, draft.sigaa_id)?,
            acronym: draft.acronym.clone(),
            title: draft.title.clone(),
        };
        let (_, outcome) = upsert(&mut *tx, &payload).await?;
        report.record(outcome);
    }
    tx.commit().await?;

    info!(
        scraped = report.scraped,
        inserted = report.inserted,
        updated = report.updated,
        "departments stage finished"
    );
    Ok(report)
}

pub async fn programs(
    session: &mut BrowserSession,
    store: &dyn CatalogStore,
    ctx: &StageContext<'_>,
) -> IngestResult<StageReport> {
    let mut report = StageReport::new(StageKind::Programs);

    let listing_url = ctx.urls.program_listing();
    let tab = session.acquire_page(&listing_url).await?;
    let drafts = extract_and_close(session, tab, |page| parse_program_rows(&page.html))?;
    validate_batch(&drafts)?;

    let selected: Vec<_> = drafts
        .iter()
        .filter(|draft| draft.sigaa_id.is_some_and(|id| ctx.scope.programs.admits(id)))
        .collect();
    if let ProgramSelector::One(id) = ctx.scope.programs {
        if selected.is_empty() {
            return Err(IngestError::not_found(format!("program {id}"), listing_url));
        }
    }
    report.scraped = selected.len();
    report.skipped = drafts.len() - selected.len();

    let mut tx = store.begin().await?;
    for draft in selected {
        let department = resolve_parent(
            &mut *tx,
            &DepartmentByAcronymAndTitle {
                acronym: &draft.department_acronym,
                title: &draft.department_title,
            },
        )
        .await?;
        let payload = NewProgram {
            sigaa_id: required_id(draft, draft.sigaa_id)?,
            title: draft.title.clone(),
            degree: draft.degree,
            shift: draft.shift,
            department_id: department.id,
        };
        let (_, outcome) = upsert(&mut *tx, &payload).await?;
        report.record(outcome);
    }
    tx.commit().await?;

    info!(
        scraped = report.scraped,
        inserted = report.inserted,
        updated = report.updated,
        "programs stage finished"
    );
    Ok(report)
}

/// Returns the curricula it persisted so the components stage knows which
/// reports to walk.
pub async fn curricula(
    session: &mut BrowserSession,
    store: &dyn CatalogStore,
    ctx: &StageContext<'_>,
) -> IngestResult<(StageReport, Vec<CurriculumTarget>)> {
    let mut report = StageReport::new(StageKind::Curricula);
    let mut targets = Vec::new();

    for program_id in program_ids_in_scope(session, ctx).await? {
        let listing_url = ctx.urls.curriculum_listing(program_id);
        let tab = session.acquire_page(&listing_url).await?;
        let entries = extract_and_close(session, tab, |page| parse_curriculum_listing(&page.html))?;
        validate_batch(&entries)?;

        let selected: Vec<_> = entries
            .into_iter()
            .filter(|entry| ctx.scope.curricula.admits(&entry.sigaa_id))
            .collect();
        if let CurriculumSelector::One(id) = &ctx.scope.curricula {
            if selected.is_empty() {
                return Err(IngestError::not_found(format!("curriculum {id}"), listing_url));
            }
        }

        for entry in selected {
            if ctx.scope.active_only && !entry.active {
                debug!(program_id, curriculum = %entry.sigaa_id, "skipping inactive curriculum");
                report.skipped += 1;
                continue;
            }
            report.scraped += 1;

            let tab = open_curriculum_report(session, ctx.urls, program_id, &entry.sigaa_id).await?;
            let draft = extract_and_close(session, tab, |page| {
                let draft = parse_curriculum_report(&page.html, &page.url, program_id, entry.active)?;
                ensure_same_code("curriculum report code", &entry.sigaa_id, &draft.sigaa_id)?;
                Ok(draft)
            })?;

            let mut tx = store.begin().await?;
            let program = resolve_parent(&mut *tx, &ProgramBySigaaId(program_id)).await?;
            let payload = NewCurriculum {
                sigaa_id: entry.sigaa_id.clone(),
                program_id: program.id,
                fields: draft.fields,
            };
            let (_, outcome) = upsert(&mut *tx, &payload).await?;
            tx.commit().await?;
            report.record(outcome);

            targets.push(CurriculumTarget {
                program_sigaa_id: program_id,
                sigaa_id: entry.sigaa_id,
            });
            pace(ctx.pacing).await;
        }
    }

    info!(
        scraped = report.scraped,
        skipped = report.skipped,
        inserted = report.inserted,
        updated = report.updated,
        "curricula stage finished"
    );
    Ok((report, targets))
}

pub async fn components(
    session: &mut BrowserSession,
    store: &dyn CatalogStore,
    ctx: &StageContext<'_>,
    targets: &[CurriculumTarget],
) -> IngestResult<StageReport> {
    let mut report = StageReport::new(StageKind::Components);
    let mut scraped: Vec<ComponentDraft> = Vec::new();

    for target in targets {
        let tab = open_curriculum_report(session, ctx.urls, target.program_sigaa_id, &target.sigaa_id).await?;
        let codes = extract_and_close(session, tab, |page| parse_curriculum_component_codes(&page.html))?;
        validate_batch(&codes)?;

        for code in codes {
            if code.role == CurriculumRole::Mandatory && !ctx.scope.include_mandatory {
                report.skipped += 1;
                continue;
            }

            // A component shared by several curricula is read once per run.
            let draft = match scraped.iter().find(|draft| draft.sigaa_id == code.sigaa_id) {
                Some(draft) => draft.clone(),
                None => {
                    let draft = read_component(session, ctx, target, &code.sigaa_id).await?;
                    report.scraped += 1;
                    scraped.push(draft.clone());
                    pace(ctx.pacing).await;
                    draft
                }
            };

            let mut tx = store.begin().await?;
            let department = resolve_parent(&mut *tx, &DepartmentByTitle(&draft.department_title)).await?;
            let curriculum = resolve_parent(&mut *tx, &CurriculumBySigaaId(&target.sigaa_id)).await?;
            let payload = NewComponent {
                sigaa_id: draft.sigaa_id.clone(),
                title: draft.title.clone(),
                component_type: draft.component_type,
                department_id: department.id,
            };
            let (component, outcome) = upsert(&mut *tx, &payload).await?;
            let link = NewCurriculumComponent {
                curriculum_id: curriculum.id,
                component_id: component.id,
                role: code.role,
                prerequisite_percentage: 0,
            };
            let (_, link_outcome) = upsert(&mut *tx, &link).await?;
            tx.commit().await?;

            report.record(outcome);
            if link_outcome != UpsertOutcome::Unchanged {
                report.links_written += 1;
            }
        }
    }

    // Requisites may name components that appear later in page order, so
    // they are linked only once every component of the run is stored.
    for draft in &scraped {
        let mut tx = store.begin().await?;
        report.relations_replaced += link_requisites(&mut *tx, draft).await?;
        tx.commit().await?;
    }

    info!(
        scraped = report.scraped,
        skipped = report.skipped,
        inserted = report.inserted,
        updated = report.updated,
        links = report.links_written,
        relations = report.relations_replaced,
        "components stage finished"
    );
    Ok(report)
}

/// Replace prerequisite, equivalence and corequisite rows of one component
/// when they differ from what the page lists. Returns how many of the three
/// relations were rewritten.
async fn link_requisites(tx: &mut dyn CatalogTx, draft: &ComponentDraft) -> IngestResult<usize> {
    let component = resolve_parent(tx, &ComponentBySigaaId(&draft.sigaa_id)).await?;
    let mut replaced = 0;

    for (kind, groups) in [
        (RequisiteKind::Prerequisite, &draft.prerequisites),
        (RequisiteKind::Equivalence, &draft.equivalences),
    ] {
        let wanted = resolve_groups(tx, &draft.sigaa_id, groups).await?;
        let stored = tx.requisite_groups(kind, component.id).await?;
        if canonical_groups(&stored) != canonical_groups(&wanted) {
            tx.replace_requisite_groups(kind, component.id, &wanted).await?;
            replaced += 1;
        }
    }

    let mut wanted = Vec::new();
    for code in all_codes(&draft.corequisites) {
        match tx.component_by_sigaa_id(&code).await? {
            Some(corequisite) => wanted.push(corequisite.id),
            None => warn!(component = %draft.sigaa_id, corequisite = %code, "corequisite not stored; skipped"),
        }
    }
    let mut stored = tx.corequisites(component.id).await?;
    stored.sort_unstable();
    let mut sorted = wanted.clone();
    sorted.sort_unstable();
    if stored != sorted {
        tx.replace_corequisites(component.id, &wanted).await?;
        replaced += 1;
    }

    Ok(replaced)
}

/// Map code groups to stored component ids. A group naming any component
/// that is not stored cannot be satisfied as written and is dropped whole.
async fn resolve_groups(
    tx: &mut dyn CatalogTx,
    owner: &str,
    groups: &RequisiteGroups,
) -> IngestResult<Vec<Vec<i64>>> {
    let mut resolved = Vec::with_capacity(groups.len());
    'groups: for group in groups {
        let mut ids = Vec::with_capacity(group.len());
        for code in group {
            match tx.component_by_sigaa_id(code).await? {
                Some(member) => ids.push(member.id),
                None => {
                    warn!(component = %owner, missing = %code, group = ?group, "requisite group names unstored component; skipped");
                    continue 'groups;
                }
            }
        }
        if !resolved.contains(&ids) {
            resolved.push(ids);
        }
    }
    Ok(resolved)
}

fn canonical_groups(groups: &[Vec<i64>]) -> Vec<Vec<i64>> {
    let mut canonical: Vec<Vec<i64>> = groups
        .iter()
        .map(|group| {
            let mut group = group.clone();
            group.sort_unstable();
            group.dedup();
            group
        })
        .collect();
    canonical.sort();
    canonical.dedup();
    canonical
}

async fn program_ids_in_scope(session: &mut BrowserSession, ctx: &StageContext<'_>) -> IngestResult<Vec<i64>> {
    if let ProgramSelector::One(id) = ctx.scope.programs {
        return Ok(vec![id]);
    }
    let tab = session.acquire_page(&ctx.urls.program_listing()).await?;
    let drafts = extract_and_close(session, tab, |page| parse_program_rows(&page.html))?;
    Ok(drafts.into_iter().filter_map(|draft| draft.sigaa_id).collect())
}

/// Fresh tab on the program's curriculum listing, clicked through to the
/// report of one curriculum. The caller owns the returned tab.
async fn open_curriculum_report(
    session: &mut BrowserSession,
    urls: &PortalUrls,
    program_sigaa_id: i64,
    curriculum_sigaa_id: &str,
) -> IngestResult<TabId> {
    let tab = session.open_tab(&urls.curriculum_listing(program_sigaa_id)).await?;
    let target = ClickTarget::in_row(curriculum_sigaa_id, REPORT_LINK_TITLE);
    if let Err(err) = session.click(tab, &target).await {
        session.close_tab(tab);
        return Err(err.into());
    }
    Ok(tab)
}

async fn read_component(
    session: &mut BrowserSession,
    ctx: &StageContext<'_>,
    target: &CurriculumTarget,
    code: &str,
) -> IngestResult<ComponentDraft> {
    let tab = open_curriculum_report(session, ctx.urls, target.program_sigaa_id, &target.sigaa_id).await?;
    if let Err(err) = session.click(tab, &ClickTarget::in_row(code, COMPONENT_LINK_TITLE)).await {
        session.close_tab(tab);
        return Err(err.into());
    }
    extract_and_close(session, tab, |page| {
        let draft = parse_component_detail(&page.html, &page.url)?;
        ensure_same_code("component detail code", code, &draft.sigaa_id)?;
        Ok(draft)
    })
}

/// A page reached through a listing row must describe that row's record.
fn ensure_same_code(field: &'static str, listed: &str, found: &str) -> IngestResult<()> {
    if listed == found {
        return Ok(());
    }
    Err(IngestError::malformed(field, format!("expected {listed}, page shows {found}")))
}

/// Run `extract` on the tab's page, then close the tab whatever the outcome.
fn extract_and_close<T>(
    session: &mut BrowserSession,
    tab: TabId,
    extract: impl FnOnce(&PortalPage) -> IngestResult<T>,
) -> IngestResult<T> {
    let result = session.page(tab).map_err(IngestError::from).and_then(extract);
    session.close_tab(tab);
    result
}

fn required_id<T: ExternallyIdentified>(record: &T, id: Option<i64>) -> IngestResult<i64> {
    id.ok_or_else(|| IngestError::MissingIdentifier {
        entity: T::ENTITY,
        record: record.describe(),
    })
}

async fn pace(pacing: Duration) {
    if !pacing.is_zero() {
        tokio::time::sleep(pacing).await;
    }
}
