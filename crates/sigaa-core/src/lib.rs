//! Core catalog model, candidate drafts and the ingestion error taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod normalize;
pub mod requisites;

pub use normalize::validate_batch;
pub use requisites::{parse_requisite_expression, RequisiteGroups};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Department,
    Program,
    Curriculum,
    Component,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Department => "department",
            Self::Program => "program",
            Self::Curriculum => "curriculum",
            Self::Component => "component",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Degree {
    Bachelor,
    Licentiate,
    /// Portal vocabulary we have no mapping for; persisted as NULL.
    Unknown,
}

impl Degree {
    pub fn as_db_str(self) -> Option<&'static str> {
        match self {
            Self::Bachelor => Some("BACHELOR"),
            Self::Licentiate => Some("LICENTIATE"),
            Self::Unknown => None,
        }
    }

    pub fn from_db_str(value: Option<&str>) -> Self {
        match value {
            Some("BACHELOR") => Self::Bachelor,
            Some("LICENTIATE") => Self::Licentiate,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Shift {
    Day,
    Night,
    /// Portal vocabulary we have no mapping for; persisted as NULL.
    Unknown,
}

impl Shift {
    pub fn as_db_str(self) -> Option<&'static str> {
        match self {
            Self::Day => Some("DAY"),
            Self::Night => Some("NIGHT"),
            Self::Unknown => None,
        }
    }

    pub fn from_db_str(value: Option<&str>) -> Self {
        match value {
            Some("DAY") => Self::Day,
            Some("NIGHT") => Self::Night,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    Course,
    Activity,
}

impl ComponentType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Course => "COURSE",
            Self::Activity => "ACTIVITY",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "COURSE" => Some(Self::Course),
            "ACTIVITY" => Some(Self::Activity),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CurriculumRole {
    Mandatory,
    Elective,
}

impl CurriculumRole {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Mandatory => "MANDATORY",
            Self::Elective => "ELECTIVE",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "MANDATORY" => Some(Self::Mandatory),
            "ELECTIVE" => Some(Self::Elective),
            _ => None,
        }
    }
}

/// Anything carrying a portal-assigned identifier that batch validation can inspect.
pub trait ExternallyIdentified {
    const ENTITY: EntityKind;

    /// `None` when the scraper could not attach an identifier at all.
    fn external_id(&self) -> Option<String>;

    /// Human readable hint used in error messages.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// Persisted rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: i64,
    pub sigaa_id: i64,
    pub acronym: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: i64,
    pub sigaa_id: i64,
    pub title: String,
    pub degree: Degree,
    pub shift: Shift,
    pub department_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Curriculum {
    pub id: i64,
    pub sigaa_id: String,
    pub program_id: i64,
    pub fields: CurriculumFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: i64,
    pub sigaa_id: String,
    pub title: String,
    pub component_type: ComponentType,
    pub department_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumComponent {
    pub id: i64,
    pub curriculum_id: i64,
    pub component_id: i64,
    pub role: CurriculumRole,
    pub prerequisite_percentage: i32,
}

/// Mutable curriculum attributes, shared by drafts, write payloads and rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumFields {
    pub active: bool,
    pub start_year: i32,
    pub start_period: i32,
    pub min_periods: i32,
    pub max_periods: i32,
    pub min_period_workload: i32,
    pub max_period_workload: i32,
    pub min_workload: i32,
    pub mandatory_components_workload: i32,
    pub min_elective_components_workload: i32,
    pub max_elective_components_workload: i32,
    pub min_complementary_components_workload: i32,
    pub max_complementary_components_workload: i32,
}

// ---------------------------------------------------------------------------
// Write payloads (parents already resolved to surrogate ids)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDepartment {
    pub sigaa_id: i64,
    pub acronym: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProgram {
    pub sigaa_id: i64,
    pub title: String,
    pub degree: Degree,
    pub shift: Shift,
    pub department_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCurriculum {
    pub sigaa_id: String,
    pub program_id: i64,
    pub fields: CurriculumFields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComponent {
    pub sigaa_id: String,
    pub title: String,
    pub component_type: ComponentType,
    pub department_id: i64,
}

// ---------------------------------------------------------------------------
// Scraped candidates (handoff contract from page parsers into the stages)
// ---------------------------------------------------------------------------

/// Department as joined from the program listing headers and the unit select control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentDraft {
    pub sigaa_id: Option<i64>,
    pub acronym: String,
    pub title: String,
}

impl ExternallyIdentified for DepartmentDraft {
    const ENTITY: EntityKind = EntityKind::Department;

    fn external_id(&self) -> Option<String> {
        self.sigaa_id.map(|id| id.to_string())
    }

    fn describe(&self) -> String {
        format!("{} - {}", self.acronym, self.title)
    }
}

/// Program row plus the text of the department header it sits under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramDraft {
    pub sigaa_id: Option<i64>,
    pub title: String,
    pub degree: Degree,
    pub shift: Shift,
    pub department_acronym: String,
    pub department_title: String,
}

impl ExternallyIdentified for ProgramDraft {
    const ENTITY: EntityKind = EntityKind::Program;

    fn external_id(&self) -> Option<String> {
        self.sigaa_id.map(|id| id.to_string())
    }

    fn describe(&self) -> String {
        self.title.clone()
    }
}

/// One row of a program's curriculum listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumListingEntry {
    pub sigaa_id: String,
    pub created_year: Option<i32>,
    pub active: bool,
}

impl ExternallyIdentified for CurriculumListingEntry {
    const ENTITY: EntityKind = EntityKind::Curriculum;

    fn external_id(&self) -> Option<String> {
        Some(self.sigaa_id.clone())
    }

    fn describe(&self) -> String {
        format!("curriculum listing row {}", self.sigaa_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurriculumDraft {
    pub sigaa_id: String,
    pub program_sigaa_id: i64,
    pub fields: CurriculumFields,
}

impl ExternallyIdentified for CurriculumDraft {
    const ENTITY: EntityKind = EntityKind::Curriculum;

    fn external_id(&self) -> Option<String> {
        Some(self.sigaa_id.clone())
    }

    fn describe(&self) -> String {
        format!("curriculum {} of program {}", self.sigaa_id, self.program_sigaa_id)
    }
}

/// Component code as listed in a curriculum report, tagged with its role there.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurriculumComponentCode {
    pub sigaa_id: String,
    pub role: CurriculumRole,
}

impl ExternallyIdentified for CurriculumComponentCode {
    const ENTITY: EntityKind = EntityKind::Component;

    fn external_id(&self) -> Option<String> {
        Some(self.sigaa_id.clone())
    }

    fn describe(&self) -> String {
        format!("{:?} component {}", self.role, self.sigaa_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDraft {
    pub sigaa_id: String,
    pub title: String,
    pub component_type: ComponentType,
    pub department_title: String,
    pub prerequisites: RequisiteGroups,
    pub corequisites: RequisiteGroups,
    pub equivalences: RequisiteGroups,
}

impl ExternallyIdentified for ComponentDraft {
    const ENTITY: EntityKind = EntityKind::Component;

    fn external_id(&self) -> Option<String> {
        Some(self.sigaa_id.clone())
    }

    fn describe(&self) -> String {
        format!("{} - {}", self.sigaa_id, self.title)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed {field}: {raw:?}")]
    MalformedField { field: &'static str, raw: String },
    #[error("duplicate {entity} external identifier {sigaa_id}")]
    DuplicateIdentifier { entity: EntityKind, sigaa_id: String },
    #[error("{entity} without external identifier: {record}")]
    MissingIdentifier { entity: EntityKind, record: String },
    #[error("unresolved parent {entity} for key {key}")]
    UnresolvedParent { entity: EntityKind, key: String },
    #[error("unknown component type {0:?}")]
    UnknownComponentType(String),
    #[error("element not found: {what} on {url}")]
    ElementNotFound { what: String, url: String },
    #[error("browser: {0}")]
    Browser(String),
    #[error("store: {0}")]
    Store(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IngestError {
    pub fn malformed(field: &'static str, raw: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            raw: raw.into(),
        }
    }

    pub fn not_found(what: impl Into<String>, url: impl Into<String>) -> Self {
        Self::ElementNotFound {
            what: what.into(),
            url: url.into(),
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
