//! Catalog persistence contract plus Postgres and in-memory implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigaa_core::{
    Component, Curriculum, CurriculumComponent, CurriculumRole, Department, EntityKind,
    IngestError, NewComponent, NewCurriculum, NewDepartment, NewProgram, Program,
};
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::{CatalogSnapshot, CorequisiteRow, MemoryCatalogStore, RequisiteOption};
pub use postgres::PgCatalogStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("{entity} row {id} vanished during update")]
    MissingRow { entity: EntityKind, id: i64 },
    #[error("corrupt {table} row: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Store(err.to_string())
    }
}

/// Which disjunctive option table a requisite group lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequisiteKind {
    Prerequisite,
    Equivalence,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Open an atomic unit of work. Dropping the transaction without
    /// [`CatalogTx::commit`] discards every write made through it.
    async fn begin(&self) -> Result<Box<dyn CatalogTx>, StoreError>;
}

/// Reads see the transaction's own uncommitted writes.
#[async_trait]
pub trait CatalogTx: Send {
    async fn department_by_sigaa_id(&mut self, sigaa_id: i64) -> Result<Option<Department>, StoreError>;
    async fn department_by_acronym_and_title(
        &mut self,
        acronym: &str,
        title: &str,
    ) -> Result<Option<Department>, StoreError>;
    async fn department_by_title(&mut self, title: &str) -> Result<Option<Department>, StoreError>;
    async fn insert_department(&mut self, new: &NewDepartment) -> Result<Department, StoreError>;
    async fn update_department(&mut self, id: i64, new: &NewDepartment) -> Result<Department, StoreError>;

    async fn program_by_sigaa_id(&mut self, sigaa_id: i64) -> Result<Option<Program>, StoreError>;
    async fn insert_program(&mut self, new: &NewProgram) -> Result<Program, StoreError>;
    async fn update_program(&mut self, id: i64, new: &NewProgram) -> Result<Program, StoreError>;

    async fn curriculum_by_sigaa_id(&mut self, sigaa_id: &str) -> Result<Option<Curriculum>, StoreError>;
    async fn insert_curriculum(&mut self, new: &NewCurriculum) -> Result<Curriculum, StoreError>;
    async fn update_curriculum(&mut self, id: i64, new: &NewCurriculum) -> Result<Curriculum, StoreError>;

    async fn component_by_sigaa_id(&mut self, sigaa_id: &str) -> Result<Option<Component>, StoreError>;
    async fn insert_component(&mut self, new: &NewComponent) -> Result<Component, StoreError>;
    async fn update_component(&mut self, id: i64, new: &NewComponent) -> Result<Component, StoreError>;

    async fn curriculum_component(
        &mut self,
        curriculum_id: i64,
        component_id: i64,
    ) -> Result<Option<CurriculumComponent>, StoreError>;
    async fn insert_curriculum_component(
        &mut self,
        curriculum_id: i64,
        component_id: i64,
        role: CurriculumRole,
        prerequisite_percentage: i32,
    ) -> Result<CurriculumComponent, StoreError>;
    async fn update_curriculum_component(
        &mut self,
        id: i64,
        role: CurriculumRole,
        prerequisite_percentage: i32,
    ) -> Result<CurriculumComponent, StoreError>;

    /// Option groups of a component as lists of member component ids, in insertion order.
    async fn requisite_groups(
        &mut self,
        kind: RequisiteKind,
        component_id: i64,
    ) -> Result<Vec<Vec<i64>>, StoreError>;
    async fn replace_requisite_groups(
        &mut self,
        kind: RequisiteKind,
        component_id: i64,
        groups: &[Vec<i64>],
    ) -> Result<(), StoreError>;

    async fn corequisites(&mut self, component_id: i64) -> Result<Vec<i64>, StoreError>;
    async fn replace_corequisites(&mut self, component_id: i64, corequisite_ids: &[i64]) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
