//! Insert-or-update keyed on the portal identifier.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sigaa_core::{
    Component, Curriculum, CurriculumComponent, CurriculumRole, Department, IngestResult,
    NewComponent, NewCurriculum, NewDepartment, NewProgram, Program,
};
use sigaa_storage::{CatalogTx, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// A write payload whose row can be found by external identifier.
#[async_trait]
pub trait Upsert: Send + Sync {
    type Row: Send;

    async fn existing(&self, tx: &mut dyn CatalogTx) -> Result<Option<Self::Row>, StoreError>;
    fn row_id(row: &Self::Row) -> i64;
    fn matches(&self, row: &Self::Row) -> bool;
    async fn insert(&self, tx: &mut dyn CatalogTx) -> Result<Self::Row, StoreError>;
    async fn update(&self, tx: &mut dyn CatalogTx, id: i64) -> Result<Self::Row, StoreError>;
}

/// Unchanged rows are not written at all, so re-running over identical
/// source data leaves the store byte-for-byte the same.
pub async fn upsert<P: Upsert>(tx: &mut dyn CatalogTx, payload: &P) -> IngestResult<(P::Row, UpsertOutcome)> {
    match payload.existing(tx).await? {
        None => Ok((payload.insert(tx).await?, UpsertOutcome::Inserted)),
        Some(row) if payload.matches(&row) => Ok((row, UpsertOutcome::Unchanged)),
        Some(row) => {
            let updated = payload.update(tx, P::row_id(&row)).await?;
            Ok((updated, UpsertOutcome::Updated))
        }
    }
}

#[async_trait]
impl Upsert for NewDepartment {
    type Row = Department;

    async fn existing(&self, tx: &mut dyn CatalogTx) -> Result<Option<Department>, StoreError> {
        tx.department_by_sigaa_id(self.sigaa_id).await
    }

    fn row_id(row: &Department) -> i64 {
        row.id
    }

    fn matches(&self, row: &Department) -> bool {
        row.acronym == self.acronym && row.title == self.title
    }

    async fn insert(&self, tx: &mut dyn CatalogTx) -> Result<Department, StoreError> {
        tx.insert_department(self).await
    }

    async fn update(&self, tx: &mut dyn CatalogTx, id: i64) -> Result<Department, StoreError> {
        tx.update_department(id, self).await
    }
}

#[async_trait]
impl Upsert for NewProgram {
    type Row = Program;

    async fn existing(&self, tx: &mut dyn CatalogTx) -> Result<Option<Program>, StoreError> {
        tx.program_by_sigaa_id(self.sigaa_id).await
    }

    fn row_id(row: &Program) -> i64 {
        row.id
    }

    fn matches(&self, row: &Program) -> bool {
        row.title == self.title
            && row.degree == self.degree
            && row.shift == self.shift
            && row.department_id == self.department_id
    }

    async fn insert(&self, tx: &mut dyn CatalogTx) -> Result<Program, StoreError> {
        tx.insert_program(self).await
    }

    async fn update(&self, tx: &mut dyn CatalogTx, id: i64) -> Result<Program, StoreError> {
        tx.update_program(id, self).await
    }
}

#[async_trait]
impl Upsert for NewCurriculum {
    type Row = Curriculum;

    async fn existing(&self, tx: &mut dyn CatalogTx) -> Result<Option<Curriculum>, StoreError> {
        tx.curriculum_by_sigaa_id(&self.sigaa_id).await
    }

    fn row_id(row: &Curriculum) -> i64 {
        row.id
    }

    fn matches(&self, row: &Curriculum) -> bool {
        row.program_id == self.program_id && row.fields == self.fields
    }

    async fn insert(&self, tx: &mut dyn CatalogTx) -> Result<Curriculum, StoreError> {
        tx.insert_curriculum(self).await
    }

    async fn update(&self, tx: &mut dyn CatalogTx, id: i64) -> Result<Curriculum, StoreError> {
        tx.update_curriculum(id, self).await
    }
}

#[async_trait]
impl Upsert for NewComponent {
    type Row = Component;

    async fn existing(&self, tx: &mut dyn CatalogTx) -> Result<Option<Component>, StoreError> {
        tx.component_by_sigaa_id(&self.sigaa_id).await
    }

    fn row_id(row: &Component) -> i64 {
        row.id
    }

    fn matches(&self, row: &Component) -> bool {
        row.title == self.title
            && row.component_type == self.component_type
            && row.department_id == self.department_id
    }

    async fn insert(&self, tx: &mut dyn CatalogTx) -> Result<Component, StoreError> {
        tx.insert_component(self).await
    }

    async fn update(&self, tx: &mut dyn CatalogTx, id: i64) -> Result<Component, StoreError> {
        tx.update_component(id, self).await
    }
}

/// Link between a curriculum and a component, keyed on the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewCurriculumComponent {
    pub curriculum_id: i64,
    pub component_id: i64,
    pub role: CurriculumRole,
    pub prerequisite_percentage: i32,
}

#[async_trait]
impl Upsert for NewCurriculumComponent {
    type Row = CurriculumComponent;

    async fn existing(&self, tx: &mut dyn CatalogTx) -> Result<Option<CurriculumComponent>, StoreError> {
        tx.curriculum_component(self.curriculum_id, self.component_id).await
    }

    fn row_id(row: &CurriculumComponent) -> i64 {
        row.id
    }

    fn matches(&self, row: &CurriculumComponent) -> bool {
        row.role == self.role && row.prerequisite_percentage == self.prerequisite_percentage
    }

    async fn insert(&self, tx: &mut dyn CatalogTx) -> Result<CurriculumComponent, StoreError> {
        tx.insert_curriculum_component(
            self.curriculum_id,
            self.component_id,
            self.role,
            self.prerequisite_percentage,
        )
        .await
    }

    async fn update(&self, tx: &mut dyn CatalogTx, id: i64) -> Result<CurriculumComponent, StoreError> {
        tx.update_curriculum_component(id, self.role, self.prerequisite_percentage)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigaa_storage::{CatalogStore, MemoryCatalogStore};

    fn fga(title: &str) -> NewDepartment {
        NewDepartment {
            sigaa_id: 673,
            acronym: "FGA".into(),
            title: title.into(),
        }
    }

    #[tokio::test]
    async fn second_upsert_of_same_payload_is_unchanged() {
        let store = MemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();

        let (first, outcome) = upsert(&mut *tx, &fga("Faculdade do Gama")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);
        let (second, outcome) = upsert(&mut *tx, &fga("Faculdade do Gama")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Unchanged);
        assert_eq!(first, second);
        tx.commit().await.unwrap();

        assert_eq!(store.snapshot().await.departments.len(), 1);
    }

    #[tokio::test]
    async fn changed_fields_update_in_place() {
        let store = MemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        let (original, _) = upsert(&mut *tx, &fga("Faculdade do Gama")).await.unwrap();

        let (renamed, outcome) = upsert(&mut *tx, &fga("Faculdade UnB Gama")).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(renamed.id, original.id);
        assert_eq!(renamed.title, "Faculdade UnB Gama");
        tx.commit().await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.departments.len(), 1);
        assert_eq!(snapshot.departments[0].title, "Faculdade UnB Gama");
    }
}
