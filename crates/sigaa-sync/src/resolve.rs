//! Looking up already-persisted parents by natural key.

use std::fmt;

use async_trait::async_trait;
use sigaa_core::{Component, Curriculum, Department, EntityKind, IngestError, IngestResult, Program};
use sigaa_storage::{CatalogTx, StoreError};

/// A natural-key lookup for a parent row. `Display` renders the key for error messages.
#[async_trait]
pub trait ParentLookup: fmt::Display + Send + Sync {
    type Parent: Send;
    const ENTITY: EntityKind;

    async fn find(&self, tx: &mut dyn CatalogTx) -> Result<Option<Self::Parent>, StoreError>;
}

/// Fails with [`IngestError::UnresolvedParent`] instead of ever creating the parent.
pub async fn resolve_parent<L: ParentLookup>(tx: &mut dyn CatalogTx, lookup: &L) -> IngestResult<L::Parent> {
    lookup
        .find(tx)
        .await?
        .ok_or_else(|| IngestError::UnresolvedParent {
            entity: L::ENTITY,
            key: lookup.to_string(),
        })
}

#[derive(Debug, Clone, Copy)]
pub struct DepartmentByAcronymAndTitle<'a> {
    pub acronym: &'a str,
    pub title: &'a str,
}

impl fmt::Display for DepartmentByAcronymAndTitle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.acronym, self.title)
    }
}

#[async_trait]
impl ParentLookup for DepartmentByAcronymAndTitle<'_> {
    type Parent = Department;
    const ENTITY: EntityKind = EntityKind::Department;

    async fn find(&self, tx: &mut dyn CatalogTx) -> Result<Option<Department>, StoreError> {
        tx.department_by_acronym_and_title(self.acronym, self.title).await
    }
}

/// Component pages name their unit by title only.
#[derive(Debug, Clone, Copy)]
pub struct DepartmentByTitle<'a>(pub &'a str);

impl fmt::Display for DepartmentByTitle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "title {:?}", self.0)
    }
}

#[async_trait]
impl ParentLookup for DepartmentByTitle<'_> {
    type Parent = Department;
    const ENTITY: EntityKind = EntityKind::Department;

    async fn find(&self, tx: &mut dyn CatalogTx) -> Result<Option<Department>, StoreError> {
        tx.department_by_title(self.0).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProgramBySigaaId(pub i64);

impl fmt::Display for ProgramBySigaaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sigaa id {}", self.0)
    }
}

#[async_trait]
impl ParentLookup for ProgramBySigaaId {
    type Parent = Program;
    const ENTITY: EntityKind = EntityKind::Program;

    async fn find(&self, tx: &mut dyn CatalogTx) -> Result<Option<Program>, StoreError> {
        tx.program_by_sigaa_id(self.0).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CurriculumBySigaaId<'a>(pub &'a str);

impl fmt::Display for CurriculumBySigaaId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sigaa id {}", self.0)
    }
}

#[async_trait]
impl ParentLookup for CurriculumBySigaaId<'_> {
    type Parent = Curriculum;
    const ENTITY: EntityKind = EntityKind::Curriculum;

    async fn find(&self, tx: &mut dyn CatalogTx) -> Result<Option<Curriculum>, StoreError> {
        tx.curriculum_by_sigaa_id(self.0).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ComponentBySigaaId<'a>(pub &'a str);

impl fmt::Display for ComponentBySigaaId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sigaa id {}", self.0)
    }
}

#[async_trait]
impl ParentLookup for ComponentBySigaaId<'_> {
    type Parent = Component;
    const ENTITY: EntityKind = EntityKind::Component;

    async fn find(&self, tx: &mut dyn CatalogTx) -> Result<Option<Component>, StoreError> {
        tx.component_by_sigaa_id(self.0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigaa_core::NewDepartment;
    use sigaa_storage::{CatalogStore, MemoryCatalogStore};

    #[tokio::test]
    async fn missing_parent_is_reported_with_its_key() {
        let store = MemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();

        let err = resolve_parent(
            &mut *tx,
            &DepartmentByAcronymAndTitle {
                acronym: "FGA",
                title: "Faculdade do Gama",
            },
        )
        .await
        .unwrap_err();

        match err {
            IngestError::UnresolvedParent { entity, key } => {
                assert_eq!(entity, EntityKind::Department);
                assert_eq!(key, "FGA - Faculdade do Gama");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn resolution_sees_uncommitted_writes_and_never_inserts() {
        let store = MemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        let inserted = tx
            .insert_department(&NewDepartment {
                sigaa_id: 673,
                acronym: "FGA".into(),
                title: "Faculdade do Gama".into(),
            })
            .await
            .unwrap();

        let found = resolve_parent(&mut *tx, &DepartmentByTitle("Faculdade do Gama"))
            .await
            .unwrap();
        assert_eq!(found, inserted);

        let missing = resolve_parent(&mut *tx, &ProgramBySigaaId(414924)).await;
        assert!(matches!(
            missing,
            Err(IngestError::UnresolvedParent { entity: EntityKind::Program, .. })
        ));
        tx.commit().await.unwrap();
        assert!(store.snapshot().await.programs.is_empty());
    }
}
