use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sigaa_core::{
    Component, Curriculum, CurriculumComponent, CurriculumRole, Department, EntityKind,
    NewComponent, NewCurriculum, NewDepartment, NewProgram, Program,
};
use tokio::sync::Mutex;

use crate::{CatalogStore, CatalogTx, RequisiteKind, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequisiteOption {
    pub id: i64,
    pub component_id: i64,
    pub members: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorequisiteRow {
    pub id: i64,
    pub component_id: i64,
    pub corequisite_id: i64,
}

/// Full copy of every table; equality is what idempotence tests compare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSnapshot {
    pub departments: Vec<Department>,
    pub programs: Vec<Program>,
    pub curricula: Vec<Curriculum>,
    pub components: Vec<Component>,
    pub curriculum_components: Vec<CurriculumComponent>,
    pub prerequisite_options: Vec<RequisiteOption>,
    pub equivalence_options: Vec<RequisiteOption>,
    pub corequisites: Vec<CorequisiteRow>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tables: CatalogSnapshot,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn options_mut(&mut self, kind: RequisiteKind) -> &mut Vec<RequisiteOption> {
        match kind {
            RequisiteKind::Prerequisite => &mut self.tables.prerequisite_options,
            RequisiteKind::Equivalence => &mut self.tables.equivalence_options,
        }
    }
}

/// Single-writer store used by `--dry-run` and the test-suite. A transaction
/// works on a private copy that replaces the shared state on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalogStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.state.lock().await.tables.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>, StoreError> {
        let working = self.state.lock().await.clone();
        Ok(Box::new(MemoryCatalogTx {
            shared: Arc::clone(&self.state),
            working,
        }))
    }
}

struct MemoryCatalogTx {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
}

fn missing(entity: EntityKind, id: i64) -> StoreError {
    StoreError::MissingRow { entity, id }
}

#[async_trait]
impl CatalogTx for MemoryCatalogTx {
    async fn department_by_sigaa_id(&mut self, sigaa_id: i64) -> Result<Option<Department>, StoreError> {
        Ok(self
            .working
            .tables
            .departments
            .iter()
            .find(|d| d.sigaa_id == sigaa_id)
            .cloned())
    }

    async fn department_by_acronym_and_title(
        &mut self,
        acronym: &str,
        title: &str,
    ) -> Result<Option<Department>, StoreError> {
        Ok(self
            .working
            .tables
            .departments
            .iter()
            .find(|d| d.acronym == acronym && d.title == title)
            .cloned())
    }

    async fn department_by_title(&mut self, title: &str) -> Result<Option<Department>, StoreError> {
        Ok(self
            .working
            .tables
            .departments
            .iter()
            .find(|d| d.title == title)
            .cloned())
    }

    async fn insert_department(&mut self, new: &NewDepartment) -> Result<Department, StoreError> {
        let row = Department {
            id: self.working.next_id(),
            sigaa_id: new.sigaa_id,
            acronym: new.acronym.clone(),
            title: new.title.clone(),
        };
        self.working.tables.departments.push(row.clone());
        Ok(row)
    }

    async fn update_department(&mut self, id: i64, new: &NewDepartment) -> Result<Department, StoreError> {
        let row = self
            .working
            .tables
            .departments
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| missing(EntityKind::Department, id))?;
        row.sigaa_id = new.sigaa_id;
        row.acronym = new.acronym.clone();
        row.title = new.title.clone();
        Ok(row.clone())
    }

    async fn program_by_sigaa_id(&mut self, sigaa_id: i64) -> Result<Option<Program>, StoreError> {
        Ok(self
            .working
            .tables
            .programs
            .iter()
            .find(|p| p.sigaa_id == sigaa_id)
            .cloned())
    }

    async fn insert_program(&mut self, new: &NewProgram) -> Result<Program, StoreError> {
        let row = Program {
            id: self.working.next_id(),
            sigaa_id: new.sigaa_id,
            title: new.title.clone(),
            degree: new.degree,
            shift: new.shift,
            department_id: new.department_id,
        };
        self.working.tables.programs.push(row.clone());
        Ok(row)
    }

    async fn update_program(&mut self, id: i64, new: &NewProgram) -> Result<Program, StoreError> {
        let row = self
            .working
            .tables
            .programs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| missing(EntityKind::Program, id))?;
        row.sigaa_id = new.sigaa_id;
        row.title = new.title.clone();
        row.degree = new.degree;
        row.shift = new.shift;
        row.department_id = new.department_id;
        Ok(row.clone())
    }

    async fn curriculum_by_sigaa_id(&mut self, sigaa_id: &str) -> Result<Option<Curriculum>, StoreError> {
        Ok(self
            .working
            .tables
            .curricula
            .iter()
            .find(|c| c.sigaa_id == sigaa_id)
            .cloned())
    }

    async fn insert_curriculum(&mut self, new: &NewCurriculum) -> Result<Curriculum, StoreError> {
        let row = Curriculum {
            id: self.working.next_id(),
            sigaa_id: new.sigaa_id.clone(),
            program_id: new.program_id,
            fields: new.fields.clone(),
        };
        self.working.tables.curricula.push(row.clone());
        Ok(row)
    }

    async fn update_curriculum(&mut self, id: i64, new: &NewCurriculum) -> Result<Curriculum, StoreError> {
        let row = self
            .working
            .tables
            .curricula
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| missing(EntityKind::Curriculum, id))?;
        row.sigaa_id = new.sigaa_id.clone();
        row.program_id = new.program_id;
        row.fields = new.fields.clone();
        Ok(row.clone())
    }

    async fn component_by_sigaa_id(&mut self, sigaa_id: &str) -> Result<Option<Component>, StoreError> {
        Ok(self
            .working
            .tables
            .components
            .iter()
            .find(|c| c.sigaa_id == sigaa_id)
            .cloned())
    }

    async fn insert_component(&mut self, new: &NewComponent) -> Result<Component, StoreError> {
        let row = Component {
            id: self.working.next_id(),
            sigaa_id: new.sigaa_id.clone(),
            title: new.title.clone(),
            component_type: new.component_type,
            department_id: new.department_id,
        };
        self.working.tables.components.push(row.clone());
        Ok(row)
    }

    async fn update_component(&mut self, id: i64, new: &NewComponent) -> Result<Component, StoreError> {
        let row = self
            .working
            .tables
            .components
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| missing(EntityKind::Component, id))?;
        row.sigaa_id = new.sigaa_id.clone();
        row.title = new.title.clone();
        row.component_type = new.component_type;
        row.department_id = new.department_id;
        Ok(row.clone())
    }

    async fn curriculum_component(
        &mut self,
        curriculum_id: i64,
        component_id: i64,
    ) -> Result<Option<CurriculumComponent>, StoreError> {
        Ok(self
            .working
            .tables
            .curriculum_components
            .iter()
            .find(|l| l.curriculum_id == curriculum_id && l.component_id == component_id)
            .cloned())
    }

    async fn insert_curriculum_component(
        &mut self,
        curriculum_id: i64,
        component_id: i64,
        role: CurriculumRole,
        prerequisite_percentage: i32,
    ) -> Result<CurriculumComponent, StoreError> {
        let row = CurriculumComponent {
            id: self.working.next_id(),
            curriculum_id,
            component_id,
            role,
            prerequisite_percentage,
        };
        self.working.tables.curriculum_components.push(row.clone());
        Ok(row)
    }

    async fn update_curriculum_component(
        &mut self,
        id: i64,
        role: CurriculumRole,
        prerequisite_percentage: i32,
    ) -> Result<CurriculumComponent, StoreError> {
        let row = self
            .working
            .tables
            .curriculum_components
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| missing(EntityKind::Curriculum, id))?;
        row.role = role;
        row.prerequisite_percentage = prerequisite_percentage;
        Ok(row.clone())
    }

    async fn requisite_groups(
        &mut self,
        kind: RequisiteKind,
        component_id: i64,
    ) -> Result<Vec<Vec<i64>>, StoreError> {
        Ok(self
            .working
            .options_mut(kind)
            .iter()
            .filter(|o| o.component_id == component_id)
            .map(|o| o.members.clone())
            .collect())
    }

    async fn replace_requisite_groups(
        &mut self,
        kind: RequisiteKind,
        component_id: i64,
        groups: &[Vec<i64>],
    ) -> Result<(), StoreError> {
        self.working
            .options_mut(kind)
            .retain(|o| o.component_id != component_id);
        for members in groups {
            let id = self.working.next_id();
            self.working.options_mut(kind).push(RequisiteOption {
                id,
                component_id,
                members: members.clone(),
            });
        }
        Ok(())
    }

    async fn corequisites(&mut self, component_id: i64) -> Result<Vec<i64>, StoreError> {
        Ok(self
            .working
            .tables
            .corequisites
            .iter()
            .filter(|c| c.component_id == component_id)
            .map(|c| c.corequisite_id)
            .collect())
    }

    async fn replace_corequisites(&mut self, component_id: i64, corequisite_ids: &[i64]) -> Result<(), StoreError> {
        self.working
            .tables
            .corequisites
            .retain(|c| c.component_id != component_id);
        for corequisite_id in corequisite_ids {
            let id = self.working.next_id();
            self.working.tables.corequisites.push(CorequisiteRow {
                id,
                component_id,
                corequisite_id: *corequisite_id,
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryCatalogTx { shared, working } = *self;
        *shared.lock().await = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fga() -> NewDepartment {
        NewDepartment {
            sigaa_id: 673,
            acronym: "FGA".into(),
            title: "Faculdade do Gama".into(),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = MemoryCatalogStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_department(&fga()).await.unwrap();
            assert!(tx.department_by_sigaa_id(673).await.unwrap().is_some());
        }
        assert_eq!(store.snapshot().await, CatalogSnapshot::default());
    }

    #[tokio::test]
    async fn committed_writes_are_visible_to_later_transactions() {
        let store = MemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        let inserted = tx.insert_department(&fga()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let by_key = tx
            .department_by_acronym_and_title("FGA", "Faculdade do Gama")
            .await
            .unwrap();
        assert_eq!(by_key, Some(inserted.clone()));
        assert_eq!(tx.department_by_title("Faculdade do Gama").await.unwrap(), Some(inserted));
        assert!(tx.department_by_title("FACULDADE DO GAMA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn replacing_requisite_groups_drops_previous_options() {
        let store = MemoryCatalogStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.replace_requisite_groups(RequisiteKind::Prerequisite, 10, &[vec![1], vec![2, 3]])
            .await
            .unwrap();
        tx.replace_requisite_groups(RequisiteKind::Prerequisite, 10, &[vec![4]])
            .await
            .unwrap();
        assert_eq!(
            tx.requisite_groups(RequisiteKind::Prerequisite, 10).await.unwrap(),
            vec![vec![4]]
        );
        assert!(tx
            .requisite_groups(RequisiteKind::Equivalence, 10)
            .await
            .unwrap()
            .is_empty());
    }
}
