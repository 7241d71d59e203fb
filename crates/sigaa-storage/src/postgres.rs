use async_trait::async_trait;
use sigaa_core::{
    Component, ComponentType, Curriculum, CurriculumComponent, CurriculumFields, CurriculumRole,
    Degree, Department, EntityKind, NewComponent, NewCurriculum, NewDepartment, NewProgram,
    Program, Shift,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use tracing::info;

use crate::{CatalogStore, CatalogTx, RequisiteKind, StoreError};

const DEPARTMENT_COLUMNS: &str = "id, sigaa_id, acronym, title";
const PROGRAM_COLUMNS: &str = "id, sigaa_id, title, degree, shift, department_id";
const CURRICULUM_COLUMNS: &str = "id, sigaa_id, program_id, active, start_year, start_period, \
    min_periods, max_periods, min_period_workload, max_period_workload, min_workload, \
    mandatory_components_workload, min_elective_components_workload, \
    max_elective_components_workload, min_complementary_components_workload, \
    max_complementary_components_workload";
const COMPONENT_COLUMNS: &str = "id, sigaa_id, title, type, department_id";
const LINK_COLUMNS: &str = "id, curriculum_id, component_id, type, percentage_prerequisite";

#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("catalog migrations applied");
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn begin(&self) -> Result<Box<dyn CatalogTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCatalogTx { tx }))
    }
}

struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

#[derive(FromRow)]
struct ProgramRow {
    id: i64,
    sigaa_id: i64,
    title: String,
    degree: Option<String>,
    shift: Option<String>,
    department_id: i64,
}

impl From<ProgramRow> for Program {
    fn from(row: ProgramRow) -> Self {
        Program {
            id: row.id,
            sigaa_id: row.sigaa_id,
            title: row.title,
            degree: Degree::from_db_str(row.degree.as_deref()),
            shift: Shift::from_db_str(row.shift.as_deref()),
            department_id: row.department_id,
        }
    }
}

#[derive(FromRow)]
struct DepartmentRow {
    id: i64,
    sigaa_id: i64,
    acronym: String,
    title: String,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Department {
            id: row.id,
            sigaa_id: row.sigaa_id,
            acronym: row.acronym,
            title: row.title,
        }
    }
}

#[derive(FromRow)]
struct CurriculumRow {
    id: i64,
    sigaa_id: String,
    program_id: i64,
    active: bool,
    start_year: i32,
    start_period: i32,
    min_periods: i32,
    max_periods: i32,
    min_period_workload: i32,
    max_period_workload: i32,
    min_workload: i32,
    mandatory_components_workload: i32,
    min_elective_components_workload: i32,
    max_elective_components_workload: i32,
    min_complementary_components_workload: i32,
    max_complementary_components_workload: i32,
}

impl From<CurriculumRow> for Curriculum {
    fn from(row: CurriculumRow) -> Self {
        Curriculum {
            id: row.id,
            sigaa_id: row.sigaa_id,
            program_id: row.program_id,
            fields: CurriculumFields {
                active: row.active,
                start_year: row.start_year,
                start_period: row.start_period,
                min_periods: row.min_periods,
                max_periods: row.max_periods,
                min_period_workload: row.min_period_workload,
                max_period_workload: row.max_period_workload,
                min_workload: row.min_workload,
                mandatory_components_workload: row.mandatory_components_workload,
                min_elective_components_workload: row.min_elective_components_workload,
                max_elective_components_workload: row.max_elective_components_workload,
                min_complementary_components_workload: row.min_complementary_components_workload,
                max_complementary_components_workload: row.max_complementary_components_workload,
            },
        }
    }
}

#[derive(FromRow)]
struct ComponentRow {
    id: i64,
    sigaa_id: String,
    title: String,
    #[sqlx(rename = "type")]
    component_type: String,
    department_id: i64,
}

impl TryFrom<ComponentRow> for Component {
    type Error = StoreError;

    fn try_from(row: ComponentRow) -> Result<Self, Self::Error> {
        let component_type =
            ComponentType::from_db_str(&row.component_type).ok_or_else(|| StoreError::CorruptRow {
                table: "component",
                detail: format!("type={}", row.component_type),
            })?;
        Ok(Component {
            id: row.id,
            sigaa_id: row.sigaa_id,
            title: row.title,
            component_type,
            department_id: row.department_id,
        })
    }
}

#[derive(FromRow)]
struct LinkRow {
    id: i64,
    curriculum_id: i64,
    component_id: i64,
    #[sqlx(rename = "type")]
    role: String,
    percentage_prerequisite: i32,
}

impl TryFrom<LinkRow> for CurriculumComponent {
    type Error = StoreError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        let role = CurriculumRole::from_db_str(&row.role).ok_or_else(|| StoreError::CorruptRow {
            table: "curriculum_component",
            detail: format!("type={}", row.role),
        })?;
        Ok(CurriculumComponent {
            id: row.id,
            curriculum_id: row.curriculum_id,
            component_id: row.component_id,
            role,
            prerequisite_percentage: row.percentage_prerequisite,
        })
    }
}

fn option_tables(kind: RequisiteKind) -> (&'static str, &'static str, &'static str) {
    match kind {
        RequisiteKind::Prerequisite => (
            "prerequisite_option",
            "prerequisite_component",
            "prerequisite_option_id",
        ),
        RequisiteKind::Equivalence => (
            "equivalence_option",
            "equivalence_component",
            "equivalence_option_id",
        ),
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn department_by_sigaa_id(&mut self, sigaa_id: i64) -> Result<Option<Department>, StoreError> {
        let sql = format!("SELECT {DEPARTMENT_COLUMNS} FROM department WHERE sigaa_id = $1");
        let row = sqlx::query_as::<_, DepartmentRow>(&sql)
            .bind(sigaa_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn department_by_acronym_and_title(
        &mut self,
        acronym: &str,
        title: &str,
    ) -> Result<Option<Department>, StoreError> {
        let sql = format!(
            "SELECT {DEPARTMENT_COLUMNS} FROM department WHERE acronym = $1 AND title = $2 ORDER BY id LIMIT 1"
        );
        let row = sqlx::query_as::<_, DepartmentRow>(&sql)
            .bind(acronym)
            .bind(title)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn department_by_title(&mut self, title: &str) -> Result<Option<Department>, StoreError> {
        let sql = format!("SELECT {DEPARTMENT_COLUMNS} FROM department WHERE title = $1 ORDER BY id LIMIT 1");
        let row = sqlx::query_as::<_, DepartmentRow>(&sql)
            .bind(title)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn insert_department(&mut self, new: &NewDepartment) -> Result<Department, StoreError> {
        let sql = format!(
            "INSERT INTO department (sigaa_id, acronym, title) VALUES ($1, $2, $3) RETURNING {DEPARTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DepartmentRow>(&sql)
            .bind(new.sigaa_id)
            .bind(&new.acronym)
            .bind(&new.title)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.into())
    }

    async fn update_department(&mut self, id: i64, new: &NewDepartment) -> Result<Department, StoreError> {
        let sql = format!(
            "UPDATE department SET sigaa_id = $2, acronym = $3, title = $4 WHERE id = $1 RETURNING {DEPARTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DepartmentRow>(&sql)
            .bind(id)
            .bind(new.sigaa_id)
            .bind(&new.acronym)
            .bind(&new.title)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Into::into).ok_or(StoreError::MissingRow {
            entity: EntityKind::Department,
            id,
        })
    }

    async fn program_by_sigaa_id(&mut self, sigaa_id: i64) -> Result<Option<Program>, StoreError> {
        let sql = format!("SELECT {PROGRAM_COLUMNS} FROM program WHERE sigaa_id = $1");
        let row = sqlx::query_as::<_, ProgramRow>(&sql)
            .bind(sigaa_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn insert_program(&mut self, new: &NewProgram) -> Result<Program, StoreError> {
        let sql = format!(
            "INSERT INTO program (sigaa_id, title, degree, shift, department_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PROGRAM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProgramRow>(&sql)
            .bind(new.sigaa_id)
            .bind(&new.title)
            .bind(new.degree.as_db_str())
            .bind(new.shift.as_db_str())
            .bind(new.department_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.into())
    }

    async fn update_program(&mut self, id: i64, new: &NewProgram) -> Result<Program, StoreError> {
        let sql = format!(
            "UPDATE program SET sigaa_id = $2, title = $3, degree = $4, shift = $5, department_id = $6 \
             WHERE id = $1 RETURNING {PROGRAM_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProgramRow>(&sql)
            .bind(id)
            .bind(new.sigaa_id)
            .bind(&new.title)
            .bind(new.degree.as_db_str())
            .bind(new.shift.as_db_str())
            .bind(new.department_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Into::into).ok_or(StoreError::MissingRow {
            entity: EntityKind::Program,
            id,
        })
    }

    async fn curriculum_by_sigaa_id(&mut self, sigaa_id: &str) -> Result<Option<Curriculum>, StoreError> {
        let sql = format!("SELECT {CURRICULUM_COLUMNS} FROM curriculum WHERE sigaa_id = $1");
        let row = sqlx::query_as::<_, CurriculumRow>(&sql)
            .bind(sigaa_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn insert_curriculum(&mut self, new: &NewCurriculum) -> Result<Curriculum, StoreError> {
        let sql = format!(
            "INSERT INTO curriculum (sigaa_id, program_id, active, start_year, start_period, \
             min_periods, max_periods, min_period_workload, max_period_workload, min_workload, \
             mandatory_components_workload, min_elective_components_workload, \
             max_elective_components_workload, min_complementary_components_workload, \
             max_complementary_components_workload) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {CURRICULUM_COLUMNS}"
        );
        let f = &new.fields;
        let row = sqlx::query_as::<_, CurriculumRow>(&sql)
            .bind(&new.sigaa_id)
            .bind(new.program_id)
            .bind(f.active)
            .bind(f.start_year)
            .bind(f.start_period)
            .bind(f.min_periods)
            .bind(f.max_periods)
            .bind(f.min_period_workload)
            .bind(f.max_period_workload)
            .bind(f.min_workload)
            .bind(f.mandatory_components_workload)
            .bind(f.min_elective_components_workload)
            .bind(f.max_elective_components_workload)
            .bind(f.min_complementary_components_workload)
            .bind(f.max_complementary_components_workload)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row.into())
    }

    async fn update_curriculum(&mut self, id: i64, new: &NewCurriculum) -> Result<Curriculum, StoreError> {
        let sql = format!(
            "UPDATE curriculum SET sigaa_id = $2, program_id = $3, active = $4, start_year = $5, \
             start_period = $6, min_periods = $7, max_periods = $8, min_period_workload = $9, \
             max_period_workload = $10, min_workload = $11, mandatory_components_workload = $12, \
             min_elective_components_workload = $13, max_elective_components_workload = $14, \
             min_complementary_components_workload = $15, max_complementary_components_workload = $16 \
             WHERE id = $1 RETURNING {CURRICULUM_COLUMNS}"
        );
        let f = &new.fields;
        let row = sqlx::query_as::<_, CurriculumRow>(&sql)
            .bind(id)
            .bind(&new.sigaa_id)
            .bind(new.program_id)
            .bind(f.active)
            .bind(f.start_year)
            .bind(f.start_period)
            .bind(f.min_periods)
            .bind(f.max_periods)
            .bind(f.min_period_workload)
            .bind(f.max_period_workload)
            .bind(f.min_workload)
            .bind(f.mandatory_components_workload)
            .bind(f.min_elective_components_workload)
            .bind(f.max_elective_components_workload)
            .bind(f.min_complementary_components_workload)
            .bind(f.max_complementary_components_workload)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Into::into).ok_or(StoreError::MissingRow {
            entity: EntityKind::Curriculum,
            id,
        })
    }

    async fn component_by_sigaa_id(&mut self, sigaa_id: &str) -> Result<Option<Component>, StoreError> {
        let sql = format!("SELECT {COMPONENT_COLUMNS} FROM component WHERE sigaa_id = $1");
        let row = sqlx::query_as::<_, ComponentRow>(&sql)
            .bind(sigaa_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Component::try_from).transpose()
    }

    async fn insert_component(&mut self, new: &NewComponent) -> Result<Component, StoreError> {
        let sql = format!(
            "INSERT INTO component (sigaa_id, title, type, department_id) VALUES ($1, $2, $3, $4) \
             RETURNING {COMPONENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ComponentRow>(&sql)
            .bind(&new.sigaa_id)
            .bind(&new.title)
            .bind(new.component_type.as_db_str())
            .bind(new.department_id)
            .fetch_one(&mut *self.tx)
            .await?;
        row.try_into()
    }

    async fn update_component(&mut self, id: i64, new: &NewComponent) -> Result<Component, StoreError> {
        let sql = format!(
            "UPDATE component SET sigaa_id = $2, title = $3, type = $4, department_id = $5 \
             WHERE id = $1 RETURNING {COMPONENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ComponentRow>(&sql)
            .bind(id)
            .bind(&new.sigaa_id)
            .bind(&new.title)
            .bind(new.component_type.as_db_str())
            .bind(new.department_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.ok_or(StoreError::MissingRow {
            entity: EntityKind::Component,
            id,
        })?
        .try_into()
    }

    async fn curriculum_component(
        &mut self,
        curriculum_id: i64,
        component_id: i64,
    ) -> Result<Option<CurriculumComponent>, StoreError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM curriculum_component WHERE curriculum_id = $1 AND component_id = $2"
        );
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(curriculum_id)
            .bind(component_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(CurriculumComponent::try_from).transpose()
    }

    async fn insert_curriculum_component(
        &mut self,
        curriculum_id: i64,
        component_id: i64,
        role: CurriculumRole,
        prerequisite_percentage: i32,
    ) -> Result<CurriculumComponent, StoreError> {
        let sql = format!(
            "INSERT INTO curriculum_component (curriculum_id, component_id, type, percentage_prerequisite) \
             VALUES ($1, $2, $3, $4) RETURNING {LINK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(curriculum_id)
            .bind(component_id)
            .bind(role.as_db_str())
            .bind(prerequisite_percentage)
            .fetch_one(&mut *self.tx)
            .await?;
        row.try_into()
    }

    async fn update_curriculum_component(
        &mut self,
        id: i64,
        role: CurriculumRole,
        prerequisite_percentage: i32,
    ) -> Result<CurriculumComponent, StoreError> {
        let sql = format!(
            "UPDATE curriculum_component SET type = $2, percentage_prerequisite = $3 WHERE id = $1 \
             RETURNING {LINK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(id)
            .bind(role.as_db_str())
            .bind(prerequisite_percentage)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.ok_or(StoreError::MissingRow {
            entity: EntityKind::Curriculum,
            id,
        })?
        .try_into()
    }

    async fn requisite_groups(
        &mut self,
        kind: RequisiteKind,
        component_id: i64,
    ) -> Result<Vec<Vec<i64>>, StoreError> {
        let (options, members, fk) = option_tables(kind);
        let sql = format!(
            "SELECT o.id, m.component_id FROM {options} o JOIN {members} m ON m.{fk} = o.id \
             WHERE o.component_id = $1 ORDER BY o.id, m.id"
        );
        let rows: Vec<(i64, i64)> = sqlx::query_as(&sql)
            .bind(component_id)
            .fetch_all(&mut *self.tx)
            .await?;

        let mut groups: Vec<(i64, Vec<i64>)> = Vec::new();
        for (option_id, member_id) in rows {
            match groups.last_mut() {
                Some((id, group)) if *id == option_id => group.push(member_id),
                _ => groups.push((option_id, vec![member_id])),
            }
        }
        Ok(groups.into_iter().map(|(_, group)| group).collect())
    }

    async fn replace_requisite_groups(
        &mut self,
        kind: RequisiteKind,
        component_id: i64,
        groups: &[Vec<i64>],
    ) -> Result<(), StoreError> {
        let (options, members, fk) = option_tables(kind);
        sqlx::query(&format!(
            "DELETE FROM {members} WHERE {fk} IN (SELECT id FROM {options} WHERE component_id = $1)"
        ))
        .bind(component_id)
        .execute(&mut *self.tx)
        .await?;
        sqlx::query(&format!("DELETE FROM {options} WHERE component_id = $1"))
            .bind(component_id)
            .execute(&mut *self.tx)
            .await?;

        let insert_option = format!("INSERT INTO {options} (component_id) VALUES ($1) RETURNING id");
        let insert_member = format!("INSERT INTO {members} (component_id, {fk}) VALUES ($1, $2)");
        for group in groups {
            let (option_id,): (i64,) = sqlx::query_as(&insert_option)
                .bind(component_id)
                .fetch_one(&mut *self.tx)
                .await?;
            for member in group {
                sqlx::query(&insert_member)
                    .bind(*member)
                    .bind(option_id)
                    .execute(&mut *self.tx)
                    .await?;
            }
        }
        Ok(())
    }

    async fn corequisites(&mut self, component_id: i64) -> Result<Vec<i64>, StoreError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT corequisite_id FROM corequisite WHERE component_id = $1 ORDER BY id")
                .bind(component_id)
                .fetch_all(&mut *self.tx)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn replace_corequisites(&mut self, component_id: i64, corequisite_ids: &[i64]) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM corequisite WHERE component_id = $1")
            .bind(component_id)
            .execute(&mut *self.tx)
            .await?;
        for corequisite_id in corequisite_ids {
            sqlx::query("INSERT INTO corequisite (component_id, corequisite_id) VALUES ($1, $2)")
                .bind(component_id)
                .bind(*corequisite_id)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
