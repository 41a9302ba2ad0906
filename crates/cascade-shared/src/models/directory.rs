//! # Directory Tables (read-only)
//!
//! Employees, departments and the project dictionary are owned by an
//! external system; the engine only reads them. An approval node is an
//! organization position: "whoever sits here approves". A position with no
//! active employee is an empty post and is auto-approved.

use crate::errors::{CascadeError, CascadeResult};

/// Length of a second-level department code prefix
const SECOND_LEVEL_CODE_LEN: usize = 5;

/// An employee row (`oa_employee`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Employee {
    pub id: i64,
    pub name: Option<String>,
    pub job_number: String,
    pub organization_id: Option<i64>,
    pub enable: bool,
}

impl Employee {
    pub async fn find_active_by_job_number<'e, E>(
        executor: E,
        job_number: &str,
    ) -> CascadeResult<Option<Employee>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Employee>(
            "SELECT id, name, job_number, organization_id, enable
             FROM oa_employee WHERE job_number = $1 AND enable = TRUE",
        )
        .bind(job_number)
        .fetch_optional(executor)
        .await
        .map_err(|e| CascadeError::database("employee.find_active_by_job_number", e))
    }

    pub async fn by_job_numbers<'e, E>(
        executor: E,
        job_numbers: &[String],
    ) -> CascadeResult<Vec<Employee>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Employee>(
            "SELECT id, name, job_number, organization_id, enable
             FROM oa_employee WHERE job_number = ANY($1)",
        )
        .bind(job_numbers)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("employee.by_job_numbers", e))
    }

    /// Whether any active employee sits at the given organization position
    pub async fn exists_active_in_position<'e, E>(
        executor: E,
        organization_id: i64,
    ) -> CascadeResult<bool>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM oa_employee
                WHERE organization_id = $1 AND enable = TRUE
            )",
        )
        .bind(organization_id)
        .fetch_one(executor)
        .await
        .map_err(|e| CascadeError::database("employee.exists_active_in_position", e))
    }
}

/// A department row (`oa_department`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Department {
    pub id: i64,
    pub name: Option<String>,
    pub code: Option<String>,
    pub parent_id: Option<i64>,
    pub enable: bool,
}

impl Department {
    pub async fn by_ids<'e, E>(executor: E, ids: &[i64]) -> CascadeResult<Vec<Department>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Department>(
            "SELECT id, name, code, parent_id, enable FROM oa_department WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("department.by_ids", e))
    }

    pub async fn by_codes<'e, E>(executor: E, codes: &[String]) -> CascadeResult<Vec<Department>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, Department>(
            "SELECT id, name, code, parent_id, enable FROM oa_department WHERE code = ANY($1)",
        )
        .bind(codes)
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("department.by_codes", e))
    }
}

/// A project dictionary entry (`dict_project`)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectDictEntry {
    pub project_id: i64,
    pub name: String,
}

impl ProjectDictEntry {
    pub async fn all<'e, E>(executor: E) -> CascadeResult<Vec<ProjectDictEntry>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query_as::<_, ProjectDictEntry>(
            "SELECT project_id, name FROM dict_project WHERE enable = TRUE ORDER BY project_id",
        )
        .fetch_all(executor)
        .await
        .map_err(|e| CascadeError::database("project_dict.all", e))
    }
}

/// Second-level department code: the first five characters of a department
/// code (two digits for the first level, letter plus two digits for the
/// second). Codes shorter than five characters are returned unchanged.
pub fn second_level_dept_code(code: &str) -> Option<&str> {
    if code.is_empty() {
        return None;
    }
    if code.len() < SECOND_LEVEL_CODE_LEN {
        return Some(code);
    }
    code.get(..SECOND_LEVEL_CODE_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_level_code_takes_five_char_prefix() {
        assert_eq!(second_level_dept_code("02A01B01C01"), Some("02A01"));
        assert_eq!(second_level_dept_code("02A01"), Some("02A01"));
    }

    #[test]
    fn short_codes_pass_through() {
        assert_eq!(second_level_dept_code("02"), Some("02"));
        assert_eq!(second_level_dept_code(""), None);
    }
}
