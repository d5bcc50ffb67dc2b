use sqlx::MySqlPool;

use crate::models::employee::EmployeeRow;
use crate::models::feedback::InteractionRow;

pub async fn list_employees(pool: &MySqlPool) -> sqlx::Result<Vec<EmployeeRow>> {
    sqlx::query_as::<_, EmployeeRow>("SELECT * FROM bank_employees ORDER BY name ASC, id ASC")
        .fetch_all(pool)
        .await
}

pub async fn get_employee(pool: &MySqlPool, id: i64) -> sqlx::Result<Option<EmployeeRow>> {
    sqlx::query_as::<_, EmployeeRow>("SELECT * FROM bank_employees WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Returns the raw sqlx error so callers can map duplicate emails to 409.
pub async fn insert_employee(
    pool: &MySqlPool,
    name: &str,
    email: &str,
    department: &str,
    role: &str,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        "INSERT INTO bank_employees (name, email, department, role) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(email)
    .bind(department)
    .bind(role)
    .execute(pool)
    .await?;
    Ok(result.last_insert_id() as i64)
}

pub async fn list_interactions_for_employee(
    pool: &MySqlPool,
    employee_id: i64,
) -> sqlx::Result<Vec<InteractionRow>> {
    sqlx::query_as::<_, InteractionRow>(
        "SELECT * FROM employee_feedback_interactions WHERE employee_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(employee_id)
    .fetch_all(pool)
    .await
}
