use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::employees::repository::{
    get_employee, insert_employee, list_employees, list_interactions_for_employee,
};
use crate::errors::{conflict_on_duplicate, AppError, AppJson};
use crate::models::employee::EmployeeRow;
use crate::models::feedback::InteractionRow;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NewEmployeeRequest {
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: String,
}

#[derive(Debug, PartialEq)]
pub struct ValidEmployee {
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: String,
}

/// Trims every field, lowercases the email and rejects blanks.
pub fn validate_employee(req: NewEmployeeRequest) -> Result<ValidEmployee, AppError> {
    let required = |field: &str, value: String| -> Result<String, AppError> {
        let value = value.trim().to_string();
        if value.is_empty() {
            return Err(AppError::Validation(format!("{field} cannot be empty")));
        }
        if value.chars().count() > 255 {
            return Err(AppError::Validation(format!(
                "{field} must be at most 255 characters"
            )));
        }
        Ok(value)
    };

    let email = required("email", req.email)?.to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => {
            return Err(AppError::Validation(format!(
                "'{email}' is not a valid email address"
            )))
        }
    }

    Ok(ValidEmployee {
        name: required("name", req.name)?,
        email,
        department: required("department", req.department)?,
        role: required("role", req.role)?,
    })
}

/// GET /api/employees
pub async fn handle_list_employees(
    State(state): State<AppState>,
) -> Result<Json<Vec<EmployeeRow>>, AppError> {
    Ok(Json(list_employees(&state.db).await?))
}

/// POST /api/employees
pub async fn handle_create_employee(
    State(state): State<AppState>,
    AppJson(req): AppJson<NewEmployeeRequest>,
) -> Result<(StatusCode, Json<EmployeeRow>), AppError> {
    let employee = validate_employee(req)?;
    let id = insert_employee(
        &state.db,
        &employee.name,
        &employee.email,
        &employee.department,
        &employee.role,
    )
    .await
    .map_err(|e| {
        conflict_on_duplicate(e, format!("Employee with email {} already exists", employee.email))
    })?;

    let row = get_employee(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Employee {id} not found")))?;
    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/employees/:id
pub async fn handle_get_employee(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EmployeeRow>, AppError> {
    get_employee(&state.db, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Employee {id} not found")))
}

/// GET /api/employees/:id/interactions
pub async fn handle_list_employee_interactions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<InteractionRow>>, AppError> {
    get_employee(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Employee {id} not found")))?;
    Ok(Json(list_interactions_for_employee(&state.db, id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str) -> NewEmployeeRequest {
        NewEmployeeRequest {
            name: " Asha Rao ".to_string(),
            email: email.to_string(),
            department: "Digital Channels".to_string(),
            role: "Support Lead".to_string(),
        }
    }

    #[test]
    fn test_employee_fields_are_trimmed_and_email_lowercased() {
        let valid = validate_employee(request(" Asha.Rao@Bank.example ")).unwrap();
        assert_eq!(valid.name, "Asha Rao");
        assert_eq!(valid.email, "asha.rao@bank.example");
    }

    #[test]
    fn test_employee_rejects_bad_email() {
        for email in ["", "no-at-sign", "@bank.example", "asha@localhost"] {
            assert!(
                matches!(validate_employee(request(email)), Err(AppError::Validation(_))),
                "accepted {email:?}"
            );
        }
    }

    #[test]
    fn test_employee_rejects_blank_role() {
        let mut req = request("asha@bank.example");
        req.role = "  ".to_string();
        assert!(matches!(validate_employee(req), Err(AppError::Validation(_))));
    }
}
