use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{NewTechnician, Technician};
use crate::schema::technicians;
use crate::state::AppState;

use super::clean_text;

#[derive(Deserialize)]
pub struct CreateTechnicianRequest {
    pub name: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Deserialize)]
pub struct TechnicianListQuery {
    pub active: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicianInfo {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub is_active: bool,
}

impl From<Technician> for TechnicianInfo {
    fn from(technician: Technician) -> Self {
        Self {
            id: technician.id,
            name: technician.name,
            phone: technician.phone,
            specialty: technician.specialty,
            is_active: technician.is_active,
        }
    }
}

pub async fn list_technicians(
    State(state): State<AppState>,
    Query(query): Query<TechnicianListQuery>,
) -> AppResult<Json<Vec<TechnicianInfo>>> {
    let mut conn = state.db()?;

    let mut statement = technicians::table.into_boxed();
    if let Some(active) = query.active {
        statement = statement.filter(technicians::is_active.eq(active));
    }
    let rows: Vec<Technician> = statement
        .order(technicians::name.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(TechnicianInfo::from).collect()))
}

pub async fn create_technician(
    State(state): State<AppState>,
    Json(payload): Json<CreateTechnicianRequest>,
) -> AppResult<(StatusCode, Json<TechnicianInfo>)> {
    if payload.name.trim().is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let new_technician = NewTechnician {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        phone: clean_text(payload.phone),
        specialty: clean_text(payload.specialty),
    };

    let mut conn = state.db()?;
    let technician: Technician = diesel::insert_into(technicians::table)
        .values(&new_technician)
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(technician.into())))
}
