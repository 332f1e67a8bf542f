use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, Json};
use diesel::{dsl::count_star, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Client, NewClient};
use crate::schema::{clients, schedules};
use crate::state::AppState;

use super::{clean_text, to_iso};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
    pub schedule_count: i64,
}

pub async fn list_clients(State(state): State<AppState>) -> AppResult<Json<Vec<ClientSummary>>> {
    let mut conn = state.db()?;

    let client_list: Vec<Client> = clients::table.order(clients::name.asc()).load(&mut conn)?;

    let schedule_rows: Vec<(Uuid, i64)> = schedules::table
        .group_by(schedules::client_id)
        .select((schedules::client_id, count_star()))
        .load(&mut conn)?;
    let schedule_counts: HashMap<Uuid, i64> = schedule_rows.into_iter().collect();

    let response = client_list
        .into_iter()
        .map(|client| {
            let schedule_count = schedule_counts.get(&client.id).copied().unwrap_or(0);
            to_summary(client, schedule_count)
        })
        .collect();

    Ok(Json(response))
}

pub async fn create_client(
    State(state): State<AppState>,
    Json(payload): Json<CreateClientRequest>,
) -> AppResult<(StatusCode, Json<ClientSummary>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let new_client = NewClient {
        id: Uuid::new_v4(),
        name: name.to_string(),
        contact_email: clean_text(payload.contact_email),
        phone: clean_text(payload.phone),
        address: clean_text(payload.address),
    };

    let mut conn = state.db()?;
    let client: Client = diesel::insert_into(clients::table)
        .values(&new_client)
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(to_summary(client, 0))))
}

fn to_summary(client: Client, schedule_count: i64) -> ClientSummary {
    ClientSummary {
        id: client.id,
        name: client.name,
        contact_email: client.contact_email,
        phone: client.phone,
        address: client.address,
        created_at: to_iso(client.created_at),
        schedule_count,
    }
}
