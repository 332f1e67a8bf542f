use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = clients)]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = clients)]
pub struct NewClient {
    pub id: Uuid,
    pub name: String,
    pub contact_email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = technicians)]
pub struct Technician {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = technicians)]
pub struct NewTechnician {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = schedules)]
#[diesel(belongs_to(Client))]
pub struct ScheduleRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_ids: Vec<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub service_type: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub priority: String,
    pub notes: Option<String>,
    pub frequency: String,
    pub custom_interval_days: Option<i32>,
    pub days_of_week: Vec<i16>,
    pub day_of_month: Option<i16>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_run_at: Option<NaiveDate>,
    pub last_run_at: Option<NaiveDateTime>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = schedules)]
pub struct NewScheduleRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_ids: Vec<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub service_type: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub priority: String,
    pub notes: Option<String>,
    pub frequency: String,
    pub custom_interval_days: Option<i32>,
    pub days_of_week: Vec<i16>,
    pub day_of_month: Option<i16>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_run_at: Option<NaiveDate>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = service_orders)]
pub struct ServiceOrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub scheduled_at: NaiveDateTime,
    pub scheduled_day: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub state: String,
    pub service_type: String,
    pub priority: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub details: serde_json::Value,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_orders)]
pub struct NewServiceOrderRow {
    pub id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub technician_id: Option<Uuid>,
    pub equipment_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub scheduled_at: NaiveDateTime,
    pub scheduled_day: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub state: String,
    pub service_type: String,
    pub priority: String,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub details: serde_json::Value,
}
