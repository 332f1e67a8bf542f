use std::env;

use anyhow::{anyhow, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::NaiveDate;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

use servicefrios::auth::jwt::JwtService;
use servicefrios::auth::ROLE_ADMIN;
use servicefrios::config::AppConfig;
use servicefrios::db::{self, PgPool};
use servicefrios::models::{NewClient, NewScheduleRow, NewServiceOrderRow, NewTechnician};
use servicefrios::routes;
use servicefrios::state::AppState;

#[allow(dead_code)]
pub mod memory;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: 4,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            generation_horizon_days: 30,
            schedule_scan_concurrency: 2,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(pool, config, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self { state, router })
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub fn admin_token(&self) -> Result<String> {
        self.state
            .jwt
            .generate_token(Uuid::new_v4(), "admin", ROLE_ADMIN)
    }

    pub fn token_with_role(&self, role: &str) -> Result<String> {
        self.state.jwt.generate_token(Uuid::new_v4(), "operator", role)
    }

    pub async fn insert_client(&self, name: &str) -> Result<Uuid> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let client = NewClient {
                id: Uuid::new_v4(),
                name,
                contact_email: None,
                phone: None,
                address: None,
            };
            diesel::insert_into(servicefrios::schema::clients::table)
                .values(&client)
                .execute(conn)
                .context("failed to insert client")?;
            Ok(client.id)
        })
        .await
    }

    pub async fn insert_technician(&self, name: &str) -> Result<Uuid> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let technician = NewTechnician {
                id: Uuid::new_v4(),
                name,
                phone: None,
                specialty: Some("refrigeration".to_string()),
            };
            diesel::insert_into(servicefrios::schema::technicians::table)
                .values(&technician)
                .execute(conn)
                .context("failed to insert technician")?;
            Ok(technician.id)
        })
        .await
    }

    /// Writes a schedule row as-is, bypassing API validation.
    #[allow(dead_code)]
    pub async fn insert_schedule_row(&self, row: NewScheduleRow) -> Result<Uuid> {
        self.with_conn(move |conn| {
            diesel::insert_into(servicefrios::schema::schedules::table)
                .values(&row)
                .execute(conn)
                .context("failed to insert schedule")?;
            Ok(row.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn insert_order_row(&self, row: NewServiceOrderRow) -> Result<Uuid> {
        self.with_conn(move |conn| {
            diesel::insert_into(servicefrios::schema::service_orders::table)
                .values(&row)
                .execute(conn)
                .context("failed to insert service order")?;
            Ok(row.id)
        })
        .await
    }

    pub async fn order_days(&self, schedule_id: Uuid) -> Result<Vec<NaiveDate>> {
        self.with_conn(move |conn| {
            use servicefrios::schema::service_orders::dsl;
            let days = dsl::service_orders
                .filter(dsl::schedule_id.eq(schedule_id))
                .order(dsl::scheduled_day.asc())
                .select(dsl::scheduled_day)
                .load::<NaiveDate>(conn)
                .context("failed to load service orders")?;
            Ok(days)
        })
        .await
    }

    pub async fn order_count(&self) -> Result<i64> {
        self.with_conn(|conn| {
            use servicefrios::schema::service_orders::dsl;
            let count = dsl::service_orders
                .count()
                .get_result::<i64>(conn)
                .context("failed to count service orders")?;
            Ok(count)
        })
        .await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::POST, path, Body::from(body), token, true)
            .await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::POST, path, Body::empty(), token, false)
            .await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        self.send(Method::PATCH, path, Body::from(body), token, true)
            .await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::GET, path, Body::empty(), token, false)
            .await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send(Method::DELETE, path, Body::empty(), token, false)
            .await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Body,
        token: Option<&str>,
        json: bool,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if json {
            builder = builder.header("content-type", "application/json");
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(body)?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

#[allow(dead_code)]
pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_json(body: Body) -> Result<serde_json::Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[allow(dead_code)]
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        db::run_migrations(&pool)?;
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE service_orders, schedules, technicians, clients RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
