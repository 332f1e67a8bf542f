use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    repositories::{
        PgScheduleRepository, PgServiceOrderRepository, ScheduleRepository,
        ServiceOrderRepository,
    },
    scheduling::{Materializer, ScheduleScanner},
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub service_orders: Arc<dyn ServiceOrderRepository>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, jwt: JwtService) -> Self {
        let schedules = Arc::new(PgScheduleRepository::new(pool.clone()));
        let service_orders = Arc::new(PgServiceOrderRepository::new(pool.clone()));
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            schedules,
            service_orders,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn materializer(&self) -> Materializer {
        Materializer::new(self.service_orders.clone())
    }

    pub fn scanner(&self) -> ScheduleScanner {
        ScheduleScanner::new(
            self.schedules.clone(),
            self.materializer(),
            self.config.schedule_scan_concurrency,
        )
    }
}
