use std::{env, sync::Arc};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use tracing_subscriber::EnvFilter;

use servicefrios::{
    config::AppConfig,
    db,
    repositories::{PgScheduleRepository, PgServiceOrderRepository},
    scheduling::{horizon_after, Materializer, ScheduleScanner},
};

const USAGE: &str = "Usage: generate_services [--until YYYY-MM-DD]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let until = match parse_until(env::args().skip(1)) {
        Ok(until) => until,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "generate_services",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        "loaded configuration"
    );

    let horizon = match until {
        Some(until) => until,
        None => horizon_after(Utc::now().date_naive(), config.generation_horizon_days)
            .with_context(|| {
                format!(
                    "GENERATION_HORIZON_DAYS={} is out of range",
                    config.generation_horizon_days
                )
            })?,
    };

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let materializer = Materializer::new(Arc::new(PgServiceOrderRepository::new(pool.clone())));
    let scanner = ScheduleScanner::new(
        Arc::new(PgScheduleRepository::new(pool)),
        materializer,
        config.schedule_scan_concurrency,
    );

    let report = scanner
        .run_due_schedules(horizon)
        .await
        .context("schedule scan failed")?;

    for failure in &report.errors {
        tracing::warn!(
            schedule_id = %failure.schedule_id,
            occurrence = ?failure.occurrence,
            error = %failure.error,
            "generation error"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn parse_until(mut args: impl Iterator<Item = String>) -> Result<Option<NaiveDate>> {
    let mut until = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--until" => {
                let value = args.next().context("--until needs a date")?;
                let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                    .with_context(|| format!("invalid --until date {value:?}"))?;
                until = Some(date);
            }
            other => bail!("unknown argument {other}"),
        }
    }
    Ok(until)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
