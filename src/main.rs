use anyhow::Context;
use chrono::{Local, Utc};
use env_logger::{Env, Target};
use std::io::Write;

use referee::{
    config::Config,
    database::{create_pool, run_migrations},
    services::{ParticipantService, PrizeService, TimePeriodService},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    let config = Config::from_toml().context("Failed to load configuration")?;

    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database connection pool")?;

    run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let periods = TimePeriodService::new(pool.clone());
    let participants = ParticipantService::new(
        pool.clone(),
        config.engine.chance_rule,
        config.engine.initial_chances,
    );
    let prizes = PrizeService::new(pool, config.engine.claim_policy()?, participants);

    let now = Utc::now();
    let Some(current) = periods.current().await? else {
        log::warn!("No current time period, nothing to allocate");
        return Ok(());
    };

    log::info!(
        "Current period '{}' started {} ({} past periods)",
        current.name,
        current.period_start,
        periods.past(now).await?.len()
    );
    for view in prizes.availability(current.id, now).await? {
        log::info!("{}", serde_json::to_string(&view)?);
    }

    Ok(())
}
