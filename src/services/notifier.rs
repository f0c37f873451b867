use crate::engine::Engine;
use crate::utils::logging::log_system_event;
use chrono::Utc;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// Daily schedule check, 05:00 UTC. Grades only go out on the canonical
/// weekday or when their schedule changed.
pub const SCHEDULE_CHECK_CRON: &str = "0 0 5 * * *";

/// Yearly promotion, 1 September 04:00 UTC.
pub const PROMOTION_CRON: &str = "0 0 4 1 9 *";

pub struct NotifierService {
    engine: Arc<Engine>,
    scheduler: JobScheduler,
    job_ids: Vec<Uuid>,
}

impl NotifierService {
    pub async fn new(engine: Arc<Engine>) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            engine,
            scheduler,
            job_ids: Vec::new(),
        })
    }

    pub async fn start(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let engine = self.engine.clone();
        let schedule_job = Job::new_async(SCHEDULE_CHECK_CRON, move |_uuid, _l| {
            let engine = engine.clone();
            Box::pin(async move {
                if let Err(e) = engine.broadcast_schedule(Utc::now().date_naive()).await {
                    tracing::error!("Scheduled schedule broadcast failed: {}", e);
                }
            })
        })?;

        let engine = self.engine.clone();
        let promotion_job = Job::new_async(PROMOTION_CRON, move |_uuid, _l| {
            let engine = engine.clone();
            Box::pin(async move {
                if let Err(e) = engine.promote_grades() {
                    tracing::error!("Yearly grade promotion failed: {}", e);
                }
            })
        })?;

        self.job_ids.push(self.scheduler.add(schedule_job).await?);
        self.job_ids.push(self.scheduler.add(promotion_job).await?);
        self.scheduler.start().await?;

        log_system_event(
            "NOTIFIER_STARTED",
            Some(&format!("schedule check '{SCHEDULE_CHECK_CRON}', promotion '{PROMOTION_CRON}' (UTC)")),
        );
        Ok(())
    }

    pub fn job_ids(&self) -> &[Uuid] {
        &self.job_ids
    }

    pub async fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for id in self.job_ids.drain(..) {
            self.scheduler.remove(&id).await?;
        }
        self.scheduler.shutdown().await?;
        Ok(())
    }

    // Manual trigger, same path as the daily job
    pub async fn run_broadcast_now(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.engine.broadcast_schedule(Utc::now().date_naive()).await?;
        Ok(())
    }
}
