//! Scheduled work: the weekly schedule broadcast and the yearly promotion.

use super::outbound::Reply;
use super::{lock, Engine, EngineResult};
use crate::bot::texts;
use crate::storage::models::{Grade, Subscriber, WeekBucket};
use crate::storage::roster::Promotion;
use crate::utils::datetime::week_start;
use crate::utils::logging::{log_broadcast, log_send_failure, log_system_event};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// The last schedule sent for a grade, tagged with the week it was read in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenSchedule {
    pub week_of: NaiveDate,
    pub weeks: Vec<WeekBucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub canonical: bool,
    /// Grades whose schedule went out, and whether it carried the banner.
    pub delivered: Vec<(Grade, bool)>,
    /// Grades skipped because nothing changed.
    pub skipped: Vec<Grade>,
    pub sent: usize,
    pub failed: usize,
}

impl Engine {
    /// Whether `fresh` differs from what was last sent for `grade` in the
    /// same week. A missing record, or one from an earlier week, is a
    /// baseline rather than a change.
    pub(super) fn differs_from_last_seen(&self, grade: Grade, week_of: NaiveDate, fresh: &[WeekBucket]) -> bool {
        lock(&self.last_seen)
            .get(&grade)
            .is_some_and(|seen| seen.week_of == week_of && seen.weeks.as_slice() != fresh)
    }

    /// Sends each grade's schedule to its auto-update subscribers.
    ///
    /// On the canonical weekday every grade is sent. On other days only
    /// grades whose schedule changed since the last send go out, with the
    /// changed banner. A failed fetch abandons the whole run.
    pub async fn broadcast_schedule(&self, today: NaiveDate) -> EngineResult<BroadcastReport> {
        let schedule = match self.fetch_schedule().await {
            Ok(schedule) => schedule,
            Err(e) => {
                error!("Schedule broadcast abandoned, fetch failed: {}", e);
                return Err(e);
            }
        };

        let week_of = week_start(today);
        let mut report = BroadcastReport {
            canonical: today.weekday() == self.settings.canonical_weekday,
            ..BroadcastReport::default()
        };
        // Sends so far in this run, across grades.
        let mut attempts = 0usize;

        for (grade, weeks) in schedule.iter() {
            let changed = self.differs_from_last_seen(grade, week_of, weeks);
            let seen = SeenSchedule {
                week_of,
                weeks: weeks.to_vec(),
            };
            if !changed && !report.canonical {
                debug!("Grade {} unchanged, skipping", grade);
                lock(&self.last_seen).insert(grade, seen);
                report.skipped.push(grade);
                continue;
            }

            let banner = changed && !report.canonical;
            let members: Vec<(String, Subscriber)> = lock(&self.roster)
                .members(grade)
                .filter(|(_, record)| record.wants_update)
                .map(|(id, record)| (id.to_string(), record.clone()))
                .collect();

            let label = self.labels.grade_label(grade);
            for (user, record) in &members {
                if attempts > 0 {
                    tokio::time::sleep(self.settings.send_delay).await;
                }
                attempts += 1;
                let Ok(chat_id) = user.parse::<i64>() else {
                    report.failed += 1;
                    continue;
                };
                let text = texts::format_schedule(label, schedule.upcoming(grade, record.horizon_weeks()), banner);
                match self.outbound.send(chat_id, Reply::markdown(text)).await {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        log_send_failure("weekly_schedule", chat_id, &e.to_string());
                        report.failed += 1;
                    }
                }
            }

            lock(&self.last_seen).insert(grade, seen);
            report.delivered.push((grade, banner));
        }

        self.persist_bot_data();
        log_broadcast(
            "weekly_schedule",
            report.sent,
            report.failed,
            Some(&format!(
                "canonical={} delivered={} skipped={}",
                report.canonical,
                report.delivered.len(),
                report.skipped.len()
            )),
        );
        Ok(report)
    }

    /// Moves every grade up a year and rebuilds the affected users' data.
    pub fn promote_grades(&self) -> EngineResult<Promotion> {
        let promotion = self.update_roster(|roster| roster.promote())?;
        for user in &promotion.affected {
            if let Ok(user_id) = user.parse() {
                self.refresh_user_data(user_id);
            }
        }
        // Last-seen schedules are keyed by grade, which now holds a different cohort.
        lock(&self.last_seen).clear();
        self.persist_bot_data();

        log_system_event(
            "GRADE_PROMOTION",
            Some(&format!(
                "{} users moved, {} graduated",
                promotion.affected.len(),
                promotion.graduated.len()
            )),
        );
        Ok(promotion)
    }
}
