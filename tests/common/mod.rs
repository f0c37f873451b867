#![allow(clippy::unwrap_used)]
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use exam_notifier_bot::bot::commands::MenuLabels;
use exam_notifier_bot::engine::{Engine, EngineSettings, Inbound, Outbound, OutboundError, Reply};
use exam_notifier_bot::services::schedule_source::{ScheduleError, ScheduleSource};
use exam_notifier_bot::storage::models::{Event, EventCategory, Grade, Schedule, Subscriber};
use exam_notifier_bot::storage::persistence::SnapshotPersistence;
use exam_notifier_bot::storage::roster::{Roster, RosterStore};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const MAINTAINER: u64 = 1000001;
pub const ALICE: u64 = 2000001;
pub const BOB: u64 = 2000002;
pub const CAROL: u64 = 2000003;

/// Records everything the engine sends. Chats listed in `failing` refuse
/// every delivery.
#[derive(Default)]
pub struct RecordingOutbound {
    pub sent: Mutex<Vec<(i64, Reply)>>,
    pub copies: Mutex<Vec<(i64, i64, i32)>>,
    pub failing: Mutex<HashSet<i64>>,
}

impl RecordingOutbound {
    pub fn fail_for(&self, chat_id: i64) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn replies_to(&self, chat_id: i64) -> Vec<Reply> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, reply)| reply.clone())
            .collect()
    }

    pub fn last_text(&self, chat_id: i64) -> String {
        self.replies_to(chat_id)
            .last()
            .map(|reply| reply.text.clone())
            .unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.copies.lock().unwrap().clear();
    }

    fn check(&self, chat_id: i64) -> Result<(), OutboundError> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(OutboundError::Request {
                chat_id,
                reason: "Forbidden: bot was blocked by the user".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send(&self, chat_id: i64, reply: Reply) -> Result<(), OutboundError> {
        self.check(chat_id)?;
        self.sent.lock().unwrap().push((chat_id, reply));
        Ok(())
    }

    async fn copy(&self, to: i64, from: i64, message_id: i32) -> Result<(), OutboundError> {
        self.check(to)?;
        self.copies.lock().unwrap().push((to, from, message_id));
        Ok(())
    }
}

/// Serves a fixed schedule; `None` simulates an unreachable sheet.
pub struct FixedSource {
    pub schedule: Mutex<Option<Schedule>>,
    pub fetches: AtomicUsize,
}

impl FixedSource {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule: Mutex::new(Some(schedule)),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            schedule: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, schedule: Schedule) {
        *self.schedule.lock().unwrap() = Some(schedule);
    }
}

#[async_trait]
impl ScheduleSource for FixedSource {
    async fn get_schedule(&self, _offsets: &[i64]) -> Result<Schedule, ScheduleError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.schedule
            .lock()
            .unwrap()
            .clone()
            .ok_or(ScheduleError::Status(503))
    }
}

/// Blocks every fetch until released, so a handler can be held mid-flight.
pub struct GatedSource {
    pub entered: Notify,
    pub release: Notify,
    pub schedule: Schedule,
}

impl GatedSource {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
            schedule,
        }
    }
}

#[async_trait]
impl ScheduleSource for GatedSource {
    async fn get_schedule(&self, _offsets: &[i64]) -> Result<Schedule, ScheduleError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(self.schedule.clone())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Three weeks of schedule for grades 9 and 10.
pub fn sample_schedule() -> Schedule {
    let mut schedule = Schedule::new();
    schedule.insert(
        Grade::Year(9),
        vec![
            vec![Event::new("מתמטיקה", EventCategory::Test, date(2024, 3, 11))],
            vec![Event::new("אנגלית", EventCategory::Test, date(2024, 3, 18))],
            vec![],
        ],
    );
    schedule.insert(
        Grade::Year(10),
        vec![
            vec![Event::new("בגרות היסטוריה", EventCategory::FinalExam, date(2024, 3, 12))],
            vec![],
            vec![Event::new("ביולוגיה", EventCategory::Test, date(2024, 3, 26))],
        ],
    );
    schedule
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        bot_username: "exam_bot".to_string(),
        send_delay: Duration::ZERO,
        ..EngineSettings::new(MAINTAINER)
    }
}

pub fn build_engine(
    dir: &Path,
    source: Arc<dyn ScheduleSource>,
    outbound: Arc<RecordingOutbound>,
) -> Engine {
    build_engine_with(dir, settings(), source, outbound)
}

pub fn build_engine_with(
    dir: &Path,
    settings: EngineSettings,
    source: Arc<dyn ScheduleSource>,
    outbound: Arc<RecordingOutbound>,
) -> Engine {
    let persistence = SnapshotPersistence::open(dir.join("state.json"), false).unwrap();
    Engine::new(
        settings,
        MenuLabels::default(),
        RosterStore::new(dir.join("roster.json")),
        persistence,
        source,
        outbound,
    )
    .unwrap()
}

pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<Engine>,
    pub outbound: Arc<RecordingOutbound>,
    pub source: Arc<FixedSource>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_roster(Roster::new())
    }

    pub fn with_roster(roster: Roster) -> Self {
        Self::with_settings(roster, settings())
    }

    pub fn with_settings(roster: Roster, settings: EngineSettings) -> Self {
        let dir = TempDir::new().unwrap();
        RosterStore::new(dir.path().join("roster.json")).save(&roster).unwrap();
        let outbound = Arc::new(RecordingOutbound::default());
        let source = Arc::new(FixedSource::new(sample_schedule()));
        let engine = Arc::new(build_engine_with(dir.path(), settings, source.clone(), outbound.clone()));
        Self {
            dir,
            engine,
            outbound,
            source,
        }
    }

    pub fn labels(&self) -> &MenuLabels {
        self.engine.labels()
    }

    pub async fn say(&self, user_id: u64, text: &str) -> String {
        self.engine
            .handle(&Inbound::text(user_id, text).with_name(format!("User {user_id}")))
            .await;
        self.outbound.last_text(user_id as i64)
    }

    /// Runs the full signup flow for a user.
    pub async fn sign_up(&self, user_id: u64, grade_label: &str, weeks: &str) {
        self.say(user_id, "/start").await;
        self.say(user_id, grade_label).await;
        self.say(user_id, weeks).await;
    }
}

/// A roster with Alice in 9th grade and Bob in 10th and 12th.
pub fn populated_roster() -> Roster {
    let mut roster = Roster::new();
    roster.insert(Grade::Year(9), &ALICE.to_string(), Subscriber::new("Alice Levi", true, 14));
    roster.insert(Grade::Year(10), &BOB.to_string(), Subscriber::new("Bob Cohen", true, 7));
    roster.insert(Grade::Year(12), &BOB.to_string(), Subscriber::new("Bob Cohen", true, 7));
    roster
}
