#![allow(clippy::unwrap_used)]

mod common;

use chrono::Utc;
use common::*;
use exam_notifier_bot::bot::texts;
use exam_notifier_bot::services::notifier::NotifierService;
use exam_notifier_bot::storage::models::{Event, EventCategory, Grade, Schedule, Subscriber};
use exam_notifier_bot::storage::sanitize::StateValue;
use exam_notifier_bot::engine::EngineSettings;
use std::sync::Arc;
use std::time::Duration;

// Week of Sunday 2024-03-10; the canonical weekday is Wednesday.
fn wednesday() -> chrono::NaiveDate {
    date(2024, 3, 13)
}

fn thursday() -> chrono::NaiveDate {
    date(2024, 3, 14)
}

fn friday() -> chrono::NaiveDate {
    date(2024, 3, 15)
}

/// The sample schedule with a new exam added to grade 10's first week.
fn changed_schedule() -> Schedule {
    let mut schedule = sample_schedule();
    let mut weeks = schedule.weeks(Grade::Year(10)).unwrap().to_vec();
    weeks[0].push(Event::new("כימיה", EventCategory::Test, date(2024, 3, 15)));
    schedule.insert(Grade::Year(10), weeks);
    schedule
}

#[tokio::test]
async fn test_canonical_day_sends_every_grade() {
    let harness = Harness::with_roster(populated_roster());

    let report = harness.engine.broadcast_schedule(wednesday()).await.unwrap();
    assert!(report.canonical);
    assert_eq!(report.delivered, vec![(Grade::Year(9), false), (Grade::Year(10), false)]);
    assert_eq!(report.sent, 2);
    assert_eq!(report.failed, 0);

    let alice = harness.outbound.replies_to(ALICE as i64);
    assert_eq!(alice.len(), 1);
    assert!(alice[0].markdown);
    // Alice asked for two weeks of notice.
    assert!(alice[0].text.contains("מתמטיקה"));
    assert!(alice[0].text.contains("אנגלית"));
    assert!(!alice[0].text.contains(texts::SCHEDULE_CHANGED));

    // Bob's one-week horizon leaves out the biology exam in week three.
    let bob = harness.outbound.replies_to(BOB as i64);
    assert_eq!(bob.len(), 1);
    assert!(!bob[0].text.contains("ביולוגיה"));
}

#[tokio::test]
async fn test_unchanged_schedule_is_not_resent_off_day() {
    let harness = Harness::with_roster(populated_roster());
    harness.engine.broadcast_schedule(wednesday()).await.unwrap();
    harness.outbound.clear();

    let report = harness.engine.broadcast_schedule(thursday()).await.unwrap();
    assert!(!report.canonical);
    assert!(report.delivered.is_empty());
    assert_eq!(report.skipped, vec![Grade::Year(9), Grade::Year(10)]);
    assert_eq!(harness.outbound.sent_count(), 0);
}

#[tokio::test]
async fn test_first_run_off_day_is_a_baseline() {
    let harness = Harness::with_roster(populated_roster());

    let report = harness.engine.broadcast_schedule(thursday()).await.unwrap();
    assert_eq!(report.sent, 0);
    assert_eq!(harness.outbound.sent_count(), 0);

    harness.source.set(changed_schedule());
    let report = harness.engine.broadcast_schedule(friday()).await.unwrap();
    assert_eq!(report.delivered, vec![(Grade::Year(10), true)]);
}

#[tokio::test]
async fn test_change_goes_out_once_with_banner() {
    let harness = Harness::with_roster(populated_roster());
    harness.engine.broadcast_schedule(wednesday()).await.unwrap();
    harness.outbound.clear();

    harness.source.set(changed_schedule());
    let report = harness.engine.broadcast_schedule(thursday()).await.unwrap();
    assert_eq!(report.delivered, vec![(Grade::Year(10), true)]);
    assert_eq!(report.skipped, vec![Grade::Year(9)]);

    assert!(harness.outbound.replies_to(ALICE as i64).is_empty());
    let bob = harness.outbound.replies_to(BOB as i64);
    assert_eq!(bob.len(), 1);
    assert!(bob[0].text.starts_with(texts::SCHEDULE_CHANGED));
    assert!(bob[0].text.contains("כימיה"));

    harness.outbound.clear();
    let report = harness.engine.broadcast_schedule(friday()).await.unwrap();
    assert!(report.delivered.is_empty());
    assert_eq!(harness.outbound.sent_count(), 0);
}

#[tokio::test]
async fn test_new_week_starts_a_fresh_baseline() {
    let harness = Harness::with_roster(populated_roster());
    harness.engine.broadcast_schedule(wednesday()).await.unwrap();
    harness.outbound.clear();

    // Sunday of the following week: the rolled-over schedule is not a change.
    harness.source.set(changed_schedule());
    let report = harness.engine.broadcast_schedule(date(2024, 3, 17)).await.unwrap();
    assert!(report.delivered.is_empty());
    assert_eq!(harness.outbound.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_delay_applies_between_grades() {
    let throttled = EngineSettings {
        send_delay: Duration::from_millis(500),
        ..settings()
    };
    let harness = Harness::with_settings(populated_roster(), throttled);

    let started = tokio::time::Instant::now();
    let report = harness.engine.broadcast_schedule(wednesday()).await.unwrap();

    // Alice (grade 9) and Bob (grade 10) are one send each, so one gap.
    assert_eq!(report.sent, 2);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1000), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_opted_out_users_are_skipped() {
    let mut roster = populated_roster();
    roster.insert(Grade::Year(9), &CAROL.to_string(), Subscriber::new("Carol", false, 7));
    let harness = Harness::with_roster(roster);

    let report = harness.engine.broadcast_schedule(wednesday()).await.unwrap();
    assert_eq!(report.sent, 2);
    assert!(harness.outbound.replies_to(CAROL as i64).is_empty());
}

#[tokio::test]
async fn test_delivery_failure_is_counted_and_skipped() {
    let harness = Harness::with_roster(populated_roster());
    harness.outbound.fail_for(ALICE as i64);

    let report = harness.engine.broadcast_schedule(wednesday()).await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(harness.outbound.replies_to(BOB as i64).len(), 1);
}

#[tokio::test]
async fn test_fetch_failure_abandons_the_run() {
    let harness = Harness::with_roster(populated_roster());
    *harness.source.schedule.lock().unwrap() = None;

    assert!(harness.engine.broadcast_schedule(wednesday()).await.is_err());
    assert_eq!(harness.outbound.sent_count(), 0);
    assert!(harness.engine.last_fetch().is_none());

    // A later run still treats the first schedule it sees as the baseline.
    harness.source.set(sample_schedule());
    let report = harness.engine.broadcast_schedule(thursday()).await.unwrap();
    assert_eq!(report.sent, 0);
    assert!(harness.engine.last_fetch().is_some());
}

#[tokio::test]
async fn test_update_shows_banner_after_a_change_this_week() {
    let harness = Harness::with_roster(populated_roster());
    harness.engine.broadcast_schedule(Utc::now().date_naive()).await.unwrap();
    harness.outbound.clear();

    harness.source.set(changed_schedule());
    harness.say(BOB, "/update").await;
    harness.say(BOB, "/update").await;

    let grade_ten: Vec<_> = harness
        .outbound
        .replies_to(BOB as i64)
        .into_iter()
        .filter(|r| r.text.contains("כימיה"))
        .collect();
    // On-demand requests read the last-seen schedule but never replace it.
    assert_eq!(grade_ten.len(), 2);
    assert!(grade_ten.iter().all(|r| r.text.starts_with(texts::SCHEDULE_CHANGED)));
}

#[tokio::test]
async fn test_update_reports_fetch_failure() {
    let harness = Harness::with_roster(populated_roster());
    *harness.source.schedule.lock().unwrap() = None;

    assert_eq!(harness.say(ALICE, "/update").await, texts::FETCH_FAILED);
}

#[tokio::test]
async fn test_last_seen_survives_restart() {
    let harness = Harness::with_roster(populated_roster());
    harness.engine.broadcast_schedule(wednesday()).await.unwrap();

    let source = Arc::new(FixedSource::new(changed_schedule()));
    let outbound = Arc::new(RecordingOutbound::default());
    let restarted = build_engine(harness.dir.path(), source, outbound.clone());

    let report = restarted.broadcast_schedule(thursday()).await.unwrap();
    assert_eq!(report.delivered, vec![(Grade::Year(10), true)]);
    assert_eq!(outbound.replies_to(BOB as i64).len(), 1);
}

#[tokio::test]
async fn test_promotion_moves_every_grade_up() {
    let harness = Harness::with_roster(populated_roster());

    let promotion = harness.engine.promote_grades().unwrap();
    assert!(promotion.graduated.contains(&BOB.to_string()));
    assert!(promotion.affected.contains(&ALICE.to_string()));

    let roster = harness.engine.roster();
    assert!(roster.get(Grade::Year(10), &ALICE.to_string()).is_some());
    assert!(roster.get(Grade::Year(9), &ALICE.to_string()).is_none());
    assert!(roster.get(Grade::Year(11), &BOB.to_string()).is_some());
    assert!(roster.get(Grade::Graduates, &BOB.to_string()).is_some());
    assert_eq!(roster.members(Grade::Year(9)).count(), 0);

    let bob = harness.engine.user_data(BOB).unwrap();
    assert_eq!(
        bob.get("grades"),
        Some(&StateValue::Set(vec![StateValue::text("11"), StateValue::text("graduates")]))
    );

    // Saved to disk as well.
    let reloaded = exam_notifier_bot::storage::roster::RosterStore::new(harness.dir.path().join("roster.json"))
        .load()
        .unwrap();
    assert_eq!(reloaded, roster);
}

#[tokio::test]
async fn test_promotion_resets_last_seen() {
    let harness = Harness::with_roster(populated_roster());
    harness.engine.broadcast_schedule(wednesday()).await.unwrap();
    harness.engine.promote_grades().unwrap();
    harness.outbound.clear();

    harness.source.set(changed_schedule());
    let report = harness.engine.broadcast_schedule(thursday()).await.unwrap();
    assert!(report.delivered.is_empty());
    assert_eq!(harness.outbound.sent_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_notifier_registers_both_jobs() {
    let harness = Harness::with_roster(populated_roster());

    let mut notifier = NotifierService::new(harness.engine.clone()).await.unwrap();
    notifier.start().await.unwrap();
    assert_eq!(notifier.job_ids().len(), 2);

    notifier.run_broadcast_now().await.unwrap();
    assert!(harness.engine.last_fetch().is_some());

    notifier.stop().await.unwrap();
    assert!(notifier.job_ids().is_empty());
}
