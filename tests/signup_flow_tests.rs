#![allow(clippy::unwrap_used)]

mod common;

use common::*;
use exam_notifier_bot::bot::texts;
use exam_notifier_bot::engine::{FlowName, Keyboard, Slot};
use exam_notifier_bot::storage::models::{Grade, Subscriber};

fn record(harness: &Harness, grade: Grade, user: u64) -> Option<Subscriber> {
    harness.engine.roster().get(grade, &user.to_string()).cloned()
}

#[tokio::test]
async fn test_full_signup_with_weekly_updates() {
    let harness = Harness::new();

    let reply = harness.say(CAROL, "/start").await;
    assert!(reply.contains(texts::CHOOSE_GRADE));
    assert_eq!(
        harness.engine.conversation(FlowName::Signup, CAROL).map(|s| s.slot),
        Some(Slot::Grade)
    );

    assert_eq!(harness.say(CAROL, "יא'").await, texts::CHOOSE_HORIZON);
    assert_eq!(
        harness.engine.conversation(FlowName::Signup, CAROL).map(|s| s.slot),
        Some(Slot::Week)
    );

    let label = harness.labels().horizon_label(2);
    assert_eq!(harness.say(CAROL, &label).await, texts::SIGNUP_DONE);

    let saved = record(&harness, Grade::Year(11), CAROL).unwrap();
    assert!(saved.wants_update);
    assert_eq!(saved.days, 14);
    assert_eq!(saved.name, format!("User {CAROL}"));
    assert_eq!(harness.engine.conversation(FlowName::Signup, CAROL), None);

    // Signed-up users land on the main menu.
    let last = harness.outbound.replies_to(CAROL as i64).pop().unwrap();
    assert_eq!(last.keyboard, Keyboard::Menu(harness.labels().main_menu(false)));
}

#[tokio::test]
async fn test_signup_without_weekly_updates() {
    let harness = Harness::new();
    harness.say(CAROL, "/start").await;
    harness.say(CAROL, "ט'").await;

    let opt_out = harness.labels().no_auto_update.clone();
    assert_eq!(harness.say(CAROL, &opt_out).await, texts::SIGNUP_DONE_NO_UPDATES);

    let saved = record(&harness, Grade::Year(9), CAROL).unwrap();
    assert!(!saved.wants_update);
    assert_eq!(saved.days, 7);
}

#[tokio::test]
async fn test_signup_reprompts_on_unknown_grade() {
    let harness = Harness::new();
    harness.say(CAROL, "/start").await;

    assert_eq!(harness.say(CAROL, "כיתה ז'").await, texts::UNKNOWN_INPUT);
    assert_eq!(
        harness.engine.conversation(FlowName::Signup, CAROL).map(|s| s.slot),
        Some(Slot::Grade)
    );
    assert!(!harness.engine.is_signed_up(CAROL));
}

#[tokio::test]
async fn test_signup_rejects_out_of_range_horizon() {
    let harness = Harness::new();
    harness.say(CAROL, "/start").await;
    harness.say(CAROL, "י'").await;

    assert_eq!(harness.say(CAROL, "5").await, texts::horizon_out_of_range());
    assert_eq!(harness.say(CAROL, "0").await, texts::horizon_out_of_range());
    assert_eq!(harness.say(CAROL, "הרבה").await, texts::UNKNOWN_INPUT);
    assert!(!harness.engine.is_signed_up(CAROL));

    assert_eq!(harness.say(CAROL, "3").await, texts::SIGNUP_DONE);
    assert_eq!(record(&harness, Grade::Year(10), CAROL).unwrap().days, 21);
}

#[tokio::test]
async fn test_start_when_already_registered() {
    let harness = Harness::with_roster(populated_roster());

    assert_eq!(harness.say(ALICE, "/start").await, texts::ALREADY_REGISTERED);
    assert_eq!(harness.engine.conversation(FlowName::Signup, ALICE), None);
}

#[tokio::test]
async fn test_cancel_during_signup() {
    let harness = Harness::new();
    harness.say(CAROL, "/start").await;

    let cancel = harness.labels().cancel.clone();
    assert_eq!(harness.say(CAROL, &cancel).await, texts::CANCELLED);
    assert_eq!(harness.engine.conversation(FlowName::Signup, CAROL), None);

    let last = harness.outbound.replies_to(CAROL as i64).pop().unwrap();
    assert_eq!(last.keyboard, Keyboard::Remove);
}

#[tokio::test]
async fn test_cancel_command_works_in_any_state() {
    let harness = Harness::new();
    harness.say(CAROL, "/start").await;
    harness.say(CAROL, "ט'").await;

    assert_eq!(harness.say(CAROL, "/cancel").await, texts::CANCELLED);
    assert_eq!(harness.engine.conversation(FlowName::Signup, CAROL), None);
    assert!(!harness.engine.is_signed_up(CAROL));
}

#[tokio::test]
async fn test_commands_addressed_to_other_bots_are_ignored() {
    let harness = Harness::new();

    assert_eq!(harness.say(CAROL, "/start@other_bot").await, texts::UNKNOWN_COMMAND);
    assert_eq!(harness.engine.conversation(FlowName::Signup, CAROL), None);

    assert!(harness.say(CAROL, "/start@exam_bot").await.contains(texts::CHOOSE_GRADE));
}

#[tokio::test]
async fn test_join_then_leave_round_trip() {
    let harness = Harness::with_roster(populated_roster());

    assert_eq!(harness.say(ALICE, "/join").await, texts::JOIN_WHICH);
    let offered = harness.outbound.replies_to(ALICE as i64).pop().unwrap().keyboard;
    let expected = harness
        .labels()
        .grade_menu([Grade::Year(10), Grade::Year(11), Grade::Year(12)]);
    assert_eq!(offered, Keyboard::Menu(expected));

    assert_eq!(harness.say(ALICE, "יב'").await, texts::joined("יב'"));
    let copied = record(&harness, Grade::Year(12), ALICE).unwrap();
    assert_eq!(copied, record(&harness, Grade::Year(9), ALICE).unwrap());
    assert_eq!(harness.engine.conversation(FlowName::JoinGrade, ALICE), None);

    assert_eq!(harness.say(ALICE, "/leave").await, texts::LEAVE_WHICH);
    assert_eq!(harness.say(ALICE, "יב'").await, texts::left("יב'"));
    assert_eq!(record(&harness, Grade::Year(12), ALICE), None);
    assert!(record(&harness, Grade::Year(9), ALICE).is_some());
}

#[tokio::test]
async fn test_join_grade_already_joined_asks_again() {
    let harness = Harness::with_roster(populated_roster());
    harness.say(ALICE, "/join").await;

    assert_eq!(harness.say(ALICE, "ט'").await, texts::already_in_grade("ט'"));
    assert_eq!(
        harness.engine.conversation(FlowName::JoinGrade, ALICE).map(|s| s.slot),
        Some(Slot::Grade)
    );
}

#[tokio::test]
async fn test_join_with_every_grade_taken() {
    let mut roster = populated_roster();
    for grade in Grade::school_years() {
        roster.insert(grade, &CAROL.to_string(), Subscriber::fresh("Carol"));
    }
    let harness = Harness::with_roster(roster);

    assert_eq!(harness.say(CAROL, "/join").await, texts::JOIN_NOTHING_LEFT);
    assert_eq!(harness.engine.conversation(FlowName::JoinGrade, CAROL), None);
}

#[tokio::test]
async fn test_leave_grade_not_joined_changes_nothing() {
    let harness = Harness::with_roster(populated_roster());
    harness.say(ALICE, "/leave").await;

    assert_eq!(harness.say(ALICE, "יא'").await, texts::not_in_grade("יא'"));
    assert!(record(&harness, Grade::Year(9), ALICE).is_some());
}

#[tokio::test]
async fn test_graduates_can_leave_their_bucket() {
    let mut roster = populated_roster();
    roster.insert(Grade::Graduates, &CAROL.to_string(), Subscriber::fresh("Carol"));
    let harness = Harness::with_roster(roster);

    harness.say(CAROL, "/leave").await;
    let graduates = harness.labels().graduates.clone();
    assert_eq!(harness.say(CAROL, &graduates).await, texts::left(&graduates));
    assert!(!harness.engine.is_signed_up(CAROL));
}

#[tokio::test]
async fn test_leaving_last_grade_removes_the_menu() {
    let harness = Harness::with_roster(populated_roster());
    harness.say(ALICE, "/leave").await;
    harness.say(ALICE, "ט'").await;

    assert!(!harness.engine.is_signed_up(ALICE));
    let last = harness.outbound.replies_to(ALICE as i64).pop().unwrap();
    assert_eq!(last.keyboard, Keyboard::Remove);
}

#[tokio::test]
async fn test_notice_applies_to_every_grade() {
    let harness = Harness::with_roster(populated_roster());

    let shown = harness.say(BOB, "/notice").await;
    assert!(shown.contains('1'));
    assert_eq!(
        harness.engine.conversation(FlowName::ChangeNotice, BOB).map(|s| s.slot),
        Some(Slot::Week)
    );

    assert_eq!(harness.say(BOB, "3").await, texts::horizon_saved(3));
    assert_eq!(record(&harness, Grade::Year(10), BOB).unwrap().days, 21);
    assert_eq!(record(&harness, Grade::Year(12), BOB).unwrap().days, 21);
    assert_eq!(harness.engine.conversation(FlowName::ChangeNotice, BOB), None);
}

#[tokio::test]
async fn test_notice_with_inline_argument() {
    let harness = Harness::with_roster(populated_roster());

    assert_eq!(harness.say(ALICE, "/notice 1").await, texts::horizon_saved(1));
    assert_eq!(record(&harness, Grade::Year(9), ALICE).unwrap().days, 7);
    assert_eq!(harness.engine.conversation(FlowName::ChangeNotice, ALICE), None);
}

#[tokio::test]
async fn test_notice_out_of_range_keeps_asking() {
    let harness = Harness::with_roster(populated_roster());

    assert_eq!(harness.say(ALICE, "/notice 9").await, texts::horizon_out_of_range());
    assert_eq!(
        harness.engine.conversation(FlowName::ChangeNotice, ALICE).map(|s| s.slot),
        Some(Slot::Week)
    );
    assert_eq!(record(&harness, Grade::Year(9), ALICE).unwrap().days, 14);

    assert_eq!(harness.say(ALICE, "2").await, texts::horizon_saved(2));
}

#[tokio::test]
async fn test_notice_opt_out_label_stops_updates() {
    let harness = Harness::with_roster(populated_roster());
    harness.say(BOB, "/notice").await;

    let opt_out = harness.labels().no_auto_update.clone();
    assert_eq!(harness.say(BOB, &opt_out).await, texts::STOPPED);
    assert!(!record(&harness, Grade::Year(10), BOB).unwrap().wants_update);
    assert!(!record(&harness, Grade::Year(12), BOB).unwrap().wants_update);
}

#[tokio::test]
async fn test_stop_and_restart_updates() {
    let harness = Harness::with_roster(populated_roster());

    assert_eq!(harness.say(BOB, "/stop").await, texts::STOPPED);
    assert!(!record(&harness, Grade::Year(10), BOB).unwrap().wants_update);

    let restart = harness.labels().restart_updates.clone();
    assert_eq!(harness.say(BOB, &restart).await, texts::RESTARTED);
    assert!(record(&harness, Grade::Year(12), BOB).unwrap().wants_update);
}

#[tokio::test]
async fn test_no_op_changes_do_not_rewrite_the_roster() {
    let harness = Harness::with_roster(populated_roster());
    harness.say(BOB, "/stop").await;

    // Any save from here on would fail.
    let roster_path = harness.dir.path().join("roster.json");
    std::fs::remove_file(&roster_path).unwrap();
    std::fs::create_dir(&roster_path).unwrap();

    assert_eq!(harness.say(BOB, "/stop").await, texts::STOPPED);

    harness.say(ALICE, "/leave").await;
    assert_eq!(harness.say(ALICE, "יא'").await, texts::not_in_grade("יא'"));

    harness.say(ALICE, "/join").await;
    assert_eq!(harness.say(ALICE, "ט'").await, texts::already_in_grade("ט'"));
    assert!(record(&harness, Grade::Year(9), ALICE).is_some());
}

#[tokio::test]
async fn test_help_and_unknown_input() {
    let harness = Harness::with_roster(populated_roster());

    assert_eq!(harness.say(ALICE, "/help").await, texts::HELP_MSG);
    assert_eq!(harness.say(ALICE, "מה קורה").await, texts::UNKNOWN_COMMAND);
    assert_eq!(harness.say(CAROL, "/help").await, texts::HELP_MSG);
}

#[tokio::test]
async fn test_update_sends_one_message_per_grade() {
    let harness = Harness::with_roster(populated_roster());
    harness.say(BOB, "/update").await;

    let replies = harness.outbound.replies_to(BOB as i64);
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r.markdown));
    assert!(replies[0].text.contains("היסטוריה"));
    // No weekly broadcast has run yet, so nothing counts as changed.
    assert!(!replies.iter().any(|r| r.text.contains(texts::SCHEDULE_CHANGED)));
}
