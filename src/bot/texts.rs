//! User-facing message templates.

use crate::storage::models::{Event, Subscriber, WeekBucket};
use crate::utils::datetime::format_event_date;
use crate::utils::markdown::escape_markdown;
use crate::utils::validation::{MAX_WEEK, MIN_WEEK};

pub const HELP_MSG: &str = "הנה הדברים שאני יודע לעשות:
א. /start - להצטרף לקבלת ההתראות
ב. /notice - לשנות או להזכיר לכם את זמן ההתראה שלכם
ג. /stop - לעצור את ההתראות האוטומטיות
ד. /restart - לחדש את ההתראות האוטומטיות
ה. /update - לשלוח עדכון עכשיו (גם אם לא נרשמתם לעדכון האוטומטי)
ו. /join, /leave - להצטרף לשכבה נוספת או לעזוב שכבה
ז. /help - ההודעה הזו";

pub const ALREADY_REGISTERED: &str = "אתם כבר רשומים במערכת, כדי לשנות את זמן ההתראה השתמשו ב /notice";
pub const SIGN_UP_FIRST: &str = "עליכם קודם להירשם, שלחו /start";
pub const PLEASE_WAIT: &str = "⏳ רגע, אני עוד מטפל בבקשה הקודמת שלכם...";
pub const CHOOSE_GRADE: &str = "באיזו שכבה אתם?";
pub const CHOOSE_HORIZON: &str = "טיל🚀, כמה שבועות לפני תרצו התראה?";
pub const SIGNUP_DONE: &str = "🔥🔥🔥, הכל מוכן!";
pub const SIGNUP_DONE_NO_UPDATES: &str = "🔥🔥🔥, לא תקבלו עדכונים שבועיים אך תמיד תוכלו לבקש ידנית: /update";
pub const UNKNOWN_INPUT: &str = "לא הבנתי 🤔 בחרו אחת מהאפשרויות במקלדת";
pub const UNKNOWN_COMMAND: &str = "לא הבנתי 🤔 שלחו /help כדי לראות מה אני יודע לעשות";
pub const CANCELLED: &str = "בוטל 👌";
pub const JOIN_WHICH: &str = "לאיזו שכבה תרצו להצטרף?";
pub const JOIN_NOTHING_LEFT: &str = "אתם כבר רשומים לכל השכבות";
pub const LEAVE_WHICH: &str = "איזו שכבה תרצו לעזוב?";
pub const STOPPED: &str = "😔 לא תקבלו עוד עדכונים אוטומטיים, עם זאת תמיד תוכלו לבקש עם /update...\nאם תתחרטו אני פה 😃";
pub const RESTARTED: &str = "🔔 העדכונים האוטומטיים חזרו לפעול";
pub const FETCH_FAILED: &str = "😕 לא הצלחתי להביא את לוח המבחנים כרגע, נסו שוב בעוד כמה דקות";
pub const SCHEDULE_CHANGED: &str = "⚠️ *שימו לב: לוח המבחנים השתנה\\!*";
pub const NO_EVENTS: &str = "אין מבחנים בשבועות הקרובים 🎉";

pub const ADMIN_MENU: &str = "תפריט מנהלים\nמה תרצו לעשות?";
pub const ASK_NEW_ADMIN: &str = "הזינו יוזר-אידי של המשתמש שתרצו לקדם כאדמין:";
pub const ASK_REMOVED_ADMIN: &str = "הזינו יוזר-אידי של האדמין שתרצו להסיר:";
pub const CANNOT_REMOVE_MAINTAINER: &str = "⛔ אי אפשר להסיר את מתחזק הבוט";
pub const ASK_NAME: &str = "הזינו שם (או חלק ממנו) לחיפוש:";
pub const NO_MATCHES: &str = "לא נמצאו משתמשים בשם הזה";
pub const ASK_AUDIENCE: &str = "למי לשלוח את ההודעה?";
pub const ASK_BROADCAST: &str = "שלחו עכשיו את ההודעה שתרצו להעביר:";

pub fn greeting(first_name: &str) -> String {
    format!("שלום {first_name}, {CHOOSE_GRADE}")
}

pub fn horizon_out_of_range() -> String {
    format!("הזינו מספר בין {MIN_WEEK} ל{MAX_WEEK}")
}

pub fn horizon_saved(weeks: u32) -> String {
    format!("החל משבוע הבא, תקבלו עדכון ל{weeks} שבוע/ות הבא/ים")
}

pub fn current_horizon(record: &Subscriber) -> String {
    if record.wants_update {
        format!(
            "אתם מקבלים התראה של {} שבוע/ות\nכדי לשנות: בחרו מספר שבועות",
            record.horizon_weeks()
        )
    } else {
        "אינכם מקבלים התראות אוטומטיות\nכדי לקבל: בחרו מספר שבועות".to_string()
    }
}

pub fn joined(grade_label: &str) -> String {
    format!("✅ נוספתם לשכבה {grade_label}")
}

pub fn already_in_grade(grade_label: &str) -> String {
    format!("אתם כבר בשכבה {grade_label}, בחרו שכבה אחרת")
}

pub fn left(grade_label: &str) -> String {
    format!("👋 הוסרתם משכבה {grade_label}")
}

pub fn not_in_grade(grade_label: &str) -> String {
    format!("ℹ️ אינכם רשומים לשכבה {grade_label}, לא השתנה דבר")
}

pub fn generic_failure(maintainer_contact: &str) -> String {
    format!("❌ משהו השתבש. אם זה חוזר על עצמו פנו ל{maintainer_contact}")
}

pub fn admin_added(user_id: u64) -> String {
    format!("✅ {user_id} הוא עכשיו אדמין")
}

pub fn admin_removed(user_id: u64) -> String {
    format!("🗑️ {user_id} כבר לא אדמין")
}

pub fn admin_unchanged(user_id: u64) -> String {
    format!("ℹ️ לא חל שינוי עבור {user_id}")
}

pub fn search_results(matches: &[(String, String)]) -> String {
    matches
        .iter()
        .map(|(id, name)| format!("{name} - {id}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn broadcast_done(sent: usize, failed: usize) -> String {
    format!("📣 ההודעה נשלחה ל{sent} משתמשים ({failed} נכשלו)")
}

fn event_line(event: &Event) -> String {
    format!(
        "{} *{}* \\- {}",
        event.category.marker(),
        escape_markdown(&format_event_date(event.date)),
        escape_markdown(&event.name)
    )
}

/// MarkdownV2 body for one grade's upcoming weeks.
pub fn format_schedule(grade_label: &str, weeks: &[WeekBucket], changed: bool) -> String {
    let mut lines = Vec::new();
    if changed {
        lines.push(SCHEDULE_CHANGED.to_string());
    }
    lines.push(format!("*מבחנים קרובים לשכבה {}*", escape_markdown(grade_label)));

    let events: Vec<String> = weeks.iter().flatten().map(event_line).collect();
    if events.is_empty() {
        lines.push(escape_markdown(NO_EVENTS));
    } else {
        lines.extend(events);
    }
    lines.join("\n")
}
