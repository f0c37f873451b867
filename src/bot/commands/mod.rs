pub mod labels;

pub use labels::MenuLabels;

use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "פקודות הבוט:")]
pub enum Command {
    #[command(description = "הרשמה לקבלת התראות")]
    Start,
    #[command(description = "הצגת הודעת העזרה")]
    Help,
    #[command(description = "שליחת לוח המבחנים עכשיו")]
    Update,
    #[command(description = "הצטרפות לשכבה נוספת")]
    Join,
    #[command(description = "עזיבת שכבה")]
    Leave,
    #[command(description = "שינוי או הצגת זמן ההתראה")]
    Notice(String),
    #[command(description = "עצירת העדכונים האוטומטיים")]
    Stop,
    #[command(description = "חידוש העדכונים האוטומטיים")]
    Restart,
    #[command(description = "ביטול הפעולה הנוכחית")]
    Cancel,
    #[command(description = "תפריט מנהלים")]
    Admin,
}
