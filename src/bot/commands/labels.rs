//! Reply-keyboard button labels, assembled once at startup.

use crate::storage::models::Grade;
use crate::storage::roster::Audience;
use crate::utils::validation::{MAX_WEEK, MIN_WEEK};

/// Every localized label the menus render or accept as input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuLabels {
    pub grades: Vec<(Grade, String)>,
    pub graduates: String,
    pub everyone: String,
    pub no_auto_update: String,
    pub update: String,
    pub join_grade: String,
    pub leave_grade: String,
    pub change_notice: String,
    pub stop_updates: String,
    pub restart_updates: String,
    pub help: String,
    pub cancel: String,
    pub back: String,
    pub admin_menu: String,
    pub add_admin: String,
    pub remove_admin: String,
    pub find_user: String,
    pub broadcast: String,
}

impl Default for MenuLabels {
    fn default() -> Self {
        Self {
            grades: vec![
                (Grade::Year(9), "ט'".to_string()),
                (Grade::Year(10), "י'".to_string()),
                (Grade::Year(11), "יא'".to_string()),
                (Grade::Year(12), "יב'".to_string()),
            ],
            graduates: "בוגרים".to_string(),
            everyone: "כולם".to_string(),
            no_auto_update: "לא ארצה עדכונים כל שבוע".to_string(),
            update: "📅 עדכון עכשיו".to_string(),
            join_grade: "➕ הצטרפות לשכבה".to_string(),
            leave_grade: "➖ עזיבת שכבה".to_string(),
            change_notice: "⏰ שינוי זמן התראה".to_string(),
            stop_updates: "🔕 עצירת עדכונים".to_string(),
            restart_updates: "🔔 חידוש עדכונים".to_string(),
            help: "❓ עזרה".to_string(),
            cancel: "ביטול".to_string(),
            back: "חזרה".to_string(),
            admin_menu: "תפריט מנהלים".to_string(),
            add_admin: "הוספת אדמין".to_string(),
            remove_admin: "מחיקת אדמין".to_string(),
            find_user: "חיפוש משתמש".to_string(),
            broadcast: "שליחת הודעה".to_string(),
        }
    }
}

impl MenuLabels {
    pub fn grade_label(&self, grade: Grade) -> &str {
        match grade {
            Grade::Graduates => &self.graduates,
            year => self
                .grades
                .iter()
                .find(|(g, _)| *g == year)
                .map(|(_, label)| label.as_str())
                .unwrap_or_default(),
        }
    }

    /// Maps a school-year button label back to its grade.
    pub fn parse_grade(&self, text: &str) -> Option<Grade> {
        let text = text.trim();
        self.grades
            .iter()
            .find(|(_, label)| label == text)
            .map(|(grade, _)| *grade)
    }

    /// Like [`parse_grade`](Self::parse_grade), also accepting the graduates label.
    pub fn parse_member_grade(&self, text: &str) -> Option<Grade> {
        if text.trim() == self.graduates {
            return Some(Grade::Graduates);
        }
        self.parse_grade(text)
    }

    pub fn parse_audience(&self, text: &str) -> Option<Audience> {
        let text = text.trim();
        if text == self.everyone {
            return Some(Audience::Everyone);
        }
        if text == self.graduates {
            return Some(Audience::Graduates);
        }
        self.parse_grade(text).map(Audience::Grade)
    }

    pub fn audience_label(&self, audience: Audience) -> &str {
        match audience {
            Audience::Everyone => &self.everyone,
            Audience::Graduates => &self.graduates,
            Audience::Grade(grade) => self.grade_label(grade),
        }
    }

    pub fn horizon_label(&self, weeks: u32) -> String {
        format!("{weeks} שבוע/ות לפני")
    }

    /// The signed-up user's main menu; admins also get the admin entry.
    pub fn main_menu(&self, is_admin: bool) -> Vec<Vec<String>> {
        let mut rows = vec![
            vec![self.update.clone()],
            vec![self.join_grade.clone(), self.leave_grade.clone()],
            vec![self.change_notice.clone()],
            vec![self.stop_updates.clone(), self.restart_updates.clone()],
            vec![self.help.clone()],
        ];
        if is_admin {
            rows.push(vec![self.admin_menu.clone()]);
        }
        rows
    }

    /// One row per grade, plus a cancel row.
    pub fn grade_menu(&self, grades: impl IntoIterator<Item = Grade>) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = grades
            .into_iter()
            .map(|grade| vec![self.grade_label(grade).to_string()])
            .collect();
        rows.push(vec![self.cancel.clone()]);
        rows
    }

    pub fn horizon_menu(&self) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = (MIN_WEEK..=MAX_WEEK)
            .map(|weeks| vec![self.horizon_label(weeks)])
            .collect();
        rows.push(vec![self.no_auto_update.clone()]);
        rows.push(vec![self.cancel.clone()]);
        rows
    }

    /// Admin functions; `extra` labels come first, ahead of the admin-set actions.
    pub fn admin_menu(&self, extra: &[String]) -> Vec<Vec<String>> {
        let mut rows: Vec<Vec<String>> = extra.iter().map(|label| vec![label.clone()]).collect();
        rows.push(vec![self.add_admin.clone()]);
        rows.push(vec![self.remove_admin.clone()]);
        rows.push(vec![self.back.clone()]);
        rows
    }

    pub fn audience_menu(&self) -> Vec<Vec<String>> {
        let mut rows = vec![vec![self.everyone.clone()], vec![self.graduates.clone()]];
        rows.extend(self.grades.iter().map(|(_, label)| vec![label.clone()]));
        rows.push(vec![self.back.clone()]);
        rows
    }
}
