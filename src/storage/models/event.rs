use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const MOCK_PREFIX: &str = "מתכ.";
const INTERNAL_FINAL_MARKER: &str = "בגרות פנימית";
const FINAL_MARKER: &str = "בגרות";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Test,
    FinalExam,
    InternalFinalExam,
    MockFinalExam,
}

impl EventCategory {
    pub fn marker(&self) -> &'static str {
        match self {
            EventCategory::Test => "📝",
            EventCategory::FinalExam => "🎓",
            EventCategory::InternalFinalExam => "🏫",
            EventCategory::MockFinalExam => "🧪",
        }
    }
}

/// A single dated exam read from the schedule sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub category: EventCategory,
    pub date: NaiveDate,
}

impl Event {
    pub fn new(name: impl Into<String>, category: EventCategory, date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            category,
            date,
        }
    }

    /// Builds an event from raw cell text, classifying it by its markers.
    ///
    /// Returns `None` for blank cells.
    pub fn from_cell_text(text: &str, date: NaiveDate) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if let Some(rest) = text.strip_prefix(MOCK_PREFIX) {
            let name = rest.trim();
            if name.is_empty() {
                return None;
            }
            return Some(Self::new(name, EventCategory::MockFinalExam, date));
        }

        let category = if text.contains(INTERNAL_FINAL_MARKER) {
            EventCategory::InternalFinalExam
        } else if text.contains(FINAL_MARKER) {
            EventCategory::FinalExam
        } else {
            EventCategory::Test
        };
        Some(Self::new(text, category, date))
    }
}
