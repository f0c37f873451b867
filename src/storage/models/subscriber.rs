use serde::{Deserialize, Serialize};

/// Notice horizon given to records created without an explicit choice.
pub const DEFAULT_NOTICE_DAYS: u32 = 7;

/// One user's membership record inside a grade.
///
/// The grade itself is implied by the roster key the record lives under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub wants_update: bool,
    pub days: u32,
    #[serde(default)]
    pub name: String,
}

impl Subscriber {
    pub fn new(name: impl Into<String>, wants_update: bool, days: u32) -> Self {
        Self {
            wants_update,
            days,
            name: name.into(),
        }
    }

    /// A record with the default horizon and automatic updates on.
    pub fn fresh(name: impl Into<String>) -> Self {
        Self::new(name, true, DEFAULT_NOTICE_DAYS)
    }

    /// Number of week buckets this subscriber wants in a notification.
    pub fn horizon_weeks(&self) -> usize {
        (self.days / 7) as usize
    }
}
