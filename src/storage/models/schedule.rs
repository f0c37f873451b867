use super::{Event, Grade};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The events of one week, in sheet row order.
pub type WeekBucket = Vec<Event>;

/// Per-grade week buckets produced by one schedule fetch.
///
/// Bucket `k` corresponds to the `k`-th requested week offset. Within a
/// bucket events keep the order they appear in the sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    grades: BTreeMap<Grade, Vec<WeekBucket>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, grade: Grade, weeks: Vec<WeekBucket>) {
        self.grades.insert(grade, weeks);
    }

    pub fn weeks(&self, grade: Grade) -> Option<&[WeekBucket]> {
        self.grades.get(&grade).map(Vec::as_slice)
    }

    /// The first `count` week buckets for a grade, fewer if the schedule is shorter.
    pub fn upcoming(&self, grade: Grade, count: usize) -> &[WeekBucket] {
        match self.weeks(grade) {
            Some(weeks) => &weeks[..count.min(weeks.len())],
            None => &[],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Grade, &[WeekBucket])> {
        self.grades.iter().map(|(grade, weeks)| (*grade, weeks.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.grades.is_empty()
    }
}

impl FromIterator<(Grade, Vec<WeekBucket>)> for Schedule {
    fn from_iter<T: IntoIterator<Item = (Grade, Vec<WeekBucket>)>>(iter: T) -> Self {
        Self {
            grades: iter.into_iter().collect(),
        }
    }
}
