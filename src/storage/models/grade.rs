use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// School years the bot tracks, lowest first.
pub const SCHOOL_YEARS: [u8; 4] = [9, 10, 11, 12];

const GRADUATES_KEY: &str = "graduates";

/// A cohort: one of the school years or the permanent graduates bucket.
///
/// Serialized as the roster's top-level key: the year number as a string,
/// or the literal `"graduates"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Grade {
    Year(u8),
    Graduates,
}

impl Grade {
    /// All school-year grades, lowest first.
    pub fn school_years() -> impl Iterator<Item = Grade> {
        SCHOOL_YEARS.iter().copied().map(Grade::Year)
    }

    pub fn is_school_year(&self) -> bool {
        matches!(self, Grade::Year(_))
    }

    /// The grade this cohort moves into at the yearly promotion.
    pub fn next(&self) -> Grade {
        match self {
            Grade::Year(year) if SCHOOL_YEARS.last().is_some_and(|top| year >= top) => Grade::Graduates,
            Grade::Year(year) => Grade::Year(year + 1),
            Grade::Graduates => Grade::Graduates,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Year(year) => write!(f, "{year}"),
            Grade::Graduates => f.write_str(GRADUATES_KEY),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown grade key '{0}'")]
pub struct UnknownGrade(pub String);

impl FromStr for Grade {
    type Err = UnknownGrade;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == GRADUATES_KEY {
            return Ok(Grade::Graduates);
        }
        s.parse::<u8>()
            .ok()
            .filter(|year| SCHOOL_YEARS.contains(year))
            .map(Grade::Year)
            .ok_or_else(|| UnknownGrade(s.to_string()))
    }
}

impl From<Grade> for String {
    fn from(grade: Grade) -> Self {
        grade.to_string()
    }
}

impl TryFrom<String> for Grade {
    type Error = UnknownGrade;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
