//! Subscriber roster: grade → user id → record, stored as pretty JSON.

use super::models::{Grade, Subscriber};
use super::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Who a broadcast is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Everyone,
    Graduates,
    Grade(Grade),
}

/// Which users moved at a yearly promotion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Promotion {
    pub graduated: BTreeSet<String>,
    pub affected: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    grades: BTreeMap<Grade, BTreeMap<String, Subscriber>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self, grade: Grade) -> impl Iterator<Item = (&str, &Subscriber)> {
        self.grades
            .get(&grade)
            .into_iter()
            .flat_map(|members| members.iter().map(|(id, sub)| (id.as_str(), sub)))
    }

    pub fn get(&self, grade: Grade, user_id: &str) -> Option<&Subscriber> {
        self.grades.get(&grade).and_then(|members| members.get(user_id))
    }

    /// Every grade the user currently belongs to.
    pub fn grades_of(&self, user_id: &str) -> BTreeSet<Grade> {
        self.grades
            .iter()
            .filter(|(_, members)| members.contains_key(user_id))
            .map(|(grade, _)| *grade)
            .collect()
    }

    /// The user's record from their lowest grade, if they have any.
    pub fn any_record(&self, user_id: &str) -> Option<&Subscriber> {
        self.grades.values().find_map(|members| members.get(user_id))
    }

    pub fn is_signed_up(&self, user_id: &str) -> bool {
        self.any_record(user_id).is_some()
    }

    pub fn insert(&mut self, grade: Grade, user_id: &str, subscriber: Subscriber) {
        self.grades
            .entry(grade)
            .or_default()
            .insert(user_id.to_string(), subscriber);
    }

    pub fn remove(&mut self, grade: Grade, user_id: &str) -> Option<Subscriber> {
        self.grades.get_mut(&grade).and_then(|members| members.remove(user_id))
    }

    /// Applies `update` to the user's record in every grade they belong to.
    /// Returns how many records changed.
    pub fn update_all(&mut self, user_id: &str, mut update: impl FnMut(&mut Subscriber)) -> usize {
        let mut count = 0;
        for members in self.grades.values_mut() {
            if let Some(sub) = members.get_mut(user_id) {
                update(sub);
                count += 1;
            }
        }
        count
    }

    /// Case-insensitive substring search on display names.
    /// Returns `(user id, name)` pairs, one per user.
    pub fn search_by_name(&self, needle: &str) -> Vec<(String, String)> {
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut found = BTreeMap::new();
        for members in self.grades.values() {
            for (id, sub) in members {
                if sub.name.to_lowercase().contains(&needle) {
                    found.entry(id.clone()).or_insert_with(|| sub.name.clone());
                }
            }
        }
        found.into_iter().collect()
    }

    /// Distinct user ids addressed by an audience.
    pub fn recipients(&self, audience: Audience) -> BTreeSet<String> {
        match audience {
            Audience::Everyone => self
                .grades
                .values()
                .flat_map(|members| members.keys().cloned())
                .collect(),
            Audience::Graduates => self.members(Grade::Graduates).map(|(id, _)| id.to_string()).collect(),
            Audience::Grade(grade) => self.members(grade).map(|(id, _)| id.to_string()).collect(),
        }
    }

    /// Moves every school-year roster one grade up.
    ///
    /// The top year merges into the graduates bucket, which is never
    /// cleared, and the lowest year is left empty.
    pub fn promote(&mut self) -> Promotion {
        let mut promotion = Promotion::default();
        let mut next: BTreeMap<Grade, BTreeMap<String, Subscriber>> = BTreeMap::new();
        let mut graduates = self.grades.remove(&Grade::Graduates).unwrap_or_default();

        for grade in Grade::school_years() {
            let members = self.grades.remove(&grade).unwrap_or_default();
            next.entry(grade).or_default();
            promotion.affected.extend(members.keys().cloned());
            match grade.next() {
                Grade::Graduates => {
                    promotion.graduated.extend(members.keys().cloned());
                    graduates.extend(members);
                }
                higher => {
                    next.insert(higher, members);
                }
            }
        }

        next.insert(Grade::Graduates, graduates);
        self.grades = next;
        promotion
    }

    pub fn counts(&self) -> BTreeMap<Grade, usize> {
        self.grades.iter().map(|(grade, members)| (*grade, members.len())).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.recipients(Audience::Everyone).len()
    }
}

/// Loads and saves the roster document.
#[derive(Debug, Clone)]
pub struct RosterStore {
    path: PathBuf,
}

impl RosterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the roster; a missing file is an empty roster.
    pub fn load(&self) -> Result<Roster, StorageError> {
        if !self.path.exists() {
            info!("No roster at {}, starting empty", self.path.display());
            return Ok(Roster::new());
        }
        let json = std::fs::read_to_string(&self.path)?;
        let roster: Roster = serde_json::from_str(&json)?;
        debug!("Loaded roster with {} subscribers", roster.subscriber_count());
        Ok(roster)
    }

    pub fn save(&self, roster: &Roster) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(roster)?;
        std::fs::write(&self.path, json)?;
        debug!("Saved roster to {}", self.path.display());
        Ok(())
    }
}
