//! Chronological sequences that are sorted by construction.
//!
//! Every time-indexed input of the engine is an [`AscendingSeries`], so no
//! stage can consume rows in the wrong order. Lookups that take a date only
//! ever return entries at or before it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Anything carrying the date at which it becomes visible.
pub trait Dated {
    fn date(&self) -> NaiveDate;
}

/// Entries in ascending date order, one per date (the later entry wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<T>", into = "Vec<T>")]
#[serde(bound(
    serialize = "T: Serialize + Clone",
    deserialize = "T: Deserialize<'de> + Dated"
))]
pub struct AscendingSeries<T> {
    items: Vec<T>,
}

impl<T: Dated> AscendingSeries<T> {
    pub fn new(mut items: Vec<T>) -> Self {
        items.sort_by_key(|item| item.date());
        let mut deduped: Vec<T> = Vec::with_capacity(items.len());
        for item in items {
            match deduped.last_mut() {
                Some(last) if last.date() == item.date() => *last = item,
                _ => deduped.push(item),
            }
        }
        Self { items: deduped }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.last()
    }

    /// Entries dated on or before `date`.
    pub fn until(&self, date: NaiveDate) -> &[T] {
        let end = self.items.partition_point(|item| item.date() <= date);
        &self.items[..end]
    }

    /// Entries dated strictly before `date`.
    pub fn before(&self, date: NaiveDate) -> &[T] {
        let end = self.items.partition_point(|item| item.date() < date);
        &self.items[..end]
    }

    /// Entries dated within `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> &[T] {
        let lo = self.items.partition_point(|item| item.date() < start);
        let hi = self.items.partition_point(|item| item.date() <= end);
        if lo >= hi {
            &[]
        } else {
            &self.items[lo..hi]
        }
    }

    /// Latest entry visible on `date`.
    pub fn at_or_before(&self, date: NaiveDate) -> Option<&T> {
        self.until(date).last()
    }
}

impl<T: Dated + Clone> AscendingSeries<T> {
    /// A copy restricted to what is visible on `date`.
    pub fn truncated(&self, date: NaiveDate) -> Self {
        Self {
            items: self.until(date).to_vec(),
        }
    }
}

impl<T> Default for AscendingSeries<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Dated> From<Vec<T>> for AscendingSeries<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T> From<AscendingSeries<T>> for Vec<T> {
    fn from(series: AscendingSeries<T>) -> Self {
        series.items
    }
}

impl<T: Dated> FromIterator<T> for AscendingSeries<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a AscendingSeries<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
