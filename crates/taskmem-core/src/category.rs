//! Memory categories competing for one task's pool.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Region a byte is charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Storage/cache region.
    Storage,
    /// Shuffle/sort buffers.
    Shuffle,
    /// Join/intersection hash tables.
    Intersection,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Storage, Category::Shuffle, Category::Intersection];

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Storage => "storage",
            Category::Shuffle => "shuffle",
            Category::Intersection => "intersection",
        }
    }

    /// Dense index, handy for per-category arrays.
    pub const fn index(self) -> usize {
        match self {
            Category::Storage => 0,
            Category::Shuffle => 1,
            Category::Intersection => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "storage" => Ok(Category::Storage),
            "shuffle" => Ok(Category::Shuffle),
            "intersection" | "join" => Ok(Category::Intersection),
            other => Err(Error::Config(format!("unknown memory category '{other}'"))),
        }
    }
}

/// Per-category byte counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub storage: usize,
    pub shuffle: usize,
    pub intersection: usize,
}

impl CategoryBreakdown {
    pub fn from_fn(mut f: impl FnMut(Category) -> usize) -> Self {
        Self {
            storage: f(Category::Storage),
            shuffle: f(Category::Shuffle),
            intersection: f(Category::Intersection),
        }
    }

    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::Storage => self.storage,
            Category::Shuffle => self.shuffle,
            Category::Intersection => self.intersection,
        }
    }

    pub fn set(&mut self, category: Category, bytes: usize) {
        match category {
            Category::Storage => self.storage = bytes,
            Category::Shuffle => self.shuffle = bytes,
            Category::Intersection => self.intersection = bytes,
        }
    }

    pub fn add(&mut self, category: Category, bytes: usize) {
        let cur = self.get(category);
        self.set(category, cur.saturating_add(bytes));
    }

    pub fn total(&self) -> usize {
        self.storage
            .saturating_add(self.shuffle)
            .saturating_add(self.intersection)
    }
}
