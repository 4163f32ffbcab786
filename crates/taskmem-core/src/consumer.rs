//! Consumer identification.

use crate::category::Category;

/// Anything that requests memory from a task. Only consulted for its category.
pub trait MemoryConsumer: Send + Sync {
    /// `None` means the consumer could not be classified; such requests are
    /// rejected as invalid.
    fn category(&self) -> Option<Category>;

    fn name(&self) -> &str {
        "consumer"
    }
}

impl MemoryConsumer for Category {
    fn category(&self) -> Option<Category> {
        Some(*self)
    }

    fn name(&self) -> &str {
        self.as_str()
    }
}

/// A named consumer with a fixed category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticConsumer {
    name: &'static str,
    category: Option<Category>,
}

impl StaticConsumer {
    pub const fn new(name: &'static str, category: Category) -> Self {
        Self {
            name,
            category: Some(category),
        }
    }

    /// A consumer that has not been assigned to any region yet.
    pub const fn unassigned(name: &'static str) -> Self {
        Self {
            name,
            category: None,
        }
    }
}

impl MemoryConsumer for StaticConsumer {
    fn category(&self) -> Option<Category> {
        self.category
    }

    fn name(&self) -> &str {
        self.name
    }
}
