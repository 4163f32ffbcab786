//! Task memory configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::{Error, Result};
use crate::id::PageNumber;

#[cfg_attr(not(target_pointer_width = "64"), allow(dead_code))]
const GIB: usize = 1024 * 1024 * 1024;

/// Default budget of every region: 5 GiB, or the whole address space where
/// that does not fit in a `usize`.
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_BUDGET_BYTES: usize = 5 * GIB;
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_BUDGET_BYTES: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Budget of the storage/cache region (bytes).
    pub storage_budget_bytes: usize,

    /// Budget of the shuffle/sort region (bytes).
    pub shuffle_budget_bytes: usize,

    /// Budget of the join/intersection region (bytes).
    pub intersection_budget_bytes: usize,

    /// Upper bound on concurrently live pages.
    pub max_pages: usize,

    /// Initial page table size. `None` allocates all `max_pages` slots up front;
    /// otherwise the table doubles on demand until it reaches `max_pages`.
    pub initial_pages: Option<usize>,

    /// Panic on double frees, out-of-range page numbers and ledger underflow
    /// instead of returning them.
    pub strict: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage_budget_bytes: DEFAULT_BUDGET_BYTES,
            shuffle_budget_bytes: DEFAULT_BUDGET_BYTES,
            intersection_budget_bytes: DEFAULT_BUDGET_BYTES,
            max_pages: 1 << 13,
            initial_pages: None,
            strict: false,
        }
    }
}

impl MemoryConfig {
    /// Same budget for all three regions.
    pub fn uniform(budget_bytes: usize, max_pages: usize) -> Self {
        Self {
            storage_budget_bytes: budget_bytes,
            shuffle_budget_bytes: budget_bytes,
            intersection_budget_bytes: budget_bytes,
            max_pages,
            ..Self::default()
        }
    }

    pub fn budget(&self, category: Category) -> usize {
        match category {
            Category::Storage => self.storage_budget_bytes,
            Category::Shuffle => self.shuffle_budget_bytes,
            Category::Intersection => self.intersection_budget_bytes,
        }
    }

    /// Number of slots the page table starts with.
    pub fn initial_slots(&self) -> usize {
        self.initial_pages.unwrap_or(self.max_pages)
    }

    /// Reject configurations that could only fail later.
    pub fn validate(&self) -> Result<()> {
        for category in Category::ALL {
            if self.budget(category) == 0 {
                return Err(Error::Config(format!(
                    "{category} budget must be greater than zero"
                )));
            }
        }
        if self.max_pages == 0 {
            return Err(Error::Config("max_pages must be greater than zero".into()));
        }
        if self.max_pages > PageNumber::MAX_PAGES {
            return Err(Error::Config(format!(
                "max_pages {} exceeds the addressable limit {}",
                self.max_pages,
                PageNumber::MAX_PAGES
            )));
        }
        if let Some(initial) = self.initial_pages {
            if initial == 0 || initial > self.max_pages {
                return Err(Error::Config(format!(
                    "initial_pages must be within 1..={}, got {initial}",
                    self.max_pages
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TASKMEM_STORAGE_MEM`: storage budget (`512M`, `5G`, plain bytes, ...)
    /// - `TASKMEM_SHUFFLE_MEM`: shuffle budget
    /// - `TASKMEM_INTERSECTION_MEM`: intersection budget
    /// - `TASKMEM_MAX_PAGES`: page table upper bound
    /// - `TASKMEM_INITIAL_PAGES`: initial page table size
    /// - `TASKMEM_STRICT`: `1`/`true` to panic on programmer errors
    ///
    /// Malformed values are errors rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(s) = env_var("TASKMEM_STORAGE_MEM") {
            cfg.storage_budget_bytes = parse_byte_size(&s)?;
        }
        if let Some(s) = env_var("TASKMEM_SHUFFLE_MEM") {
            cfg.shuffle_budget_bytes = parse_byte_size(&s)?;
        }
        if let Some(s) = env_var("TASKMEM_INTERSECTION_MEM") {
            cfg.intersection_budget_bytes = parse_byte_size(&s)?;
        }
        if let Some(s) = env_var("TASKMEM_MAX_PAGES") {
            cfg.max_pages = parse_count("TASKMEM_MAX_PAGES", &s)?;
        }
        if let Some(s) = env_var("TASKMEM_INITIAL_PAGES") {
            cfg.initial_pages = Some(parse_count("TASKMEM_INITIAL_PAGES", &s)?);
        }
        if let Some(s) = env_var("TASKMEM_STRICT") {
            cfg.strict = match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(Error::Config(format!(
                        "TASKMEM_STRICT: expected a boolean, got '{other}'"
                    )))
                }
            };
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_count(key: &str, s: &str) -> Result<usize> {
    s.trim()
        .parse::<usize>()
        .map_err(|e| Error::Config(format!("{key}: {e}")))
}

/// Parse a human byte size such as `4096`, `64K`, `512MiB`, `5G` or `1.5gb`.
///
/// Suffixes are binary (`K` = 1024) and case-insensitive.
pub fn parse_byte_size(s: &str) -> Result<usize> {
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let multiplier: usize = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        other => {
            return Err(Error::Config(format!(
                "invalid size '{trimmed}': unknown unit '{other}'"
            )))
        }
    };

    if number.is_empty() {
        return Err(Error::Config(format!("invalid size '{trimmed}': missing number")));
    }

    if number.contains('.') {
        let value: f64 = number
            .parse()
            .map_err(|e| Error::Config(format!("invalid size '{trimmed}': {e}")))?;
        let bytes = value * multiplier as f64;
        if !bytes.is_finite() || bytes > usize::MAX as f64 {
            return Err(Error::Config(format!("invalid size '{trimmed}': overflow")));
        }
        return Ok(bytes as usize);
    }

    number
        .parse::<usize>()
        .map_err(|e| Error::Config(format!("invalid size '{trimmed}': {e}")))?
        .checked_mul(multiplier)
        .ok_or_else(|| Error::Config(format!("invalid size '{trimmed}': overflow")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_sizes() {
        assert_eq!(parse_byte_size("4096").unwrap(), 4096);
        assert_eq!(parse_byte_size("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size(" 512MiB ").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_byte_size("3G").unwrap(), 3 * GIB);
        assert_eq!(parse_byte_size("1.5gb").unwrap(), GIB + GIB / 2);
        assert_eq!(parse_byte_size("7b").unwrap(), 7);
    }

    #[test]
    fn rejects_malformed_sizes() {
        assert!(parse_byte_size("").is_err());
        assert!(parse_byte_size("G").is_err());
        assert!(parse_byte_size("12Q").is_err());
        assert!(parse_byte_size("-5").is_err());
        assert!(parse_byte_size("1.2.3M").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = MemoryConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.initial_slots(), 8192);
        assert_eq!(cfg.budget(Category::Shuffle), DEFAULT_BUDGET_BYTES);
    }

    #[test]
    fn default_budget_fits_the_target() {
        #[cfg(target_pointer_width = "64")]
        assert_eq!(DEFAULT_BUDGET_BYTES as u64, 5 << 30);
        #[cfg(not(target_pointer_width = "64"))]
        assert_eq!(DEFAULT_BUDGET_BYTES, usize::MAX);
        assert_eq!(MemoryConfig::default().storage_budget_bytes, DEFAULT_BUDGET_BYTES);
    }

    #[test]
    fn zero_budget_fails_fast() {
        let mut cfg = MemoryConfig::default();
        cfg.intersection_budget_bytes = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("intersection"));
    }

    #[test]
    fn initial_pages_must_fit() {
        let mut cfg = MemoryConfig::uniform(1024, 16);
        cfg.initial_pages = Some(32);
        assert!(cfg.validate().is_err());
        cfg.initial_pages = Some(0);
        assert!(cfg.validate().is_err());
        cfg.initial_pages = Some(4);
        cfg.validate().unwrap();
        assert_eq!(cfg.initial_slots(), 4);
    }
}
