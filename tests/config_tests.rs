//! Configuration loading tests

use taskmem_core::config::DEFAULT_BUDGET_BYTES;
use taskmem_core::prelude::{Category, Error, MemoryConfig};
use taskmem_mem::TaskMemoryManager;

#[test]
fn test_config_from_json_fills_defaults() {
    let cfg = MemoryConfig::from_json(
        r#"{"shuffle_budget_bytes": 1048576, "max_pages": 64, "initial_pages": 8}"#,
    )
    .expect("valid json");

    assert_eq!(cfg.budget(Category::Shuffle), 1 << 20);
    assert_eq!(cfg.budget(Category::Storage), DEFAULT_BUDGET_BYTES);
    assert_eq!(cfg.max_pages, 64);
    assert_eq!(cfg.initial_slots(), 8);
    assert!(!cfg.strict);

    let mgr = TaskMemoryManager::new(&cfg).unwrap();
    assert_eq!(mgr.page_table_len(), 8);
    assert_eq!(mgr.snapshot().budget.shuffle, 1 << 20);
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(matches!(
        MemoryConfig::from_json(r#"{"max_pages": 0}"#),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        MemoryConfig::from_json(r#"{"storage_budget_bytes": "lots"}"#),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_config_json_round_trips_through_serde() {
    let mut cfg = MemoryConfig::uniform(4096, 32);
    cfg.strict = true;
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(MemoryConfig::from_json(&json).unwrap(), cfg);
}

// All environment cases live in one test; the process environment is shared
// between test threads.
#[test]
fn test_config_from_env() {
    const KEYS: [&str; 6] = [
        "TASKMEM_STORAGE_MEM",
        "TASKMEM_SHUFFLE_MEM",
        "TASKMEM_INTERSECTION_MEM",
        "TASKMEM_MAX_PAGES",
        "TASKMEM_INITIAL_PAGES",
        "TASKMEM_STRICT",
    ];
    for key in KEYS {
        std::env::remove_var(key);
    }

    assert_eq!(MemoryConfig::from_env().unwrap(), MemoryConfig::default());

    std::env::set_var("TASKMEM_STORAGE_MEM", "512M");
    std::env::set_var("TASKMEM_SHUFFLE_MEM", "1.5G");
    std::env::set_var("TASKMEM_INTERSECTION_MEM", "65536");
    std::env::set_var("TASKMEM_MAX_PAGES", "1024");
    std::env::set_var("TASKMEM_INITIAL_PAGES", "16");
    std::env::set_var("TASKMEM_STRICT", "true");

    let cfg = MemoryConfig::from_env().unwrap();
    assert_eq!(cfg.storage_budget_bytes, 512 << 20);
    assert_eq!(cfg.shuffle_budget_bytes, 3 << 29);
    assert_eq!(cfg.intersection_budget_bytes, 65536);
    assert_eq!(cfg.max_pages, 1024);
    assert_eq!(cfg.initial_pages, Some(16));
    assert!(cfg.strict);

    std::env::set_var("TASKMEM_MAX_PAGES", "many");
    assert!(matches!(MemoryConfig::from_env(), Err(Error::Config(_))));
    std::env::set_var("TASKMEM_MAX_PAGES", "1024");

    std::env::set_var("TASKMEM_STRICT", "maybe");
    assert!(matches!(MemoryConfig::from_env(), Err(Error::Config(_))));
    std::env::remove_var("TASKMEM_STRICT");

    std::env::set_var("TASKMEM_SHUFFLE_MEM", "0");
    assert!(matches!(MemoryConfig::from_env(), Err(Error::Config(_))));

    for key in KEYS {
        std::env::remove_var(key);
    }
}

#[test]
fn test_category_parses_from_str() {
    assert_eq!("storage".parse::<Category>().unwrap(), Category::Storage);
    assert_eq!("Shuffle".parse::<Category>().unwrap(), Category::Shuffle);
    assert_eq!("join".parse::<Category>().unwrap(), Category::Intersection);
    assert!(matches!("heap".parse::<Category>(), Err(Error::Config(_))));
}
