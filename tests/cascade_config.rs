use std::io::Write;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use event_cascade::config::CascadeConfig;
use event_cascade::{HazardTier, PromptStrategy};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CASCADE_CONFIG",
        "CASCADE_STRATEGY",
        "CASCADE_MIN_TOKENS",
        "CASCADE_MAX_FRAMES",
        "CASCADE_SAMPLE_FPS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let toml = r#"
        [taxonomy]
        default_tier = "standard"
        critical = ["fire", "gas_leak"]

        [dilation]
        alpha_base = 1.3
        beta = 0.4
        [dilation.variance]
        gas_leak = 0.5

        [pruning]
        image_size = 224
        patch_size = 14
        min_tokens = 32

        [prompting]
        strategy = "standard"
        tau_high = 1.0
        tau_critical = 2.0

        [video]
        sample_fps = 2.0
        max_frames = 120
    "#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("CASCADE_CONFIG", file.path());
    std::env::set_var("CASCADE_STRATEGY", "hazard_priority");
    std::env::set_var("CASCADE_MIN_TOKENS", "48");

    let cfg = CascadeConfig::load().expect("load config");

    assert_eq!(cfg.taxonomy.default_tier, HazardTier::Standard);
    let taxonomy = cfg.build_taxonomy();
    assert_eq!(taxonomy.classify("gas_leak"), HazardTier::Critical);
    // Unmapped classes get the configured default, not a silent none.
    assert_eq!(taxonomy.classify("pelican"), HazardTier::Standard);

    assert!((cfg.dilation.alpha_base - 1.3).abs() < 1e-6);
    assert_eq!(cfg.build_grid().unwrap().side(), 16);

    // Env overrides win over the file.
    assert_eq!(cfg.prompting.strategy, PromptStrategy::HazardPriority);
    assert_eq!(cfg.pruning.min_tokens, 48);

    assert_eq!(cfg.video.max_frames, Some(120));
    assert!((cfg.video.sample_fps - 2.0).abs() < 1e-9);

    clear_env();
}

#[test]
fn unknown_strategy_in_env_fails_load() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CASCADE_STRATEGY", "vibes");
    assert!(CascadeConfig::load().is_err());

    clear_env();
}

#[test]
fn defaults_load_without_any_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = CascadeConfig::load().expect("defaults");
    assert_eq!(cfg.pruning.image_size, 336);
    assert_eq!(cfg.pruning.patch_size, 14);
    assert_eq!(cfg.build_taxonomy().classify("fire"), HazardTier::Critical);
}
