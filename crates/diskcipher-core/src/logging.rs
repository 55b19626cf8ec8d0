//! Logging bootstrap shared by embedders and tests.

use env_logger::{Builder, Env};
use std::sync::Once;

static INIT: Once = Once::new();

/// Install an `env_logger` backend once; `RUST_LOG` overrides `default_level`.
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let env = Env::default().default_filter_or(default_level);
        let _ = Builder::from_env(env)
            .format_timestamp_millis()
            .format_module_path(true)
            .try_init();
    });
}

/// Variant for test binaries: output is captured per test.
pub fn init_for_tests() {
    let _ = Builder::from_env(Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}
