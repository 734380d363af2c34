//! Layer order and built-in defaults for the configuration builder.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Builder pre-seeded with the defaults every layer may override.
///
/// Generation waits longer between attempts than fetching. A file that sets only
/// part of `[retry.generate]` must still get that delay.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("store.path", ".playbook-sync/store.json")?
        .set_default("input.company", "data/company_info.json")?
        .set_default("input.targets", "data/target_info.json")?
        .set_default("output.dir", "output")?
        .set_default("retry.generate.delay_ms", 1500)
}
