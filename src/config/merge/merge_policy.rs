//! Merge rules: defaults, override order, conflict handling.

use crate::cache::DEFAULT_GET_TTL_MS;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources override earlier ones key by key, so a workspace file only needs the
/// keys it changes.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("cache.default_ttl_ms", DEFAULT_GET_TTL_MS)?
        .set_default("cache.persistent", false)?
        .set_default("requests.immediate", true)?
        .set_default("requests.share_request", true)?
        .set_default("transport.timeout_ms", 0u64)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
