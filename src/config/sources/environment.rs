//! Environment source: COURIER_<SECTION>__<KEY>, e.g. COURIER_CACHE__DEFAULT_TTL_MS=1000

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::Environment;

pub fn add_to_builder(builder: ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState> {
    builder.add_source(
        Environment::with_prefix("COURIER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    )
}
