//! Configuraiton parameters struct parsing helper.

/// Composes a configuration struct from its default values, then overwrites
/// given fields by parsing from given TOML string if it's not `None`. Returns
/// an `Ok(config)` on success, and `Err(RingKvError)` on parser failure.
///
/// Example:
/// ```no_run
/// # use ringkv::{parsed_config, RingKvError};
/// # #[derive(Default)]
/// # struct MyConfig {
/// #     ring_space: u64,
/// # }
/// # fn main() -> Result<(), RingKvError> {
/// # let config_str: Option<&str> = None;
/// let config = parsed_config!(config_str => MyConfig; ring_space)?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $config_type:ty; $($field:ident),+) => {{
        let config_str: Option<&str> = $config_str;

        // closure helper for easier error returning
        let compose_config = || -> Result<$config_type, RingKvError> {
            let mut config: $config_type = Default::default();
            if let None = config_str {
                return Ok(config);
            }

            let mut table = config_str.unwrap().parse::<toml::Table>()?;

            // traverse through all given field names
            $({
                // if field name found in table (and removed)
                if let Some(v) = table.remove(stringify!($field)) {
                    config.$field = v.try_into()?;
                }
            })+

            // if table is not empty at this time, some parsed keys are not
            // expected hence invalid
            if table.len() > 0 {
                return Err(RingKvError::msg(format!(
                    "invalid field name '{}' in config",
                    table.keys().next().unwrap(),
                )));
            }

            Ok(config)
        };

        compose_config()
    }};
}
