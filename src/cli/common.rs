//! Helpers shared across CLI commands.

use std::time::Duration;

use crate::config::Config;
use crate::net::NetOptions;

/// Fall back to `default_bind` when neither a bind nor a connect address
/// was given.
pub fn default_addresses(
    bind: Option<&str>,
    connect: &[String],
    default_bind: &str,
) -> Option<String> {
    match bind {
        Some(bind) => Some(bind.to_string()),
        None if connect.is_empty() => Some(default_bind.to_string()),
        None => None,
    }
}

/// Config socket options, with `--interval` taking precedence.
pub fn net_options(config: &Config, interval_ms: Option<u64>) -> NetOptions {
    let options = config.net.to_options();
    match interval_ms {
        Some(ms) => options.with_poll_interval(Duration::from_millis(ms.max(1))),
        None => options,
    }
}

/// `"a, b"` for log output; `"-"` when empty.
pub fn join_addresses(addresses: &[String]) -> String {
    if addresses.is_empty() {
        "-".to_string()
    } else {
        addresses.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addresses() {
        let none: &[String] = &[];
        let some = ["h:1".to_string()];

        assert_eq!(default_addresses(None, none, "d:9").as_deref(), Some("d:9"));
        assert_eq!(default_addresses(None, &some, "d:9"), None);
        assert_eq!(default_addresses(Some("b:2"), &some, "d:9").as_deref(), Some("b:2"));
    }

    #[test]
    fn test_interval_overrides_config() {
        let config = Config::default();
        assert_eq!(net_options(&config, None), config.net.to_options());
        assert_eq!(
            net_options(&config, Some(20)).poll_interval,
            Duration::from_millis(20)
        );
        assert_eq!(
            net_options(&config, Some(0)).poll_interval,
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_join_addresses() {
        assert_eq!(join_addresses(&[]), "-");
        assert_eq!(join_addresses(&["a:1".into(), "b:2".into()]), "a:1, b:2");
    }
}
