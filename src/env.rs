/// Interpret a string value such as "1" or "no" as a boolean.
///
/// Returns `None` for unrecognized values.
pub fn str_as_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Resolve a flag from an optional string value, falling back to `default`
/// if the value is missing or unrecognized.
fn flag_value(name: &str, value: Option<&str>, default: bool) -> bool {
    match value.map(|s| (s, str_as_bool(s))) {
        Some((_, Some(flag))) => flag,
        Some((s, None)) => {
            tracing::warn!(variable = name, value = s, "unrecognized boolean value");
            default
        }
        None => default,
    }
}

/// Return whether a feature flag controlled by an environment variable is
/// enabled.
pub fn env_flag(name: &str, default: bool) -> bool {
    let value = std::env::var(name).ok();
    flag_value(name, value.as_deref(), default)
}

#[cfg(test)]
mod tests {
    use tgraph_testing::TestCases;

    use super::{flag_value, str_as_bool};

    #[test]
    fn test_str_as_bool() {
        #[derive(Debug)]
        struct Case {
            value: &'static str,
            expected: Option<bool>,
        }

        let cases = [
            ("1", Some(true)),
            ("true", Some(true)),
            ("Yes", Some(true)),
            ("y", Some(true)),
            ("0", Some(false)),
            ("false", Some(false)),
            ("n", Some(false)),
            ("", None),
            ("maybe", None),
        ]
        .map(|(value, expected)| Case { value, expected });

        cases.test_each(|case| {
            assert_eq!(str_as_bool(case.value), case.expected);
        });
    }

    #[test]
    fn test_flag_value() {
        assert!(flag_value("X", None, true));
        assert!(!flag_value("X", Some("0"), true));
        assert!(flag_value("X", Some("1"), false));
        assert!(flag_value("X", Some("garbage"), true));
    }
}
