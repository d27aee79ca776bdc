//! Mapping from OAuth `state` parameters to Kubernetes resource names.
//!
//! Resource names must be RFC 1123 labels: lowercase alphanumerics plus `-`
//! or `.`, starting and ending alphanumeric, at most 63 characters. The
//! mapping is lossy, so callers must feed it uniformly random state (256
//! bits) to keep accidental collisions negligible; it is not a cryptographic
//! derivation.

/// Prefix that namespaces session records away from other resources.
pub const KEY_PREFIX: &str = "oauth-";

const MAX_NAME_LEN: usize = 63;
const MAX_SANITIZED_LEN: usize = MAX_NAME_LEN - KEY_PREFIX.len();

/// Derive the resource name for a session `state`.
///
/// `"oauth-" + truncate(sanitize(state), 57)`, re-trimmed so a truncation
/// cannot leave a trailing separator.
#[must_use]
pub fn session_key(state: &str) -> String {
    let mut sanitized = sanitize_state(state);
    if sanitized.len() > MAX_SANITIZED_LEN {
        sanitized.truncate(MAX_SANITIZED_LEN);
        sanitized = trim_separators(&sanitized);
    }
    if sanitized.is_empty() {
        sanitized = "default".to_string();
    }
    format!("{KEY_PREFIX}{sanitized}")
}

/// Sanitize an arbitrary string into a valid RFC 1123 label.
///
/// Lowercases ASCII letters, maps every other non-alphanumeric character to
/// `-`, strips leading/trailing separators, truncates to 63 characters, and
/// falls back to `"default"` for inputs that sanitize to nothing. Idempotent.
#[must_use]
pub fn sanitize_state(input: &str) -> String {
    if input.is_empty() {
        return "default".to_string();
    }

    let mapped: String = input
        .chars()
        .map(|ch| match ch {
            'a'..='z' | '0'..='9' => ch,
            'A'..='Z' => ch.to_ascii_lowercase(),
            _ => '-',
        })
        .collect();

    let mut name = trim_separators(&mapped);

    if name.len() > MAX_NAME_LEN {
        name.truncate(MAX_NAME_LEN);
        name = trim_separators(&name);
    }

    if name.is_empty() {
        return "default".to_string();
    }

    name
}

fn trim_separators(name: &str) -> String {
    name.trim_matches(|c| c == '-' || c == '.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_clean_input() {
        assert_eq!(sanitize_state("abc123"), "abc123");
    }

    #[test]
    fn lowercases_and_replaces() {
        assert_eq!(sanitize_state("AbC_1!2"), "abc-1-2");
    }

    #[test]
    fn strips_leading_and_trailing_separators() {
        assert_eq!(sanitize_state("__state__"), "state");
        assert_eq!(sanitize_state("...a..."), "a");
    }

    #[test]
    fn empty_input_falls_back_to_default() {
        assert_eq!(sanitize_state(""), "default");
        assert_eq!(session_key(""), "oauth-default");
    }

    #[test]
    fn all_symbols_falls_back_to_default() {
        assert_eq!(sanitize_state("!!!"), "default");
        assert_eq!(session_key("!!!"), "oauth-default");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for input in ["AbC_1!2", "__state__", "!!!", "a".repeat(100).as_str()] {
            let once = sanitize_state(input);
            assert_eq!(sanitize_state(&once), once, "input {input:?}");
        }
    }

    #[test]
    fn long_input_truncates_to_label_budget() {
        let input = "a".repeat(100);
        let key = session_key(&input);
        assert_eq!(key, format!("oauth-{}", "a".repeat(57)));
        assert_eq!(key.len(), 63);
    }

    #[test]
    fn truncation_never_leaves_trailing_separator() {
        // 57th character lands on a '-': truncation must re-trim.
        let input = format!("{}-{}", "a".repeat(56), "b".repeat(40));
        let key = session_key(&input);
        assert!(key.ends_with('a'), "got {key}");
        assert!(key.len() <= 63);
    }

    #[test]
    fn output_is_dns_label_compliant() {
        for input in ["State With Spaces", "UPPER", "a@b.c", &"x".repeat(200)] {
            let key = session_key(input);
            assert!(key.len() <= 63);
            assert!(
                key.chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
            );
            assert!(key.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()));
            assert!(key.chars().last().is_some_and(|c| c.is_ascii_alphanumeric()));
        }
    }
}
