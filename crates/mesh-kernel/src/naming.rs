//! Agent name normalization.

/// Normalize a name to lowercase alphanumerics joined by single hyphens.
///
/// Every run of characters outside `[a-z0-9]` collapses to one `-`, and
/// leading/trailing hyphens are stripped. An empty result falls back to
/// `"agent"`. The output always matches `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if out.is_empty() {
        "agent".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underscores_become_hyphens() {
        assert_eq!(normalize_name("Hello_World"), "hello-world");
    }

    #[test]
    fn runs_of_separators_collapse() {
        assert_eq!(normalize_name("my__weird--Agent!!name"), "my-weird-agent-name");
    }

    #[test]
    fn leading_and_trailing_separators_are_stripped() {
        assert_eq!(normalize_name("--edgy--"), "edgy");
    }

    #[test]
    fn empty_input_falls_back() {
        assert_eq!(normalize_name(""), "agent");
        assert_eq!(normalize_name("!!!"), "agent");
    }

    #[test]
    fn already_normalized_names_pass_through() {
        assert_eq!(normalize_name("hello-world-2"), "hello-world-2");
    }
}
