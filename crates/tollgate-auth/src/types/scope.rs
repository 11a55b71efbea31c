//! Space-delimited scope helpers.

/// Parses a space-delimited scope string, dropping duplicates and keeping order.
#[must_use]
pub fn parse(scope: &str) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for s in scope.split_whitespace() {
        if !scopes.iter().any(|existing| existing == s) {
            scopes.push(s.to_string());
        }
    }
    scopes
}

/// Joins scopes into the space-delimited wire form.
#[must_use]
pub fn join(scopes: &[String]) -> String {
    scopes.join(" ")
}

/// Returns true if every scope in `requested` appears in `granted`.
#[must_use]
pub fn is_subset(requested: &[String], granted: &[String]) -> bool {
    requested.iter().all(|s| granted.contains(s))
}

/// Returns the scopes of `requested` that also appear in `allowed`.
#[must_use]
pub fn intersect(requested: &[String], allowed: &[String]) -> Vec<String> {
    requested
        .iter()
        .filter(|s| allowed.contains(s))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dedupes_and_trims() {
        assert_eq!(
            parse("  read_balance create_balance read_balance "),
            vec!["read_balance".to_string(), "create_balance".to_string()]
        );
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_subset_and_intersect() {
        let granted = parse("read_balance create_balance");
        assert!(is_subset(&parse("read_balance"), &granted));
        assert!(is_subset(&[], &granted));
        assert!(!is_subset(&parse("read_balance admin"), &granted));
        assert_eq!(intersect(&parse("admin read_balance"), &granted), parse("read_balance"));
        assert_eq!(join(&granted), "read_balance create_balance");
    }
}
