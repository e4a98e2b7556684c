//! Record name helpers shared by the record resource and data sources

/// Fully qualified name of a record.
///
/// `@` is the zone apex. Names the API already reports as fully qualified
/// (ending in `<domain>.`) lose their trailing dot.
pub fn record_fqdn(name: &str, domain: &str) -> String {
    if name == "@" {
        return domain.to_string();
    }
    let suffix = format!("{}.", domain);
    if name.ends_with(&suffix) {
        return name.trim_end_matches('.').to_string();
    }
    format!("{}.{}", name, domain)
}

/// Relative form of a configured name: the apex becomes `@` and a
/// `<name>.<domain>[.]` suffix is stripped.
pub fn relative_name(name: &str, domain: &str) -> String {
    let trimmed = name.trim_end_matches('.');
    if trimmed == domain {
        return "@".to_string();
    }
    trimmed
        .strip_suffix(&format!(".{}", domain))
        .unwrap_or(name)
        .to_string()
}

/// Two record names denote the same record in `domain`
pub fn names_equivalent(a: &str, b: &str, domain: &str) -> bool {
    relative_name(a, domain) == relative_name(b, domain)
}

/// Record values that name hosts may be written with or without the final
/// dot; `@` in a host value refers to the zone apex.
pub fn values_equivalent(record_type: &str, a: &str, b: &str, domain: &str) -> bool {
    if !matches!(record_type, "CNAME" | "MX" | "NS" | "SRV" | "CAA") {
        return a == b;
    }
    let expand = |v: &str| {
        if v == "@" {
            format!("{}.", domain)
        } else if v.ends_with('.') {
            v.to_string()
        } else if record_type == "CAA" {
            v.to_string()
        } else {
            format!("{}.", v)
        }
    };
    expand(a) == expand(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqdn_joins_relative_names() {
        assert_eq!(record_fqdn("www", "nonexample.com"), "www.nonexample.com");
    }

    #[test]
    fn fqdn_of_apex_is_the_domain() {
        assert_eq!(record_fqdn("@", "nonexample.com"), "nonexample.com");
    }

    #[test]
    fn fqdn_trims_trailing_dot() {
        assert_eq!(
            record_fqdn("www.nonexample.com.", "nonexample.com"),
            "www.nonexample.com"
        );
    }

    #[test]
    fn names_equivalent_across_forms() {
        assert!(names_equivalent("@", "example.com", "example.com"));
        assert!(names_equivalent("www", "www.example.com.", "example.com"));
        assert!(names_equivalent("www", "www.example.com", "example.com"));
        assert!(!names_equivalent("www", "api", "example.com"));
    }

    #[test]
    fn host_values_ignore_final_dot() {
        assert!(values_equivalent("CNAME", "a.example.com", "a.example.com.", "example.com"));
        assert!(values_equivalent("MX", "@", "example.com.", "example.com"));
        assert!(!values_equivalent("A", "192.0.2.1", "192.0.2.2", "example.com"));
        assert!(!values_equivalent("TXT", "v=spf1", "v=spf1.", "example.com"));
    }
}
