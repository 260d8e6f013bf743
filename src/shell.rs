/// Quotes a string for a POSIX shell.
///
/// Strings made only of safe characters are returned bare.
pub fn quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(|c| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '%' | ':' | '=' | ',' | '+')
    }) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::quote;

    #[test]
    fn test_safe_strings_stay_bare() {
        assert_eq!(quote("/etc/sysctl.conf"), "/etc/sysctl.conf");
        assert_eq!(quote("vm.swappiness=10"), "vm.swappiness=10");
    }

    #[test]
    fn test_quotes_special_characters() {
        assert_eq!(quote(""), "''");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote("$HOME"), "'$HOME'");
        assert_eq!(quote("it's"), "'it'\\''s'");
    }
}
