//! POSIX shell quoting

/// Quote a string for safe interpolation into a `sh -c` command line.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_words_are_untouched() {
        assert_eq!(shell_quote("/opt/keel/current"), "/opt/keel/current");
        assert_eq!(shell_quote("ha-flip-bot:abc123"), "ha-flip-bot:abc123");
    }

    #[test]
    fn test_special_characters_are_quoted() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
    }
}
