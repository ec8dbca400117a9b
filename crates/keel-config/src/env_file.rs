//! Minimal `.env` reader.
//!
//! Accepts `KEY=VALUE` lines, blank lines, `#` comments, an optional
//! `export ` prefix and single- or double-quoted values.

use crate::error::{ConfigError, ConfigResult};
use std::collections::HashMap;
use std::path::Path;

/// Read an env file into a key/value map.
pub fn read(path: &Path) -> ConfigResult<HashMap<String, String>> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::EnvFileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content).map_err(|(line, reason)| ConfigError::EnvFileSyntax {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

/// Parse env file content. Errors carry the 1-based line number.
pub fn parse(content: &str) -> Result<HashMap<String, String>, (usize, String)> {
    let mut vars = HashMap::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| (idx + 1, "expected KEY=VALUE".to_string()))?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err((idx + 1, format!("invalid key '{}'", key)));
        }

        vars.insert(key.to_string(), unquote(value.trim()));
    }

    Ok(vars)
}

fn unquote(value: &str) -> String {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return value[1..value.len() - 1].to_string();
        }
    }
    // Unquoted values may carry a trailing comment
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_file() {
        let vars = parse(
            "# exchange\nBYBIT_API_KEY=abc\nexport DRY_RUN=true # paper mode\n\nTELEGRAM_CHAT_ID=\"-100123\"\nDB_PATH='./data/bot.db'\n",
        )
        .unwrap();
        assert_eq!(vars["BYBIT_API_KEY"], "abc");
        assert_eq!(vars["DRY_RUN"], "true");
        assert_eq!(vars["TELEGRAM_CHAT_ID"], "-100123");
        assert_eq!(vars["DB_PATH"], "./data/bot.db");
    }

    #[test]
    fn test_parse_reports_line_numbers() {
        let err = parse("A=1\nnot a pair\n").unwrap_err();
        assert_eq!(err.0, 2);

        let err = parse("BAD-KEY=1\n").unwrap_err();
        assert_eq!(err.0, 1);
    }
}
