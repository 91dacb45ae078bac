//! Identifier quoting helpers shared by the built-in dialects.

/// Quote an identifier with ANSI double quotes, doubling embedded quotes.
///
/// ```
/// use rowmap_core::quote_ident;
///
/// assert_eq!(quote_ident("widgets"), "\"widgets\"");
/// assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Quote an identifier with MySQL backticks, doubling embedded backticks.
pub fn quote_ident_mysql(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('`');
    for ch in name.chars() {
        if ch == '`' {
            out.push('`');
        }
        out.push(ch);
    }
    out.push('`');
    out
}

/// Reduce an arbitrary string to `[A-Za-z0-9_]`, for names derived from
/// user input (e.g. generated table names). Never use this instead of quoting.
pub fn sanitize_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", cleaned)
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_quoting() {
        assert_eq!(quote_ident_mysql("order"), "`order`");
        assert_eq!(quote_ident_mysql("a`b"), "`a``b`");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_identifier("my table"), "my_table");
        assert_eq!(sanitize_identifier("1st"), "_1st");
        assert_eq!(sanitize_identifier("ok_name"), "ok_name");
    }
}
