/// Strips a markdown code fence from model output, with or without the
/// `sql` language tag. Plain SQL passes through untouched.
pub fn strip_sql_markdown(raw: &str) -> String {
    let mut sql = raw.trim();
    if let Some(rest) = sql.strip_prefix("```sql") {
        sql = rest;
    } else if let Some(rest) = sql.strip_prefix("```") {
        sql = rest;
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest;
    }
    sql.trim().to_string()
}

/// Double-quotes an identifier for interpolation into PRAGMA and dynamic
/// statements, which cannot take bind parameters in identifier position.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_in_both_forms() {
        assert_eq!(
            strip_sql_markdown("```sql\nSELECT 1\n```"),
            "SELECT 1"
        );
        assert_eq!(strip_sql_markdown("```\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_sql_markdown("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("Invoice Line"), "\"Invoice Line\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
