// ============================================================
// IDENTIFIER NAMING
// ============================================================
// Deterministic mapping from file and header names to SQL identifiers

/// PostgreSQL silently cuts longer identifiers to this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Replace every character outside `[A-Za-z0-9]` with `_`, then cut the
/// result to [`MAX_IDENTIFIER_LEN`].
///
/// One input character maps to exactly one output character, so the result
/// is stable across runs and applying it twice changes nothing.
pub fn sanitize_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    // pure ASCII from here, any byte index is a char boundary
    ident.truncate(MAX_IDENTIFIER_LEN);
    ident
}

/// Table name for a file base name. `-` is already covered by
/// [`sanitize_identifier`]; the extra replacement keeps the rule explicit.
pub fn table_name_for(base_name: &str) -> String {
    sanitize_identifier(base_name).replace('-', "_")
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
