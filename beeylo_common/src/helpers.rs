/// Parse a boolean flag from a string value, or return the given default value otherwise.
///
/// Shopify note attributes and environment variables both use this, so "yes"/"no" are accepted alongside the usual
/// "true"/"false" and "1"/"0" spellings.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => true,
        "0" | "false" | "no" | "n" | "off" => false,
        _ => default,
    }
}
