/// Bucket for error text that matches no rule.
pub const OTHER_CATEGORY: &str = "other";

/// Ordered `(needle, category)` rules. The first needle found wins.
const ERROR_RULES: &[(&str, &str)] = &[
    ("bad argument type", "Bad argument type"),
    ("too few arguments", "Too few arguments"),
    ("too many arguments", "Too many arguments"),
    ("null function", "Null function"),
    ("invalid selection", "Invalid selection"),
    ("object not found", "Object not found"),
    ("syntax error", "Syntax error"),
];

/// Case-insensitive first-match categorization of raw error text.
pub fn categorize(message: &str) -> &'static str {
    let lowered = message.to_lowercase();

    ERROR_RULES
        .iter()
        .find(|(needle, _)| lowered.contains(needle))
        .map(|(_, category)| *category)
        .unwrap_or(OTHER_CATEGORY)
}
