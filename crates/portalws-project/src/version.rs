//! Version compatibility between a declared dependency and a workspace module.

const WILDCARDS: &[&str] = &["default", "*", "+", "latest.release", "latest.integration"];
const RANGE_DELIMITERS: &[char] = &['[', ']', '(', ')', ','];

pub fn is_wildcard(version: &str) -> bool {
    WILDCARDS.contains(&version.trim())
}

pub fn is_range(version: &str) -> bool {
    version.contains(RANGE_DELIMITERS)
}

/// Whether `requested` can be satisfied by `actual`.
///
/// Rules apply in order: a wildcard on either side matches; a range on either side needs exact
/// equality; otherwise only the text before the first `.` is compared. `1.9` and `1.10` are
/// therefore compatible while `1.9` and `2.0` are not.
pub fn is_compatible(requested: &str, actual: &str) -> bool {
    let requested = requested.trim();
    let actual = actual.trim();

    if is_wildcard(requested) || is_wildcard(actual) {
        return true;
    }
    if is_range(requested) || is_range(actual) {
        return requested == actual;
    }
    major(requested) == major(actual)
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}
