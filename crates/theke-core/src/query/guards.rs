//! Shared guardrails for search payload bounds.

pub const MAX_QUERY_LENGTH: usize = 512;
pub const DEFAULT_SEARCH_LIMIT: i64 = 500;
pub const MAX_SEARCH_LIMIT: i64 = 5000;

pub fn clamp_int(value: i64, minimum: i64, maximum: i64) -> i64 {
    value.max(minimum).min(maximum)
}

pub fn clamp_limit(value: i64, maximum: i64) -> i64 {
    clamp_int(value, 1, maximum)
}

/// Trim and cut a keyword to [`MAX_QUERY_LENGTH`] bytes on a char boundary.
pub fn truncate_query(query: &str) -> String {
    let stripped = query.trim();
    if stripped.len() <= MAX_QUERY_LENGTH {
        return stripped.to_string();
    }
    let mut end = MAX_QUERY_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    stripped[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps() {
        assert_eq!(clamp_limit(0, MAX_SEARCH_LIMIT), 1);
        assert_eq!(clamp_limit(10_000, MAX_SEARCH_LIMIT), MAX_SEARCH_LIMIT);
        assert_eq!(clamp_int(7, 1, 10), 7);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "é".repeat(MAX_QUERY_LENGTH);
        let cut = truncate_query(&long);
        assert!(cut.len() <= MAX_QUERY_LENGTH);
        assert!(cut.chars().all(|c| c == 'é'));
        assert_eq!(truncate_query("  agape  "), "agape");
    }
}
