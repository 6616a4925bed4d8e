//! Shared guardrails for query payload bounds and traversal limits.

pub const MAX_QUERY_LENGTH: usize = 512;
pub const MAX_TOP_K: usize = 100;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const MAX_GRAPH_VISITED: usize = 2000;
pub const MAX_BLAST_DEPTH: usize = 5;
/// Hops used for the blast-radius walk when it is switched on by default.
pub const DEFAULT_BLAST_DEPTH: usize = 3;

pub fn clamp_int(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

pub fn clamp_depth(value: usize, maximum: usize) -> usize {
    clamp_int(value, 1, maximum)
}

pub fn clamp_limit(value: usize, maximum: usize) -> usize {
    clamp_int(value, 1, maximum)
}

/// Trim and cap a query at [`MAX_QUERY_LENGTH`] bytes, on a char boundary.
pub fn truncate_query(query: &str) -> &str {
    let stripped = query.trim();
    if stripped.len() <= MAX_QUERY_LENGTH {
        return stripped;
    }
    let mut end = MAX_QUERY_LENGTH;
    while !stripped.is_char_boundary(end) {
        end -= 1;
    }
    &stripped[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps() {
        assert_eq!(clamp_depth(0, MAX_BLAST_DEPTH), 1);
        assert_eq!(clamp_depth(9, MAX_BLAST_DEPTH), 5);
        assert_eq!(clamp_limit(1000, MAX_TOP_K), 100);
        assert_eq!(clamp_int(7, 2, 10), 7);
    }

    #[test]
    fn test_truncate_query_respects_char_boundaries() {
        assert_eq!(truncate_query("  find foo  "), "find foo");
        let long = "é".repeat(MAX_QUERY_LENGTH);
        let cut = truncate_query(&long);
        assert!(cut.len() <= MAX_QUERY_LENGTH);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
