//! Edit-distance similarity.

/// Levenshtein distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Single rolling row.
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diag = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = if ca == cb { 0 } else { 1 };
            row[j + 1] = (above + 1).min(row[j] + 1).min(diag + cost);
            diag = above;
        }
    }
    row[b.len()]
}

/// `1 - distance / max(len(a), len(b))`, symmetric, with `similarity(x, x) == 1`.
///
/// Two empty strings are identical (1.0); an empty string is unrelated to any
/// non-empty one (0.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let longest = len_a.max(len_b);
    if longest == 0 {
        return 1.0;
    }
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn distance_counts_chars_not_bytes() {
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn similarity_is_reflexive() {
        for s in ["", "a", "gift", "blue shoes", "écharpe en laine"] {
            assert_eq!(similarity(s, s), 1.0, "{s:?}");
        }
    }

    #[test]
    fn similarity_empty_cases() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("", "mug"), 0.0);
        assert_eq!(similarity("mug", ""), 0.0);
    }

    #[test]
    fn similarity_is_symmetric() {
        let pairs = [("sneakers", "sneaker"), ("mug", "hug"), ("watch", "watches")];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn fuzzy_threshold_examples() {
        assert!(similarity("sneakers", "sneaker") >= 0.8);
        assert!(similarity("sneakers", "xyz") < 0.8);
        let s = similarity("sneakers", "sneaker");
        assert!((s - 0.875).abs() < 1e-9);
    }
}
