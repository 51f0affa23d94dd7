//! Token-level edit distance between two AS paths.

/// Levenshtein distance over path elements (insert/delete/substitute cost 1).
/// Keeps a single row of the DP table.
pub fn path_edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    if short.is_empty() {
        return long.len();
    }
    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0usize; short.len() + 1];
    for (i, x) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in short.iter().enumerate() {
            let substitute = prev[j] + usize::from(x != y);
            curr[j + 1] = substitute.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}
