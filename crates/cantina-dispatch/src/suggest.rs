//! Closest-known-command suggestion for unknown-command responses
//! (spec §4.4 step 4).

/// Levenshtein edit distance between two strings, for suggesting the
/// closest known command to an unrecognized one.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, &ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let temp = row[j + 1];
            row[j + 1] = if ca == cb {
                prev_diag
            } else {
                1 + prev_diag.min(row[j]).min(row[j + 1])
            };
            prev_diag = temp;
        }
    }

    row[b.len()]
}

/// The known command with the smallest edit distance to `input`, if any
/// exist.
pub fn closest(input: &str, known: &[String]) -> Option<String> {
    known
        .iter()
        .min_by_key(|candidate| edit_distance(input, candidate))
        .cloned()
}
