use std::collections::HashMap;
use std::sync::OnceLock;

use rand::Rng;

// US-QWERTY rows with their physical stagger, in key widths.
const ROWS: [(&str, f64); 4] = [
    ("1234567890-=", 0.0),
    ("qwertyuiop[]", 0.5),
    ("asdfghjkl;'", 0.75),
    ("zxcvbnm,./", 1.25),
];

// Keys whose centres are within this distance count as neighbours.
const NEIGHBOR_RADIUS: f64 = 1.3;

fn key_centers() -> Vec<(char, f64, f64)> {
    let mut out = Vec::new();
    for (row_idx, (row, stagger)) in ROWS.iter().enumerate() {
        for (col, c) in row.chars().enumerate() {
            out.push((c, col as f64 + stagger, row_idx as f64));
        }
    }
    out
}

fn adjacency_table() -> &'static HashMap<char, Vec<char>> {
    static TABLE: OnceLock<HashMap<char, Vec<char>>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let centers = key_centers();
        let mut table = HashMap::with_capacity(centers.len());
        for &(c, x, y) in &centers {
            let neighbors: Vec<char> = centers
                .iter()
                .filter(|&&(other, ox, oy)| {
                    other != c && (ox - x).hypot(oy - y) <= NEIGHBOR_RADIUS
                })
                .map(|&(other, _, _)| other)
                .collect();
            table.insert(c, neighbors);
        }
        table
    })
}

/// Physically adjacent keys for `c` (unshifted layer), or an empty slice.
pub fn qwerty_neighbors(c: char) -> &'static [char] {
    adjacency_table()
        .get(&c.to_ascii_lowercase())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Pick a plausible fat-finger substitute for `c`.
///
/// Letters keep their case. Returns `None` for characters with no modelled
/// neighbours (whitespace, shifted symbols, non-ASCII).
pub fn qwerty_adjacent_char(c: char, rng: &mut impl Rng) -> Option<char> {
    let neighbors = qwerty_neighbors(c);
    if neighbors.is_empty() {
        return None;
    }

    let chosen = neighbors[rng.gen_range(0..neighbors.len())];
    Some(if c.is_ascii_uppercase() {
        chosen.to_ascii_uppercase()
    } else {
        chosen
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Lcg;

    #[test]
    fn home_row_neighbors_follow_layout() {
        let a = qwerty_neighbors('a');
        for expected in ['q', 'w', 's', 'z'] {
            assert!(a.contains(&expected), "{expected} missing from {a:?}");
        }
        assert!(!a.contains(&'p'));
        assert!(!a.contains(&'a'));

        let j = qwerty_neighbors('j');
        for expected in ['h', 'k', 'u', 'i', 'n', 'm'] {
            assert!(j.contains(&expected), "{expected} missing from {j:?}");
        }
    }

    #[test]
    fn adjacency_is_symmetric() {
        for (c, neighbors) in adjacency_table() {
            for n in neighbors {
                assert!(
                    qwerty_neighbors(*n).contains(c),
                    "{c} -> {n} but not {n} -> {c}"
                );
            }
        }
    }

    #[test]
    fn substitute_preserves_case_and_differs() {
        let mut rng = Lcg::new(5);
        for _ in 0..200 {
            let sub = qwerty_adjacent_char('G', &mut rng).unwrap();
            assert_ne!(sub, 'G');
            assert!(!sub.is_ascii_lowercase(), "{sub}");
            let sub = qwerty_adjacent_char('g', &mut rng).unwrap();
            assert!(qwerty_neighbors('g').contains(&sub));
        }
    }

    #[test]
    fn unmodelled_characters_have_no_substitute() {
        let mut rng = Lcg::new(1);
        assert_eq!(qwerty_adjacent_char(' ', &mut rng), None);
        assert_eq!(qwerty_adjacent_char('\n', &mut rng), None);
        assert_eq!(qwerty_adjacent_char('é', &mut rng), None);
    }
}
