//! Quadratic node split.
//!
//! Guttman's quadratic heuristic: seed the two groups with the pair that
//! would waste the most area together, then repeatedly place the member with
//! the strongest preference for one group. Every tie is broken by lower index
//! so the same input always yields the same tree.

use crate::geometry::Rect;

/// Partitions `rects` into two non-empty groups of indices.
///
/// Each group receives at least `min_fill` members. Both groups are returned
/// in ascending index order; together they hold every index exactly once.
pub(crate) fn quadratic_split(rects: &[Rect], min_fill: usize) -> (Vec<usize>, Vec<usize>) {
    debug_assert!(rects.len() >= 2);
    let (seed_a, seed_b) = pick_seeds(rects);

    let mut groups = [vec![seed_a], vec![seed_b]];
    let mut bounds = [rects[seed_a], rects[seed_b]];
    let mut remaining: Vec<usize> = (0..rects.len())
        .filter(|&i| i != seed_a && i != seed_b)
        .collect();

    while !remaining.is_empty() {
        if let Some(g) = (0..2).find(|&g| groups[g].len() + remaining.len() <= min_fill) {
            groups[g].append(&mut remaining);
            break;
        }

        let pos = pick_next(rects, &remaining, &bounds);
        let i = remaining.remove(pos);
        let g = preferred_group(&rects[i], &bounds, &groups);
        groups[g].push(i);
        bounds[g].expand(&rects[i]);
    }

    let [mut a, mut b] = groups;
    a.sort_unstable();
    b.sort_unstable();
    (a, b)
}

/// The pair whose shared bounding box wastes the most area; larger margin
/// breaks ties so collinear and coincident members still spread out.
fn pick_seeds(rects: &[Rect]) -> (usize, usize) {
    let mut best = (0, 1);
    let mut best_cost = (i128::MIN, i128::MIN);
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            let union = rects[i].union(&rects[j]);
            let waste = union.area() - rects[i].area() - rects[j].area();
            let cost = (waste, union.margin());
            if cost > best_cost {
                best_cost = cost;
                best = (i, j);
            }
        }
    }
    best
}

/// Position in `remaining` of the member with the largest enlargement gap.
fn pick_next(rects: &[Rect], remaining: &[usize], bounds: &[Rect; 2]) -> usize {
    let mut best_pos = 0;
    let mut best_gap = -1i128;
    for (pos, &i) in remaining.iter().enumerate() {
        let gap = (bounds[0].enlargement(&rects[i]) - bounds[1].enlargement(&rects[i])).abs();
        if gap > best_gap {
            best_gap = gap;
            best_pos = pos;
        }
    }
    best_pos
}

fn preferred_group(rect: &Rect, bounds: &[Rect; 2], groups: &[Vec<usize>; 2]) -> usize {
    // Margin growth separates candidates whose areas are all zero (points on a line).
    let key = |g: usize| {
        (
            bounds[g].enlargement(rect),
            bounds[g].union(rect).margin() - bounds[g].margin(),
            bounds[g].area(),
            groups[g].len(),
        )
    };
    if key(1) < key(0) {
        1
    } else {
        0
    }
}
