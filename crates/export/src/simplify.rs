//! Polyline simplification for plotted series.

use std::{cmp::Ordering, collections::BinaryHeap};

/// Triangle formed by a point and its current neighbours. Ordered so that the
/// heap yields the smallest area first.
#[derive(Debug)]
struct Triangle {
    area: f64,
    current: usize,
    left: usize,
    right: usize,
}

impl Triangle {
    fn new(points: &[(f64, f64)], left: usize, current: usize, right: usize) -> Self {
        let (a_x, a_y) = points[left];
        let (t_x, t_y) = points[current];
        let (b_x, b_y) = points[right];
        let area = ((a_x - t_x) * (b_y - t_y) - (b_x - t_x) * (a_y - t_y)).abs();
        Self { area, current, left, right }
    }
}

impl PartialEq for Triangle {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Triangle {}

impl PartialOrd for Triangle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Triangle {
    fn cmp(&self, other: &Self) -> Ordering {
        other.area.total_cmp(&self.area).then_with(|| other.current.cmp(&self.current))
    }
}

/// Visvalingam-Whyatt simplification: repeatedly drop the point whose triangle
/// with its neighbours has the smallest area, until every remaining triangle is
/// at least `epsilon`. The end points are always kept.
pub fn visvalingam(points: &[(f64, f64)], epsilon: f64) -> Vec<(f64, f64)> {
    let len = points.len();
    let mut prev = (0..len).map(|i| i.checked_sub(1)).collect::<Vec<_>>();
    let mut next = (0..len).map(|i| Some(i + 1).filter(|&n| n < len)).collect::<Vec<_>>();
    let mut removed = vec![false; len];

    // Stale entries are left in the heap and skipped when popped
    let mut heap = (1..len.saturating_sub(1))
        .map(|i| Triangle::new(points, i - 1, i, i + 1))
        .collect::<BinaryHeap<_>>();
    while let Some(smallest) = heap.pop() {
        if smallest.area >= epsilon {
            break;
        }
        let Triangle { current, left, right, .. } = smallest;
        if removed[current] || prev[current] != Some(left) || next[current] != Some(right) {
            continue;
        }
        removed[current] = true;
        next[left] = Some(right);
        prev[right] = Some(left);
        if let Some(outer) = prev[left] {
            heap.push(Triangle::new(points, outer, left, right));
        }
        if let Some(outer) = next[right] {
            heap.push(Triangle::new(points, left, right, outer));
        }
    }

    points.iter().zip(removed).filter(|(_, removed)| !removed).map(|(p, _)| *p).collect()
}
