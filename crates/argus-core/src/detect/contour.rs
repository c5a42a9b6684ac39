//! Contour geometry: boundary tracing, perimeter, convex hull, and polygon
//! approximation for the shape filters.

use std::collections::HashSet;

/// 8-neighborhood offsets in clockwise order starting east, as (drow, dcol).
const DIRS: [(i64, i64); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

/// Trace the outer boundary of a pixel set with Moore-neighbor tracing.
///
/// Starts from the topmost-leftmost pixel and walks clockwise. A single
/// pixel yields a one-point contour.
pub fn trace_boundary(pixels: &[(usize, usize)]) -> Vec<(usize, usize)> {
    if pixels.is_empty() {
        return Vec::new();
    }
    let set: HashSet<(i64, i64)> = pixels.iter().map(|&(r, c)| (r as i64, c as i64)).collect();

    let &start = pixels
        .iter()
        .min_by_key(|&&(r, c)| (r, c))
        .expect("non-empty pixel set");
    let start = (start.0 as i64, start.1 as i64);

    if set.len() == 1 {
        return vec![(start.0 as usize, start.1 as usize)];
    }

    let mut contour = vec![start];
    // The start pixel has no foreground neighbor above or to its left, so
    // searching clockwise from west finds the first boundary step.
    let mut current = start;
    let mut search_from = 4usize; // index of west in DIRS

    let max_steps = 4 * set.len() + 8;
    for _ in 0..max_steps {
        let mut found = None;
        for step in 1..=8usize {
            let dir = (search_from + step) % 8;
            let (dr, dc) = DIRS[dir];
            let candidate = (current.0 + dr, current.1 + dc);
            if set.contains(&candidate) {
                found = Some((candidate, dir));
                break;
            }
        }
        let Some((next, dir)) = found else {
            break;
        };
        if next == start && contour.len() > 1 {
            break;
        }
        contour.push(next);
        current = next;
        // Resume the search from the neighbor just past the pixel we came
        // from, keeping the walk hugging the boundary clockwise.
        search_from = (dir + 4 + 1) % 8;
    }

    contour
        .into_iter()
        .map(|(r, c)| (r as usize, c as usize))
        .collect()
}

/// Closed arc length of a contour: summed distances between consecutive
/// points plus the closing edge. Zero for degenerate contours.
pub fn perimeter(contour: &[(usize, usize)]) -> f64 {
    let points: Vec<(f64, f64)> = contour.iter().map(|&(r, c)| (c as f64, r as f64)).collect();
    closed_length(&points)
}

/// Closed arc length over floating-point (x, y) points.
pub fn closed_length(points: &[(f64, f64)]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % points.len()];
        total += ((x1 - x2).powi(2) + (y1 - y2).powi(2)).sqrt();
    }
    total
}

/// Convex hull of contour points (Andrew monotone chain), minimal vertex
/// set with collinear points dropped. Points are (x, y).
pub fn convex_hull(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut pts: Vec<(f64, f64)> = points.to_vec();
    pts.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    pts.dedup();
    let n = pts.len();
    if n <= 2 {
        return pts;
    }

    let cross = |o: (f64, f64), a: (f64, f64), b: (f64, f64)| -> f64 {
        (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
    };

    let mut lower: Vec<(f64, f64)> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<(f64, f64)> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Douglas-Peucker approximation of a closed contour.
///
/// The curve is split at the point farthest from the first point and both
/// halves simplified independently, mirroring the usual closed-curve
/// handling.
pub fn approx_poly(points: &[(f64, f64)], epsilon: f64) -> Vec<(f64, f64)> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let first = points[0];
    let (split, _) = points
        .iter()
        .enumerate()
        .map(|(i, &p)| {
            let dx = p.0 - first.0;
            let dy = p.1 - first.1;
            (i, dx * dx + dy * dy)
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .expect("non-empty contour");
    if split == 0 {
        return vec![first];
    }

    let mut half1 = douglas_peucker(&points[0..=split], epsilon);
    let mut closing: Vec<(f64, f64)> = points[split..].to_vec();
    closing.push(first);
    let half2 = douglas_peucker(&closing, epsilon);

    // Endpoints are shared between the halves; drop the duplicates.
    half1.pop();
    half1.extend_from_slice(&half2[..half2.len() - 1]);
    half1
}

fn douglas_peucker(points: &[(f64, f64)], epsilon: f64) -> Vec<(f64, f64)> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }

    let (a, b) = (points[0], points[n - 1]);
    let mut max_dist = 0.0;
    let mut index = 0usize;
    for (i, &p) in points.iter().enumerate().take(n - 1).skip(1) {
        let d = point_segment_distance(p, a, b);
        if d > max_dist {
            max_dist = d;
            index = i;
        }
    }

    if max_dist > epsilon {
        let mut left = douglas_peucker(&points[0..=index], epsilon);
        let right = douglas_peucker(&points[index..], epsilon);
        left.pop();
        left.extend_from_slice(&right);
        left
    } else {
        vec![a, b]
    }
}

fn point_segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt();
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0);
    let (px, py) = (a.0 + t * dx, a.1 + t * dy);
    ((p.0 - px).powi(2) + (p.1 - py).powi(2)).sqrt()
}
