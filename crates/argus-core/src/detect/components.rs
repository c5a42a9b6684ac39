use std::collections::HashMap;

use ndarray::Array2;

/// One 8-connected foreground region of a binary mask.
#[derive(Clone, Debug)]
pub struct Component {
    pub label: u32,
    /// Pixel count.
    pub area: usize,
    /// (min_row, max_row, min_col, max_col).
    pub bbox: (usize, usize, usize, usize),
    /// Member pixels as (row, col), in scan order.
    pub pixels: Vec<(usize, usize)>,
}

/// Two-pass connected component labeling with union-find, 8-connectivity
/// (upper-left, upper, upper-right, and left neighbors).
///
/// Returns components sorted by area descending.
pub fn connected_components(mask: &Array2<bool>) -> Vec<Component> {
    let (h, w) = mask.dim();
    if h == 0 || w == 0 {
        return Vec::new();
    }

    let mut labels = Array2::<u32>::zeros((h, w));
    let mut next_label: u32 = 1;
    // Union-find parent array. Index 0 unused; labels start at 1.
    let mut parent: Vec<u32> = vec![0; h * w / 2 + 2];

    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }

            let mut neighbors = [0u32; 4];
            let mut n = 0usize;
            if row > 0 {
                if col > 0 && labels[[row - 1, col - 1]] > 0 {
                    neighbors[n] = labels[[row - 1, col - 1]];
                    n += 1;
                }
                if labels[[row - 1, col]] > 0 {
                    neighbors[n] = labels[[row - 1, col]];
                    n += 1;
                }
                if col + 1 < w && labels[[row - 1, col + 1]] > 0 {
                    neighbors[n] = labels[[row - 1, col + 1]];
                    n += 1;
                }
            }
            if col > 0 && labels[[row, col - 1]] > 0 {
                neighbors[n] = labels[[row, col - 1]];
                n += 1;
            }

            if n == 0 {
                if next_label as usize >= parent.len() {
                    parent.resize(parent.len() * 2, 0);
                }
                parent[next_label as usize] = next_label;
                labels[[row, col]] = next_label;
                next_label += 1;
            } else {
                let smallest = neighbors[..n].iter().copied().min().unwrap();
                labels[[row, col]] = smallest;
                for &other in &neighbors[..n] {
                    if other != smallest {
                        union(&mut parent, smallest, other);
                    }
                }
            }
        }
    }

    // Flatten parent references.
    for i in 1..next_label as usize {
        parent[i] = find(&parent, i as u32);
    }

    let mut components = HashMap::<u32, Component>::new();
    for row in 0..h {
        for col in 0..w {
            let lbl = labels[[row, col]];
            if lbl == 0 {
                continue;
            }
            let root = parent[lbl as usize];
            let entry = components.entry(root).or_insert(Component {
                label: root,
                area: 0,
                bbox: (row, row, col, col),
                pixels: Vec::new(),
            });
            entry.area += 1;
            entry.bbox.0 = entry.bbox.0.min(row);
            entry.bbox.1 = entry.bbox.1.max(row);
            entry.bbox.2 = entry.bbox.2.min(col);
            entry.bbox.3 = entry.bbox.3.max(col);
            entry.pixels.push((row, col));
        }
    }

    let mut components: Vec<Component> = components.into_values().collect();
    components.sort_unstable_by(|a, b| b.area.cmp(&a.area));
    components
}

fn find(parent: &[u32], mut x: u32) -> u32 {
    while parent[x as usize] != x {
        x = parent[x as usize];
    }
    x
}

fn union(parent: &mut [u32], a: u32, b: u32) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (small, big) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[big as usize] = small;
    }
}
