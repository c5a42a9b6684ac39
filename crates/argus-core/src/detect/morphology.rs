//! Binary morphology with a 3x3 elliptical (plus-shaped) structuring
//! element: the center pixel and its four edge neighbors.

use ndarray::Array2;

/// Opening (erosion then dilation): removes isolated salt pixels.
pub fn open(mask: &Array2<bool>) -> Array2<bool> {
    dilate(&erode(mask))
}

/// Closing (dilation then erosion): fills pepper holes inside blobs.
pub fn close(mask: &Array2<bool>) -> Array2<bool> {
    erode(&dilate(mask))
}

fn erode(mask: &Array2<bool>) -> Array2<bool> {
    let (h, w) = mask.dim();
    let mut result = Array2::from_elem((h, w), false);
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            let mut all_true = true;
            for (dr, dc) in PLUS_OFFSETS {
                let r = row as i64 + dr;
                let c = col as i64 + dc;
                if r < 0 || r >= h as i64 || c < 0 || c >= w as i64 {
                    all_true = false;
                    break;
                }
                if !mask[[r as usize, c as usize]] {
                    all_true = false;
                    break;
                }
            }
            result[[row, col]] = all_true;
        }
    }
    result
}

fn dilate(mask: &Array2<bool>) -> Array2<bool> {
    let (h, w) = mask.dim();
    let mut result = Array2::from_elem((h, w), false);
    for row in 0..h {
        for col in 0..w {
            if !mask[[row, col]] {
                continue;
            }
            for (dr, dc) in PLUS_OFFSETS {
                let r = row as i64 + dr;
                let c = col as i64 + dc;
                if r >= 0 && r < h as i64 && c >= 0 && c < w as i64 {
                    result[[r as usize, c as usize]] = true;
                }
            }
        }
    }
    result
}

const PLUS_OFFSETS: [(i64, i64); 5] = [(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)];
