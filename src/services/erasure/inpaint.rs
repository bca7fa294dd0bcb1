//! Fast-marching inpainting (Telea 2004).
//!
//! Masked pixels are filled in order of their distance from the mask
//! boundary. Each filled pixel is a weighted average of already-known pixels
//! within `radius`, weighted by direction, distance and level-set proximity.

use image::{GrayImage, RgbaImage};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;

const INF: f32 = 1.0e6;

/// Heap node ordered so that `BinaryHeap` pops the smallest arrival time
#[derive(Debug, Clone, Copy)]
struct Node {
    t: f32,
    idx: usize,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

struct Field {
    width: usize,
    height: usize,
    flags: Vec<u8>,
    times: Vec<f32>,
}

impl Field {
    fn flag(&self, x: isize, y: isize) -> Option<u8> {
        self.index(x, y).map(|i| self.flags[i])
    }

    fn time(&self, x: isize, y: isize) -> f32 {
        self.index(x, y).map(|i| self.times[i]).unwrap_or(INF)
    }

    fn index(&self, x: isize, y: isize) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            None
        } else {
            Some(y as usize * self.width + x as usize)
        }
    }

    /// Eikonal update from two orthogonal neighbours
    fn solve(&self, x1: isize, y1: isize, x2: isize, y2: isize) -> f32 {
        let known1 = self.flag(x1, y1) == Some(KNOWN);
        let known2 = self.flag(x2, y2) == Some(KNOWN);
        let t1 = self.time(x1, y1);
        let t2 = self.time(x2, y2);

        match (known1, known2) {
            (true, true) => {
                let d = t1 - t2;
                let disc = 2.0 - d * d;
                if disc < 0.0 {
                    return 1.0 + t1.min(t2);
                }
                let r = disc.sqrt();
                let s = (t1 + t2 - r) / 2.0;
                if s >= t1 && s >= t2 {
                    s
                } else {
                    let s = s + r;
                    if s >= t1 && s >= t2 {
                        s
                    } else {
                        1.0 + t1.min(t2)
                    }
                }
            }
            (true, false) => 1.0 + t1,
            (false, true) => 1.0 + t2,
            (false, false) => INF,
        }
    }

    fn arrival_time(&self, x: isize, y: isize) -> f32 {
        self.solve(x - 1, y, x, y - 1)
            .min(self.solve(x + 1, y, x, y - 1))
            .min(self.solve(x - 1, y, x, y + 1))
            .min(self.solve(x + 1, y, x, y + 1))
    }

    /// Central difference of T where both sides are settled, one-sided otherwise
    fn gradient(&self, x: isize, y: isize) -> (f32, f32) {
        let t = self.time(x, y);
        let settled = |xx: isize, yy: isize| matches!(self.flag(xx, yy), Some(f) if f != INSIDE);

        let axis = |dx: isize, dy: isize| -> f32 {
            let fwd = settled(x + dx, y + dy);
            let back = settled(x - dx, y - dy);
            match (fwd, back) {
                (true, true) => (self.time(x + dx, y + dy) - self.time(x - dx, y - dy)) * 0.5,
                (true, false) => self.time(x + dx, y + dy) - t,
                (false, true) => t - self.time(x - dx, y - dy),
                (false, false) => 0.0,
            }
        };
        (axis(1, 0), axis(0, 1))
    }
}

/// Fill the RGB channels of pixels where `mask` is non-zero.
///
/// Alpha is left untouched. `mask` must match the image dimensions.
pub fn inpaint_telea(image: &RgbaImage, mask: &GrayImage, radius: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut out = image.clone();
    if w == 0 || h == 0 || mask.dimensions() != (w, h) {
        return out;
    }

    let width = w as usize;
    let height = h as usize;
    let mut field = Field {
        width,
        height,
        flags: mask
            .pixels()
            .map(|p| if p[0] > 0 { INSIDE } else { KNOWN })
            .collect(),
        times: vec![0.0; width * height],
    };
    for (i, f) in field.flags.iter().enumerate() {
        if *f == INSIDE {
            field.times[i] = INF;
        }
    }

    // Known pixels touching the hole form the initial front
    let mut heap = BinaryHeap::new();
    for y in 0..height as isize {
        for x in 0..width as isize {
            let Some(i) = field.index(x, y) else { continue };
            if field.flags[i] != KNOWN {
                continue;
            }
            let touches_hole = [(-1, 0), (1, 0), (0, -1), (0, 1)]
                .iter()
                .any(|(dx, dy)| field.flag(x + dx, y + dy) == Some(INSIDE));
            if touches_hole {
                field.flags[i] = BAND;
                heap.push(Node { t: 0.0, idx: i });
            }
        }
    }

    let r = radius.max(1) as isize;
    while let Some(Node { idx, .. }) = heap.pop() {
        if field.flags[idx] == KNOWN {
            continue;
        }
        field.flags[idx] = KNOWN;
        let x = (idx % width) as isize;
        let y = (idx / width) as isize;

        for (dx, dy) in [(-1isize, 0isize), (1, 0), (0, -1), (0, 1)] {
            let (nx, ny) = (x + dx, y + dy);
            let Some(ni) = field.index(nx, ny) else { continue };
            if field.flags[ni] != INSIDE {
                continue;
            }

            let t = field.arrival_time(nx, ny);
            field.times[ni] = t;
            fill_pixel(&field, &mut out, nx, ny, r);
            field.flags[ni] = BAND;
            heap.push(Node { t, idx: ni });
        }
    }

    out
}

fn fill_pixel(field: &Field, out: &mut RgbaImage, x: isize, y: isize, radius: isize) {
    let (grad_x, grad_y) = field.gradient(x, y);
    let t = field.time(x, y);

    let mut acc = [0.0f32; 3];
    let mut total = 0.0f32;

    for ny in (y - radius)..=(y + radius) {
        for nx in (x - radius)..=(x + radius) {
            let Some(ni) = field.index(nx, ny) else { continue };
            if field.flags[ni] == INSIDE || (nx == x && ny == y) {
                continue;
            }
            let rx = (x - nx) as f32;
            let ry = (y - ny) as f32;
            let dist2 = rx * rx + ry * ry;
            if dist2 > (radius * radius) as f32 {
                continue;
            }

            let dist = dist2.sqrt();
            let dir = ((rx * grad_x + ry * grad_y) / dist).abs().max(1.0e-6);
            let dst = 1.0 / dist2;
            let lev = 1.0 / (1.0 + (field.times[ni] - t).abs());
            let weight = dir * dst * lev;

            let p = out.get_pixel(nx as u32, ny as u32);
            for c in 0..3 {
                acc[c] += weight * p[c] as f32;
            }
            total += weight;
        }
    }

    if total > 0.0 {
        let px = out.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            px[c] = (acc[c] / total).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    fn mask_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_heap_pops_smallest_time() {
        let mut heap = BinaryHeap::new();
        heap.push(Node { t: 3.0, idx: 0 });
        heap.push(Node { t: 1.0, idx: 1 });
        heap.push(Node { t: 2.0, idx: 2 });
        assert_eq!(heap.pop().map(|n| n.idx), Some(1));
        assert_eq!(heap.pop().map(|n| n.idx), Some(2));
    }

    #[test]
    fn test_fills_hole_with_surrounding_color() {
        let mut image = RgbaImage::from_pixel(40, 40, Rgba([200, 180, 160, 255]));
        for y in 15..25 {
            for x in 10..30 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mask = mask_rect(40, 40, 8, 13, 32, 27);

        let out = inpaint_telea(&image, &mask, 5);
        for y in 15..25 {
            for x in 10..30 {
                let p = out.get_pixel(x, y);
                assert!((p[0] as i32 - 200).abs() <= 1, "pixel {:?} at {},{}", p, x, y);
                assert!((p[2] as i32 - 160).abs() <= 1);
            }
        }
    }

    #[test]
    fn test_unmasked_pixels_untouched() {
        let image = RgbaImage::from_fn(20, 20, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 0, 255]));
        let mask = mask_rect(20, 20, 5, 5, 10, 10);
        let out = inpaint_telea(&image, &mask, 3);
        assert_eq!(out.get_pixel(0, 0), image.get_pixel(0, 0));
        assert_eq!(out.get_pixel(15, 15), image.get_pixel(15, 15));
    }

    #[test]
    fn test_alpha_preserved() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([10, 10, 10, 77]));
        let mask = mask_rect(10, 10, 3, 3, 6, 6);
        let out = inpaint_telea(&image, &mask, 3);
        assert_eq!(out.get_pixel(4, 4)[3], 77);
    }

    #[test]
    fn test_mask_size_mismatch_is_noop() {
        let image = RgbaImage::from_pixel(10, 10, Rgba([1, 2, 3, 255]));
        let mask = GrayImage::from_pixel(5, 5, Luma([255]));
        assert_eq!(inpaint_telea(&image, &mask, 3), image);
    }
}
