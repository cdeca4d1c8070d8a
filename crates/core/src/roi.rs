//! Region-of-interest proposals for color-grid codes.
//!
//! The heuristic only narrows the search space: it looks for sufficiently
//! large, near-square blobs of high local contrast. Whether a crop really
//! holds a code is left to the external decoder.

use image::{imageops, GrayImage, ImageBuffer, Luma};
use imageproc::contours::{find_contours, BorderType};

use crate::types::{Bounds, Candidate, Frame};

/// Tunables of the ROI detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiParams {
    /// Local window size of the adaptive threshold (odd, >= 3)
    pub block_size: u32,
    /// Minimum intensity deviation from the local mean to count as foreground
    pub c: f32,
    /// Minimum bounding-rectangle area in px^2
    pub min_area: u64,
    pub min_aspect: f64,
    pub max_aspect: f64,
}

impl Default for RoiParams {
    fn default() -> Self {
        Self {
            block_size: 11,
            c: 2.0,
            min_area: 10_000,
            min_aspect: 0.8,
            max_aspect: 1.2,
        }
    }
}

impl RoiParams {
    /// Gaussian sigma matching a `block_size` kernel.
    fn sigma(&self) -> f32 {
        let k = self.block_size.max(3) | 1;
        0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoiDetector {
    pub params: RoiParams,
}

impl RoiDetector {
    pub fn new(params: RoiParams) -> Self {
        Self { params }
    }

    /// Candidates sorted by descending area. Empty is the common case.
    pub fn detect(&self, frame: &Frame) -> Vec<Candidate> {
        if frame.width() == 0 || frame.height() == 0 {
            return Vec::new();
        }
        let gray = imageops::grayscale(&frame.image);
        let mask = contrast_mask(&gray, self.params.sigma(), self.params.c);

        let contours = find_contours::<u32>(&mask);
        let boxes: Vec<Option<Bounds>> = contours
            .iter()
            .map(|c| {
                let b = bounding_box(c.points.iter().map(|p| (p.x, p.y)))?;
                (c.border_type == BorderType::Outer).then_some(b)
            })
            .collect();

        // An outer contour is proposed unless an enclosing outer contour was
        // already accepted. Content of a non-square window stays reachable.
        let mut candidates: Vec<Candidate> = (0..contours.len())
            .filter_map(|i| {
                let b = boxes[i].filter(|b| self.accepts(b))?;
                let mut up = contours[i].parent;
                while let Some(p) = up {
                    if boxes[p].is_some_and(|pb| self.accepts(&pb)) {
                        return None;
                    }
                    up = contours[p].parent;
                }
                Some(b)
            })
            .map(|b| Candidate {
                image: imageops::crop_imm(&frame.image, b.x, b.y, b.w, b.h).to_image(),
                bounds: b,
                area: b.area(),
            })
            .collect();

        candidates.sort_by(|a, b| b.area.cmp(&a.area));
        candidates
    }

    /// Largest candidate, if any.
    pub fn detect_best(&self, frame: &Frame) -> Option<Candidate> {
        self.detect(frame).into_iter().next()
    }

    fn accepts(&self, b: &Bounds) -> bool {
        let aspect = b.aspect();
        b.area() >= self.params.min_area
            && aspect >= self.params.min_aspect
            && aspect <= self.params.max_aspect
    }
}

/// Binary mask of pixels deviating from their Gaussian-weighted local mean
/// by more than `c`. Uniform areas are background whatever their brightness.
fn contrast_mask(gray: &GrayImage, sigma: f32, c: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let f = ImageBuffer::<Luma<f32>, Vec<f32>>::from_fn(w, h, |x, y| {
        Luma([gray.get_pixel(x, y)[0] as f32 / 255.0])
    });
    let mean = imageproc::filter::gaussian_blur_f32(&f, sigma);
    let c = c / 255.0;
    GrayImage::from_fn(w, h, |x, y| {
        let d = (f.get_pixel(x, y)[0] - mean.get_pixel(x, y)[0]).abs();
        Luma([if d > c { 255 } else { 0 }])
    })
}

fn bounding_box(points: impl Iterator<Item = (u32, u32)>) -> Option<Bounds> {
    let mut acc: Option<(u32, u32, u32, u32)> = None;
    for (x, y) in points {
        acc = Some(match acc {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    acc.map(|(x0, y0, x1, y1)| Bounds { x: x0, y: y0, w: x1 - x0 + 1, h: y1 - y0 + 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frame_with(w: u32, h: u32, rects: &[(u32, u32, u32, u32)]) -> Frame {
        let mut img = RgbImage::from_pixel(w, h, Rgb([0, 0, 0]));
        for &(rx, ry, rw, rh) in rects {
            for y in ry..ry + rh {
                for x in rx..rx + rw {
                    img.put_pixel(x, y, Rgb([255, 255, 255]));
                }
            }
        }
        Frame::new(img)
    }

    fn near(a: u32, b: u32, tol: u32) -> bool {
        a.abs_diff(b) <= tol
    }

    #[test]
    fn uniform_frame_has_no_candidates() {
        let frame = Frame::new(RgbImage::from_pixel(320, 240, Rgb([128, 128, 128])));
        assert!(RoiDetector::default().detect(&frame).is_empty());
    }

    #[test]
    fn single_square_is_found() {
        let frame = frame_with(640, 480, &[(100, 100, 300, 300)]);
        let found = RoiDetector::default().detect(&frame);
        assert_eq!(found.len(), 1);
        let b = found[0].bounds;
        assert!(near(b.x, 100, 8) && near(b.y, 100, 8), "origin {:?}", b);
        assert!(near(b.w, 300, 16) && near(b.h, 300, 16), "size {:?}", b);
        assert_eq!(found[0].area, b.area());
        assert_eq!(found[0].image.dimensions(), (b.w, b.h));
    }

    #[test]
    fn small_regions_are_noise() {
        let frame = frame_with(320, 240, &[(50, 50, 60, 60)]);
        assert!(RoiDetector::default().detect(&frame).is_empty());
    }

    #[test]
    fn elongated_regions_are_rejected_regardless_of_area() {
        let frame = frame_with(800, 600, &[(50, 100, 600, 250)]);
        assert!(RoiDetector::default().detect(&frame).is_empty());

        let tall = frame_with(600, 800, &[(100, 50, 150, 600)]);
        assert!(RoiDetector::default().detect(&tall).is_empty());
    }

    #[test]
    fn candidates_are_sorted_by_area() {
        let frame = frame_with(800, 600, &[(400, 50, 150, 150), (40, 40, 300, 300), (420, 300, 220, 220)]);
        let found = RoiDetector::default().detect(&frame);
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|p| p[0].area >= p[1].area));
        assert!(near(found[0].bounds.x, 40, 8));
    }

    #[test]
    fn crop_comes_from_the_color_frame() {
        let mut img = RgbImage::from_pixel(400, 400, Rgb([20, 20, 20]));
        for y in 100..260 {
            for x in 100..260 {
                img.put_pixel(x, y, Rgb([200, 30, 40]));
            }
        }
        let found = RoiDetector::default().detect(&Frame::new(img));
        assert_eq!(found.len(), 1);
        let b = found[0].bounds;
        let center = found[0].image.get_pixel(180 - b.x, 180 - b.y);
        assert_eq!(center.0, [200, 30, 40]);
    }

    #[test]
    fn code_inside_a_wide_window_is_found() {
        let mut img = RgbImage::from_pixel(800, 600, Rgb([30, 30, 30]));
        for y in 120..470 {
            for x in 100..700 {
                img.put_pixel(x, y, Rgb([225, 225, 225]));
            }
        }
        // 200x200 checkerboard of 8px colored cells in the middle of the panel
        for y in 195..395 {
            for x in 300..500 {
                let on = ((x - 300) / 8 + (y - 195) / 8) % 2 == 0;
                let px = if on { Rgb([230, 200, 40]) } else { Rgb([20, 40, 120]) };
                img.put_pixel(x, y, px);
            }
        }
        let found = RoiDetector::default().detect(&Frame::new(img));
        assert_eq!(found.len(), 1, "{:?}", found.iter().map(|c| c.bounds).collect::<Vec<_>>());
        let b = found[0].bounds;
        assert!(near(b.x, 300, 8) && near(b.y, 195, 8), "origin {:?}", b);
        assert!(near(b.w, 200, 16) && near(b.h, 200, 16), "size {:?}", b);
    }

    #[test]
    fn detail_inside_an_accepted_region_is_not_proposed_twice() {
        // a dark square hole inside a large bright square
        let mut img = RgbImage::from_pixel(600, 600, Rgb([0, 0, 0]));
        for y in 100..500 {
            for x in 100..500 {
                let inner = (200..400).contains(&x) && (200..400).contains(&y);
                let v = if inner { 0 } else { 255 };
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        let found = RoiDetector::default().detect(&Frame::new(img));
        assert_eq!(found.len(), 1);
        assert!(near(found[0].bounds.w, 400, 16));
    }

    #[test]
    fn sigma_follows_block_size() {
        assert!((RoiParams::default().sigma() - 2.0).abs() < 1e-6);
    }
}
