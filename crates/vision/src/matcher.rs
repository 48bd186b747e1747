//! Template matching and text extraction.
//!
//! [`NccMatcher`] scores candidate positions with the zero-mean normalised
//! cross-correlation coefficient (1.0 for a perfect match, 0 for
//! uncorrelated or flat windows). The template is tried at ten scales from
//! 1.0 down to 0.8 and the best score at or above the threshold wins.
//!
//! A brute-force scan over a full frame is too slow for large templates, so
//! the search runs coarse-to-fine: both images are box-averaged by a factor
//! derived from the template size, the best coarse peaks are located, and
//! each peak is refined at full resolution within one coarse cell.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::frame::Frame;
use crate::geometry::Rect;
use crate::template::Template;

const SCALE_STEPS: u32 = 10;
const MIN_SCALE: f32 = 0.8;

/// Coarse peaks refined at full resolution.
const COARSE_PEAKS: usize = 5;

/// Minimum score for a glyph hit during text extraction.
const GLYPH_THRESHOLD: f32 = 0.7;

const FLAT_EPSILON: f64 = 1e-6;

/// A template hit in full-frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub rect: Rect,
    pub score: f32,
}

pub trait TemplateMatcher: Send + Sync {
    /// Best match of `template` at or above `threshold`, searched inside
    /// `roi` when given.
    fn detect(&self, frame: &Frame, template: &Template, threshold: f32, roi: Option<Rect>) -> Option<Detection>;

    /// Locate `region` and read the digits inside it.
    fn extract_text(&self, frame: &Frame, region: &Template, threshold: f32, roi: Option<Rect>) -> Option<String>;
}

// ---------------------------------------------------------------------------
// NccMatcher
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct NccMatcher {
    glyphs: Vec<(char, Arc<GrayImage>)>,
}

impl NccMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Glyph templates used by [`TemplateMatcher::extract_text`].
    pub fn with_glyphs(mut self, glyphs: Vec<(char, Template)>) -> Self {
        self.glyphs = glyphs.into_iter().map(|(c, t)| (c, t.image)).collect();
        self
    }

    fn scale(step: u32) -> f32 {
        1.0 - (1.0 - MIN_SCALE) * step as f32 / (SCALE_STEPS - 1) as f32
    }
}

impl TemplateMatcher for NccMatcher {
    fn detect(&self, frame: &Frame, template: &Template, threshold: f32, roi: Option<Rect>) -> Option<Detection> {
        let search = match roi {
            Some(r) => r.clamp_to(frame.width(), frame.height())?,
            None => frame.bounds(),
        };
        let area = Plane::from_image(&frame.crop(search)?);
        let (tw, th) = template.image.dimensions();

        let mut best: Option<Detection> = None;
        for step in 0..SCALE_STEPS {
            let s = Self::scale(step);
            let w = ((tw as f32 * s).round() as u32).max(1);
            let h = ((th as f32 * s).round() as u32).max(1);
            if w as usize > area.width || h as usize > area.height {
                continue;
            }

            let scaled = if step == 0 {
                template.image.as_ref().clone()
            } else {
                imageops::resize(template.image.as_ref(), w, h, FilterType::Triangle)
            };
            let Some(peak) = best_match(&area, &Plane::from_image(&scaled)) else {
                continue;
            };
            if peak.score < threshold || best.is_some_and(|b| b.score >= peak.score) {
                continue;
            }
            best = Some(Detection {
                rect: Rect::new(peak.x as u32, peak.y as u32, w, h).translate(search.x, search.y),
                score: peak.score,
            });
        }

        if let Some(d) = best {
            tracing::trace!(template = %template.key, score = d.score, x = d.rect.x, y = d.rect.y, "Template matched");
        }
        best
    }

    fn extract_text(&self, frame: &Frame, region: &Template, threshold: f32, roi: Option<Rect>) -> Option<String> {
        if self.glyphs.is_empty() {
            tracing::warn!("Text extraction requested without glyph templates");
            return None;
        }
        let hit = self.detect(frame, region, threshold, roi)?;
        let area = Plane::from_image(&frame.crop(hit.rect)?);
        let integral = Integral::new(&area);

        let mut hits: Vec<(char, Peak, usize)> = Vec::new();
        for (c, glyph) in &self.glyphs {
            let kernel = Kernel::new(&Plane::from_image(glyph));
            if kernel.width > area.width || kernel.height > area.height {
                continue;
            }
            scan(&area, &integral, &kernel, |p| {
                if p.score >= GLYPH_THRESHOLD {
                    hits.push((*c, p, kernel.width));
                }
            });
        }

        // Greedy non-maximum suppression along x. Glyphs never overlap, and a
        // shifted copy of a glyph over a flat background still correlates
        // well, so any overlap with a stronger hit drops the weaker one.
        hits.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.1.x.cmp(&b.1.x)));
        let mut kept: Vec<(char, Peak, usize)> = Vec::new();
        for hit in hits {
            let (_, p, w) = hit;
            let clashes = kept.iter().any(|(_, q, qw)| p.x < q.x + qw && q.x < p.x + w);
            if !clashes {
                kept.push(hit);
            }
        }
        if kept.is_empty() {
            return None;
        }
        kept.sort_by_key(|(_, p, _)| p.x);
        Some(kept.into_iter().map(|(c, _, _)| c).collect())
    }
}

// ---------------------------------------------------------------------------
// Correlation internals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Peak {
    x: usize,
    y: usize,
    score: f32,
}

struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    fn from_image(img: &GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Box-average by `factor`, dropping partial cells.
    fn downsample(&self, factor: usize) -> Self {
        let width = self.width / factor;
        let height = self.height / factor;
        let norm = (factor * factor) as f32;
        let mut data = Vec::with_capacity(width * height);
        for cy in 0..height {
            for cx in 0..width {
                let mut sum = 0.0;
                for y in cy * factor..(cy + 1) * factor {
                    for x in cx * factor..(cx + 1) * factor {
                        sum += self.at(x, y);
                    }
                }
                data.push(sum / norm);
            }
        }
        Self { width, height, data }
    }
}

/// Summed-area tables of values and squared values.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(p: &Plane) -> Self {
        let stride = p.width + 1;
        let mut sum = vec![0.0; stride * (p.height + 1)];
        let mut sq = vec![0.0; stride * (p.height + 1)];
        for y in 0..p.height {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..p.width {
                let v = p.at(x, y) as f64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let rect = |t: &[f64]| t[(y + h) * s + x + w] - t[y * s + x + w] - t[(y + h) * s + x] + t[y * s + x];
        (rect(&self.sum), rect(&self.sq))
    }
}

/// Zero-mean template with its energy precomputed.
struct Kernel {
    width: usize,
    height: usize,
    centered: Vec<f32>,
    energy: f64,
}

impl Kernel {
    fn new(p: &Plane) -> Self {
        let n = p.data.len().max(1) as f32;
        let mean = p.data.iter().sum::<f32>() / n;
        let centered: Vec<f32> = p.data.iter().map(|v| v - mean).collect();
        let energy = centered.iter().map(|v| (*v as f64) * (*v as f64)).sum();
        Self {
            width: p.width,
            height: p.height,
            centered,
            energy,
        }
    }
}

fn score_at(area: &Plane, integral: &Integral, k: &Kernel, x: usize, y: usize) -> f32 {
    let n = (k.width * k.height) as f64;
    let (sum, sq) = integral.window(x, y, k.width, k.height);
    let variance = sq - sum * sum / n;
    if variance <= FLAT_EPSILON || k.energy <= FLAT_EPSILON {
        return 0.0;
    }

    let mut num = 0.0f64;
    for j in 0..k.height {
        let row = &area.data[(y + j) * area.width + x..(y + j) * area.width + x + k.width];
        let krow = &k.centered[j * k.width..(j + 1) * k.width];
        num += row.iter().zip(krow).map(|(a, b)| (a * b) as f64).sum::<f64>();
    }
    (num / (k.energy * variance).sqrt()).clamp(-1.0, 1.0) as f32
}

/// Visit every valid placement of `k` inside `area`.
fn scan(area: &Plane, integral: &Integral, k: &Kernel, mut visit: impl FnMut(Peak)) {
    for y in 0..=(area.height - k.height) {
        for x in 0..=(area.width - k.width) {
            visit(Peak {
                x,
                y,
                score: score_at(area, integral, k, x, y),
            });
        }
    }
}

fn best_of(current: Option<Peak>, p: Peak) -> Option<Peak> {
    match current {
        Some(c) if c.score >= p.score => Some(c),
        _ => Some(p),
    }
}

/// Best placement of `templ` inside `area`, coarse-to-fine.
fn best_match(area: &Plane, templ: &Plane) -> Option<Peak> {
    if templ.width > area.width || templ.height > area.height || templ.data.is_empty() {
        return None;
    }
    let integral = Integral::new(area);
    let kernel = Kernel::new(templ);

    let factor = (templ.width.min(templ.height) / 8).clamp(1, 8);
    if factor == 1 {
        let mut best = None;
        scan(area, &integral, &kernel, |p| best = best_of(best, p));
        return best;
    }

    let coarse_area = area.downsample(factor);
    let coarse_templ = templ.downsample(factor);
    let coarse_kernel = Kernel::new(&coarse_templ);
    let coarse_integral = Integral::new(&coarse_area);

    let mut peaks: Vec<Peak> = Vec::with_capacity(COARSE_PEAKS + 1);
    scan(&coarse_area, &coarse_integral, &coarse_kernel, |p| {
        if peaks.len() < COARSE_PEAKS || peaks.last().is_some_and(|l| p.score > l.score) {
            let at = peaks.partition_point(|q| q.score >= p.score);
            peaks.insert(at, p);
            peaks.truncate(COARSE_PEAKS);
        }
    });

    let max_x = area.width - templ.width;
    let max_y = area.height - templ.height;
    let mut best = None;
    for peak in peaks {
        let (cx, cy) = (peak.x * factor, peak.y * factor);
        for y in cy.saturating_sub(factor)..=(cy + factor).min(max_y) {
            for x in cx.saturating_sub(factor)..=(cx + factor).min(max_x) {
                best = best_of(
                    best,
                    Peak {
                        x,
                        y,
                        score: score_at(area, &integral, &kernel, x, y),
                    },
                );
            }
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use image::Luma;

    use super::*;
    use crate::template::TemplateKey;

    /// Flat background with a shaded panel and a dark bar at (120, 90).
    fn scene() -> GrayImage {
        GrayImage::from_fn(240, 180, |x, y| {
            if (120..160).contains(&x) && (90..120).contains(&y) {
                if (130..136).contains(&x) {
                    Luma([10])
                } else {
                    Luma([(100 + (x - 120) * 2 + (y - 90) * 2) as u8])
                }
            } else {
                Luma([30])
            }
        })
    }

    fn template_from(img: &GrayImage, rect: Rect, key: TemplateKey) -> Template {
        Template {
            key,
            image: Arc::new(imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image()),
        }
    }

    #[test]
    fn scales_run_from_full_size_down() {
        assert_eq!(NccMatcher::scale(0), 1.0);
        assert!((NccMatcher::scale(SCALE_STEPS - 1) - MIN_SCALE).abs() < 1e-6);
    }

    #[test]
    fn finds_exact_position() {
        let img = scene();
        let t = template_from(&img, Rect::new(112, 84, 56, 44), TemplateKey::PasswordScreen);
        let d = NccMatcher::new().detect(&Frame::new(img), &t, 0.8, None).unwrap();
        assert_eq!(d.rect, Rect::new(112, 84, 56, 44));
        assert!(d.score > 0.99);
    }

    #[test]
    fn roi_hits_are_reported_in_frame_coordinates() {
        let img = scene();
        let t = template_from(&img, Rect::new(112, 84, 56, 44), TemplateKey::PasswordScreen);
        let roi = Rect::new(100, 60, 100, 100);
        let d = NccMatcher::new().detect(&Frame::new(img), &t, 0.8, Some(roi)).unwrap();
        assert_eq!((d.rect.x, d.rect.y), (112, 84));
    }

    #[test]
    fn flat_frame_matches_nothing() {
        let t = template_from(&scene(), Rect::new(112, 84, 56, 44), TemplateKey::PasswordScreen);
        assert!(NccMatcher::new().detect(&Frame::blank(240, 180), &t, 0.5, None).is_none());
    }

    #[test]
    fn template_larger_than_roi_is_skipped() {
        let img = scene();
        let t = template_from(&img, Rect::new(112, 84, 56, 44), TemplateKey::PasswordScreen);
        let roi = Rect::new(0, 0, 20, 20);
        assert!(NccMatcher::new().detect(&Frame::new(img), &t, 0.1, Some(roi)).is_none());
    }

    fn glyph(vertical: bool) -> GrayImage {
        GrayImage::from_fn(6, 10, |x, y| {
            let bright = if vertical { x < 3 } else { y < 5 };
            Luma([if bright { 255 } else { 0 }])
        })
    }

    #[test]
    fn reads_glyphs_left_to_right() {
        let one = glyph(true);
        let seven = glyph(false);
        let mut img = GrayImage::from_pixel(120, 80, Luma([128]));
        // Region at (40, 30): "7" then "1".
        imageops::replace(&mut img, &seven, 44, 34);
        imageops::replace(&mut img, &one, 60, 34);
        let region = template_from(&img, Rect::new(40, 30, 32, 18), TemplateKey::OtpNumber);

        let matcher = NccMatcher::new().with_glyphs(vec![
            ('1', Template { key: TemplateKey::OtpDigit(1), image: Arc::new(one) }),
            ('7', Template { key: TemplateKey::OtpDigit(7), image: Arc::new(seven) }),
        ]);
        let text = matcher.extract_text(&Frame::new(img), &region, 0.6, None);
        assert_eq!(text.as_deref(), Some("71"));
    }

    #[test]
    fn shifted_glyph_copies_are_not_read_twice() {
        let seven = glyph(false);
        let mut img = GrayImage::from_pixel(120, 80, Luma([128]));
        imageops::replace(&mut img, &seven, 50, 34);
        let region = template_from(&img, Rect::new(40, 30, 26, 18), TemplateKey::OtpNumber);

        let matcher = NccMatcher::new().with_glyphs(vec![(
            '7',
            Template { key: TemplateKey::OtpDigit(7), image: Arc::new(seven) },
        )]);
        let text = matcher.extract_text(&Frame::new(img), &region, 0.6, None);
        assert_eq!(text.as_deref(), Some("7"));
    }

    #[test]
    fn extraction_without_glyphs_reads_nothing() {
        let img = scene();
        let region = template_from(&img, Rect::new(112, 84, 56, 44), TemplateKey::OtpNumber);
        assert!(NccMatcher::new().extract_text(&Frame::new(img), &region, 0.6, None).is_none());
    }
}
