//! Template matching.
//! A matcher answers "where is this template in that region, if anywhere at the
//! required confidence". Not finding it is `Ok(None)`; a template that cannot be
//! compared because it is larger than the region is `VisionError::TemplateSize`.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{MatchTemplateMethod, match_template};

use crate::error::{Result, VisionError};

/// Best location of a template inside a region.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match {
    pub x: u32,
    pub y: u32,
    pub confidence: f32,
}

pub trait TemplateMatcher: Sync {
    fn find(&self, region: &GrayImage, template: &GrayImage, confidence: f32) -> Result<Option<Match>>;
}

/// Zero-mean normalized cross-correlation over grayscale pixels.
///
/// Both the template and each window are centered on their own mean before
/// correlating, so brightness alone never produces a match. Scores lie in
/// `[-1, 1]`. A flat template or a flat window has no structure to compare and
/// never matches.
#[derive(Clone, Copy, Debug, Default)]
pub struct NccMatcher;

impl TemplateMatcher for NccMatcher {
    fn find(&self, region: &GrayImage, template: &GrayImage, confidence: f32) -> Result<Option<Match>> {
        let (rw, rh) = region.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > rw || th > rh {
            return Err(VisionError::TemplateSize {
                template_w: tw,
                template_h: th,
                region_w: rw,
                region_h: rh,
            });
        }

        let n = f64::from(tw) * f64::from(th);
        let template_sum: f64 = template.pixels().map(|p| f64::from(p.0[0])).sum();
        let template_mean = template_sum / n;
        let template_var: f64 = template
            .pixels()
            .map(|p| (f64::from(p.0[0]) - template_mean).powi(2))
            .sum();
        if template_var <= f64::EPSILON {
            return Ok(None);
        }

        // sum(W * (T - mean_T)) = sum(W * T) - mean_T * sum(W)
        let products = match_template(region, template, MatchTemplateMethod::CrossCorrelation);
        let sums: Image<Luma<u64>> = integral_image(region);
        let squares: Image<Luma<u64>> = integral_squared_image(region);
        let pixels = u128::from(tw) * u128::from(th);

        let mut best: Option<Match> = None;
        for (x, y, product) in products.enumerate_pixels() {
            let sum = window_sum(&sums, x, y, tw, th);
            let sum_sq = window_sum(&squares, x, y, tw, th);
            // n * sum(W^2) - sum(W)^2, exact in integers.
            let spread = pixels * u128::from(sum_sq) - u128::from(sum) * u128::from(sum);
            if spread == 0 {
                continue;
            }
            let window_var = spread as f64 / n;
            let numerator = f64::from(product.0[0]) - template_mean * sum as f64;
            let score = (numerator / (template_var * window_var).sqrt()) as f32;
            if score.is_finite() && best.is_none_or(|b| score > b.confidence) {
                best = Some(Match {
                    x,
                    y,
                    confidence: score,
                });
            }
        }

        Ok(best.filter(|m| m.confidence >= confidence))
    }
}

/// Sum over the `w`x`h` window at `(x, y)` from a zero-padded integral image.
fn window_sum(integral: &Image<Luma<u64>>, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let at = |x, y| integral.get_pixel(x, y).0[0];
    at(x + w, y + h) + at(x, y) - at(x + w, y) - at(x, y + h)
}
