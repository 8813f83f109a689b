//! Region-mode matching for an already cropped UI element
//!
//! The caller has isolated a fixed-size area of the screen and only needs a
//! yes/no decision that survives lighting and theme changes, so both sides are
//! equalized, denoised and binarized before comparing them at the template's
//! own size.

use super::config::MatchConfig;
use super::correlation::{std_dev, zncc_same_size};
use super::types::MatchResult;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::gaussian_blur_f32;
use imageproc::template_matching::{MatchTemplateMethod, match_template};

/// Sigma of a 3x3 Gaussian kernel.
const DENOISE_SIGMA: f32 = 0.8;
/// Sigma of a 5x5 Gaussian neighbourhood used as the local threshold.
const ADAPTIVE_SIGMA: f32 = 1.1;
/// A pixel is foreground when it exceeds its local mean minus this offset.
const ADAPTIVE_OFFSET: i16 = 4;

/// Gaussian-weighted adaptive threshold: 255 where the pixel is brighter
/// than its weighted neighbourhood mean minus `offset`, else 0.
pub fn adaptive_binarize(image: &GrayImage, sigma: f32, offset: i16) -> GrayImage {
    let local_mean = gaussian_blur_f32(image, sigma);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y)[0] as i16;
        let t = local_mean.get_pixel(x, y)[0] as i16 - offset;
        Luma([if v > t { 255 } else { 0 }])
    })
}

/// Equalize, blur, then binarize.
pub fn preprocess(image: &GrayImage) -> GrayImage {
    let equalized = equalize_histogram(image);
    let denoised = gaussian_blur_f32(&equalized, DENOISE_SIGMA);
    adaptive_binarize(&denoised, ADAPTIVE_SIGMA, ADAPTIVE_OFFSET)
}

/// Compare a cropped region against a template.
///
/// Near-uniform regions (blank loading screens) are rejected before any
/// correlation is computed, whatever the threshold. Otherwise the score is the
/// best of normalized correlation, zero-mean normalized correlation and
/// `1 - normalized squared difference`.
pub fn match_region(
    region: &DynamicImage,
    template: &DynamicImage,
    threshold: f32,
    config: &MatchConfig,
) -> MatchResult {
    let region_std = std_dev(region.to_rgb8().as_raw());
    log::debug!("Region std dev: {:.2}", region_std);
    if region_std < config.region_std_threshold {
        log::debug!("Region is near-uniform, skipping correlation");
        return MatchResult::no_match();
    }

    let template_bin = preprocess(&template.to_luma8());
    let region_bin = preprocess(&region.to_luma8());
    let (tw, th) = template_bin.dimensions();
    if tw == 0 || th == 0 {
        return MatchResult::no_match();
    }
    let region_resized = image::imageops::resize(&region_bin, tw, th, FilterType::CatmullRom);

    let single = |method| match_template(&region_resized, &template_bin, method).get_pixel(0, 0)[0];
    let ccorr = single(MatchTemplateMethod::CrossCorrelationNormalized);
    let sqdiff = 1.0 - single(MatchTemplateMethod::SumOfSquaredErrorsNormalized);
    let zncc = zncc_same_size(&region_resized, &template_bin);

    let best = [ccorr, sqdiff, zncc]
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(0.0f32, f32::max);
    log::debug!(
        "Region scores: ccorr={:.3} sqdiff={:.3} zncc={:.3} -> {:.3}",
        ccorr,
        sqdiff,
        zncc,
        best
    );
    MatchResult::scored(best, threshold)
}
