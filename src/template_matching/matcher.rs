/// Template matching implementation
///
/// Full-screen search over a fixed set of template scales with early exit
/// once a near-certain correlation is found. Each scale is searched on a
/// reduced copy of the frame; only the best hit is refined at full
/// resolution.
use super::config::MatchConfig;
use super::correlation::best_zncc_until_stopped;
use super::region::match_region;
use super::types::{BoundingBox, MatchResult, Template};
use crate::adb::Frame;
use crate::error::{AutomationError, AutomationResult};
use crate::game_automation::CancelToken;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};

/// Best location found at one scale, in coarse-level coordinates.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    score: f32,
    x: u32,
    y: u32,
    scale: f32,
    /// Coarse level size relative to the frame, per axis
    fx: f32,
    fy: f32,
}

/// Reduced copies of one frame, keyed by width.
struct Levels<'f> {
    frame: &'f GrayImage,
    reduced: Vec<GrayImage>,
}

impl<'f> Levels<'f> {
    fn new(frame: &'f GrayImage) -> Self {
        Self {
            frame,
            reduced: Vec::new(),
        }
    }

    /// The frame scaled by about `factor` (never enlarged).
    fn at(&mut self, factor: f32) -> &GrayImage {
        let (fw, fh) = self.frame.dimensions();
        let width = scaled_len(fw, factor).max(1);
        if width >= fw {
            return self.frame;
        }
        let idx = match self.reduced.iter().position(|l| l.width() == width) {
            Some(idx) => idx,
            None => {
                let height = scaled_len(fh, width as f32 / fw as f32).max(1);
                self.reduced
                    .push(image::imageops::resize(self.frame, width, height, FilterType::Triangle));
                self.reduced.len() - 1
            }
        };
        &self.reduced[idx]
    }
}

/// Template matcher for locating templates in screen captures
#[derive(Debug, Clone, Default)]
pub struct TemplateMatcher {
    config: MatchConfig,
}

impl TemplateMatcher {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Decode `frame`, load `template` from disk and search the whole frame.
    ///
    /// A template that cannot be read is a [`AutomationError::TemplateLoad`];
    /// an undecodable frame is a [`AutomationError::FrameDecode`]. `token` is
    /// checked between decoding and every slice of the search.
    pub fn match_frame(
        &self,
        frame: &Frame,
        template: &Template,
        threshold: f32,
        token: &CancelToken,
    ) -> AutomationResult<MatchResult> {
        let template_gray = template.load_luma()?;
        token.check_running()?;
        let frame_gray = frame
            .decode()
            .map_err(|source| AutomationError::FrameDecode { source })?
            .to_luma8();
        let result = self.match_gray(&frame_gray, &template_gray, threshold, token)?;
        log::debug!("🔍 '{}': {}", template.name, result);
        Ok(result)
    }

    /// Region mode: crop `frame` to `region` and compare the crop against the
    /// template at the template's own size.
    pub fn match_in_region(
        &self,
        frame: &Frame,
        template: &Template,
        region: BoundingBox,
        threshold: f32,
    ) -> AutomationResult<MatchResult> {
        let template_image = template.load()?;
        let frame_image = frame
            .decode()
            .map_err(|source| AutomationError::FrameDecode { source })?;
        let Some(region) = region.clipped(frame_image.width(), frame_image.height()) else {
            log::warn!(
                "Region [{},{},{},{}] lies outside the {}x{} frame",
                region.x1,
                region.y1,
                region.x2,
                region.y2,
                frame_image.width(),
                frame_image.height()
            );
            return Ok(MatchResult::no_match());
        };
        let crop = frame_image.crop_imm(region.x1, region.y1, region.width(), region.height());
        let result = match_region(&crop, &template_image, threshold, &self.config);
        log::debug!("🔍 '{}' in region: {}", template.name, result);
        Ok(result)
    }

    /// Region mode on an already cropped image.
    pub fn match_region_image(
        &self,
        region: &DynamicImage,
        template: &Template,
        threshold: f32,
    ) -> AutomationResult<MatchResult> {
        let template_image = template.load()?;
        Ok(match_region(region, &template_image, threshold, &self.config))
    }

    /// Multi-scale search of `template` over `frame`.
    ///
    /// The bounding box and confidence come from the full-resolution refine
    /// step, in `frame` coordinates. Returns `Err(Stopped)` as soon as
    /// `token` is stopped.
    pub fn match_gray(
        &self,
        frame: &GrayImage,
        template: &GrayImage,
        threshold: f32,
        token: &CancelToken,
    ) -> AutomationResult<MatchResult> {
        let mut levels = Levels::new(frame);

        let mut best: Option<Candidate> = None;
        for &scale in &self.config.scale_factors {
            token.check_running()?;
            let Some(candidate) = self.match_at_scale(&mut levels, template, scale, token)? else {
                continue;
            };
            log::trace!(
                "scale {:.2}: {:.3} at ({},{}) on a {:.2}x level",
                scale,
                candidate.score,
                candidate.x,
                candidate.y,
                candidate.fx
            );
            if best.is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
            if candidate.score >= self.config.early_exit {
                break;
            }
        }

        let Some(best) = best else {
            log::debug!(
                "No usable scale for a {}x{} template in a {}x{} frame",
                template.width(),
                template.height(),
                frame.width(),
                frame.height()
            );
            return Ok(MatchResult::no_match());
        };

        let (score, bounding_box) = self.refine(frame, template, best, token)?;
        Ok(MatchResult {
            is_match: score >= threshold,
            confidence: score,
            bounding_box: Some(bounding_box),
            scale: Some(best.scale),
        })
    }

    /// Level factor for one scale: `max_search_width` relative to the frame,
    /// raised where needed so the reduced template keeps `min_template_side`.
    fn level_factor(&self, frame: &GrayImage, template_min_side: u32) -> f32 {
        let base = match self.config.max_search_width {
            Some(max_width) if max_width > 0 => max_width as f32 / frame.width() as f32,
            _ => 1.0,
        };
        let keep_detail = self.config.min_template_side as f32 / template_min_side.max(1) as f32;
        base.max(keep_detail).min(1.0)
    }

    /// Coarse search at one template scale.
    fn match_at_scale(
        &self,
        levels: &mut Levels<'_>,
        template: &GrayImage,
        scale: f32,
        token: &CancelToken,
    ) -> AutomationResult<Option<Candidate>> {
        let frame = levels.frame;
        let width = scaled_len(template.width(), scale);
        let height = scaled_len(template.height(), scale);

        if width.min(height) < self.config.min_template_side {
            return Ok(None);
        }
        if width > frame.width() || height > frame.height() {
            log::trace!(
                "Skipping scale {:.2} - template too large: {}x{} > {}x{}",
                scale,
                width,
                height,
                frame.width(),
                frame.height()
            );
            return Ok(None);
        }

        let factor = self.level_factor(frame, width.min(height));
        let (fw, fh) = frame.dimensions();
        let search = levels.at(factor);
        let fx = search.width() as f32 / fw as f32;
        let fy = search.height() as f32 / fh as f32;
        let cw = scaled_len(width, fx).clamp(1, search.width());
        let ch = scaled_len(height, fy).clamp(1, search.height());

        let scaled = if (cw, ch) == template.dimensions() {
            template.clone()
        } else {
            image::imageops::resize(template, cw, ch, FilterType::Triangle)
        };

        Ok(best_zncc_until_stopped(search, &scaled, token)?.map(|(score, (x, y))| Candidate {
            score,
            x,
            y,
            scale,
            fx,
            fy,
        }))
    }

    /// Search a small full-resolution window around the coarse hit.
    fn refine(
        &self,
        frame: &GrayImage,
        template: &GrayImage,
        hit: Candidate,
        token: &CancelToken,
    ) -> AutomationResult<(f32, BoundingBox)> {
        let (fw, fh) = frame.dimensions();
        let tw = scaled_len(template.width(), hit.scale).min(fw);
        let th = scaled_len(template.height(), hit.scale).min(fh);
        let cx = (((hit.x as f32) / hit.fx).round() as u32).min(fw - tw);
        let cy = (((hit.y as f32) / hit.fy).round() as u32).min(fh - th);

        // One coarse pixel of slack each way, plus resampling error.
        let margin = (2.0 / hit.fx.min(hit.fy)).ceil() as u32 + 2;
        let x0 = cx.saturating_sub(margin);
        let y0 = cy.saturating_sub(margin);
        let x1 = (cx + margin).min(fw - tw);
        let y1 = (cy + margin).min(fh - th);

        let scaled = if (tw, th) == template.dimensions() {
            template.clone()
        } else {
            image::imageops::resize(template, tw, th, FilterType::Triangle)
        };
        let window = image::imageops::crop_imm(frame, x0, y0, x1 - x0 + tw, y1 - y0 + th).to_image();

        let (score, (rx, ry)) =
            best_zncc_until_stopped(&window, &scaled, token)?.unwrap_or((hit.score, (cx - x0, cy - y0)));
        Ok((score, BoundingBox::from_origin(x0 + rx, y0 + ry, tw, th)))
    }
}

fn scaled_len(len: u32, scale: f32) -> u32 {
    ((len as f32) * scale).round() as u32
}
