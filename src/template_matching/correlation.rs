/// Zero-mean normalized cross-correlation on top of imageproc's raw
/// cross-correlation.
///
/// imageproc only offers the non-centred normalized variant, which scores
/// bright flat areas highly against almost anything. Centring both sides
/// removes that bias: per position the score is
/// `(Σ I·T − ΣI·ΣT/n) / sqrt(varsum(I) · varsum(T))`, with the window sums
/// of `I` and `I²` read from summed-area tables.
use crate::error::AutomationResult;
use crate::game_automation::CancelToken;
use image::GrayImage;
use imageproc::template_matching::{MatchTemplateMethod, match_template};

/// Windows whose per-pixel variance is below this are treated as flat.
const MIN_PIXEL_VARIANCE: f64 = 1.0;

/// Result rows scored between two stop checks.
pub const BAND_ROWS: u32 = 24;

/// Summed-area tables of pixel values and squared pixel values.
struct SummedArea {
    stride: usize,
    sums: Vec<f64>,
    squares: Vec<f64>,
}

impl SummedArea {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0.0; stride * (h + 1)];
        let mut squares = vec![0.0; stride * (h + 1)];
        for y in 0..h {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..w {
                let v = image.get_pixel(x as u32, y as u32)[0] as f64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + (x + 1);
                sums[idx] = sums[idx - stride] + row_sum;
                squares[idx] = squares[idx - stride] + row_sq;
            }
        }
        Self {
            stride,
            sums,
            squares,
        }
    }

    /// (Σv, Σv²) over the `w`×`h` window with top-left corner (x, y).
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let s = self.stride;
        let (a, b, c, d) = (y * s + x, y * s + x + w, (y + h) * s + x, (y + h) * s + x + w);
        (
            self.sums[d] - self.sums[b] - self.sums[c] + self.sums[a],
            self.squares[d] - self.squares[b] - self.squares[c] + self.squares[a],
        )
    }
}

fn sums(image: &GrayImage) -> (f64, f64) {
    image.pixels().fold((0.0, 0.0), |(s, sq), p| {
        let v = p[0] as f64;
        (s + v, sq + v * v)
    })
}

/// Standard deviation over raw sample bytes.
pub fn std_dev(samples: &[u8]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let (sum, sq) = samples.iter().fold((0.0, 0.0), |(s, sq), &v| {
        let v = v as f64;
        (s + v, sq + v * v)
    });
    let mean = sum / n;
    (sq / n - mean * mean).max(0.0).sqrt()
}

/// Best zero-mean normalized correlation of `template` slid over `image`,
/// with the top-left position where it occurs. `None` when the template does
/// not fit. Flat windows (or a flat template) score 0.
pub fn best_zncc(image: &GrayImage, template: &GrayImage) -> Option<(f32, (u32, u32))> {
    best_zncc_until_stopped(image, template, &CancelToken::new())
        .ok()
        .flatten()
}

/// [`best_zncc`] scored in bands of [`BAND_ROWS`] result rows, checking
/// `token` before each band.
pub fn best_zncc_until_stopped(
    image: &GrayImage,
    template: &GrayImage,
    token: &CancelToken,
) -> AutomationResult<Option<(f32, (u32, u32))>> {
    let (tw, th) = template.dimensions();
    let (iw, ih) = image.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return Ok(None);
    }

    let n = (tw as f64) * (th as f64);
    let (t_sum, t_sq) = sums(template);
    let t_var = t_sq - t_sum * t_sum / n;
    if t_var < MIN_PIXEL_VARIANCE * n {
        return Ok(Some((0.0, (0, 0))));
    }

    let table = SummedArea::new(image);
    let rows = ih - th + 1;
    let mut best = (f64::MIN, (0u32, 0u32));
    let mut y0 = 0;
    while y0 < rows {
        token.check_running()?;
        let band_rows = BAND_ROWS.min(rows - y0);
        let band = image::imageops::crop_imm(image, 0, y0, iw, band_rows + th - 1).to_image();
        let raw = match_template(&band, template, MatchTemplateMethod::CrossCorrelation);
        for (x, dy, cc) in raw.enumerate_pixels() {
            let y = y0 + dy;
            let (i_sum, i_sq) = table.window(x as usize, y as usize, tw as usize, th as usize);
            let i_var = i_sq - i_sum * i_sum / n;
            let score = if i_var < MIN_PIXEL_VARIANCE * n {
                0.0
            } else {
                (cc[0] as f64 - i_sum * t_sum / n) / (i_var * t_var).sqrt()
            };
            if score > best.0 {
                best = (score, (x, y));
            }
        }
        y0 += band_rows;
    }
    Ok(Some((best.0.clamp(0.0, 1.0) as f32, best.1)))
}

/// Zero-mean normalized correlation of two equally sized images.
pub fn zncc_same_size(a: &GrayImage, b: &GrayImage) -> f32 {
    if a.dimensions() != b.dimensions() {
        return 0.0;
    }
    best_zncc(a, b).map(|(score, _)| score).unwrap_or(0.0)
}
