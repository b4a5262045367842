//! Footer annotation of exam images.
//!
//! The description text is drawn inside an opaque white band anchored to the
//! bottom of the image, one line per `\n`, left aligned at the margin.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::utils::{decode_image, encode_jpeg, JPEG_QUALITY};

pub const DEFAULT_FONT_SIZE: f32 = 18.0;
pub const DEFAULT_MARGIN: u32 = 10;

const BAND_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Fonts tried in order when no explicit font file is configured
const SYSTEM_FONTS: [&str; 6] = [
    "DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Last-resort font compiled into the addon (DejaVu Sans)
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AnnotateError {
    /// Could not decode exam image
    Decode { source: image::ImageError },

    /// Could not encode annotated image
    Encode { source: image::ImageError },
}

fn load_font(path: &Path) -> Option<FontArc> {
    let data = std::fs::read(path).ok()?;
    FontArc::try_from_vec(data).ok()
}

fn bundled_font() -> Option<FontArc> {
    FontArc::try_from_slice(BUNDLED_FONT).ok()
}

pub struct Annotator {
    font: Option<FontArc>,
    font_size: f32,
    margin: u32,
}

impl Annotator {
    /// Use `font_path` when it loads, otherwise the first available system font,
    /// otherwise the bundled DejaVu Sans.
    pub fn new(font_path: Option<&Path>) -> Self {
        let configured = font_path.and_then(|path| {
            let font = load_font(path);
            if font.is_none() {
                warn!("Could not load font {}, falling back to system fonts", path.display());
            }
            font
        });

        let font = configured
            .or_else(|| {
                SYSTEM_FONTS.iter().find_map(|path| {
                    let font = load_font(Path::new(path));
                    if font.is_some() {
                        info!("Loaded annotation font: {}", path);
                    }
                    font
                })
            })
            .or_else(|| {
                debug!("No system font found, using the bundled font");
                bundled_font()
            });

        Self::with_font(font)
    }

    /// Annotator using the bundled font regardless of what the system provides
    pub fn bundled() -> Self {
        Self::with_font(bundled_font())
    }

    fn with_font(font: Option<FontArc>) -> Self {
        if font.is_none() {
            warn!("Bundled font failed to parse, annotations will contain an empty band only");
        }
        Self {
            font,
            font_size: DEFAULT_FONT_SIZE,
            margin: DEFAULT_MARGIN,
        }
    }

    pub fn margin(&self) -> u32 {
        self.margin
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Rendered ink height of one line
    pub fn line_height(&self, line: &str) -> u32 {
        if line.is_empty() {
            return 0;
        }
        match &self.font {
            Some(font) => {
                let (_, height) = text_size(PxScale::from(self.font_size), font, line);
                height as u32
            }
            None => self.font_size.ceil() as u32,
        }
    }

    pub fn text_height(&self, text: &str) -> u32 {
        text.split('\n').map(|line| self.line_height(line)).sum()
    }

    pub fn band_height(&self, text: &str) -> u32 {
        self.text_height(text) + 2 * self.margin
    }

    /// Burn `text` into a footer band of `image`
    pub fn annotate(&self, image: DynamicImage, text: &str) -> RgbImage {
        let mut canvas = image.into_rgb8();
        let (width, height) = canvas.dimensions();
        let band = self.band_height(text);
        let visible = band.min(height);

        if width > 0 && visible > 0 {
            let rect = Rect::at(0, (height - visible) as i32).of_size(width, visible);
            draw_filled_rect_mut(&mut canvas, rect, BAND_COLOR);
        }

        if let Some(font) = &self.font {
            let scale = PxScale::from(self.font_size);
            let mut y = height as i64 - band as i64 + self.margin as i64;
            for line in text.split('\n') {
                if !line.is_empty() {
                    draw_text_mut(&mut canvas, TEXT_COLOR, self.margin as i32, y as i32, scale, font, line);
                }
                y += self.line_height(line) as i64;
            }
        }

        debug!("Annotated {}x{} image with a {} px band", width, height, band);
        canvas
    }

    /// Decode, annotate and re-encode as JPEG
    pub fn annotate_to_jpeg(&self, image_bytes: &[u8], text: &str) -> Result<Vec<u8>, AnnotateError> {
        let image = decode_image(image_bytes).context(DecodeSnafu)?;
        let annotated = self.annotate(image, text);
        encode_jpeg(&annotated, JPEG_QUALITY).context(EncodeSnafu)
    }
}
