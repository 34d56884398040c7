//! Shared domain models for the printqc workspace.
//!
//! This crate centralizes the lightweight data structures exchanged between
//! the comparator, spelling, element and CLI crates. Keep it free of image
//! codecs and numeric dependencies so every crate can depend on it cheaply.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type InputResult<T> = Result<T, InputError>;

/// Bytes per pixel of an [`RgbFrame`].
pub const RGB_CHANNELS: usize = 3;

/// Dense, immutable 8-bit RGB raster shared between pipeline stages.
#[derive(Clone)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl fmt::Debug for RgbFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RgbFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl RgbFrame {
    pub fn from_owned(width: u32, height: u32, data: Vec<u8>) -> InputResult<Self> {
        let required = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| InputError::InvalidFrame {
                reason: "calculated RGB buffer length overflowed".into(),
            })?;
        if data.len() != required {
            return Err(InputError::InvalidFrame {
                reason: format!(
                    "RGB buffer holds {} bytes, expected {} for {}x{}",
                    data.len(),
                    required,
                    width,
                    height
                ),
            });
        }
        Ok(Self {
            width,
            height,
            data: Arc::from(data.into_boxed_slice()),
        })
    }

    /// Frame filled with a single color.
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * RGB_CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            data: Arc::from(data.into_boxed_slice()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = (y as usize * self.width as usize + x as usize) * RGB_CHANNELS;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width as usize, self.height as usize)
    }

    /// Copies the part of `rect` that lies inside the frame. A rectangle
    /// outside the frame yields an empty frame.
    pub fn crop(&self, rect: PixelRect) -> RgbFrame {
        let rect = rect.clamp_to(self.width as usize, self.height as usize);
        let stride = self.width as usize * RGB_CHANNELS;
        let mut data = Vec::with_capacity(rect.area() * RGB_CHANNELS);
        for y in rect.y..rect.bottom() {
            let start = y * stride + rect.x * RGB_CHANNELS;
            data.extend_from_slice(&self.data[start..start + rect.width * RGB_CHANNELS]);
        }
        Self {
            width: rect.width as u32,
            height: rect.height as u32,
            data: Arc::from(data.into_boxed_slice()),
        }
    }
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("failed to decode {label} image: {message}")]
    Decode { label: String, message: String },

    #[error("zone {index} covers no pixels after clamping to the image")]
    EmptyZone { index: usize },

    #[error("{field} must be within 0..=100, got {value}")]
    OutOfRange { field: &'static str, value: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InputError {
    pub fn invalid_frame(reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            reason: reason.into(),
        }
    }

    pub fn decode(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            label: label.into(),
            message: message.into(),
        }
    }
}

/// Axis-aligned pixel rectangle; `right` and `bottom` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> usize {
        self.x + self.width
    }

    pub fn bottom(&self) -> usize {
        self.y + self.height
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn union(&self, other: &PixelRect) -> PixelRect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        PixelRect::new(x, y, right - x, bottom - y)
    }

    /// True when the two rectangles overlap once both are grown by `gap`.
    pub fn is_near(&self, other: &PixelRect, gap: usize) -> bool {
        let gap = gap as i64;
        let (ax0, ay0) = (self.x as i64, self.y as i64);
        let (ax1, ay1) = (self.right() as i64, self.bottom() as i64);
        let (bx0, by0) = (other.x as i64, other.y as i64);
        let (bx1, by1) = (other.right() as i64, other.bottom() as i64);
        ax0 - gap <= bx1 && ax1 + gap >= bx0 && ay0 - gap <= by1 && ay1 + gap >= by0
    }

    pub fn contains(&self, other: &PixelRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn clamp_to(&self, width: usize, height: usize) -> PixelRect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let right = self.right().min(width);
        let bottom = self.bottom().min(height);
        PixelRect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Grows the rectangle by `pad` on every side, clamped to the frame.
    pub fn padded(&self, pad: usize, width: usize, height: usize) -> PixelRect {
        let x = self.x.saturating_sub(pad);
        let y = self.y.saturating_sub(pad);
        let right = (self.right() + pad).min(width);
        let bottom = (self.bottom() + pad).min(height);
        PixelRect::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    pub fn offset(&self, dx: usize, dy: usize) -> PixelRect {
        PixelRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Rectangle expressed as fractions of the image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

/// User-supplied search area. Zones union into one inclusion mask.
pub type Zone = NormalizedBox;

impl NormalizedBox {
    /// Builds a box with the origin clamped to `[0, 1]` and the extent
    /// clamped so that `x + w <= 1` and `y + h <= 1`.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        let x = sanitize_unit(x);
        let y = sanitize_unit(y);
        let w = sanitize_unit(w).min(1.0 - x);
        let h = sanitize_unit(h).min(1.0 - y);
        Self { x, y, w, h }
    }

    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Converts a pixel rectangle of a `width` x `height` image, rounded to
    /// four decimals.
    pub fn from_pixels(rect: PixelRect, width: usize, height: usize) -> Self {
        if width == 0 || height == 0 {
            return Self::new(0.0, 0.0, 0.0, 0.0);
        }
        let fx = |value: usize| round_to(value as f32 / width as f32, 4);
        let fy = |value: usize| round_to(value as f32 / height as f32, 4);
        Self::new(fx(rect.x), fy(rect.y), fx(rect.width), fy(rect.height))
    }

    /// Pixel bounds inside a `width` x `height` image (truncating, clamped).
    pub fn to_pixels(&self, width: usize, height: usize) -> PixelRect {
        let x = (self.x * width as f32) as usize;
        let y = (self.y * height as f32) as usize;
        let w = (self.w * width as f32) as usize;
        let h = (self.h * height as f32) as usize;
        PixelRect::new(x, y, w, h).clamp_to(width, height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }
}

fn sanitize_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Rounds `value` to `decimals` fractional digits.
pub fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f32.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Important,
    Minor,
    Info,
}

impl Severity {
    /// Sort key for reports: critical first.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Important => 1,
            Severity::Minor => 2,
            Severity::Info => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Minor => "minor",
            Severity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceKind {
    Typography,
    Color,
    Graphic,
    Content,
    Layout,
    Spelling,
}

impl DifferenceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DifferenceKind::Typography => "typography",
            DifferenceKind::Color => "color",
            DifferenceKind::Graphic => "graphic",
            DifferenceKind::Content => "content",
            DifferenceKind::Layout => "layout",
            DifferenceKind::Spelling => "spelling",
        }
    }
}

/// One reported deviation between master and sample.
///
/// Crops are thumbnails for report rendering; serializers that need them
/// encode them explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct Difference {
    pub bbox: NormalizedBox,
    #[serde(rename = "type")]
    pub kind: DifferenceKind,
    pub severity: Severity,
    pub pixel_diff_percent: f32,
    pub color_delta_e: f32,
    pub description: String,
    #[serde(skip)]
    pub master_crop: Option<RgbFrame>,
    #[serde(skip)]
    pub sample_crop: Option<RgbFrame>,
}

/// Sorts differences by severity rank, keeping discovery order within a rank.
pub fn sort_by_severity(differences: &mut [Difference]) {
    differences.sort_by_key(|difference| difference.severity.rank());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpellingCategory {
    /// Unknown word present only in the sample.
    Introduced,
    /// Unknown word present in both images.
    Preexisting,
    /// Unknown word present only in the master.
    Fixed,
}

impl SpellingCategory {
    pub fn severity(self) -> Severity {
        match self {
            SpellingCategory::Introduced => Severity::Critical,
            SpellingCategory::Preexisting => Severity::Minor,
            SpellingCategory::Fixed => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpellingError {
    pub word: String,
    pub bbox: NormalizedBox,
    pub confidence: f32,
    pub suggestions: Vec<String>,
    pub category: SpellingCategory,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Text,
    Image,
    Logo,
    Icon,
    Cta,
    Graphic,
}

impl ElementKind {
    pub const ALL: [ElementKind; 6] = [
        ElementKind::Text,
        ElementKind::Image,
        ElementKind::Logo,
        ElementKind::Icon,
        ElementKind::Cta,
        ElementKind::Graphic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Text => "text",
            ElementKind::Image => "image",
            ElementKind::Logo => "logo",
            ElementKind::Icon => "icon",
            ElementKind::Cta => "cta",
            ElementKind::Graphic => "graphic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedElement {
    #[serde(rename = "element_type")]
    pub kind: ElementKind,
    pub confidence: f32,
    pub bbox: NormalizedBox,
    pub area_percent: f32,
    pub attributes: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ElementCount {
    pub master: usize,
    pub sample: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementChange {
    pub element_type: ElementKind,
    pub master_count: usize,
    pub sample_count: usize,
    pub delta: i64,
}

/// Result of running the element detector over both images.
#[derive(Debug, Clone, Serialize)]
pub struct ElementInventory {
    pub master_elements: Vec<DetectedElement>,
    pub sample_elements: Vec<DetectedElement>,
    pub summary: BTreeMap<ElementKind, ElementCount>,
    pub changes: Vec<ElementChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaletteEntry {
    pub hex: String,
    pub share_percent: f32,
}
