use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use log::debug;

use crate::{OcrEngine, OcrError, OcrRequest, OcrResponse, OcrWord, PageSegmentation};

const ENGINE_NAME: &str = "tesseract";
// TSV rows at this level describe single words.
const WORD_LEVEL: u32 = 5;

/// OCR engine backed by the `tesseract` command-line tool.
#[derive(Debug, Clone)]
pub struct TesseractCliEngine {
    binary: PathBuf,
}

impl Default for TesseractCliEngine {
    fn default() -> Self {
        Self::new(ENGINE_NAME)
    }
}

impl TesseractCliEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl OcrEngine for TesseractCliEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn warm_up(&self) -> Result<(), OcrError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .map_err(|err| {
                OcrError::unavailable(
                    ENGINE_NAME,
                    format!("failed to launch '{}': {err}", self.binary.display()),
                )
            })?;
        if !output.status.success() {
            return Err(OcrError::unavailable(
                ENGINE_NAME,
                format!("'{} --version' exited with {}", self.binary.display(), output.status),
            ));
        }
        Ok(())
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<OcrResponse, OcrError> {
        let frame = request.frame();
        if frame.is_empty() {
            return Err(OcrError::EmptyImage);
        }

        let mut input = tempfile::Builder::new()
            .prefix("printqc-ocr-")
            .suffix(".png")
            .tempfile()?;
        {
            let mut writer = BufWriter::new(input.as_file_mut());
            PngEncoder::new(&mut writer)
                .write_image(frame.data(), frame.width(), frame.height(), ColorType::Rgb8)
                .map_err(|err| OcrError::backend(format!("failed to encode OCR input: {err}")))?;
            writer.flush()?;
        }

        let psm = match request.segmentation() {
            PageSegmentation::Auto => "3",
            PageSegmentation::SingleBlock => "6",
        };
        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("stdout")
            .args(["-l", request.language(), "--psm", psm, "tsv"])
            .output()
            .map_err(|err| {
                OcrError::unavailable(
                    ENGINE_NAME,
                    format!("failed to launch '{}': {err}", self.binary.display()),
                )
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::backend(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        debug!(
            "tesseract recognized {} words ({}x{}, lang={})",
            words.len(),
            frame.width(),
            frame.height(),
            request.language()
        );
        Ok(OcrResponse::new(words))
    }
}

struct TsvColumns {
    level: usize,
    left: usize,
    top: usize,
    width: usize,
    height: usize,
    conf: usize,
    text: usize,
}

impl TsvColumns {
    fn from_header(header: &str) -> Option<Self> {
        let names: Vec<&str> = header.split('\t').map(str::trim).collect();
        let find = |name: &str| names.iter().position(|candidate| *candidate == name);
        Some(Self {
            level: find("level")?,
            left: find("left")?,
            top: find("top")?,
            width: find("width")?,
            height: find("height")?,
            conf: find("conf")?,
            text: find("text")?,
        })
    }
}

/// Parses `tesseract ... tsv` output into word records.
pub(crate) fn parse_tsv(tsv: &str) -> Vec<OcrWord> {
    let mut lines = tsv.lines();
    let Some(columns) = lines.next().and_then(TsvColumns::from_header) else {
        return Vec::new();
    };

    let mut words = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        let field = |index: usize| fields.get(index).copied().unwrap_or("");
        if field(columns.level).trim().parse::<u32>().ok() != Some(WORD_LEVEL) {
            continue;
        }
        let text = field(columns.text).trim();
        if text.is_empty() {
            continue;
        }
        let number = |index: usize| field(index).trim().parse::<usize>().unwrap_or(0);
        let confidence = field(columns.conf).trim().parse::<f32>().unwrap_or(-1.0);
        words.push(
            OcrWord::new(
                text,
                number(columns.left),
                number(columns.top),
                number(columns.width),
                number(columns.height),
            )
            .with_confidence(confidence),
        );
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t
4\t1\t1\t1\t1\t0\t20\t30\t200\t18\t-1\t
5\t1\t1\t1\t1\t1\t20\t30\t80\t18\t96.41\tOferta
5\t1\t1\t1\t1\t2\t108\t30\t60\t18\t-1\tválida
5\t1\t1\t1\t1\t3\t170\t30\t4\t18\t95\t ";

    #[test]
    fn parses_word_rows_only() {
        let words = parse_tsv(SAMPLE);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0].text, "Oferta");
        assert_eq!(words[0].left, 20);
        assert_eq!(words[0].width, 80);
        assert!((words[0].confidence - 96.41).abs() < 1e-3);
        assert_eq!(words[1].text, "válida");
        assert_eq!(words[1].confidence, 0.0);
    }

    #[test]
    fn missing_header_yields_nothing() {
        assert!(parse_tsv("").is_empty());
        assert!(parse_tsv("5\t1\t1").is_empty());
    }

    #[test]
    fn missing_binary_reports_unavailable() {
        let engine = TesseractCliEngine::new("/nonexistent/printqc-tesseract");
        let err = engine.warm_up().unwrap_err();
        assert!(matches!(err, OcrError::Unavailable { .. }));
    }
}
