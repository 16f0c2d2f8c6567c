use anyhow::{anyhow, Result};
use image::GrayImage;
use std::collections::BTreeSet;
use std::io::Write;
use std::process::Command;
use tempfile::NamedTempFile;

use super::setup::TesseractPaths;

/// Lines averaging below this confidence are treated as unread.
const MIN_CONFIDENCE: f32 = 40.0;

/// Single text line, no layout analysis.
const DEFAULT_PSM: u8 = 7;

/// Text recognition for one cropped field.
///
/// `vocabulary` restricts what the recognizer should expect to see. An
/// error or an empty string both mean the field could not be read.
pub trait TextRecognizer: Send {
    fn recognize_text(
        &self,
        sub_image: &GrayImage,
        vocabulary: Option<&[String]>,
    ) -> Result<String>;
}

/// Words tesseract placed on one line, with their mean confidence.
#[derive(Debug, Clone)]
pub struct OcrLine {
    pub text: String,
    pub words: Vec<OcrWord>,
    pub confidence: f32,
}

#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

/// Runs the tesseract executable once per field.
pub struct TesseractRecognizer {
    paths: TesseractPaths,
    page_segmentation_mode: u8,
    min_confidence: f32,
}

impl TesseractRecognizer {
    pub fn new(paths: TesseractPaths) -> Self {
        Self {
            paths,
            page_segmentation_mode: DEFAULT_PSM,
            min_confidence: MIN_CONFIDENCE,
        }
    }

    pub fn with_page_segmentation_mode(mut self, psm: u8) -> Self {
        self.page_segmentation_mode = psm;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize_text(
        &self,
        sub_image: &GrayImage,
        vocabulary: Option<&[String]>,
    ) -> Result<String> {
        if sub_image.width() == 0 || sub_image.height() == 0 {
            return Err(anyhow!("Empty crop"));
        }

        let temp_input = NamedTempFile::with_suffix(".png")?;
        sub_image.save(temp_input.path())?;

        // Tesseract adds the .tsv extension itself
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut command = Command::new(&self.paths.executable);
        command.arg(temp_input.path()).arg(&output_base);
        if let Some(tessdata) = &self.paths.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        command
            .arg("-l")
            .arg("eng")
            .arg("--psm")
            .arg(self.page_segmentation_mode.to_string());

        // Kept alive until tesseract exits
        let mut user_words = None;
        if let Some(words) = vocabulary.filter(|w| !w.is_empty()) {
            let mut file = NamedTempFile::with_suffix(".words")?;
            for word in words {
                writeln!(file, "{}", word)?;
            }
            command.arg("--user-words").arg(file.path());
            command
                .arg("-c")
                .arg(format!("tessedit_char_whitelist={}", vocabulary_charset(words)));
            user_words = Some(file);
        }

        let output = command.arg("tsv").output()?;
        drop(user_words);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| anyhow!("Failed to read Tesseract output: {}", e))?;
        let _ = std::fs::remove_file(&tsv_path);

        let lines = parse_tsv_output(&tsv_content)?;
        Ok(lines
            .iter()
            .filter(|line| line.confidence >= self.min_confidence)
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// Every character that appears in the vocabulary, in both cases.
fn vocabulary_charset(words: &[String]) -> String {
    words
        .iter()
        .flat_map(|w| w.chars().flat_map(|c| c.to_uppercase().chain(c.to_lowercase())))
        .filter(|c| !c.is_whitespace())
        .collect::<BTreeSet<char>>()
        .into_iter()
        .collect()
}

/// Block, paragraph and line numbers of a TSV row.
type LineKey = (i32, i32, i32);

/// Word-level row of tesseract's TSV output, `None` for anything else.
///
/// Columns: level, page, block, par, line, word, left, top, width, height,
/// conf, text. A word with negative confidence still marks its line but
/// contributes no text.
fn parse_word_row(row: &str) -> Option<(LineKey, Option<OcrWord>)> {
    let columns: Vec<&str> = row.split('\t').collect();
    let [level, _, block, par, line, _, _, _, _, _, conf, text, ..] = columns.as_slice() else {
        return None;
    };
    let text = text.trim();
    if level.parse::<i32>().ok()? != 5 || text.is_empty() {
        return None;
    }

    let number = |column: &str| column.parse::<i32>().unwrap_or(-1);
    let key = (number(*block), number(*par), number(*line));
    let confidence: f32 = conf.parse().unwrap_or(-1.0);
    let word = (confidence >= 0.0).then(|| OcrWord {
        text: text.to_string(),
        confidence,
    });
    Some((key, word))
}

/// Groups the words of tesseract's TSV output into lines.
pub fn parse_tsv_output(tsv: &str) -> Result<Vec<OcrLine>> {
    let mut lines = Vec::new();
    let mut current: Option<LineKey> = None;
    let mut words = Vec::new();

    for (key, word) in tsv.lines().skip(1).filter_map(parse_word_row) {
        if current.is_some_and(|k| k != key) {
            push_line(&mut lines, std::mem::take(&mut words));
        }
        current = Some(key);
        words.extend(word);
    }

    push_line(&mut lines, words);
    Ok(lines)
}

fn push_line(lines: &mut Vec<OcrLine>, words: Vec<OcrWord>) {
    if words.is_empty() {
        return;
    }
    let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(OcrLine {
        text,
        words,
        confidence,
    });
}
