use anyhow::Result;
use chrono::Local;
use image::{GrayImage, RgbaImage};
use log::{debug, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::engine::TextRecognizer;
use super::layout::{FieldLayout, FieldRegion};
use super::preprocess::prepare_region;

/// Unit and degree marks the recognizer glues onto numbers.
const UNIT_SUFFIX_PATTERN: &str = r"(?i)(\d)\s*(?:mph|km/?h|m/s|mps|yards?|yds?|rpm|deg|[°º*])";

/// Thousands separator between digit groups (`2,850`).
const THOUSANDS_PATTERN: &str = r"(\d),(\d{3})\b";

/// Field name to recognized text. An empty value means "not read".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldReading(BTreeMap<String, String>);

impl FieldReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.0.insert(name.into(), text.into());
    }

    /// Text for `name`, `None` if the field is absent or was not read.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(String::as_str)
            .filter(|text| !text.is_empty())
    }

    /// True when no field carries any text.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|text| text.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldReading {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Keeps the crops of the most recent extraction, optionally writing them out.
#[derive(Default)]
pub struct DiagnosticCapture {
    dir: Option<PathBuf>,
    last_crops: Vec<(String, GrayImage)>,
}

impl DiagnosticCapture {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            last_crops: Vec::new(),
        }
    }

    fn record(&mut self, channel: &str, field: &str, crop: &GrayImage) {
        if let Some(dir) = &self.dir {
            let name = format!(
                "{}_{}_{}.png",
                Local::now().format("%Y%m%d_%H%M%S%.3f"),
                channel,
                sanitize_file_name(field)
            );
            if let Err(e) = crop.save(dir.join(&name)) {
                warn!("Could not save diagnostic crop {}: {}", name, e);
            }
        }
        self.last_crops.push((field.to_string(), crop.clone()));
    }
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Crops every region of a layout and reads its text.
pub struct FieldExtractor {
    recognizer: Box<dyn TextRecognizer>,
    threshold: Option<u8>,
    unit_suffix: Regex,
    thousands: Regex,
    diagnostics: Option<DiagnosticCapture>,
}

impl FieldExtractor {
    /// `threshold` enables bright-pixel binarization before recognition.
    pub fn new(recognizer: Box<dyn TextRecognizer>, threshold: Option<u8>) -> Result<Self> {
        Ok(Self {
            recognizer,
            threshold,
            unit_suffix: Regex::new(UNIT_SUFFIX_PATTERN)?,
            thousands: Regex::new(THOUSANDS_PATTERN)?,
            diagnostics: None,
        })
    }

    /// Retains processed crops; with a directory they are also saved as PNG.
    pub fn with_diagnostics(mut self, capture: DiagnosticCapture) -> Self {
        self.diagnostics = Some(capture);
        self
    }

    /// Crops of the last `extract` call, empty unless diagnostics are enabled.
    pub fn last_crops(&self) -> &[(String, GrayImage)] {
        self.diagnostics
            .as_ref()
            .map(|d| d.last_crops.as_slice())
            .unwrap_or(&[])
    }

    /// Reads every field of `layout` from `image`.
    ///
    /// Never fails: a field whose recognition errors or returns nothing
    /// usable is recorded as an empty string.
    pub fn extract(&mut self, image: &RgbaImage, layout: &FieldLayout) -> FieldReading {
        if let Some(diagnostics) = self.diagnostics.as_mut() {
            diagnostics.last_crops.clear();
        }

        let mut reading = FieldReading::new();
        for region in layout.regions() {
            let crop = prepare_region(image, &region.normalized_rect, self.threshold);
            if let Some(diagnostics) = self.diagnostics.as_mut() {
                diagnostics.record(layout.channel().as_str(), &region.name, &crop);
            }

            let text = match self
                .recognizer
                .recognize_text(&crop, region.allowed_words.as_deref())
            {
                Ok(raw) => self.clean_text(&raw, region),
                Err(e) => {
                    debug!(
                        "Recognition failed for {} field '{}': {}",
                        layout.channel(),
                        region.name,
                        e
                    );
                    String::new()
                }
            };
            reading.insert(region.name.clone(), text);
        }

        reading
    }

    fn clean_text(&self, raw: &str, region: &FieldRegion) -> String {
        let mut text = collapse_whitespace(raw);

        if region.text_hack {
            text = self.apply_text_hack(&text);
        }

        match &region.allowed_words {
            Some(words) => snap_to_vocabulary(&text, words),
            None => text,
        }
    }

    /// Drops unit/degree suffixes after digits and thousands separators.
    fn apply_text_hack(&self, text: &str) -> String {
        let mut cleaned = self.unit_suffix.replace_all(text, "$1").into_owned();
        loop {
            let next = self.thousands.replace_all(&cleaned, "$1$2").into_owned();
            if next == cleaned {
                break;
            }
            cleaned = next;
        }
        collapse_whitespace(&cleaned)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical vocabulary word matching `text`, or empty when none does.
fn snap_to_vocabulary(text: &str, words: &[String]) -> String {
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_uppercase)
            .collect::<String>()
    };
    let wanted = normalize(text);
    if wanted.is_empty() {
        return String::new();
    }
    words
        .iter()
        .find(|word| normalize(word.as_str()) == wanted)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::screen::layout::{Channel, RelativeRect};
    use anyhow::anyhow;
    use image::{ImageBuffer, Rgba};
    use std::collections::HashMap;
    use tempfile::tempdir;

    /// Answers by the crop's left edge pixel value, which the test frame
    /// encodes per region.
    struct ScriptedRecognizer {
        answers: HashMap<u8, Result<String, String>>,
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize_text(
            &self,
            sub_image: &GrayImage,
            _vocabulary: Option<&[String]>,
        ) -> Result<String> {
            let key = sub_image.get_pixel(0, 0)[0];
            match self.answers.get(&key) {
                Some(Ok(text)) => Ok(text.clone()),
                Some(Err(e)) => Err(anyhow!(e.clone())),
                None => Ok(String::new()),
            }
        }
    }

    /// 100x10 frame split into ten vertical strips of gray 0, 10, 20, ...
    fn striped_frame() -> RgbaImage {
        ImageBuffer::from_fn(100, 10, |x, _| {
            let v = (x / 10 * 10) as u8;
            Rgba([v, v, v, 255])
        })
    }

    fn region(name: &str, strip: u32, words: Option<&[&str]>, hack: bool) -> FieldRegion {
        FieldRegion {
            name: name.to_string(),
            normalized_rect: RelativeRect {
                x: strip as f32 / 10.0,
                y: 0.0,
                width: 0.1,
                height: 1.0,
            },
            allowed_words: words.map(|w| w.iter().map(|s| s.to_string()).collect()),
            text_hack: hack,
        }
    }

    fn extractor(answers: Vec<(u8, Result<&str, &str>)>) -> FieldExtractor {
        let answers = answers
            .into_iter()
            .map(|(k, v)| (k, v.map(str::to_string).map_err(str::to_string)))
            .collect();
        FieldExtractor::new(Box::new(ScriptedRecognizer { answers }), None).unwrap()
    }

    #[test]
    fn test_extract_reads_every_region() {
        let layout = FieldLayout::new(
            Channel::Ball,
            vec![region("Speed", 1, None, false), region("VLA", 2, None, false)],
        )
        .unwrap();
        let mut extractor = extractor(vec![(10, Ok(" 145.2 ")), (20, Ok("12.5"))]);

        let reading = extractor.extract(&striped_frame(), &layout);
        assert_eq!(reading.get("Speed"), Some("145.2"));
        assert_eq!(reading.get("VLA"), Some("12.5"));
        assert_eq!(reading.len(), 2);
    }

    #[test]
    fn test_recognition_failure_is_empty_field() {
        let layout = FieldLayout::new(
            Channel::Ball,
            vec![region("Speed", 1, None, false), region("VLA", 2, None, false)],
        )
        .unwrap();
        let mut extractor = extractor(vec![(10, Err("engine crashed")), (20, Ok("12.5"))]);

        let reading = extractor.extract(&striped_frame(), &layout);
        assert_eq!(reading.get("Speed"), None);
        assert_eq!(reading.field_names().collect::<Vec<_>>(), vec!["Speed", "VLA"]);
        assert!(!reading.is_blank());
    }

    #[test]
    fn test_vocabulary_snaps_or_rejects() {
        let layout = FieldLayout::new(
            Channel::Club,
            vec![
                region("path-direction", 1, Some(&["IN-OUT", "OUT-IN"]), false),
                region("aoa-direction", 2, Some(&["UP", "DOWN"]), false),
            ],
        )
        .unwrap();
        let mut extractor = extractor(vec![(10, Ok("in-out")), (20, Ok("DOVVN"))]);

        let reading = extractor.extract(&striped_frame(), &layout);
        assert_eq!(reading.get("path-direction"), Some("IN-OUT"));
        assert_eq!(reading.get("aoa-direction"), None);
    }

    #[test]
    fn test_text_hack_strips_suffixes() {
        let layout = FieldLayout::new(
            Channel::Ball,
            vec![
                region("Speed", 1, None, true),
                region("TotalSpin", 2, None, true),
                region("SpinAxis", 3, None, true),
                region("Raw", 4, None, false),
            ],
        )
        .unwrap();
        let mut extractor = extractor(vec![
            (10, Ok("145.2mph")),
            (20, Ok("2,850 rpm")),
            (30, Ok("3.4° L")),
            (40, Ok("145.2mph")),
        ]);

        let reading = extractor.extract(&striped_frame(), &layout);
        assert_eq!(reading.get("Speed"), Some("145.2"));
        assert_eq!(reading.get("TotalSpin"), Some("2850"));
        assert_eq!(reading.get("SpinAxis"), Some("3.4 L"));
        assert_eq!(reading.get("Raw"), Some("145.2mph"));
    }

    #[test]
    fn test_text_hack_multiple_thousands_groups() {
        let extractor = extractor(vec![]);
        assert_eq!(extractor.apply_text_hack("1,234,567"), "1234567");
        assert_eq!(extractor.apply_text_hack("12 yds"), "12");
    }

    #[test]
    fn test_diagnostics_retain_and_save_crops() {
        let dir = tempdir().unwrap();
        let layout =
            FieldLayout::new(Channel::Ball, vec![region("Speed", 1, None, false)]).unwrap();
        let mut extractor = extractor(vec![(10, Ok("1"))])
            .with_diagnostics(DiagnosticCapture::new(Some(dir.path().to_path_buf())));

        extractor.extract(&striped_frame(), &layout);
        assert_eq!(extractor.last_crops().len(), 1);
        assert_eq!(extractor.last_crops()[0].0, "Speed");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        extractor.extract(&striped_frame(), &layout);
        assert_eq!(extractor.last_crops().len(), 1);
    }

    #[test]
    fn test_reading_equality_is_structural() {
        let a: FieldReading = [("Speed", "120"), ("VLA", "")].into_iter().collect();
        let b: FieldReading = [("VLA", ""), ("Speed", "120")].into_iter().collect();
        let c: FieldReading = [("Speed", "120")].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
