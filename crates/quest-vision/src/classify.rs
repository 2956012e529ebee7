use crate::error::VisionError;
use crate::ocr::{read_text, OcrEngine, OcrOptions};
use image::RgbaImage;
use quest_data::{KeywordGroup, KeywordTable};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::debug;

const QUOTES: [char; 3] = ['"', '“', '”'];
const NUMERALS: [&str; 10] = ["一", "二", "三", "四", "五", "六", "七", "八", "九", "十"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub matched_category: Option<String>,
    pub raw_text: String,
    pub normalized_text: String,
}

/// OCR the task-type region and map the text onto a category.
///
/// An empty read or a read that matches nothing is a successful, unclassified result.
pub fn classify(
    roi: &RgbaImage,
    keywords: &KeywordTable,
    engine: &dyn OcrEngine,
    options: &OcrOptions,
    decorations: &[String],
) -> Result<ClassificationResult, VisionError> {
    let raw_text = read_text(roi, engine, options)?;
    let normalized_text = normalize(&raw_text, decorations);
    let matched_category =
        match_category(&raw_text, &normalized_text, keywords).map(|g| g.name.clone());

    debug!(
        "Task type raw={:?} normalized={:?} category={:?}",
        raw_text, normalized_text, matched_category
    );
    Ok(ClassificationResult {
        matched_category,
        raw_text,
        normalized_text,
    })
}

/// Drop whitespace, quotes and decoration labels, then keep CJK ideographs only.
pub fn normalize(raw: &str, decorations: &[String]) -> String {
    strip_decorations(raw, decorations)
        .chars()
        .filter(|c| is_ideograph(*c))
        .collect()
}

/// First group, in table order, with an alias contained in either text.
pub fn match_category<'a>(
    raw: &str,
    normalized: &str,
    keywords: &'a KeywordTable,
) -> Option<&'a KeywordGroup> {
    keywords.iter().find(|group| {
        group
            .aliases
            .iter()
            .filter(|alias| !alias.is_empty())
            .any(|alias| normalized.contains(alias.as_str()) || raw.contains(alias.as_str()))
    })
}

/// Standard name of the item a description asks for, e.g. "快去找到一个金疮药(小)，并交给他".
///
/// Matching runs over the phrase after `找到一个`, longest alias first. Names and aliases
/// also match with a trailing parenthesised qualifier removed.
pub fn extract_required_item(
    description: &str,
    items: &KeywordTable,
    decorations: &[String],
) -> Option<String> {
    let clean = strip_decorations(description, decorations);
    let phrase = item_phrase_pattern()?
        .captures(&clean)?
        .get(1)?
        .as_str()
        .trim()
        .to_string();
    if phrase.is_empty() {
        return None;
    }
    debug!("Required item phrase {:?}", phrase);

    let mut candidates: Vec<(String, &str)> = Vec::new();
    for group in items.iter() {
        for keyword in std::iter::once(&group.name).chain(&group.aliases) {
            let bare = strip_qualifier(keyword);
            for form in [bare, keyword.trim().to_string()] {
                if !form.is_empty() && !candidates.iter().any(|(k, _)| *k == form) {
                    candidates.push((form, group.name.as_str()));
                }
            }
        }
    }
    candidates.sort_by_key(|(keyword, _)| std::cmp::Reverse(keyword.chars().count()));

    let (_, name) = candidates
        .iter()
        .find(|(keyword, _)| phrase.contains(keyword.as_str()))?;

    // A generic name with a numeral in the phrase refers to a numbered variant.
    for numeral in NUMERALS {
        let numbered = format!("{name}{numeral}");
        if phrase.contains(numeral) && items.contains(&numbered) {
            return Some(numbered);
        }
    }
    Some(name.to_string())
}

fn strip_decorations(text: &str, decorations: &[String]) -> String {
    let mut clean: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !QUOTES.contains(c))
        .collect();
    for decoration in decorations.iter().filter(|d| !d.is_empty()) {
        clean = clean.replace(decoration.as_str(), "");
    }
    clean
}

fn strip_qualifier(keyword: &str) -> String {
    match qualifier_pattern() {
        Some(re) => re.replace_all(keyword, "").trim().to_string(),
        None => keyword.trim().to_string(),
    }
}

fn is_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

fn item_phrase_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?:快去找到一个|找到一个)([^,，（(并]+)").ok())
        .as_ref()
}

fn qualifier_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"[(（].*[)）]").ok())
        .as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{OcrError, OcrRequest};
    use image::GrayImage;
    use quest_data::OcrSettings;

    struct Canned(&'static str);

    impl OcrEngine for Canned {
        fn recognize(&self, _: &GrayImage, _: &OcrRequest<'_>) -> Result<String, OcrError> {
            Ok(self.0.to_string())
        }
    }

    struct Broken;

    impl OcrEngine for Broken {
        fn recognize(&self, _: &GrayImage, _: &OcrRequest<'_>) -> Result<String, OcrError> {
            Err(OcrError::EngineUnavailable("chi_sim missing".to_string()))
        }
    }

    fn decorations() -> Vec<String> {
        OcrSettings::default().tag_decorations
    }

    fn keywords() -> KeywordTable {
        KeywordTable::from_pairs([
            ("见多识广", vec!["见多识广", "见多"]),
            ("急人所急", vec!["急人所急"]),
        ])
    }

    fn run(engine: &dyn OcrEngine) -> Result<ClassificationResult, VisionError> {
        let roi = RgbaImage::new(40, 10);
        let options = OcrOptions::task_type(&OcrSettings::default());
        classify(&roi, &keywords(), engine, &options, &decorations())
    }

    #[test]
    fn test_normalize_strips_decorations_and_noise() {
        assert_eq!(
            normalize("[江湖历练任务] “急人所急” 的任务 A1", &decorations()),
            "急人所急的任务"
        );
        assert_eq!(normalize("[江湖历练企务]见多识广", &decorations()), "见多识广");
        assert_eq!(normalize("abc 123 !!", &decorations()), "");
    }

    #[test]
    fn test_classifies_known_category() {
        let result = run(&Canned("急人所急的任务")).unwrap();
        assert_eq!(result.matched_category.as_deref(), Some("急人所急"));
        assert_eq!(result.normalized_text, "急人所急的任务");
    }

    #[test]
    fn test_classification_depends_only_on_table() {
        let roi = RgbaImage::new(40, 10);
        let options = OcrOptions::task_type(&OcrSettings::default());
        let engine = Canned("急人所急的任务");
        let only_other = KeywordTable::from_pairs([("见多识广", vec!["见多识广"])]);

        let first = classify(&roi, &keywords(), &engine, &options, &decorations()).unwrap();
        let second = classify(&roi, &keywords(), &engine, &options, &decorations()).unwrap();
        assert_eq!(first.matched_category, second.matched_category);

        let other = classify(&roi, &only_other, &engine, &options, &decorations()).unwrap();
        assert_eq!(other.matched_category, None);
    }

    #[test]
    fn test_spaced_ocr_matches_through_normalization() {
        let result = run(&Canned("见 多 识 广")).unwrap();
        assert_eq!(result.matched_category.as_deref(), Some("见多识广"));
        assert_eq!(result.raw_text, "见 多 识 广");
    }

    #[test]
    fn test_empty_text_is_unclassified() {
        let result = run(&Canned("")).unwrap();
        assert_eq!(result.matched_category, None);
        assert_eq!(result.normalized_text, "");
    }

    #[test]
    fn test_unknown_text_is_unclassified() {
        assert_eq!(run(&Canned("行侠仗义")).unwrap().matched_category, None);
    }

    #[test]
    fn test_alias_with_latin_matches_raw_text_only() {
        let table = KeywordTable::from_pairs([("甲", vec!["任务A"])]);
        let roi = RgbaImage::new(40, 10);
        let options = OcrOptions::task_type(&OcrSettings::default());
        let result = classify(&roi, &table, &Canned("任务A"), &options, &decorations()).unwrap();
        assert_eq!(result.normalized_text, "任务");
        assert_eq!(result.matched_category.as_deref(), Some("甲"));
        assert!(match_category("任务B", "任务", &table).is_none());
    }

    #[test]
    fn test_first_group_wins_on_overlap() {
        let table = KeywordTable::from_pairs([("甲", vec!["任务"]), ("乙", vec!["任务"])]);
        let group = match_category("", "某某任务", &table).unwrap();
        assert_eq!(group.name, "甲");
    }

    #[test]
    fn test_engine_failure_propagates() {
        let err = run(&Broken).unwrap_err();
        assert!(matches!(err, VisionError::EngineUnavailable(_)));
    }

    #[test]
    fn test_extract_required_item_longest_alias() {
        let items = KeywordTable::from_pairs([
            ("金疮药", vec!["金疮"]),
            ("金疮药(大)", vec!["大金疮药"]),
        ]);
        let item = extract_required_item(
            "[江湖历练任务] 快去找到一个 大金疮药，并交给他",
            &items,
            &decorations(),
        );
        assert_eq!(item.as_deref(), Some("金疮药(大)"));
    }

    #[test]
    fn test_extract_required_item_ignores_qualifier() {
        let items = KeywordTable::from_pairs([("女儿红(陈年)", Vec::<String>::new())]);
        let item = extract_required_item("找到一个女儿红(给掌柜)", &items, &decorations());
        assert_eq!(item.as_deref(), Some("女儿红(陈年)"));
    }

    #[test]
    fn test_extract_required_item_numbered_variant() {
        let items = KeywordTable::from_pairs([
            ("天书残卷", vec!["天书"]),
            ("天书残卷七", vec![]),
        ]);
        let item = extract_required_item("快去找到一个天书残卷五,七或九", &items, &decorations());
        assert_eq!(item.as_deref(), Some("天书残卷"));
        let item = extract_required_item("快去找到一个天书残卷七或九", &items, &decorations());
        assert_eq!(item.as_deref(), Some("天书残卷七"));
    }

    #[test]
    fn test_extract_required_item_without_phrase() {
        let items = KeywordTable::from_pairs([("金疮药", vec!["金疮"])]);
        assert_eq!(extract_required_item("去城里逛逛", &items, &decorations()), None);
    }
}
