use chrono::{Local, NaiveDate};

use crate::exam::ExamCategory;

/// Separator used for whitespace in patient names and category labels.
pub const SEPARATOR: char = '_';

/// Suffix (and format) of the annotated copy of an image submission.
pub const ANNOTATED_SUFFIX: &str = "_LAUDADO.jpg";

/// Derive the canonical stored name of a submission.
///
/// `name + YYYYMMDD + category + extension`, with whitespace runs in the name
/// and spaces in the category label replaced by `_`. Re-submissions on the same
/// day yield the same name.
pub fn derive_filename(
    patient_name: &str,
    category: ExamCategory,
    date: NaiveDate,
    extension: &str,
) -> String {
    let name_token = patient_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string());
    let date_token = date.format("%Y%m%d");
    let category_token = category.label().replace(' ', &SEPARATOR.to_string());

    format!("{}{}{}{}", name_token, date_token, category_token, extension)
}

pub fn derive_for_today(patient_name: &str, category: ExamCategory, extension: &str) -> String {
    derive_filename(patient_name, category, Local::now().date_naive(), extension)
}

/// Name of the annotated copy: the original extension is swapped for [`ANNOTATED_SUFFIX`].
pub fn annotated_filename(original: &str, extension: &str) -> String {
    let stem = original.strip_suffix(extension).unwrap_or(original);
    format!("{}{}", stem, ANNOTATED_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn march_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_derive_filename() {
        assert_eq!(
            derive_filename("Maria Silva", ExamCategory::Oct, march_first(), ".png"),
            "Maria_Silva20240301OCT.png"
        );
        assert_eq!(
            derive_filename("  Joao   da Costa ", ExamCategory::VisualField, march_first(), ".pdf"),
            "Joao_da_Costa20240301Visual_Field.pdf"
        );
        assert_eq!(
            derive_filename("Ana", ExamCategory::DryEyeTopographer, march_first(), ".jpg"),
            "Ana20240301Dry-Eye_Topographer.jpg"
        );
    }

    #[test]
    fn test_derive_is_deterministic_and_keeps_extension() {
        for category in ExamCategory::ALL {
            for extension in [".jpg", ".jpeg", ".png", ".pdf", ""] {
                let first = derive_filename("Maria Silva", category, march_first(), extension);
                let second = derive_filename("Maria Silva", category, march_first(), extension);
                assert_eq!(first, second);
                assert!(first.ends_with(extension));
            }
        }
    }

    #[test]
    fn test_separator_collisions_are_not_escaped() {
        let spaced = derive_filename("Maria Silva", ExamCategory::Oct, march_first(), ".png");
        let underscored = derive_filename("Maria_Silva", ExamCategory::Oct, march_first(), ".png");
        assert_eq!(spaced, underscored);
    }

    #[test]
    fn test_derive_for_today_uses_current_date() {
        let today = Local::now().date_naive().format("%Y%m%d").to_string();
        let name = derive_for_today("Maria Silva", ExamCategory::Biometer, ".png");
        assert!(name.contains(&today));
    }

    #[test]
    fn test_annotated_filename() {
        assert_eq!(
            annotated_filename("Maria_Silva20240301OCT.png", ".png"),
            "Maria_Silva20240301OCT_LAUDADO.jpg"
        );
        assert_eq!(
            annotated_filename("Ana20240301Pentacam.jpeg", ".jpeg"),
            "Ana20240301Pentacam_LAUDADO.jpg"
        );
    }
}
