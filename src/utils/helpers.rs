use chrono::NaiveDate;
use napi_derive::napi;
use serde::Serialize;

use crate::exam::{extension_of, is_image_extension, ExamCategory, ACCEPTED_EXTENSIONS};
use super::filename::{derive_filename, derive_for_today};

/**
 * Exam category with its display label.
 *
 * @example
 * ```typescript
 * import { getExamCategories } from '@nuxthealth/node-exam-intake';
 *
 * for (const { category, label } of getExamCategories()) {
 *   select.add(new Option(label, category));
 * }
 * ```
 */
#[napi(object)]
#[derive(Debug, Clone, Serialize)]
pub struct ExamCategoryInfo {
    /// Enum value accepted by `submit()`
    pub category: ExamCategory,
    /// Label used in filenames and prompts
    pub label: String,
}

/// List all exam categories in form order
#[napi]
pub fn get_exam_categories() -> Vec<ExamCategoryInfo> {
    ExamCategory::ALL
        .iter()
        .map(|category| ExamCategoryInfo {
            category: *category,
            label: category.label().to_string(),
        })
        .collect()
}

/// File extensions accepted by `submit()`
#[napi]
pub fn get_accepted_extensions() -> Vec<String> {
    ACCEPTED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// Whether a file name goes through the describe/annotate branch
#[napi]
pub fn is_image_file(filename: String) -> bool {
    is_image_extension(&extension_of(&filename))
}

/**
 * Canonical stored name of an exam, as `submit()` would derive it.
 *
 * @param patientName - Full patient name
 * @param examCategory - Exam category
 * @param filename - Original file name (only the extension is used)
 * @param date - Optional date as YYYY-MM-DD (default: today)
 *
 * @example
 * ```typescript
 * deriveExamFilename('Maria Silva', 'Oct', 'exam.png', '2024-03-01');
 * // 'Maria_Silva20240301OCT.png'
 * ```
 */
#[napi]
pub fn derive_exam_filename(
    patient_name: String,
    exam_category: ExamCategory,
    filename: String,
    date: Option<String>,
) -> napi::Result<String> {
    let extension = extension_of(&filename);
    match date {
        Some(date) => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| napi::Error::from_reason(format!("Invalid date {}: {}", date, e)))?;
            Ok(derive_filename(&patient_name, exam_category, date, &extension))
        }
        None => Ok(derive_for_today(&patient_name, exam_category, &extension)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_exam_categories() {
        let categories = get_exam_categories();
        assert_eq!(categories.len(), 8);
        assert_eq!(categories[0].label, "OCT");
        assert_eq!(categories[3].category, ExamCategory::VisualField);
        assert_eq!(categories[3].label, "Visual Field");
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file("exam.PNG".to_string()));
        assert!(is_image_file("exam.jpeg".to_string()));
        assert!(!is_image_file("exam.pdf".to_string()));
    }

    #[test]
    fn test_derive_exam_filename() {
        assert_eq!(
            derive_exam_filename(
                "Maria Silva".to_string(),
                ExamCategory::Oct,
                "exam.png".to_string(),
                Some("2024-03-01".to_string()),
            )
            .unwrap(),
            "Maria_Silva20240301OCT.png"
        );
        assert!(derive_exam_filename(
            "Maria Silva".to_string(),
            ExamCategory::Oct,
            "exam.png".to_string(),
            Some("01/03/2024".to_string()),
        )
        .is_err());
    }

    #[test]
    fn test_get_accepted_extensions() {
        assert_eq!(get_accepted_extensions(), vec![".jpg", ".jpeg", ".png", ".pdf"]);
    }
}
