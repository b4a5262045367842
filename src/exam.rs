use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use snafu::prelude::*;

/**
 * Ophthalmic exam category selected on submission.
 *
 * Each category is stored in its own container (S3 bucket or directory).
 *
 * @example
 * ```typescript
 * await intake.submit({
 *   patientName: 'Maria Silva',
 *   examCategory: 'Oct',
 *   file: { data, mimeType: 'image/png', filename: 'exam.png' }
 * });
 * ```
 */
#[napi(string_enum)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExamCategory {
    /// Optical coherence tomography
    Oct,
    /// Pentacam corneal tomography
    Pentacam,
    /// Retinography (fundus photography)
    Retinography,
    /// Visual field (perimetry)
    VisualField,
    /// Ocular echography
    Echography,
    /// Dry-eye topographer
    DryEyeTopographer,
    /// Epithelial thickness map
    EpithelialMap,
    /// Optical biometer
    Biometer,
}

impl ExamCategory {
    pub const ALL: [ExamCategory; 8] = [
        ExamCategory::Oct,
        ExamCategory::Pentacam,
        ExamCategory::Retinography,
        ExamCategory::VisualField,
        ExamCategory::Echography,
        ExamCategory::DryEyeTopographer,
        ExamCategory::EpithelialMap,
        ExamCategory::Biometer,
    ];

    /// Human readable label, used in filenames and in the description prompt
    pub fn label(&self) -> &'static str {
        match self {
            ExamCategory::Oct => "OCT",
            ExamCategory::Pentacam => "Pentacam",
            ExamCategory::Retinography => "Retinography",
            ExamCategory::VisualField => "Visual Field",
            ExamCategory::Echography => "Echography",
            ExamCategory::DryEyeTopographer => "Dry-Eye Topographer",
            ExamCategory::EpithelialMap => "Epithelial Map",
            ExamCategory::Biometer => "Biometer",
        }
    }

    /// Parse a category from its label ("Visual Field") or variant name ("VisualField").
    pub fn from_label(value: &str) -> Option<Self> {
        let wanted = value.trim();
        Self::ALL.into_iter().find(|category| {
            category.label().eq_ignore_ascii_case(wanted)
                || format!("{:?}", category).eq_ignore_ascii_case(wanted)
        })
    }
}

impl fmt::Display for ExamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raster formats that go through the describe/annotate branch.
pub const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".jpeg", ".png"];

/// Upload types accepted by the intake form.
pub const ACCEPTED_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".pdf"];

/// Lowercased extension of a file name including the leading dot, or "" when there is none.
pub fn extension_of(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx..].to_lowercase(),
        _ => String::new(),
    }
}

pub fn is_image_extension(extension: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&extension)
}

/// One exam artifact as received from the caller. Fields stay optional
/// until the pipeline validates them.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub patient_name: Option<String>,
    pub exam_category: Option<ExamCategory>,
    pub file: Option<ExamArtifact>,
}

#[derive(Debug, Clone)]
pub struct ExamArtifact {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

impl ExamArtifact {
    pub fn extension(&self) -> String {
        extension_of(&self.filename)
    }
}

/// Terminal value of a submission.
#[napi(object)]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    /// Canonical name of the stored original
    pub original_filename: String,
    /// Public link to the original
    pub original_link: String,
    /// Name of the annotated copy (image submissions only)
    pub annotated_filename: Option<String>,
    /// Public link to the annotated copy; equals `originalLink` for documents
    pub annotated_link: Option<String>,
    /// Generated description, or the placeholder sentence for documents
    pub description_text: Option<String>,
    /// Set when the image branch failed after the original was stored
    pub image_branch_error: Option<String>,
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ContainerMapError {
    /// Some categories have no container
    #[snafu(display("No container configured for: {}", categories.join(", ")))]
    MissingContainers { categories: Vec<&'static str> },

    /// Unknown exam category {label:?}
    UnknownCategory { label: String },
}

/// Category -> container id mapping. Every category must be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerMap {
    containers: HashMap<ExamCategory, String>,
}

impl ContainerMap {
    pub fn new(containers: HashMap<ExamCategory, String>) -> Result<Self, ContainerMapError> {
        let missing: Vec<&'static str> = ExamCategory::ALL
            .iter()
            .filter(|category| {
                containers
                    .get(category)
                    .map_or(true, |id| id.trim().is_empty())
            })
            .map(|category| category.label())
            .collect();
        ensure!(missing.is_empty(), MissingContainersSnafu { categories: missing });
        Ok(Self { containers })
    }

    /// Build from label-keyed entries as they arrive from JavaScript or JSON.
    pub fn from_labels(entries: &HashMap<String, String>) -> Result<Self, ContainerMapError> {
        let mut containers = HashMap::new();
        for (key, id) in entries {
            let category = ExamCategory::from_label(key)
                .context(UnknownCategorySnafu { label: key.clone() })?;
            containers.insert(category, id.trim().to_string());
        }
        Self::new(containers)
    }

    pub fn container_for(&self, category: ExamCategory) -> &str {
        // construction guarantees every category is present
        self.containers.get(&category).map(String::as_str).unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) fn test_containers() -> ContainerMap {
    let containers = ExamCategory::ALL
        .iter()
        .map(|category| (*category, format!("{}-folder", category.label().replace(' ', "-").to_lowercase())))
        .collect();
    ContainerMap::new(containers).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels_parse() {
        for category in ExamCategory::ALL {
            assert_eq!(ExamCategory::from_label(category.label()), Some(category));
        }
        assert_eq!(ExamCategory::from_label("visual field"), Some(ExamCategory::VisualField));
        assert_eq!(ExamCategory::from_label("DryEyeTopographer"), Some(ExamCategory::DryEyeTopographer));
        assert_eq!(ExamCategory::from_label("Angiography"), None);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("exam.PNG"), ".png");
        assert_eq!(extension_of("scan.final.jpeg"), ".jpeg");
        assert_eq!(extension_of("/tmp/report.pdf"), ".pdf");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".hidden"), "");
    }

    #[test]
    fn test_image_extensions() {
        assert!(is_image_extension(".jpg"));
        assert!(is_image_extension(".png"));
        assert!(!is_image_extension(".pdf"));
        assert!(!is_image_extension(""));
    }

    #[test]
    fn test_container_map_requires_every_category() {
        let mut entries: HashMap<String, String> = ExamCategory::ALL
            .iter()
            .map(|category| (category.label().to_string(), "id".to_string()))
            .collect();
        assert!(ContainerMap::from_labels(&entries).is_ok());

        entries.insert("Biometer".to_string(), "  ".to_string());
        let err = ContainerMap::from_labels(&entries).unwrap_err();
        assert_eq!(err, ContainerMapError::MissingContainers { categories: vec!["Biometer"] });

        entries.remove("Biometer");
        entries.remove("OCT");
        let err = ContainerMap::from_labels(&entries).unwrap_err();
        assert_eq!(err.to_string(), "No container configured for: OCT, Biometer");
    }

    #[test]
    fn test_container_map_rejects_unknown_label() {
        let mut entries = HashMap::new();
        entries.insert("Angiography".to_string(), "id".to_string());
        assert_eq!(
            ContainerMap::from_labels(&entries).unwrap_err(),
            ContainerMapError::UnknownCategory { label: "Angiography".to_string() }
        );
    }

    #[test]
    fn test_container_lookup() {
        let map = test_containers();
        assert_eq!(map.container_for(ExamCategory::VisualField), "visual-field-folder");
    }
}
