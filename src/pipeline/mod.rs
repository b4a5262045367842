use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{Local, NaiveDate};
use snafu::prelude::*;
use snafu::Report;
use tracing::{debug, error, info, warn};

use crate::annotate::{AnnotateError, Annotator};
use crate::config::{IntakeConfig, NON_IMAGE_PLACEHOLDER};
use crate::describe::{DescriptionError, VisionDescriber};
use crate::exam::{is_image_extension, ExamCategory, Submission, SubmissionResult};
use crate::storage::{byte_stream, ObjectStore, StorageError};
use crate::utils::{annotated_filename, derive_filename, mime_for_extension};

/// Externally visible step of a submission, used in error reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    UploadOriginal,
    Describe,
    Annotate,
    UploadAnnotated,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::UploadOriginal => "uploading original",
            Stage::Describe => "describing image",
            Stage::Annotate => "annotating image",
            Stage::UploadAnnotated => "uploading annotated copy",
        })
    }
}

/// Progress of one submission. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SubmissionState {
    Validated,
    OriginalUploaded,
    DescribedAndAnnotated,
    AnnotatedUploaded,
    Finished,
}

#[derive(Debug, Snafu)]
pub enum Error {
    /// Missing required field: {field}
    MissingField { field: &'static str },

    /// Patient name {name:?} must not contain path separators
    InvalidPatientName { name: String },

    /// Storage failure while {stage}
    Storage { stage: Stage, source: StorageError },

    /// Description failed
    Description { source: DescriptionError },

    /// Annotation failed
    Annotate { source: AnnotateError },

    /// Annotation task did not complete
    AnnotateTask { source: tokio::task::JoinError },
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::MissingField { .. } | Error::InvalidPatientName { .. })
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::MissingField { .. } | Error::InvalidPatientName { .. } => None,
            Error::Storage { stage, .. } => Some(*stage),
            Error::Description { .. } => Some(Stage::Describe),
            Error::Annotate { .. } | Error::AnnotateTask { .. } => Some(Stage::Annotate),
        }
    }
}

/// Validated submission fields
struct ValidSubmission {
    patient_name: String,
    category: ExamCategory,
    data: Bytes,
    mime_type: String,
    extension: String,
}

fn validate(submission: Submission) -> Result<ValidSubmission, Error> {
    let patient_name = submission
        .patient_name
        .filter(|name| !name.trim().is_empty())
        .context(MissingFieldSnafu { field: "patientName" })?;
    // the name becomes part of the object name
    ensure!(
        !patient_name.contains(['/', '\\', '\0']),
        InvalidPatientNameSnafu { name: patient_name.clone() }
    );
    let category = submission
        .exam_category
        .context(MissingFieldSnafu { field: "examCategory" })?;
    let file = submission
        .file
        .filter(|file| !file.data.is_empty())
        .context(MissingFieldSnafu { field: "file" })?;

    let extension = file.extension();

    let mime_type = if file.mime_type.trim().is_empty() {
        mime_for_extension(&extension)
            .unwrap_or("application/octet-stream")
            .to_string()
    } else {
        file.mime_type.trim().to_string()
    };

    Ok(ValidSubmission {
        patient_name,
        category,
        data: Bytes::from(file.data),
        mime_type,
        extension,
    })
}

/// Outcome of the image branch, filled as far as it got
#[derive(Default)]
struct ImageBranch {
    annotated_filename: Option<String>,
    description: Option<String>,
    annotated_link: Option<String>,
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// The submission pipeline: upload original, then describe, annotate and
/// upload the annotated copy for images.
///
/// The original upload is the commit point. Failures after it are reported in
/// [`SubmissionResult::image_branch_error`] unless `strict_image_branch` is set,
/// in which case they are returned as errors. Uploaded objects are never rolled back.
pub struct SubmissionPipeline {
    store: Arc<dyn ObjectStore>,
    describer: Arc<dyn VisionDescriber>,
    annotator: Arc<Annotator>,
    config: IntakeConfig,
    today: Clock,
}

impl SubmissionPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        describer: Arc<dyn VisionDescriber>,
        annotator: Arc<Annotator>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            store,
            describer,
            annotator,
            config,
            today: Arc::new(|| Local::now().date_naive()),
        }
    }

    /// Replace the calendar used for filenames
    pub fn with_clock(mut self, today: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.today = Arc::new(today);
        self
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn submit(&self, submission: Submission) -> Result<SubmissionResult, Error> {
        let submission = validate(submission)?;
        let mut state = SubmissionState::Validated;

        let filename = derive_filename(
            &submission.patient_name,
            submission.category,
            (self.today)(),
            &submission.extension,
        );
        let container = self.config.containers.container_for(submission.category);
        info!(
            "Submitting {} exam as {} into container {}",
            submission.category, filename, container
        );

        let original_link = self
            .store_object(submission.data.clone(), &filename, &submission.mime_type, container)
            .await
            .context(StorageSnafu { stage: Stage::UploadOriginal })?;
        advance(&mut state, SubmissionState::OriginalUploaded);

        if !is_image_extension(&submission.extension) {
            debug!("{} is not an image, skipping description", filename);
            advance(&mut state, SubmissionState::Finished);
            return Ok(SubmissionResult {
                original_filename: filename,
                annotated_link: Some(original_link.clone()),
                original_link,
                annotated_filename: None,
                description_text: Some(NON_IMAGE_PLACEHOLDER.to_string()),
                image_branch_error: None,
            });
        }

        let mut branch = ImageBranch::default();
        let outcome = self
            .run_image_branch(&submission, &filename, container, &mut branch, &mut state)
            .await;

        let image_branch_error = match outcome {
            Ok(()) => None,
            Err(e) if self.config.strict_image_branch => {
                error!("Image branch of {} failed: {}", filename, Report::from_error(&e));
                return Err(e);
            }
            Err(e) => {
                let report = Report::from_error(&e).to_string();
                warn!("Image branch of {} failed, returning original only: {}", filename, report);
                Some(report)
            }
        };
        advance(&mut state, SubmissionState::Finished);

        Ok(SubmissionResult {
            original_filename: filename,
            original_link,
            annotated_filename: branch.annotated_filename,
            annotated_link: branch.annotated_link,
            description_text: branch.description,
            image_branch_error,
        })
    }

    async fn run_image_branch(
        &self,
        submission: &ValidSubmission,
        filename: &str,
        container: &str,
        branch: &mut ImageBranch,
        state: &mut SubmissionState,
    ) -> Result<(), Error> {
        let description = self
            .describer
            .describe(&submission.data, &submission.mime_type, submission.category)
            .await
            .context(DescriptionSnafu)?;
        branch.description = Some(description.clone());

        let annotator = self.annotator.clone();
        let data = submission.data.clone();
        let annotated = tokio::task::spawn_blocking(move || annotator.annotate_to_jpeg(&data, &description))
            .await
            .context(AnnotateTaskSnafu)?
            .context(AnnotateSnafu)?;
        advance(state, SubmissionState::DescribedAndAnnotated);

        let annotated_name = annotated_filename(filename, &submission.extension);
        branch.annotated_filename = Some(annotated_name.clone());
        let link = self
            .store_object(Bytes::from(annotated), &annotated_name, "image/jpeg", container)
            .await
            .context(StorageSnafu { stage: Stage::UploadAnnotated })?;
        branch.annotated_link = Some(link);
        advance(state, SubmissionState::AnnotatedUploaded);

        Ok(())
    }

    /// Upload then grant public read; the returned link is the shareable one
    async fn store_object(
        &self,
        data: Bytes,
        name: &str,
        mime_type: &str,
        container: &str,
    ) -> Result<String, StorageError> {
        let object = self
            .store
            .upload(byte_stream(data), name, mime_type, container)
            .await?;
        self.store.grant_public(&object).await
    }
}

fn advance(state: &mut SubmissionState, next: SubmissionState) {
    debug_assert!(next > *state, "submission state moved backwards");
    debug!("Submission {:?} -> {:?}", state, next);
    *state = next;
}
