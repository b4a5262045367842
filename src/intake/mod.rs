use std::sync::Arc;

use napi::bindgen_prelude::{AsyncTask, Buffer};
use napi::{Env, Task};
use snafu::Report;
use tokio::runtime::Runtime;
use tracing::{error, info};

use crate::config::{build_pipeline, ExamIntakeOptions};
use crate::exam::{ExamArtifact, ExamCategory, Submission, SubmissionResult};
use crate::pipeline::{Error as PipelineError, SubmissionPipeline};
use crate::utils::init_logging;

lazy_static::lazy_static! {
    static ref RUNTIME: Runtime = Runtime::new().unwrap();
}

/// Uploaded exam file
#[napi(object)]
pub struct ExamFile {
    /// File contents
    pub data: Buffer,
    /// Declared mime type (e.g. "image/png", "application/pdf")
    pub mime_type: String,
    /// Original file name, used for the extension
    pub filename: String,
}

/**
 * One exam submission. All fields are validated before anything is uploaded.
 */
#[napi(object)]
pub struct ExamSubmission {
    /// Full patient name
    pub patient_name: Option<String>,
    /// Exam category
    pub exam_category: Option<ExamCategory>,
    /// Exam image or PDF
    pub file: Option<ExamFile>,
}

impl From<ExamSubmission> for Submission {
    fn from(value: ExamSubmission) -> Self {
        Submission {
            patient_name: value.patient_name,
            exam_category: value.exam_category,
            file: value.file.map(|file| ExamArtifact {
                data: file.data.to_vec(),
                mime_type: file.mime_type,
                filename: file.filename,
            }),
        }
    }
}

/// Render a pipeline error for JavaScript callers, prefixed with its kind
fn to_napi_error(e: &PipelineError) -> napi::Error {
    let kind = if e.is_validation() {
        "ValidationError"
    } else {
        match e {
            PipelineError::Storage { .. } => "StorageError",
            PipelineError::Description { .. } => "DescriptionError",
            _ => "AnnotationError",
        }
    };
    napi::Error::from_reason(format!("{}: {}", kind, Report::from_error(e)))
}

pub struct SubmitTask {
    pipeline: Arc<SubmissionPipeline>,
    submission: Option<Submission>,
}

impl Task for SubmitTask {
    type Output = SubmissionResult;
    type JsValue = SubmissionResult;

    fn compute(&mut self) -> napi::Result<Self::Output> {
        let submission = self.submission.take().unwrap_or_default();
        let pipeline = self.pipeline.clone();
        RUNTIME
            .block_on(async move { pipeline.submit(submission).await })
            .map_err(|e| {
                error!("{}", Report::from_error(&e));
                to_napi_error(&e)
            })
    }

    fn resolve(&mut self, _env: Env, output: Self::Output) -> napi::Result<Self::JsValue> {
        Ok(output)
    }
}

pub struct CheckStorageTask {
    pipeline: Arc<SubmissionPipeline>,
}

impl Task for CheckStorageTask {
    type Output = Vec<String>;
    type JsValue = Vec<String>;

    fn compute(&mut self) -> napi::Result<Self::Output> {
        let pipeline = self.pipeline.clone();
        RUNTIME.block_on(async move {
            let mut unreachable = Vec::new();
            for category in ExamCategory::ALL {
                let container = pipeline.config().containers.container_for(category);
                if let Err(e) = pipeline.store().check_container(container).await {
                    error!("{}", Report::from_error(&e));
                    unreachable.push(container.to_string());
                }
            }
            Ok(unreachable)
        })
    }

    fn resolve(&mut self, _env: Env, output: Self::Output) -> napi::Result<Self::JsValue> {
        Ok(output)
    }
}

/**
 * Exam intake pipeline.
 *
 * Stores the exam under a canonical name, and for images asks a vision model
 * for a technical description, burns it into the image and stores the
 * annotated copy next to the original.
 *
 * @example
 * ```typescript
 * import { ExamIntake } from '@nuxthealth/node-exam-intake';
 *
 * const intake = new ExamIntake({ containers, storage: { backend: 'Filesystem', rootDir: './exams' } });
 *
 * const result = await intake.submit({
 *   patientName: 'Maria Silva',
 *   examCategory: 'Oct',
 *   file: { data: fs.readFileSync('exam.png'), mimeType: 'image/png', filename: 'exam.png' }
 * });
 * console.log(result.originalLink, result.annotatedLink, result.descriptionText);
 * ```
 */
#[napi]
pub struct ExamIntake {
    pipeline: Arc<SubmissionPipeline>,
}

#[napi]
impl ExamIntake {
    /**
     * Create a new intake pipeline.
     *
     * @param options - Containers, storage backend and vision model settings
     * @throws Error if a category has no container or the backend is misconfigured
     */
    #[napi(constructor)]
    pub fn new(options: ExamIntakeOptions) -> napi::Result<Self> {
        init_logging(options.verbose.unwrap_or(false));

        let pipeline = build_pipeline(&options)
            .map_err(|e| napi::Error::from_reason(Report::from_error(e).to_string()))?;
        info!("Exam intake configured with {:?} storage", options.storage.backend);

        Ok(ExamIntake {
            pipeline: Arc::new(pipeline),
        })
    }

    /**
     * Submit one exam.
     *
     * @returns Links of the stored original and, for images, the annotated copy
     * @throws Error prefixed with ValidationError, StorageError, DescriptionError or AnnotationError
     */
    #[napi(ts_return_type = "Promise<SubmissionResult>")]
    pub fn submit(&self, submission: ExamSubmission) -> AsyncTask<SubmitTask> {
        AsyncTask::new(SubmitTask {
            pipeline: self.pipeline.clone(),
            submission: Some(submission.into()),
        })
    }

    /**
     * Check that every configured container is reachable.
     *
     * @returns Container ids that could not be reached (empty when all are fine)
     */
    #[napi(ts_return_type = "Promise<Array<string>>")]
    pub fn check_storage(&self) -> AsyncTask<CheckStorageTask> {
        AsyncTask::new(CheckStorageTask {
            pipeline: self.pipeline.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::describe::DescriptionError;
    use crate::pipeline::Stage;
    use crate::storage::StorageError;

    #[test]
    fn test_error_kind_prefix() {
        let validation = PipelineError::MissingField { field: "patientName" };
        assert!(to_napi_error(&validation).reason.starts_with("ValidationError: Missing required field: patientName"));

        let storage = PipelineError::Storage {
            stage: Stage::UploadOriginal,
            source: StorageError::InvalidName { name: "".to_string() },
        };
        assert!(to_napi_error(&storage).reason.starts_with("StorageError: "));

        let description = PipelineError::Description { source: DescriptionError::EmptyResponse };
        assert!(to_napi_error(&description).reason.starts_with("DescriptionError: "));
    }

    #[test]
    fn test_submission_conversion() {
        let submission: Submission = ExamSubmission {
            patient_name: Some("Maria Silva".to_string()),
            exam_category: Some(ExamCategory::Oct),
            file: Some(ExamFile {
                data: vec![1u8, 2, 3].into(),
                mime_type: "application/pdf".to_string(),
                filename: "report.pdf".to_string(),
            }),
        }
        .into();
        let file = submission.file.unwrap();
        assert_eq!(file.data, vec![1, 2, 3]);
        assert_eq!(file.extension(), ".pdf");
        assert_eq!(submission.exam_category, Some(ExamCategory::Oct));
    }
}
