use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Buf;
use futures::TryStreamExt;
use serde_json::json;
use snafu::prelude::*;
use snafu::Report;
use tracing::{debug, error, warn};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::{reply::Response, Filter, Reply};

use crate::exam::{ExamArtifact, ExamCategory, Submission};
use crate::pipeline::{Error as PipelineError, SubmissionPipeline};

/// Largest accepted multipart body
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Snafu)]
enum FormError {
    /// Malformed multipart body
    Multipart { source: warp::Error },

    /// Form field {field} is not valid UTF-8
    NotUtf8 {
        field: &'static str,
        source: std::string::FromUtf8Error,
    },
}

/// `POST /submissions` and, for the filesystem backend, `GET /files/{container}/{filename}`
pub fn routes(pipeline: Arc<SubmissionPipeline>, files_root: Option<PathBuf>) -> BoxedFilter<(Response,)> {
    let submit = warp::path!("submissions")
        .and(warp::post())
        .and(warp::multipart::form().max_length(MAX_UPLOAD_BYTES))
        .and(warp::any().map(move || pipeline.clone()))
        .and_then(handle_submission);

    match files_root {
        Some(root) => {
            let files = warp::path("files")
                .and(warp::get())
                .and(warp::fs::dir(root))
                .map(|file: warp::fs::File| file.into_response());
            submit.or(files).unify().boxed()
        }
        None => submit.boxed(),
    }
}

async fn handle_submission(
    form: FormData,
    pipeline: Arc<SubmissionPipeline>,
) -> Result<Response, Infallible> {
    let submission = match read_submission(form).await {
        Ok(submission) => submission,
        Err(e) => {
            let report = Report::from_error(&e).to_string();
            warn!("Rejected form: {}", report);
            return Ok(error_reply(StatusCode::BAD_REQUEST, report, None));
        }
    };

    match pipeline.submit(submission).await {
        Ok(result) => Ok(warp::reply::with_status(warp::reply::json(&result), StatusCode::OK).into_response()),
        Err(e) => {
            let report = Report::from_error(&e).to_string();
            let status = status_for(&e);
            if status == StatusCode::BAD_REQUEST {
                debug!("Rejected submission: {}", report);
            } else {
                error!("Submission failed: {}", report);
            }
            Ok(error_reply(status, report, e.stage().map(|stage| stage.to_string())))
        }
    }
}

fn status_for(e: &PipelineError) -> StatusCode {
    if e.is_validation() {
        return StatusCode::BAD_REQUEST;
    }
    match e {
        PipelineError::Storage { .. } | PipelineError::Description { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(status: StatusCode, message: String, stage: Option<String>) -> Response {
    warp::reply::with_status(warp::reply::json(&json!({ "error": message, "stage": stage })), status)
        .into_response()
}

/// Collect the form fields. Unknown fields are ignored; an unknown category
/// is left unset so validation reports it.
async fn read_submission(form: FormData) -> Result<Submission, FormError> {
    let mut submission = Submission::default();
    let mut parts = Box::pin(form);

    while let Some(part) = parts.try_next().await.context(MultipartSnafu)? {
        let name = part.name().to_string();
        match name.as_str() {
            "patientName" => {
                let value = read_text(part, "patientName").await?;
                submission.patient_name = Some(value);
            }
            "examCategory" => {
                let value = read_text(part, "examCategory").await?;
                submission.exam_category = ExamCategory::from_label(&value);
                if submission.exam_category.is_none() {
                    debug!("Unknown exam category {:?}", value);
                }
            }
            "file" => {
                let filename = part.filename().unwrap_or_default().to_string();
                let mime_type = part.content_type().unwrap_or_default().to_string();
                let data = read_bytes(part).await.context(MultipartSnafu)?;
                debug!("Received {} ({} bytes, {:?})", filename, data.len(), mime_type);
                submission.file = Some(ExamArtifact { data, mime_type, filename });
            }
            other => debug!("Ignoring form field {}", other),
        }
    }

    Ok(submission)
}

async fn read_bytes(part: Part) -> Result<Vec<u8>, warp::Error> {
    part.stream()
        .try_fold(Vec::new(), |mut data, chunk| async move {
            data.extend_from_slice(chunk.chunk());
            Ok(data)
        })
        .await
}

async fn read_text(part: Part, field: &'static str) -> Result<String, FormError> {
    let data = read_bytes(part).await.context(MultipartSnafu)?;
    let text = String::from_utf8(data).context(NotUtf8Snafu { field })?;
    Ok(text.trim().to_string())
}
