use async_trait::async_trait;
use snafu::prelude::*;

use crate::exam::ExamCategory;

mod openai;

pub use openai::{OpenAiDescriber, DEFAULT_ENDPOINT, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DescriptionError {
    /// No API key configured for the inference provider
    MissingApiKey,

    /// Could not build HTTP client
    Client { source: reqwest::Error },

    /// Inference request failed
    Request { source: reqwest::Error },

    /// Inference provider answered HTTP {status}: {body}
    Status { status: u16, body: String },

    /// Malformed inference response
    Decode { source: reqwest::Error },

    /// Inference response carried no completion text
    EmptyResponse,
}

/// Produces a technical description of an exam image. Output is not deterministic.
#[async_trait]
pub trait VisionDescriber: Send + Sync {
    async fn describe(
        &self,
        image: &[u8],
        mime_type: &str,
        category: ExamCategory,
    ) -> Result<String, DescriptionError>;
}

/// System instruction sent with every image
pub fn system_prompt(category: ExamCategory) -> String {
    format!(
        "You are an assistant specialised in the technical description of ophthalmic exams. \
         Technically describe the image of a {} exam without issuing a diagnosis.",
        category.label()
    )
}
