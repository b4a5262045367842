use std::path::PathBuf;
use std::sync::Arc;

use napi::bindgen_prelude::*;
use napi_derive::napi;
use snafu::Report;
use tokio::runtime::Runtime;
use tracing::info;
use warp::Filter;

use crate::config::{build_pipeline, ExamIntakeOptions, StorageBackend, DEFAULT_ROOT_DIR};
use crate::pipeline::SubmissionPipeline;
use crate::utils::init_logging;

mod submissions;

pub use submissions::{routes, MAX_UPLOAD_BYTES};

/**
 * HTTP intake server.
 *
 * Accepts `POST /submissions` as multipart form data with the fields
 * `patientName`, `examCategory` and `file`, and answers with the
 * `SubmissionResult` as JSON. With the filesystem backend it also serves the
 * stored exams under `GET /files/{container}/{filename}` so their links resolve.
 *
 * @example
 * ```typescript
 * import { ExamUploadServer } from '@nuxthealth/node-exam-intake';
 *
 * const server = new ExamUploadServer(8080, {
 *   containers,
 *   storage: { backend: 'Filesystem', rootDir: './exams', publicBaseUrl: 'http://localhost:8080' }
 * });
 * server.start();
 * ```
 */
#[napi]
pub struct ExamUploadServer {
    port: u16,
    pipeline: Arc<SubmissionPipeline>,
    files_root: Option<PathBuf>,
    runtime: Option<Runtime>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

#[napi]
impl ExamUploadServer {
    #[napi(constructor)]
    pub fn new(port: u16, options: ExamIntakeOptions) -> Result<Self> {
        init_logging(options.verbose.unwrap_or(false));

        let pipeline = build_pipeline(&options)
            .map_err(|e| Error::from_reason(Report::from_error(e).to_string()))?;
        let files_root = match options.storage.backend {
            StorageBackend::Filesystem => Some(PathBuf::from(
                options.storage.root_dir.as_deref().unwrap_or(DEFAULT_ROOT_DIR),
            )),
            StorageBackend::S3 => None,
        };

        Ok(Self {
            port,
            pipeline: Arc::new(pipeline),
            files_root,
            runtime: None,
            shutdown_tx: None,
        })
    }

    /// Start listening on all interfaces
    #[napi]
    pub fn start(&mut self) -> Result<()> {
        if self.runtime.is_some() {
            return Err(Error::from_reason("Server is already running"));
        }

        let runtime = Runtime::new()
            .map_err(|e| Error::from_reason(format!("Failed to create runtime: {}", e)))?;

        let routes = routes(self.pipeline.clone(), self.files_root.clone())
            .with(warp::trace::request());
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let (addr, server) = runtime
            .block_on(async {
                warp::serve(routes).try_bind_with_graceful_shutdown(([0, 0, 0, 0], self.port), async {
                    shutdown_rx.await.ok();
                })
            })
            .map_err(|e| Error::from_reason(format!("Failed to bind port {}: {}", self.port, e)))?;
        runtime.spawn(server);
        info!("Exam upload server listening on {}", addr);

        self.runtime = Some(runtime);
        self.shutdown_tx = Some(shutdown_tx);

        Ok(())
    }

    /// Stop the server
    #[napi]
    pub fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
            info!("Exam upload server stopped");
        }
        Ok(())
    }
}
