pub mod s3;
pub mod filename;
pub mod helpers;
pub mod image_processing;

use tracing_subscriber::EnvFilter;

// Re-export commonly used items
pub use s3::{S3Config, build_s3_bucket, check_s3_connectivity, s3_presign_get, s3_put_object_stream, with_public_read_acl};
pub use filename::{annotated_filename, derive_filename, derive_for_today, ANNOTATED_SUFFIX};
pub use helpers::*;
pub use image_processing::{decode_image, encode_jpeg, mime_for_extension, JPEG_QUALITY};

/// Install the global tracing subscriber.
///
/// It can only be set once per process; later calls are ignored. `RUST_LOG`
/// wins over the verbose flag.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            if verbose {
                EnvFilter::new("debug")
            } else {
                EnvFilter::new("error")
            }
        });

    let _ = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .finish(),
    );
}
