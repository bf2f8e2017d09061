//! One-shot sandbox image build from a build-context directory.

use std::path::Path;

use bollard::image::BuildImageOptions;
use bollard::models::BuildInfo;
use bollard::Docker;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error};

use super::DriverError;

/// Pack `build_context_dir` into a tar archive, submit it to the daemon's
/// image-build endpoint tagged `image_name`, and consume the
/// newline-delimited JSON progress stream until it ends or an error
/// frame arrives. Idempotent at the daemon layer — layer reuse is the
/// daemon's concern, not ours.
///
/// # Errors
///
/// Returns an error if the directory cannot be walked, the daemon
/// connection fails, or the build stream reports an error frame.
pub async fn build_image(
    docker: &Docker,
    build_context_dir: &Path,
    image_name: &str,
) -> Result<(), DriverError> {
    let archive = create_build_context(build_context_dir).map_err(DriverError::Archive)?;

    let options = BuildImageOptions {
        dockerfile: "Dockerfile",
        t: image_name,
        rm: true,
        ..Default::default()
    };

    let stream = docker.build_image(options, None, Some(archive.into()));
    drain_build_stream(image_name, stream).await
}

/// Consume a build-image response stream until it ends or an error frame
/// arrives. Stream frames are logged at `debug`; an error frame aborts
/// with its message. Factored out of [`build_image`] so the frame
/// handling is testable against a synthetic stream, without a daemon.
async fn drain_build_stream(
    image_name: &str,
    mut stream: impl Stream<Item = Result<BuildInfo, bollard::errors::Error>> + Unpin,
) -> Result<(), DriverError> {
    while let Some(frame) = stream.next().await {
        let info = frame?;
        if let Some(error) = info.error {
            error!(image = image_name, %error, "image build failed");
            return Err(DriverError::Archive(std::io::Error::other(error)));
        }
        if let Some(text) = info.stream {
            debug!(image = image_name, message = %text.trim_end(), "image build output");
        }
    }

    Ok(())
}

/// Walk `dir` recursively, adding every regular file to a tar archive
/// with paths rewritten relative to `dir`'s root.
fn create_build_context(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    append_dir_contents(&mut builder, dir, dir)?;
    let mut buf = builder.into_inner()?;
    std::io::Write::flush(&mut buf)?;
    Ok(buf)
}

fn append_dir_contents(
    builder: &mut tar::Builder<Vec<u8>>,
    root: &Path,
    dir: &Path,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            append_dir_contents(builder, root, &path)?;
        } else if file_type.is_file() {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            builder.append_path_with_name(&path, relative)?;
        }
    }
    Ok(())
}
