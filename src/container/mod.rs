//! Sandbox driver: a thin façade over the Docker daemon.
//!
//! [`SandboxDriver`] owns no state about jobs — it only knows how to
//! create, start, stop, and remove containers, copy a single file into
//! one, and run a script inside it either synchronously (wait for exit)
//! or asynchronously (hand back the hijacked duplex stream). The Job
//! Executor (`crate::job::executor`) is the only caller that sequences
//! these into a job.

pub mod image;

use std::io::Write;

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use tokio::io::AsyncWrite;
use tokio_stream::{Stream, StreamExt};

/// Working directory every sandbox container is configured with.
pub const WORKSPACE_DIR: &str = "/workspace";

/// Errors surfaced unchanged from the Docker client; the driver never retries.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// Any Docker daemon RPC failure (connect, create, start, stop, copy, exec, inspect).
    #[error("docker operation failed: {0}")]
    Docker(#[from] bollard::errors::Error),
    /// Local archive construction failed before reaching the daemon.
    #[error("failed to build archive: {0}")]
    Archive(#[source] std::io::Error),
    /// The daemon started an exec in detached mode when an attached
    /// duplex stream was requested.
    #[error("exec started detached instead of attached")]
    UnexpectedDetached,
}

/// A running or recently-created sandbox, identified by its container id.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    id: String,
}

impl SandboxHandle {
    /// Raw Docker container id backing this sandbox.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Outcome of a synchronous script run inside a sandbox.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    /// Process exit code.
    pub exit_code: i32,
    /// Captured stdout, unbounded and in-memory.
    pub stdout: Vec<u8>,
    /// Captured stderr, unbounded and in-memory.
    pub stderr: Vec<u8>,
}

/// The write half of a hijacked exec stream, and its demultiplexed read half.
pub struct AsyncExec {
    /// Exec id, usable for `inspect_exec` once the stream is drained.
    pub exec_id: String,
    /// Write half for stdin; the caller half-closes it when done writing.
    pub stdin: Box<dyn AsyncWrite + Unpin + Send>,
    /// Demultiplexed stdout/stderr frames as they arrive.
    pub output: Box<dyn Stream<Item = Result<bollard::container::LogOutput, bollard::errors::Error>> + Unpin + Send>,
}

/// Façade over the Docker daemon used to provision and drive one sandbox.
#[derive(Debug, Clone)]
pub struct SandboxDriver {
    docker: Docker,
}

impl SandboxDriver {
    /// Connect to the Docker daemon using the standard environment
    /// (`DOCKER_HOST`, TLS certs, etc.), negotiating the API version.
    ///
    /// # Errors
    ///
    /// Returns an error when the daemon cannot be reached.
    pub fn connect() -> Result<Self, DriverError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// Borrow the underlying client, for components that need direct
    /// daemon access (image builds, network/proxy setup).
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Create a sandbox container from `image` with working directory
    /// `/workspace`, stdin/stdout/stderr attached, and no TTY. A `name`
    /// of `None` lets the daemon assign one.
    pub async fn create(
        &self,
        image: &str,
        env: &[String],
        name: Option<&str>,
    ) -> Result<SandboxHandle, DriverError> {
        let config = ContainerConfig {
            image: Some(image.to_owned()),
            working_dir: Some(WORKSPACE_DIR.to_owned()),
            env: Some(env.to_vec()),
            tty: Some(false),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = name.map(|name| CreateContainerOptions {
            name: name.to_owned(),
            platform: None,
        });

        let response = self.docker.create_container(options, config).await?;
        Ok(SandboxHandle { id: response.id })
    }

    /// Start a created sandbox.
    pub async fn start(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    /// Stop a running sandbox, ignoring "already stopped" errors.
    pub async fn stop(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        match self
            .docker
            .stop_container(&handle.id, None::<StopContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304 | 404,
                ..
            }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a sandbox container, ignoring "already gone" errors. Every
    /// terminal path of the Job Executor calls this so no sandbox
    /// outlives its `JobResponse`.
    pub async fn remove(&self, handle: &SandboxHandle) -> Result<(), DriverError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(&handle.id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Inject a single text file into `dest_dir` inside the sandbox,
    /// streamed through a tar archive (the format the daemon's
    /// copy-to-container endpoint extracts) with the given mode bits.
    pub async fn copy_text(
        &self,
        handle: &SandboxHandle,
        dest_dir: &str,
        file_name: &str,
        content: &[u8],
        mode: u32,
    ) -> Result<(), DriverError> {
        let archive = build_single_file_archive(file_name, content, mode).map_err(DriverError::Archive)?;

        let options = UploadToContainerOptions {
            path: dest_dir.to_owned(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(&handle.id, Some(options), archive.into())
            .await?;
        Ok(())
    }

    /// Run `/bin/bash <path>` inside the sandbox and wait for it to
    /// terminate, demultiplexing stdout/stderr into separate buffers and
    /// then inspecting the exec for its exit code.
    pub async fn exec_sync(&self, handle: &SandboxHandle, path: &str) -> Result<ScriptResult, DriverError> {
        let exec_id = self.create_script_exec(handle, path).await?;

        let started = self
            .docker
            .start_exec(
                &exec_id,
                Some(StartExecOptions {
                    detach: false,
                    tty: false,
                    output_capacity: None,
                }),
            )
            .await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(frame) = output.next().await {
                match frame? {
                    bollard::container::LogOutput::StdOut { message } => stdout.extend_from_slice(&message),
                    bollard::container::LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    bollard::container::LogOutput::Console { message } => stdout.extend_from_slice(&message),
                    bollard::container::LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec_id).await?;
        let exit_code = inspect.exit_code.unwrap_or(-1);
        let exit_code = i32::try_from(exit_code).unwrap_or(-1);

        Ok(ScriptResult {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Run `/bin/bash <path>` inside the sandbox and return immediately
    /// with the hijacked duplex stream. The caller owns writing stdin,
    /// half-closing it, and demultiplexing the read half, all under
    /// whatever deadline it chooses.
    pub async fn exec_async(&self, handle: &SandboxHandle, path: &str) -> Result<AsyncExec, DriverError> {
        let exec_id = self.create_script_exec(handle, path).await?;

        let started = self
            .docker
            .start_exec(
                &exec_id,
                Some(StartExecOptions {
                    detach: false,
                    tty: false,
                    output_capacity: None,
                }),
            )
            .await?;

        match started {
            StartExecResults::Attached { output, input } => Ok(AsyncExec {
                exec_id,
                stdin: Box::new(input),
                output: Box::new(output),
            }),
            StartExecResults::Detached => Err(DriverError::UnexpectedDetached),
        }
    }

    async fn create_script_exec(&self, handle: &SandboxHandle, path: &str) -> Result<String, DriverError> {
        let options = CreateExecOptions {
            cmd: Some(vec!["/bin/bash".to_owned(), path.to_owned()]),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };
        let created = self.docker.create_exec(&handle.id, options).await?;
        Ok(created.id)
    }
}

/// Build a tar archive containing a single file at `file_name` with `mode`
/// bits, suitable for the daemon's copy-to-container extraction.
fn build_single_file_archive(file_name: &str, content: &[u8], mode: u32) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_path(file_name)?;
    header.set_size(u64::try_from(content.len()).unwrap_or(u64::MAX));
    header.set_mode(mode);
    header.set_cksum();
    builder.append(&header, content)?;
    let mut buf = builder.into_inner()?;
    buf.flush()?;
    Ok(buf)
}
