//! Local named channel used as the bridge wire.
//!
//! Windows uses a single-instance named pipe at `\\.\pipe\<name>`. Unix uses
//! a domain socket at `<temp dir>/<name>.sock`. On both, the listening end
//! exists only while no peer is attached, so a second peer is refused by the
//! channel itself.

use std::io::Error as IoError;
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};

pub(crate) type ChannelReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type ChannelWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Platform address for a channel name.
pub fn channel_address(name: &str) -> PathBuf {
    platform::address(name)
}

/// Wait for exactly one peer on `name` and return its split stream.
pub(crate) async fn accept_one(name: &str) -> Result<(ChannelReader, ChannelWriter), IoError> {
    platform::accept_one(name).await
}

/// Attempt a single connection to `name`.
pub(crate) async fn open(name: &str) -> Result<(ChannelReader, ChannelWriter), IoError> {
    platform::open(name).await
}

/// Errors meaning "nobody is listening yet", worth polling through until the
/// connect timeout.
pub(crate) fn is_not_ready(error: &IoError) -> bool {
    platform::is_not_ready(error)
}

#[cfg(unix)]
mod platform {
    use super::{ChannelReader, ChannelWriter};

    use std::io::{Error as IoError, ErrorKind};
    use std::path::PathBuf;

    use log::{debug, warn};
    use tokio::net::{UnixListener, UnixStream};

    const SOCKET_EXTENSION: &str = "sock";

    pub(super) fn address(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{name}.{SOCKET_EXTENSION}"))
    }

    /// Removes the socket file when the listening end goes away.
    struct SocketFile(PathBuf);

    impl Drop for SocketFile {
        fn drop(&mut self) {
            if let Err(e) = std::fs::remove_file(&self.0) {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove socket {}: {e}", self.0.display());
                }
            }
        }
    }

    pub(super) async fn accept_one(name: &str) -> Result<(ChannelReader, ChannelWriter), IoError> {
        let path = address(name);

        if path.exists() {
            debug!("Removing stale socket {}", path.display());
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        let socket_file = SocketFile(path);

        let (stream, _) = listener.accept().await?;

        // Unbind before serving so further peers are refused.
        drop(listener);
        drop(socket_file);

        let (reader, writer) = stream.into_split();
        Ok((Box::new(reader), Box::new(writer)))
    }

    pub(super) async fn open(name: &str) -> Result<(ChannelReader, ChannelWriter), IoError> {
        let stream = UnixStream::connect(address(name)).await?;
        let (reader, writer) = stream.into_split();
        Ok((Box::new(reader), Box::new(writer)))
    }

    pub(super) fn is_not_ready(error: &IoError) -> bool {
        matches!(
            error.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused
        )
    }
}

#[cfg(windows)]
mod platform {
    use super::{ChannelReader, ChannelWriter};

    use std::io::{Error as IoError, ErrorKind};
    use std::path::PathBuf;

    use tokio::io::split;
    use tokio::net::windows::named_pipe::{ClientOptions, ServerOptions};

    const PIPE_NAMESPACE: &str = r"\\.\pipe\";

    /// `ERROR_PIPE_BUSY`: the single instance is held by another peer.
    const ERROR_PIPE_BUSY: i32 = 231;

    pub(super) fn address(name: &str) -> PathBuf {
        PathBuf::from(format!("{PIPE_NAMESPACE}{name}"))
    }

    pub(super) async fn accept_one(name: &str) -> Result<(ChannelReader, ChannelWriter), IoError> {
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .max_instances(1)
            .create(address(name))?;

        server.connect().await?;

        let (reader, writer) = split(server);
        Ok((Box::new(reader), Box::new(writer)))
    }

    pub(super) async fn open(name: &str) -> Result<(ChannelReader, ChannelWriter), IoError> {
        let client = ClientOptions::new().open(address(name))?;
        let (reader, writer) = split(client);
        Ok((Box::new(reader), Box::new(writer)))
    }

    pub(super) fn is_not_ready(error: &IoError) -> bool {
        error.kind() == ErrorKind::NotFound || error.raw_os_error() == Some(ERROR_PIPE_BUSY)
    }
}
