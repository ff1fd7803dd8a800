// ABOUTME: Named-pipe side channel the guest reports its status token through.
// ABOUTME: Created and opened for reading before the container exists; removed after.

use crate::types::ImageId;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Upper bound on what we are willing to read back from the guest.
const MAX_TOKEN_BYTES: usize = 4096;

/// A host fifo, mode 0600, bind-mounted into one ephemeral container.
///
/// The read end is opened non-blocking in `create`, strictly before the
/// container starts: a writer that opens the fifo later always finds a
/// reader, and nothing it writes can be lost.
#[derive(Debug)]
pub struct StatusChannel {
    path: PathBuf,
    reader: Option<File>,
    removed: bool,
}

impl StatusChannel {
    /// Create the fifo for `image` under `dir` and open its read end.
    pub fn create(dir: &Path, image: &ImageId) -> io::Result<Self> {
        let path = dir.join(format!(
            "reimage-{}-{}.status",
            image.short(),
            std::process::id()
        ));

        // Leftover from an earlier run that reused our pid.
        if path.symlink_metadata().is_ok() {
            std::fs::remove_file(&path)?;
        }

        nix::unistd::mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(io::Error::from)?;

        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&path);

        match reader {
            Ok(reader) => Ok(Self {
                path,
                reader: Some(reader),
                removed: false,
            }),
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                Err(e)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drain whatever the guest wrote. Never blocks.
    ///
    /// Stops at end of stream, or when a writer still holds the fifo open
    /// with nothing buffered.
    pub fn read_token(&mut self) -> Vec<u8> {
        let mut collected = Vec::new();
        let Some(reader) = self.reader.as_mut() else {
            return collected;
        };

        let mut chunk = [0u8; 512];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    collected.extend_from_slice(&chunk[..n]);
                    if collected.len() >= MAX_TOKEN_BYTES {
                        collected.truncate(MAX_TOKEN_BYTES);
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::debug!(path = %self.path.display(), "status channel read failed: {}", e);
                    break;
                }
            }
        }
        collected
    }

    /// Close the read end and delete the fifo.
    pub fn close(mut self) -> io::Result<()> {
        self.reader.take();
        self.removed = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for StatusChannel {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
