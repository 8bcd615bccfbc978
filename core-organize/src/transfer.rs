//! Asset Transfer
//!
//! Moves or copies a single file into a destination folder. An existing file
//! at the destination is never replaced, even one that appears while the
//! transfer is running: a move links the destination before unlinking the
//! source, and a copy opens the destination with `create_new`.

use crate::error::TransferFailure;
use core_runtime::config::TransferMode;
use filetime::{set_file_mtime, FileTime};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

type TransferResult<T> = std::result::Result<T, TransferFailure>;

/// Place `source` into `dest_folder` under its own file name.
///
/// Returns the new path. A name clash yields [`TransferFailure::Collision`]
/// with both files left untouched.
pub async fn place(source: &Path, dest_folder: &Path, mode: TransferMode) -> TransferResult<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| TransferFailure::Io {
        reason: format!("{} has no file name", source.display()),
    })?;
    let destination = dest_folder.join(file_name);

    if tokio::fs::try_exists(&destination).await.map_err(io_failure)? {
        return Err(TransferFailure::Collision { path: destination });
    }

    match mode {
        TransferMode::Move => move_file(source, &destination).await?,
        TransferMode::Copy => copy_preserving_mtime(source, &destination).await?,
    }

    debug!(
        from = %source.display(),
        to = %destination.display(),
        mode = mode.as_str(),
        "File placed"
    );
    Ok(destination)
}

/// Hard-link then unlink the source, falling back to copy + delete when
/// linking is refused (across filesystems, or on filesystems without links).
async fn move_file(source: &Path, destination: &Path) -> TransferResult<()> {
    match tokio::fs::hard_link(source, destination).await {
        Ok(()) => {
            if let Err(e) = tokio::fs::remove_file(source).await {
                warn!(path = %source.display(), error = %e, "Linked but could not remove source");
                tokio::fs::remove_file(destination).await.ok();
                return Err(io_failure(e));
            }
            return Ok(());
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(TransferFailure::Collision {
                path: destination.to_path_buf(),
            });
        }
        Err(e) => debug!(error = %e, "Hard link refused, copying instead"),
    }

    copy_preserving_mtime(source, destination).await?;

    if let Err(e) = tokio::fs::remove_file(source).await {
        warn!(path = %source.display(), error = %e, "Copied but could not remove source");
        // Undo so the file exists in exactly one place.
        tokio::fs::remove_file(destination).await.ok();
        return Err(io_failure(e));
    }

    Ok(())
}

async fn copy_preserving_mtime(source: &Path, destination: &Path) -> TransferResult<()> {
    let metadata = tokio::fs::metadata(source).await.map_err(io_failure)?;
    let mut reader = tokio::fs::File::open(source).await.map_err(io_failure)?;

    let mut writer = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            return Err(TransferFailure::Collision {
                path: destination.to_path_buf(),
            });
        }
        Err(e) => return Err(io_failure(e)),
    };

    let copied = async {
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        writer.sync_all().await
    }
    .await;
    drop(writer);
    if let Err(e) = copied {
        tokio::fs::remove_file(destination).await.ok();
        return Err(io_failure(e));
    }

    if let Err(e) = tokio::fs::set_permissions(destination, metadata.permissions()).await {
        warn!(path = %destination.display(), error = %e, "Failed to copy permissions");
    }

    let mtime = FileTime::from_last_modification_time(&metadata);
    if let Err(e) = set_file_mtime(destination, mtime) {
        warn!(path = %destination.display(), error = %e, "Failed to preserve modification time");
    }

    Ok(())
}

fn io_failure(error: std::io::Error) -> TransferFailure {
    TransferFailure::Io {
        reason: error.to_string(),
    }
}
