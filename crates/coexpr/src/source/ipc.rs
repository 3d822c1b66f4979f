use super::{BatchSource, BatchStream, ColumnarBatch};
use crate::{Error, PipelineRequest, Result};
use arrow::ipc::reader::FileReader;
use core::future::Future;
use futures::StreamExt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;

/// File extension of profile files under the data directory.
pub const PROFILE_FILE_EXTENSION: &str = "arrow";

/// Serves each profile from `<data_dir>/<profile_id>.arrow`, an Arrow IPC file.
///
/// Decoding runs on a blocking thread that hands batches over one at a time,
/// so at most one decoded batch waits for the pipeline to pick it up.
#[derive(Debug, Clone)]
pub struct IpcDirectorySource {
    data_dir: PathBuf,
}

impl IpcDirectorySource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn profile_path(&self, profile_id: &str) -> Result<PathBuf> {
        validate_profile_id(profile_id)?;
        Ok(self
            .data_dir
            .join(format!("{profile_id}.{PROFILE_FILE_EXTENSION}")))
    }
}

impl BatchSource for IpcDirectorySource {
    fn fetch(&self, request: &PipelineRequest) -> impl Future<Output = Result<BatchStream>> + Send {
        let path = self.profile_path(&request.profile_id);

        async move {
            let path = path?;
            let (batch_tx, batch_rx) = mpsc::channel(1);
            let (opened_tx, opened_rx) = oneshot::channel();

            tokio::task::spawn_blocking(move || {
                let reader = match open_reader(&path) {
                    Ok(reader) => {
                        let _ = opened_tx.send(Ok(()));
                        reader
                    }
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };

                for batch in reader {
                    let item = batch.map(ColumnarBatch::new).map_err(Error::from);
                    let failed = item.is_err();
                    // A closed channel means the pipeline stopped listening.
                    if batch_tx.blocking_send(item).is_err() || failed {
                        break;
                    }
                }
            });

            opened_rx.await.map_err(|_| Error::ChannelError {
                context: "IPC reader exited before opening the profile".to_string(),
            })??;

            Ok(ReceiverStream::new(batch_rx).boxed())
        }
    }
}

fn open_reader(path: &Path) -> Result<FileReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| Error::Source {
        context: format!("failed to open {}: {e}", path.display()),
    })?;
    FileReader::try_new(BufReader::new(file), None).map_err(|e| Error::Source {
        context: format!("failed to read {}: {e}", path.display()),
    })
}

/// Profile ids become file names, so only a conservative character set is
/// accepted.
fn validate_profile_id(profile_id: &str) -> Result<()> {
    let valid = !profile_id.is_empty()
        && !profile_id.starts_with('.')
        && profile_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidRequest {
            reason: format!("invalid molecular profile id `{profile_id}`"),
        })
    }
}
