//! Feed state: documents, dedup index, alternate bodies and cleanup.

pub mod aggregate;
pub mod alternates;
pub mod dedup;
pub mod document;
pub mod reconciler;

use std::fs;
use std::io::Write;
use std::path::Path;

use rand::Rng;

use crate::error::ArtifactError;

pub use aggregate::{CycleContext, CycleOutcome, FeedAggregate, run_cycle};
pub use alternates::{AlternateCache, AlternateId};
pub use dedup::{DedupIndex, SeenMailIds};
pub use document::{Entry, EntryBody, FeedDocument};
pub use reconciler::{PruneReport, Reconciler};

const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric string of `len` characters.
pub fn random_token(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

/// Write via a sibling temp file and rename, so readers never see half a file.
pub fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), ArtifactError> {
    let write_err = |source| ArtifactError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    fs::rename(&temp_path, path).map_err(write_err)?;
    Ok(())
}

/// Delete a generated file. Returns `false` when it was already gone.
pub fn remove_artifact(path: &Path) -> Result<bool, ArtifactError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(ArtifactError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}
