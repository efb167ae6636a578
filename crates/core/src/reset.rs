use crate::config::PathsConfig;
use crate::error::IngestError;
use crate::traits::VectorStore;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

/// Empties the store, then deletes the store directory and the extracted-text
/// directory. Missing directories are not an error.
pub async fn reset_workspace<S: VectorStore + ?Sized>(
    store: &S,
    paths: &PathsConfig,
) -> Result<(), IngestError> {
    store.clear().await?;
    remove_tree(&paths.store_dir)?;
    remove_tree(&paths.texts_dir)?;
    info!(
        store_dir = %paths.store_dir.display(),
        texts_dir = %paths.texts_dir.display(),
        "workspace cleared"
    );
    Ok(())
}

fn remove_tree(path: &Path) -> Result<(), IngestError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
