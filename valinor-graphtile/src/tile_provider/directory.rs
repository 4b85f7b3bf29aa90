use crate::GraphId;
use crate::graph_id::InvalidGraphIdError;
use crate::graph_tile::{GraphTileView, OwnedGraphTile};
use crate::tile_provider::{GraphTileProvider, GraphTileProviderError, GraphTileWriter};
use std::fs::File;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const TILE_EXTENSION: &str = "gph";

/// A graph tile provider that is backed by a directory of tiles.
///
/// Tiles are read fully into memory on every access; there is no cache,
/// so every worker can own a provider without sharing anything.
#[derive(Debug, Clone)]
pub struct DirectoryGraphTileProvider {
    base_directory: PathBuf,
}

impl DirectoryGraphTileProvider {
    pub fn new(base_directory: PathBuf) -> Self {
        DirectoryGraphTileProvider { base_directory }
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Computes the path for the tile containing the given graph ID.
    ///
    /// # Errors
    ///
    /// Fails if the ID has no file path (ex: an unknown level).
    pub fn path_for_graph_id(&self, graph_id: GraphId) -> Result<PathBuf, InvalidGraphIdError> {
        Ok(self
            .base_directory
            .join(graph_id.tile_base_id().file_path(TILE_EXTENSION)?))
    }

    /// Loads the tile containing the given graph ID.
    ///
    /// # Errors
    ///
    /// Fails with [`GraphTileProviderError::TileDoesNotExist`] if there is no such file,
    /// and with other variants for I/O or decoding errors.
    pub fn get_tile(&self, graph_id: GraphId) -> Result<OwnedGraphTile, GraphTileProviderError> {
        let path = self.path_for_graph_id(graph_id)?;
        // NOTE: Does not handle compressed tiles
        let data = std::fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => GraphTileProviderError::TileDoesNotExist(graph_id.tile_base_id()),
            _ => GraphTileProviderError::IoError(e),
        })?;
        Ok(OwnedGraphTile::try_from(data)?)
    }
}

impl GraphTileProvider for DirectoryGraphTileProvider {
    fn with_tile<F, T>(&self, graph_id: GraphId, process: F) -> Result<T, GraphTileProviderError>
    where
        F: FnOnce(&GraphTileView<'_>) -> T,
    {
        let tile = self.get_tile(graph_id)?;
        Ok(process(tile.borrow_dependent()))
    }

    fn enumerate_tiles(&self) -> Result<Vec<GraphId>, GraphTileProviderError> {
        let mut graph_ids = Vec::new();
        for entry in WalkDir::new(&self.base_directory) {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || !path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(TILE_EXTENSION))
            {
                continue;
            }

            let relative = path.strip_prefix(&self.base_directory).unwrap_or(path);
            match GraphId::from_file_path(relative) {
                Ok(graph_id) => graph_ids.push(graph_id),
                Err(e) => debug!(path = %path.display(), "Skipping file: {e}"),
            }
        }

        graph_ids.sort_unstable();
        Ok(graph_ids)
    }
}

impl GraphTileWriter for DirectoryGraphTileProvider {
    /// Truncates and rewrites the tile file, creating parent directories as needed.
    ///
    /// This is not atomic: readers (or a crash) can observe a partially written tile.
    /// The caller must make sure nothing else is reading the tile.
    fn overwrite_tile_in_place(
        &self,
        graph_id: GraphId,
        sections: &[&[u8]],
    ) -> Result<(), GraphTileProviderError> {
        let path = self.path_for_graph_id(graph_id)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(&path)?);
        for section in sections {
            writer.write_all(section)?;
        }
        writer.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_tile::GraphTile;
    use crate::graph_tile::test_tiles::{three_edge_builder, tile_id};

    fn write_tile(dir: &Path, graph_id: GraphId) -> Vec<u8> {
        let bytes = three_edge_builder(0, 0).into_bytes().unwrap();
        let provider = DirectoryGraphTileProvider::new(dir.to_path_buf());
        // Only the header graph ID differs, which doesn't matter for these tests
        provider
            .overwrite_tile_in_place(graph_id, &[bytes.as_slice()])
            .unwrap();
        bytes
    }

    #[test]
    fn test_path_for_graph_id() {
        let provider = DirectoryGraphTileProvider::new(PathBuf::from("/data/tiles"));
        let graph_id = GraphId::try_from_components(2, 762_485, 17).unwrap();

        assert_eq!(
            provider.path_for_graph_id(graph_id).unwrap(),
            PathBuf::from("/data/tiles/2/000/762/485.gph")
        );
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = write_tile(dir.path(), tile_id());

        assert!(dir.path().join("2/000/762/485.gph").is_file());

        let provider = DirectoryGraphTileProvider::new(dir.path().to_path_buf());
        let (graph_id, memory) = provider
            .with_tile(tile_id().with_index(2).unwrap(), |tile| {
                (tile.graph_id(), tile.memory().to_vec())
            })
            .unwrap();
        assert_eq!(graph_id, tile_id());
        assert_eq!(memory, bytes);
    }

    #[test]
    fn test_overwrite_truncates() {
        let dir = tempfile::tempdir().unwrap();
        write_tile(dir.path(), tile_id());

        let provider = DirectoryGraphTileProvider::new(dir.path().to_path_buf());
        provider
            .overwrite_tile_in_place(tile_id(), &[b"abc".as_slice(), b"de".as_slice()])
            .unwrap();

        let path = provider.path_for_graph_id(tile_id()).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"abcde");
    }

    #[test]
    fn test_missing_tile() {
        let dir = tempfile::tempdir().unwrap();
        let provider = DirectoryGraphTileProvider::new(dir.path().to_path_buf());

        assert!(matches!(
            provider.with_tile(tile_id(), |_| ()),
            Err(GraphTileProviderError::TileDoesNotExist(id)) if id == tile_id()
        ));
    }

    #[test]
    fn test_corrupt_tile() {
        let dir = tempfile::tempdir().unwrap();
        let provider = DirectoryGraphTileProvider::new(dir.path().to_path_buf());
        provider
            .overwrite_tile_in_place(tile_id(), &[b"not a tile".as_slice()])
            .unwrap();

        assert!(matches!(
            provider.with_tile(tile_id(), |_| ()),
            Err(GraphTileProviderError::DecodingError(_))
        ));
    }

    #[test]
    fn test_enumerate_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let ids = [
            GraphId::try_from_components(2, 762_485, 0).unwrap(),
            GraphId::try_from_components(0, 3015, 0).unwrap(),
            GraphId::try_from_components(1, 47_701, 0).unwrap(),
        ];
        for id in ids {
            write_tile(dir.path(), id);
        }
        // Noise that must be skipped
        std::fs::write(dir.path().join("2/000/762/notes.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("2/000/762/12.gph"), "short path").unwrap();

        let provider = DirectoryGraphTileProvider::new(dir.path().to_path_buf());
        let mut expected = ids.to_vec();
        expected.sort_unstable();
        assert_eq!(provider.enumerate_tiles().unwrap(), expected);
    }
}
