//! File-backed chunk manifests.

use std::{
   fs::{self, File},
   io::BufWriter,
   path::{Path, PathBuf},
   sync::Arc,
};

use super::{ChunkManifestIngestor, ChunkWriter, CopyChunkWriter};
use crate::{
   Error, Result,
   token::{Token, TokenManager},
};

/// Receives the contents of each chunk file.
///
/// Called concurrently from ingestion threads, always for different chunks.
/// Any shared index state the ingestor mutates must be synchronized by the
/// ingestor itself.
pub trait ChunkIngestor: Send + Sync {
   fn ingest_chunk(&self, token: &Token, path: &Path, data: &[u8]) -> Result<()>;
}

/// A fixed list of chunk files, each ingested under its own token.
pub struct FileManifest<I> {
   paths:    Vec<PathBuf>,
   ingestor: I,
   tokens:   Arc<TokenManager>,
   copy_dir: Option<PathBuf>,
}

impl<I: ChunkIngestor> FileManifest<I> {
   pub fn new(paths: Vec<PathBuf>, ingestor: I, tokens: Arc<TokenManager>) -> Self {
      Self { paths, ingestor, tokens, copy_dir: None }
   }

   /// Also copies every successfully ingested chunk into `dir`.
   pub fn with_copy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
      self.copy_dir = Some(dir.into());
      self
   }

   pub fn path(&self, index: usize) -> Option<&Path> {
      self.paths.get(index).map(PathBuf::as_path)
   }

   pub fn paths(&self) -> &[PathBuf] {
      &self.paths
   }

   pub const fn ingestor(&self) -> &I {
      &self.ingestor
   }

   /// Destination of the copy of chunk `index`. The index prefix keeps chunks
   /// with the same file name apart.
   fn copy_path(dir: &Path, index: usize, path: &Path) -> PathBuf {
      let name = path
         .file_name()
         .map_or_else(|| "chunk".into(), |n| n.to_string_lossy());
      dir.join(format!("{index:05}-{name}"))
   }

   fn copy_chunk(&self, dir: &Path, index: usize, path: &Path, data: &[u8]) -> Result<()> {
      fs::create_dir_all(dir)?;
      let mut output = BufWriter::new(File::create(Self::copy_path(dir, index, path))?);
      let mut writer = CopyChunkWriter::new();
      writer.stage(data);
      writer.write(&mut output)?;
      writer.complete(&mut output)
   }
}

impl<I: ChunkIngestor> ChunkManifestIngestor for FileManifest<I> {
   fn len(&self) -> usize {
      self.paths.len()
   }

   fn ingest(&self, index: usize) -> Result<()> {
      let path = self
         .paths
         .get(index)
         .ok_or(Error::ChunkIndex { index, len: self.paths.len() })?;

      let token = self.tokens.issue_token()?;
      let data =
         fs::read(path).map_err(|source| Error::ChunkRead { path: path.clone(), source })?;
      self.ingestor.ingest_chunk(&token, path, &data)?;

      if let Some(dir) = &self.copy_dir {
         self.copy_chunk(dir, index, path, &data)?;
      }
      tracing::trace!(index, serial = token.serial_number(), bytes = data.len(), "chunk ingested");
      Ok(())
   }
}

/// Reads a manifest file listing one chunk path per line.
///
/// Blank lines and lines starting with `#` are skipped. Relative paths are
/// resolved against the manifest's directory.
pub fn load_manifest_file(path: &Path) -> Result<Vec<PathBuf>> {
   let content = fs::read_to_string(path)?;
   let base = path.parent().unwrap_or_else(|| Path::new(""));

   Ok(content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty() && !line.starts_with('#'))
      .map(|line| {
         let entry = Path::new(line);
         if entry.is_absolute() { entry.to_path_buf() } else { base.join(entry) }
      })
      .collect())
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   #[test]
   fn manifest_skips_comments_and_resolves_relative_paths() {
      let dir = TempDir::new().expect("temp dir");
      let manifest = dir.path().join("manifest.txt");
      fs::write(&manifest, "# chunks\nA.chunk\n\n  /abs/B.chunk  \n").expect("write manifest");

      let paths = load_manifest_file(&manifest).expect("load");
      assert_eq!(paths, vec![dir.path().join("A.chunk"), PathBuf::from("/abs/B.chunk")]);
   }

   #[test]
   fn copy_path_is_prefixed_by_index() {
      let path = FileManifest::<()>::copy_path(Path::new("/out"), 7, Path::new("/in/data.chunk"));
      assert_eq!(path, PathBuf::from("/out/00007-data.chunk"));
   }

   impl ChunkIngestor for () {
      fn ingest_chunk(&self, _token: &Token, _path: &Path, _data: &[u8]) -> Result<()> {
         Ok(())
      }
   }

   #[test]
   fn out_of_range_index_is_an_error() {
      let manifest = FileManifest::new(Vec::new(), (), TokenManager::new());
      assert!(matches!(manifest.ingest(0), Err(Error::ChunkIndex { index: 0, len: 0 })));
   }
}
