//! Facilities for discovering input files and loading text corpora.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::{BpeError, Result};

/// Discovers files rooted at the provided input paths according to the ingest configuration.
///
/// Directories are traversed recursively by default; set [`IngestConfig::recursive`] to `false`
/// to limit discovery to the first level. Results are sorted so training order is stable.
pub fn collect_paths<P: AsRef<Path>>(inputs: &[P], cfg: &IngestConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = input.as_ref();
        if !path.exists() {
            return Err(BpeError::io(
                std::io::Error::new(std::io::ErrorKind::NotFound, "input path does not exist"),
                Some(path.to_path_buf()),
            ));
        }
        if path.is_dir() {
            let depth = if cfg.recursive { usize::MAX } else { 1 };
            let walker = WalkDir::new(path)
                .max_depth(depth)
                .follow_links(cfg.follow_symlinks)
                .sort_by_file_name();
            for entry in walker {
                let entry = entry.map_err(|err| BpeError::Internal(err.to_string()))?;
                if entry.file_type().is_file() {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            files.push(path.to_path_buf());
        }
    }
    if files.is_empty() {
        return Err(BpeError::InvalidConfig(
            "no files discovered in provided inputs".into(),
        ));
    }
    Ok(files)
}

/// Reads every discovered file as UTF-8 text, one document per file.
pub fn load_text_corpus<P: AsRef<Path>>(inputs: &[P], cfg: &IngestConfig) -> Result<Vec<String>> {
    collect_paths(inputs, cfg)?
        .into_iter()
        .map(|path| fs::read_to_string(&path).map_err(|err| BpeError::io(err, Some(path))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn collect_paths_discovers_files_recursively() {
        let dir = tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("create nested directory");
        let file_a = dir.path().join("a.txt");
        let file_b = nested.join("b.txt");
        fs::write(&file_a, "alpha").expect("write a");
        fs::write(&file_b, "beta").expect("write b");

        let mut paths = collect_paths(&[dir.path()], &IngestConfig::default()).expect("collect");
        paths.sort();
        assert_eq!(paths, vec![file_a.clone(), file_b]);

        let shallow = IngestConfig::builder().recursive(false).build();
        let paths = collect_paths(&[dir.path()], &shallow).expect("collect shallow");
        assert_eq!(paths, vec![file_a]);
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = tempdir().expect("tempdir");
        let err = collect_paths(&[dir.path().join("absent.txt")], &IngestConfig::default())
            .expect_err("missing path");
        assert!(matches!(err, BpeError::Io { path: Some(_), .. }));
    }

    #[test]
    fn load_text_corpus_reads_documents() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("corpus.txt");
        fs::write(&file, "low lower lowest").expect("write corpus");
        let docs = load_text_corpus(&[file], &IngestConfig::default()).expect("load");
        assert_eq!(docs, vec!["low lower lowest".to_string()]);
    }
}
