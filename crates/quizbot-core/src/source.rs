//! File-backed question source.
//!
//! Question archives are plain-text files, traditionally KOI8-R encoded.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use rand::seq::SliceRandom;

use crate::model::QuestionSet;
use crate::parser::{Markers, QuestionParser};
use crate::traits::QuestionSource;

/// Encoding used when none is configured.
pub const DEFAULT_ENCODING: &str = "koi8-r";

/// Reads question files from disk.
pub struct FileQuestionSource {
    encoding: &'static Encoding,
    parser: QuestionParser,
}

impl FileQuestionSource {
    /// Create a source decoding files with the given WHATWG encoding label.
    pub fn new(encoding_label: &str, markers: &Markers) -> Result<Self> {
        let encoding = Encoding::for_label(encoding_label.trim().as_bytes())
            .with_context(|| format!("unknown text encoding: {encoding_label}"))?;
        Ok(Self {
            encoding,
            parser: QuestionParser::new(markers),
        })
    }

    /// Read and decode one file.
    pub fn read_text(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read question file: {}", path.display()))?;
        let (text, _, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            tracing::warn!(
                "{} is not valid {}; undecodable bytes were replaced",
                path.display(),
                self.encoding.name()
            );
        }
        Ok(text.into_owned())
    }

    /// List question files (`*.txt`) in a directory, sorted by name.
    pub fn list_files(directory: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(directory)
            .with_context(|| format!("failed to read directory: {}", directory.display()))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Default for FileQuestionSource {
    fn default() -> Self {
        Self {
            encoding: encoding_rs::KOI8_R,
            parser: QuestionParser::default(),
        }
    }
}

impl QuestionSource for FileQuestionSource {
    fn load(&self, paths: &[PathBuf]) -> Result<QuestionSet> {
        let blocks = paths
            .iter()
            .map(|path| self.read_text(path))
            .collect::<Result<Vec<_>>>()?;
        let set = self.parser.parse_blocks(&blocks);
        tracing::info!(files = paths.len(), questions = set.len(), "loaded question set");
        Ok(set)
    }

    fn pick_random(&self, directory: &Path, count: usize) -> Result<Vec<PathBuf>> {
        let mut files = Self::list_files(directory)?;
        if files.is_empty() {
            anyhow::bail!("no .txt question files in {}", directory.display());
        }
        files.shuffle(&mut rand::rng());
        files.truncate(count.max(1));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_koi8(dir: &Path, name: &str, text: &str) -> PathBuf {
        let (bytes, _, _) = encoding_rs::KOI8_R.encode(text);
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn decodes_koi8r_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_koi8(
            dir.path(),
            "a.txt",
            "Вопрос 1:\nСтолица Франции?\nОтвет:\nПариж.\n",
        );

        let set = FileQuestionSource::default().load(&[path]).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(1).unwrap().question, "Столица Франции?");
        assert_eq!(set.get(1).unwrap().answer, "Париж.");
    }

    #[test]
    fn fan_in_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_koi8(
            dir.path(),
            "a.txt",
            "Вопрос 1:\nA1?\nОтвет:\na1\n\nВопрос 2:\nA2?\nОтвет:\na2\n",
        );
        let b = write_koi8(
            dir.path(),
            "b.txt",
            "Вопрос 1:\nB1?\nОтвет:\nb1\n\nВопрос 2:\nB2?\nОтвет:\nb2\n\nВопрос 3:\nB3?\nОтвет:\nb3\n",
        );

        let set = FileQuestionSource::default().load(&[a, b]).unwrap();
        assert_eq!(set.len(), 5);
        assert_eq!(set.get(3).unwrap().question, "B1?");
    }

    #[test]
    fn utf8_encoding_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u.txt");
        std::fs::write(&path, "Вопрос 1:\nЧто?\nОтвет:\nТо.\n").unwrap();

        let source = FileQuestionSource::new("utf-8", &Markers::default()).unwrap();
        let set = source.load(&[path]).unwrap();
        assert_eq!(set.get(1).unwrap().answer, "То.");
    }

    #[test]
    fn unknown_encoding_is_rejected() {
        assert!(FileQuestionSource::new("klingon", &Markers::default()).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileQuestionSource::default().load(&[dir.path().join("nope.txt")]);
        assert!(result.is_err());
    }

    #[test]
    fn pick_random_samples_txt_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["1.txt", "2.txt", "3.txt", "notes.md"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let source = FileQuestionSource::default();
        let picked = source.pick_random(dir.path(), 2).unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|p| p.extension().unwrap() == "txt"));
        assert_ne!(picked[0], picked[1]);

        let all = source.pick_random(dir.path(), 10).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn pick_random_on_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileQuestionSource::default()
            .pick_random(dir.path(), 1)
            .is_err());
    }
}
