//! Corpus ingestion
//!
//! Loads `.txt` / `.md` documents from a directory and splits them into
//! overlapping passages ready for indexing.

use crate::error::OrchestrationError;
use crate::models::Passage;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const CORPUS_EXTENSIONS: &[&str] = &["txt", "md"];

/// Load every supported file in `dir` (non-recursive, sorted by path)
pub async fn load_corpus(dir: &Path, chunk_size: usize, overlap: usize) -> Result<Vec<Passage>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        OrchestrationError::CorpusError(format!(
            "Cannot read corpus directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| CORPUS_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false);

        if supported && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut passages = Vec::new();
    for path in &paths {
        let text = tokio::fs::read_to_string(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        for (i, chunk) in split_text(&text, chunk_size, overlap).into_iter().enumerate() {
            passages.push(
                Passage::new(format!("{}#{}", name, i), chunk)
                    .with_source(path.display().to_string()),
            );
        }
    }

    if passages.is_empty() {
        warn!(dir = %dir.display(), "Corpus directory produced no passages");
    } else {
        info!(
            dir = %dir.display(),
            files = paths.len(),
            passages = passages.len(),
            "Corpus loaded"
        );
    }

    Ok(passages)
}

/// Split `text` into chunks of at most `chunk_size` characters, each sharing
/// roughly `overlap` characters with its predecessor. Cuts prefer whitespace
/// and every chunk starts on a word.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut chunks = Vec::new();

    if chunk_size == 0 {
        return chunks;
    }

    let skip_whitespace = |mut i: usize| {
        while i < len && chars[i].is_whitespace() {
            i += 1;
        }
        i
    };

    let mut start = skip_whitespace(0);
    while start < len {
        let mut end = (start + chunk_size).min(len);
        if end < len && !chars[end].is_whitespace() {
            if let Some(cut) = (start + overlap + 1..end)
                .rev()
                .find(|&i| chars[i].is_whitespace())
            {
                end = cut;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim_end();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if end >= len {
            break;
        }

        let mut next = end.saturating_sub(overlap).max(start + 1);
        while next < end && !chars[next - 1].is_whitespace() {
            next += 1;
        }
        start = skip_whitespace(next);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_without_overlap() {
        let chunks = split_text("alpha beta gamma delta", 11, 0);
        assert_eq!(chunks, vec!["alpha beta", "gamma delta"]);
    }

    #[test]
    fn test_split_with_overlap() {
        let chunks = split_text("alpha beta gamma delta", 11, 5);
        assert_eq!(chunks, vec!["alpha beta", "beta gamma", "gamma delta"]);
    }

    #[test]
    fn test_split_packs_whole_words_up_to_chunk_size() {
        let chunks = split_text("one two three four five six", 9, 0);
        assert_eq!(chunks, vec!["one two", "three", "four five", "six"]);
        assert!(chunks.iter().all(|c| !c.starts_with(char::is_whitespace)));
    }

    #[test]
    fn test_split_skips_leading_whitespace() {
        let chunks = split_text("   alpha beta\n\ngamma", 10, 0);
        assert_eq!(chunks, vec!["alpha beta", "gamma"]);
    }

    #[test]
    fn test_split_short_and_empty_text() {
        assert_eq!(split_text("short", 100, 10), vec!["short"]);
        assert!(split_text("   ", 100, 10).is_empty());
        assert!(split_text("", 100, 10).is_empty());
    }

    #[test]
    fn test_split_unbroken_word_still_progresses() {
        let chunks = split_text("abcdefghij", 4, 1);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
    }

    #[tokio::test]
    async fn test_load_corpus_reads_supported_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_prompting.md"), "Chain of thought prompting.").unwrap();
        std::fs::write(dir.path().join("a_agents.txt"), "Agents use planning and memory.").unwrap();
        std::fs::write(dir.path().join("ignored.json"), "{}").unwrap();

        let passages = load_corpus(dir.path(), 1000, 300).await.unwrap();

        let ids: Vec<&str> = passages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a_agents.txt#0", "b_prompting.md#0"]);
        assert!(passages[0]
            .source
            .as_deref()
            .unwrap()
            .ends_with("a_agents.txt"));
    }

    #[tokio::test]
    async fn test_load_corpus_missing_directory() {
        let result = load_corpus(Path::new("/definitely/not/here"), 1000, 300).await;
        assert!(matches!(result, Err(OrchestrationError::CorpusError(_))));
    }
}
