//! Turning raw files into linked nodes.
//!
//! [`DirectoryReader`] walks a directory for `.txt` files; [`NodeParser`]
//! chunks each document by paragraph and sentence and links the chunks of
//! one document PREVIOUS/NEXT.
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::traits::Reader;
use crate::types::{chunk_id, Document, Node, NodeRelationship};

#[derive(Debug, Clone, Default)]
pub struct NodeParser {
    chunking: ChunkingSettings,
}

impl NodeParser {
    pub fn new(chunking: ChunkingSettings) -> Result<Self> {
        if chunking.max_tokens == 0 {
            return Err(Error::InvalidConfig("chunking.max_tokens must be > 0".into()));
        }
        if !(0.0..1.0).contains(&chunking.overlap_percent) {
            return Err(Error::InvalidConfig("chunking.overlap_percent must be in [0, 1)".into()));
        }
        Ok(Self { chunking })
    }

    /// Chunk every document, in order, into nodes.
    pub fn get_nodes_from_documents(&self, documents: &[Document]) -> Vec<Node> {
        let mut nodes = Vec::new();
        for doc in documents {
            nodes.extend(self.parse_document(doc));
        }
        info!(documents = documents.len(), nodes = nodes.len(), "parsed documents into nodes");
        nodes
    }

    pub fn parse_document(&self, doc: &Document) -> Vec<Node> {
        let texts = self.chunk_text(&doc.text);
        let ids: Vec<String> = (0..texts.len()).map(|i| chunk_id(&doc.id, i)).collect();
        let mut nodes = Vec::with_capacity(texts.len());
        for (i, text) in texts.into_iter().enumerate() {
            let mut node = Node::new(ids[i].clone(), text).with_ref_doc(doc.id.clone());
            node.metadata = doc.metadata.clone();
            node.set_relationship(NodeRelationship::Source, doc.id.clone());
            if i > 0 {
                node.set_relationship(NodeRelationship::Previous, ids[i - 1].clone());
            }
            if let Some(next) = ids.get(i + 1) {
                node.set_relationship(NodeRelationship::Next, next.clone());
            }
            nodes.push(node);
        }
        debug!(doc_id = %doc.id, chunks = nodes.len(), "chunked document");
        nodes
    }

    /// Split `content` into chunk texts. Paragraphs never share a chunk;
    /// within a paragraph whole sentences are packed up to `max_tokens`, and
    /// only a sentence that alone exceeds the budget is cut by words.
    pub fn chunk_text(&self, content: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        for paragraph in content.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() { continue; }
            if count_tokens(paragraph) <= self.chunking.max_tokens {
                chunks.push(normalize_ws(paragraph));
                continue;
            }
            let mut current = String::new();
            for sentence in split_sentences(paragraph) {
                let candidate = if current.is_empty() { sentence.to_string() } else { format!("{current} {sentence}") };
                if count_tokens(&candidate) <= self.chunking.max_tokens {
                    current = candidate;
                    continue;
                }
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                if count_tokens(sentence) <= self.chunking.max_tokens {
                    current = sentence.to_string();
                } else {
                    chunks.extend(self.split_words_with_overlap(sentence));
                }
            }
            if !current.is_empty() {
                chunks.push(current);
            }
        }
        chunks
    }

    fn split_words_with_overlap(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let words_per_chunk = ((self.chunking.max_tokens as f32 * 0.75) as usize).max(1);
        let overlap_words = (words_per_chunk as f32 * self.chunking.overlap_percent) as usize;
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }
}

/// Rough token estimate: one token per 0.75 words.
pub fn count_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f32 / 0.75) as usize
}

fn normalize_ws(text: &str) -> String { text.split_whitespace().collect::<Vec<_>>().join(" ") }

/// Split after `.`, `!` or `?` when followed by whitespace.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(false, |(_, n)| n.is_whitespace()) {
            let end = i + c.len_utf8();
            let s = text[start..end].trim();
            if !s.is_empty() { sentences.push(s); }
            start = end;
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() { sentences.push(tail); }
    sentences
}

/// Loads every `.txt` file under a directory, in sorted path order.
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    root: PathBuf,
    limit: Option<usize>,
}

impl DirectoryReader {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into(), limit: None } }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    /// Parent directory relative to the root, `misc` for files at the root.
    fn category(&self, file_path: &Path) -> String {
        let relative = file_path.strip_prefix(&self.root).unwrap_or(file_path);
        match relative.parent().and_then(Path::to_str) {
            Some(p) if !p.is_empty() => p.replace('\\', "/"),
            _ => "misc".to_string(),
        }
    }

    fn doc_id(&self, file_path: &Path) -> String {
        let relative = file_path.strip_prefix(&self.root).unwrap_or(file_path);
        relative.to_string_lossy().replace('\\', "/")
    }

    fn list_txt_files(&self) -> Vec<PathBuf> {
        let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
            .map(|e| e.path().to_path_buf())
            .collect();
        txt_files.sort();
        txt_files
    }

    pub fn load_documents(&self) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(Error::NotFound(format!("directory {}", self.root.display())));
        }
        let mut files = self.list_txt_files();
        if let Some(limit) = self.limit {
            files.truncate(limit);
        }
        if files.is_empty() {
            info!(dir = %self.root.display(), "no .txt files found");
        }
        let mut documents = Vec::with_capacity(files.len());
        for (file_index, file_path) in files.iter().enumerate() {
            debug!(file = %file_path.display(), "reading file {}/{}", file_index + 1, files.len());
            let text = self.read_file_content(file_path)?;
            let file_name = file_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            documents.push(
                Document::with_id(self.doc_id(file_path), text)
                    .with_metadata("file_path", file_path.to_string_lossy().to_string())
                    .with_metadata("file_name", file_name)
                    .with_metadata("category", self.category(file_path)),
            );
        }
        info!(files = documents.len(), "loaded documents");
        Ok(documents)
    }
}

impl Reader for DirectoryReader {
    fn load(&self) -> anyhow::Result<Vec<Document>> {
        Ok(self.load_documents()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser(max_tokens: usize) -> NodeParser {
        NodeParser::new(ChunkingSettings { max_tokens, overlap_percent: 0.2 }).unwrap()
    }

    #[test]
    fn paragraphs_become_chunks() {
        let chunks = parser(100).chunk_text("First para.\n\n\n\nSecond   para here.");
        assert_eq!(chunks, vec!["First para.", "Second para here."]);
    }

    #[test]
    fn long_paragraph_packs_whole_sentences() {
        // Each sentence is 3 words = 4 tokens; budget 9 tokens fits two.
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = parser(9).chunk_text(text);
        assert_eq!(chunks, vec!["One two three. Four five six.", "Seven eight nine."]);
    }

    #[test]
    fn oversized_sentence_splits_with_overlap() {
        let text = (0..20).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let chunks = parser(8).chunk_text(&text);
        // 6 words per chunk, overlap of 1 word.
        assert_eq!(chunks[0], "w0 w1 w2 w3 w4 w5");
        assert!(chunks[1].starts_with("w5 "));
        assert!(chunks.last().unwrap().ends_with("w19"));
    }

    #[test]
    fn chunks_are_linked_in_order() {
        let doc = Document::with_id("d", "A one.\n\nB two.\n\nC three.");
        let nodes = parser(100).parse_document(&doc);
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].id, "d:0");
        assert_eq!(nodes[0].prev_id(), None);
        assert_eq!(nodes[1].prev_id(), Some("d:0"));
        assert_eq!(nodes[1].next_id(), Some("d:2"));
        assert_eq!(nodes[2].next_id(), None);
        assert!(nodes.iter().all(|n| n.source_id() == Some("d") && n.ref_doc_id.as_deref() == Some("d")));
    }

    #[test]
    fn sentence_split_keeps_abbreviation_free_text() {
        assert_eq!(split_sentences("Hi there! How are you? Fine."), vec!["Hi there!", "How are you?", "Fine."]);
        assert_eq!(split_sentences("v1.2 is out"), vec!["v1.2 is out"]);
    }

    #[test]
    fn zero_budget_is_rejected() {
        let err = NodeParser::new(ChunkingSettings { max_tokens: 0, overlap_percent: 0.0 }).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn reader_loads_txt_files_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("notes")).unwrap();
        fs::write(dir.path().join("notes/b.txt"), "beta").unwrap();
        fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("skip.md"), "nope").unwrap();
        let docs = DirectoryReader::new(dir.path()).load().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a.txt");
        assert_eq!(docs[0].metadata["category"].to_string(), "misc");
        assert_eq!(docs[1].id, "notes/b.txt");
        assert_eq!(docs[1].metadata["category"].to_string(), "notes");
        assert_eq!(docs[1].metadata["file_name"].to_string(), "b.txt");
    }
}
