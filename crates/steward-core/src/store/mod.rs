//! Contract store
//!
//! Process-wide owner of the canonical contract state: chunks, concept
//! index, manifest, and wage table, bundled into an immutable generation-
//! numbered [`Snapshot`]. Readers clone the current `Arc<Snapshot>` once per
//! request and use that generation throughout; ingestion builds a complete
//! new snapshot and flips the pointer atomically. Indexes are rebuilt from
//! the snapshot and never outlive it.

pub mod vectors;

use crate::chunk::Chunk;
use crate::error::Result;
use crate::index::concept::ConceptIndex;
use crate::ingest::manifest::Manifest;
use crate::ingest::wages::WageTable;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Immutable view of one contract at one ingestion generation
pub struct Snapshot {
    pub contract_id: String,
    pub generation: u64,
    pub chunks: Vec<Arc<Chunk>>,
    by_id: HashMap<String, Arc<Chunk>>,
    by_article: BTreeMap<u32, Vec<Arc<Chunk>>>,
    pub concept_index: ConceptIndex,
    pub manifest: Manifest,
    pub wage_table: WageTable,
}

/// Ordering used for article expansion: (section_num, subsection), absent
/// fields first, chunk id as the final tie-break.
fn article_order(a: &Chunk, b: &Chunk) -> std::cmp::Ordering {
    a.section_num
        .cmp(&b.section_num)
        .then_with(|| a.subsection.cmp(&b.subsection))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

impl Snapshot {
    /// Assemble a snapshot. Chunks are deduplicated by chunk_id (first
    /// occurrence wins); per-article lists are sorted for stable expansion.
    pub fn new(
        contract_id: impl Into<String>,
        chunks: Vec<Chunk>,
        concept_index: ConceptIndex,
        manifest: Manifest,
        wage_table: WageTable,
        generation: u64,
    ) -> Self {
        let mut by_id: HashMap<String, Arc<Chunk>> = HashMap::new();
        let mut ordered: Vec<Arc<Chunk>> = Vec::new();

        for chunk in chunks {
            if by_id.contains_key(&chunk.chunk_id) {
                tracing::warn!("Duplicate chunk_id {} dropped at snapshot build", chunk.chunk_id);
                continue;
            }
            let shared = Arc::new(chunk);
            by_id.insert(shared.chunk_id.clone(), Arc::clone(&shared));
            ordered.push(shared);
        }

        let mut by_article: BTreeMap<u32, Vec<Arc<Chunk>>> = BTreeMap::new();
        for chunk in &ordered {
            if let Some(article) = chunk.article_num {
                by_article.entry(article).or_default().push(Arc::clone(chunk));
            }
        }
        for chunks in by_article.values_mut() {
            chunks.sort_by(|a, b| article_order(a, b));
        }

        Self {
            contract_id: contract_id.into(),
            generation,
            chunks: ordered,
            by_id,
            by_article,
            concept_index,
            manifest,
            wage_table,
        }
    }

    pub fn chunk(&self, chunk_id: &str) -> Option<&Arc<Chunk>> {
        self.by_id.get(chunk_id)
    }

    /// Chunks of one article in (section_num, subsection) order
    pub fn article_chunks(&self, article_num: u32) -> &[Arc<Chunk>] {
        self.by_article
            .get(&article_num)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Article numbers present in this snapshot
    pub fn article_numbers(&self) -> Vec<u32> {
        self.by_article.keys().copied().collect()
    }

    /// Text indexed by BM25 for a chunk: content plus citation plus title
    pub fn searchable_text(chunk: &Chunk) -> String {
        let mut text = chunk.content.clone();
        text.push(' ');
        text.push_str(&chunk.citation);
        if let Some(title) = &chunk.article_title {
            text.push(' ');
            text.push_str(title);
        }
        text
    }
}

/// Atomically swappable holder of the current snapshot
pub struct ContractStore {
    current: RwLock<Arc<Snapshot>>,
    next_generation: AtomicU64,
}

impl ContractStore {
    pub fn new(initial: Snapshot) -> Self {
        let generation = initial.generation;
        Self {
            current: RwLock::new(Arc::new(initial)),
            next_generation: AtomicU64::new(generation + 1),
        }
    }

    /// The current snapshot; callers hold the Arc for their whole request
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().expect("snapshot lock poisoned"))
    }

    /// Publish a new snapshot, assigning it the next generation id
    pub fn publish(&self, mut snapshot: Snapshot) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        snapshot.generation = generation;
        *self.current.write().expect("snapshot lock poisoned") = Arc::new(snapshot);
        tracing::info!("Published contract snapshot generation {}", generation);
        generation
    }
}

/// Filesystem layout of persisted state under one data directory
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn chunks_file(&self, contract_id: &str) -> PathBuf {
        self.data_dir
            .join("chunks")
            .join(format!("{}_chunks_enriched.json", contract_id))
    }

    pub fn concept_index_file(&self, contract_id: &str) -> PathBuf {
        self.data_dir
            .join("chunks")
            .join(format!("{}_concept_index.json", contract_id))
    }

    pub fn wages_file(&self, contract_id: &str) -> PathBuf {
        self.data_dir
            .join("wages")
            .join(format!("{}_wage_tables.json", contract_id))
    }

    pub fn manifest_file(&self, contract_id: &str) -> PathBuf {
        self.data_dir
            .join("manifests")
            .join(format!("{}.json", contract_id))
    }

    pub fn vectors_db(&self) -> PathBuf {
        self.data_dir.join("vectors.sqlite3")
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Persist a snapshot's JSON artifacts (embeddings live in the sqlite store)
pub fn save_snapshot(layout: &DataLayout, snapshot: &Snapshot) -> Result<()> {
    let chunks: Vec<&Chunk> = snapshot.chunks.iter().map(|c| c.as_ref()).collect();
    write_json(&layout.chunks_file(&snapshot.contract_id), &chunks)?;
    write_json(
        &layout.concept_index_file(&snapshot.contract_id),
        &snapshot.concept_index,
    )?;
    write_json(&layout.wages_file(&snapshot.contract_id), &snapshot.wage_table)?;
    write_json(&layout.manifest_file(&snapshot.contract_id), &snapshot.manifest)?;
    Ok(())
}

/// Load a previously ingested contract from disk
pub fn load_snapshot(layout: &DataLayout, contract_id: &str) -> Result<Snapshot> {
    let chunks_path = layout.chunks_file(contract_id);
    if !chunks_path.exists() {
        return Err(crate::error::StewardError::ContractNotFound(
            contract_id.to_string(),
        ));
    }

    let chunks: Vec<Chunk> = read_json(&chunks_path)?;
    let concept_index: ConceptIndex = read_json(&layout.concept_index_file(contract_id))
        .unwrap_or_else(|_| ConceptIndex::build(&chunks));
    let wage_table: WageTable =
        read_json(&layout.wages_file(contract_id)).unwrap_or_default();
    let manifest: Manifest = read_json(&layout.manifest_file(contract_id)).unwrap_or_else(|_| {
        Manifest {
            contract_id: contract_id.to_string(),
            ..Default::default()
        }
    });

    Ok(Snapshot::new(
        contract_id,
        chunks,
        concept_index,
        manifest,
        wage_table,
        0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::DocType;

    fn chunk(id: &str, article: Option<u32>, section: Option<u32>, sub: Option<&str>) -> Chunk {
        Chunk {
            chunk_id: id.into(),
            contract_id: "test".into(),
            article_num: article,
            article_title: None,
            section_num: section,
            subsection: sub.map(str::to_string),
            subsection_title: None,
            citation: String::new(),
            parent_context: String::new(),
            content: format!("content of {}", id),
            char_count: 0,
            doc_type: DocType::Cba,
            applies_to: vec!["all".into()],
            topics: vec![],
            cross_references: vec![],
            summary: None,
            worker_questions: vec![],
            alternative_names: vec![],
            is_definition: false,
            is_exception: false,
            hire_date_sensitive: false,
            is_high_stakes: false,
        }
    }

    fn snapshot(chunks: Vec<Chunk>) -> Snapshot {
        Snapshot::new(
            "test",
            chunks,
            ConceptIndex::default(),
            Manifest::default(),
            WageTable::default(),
            0,
        )
    }

    #[test]
    fn test_duplicate_chunk_ids_deduplicated() {
        let snap = snapshot(vec![
            chunk("a", Some(1), Some(1), None),
            chunk("a", Some(1), Some(2), None),
        ]);
        assert_eq!(snap.chunks.len(), 1);
        assert_eq!(snap.chunk("a").unwrap().section_num, Some(1));
    }

    #[test]
    fn test_article_chunks_sorted_by_section_and_subsection() {
        let snap = snapshot(vec![
            chunk("a3", Some(7), Some(14), Some("b")),
            chunk("a1", Some(7), Some(2), None),
            chunk("a2", Some(7), Some(14), Some("a")),
            chunk("other", Some(8), Some(1), None),
        ]);
        let ids: Vec<&str> = snap
            .article_chunks(7)
            .iter()
            .map(|c| c.chunk_id.as_str())
            .collect();
        assert_eq!(ids, vec!["a1", "a2", "a3"]);
        assert!(snap.article_chunks(99).is_empty());
    }

    #[test]
    fn test_publish_bumps_generation_and_swaps() {
        let store = ContractStore::new(snapshot(vec![chunk("a", Some(1), Some(1), None)]));
        let first = store.snapshot();
        assert_eq!(first.generation, 0);

        let gen = store.publish(snapshot(vec![chunk("b", Some(1), Some(1), None)]));
        assert_eq!(gen, 1);

        // The pinned snapshot keeps serving its generation
        assert!(first.chunk("a").is_some());
        let second = store.snapshot();
        assert!(second.chunk("b").is_some());
        assert!(second.chunk("a").is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = tempfile::TempDir::new().unwrap();
        let layout = DataLayout::new(temp.path());

        let snap = snapshot(vec![
            chunk("art1_sec1", Some(1), Some(1), None),
            chunk("art2_sec1", Some(2), Some(1), None),
        ]);
        save_snapshot(&layout, &snap).unwrap();

        let loaded = load_snapshot(&layout, "test").unwrap();
        assert_eq!(loaded.chunks.len(), 2);
        assert!(loaded.chunk("art2_sec1").is_some());

        assert!(load_snapshot(&layout, "missing").is_err());
    }

    #[test]
    fn test_searchable_text_includes_citation_and_title() {
        let mut c = chunk("a", Some(12), Some(28), None);
        c.citation = "Article 12, Section 28".into();
        c.article_title = Some("HOURS OF WORK".into());
        let text = Snapshot::searchable_text(&c);
        assert!(text.contains("content of a"));
        assert!(text.contains("Article 12, Section 28"));
        assert!(text.contains("HOURS OF WORK"));
    }
}
