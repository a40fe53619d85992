use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use docrag_core::config::{EmbeddingBackend, RagConfig};
use docrag_core::error::{Error, ErrorCategory, Result};
use docrag_core::traits::{Embedder, Generator};
use docrag_core::types::{Chunk, SearchResult};
use docrag_embed::HashEmbedder;
use docrag_retrieve::{build_index, user_prompt, ContextAssembler, RagPipeline, Retriever, SharedIndex};
use docrag_vector::IndexArtifact;
use tempfile::TempDir;

const RUST_DOC: &str = "Rust ownership rules: every value has a single owner. The borrow checker \
    verifies that references never outlive the owner and that mutable borrows are exclusive. \
    Ownership moves on assignment unless the type is Copy.";
const BREAD_DOC: &str = "Sourdough bread needs an active starter, flour, water and salt. Knead the \
    dough, let it rise overnight in a cool place, then bake in a hot dutch oven until the crust \
    is deep brown.";
const GARDEN_DOC: &str = "Tomato plants want full sun, deep watering and support stakes. Prune the \
    suckers, mulch the soil to keep moisture in, and harvest when the fruit is fully red.";

fn config(data: &Path, index: &Path) -> RagConfig {
    RagConfig {
        data_dir: data.to_path_buf(),
        index_dir: index.to_path_buf(),
        embedding_backend: EmbeddingBackend::Hash,
        hash_dim: 1024,
        ..RagConfig::default()
    }
}

fn write_corpus(dir: &Path) {
    fs::write(dir.join("rust.md"), RUST_DOC).unwrap();
    fs::write(dir.join("bread.txt"), BREAD_DOC).unwrap();
    fs::write(dir.join("garden.txt"), GARDEN_DOC).unwrap();
}

struct Built {
    _tmp: TempDir,
    config: RagConfig,
    embedder: Arc<dyn Embedder>,
}

fn built_corpus() -> Built {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();
    write_corpus(&data);
    let config = config(&data, &tmp.path().join("embeddings"));
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(config.hash_dim));
    build_index(&config, embedder.as_ref()).unwrap();
    Built { _tmp: tmp, config, embedder }
}

fn retriever(built: &Built) -> Retriever {
    let artifact = Arc::new(IndexArtifact::load(&built.config.index_dir).unwrap());
    Retriever::new(Arc::clone(&built.embedder), artifact)
}

fn result(name: &str, content: &str, rank: usize) -> SearchResult {
    SearchResult {
        chunk: Chunk {
            content: content.to_string(),
            source_name: name.to_string(),
            source_path: format!("/docs/{name}"),
            extension: ".txt".to_string(),
            chunk_index: 0,
        },
        score: rank as f32 * 0.1,
        rank,
    }
}

#[derive(Default)]
struct RecordingGenerator {
    calls: Mutex<Vec<(Option<String>, String)>>,
}

impl Generator for RecordingGenerator {
    fn generate(&self, system_prompt: Option<&str>, user_prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push((system_prompt.map(str::to_string), user_prompt.to_string()));
        Ok("stub answer".to_string())
    }
}

struct FailingGenerator;

impl Generator for FailingGenerator {
    fn generate(&self, _system_prompt: Option<&str>, _user_prompt: &str) -> Result<String> {
        Err(Error::InvalidArgument("generation refused".into()))
    }
}

#[test]
fn build_reports_corpus_counts() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    fs::write(tmp.path().join("empty.md"), "   \n").unwrap();
    let config = config(tmp.path(), &tmp.path().join("out"));

    let summary = build_index(&config, &HashEmbedder::new(1024)).unwrap();
    assert_eq!(summary.documents, 3);
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.dim, 1024);
    assert_eq!(summary.skipped.len(), 1);
    assert_eq!(summary.index_dir, tmp.path().join("out"));
}

#[test]
fn chunk_size_below_minimum_builds_an_empty_index() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();
    write_corpus(&data);
    let config = RagConfig { chunk_size: 40, chunk_overlap: 10, ..config(&data, &tmp.path().join("out")) };
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(config.hash_dim));

    let summary = build_index(&config, embedder.as_ref()).unwrap();
    assert_eq!(summary.documents, 3);
    assert_eq!(summary.chunks, 0);

    let artifact = Arc::new(IndexArtifact::load(&config.index_dir).unwrap());
    assert!(artifact.is_empty());
    assert_eq!(artifact.dim(), 1024);
    let results = Retriever::new(embedder, artifact).search("sourdough starter", 3).unwrap();
    assert!(results.is_empty());
}

#[test]
fn best_match_ranks_first() {
    let built = built_corpus();
    let results = retriever(&built).search("borrow checker ownership references", 2).unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.source_name, "rust.md");
    assert_eq!(results[0].chunk.extension, ".md");
    assert_eq!(results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2]);
    assert!(results[0].score <= results[1].score);
}

#[test]
fn top_k_beyond_index_size_returns_everything() {
    let built = built_corpus();
    let results = retriever(&built).search("dough", 5).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn top_k_zero_is_rejected() {
    let built = built_corpus();
    let err = retriever(&built).search("dough", 0).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
}

#[test]
fn query_embedder_must_match_index_dimension() {
    let built = built_corpus();
    let artifact = Arc::new(IndexArtifact::load(&built.config.index_dir).unwrap());
    let other = Retriever::new(Arc::new(HashEmbedder::new(32)), artifact);

    let err = other.search("dough", 1).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 1024, actual: 32 }));
    assert_eq!(err.category(), ErrorCategory::QueryFailed);
}

#[test]
fn concurrent_queries_agree_with_sequential_ones() {
    let built = built_corpus();
    let retriever = retriever(&built);
    let queries = ["borrow checker", "sourdough starter", "tomato mulch", "dutch oven crust"];
    let expected: Vec<_> = queries.iter().map(|q| retriever.search(q, 3).unwrap()).collect();

    thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let retriever = &retriever;
                let query = queries[i % queries.len()];
                s.spawn(move || (i % queries.len(), retriever.search(query, 3).unwrap()))
            })
            .collect();
        for handle in handles {
            let (q, got) = handle.join().unwrap();
            assert_eq!(got, expected[q]);
        }
    });
}

#[test]
fn context_stops_at_first_block_that_does_not_fit() {
    let results: Vec<SearchResult> =
        (1..=5).map(|i| result(&format!("doc{i}.txt"), &"x".repeat(100), i)).collect();
    let one_block = ContextAssembler::format(&results[..1], usize::MAX).text.chars().count();
    let header = ContextAssembler::format(&[], usize::MAX).text.chars().count();
    let block = one_block - header;
    let max = header + 2 * block + block / 2;

    let ctx = ContextAssembler::format(&results, max);
    assert!(ctx.truncated);
    assert_eq!(ctx.included_count, 2);
    assert_eq!(ctx.text.matches("[Document ").count(), 2);
    assert!(ctx.text.contains("[Document 1] doc1.txt (.txt file)"));
    assert!(ctx.text.contains("[Document 2] doc2.txt (.txt file)"));
    assert!(ctx.text.ends_with("...(3 documents omitted: context length limit reached)..."));
}

#[test]
fn context_that_fits_is_not_truncated() {
    let results: Vec<SearchResult> = (1..=3).map(|i| result(&format!("d{i}.txt"), "short body", i)).collect();
    let ctx = ContextAssembler::format(&results, 3000);

    assert!(!ctx.truncated);
    assert_eq!(ctx.included_count, 3);
    assert!(!ctx.text.contains("omitted"));
    assert!(ctx.text.chars().count() <= 3000);
}

#[test]
fn oversized_first_block_leaves_only_the_notice() {
    let results = vec![result("big.txt", &"y".repeat(500), 1), result("small.txt", "tiny", 2)];
    let ctx = ContextAssembler::format(&results, 200);

    assert_eq!(ctx.included_count, 0);
    assert!(ctx.truncated);
    assert!(ctx.text.contains("(2 documents omitted"));
}

#[test]
fn failed_rebuild_keeps_previous_artifact() {
    let built = built_corpus();
    let before = IndexArtifact::load(&built.config.index_dir).unwrap();

    let empty = TempDir::new().unwrap();
    let mut broken = built.config.clone();
    broken.data_dir = empty.path().to_path_buf();
    let err = build_index(&broken, built.embedder.as_ref()).unwrap_err();

    assert!(matches!(err, Error::NoDocumentsFound { .. }));
    assert_eq!(err.category(), ErrorCategory::BuildFailed);
    assert_eq!(IndexArtifact::load(&built.config.index_dir).unwrap(), before);
}

#[test]
fn shared_index_reports_missing_artifact_then_loads_once() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir(&data).unwrap();
    write_corpus(&data);
    let config = config(&data, &tmp.path().join("embeddings"));
    let shared = SharedIndex::new(&config.index_dir);

    let err = shared.get().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::IndexNotBuilt);
    assert!(!shared.is_loaded());

    build_index(&config, &HashEmbedder::new(config.hash_dim)).unwrap();
    let handles: Vec<Arc<IndexArtifact>> = thread::scope(|s| {
        let spawned: Vec<_> = (0..8).map(|_| s.spawn(|| shared.get().unwrap())).collect();
        spawned.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(shared.is_loaded());
    assert!(handles.iter().all(|a| Arc::ptr_eq(a, &handles[0])));
    assert_eq!(handles[0].len(), 3);
}

#[test]
fn answer_sends_context_and_question_to_generator() {
    let built = built_corpus();
    let generator = Arc::new(RecordingGenerator::default());
    let pipeline = RagPipeline::new(retriever(&built), generator.clone(), &built.config)
        .with_system_prompt("Answer from the documents only.");

    let query = "sourdough starter flour dough";
    let answer = pipeline.answer(query, Some(2)).unwrap();
    let (_, context) = pipeline.context(query, Some(2)).unwrap();

    assert_eq!(answer.query, query);
    assert_eq!(answer.content, "stub answer");
    assert_eq!(answer.used_documents.len(), 2);
    assert_eq!(answer.used_documents[0].source_name, "bread.txt");
    assert_eq!(answer.used_documents[0].preview, format!("{}...", BREAD_DOC.chars().take(150).collect::<String>()));

    let calls = generator.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.as_deref(), Some("Answer from the documents only."));
    assert_eq!(calls[0].1, user_prompt(&context, query));
    assert!(calls[0].1.ends_with("Using the documents above, answer the following question: sourdough starter flour dough"));
}

#[test]
fn generator_failure_is_returned() {
    let built = built_corpus();
    let pipeline = RagPipeline::new(retriever(&built), Arc::new(FailingGenerator), &built.config);
    let err = pipeline.answer("tomato", None).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(msg) if msg == "generation refused"));
}
