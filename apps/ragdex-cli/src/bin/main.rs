use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ragdex_core::config::{Config, Settings};
use ragdex_core::data_processor::{DirectoryReader, NodeParser};
use ragdex_core::{IndexList, IndexStruct, QueryBundle, StorageContext, VectorBackend};
use ragdex_embed::get_default_embedder;
use ragdex_query::{
    index_nodes, ComposableGraph, ExtractiveSummarizer, KeywordNodePostprocessor, PostprocessorChain, PrevNextMode,
    PrevNextNodePostprocessor, QueryContext, RetrieverQueryEngine, SimilarityPostprocessor, Summarizer, TreeBuilder,
};
use ragdex_text::{KeywordTableBuilder, SimpleKeywordExtractor};
use ragdex_vector::{SimpleVectorStore, VectorIndexBuilder};

const EMBED_CACHE_FILE: &str = "embedding_cache.json";
const GRAPH_ROOT_ID: &str = "graph";
const USAGE: &str = "Usage: ragdex <ingest|query|inspect> [args...]\n\
  ingest [dir]\n\
  query <list|keyword|vector|tree|graph> \"<query>\" [--top-k N] [--cutoff X] [--require W]... [--exclude W]... [--expand N] [--expand-mode next|previous|both]\n\
  inspect";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

#[derive(Debug, PartialEq)]
struct QueryArgs {
    target: String,
    query: String,
    top_k: Option<usize>,
    cutoff: Option<f32>,
    required: Vec<String>,
    excluded: Vec<String>,
    expand: Option<usize>,
    expand_mode: PrevNextMode,
}

fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    match args.get(i + 1) {
        Some(v) => Ok(v.as_str()),
        None => bail!("{flag} requires a value"),
    }
}

fn parse_query_args(args: &[String]) -> anyhow::Result<QueryArgs> {
    let mut positional = Vec::new();
    let mut top_k = None; let mut cutoff = None; let mut expand = None;
    let mut required = Vec::new(); let mut excluded = Vec::new();
    let mut expand_mode = PrevNextMode::Next;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--top-k" => { top_k = Some(flag_value(args, i, "--top-k")?.parse().context("--top-k requires a number")?); i += 1; }
            "--cutoff" => { cutoff = Some(flag_value(args, i, "--cutoff")?.parse().context("--cutoff requires a number")?); i += 1; }
            "--require" => { required.push(flag_value(args, i, "--require")?.to_string()); i += 1; }
            "--exclude" => { excluded.push(flag_value(args, i, "--exclude")?.to_string()); i += 1; }
            "--expand" => { expand = Some(flag_value(args, i, "--expand")?.parse().context("--expand requires a number")?); i += 1; }
            "--expand-mode" => { expand_mode = flag_value(args, i, "--expand-mode")?.parse()?; i += 1; }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            other => positional.push(other.to_string()),
        }
        i += 1;
    }
    let mut positional = positional.into_iter();
    let (Some(target), Some(query)) = (positional.next(), positional.next()) else {
        bail!("query needs an index and a query string\n{USAGE}");
    };
    Ok(QueryArgs { target, query, top_k, cutoff, required, excluded, expand, expand_mode })
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars { return flat; }
    format!("{}…", flat.chars().take(max_chars).collect::<String>())
}

fn ingest(config: &Config, settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let data_dir = args.first().map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(config.get::<String>("data_dir").unwrap_or_else(|_| "./data".to_string()))
    });
    let persist_dir = settings.persist_dir();
    println!("ragdex ingest\n=============");
    println!("Data directory: {}", data_dir.display());
    println!("Storage directory: {}", persist_dir.display());

    let documents = DirectoryReader::new(data_dir.clone()).load_documents()?;
    if documents.is_empty() { bail!("no .txt files under {}", data_dir.display()); }
    let parser = NodeParser::new(settings.chunking.clone())?;
    let mut nodes = parser.get_nodes_from_documents(&documents);
    println!("📄 {} documents → {} chunks", documents.len(), nodes.len());

    fs::create_dir_all(&persist_dir)?;
    let embedder = get_default_embedder(settings.index.embed_dim)?;
    let cache_path = persist_dir.join(EMBED_CACHE_FILE);
    let cached = embedder.load(&cache_path)?;
    info!(cached, "embedding cache ready");

    let mut engine = SimpleVectorStore::new(settings.index.embed_dim);
    let vector = VectorIndexBuilder::new(&embedder)
        .with_engine(&mut engine)
        .with_batch_size(settings.index.embed_batch_size)
        .show_progress(settings.index.show_progress)
        .build("vector", VectorBackend::Simple, &mut nodes)?;

    let mut ctx = StorageContext::new();
    ctx.docstore.add_documents(nodes.clone(), false)?;
    let mut list = IndexList::new("list");
    for node in &nodes { list.add_node(&node.id); }
    let extractor = SimpleKeywordExtractor::new();
    let keyword = KeywordTableBuilder::new(&extractor, settings.index.max_keywords_per_chunk).build("keyword", &nodes)?;
    let tree = TreeBuilder::new(&ExtractiveSummarizer, settings.index.num_children)?.build("tree", &nodes, &mut ctx.docstore)?;

    let leads: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
    let corpus = ExtractiveSummarizer.summarize(&leads)?;
    let mut list = IndexStruct::from(list);
    list.set_summary(format!("Every chunk in reading order. {corpus}"));
    let mut keyword = IndexStruct::from(keyword);
    keyword.set_summary(format!("Chunks looked up by keyword. {corpus}"));
    let mut vector = IndexStruct::from(vector);
    vector.set_summary(format!("Chunks ranked by semantic similarity. {corpus}"));
    let children = vec![list, keyword, vector, IndexStruct::from(tree)];

    // The graph root lists one index node per child so `query graph` can recurse into all of them.
    let summaries = index_nodes(children.iter())?;
    let mut root = IndexList::new(GRAPH_ROOT_ID);
    for node in &summaries { root.add_node(&node.id); }
    ctx.docstore.add_documents(summaries, false)?;
    for child in children { ctx.index_store.add(child)?; }
    ctx.index_store.add(root.into())?;

    ctx.persist(&persist_dir)?;
    engine.persist(&persist_dir)?;
    embedder.save(&cache_path)?;

    println!("\n✅ Ingest complete");
    for s in ctx.index_store.iter() { println!("  {:<8} {} ({} ids)", s.index_id(), s.get_type(), s.node_ids().len()); }
    println!("\n💡 To query, use: ragdex query <list|keyword|vector|tree|graph> '<query>'");
    Ok(())
}

fn load_graph(ctx: &StorageContext) -> anyhow::Result<ComposableGraph> {
    let shared = Arc::new(ctx.docstore.clone());
    let root = ctx.index_store.get(GRAPH_ROOT_ID)?.clone();
    let mut graph = ComposableGraph::new(root, Arc::clone(&shared));
    for id in ctx.index_store.ids().filter(|id| *id != GRAPH_ROOT_ID) {
        graph.add_index(ctx.index_store.get(id)?.clone(), Arc::clone(&shared))?;
    }
    Ok(graph)
}

fn query(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let opts = parse_query_args(args)?;
    let persist_dir = settings.persist_dir();
    let ctx = StorageContext::load(&persist_dir)
        .with_context(|| format!("loading indices from {} (run `ragdex ingest` first)", persist_dir.display()))?;
    let engine = SimpleVectorStore::load(&persist_dir)?;
    let embedder = get_default_embedder(settings.index.embed_dim)?;
    embedder.load(&persist_dir.join(EMBED_CACHE_FILE))?;
    let extractor = SimpleKeywordExtractor::new();
    let mut retrieval = settings.retrieval.clone();
    if let Some(k) = opts.top_k { retrieval.similarity_top_k = k; }
    let qctx = QueryContext::new(&ctx.docstore, &embedder, &extractor, &retrieval).with_engine(&engine);

    let mut chain = PostprocessorChain::new();
    if !opts.required.is_empty() || !opts.excluded.is_empty() {
        chain.push(KeywordNodePostprocessor::new(opts.required.clone(), opts.excluded.clone()));
    }
    if let Some(cutoff) = opts.cutoff { chain.push(SimilarityPostprocessor::new(cutoff)); }
    if let Some(n) = opts.expand { chain.push(PrevNextNodePostprocessor::new(n, opts.expand_mode)); }

    let graph;
    let query_engine = match opts.target.as_str() {
        "graph" => {
            graph = load_graph(&ctx)?;
            RetrieverQueryEngine::new(Box::new(graph.as_retriever(qctx))).with_docstore(&ctx.docstore)
        }
        "list" | "keyword" | "vector" | "tree" => RetrieverQueryEngine::for_index(ctx.index_store.get(&opts.target)?, &qctx)?,
        other => bail!("unknown index '{other}'\n{USAGE}"),
    };

    println!("🔍 ragdex query\n==============");
    println!("Index: {}  Query: {}", opts.target, opts.query);
    let out = query_engine.with_postprocessors(chain).query(&QueryBundle::new(opts.query.clone()))?;
    println!("\n🔍 Found {} results", out.nodes.len());
    for (i, hit) in out.nodes.iter().enumerate() {
        let score = hit.score.map_or_else(|| "-".to_string(), |s| format!("{s:.4}"));
        println!("\n  {}. score={}  id={}  doc={}", i + 1, score, hit.id(), hit.node.ref_doc_id.as_deref().unwrap_or("-"));
        println!("     📝 {}", snippet(&hit.node.text, 200));
    }
    Ok(())
}

fn inspect(settings: &Settings) -> anyhow::Result<()> {
    let persist_dir = settings.persist_dir();
    let ctx = StorageContext::load(&persist_dir)
        .with_context(|| format!("loading indices from {}", persist_dir.display()))?;
    println!("Storage: {}", persist_dir.display());
    println!("Nodes: {}  Documents: {}", ctx.docstore.len(), ctx.docstore.ref_doc_ids().len());
    println!("\n📊 Index structs:");
    for s in ctx.index_store.iter() {
        let summary = s.summary().map_or_else(|| "-".to_string(), |t| snippet(t, 80));
        println!("  {:<8} {:<20} ids={:<6} summary={}", s.index_id(), s.get_type().to_string(), s.node_ids().len(), summary);
    }
    match SimpleVectorStore::load(&persist_dir) {
        Ok(store) => println!("\nVector store: {} vectors (dim {})", store.len(), store.dimension()),
        Err(e) => println!("\nVector store: unavailable ({e:#})"),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let (cmd, args) = parse_args();
    match cmd.as_str() {
        "ingest" => ingest(&config, &settings, &args),
        "query" => query(&settings, &args),
        "inspect" => inspect(&settings),
        _ => { eprintln!("Unknown command: {}\n{USAGE}", cmd); std::process::exit(1); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> { args.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn parses_query_flags() {
        let opts = parse_query_args(&strings(&[
            "vector", "rain barrels", "--top-k", "4", "--cutoff", "0.25", "--require", "rain", "--exclude", "snow",
            "--require", "barrel", "--expand", "1", "--expand-mode", "both",
        ]))
        .unwrap();
        assert_eq!(opts.target, "vector");
        assert_eq!(opts.query, "rain barrels");
        assert_eq!(opts.top_k, Some(4));
        assert_eq!(opts.cutoff, Some(0.25));
        assert_eq!(opts.required, vec!["rain", "barrel"]);
        assert_eq!(opts.excluded, vec!["snow"]);
        assert_eq!(opts.expand, Some(1));
        assert_eq!(opts.expand_mode, PrevNextMode::Both);
    }

    #[test]
    fn rejects_bad_query_args() {
        assert!(parse_query_args(&strings(&["vector"])).is_err());
        assert!(parse_query_args(&strings(&["vector", "q", "--top-k"])).is_err());
        assert!(parse_query_args(&strings(&["vector", "q", "--top-k", "many"])).is_err());
        assert!(parse_query_args(&strings(&["vector", "q", "--fast"])).is_err());
    }

    #[test]
    fn snippet_flattens_and_truncates() {
        assert_eq!(snippet("a\nb", 10), "a b");
        assert_eq!(snippet("abcdef", 3), "abc…");
    }
}
