pub mod config;
pub mod data_processor;
pub mod docstore;
pub mod error;
pub mod index_struct;
pub mod storage;
pub mod traits;
pub mod types;

pub use docstore::DocumentStore;
pub use error::{Error, Result};
pub use index_struct::{
    IndexDict, IndexGraph, IndexList, IndexStruct, IndexStructType, KeywordTable, KnowledgeGraph, Triplet,
    VectorBackend,
};
pub use storage::{IndexStore, StorageContext};
pub use traits::{MetadataFilters, QueryBundle, Retrieval, Retriever};
pub use types::{Document, Metadata, MetadataMode, MetadataValue, Node, NodeId, NodeRelationship, NodeWithScore, SimilarityTracker};
