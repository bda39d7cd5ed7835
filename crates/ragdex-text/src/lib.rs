pub mod extract;
pub mod kg;
pub mod table;
pub mod tantivy_utils;

pub use extract::{LlmKeywordExtractor, LlmTripletExtractor, SimpleKeywordExtractor};
pub use kg::{KgRetriever, KnowledgeGraphBuilder};
pub use table::{KeywordTableBuilder, KeywordTableRetriever};
