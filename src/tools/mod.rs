pub mod document_search;
pub mod executor;
pub mod lights;
pub mod registry;

pub use document_search::{
    DocumentRetriever, DocumentSearchTool, InMemoryRetriever, SearchFilters, SearchHit,
    DOCUMENT_SEARCH_TOOL,
};
pub use executor::ToolExecutor;
pub use lights::{Light, LightStore, LightTool, LIGHTS_TOOL};
pub use registry::{Tool, ToolRegistry};
