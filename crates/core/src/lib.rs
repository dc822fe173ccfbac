pub mod analysis;
pub mod config;
pub mod errors;
pub mod knowledge;

pub use analysis::{AnalysisError, EntitySelection, QueryKind};
pub use config::{AppConfig, ConfigError, LlmConfig, LlmProvider, LoadOptions, LogFormat};
pub use errors::{ApplicationError, InterfaceError};
pub use knowledge::{
    KnowledgeTable, KpiCategory, KpiDefinition, KpiLibrary, Lookup, NotFound, SchemaCatalog,
};
