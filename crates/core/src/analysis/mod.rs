//! Deterministic helpers built on top of the knowledge tables.
//!
//! Nothing here talks to a model provider. Each helper turns structured
//! input into a serializable report that the agent layer embeds in prompts
//! and the CLI prints directly for offline commands.

pub mod docs;
pub mod metrics;
pub mod query;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::knowledge::{EntitySchema, KnowledgeTable, SchemaCatalog};

pub use docs::{DataDictionary, DiagramFormat};
pub use metrics::{Audience, DashboardDesign, MetricCalculation, MetricDefinitionDraft, TimePeriod};
pub use query::{ODataQuery, ODataRequest, OptimizationReport, SqlQuery, SqlRequest, ValidationReport};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("at least one entity is required")]
    NoEntities,
    #[error("unsupported query type `{0}` (expected sql|odata)")]
    InvalidQueryKind(String),
    #[error("unsupported diagram format `{0}` (expected mermaid|plantuml|dbml)")]
    InvalidDiagramFormat(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    #[default]
    Sql,
    OData,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::OData => "odata",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryKind {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sql" => Ok(Self::Sql),
            "odata" => Ok(Self::OData),
            other => Err(AnalysisError::InvalidQueryKind(other.to_string())),
        }
    }
}

/// Entities picked from a user-supplied list (`all` or comma separated).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EntitySelection {
    #[serde(serialize_with = "serialize_entity_names")]
    pub entities: Vec<&'static EntitySchema>,
    pub missing: Vec<String>,
}

fn serialize_entity_names<S>(
    entities: &[&'static EntitySchema],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(entities.iter().map(|entity| entity.name))
}

impl EntitySelection {
    pub fn parse(list: &str) -> Self {
        let catalog = SchemaCatalog;
        if list.trim().eq_ignore_ascii_case("all") {
            return Self { entities: catalog.entities().iter().collect(), missing: Vec::new() };
        }

        let mut selection = Self::default();
        for name in split_list(list) {
            match catalog.lookup(&name).found() {
                Some(entity) if !selection.contains(entity.name) => selection.entities.push(entity),
                Some(_) => {}
                None => selection.missing.push(name),
            }
        }
        selection
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.iter().any(|entity| entity.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entities.iter().map(|entity| entity.name).collect()
    }
}

/// Splits a comma separated list, trimming blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{split_list, EntitySelection, QueryKind};

    #[test]
    fn selection_all_takes_whole_catalog() {
        let selection = EntitySelection::parse(" ALL ");
        assert_eq!(selection.entities.len(), 9);
        assert!(selection.missing.is_empty());
    }

    #[test]
    fn selection_reports_unknown_names_and_dedups() {
        let selection = EntitySelection::parse("Contact, Invoice,Contact,,Account");
        assert_eq!(selection.names(), vec!["Contact", "Account"]);
        assert_eq!(selection.missing, vec!["Invoice".to_string()]);
    }

    #[test]
    fn split_list_drops_blank_items() {
        assert_eq!(split_list(" a , ,b,"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn query_kind_parses_case_insensitively() {
        assert_eq!("OData".parse::<QueryKind>(), Ok(QueryKind::OData));
        assert!("graphql".parse::<QueryKind>().is_err());
    }
}
