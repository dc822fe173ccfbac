//! Static Creatio CRM knowledge: entity schemas and the KPI library.
//!
//! Both tables are `'static` data compiled into the binary. Nothing in the
//! workspace can mutate them; consumers only get shared references through
//! [`KnowledgeTable::lookup`] and the read accessors on each table.

pub mod kpi;
pub mod schema;

use serde::Serialize;

pub use kpi::{Frequency, KpiCategory, KpiDefinition, KpiLibrary, Unit};
pub use schema::{
    Cardinality, ColumnAnalysis, ColumnSpec, EntitySchema, Join, Relationship,
    RelationshipAnalysis, RelationshipPath, SchemaCatalog, SchemaSearchResult, SearchScope,
};

/// Result of a keyed lookup. A miss is an ordinary value, never an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound(NotFound),
}

/// Describes a lookup miss: which table was asked, for what, and what exists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotFound {
    pub table: &'static str,
    pub key: String,
    pub available: Vec<String>,
}

impl NotFound {
    pub fn message(&self) -> String {
        format!("{} `{}` not found in the {} table", self.table_noun(), self.key, self.table)
    }

    pub fn suggestion(&self) -> String {
        format!("Try one of: {}", self.available.join(", "))
    }

    fn table_noun(&self) -> &'static str {
        if self.table == KpiLibrary::NAME {
            "KPI"
        } else {
            "entity"
        }
    }
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(record) => Some(record),
            Self::NotFound(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(record) => Lookup::Found(f(record)),
            Self::NotFound(miss) => Lookup::NotFound(miss),
        }
    }

    pub fn into_result(self) -> Result<T, NotFound> {
        match self {
            Self::Found(record) => Ok(record),
            Self::NotFound(miss) => Err(miss),
        }
    }
}

/// Read-only keyed access to one knowledge table.
///
/// Keys are matched case-sensitively and exactly; there is no fuzzy matching.
pub trait KnowledgeTable {
    type Record: 'static;

    const NAME: &'static str;

    fn lookup(&self, key: &str) -> Lookup<&'static Self::Record>;

    fn keys(&self) -> Vec<String>;

    fn not_found(&self, key: &str) -> NotFound {
        NotFound { table: Self::NAME, key: key.to_string(), available: self.keys() }
    }
}

#[cfg(test)]
mod tests {
    use super::{KnowledgeTable, KpiLibrary, Lookup, SchemaCatalog};

    #[test]
    fn every_known_entity_resolves_to_itself() {
        let catalog = SchemaCatalog;
        for key in catalog.keys() {
            match catalog.lookup(&key) {
                Lookup::Found(entity) => assert_eq!(entity.name, key),
                Lookup::NotFound(miss) => panic!("expected {key} to resolve, got {miss:?}"),
            }
        }
    }

    #[test]
    fn unknown_entity_is_a_structured_miss() {
        let lookup = SchemaCatalog.lookup("Invoice");
        let miss = match lookup {
            Lookup::NotFound(miss) => miss,
            Lookup::Found(entity) => panic!("unexpected entity {}", entity.name),
        };
        assert_eq!(miss.key, "Invoice");
        assert_eq!(miss.table, SchemaCatalog::NAME);
        assert!(miss.available.iter().any(|name| name == "Contact"));
        assert!(miss.message().contains("entity `Invoice` not found"));
    }

    #[test]
    fn lookups_are_case_sensitive() {
        assert!(!SchemaCatalog.lookup("contact").is_found());
        assert!(!KpiLibrary.lookup("Sales.win_rate").is_found());
    }

    #[test]
    fn every_kpi_path_resolves_to_itself() {
        let library = KpiLibrary;
        for key in library.keys() {
            let kpi = library.lookup(&key).found().expect("listed key should resolve");
            assert_eq!(kpi.id(), key);
        }
    }

    #[test]
    fn lookup_map_and_result_conversions() {
        let name = SchemaCatalog.lookup("Account").map(|entity| entity.name);
        assert_eq!(name, Lookup::Found("Account"));

        let miss = KpiLibrary.lookup("sales").into_result().expect_err("malformed path");
        assert_eq!(miss.key, "sales");
        assert!(miss.message().starts_with("KPI"));
        assert!(miss.suggestion().contains("sales.win_rate"));
    }
}
