use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;

use super::AnalysisError;
use crate::knowledge::{Cardinality, ColumnSpec, EntitySchema, KnowledgeTable, Lookup, SchemaCatalog};

const MERMAID_MAX_COLUMNS: usize = 8;
const PLANTUML_MAX_COLUMNS: usize = 5;
const EXAMPLE_QUERY_COLUMNS: usize = 5;

fn is_foreign_key(column: &ColumnSpec) -> bool {
    column.name.ends_with("Id") && column.name != "Id"
}

/// Renders Markdown reference documentation for the given entities.
pub fn schema_markdown(entities: &[&EntitySchema], include_relationships: bool, include_examples: bool) -> String {
    let mut doc = String::from("# Creatio CRM Schema Documentation\n\n");
    let _ = write!(doc, "*Documentation for {} entities*\n\n---\n\n", entities.len());

    for entity in entities {
        let _ = write!(
            doc,
            "## {}\n\n**Description:** {}\n\n**Table Name:** `{}`\n\n",
            entity.name, entity.description, entity.table_name
        );

        doc.push_str("### Columns\n\n| Column | Type | Description |\n|--------|------|-------------|\n");
        for column in entity.columns {
            let _ = writeln!(doc, "| {} | {} | {} |", column.name, column.data_type, column.description);
        }
        doc.push('\n');

        if include_relationships && !entity.relationships.is_empty() {
            doc.push_str("### Relationships\n\n");
            for relationship in entity.relationships {
                let _ = write!(
                    doc,
                    "- **{}** ({})",
                    relationship.target_entity,
                    relationship.cardinality.as_str()
                );
                if let Some(via) = relationship.join.describe() {
                    let _ = write!(doc, " via `{via}`");
                }
                doc.push('\n');
            }
            doc.push('\n');
        }

        if include_examples {
            let columns = entity
                .columns
                .iter()
                .take(EXAMPLE_QUERY_COLUMNS)
                .map(|column| column.name)
                .collect::<Vec<_>>();
            let _ = write!(
                doc,
                "### Example Queries\n\n```sql\n-- Get all {name} records\nSELECT TOP 100 * FROM [{table}]\n\n\
                 -- Get {name} with specific columns\nSELECT {columns} FROM [{table}]\n```\n\n",
                name = entity.name,
                table = entity.table_name,
                columns = columns.join(", "),
            );
        }

        doc.push_str("---\n\n");
    }

    doc
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnReference {
    pub table: &'static str,
    pub column: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DictionaryColumn {
    pub column_name: &'static str,
    pub data_type: &'static str,
    pub description: &'static str,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub business_rules: Vec<&'static str>,
    pub sample_values: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<ColumnReference>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataDictionary {
    pub entity: &'static str,
    pub table_name: &'static str,
    pub description: &'static str,
    pub columns: Vec<DictionaryColumn>,
    pub primary_key: &'static str,
    pub foreign_key_count: usize,
    pub indexes_recommended: Vec<String>,
    pub audit_columns: Vec<(&'static str, &'static str)>,
    pub notes: Vec<&'static str>,
}

/// Builds a column-level data dictionary for one entity.
pub fn data_dictionary(entity: &str) -> Lookup<DataDictionary> {
    SchemaCatalog.lookup(entity).map(|entity| {
        let columns = entity.columns.iter().map(dictionary_column).collect::<Vec<_>>();
        let mut indexes_recommended = columns
            .iter()
            .filter(|column| column.is_foreign_key)
            .map(|column| format!("IX_{}", column.column_name))
            .collect::<Vec<_>>();
        indexes_recommended.push("IX_CreatedOn (for date range queries)".to_string());
        indexes_recommended.push("IX_OwnerId_CreatedOn (for user activity queries)".to_string());

        DataDictionary {
            entity: entity.name,
            table_name: entity.table_name,
            description: entity.description,
            foreign_key_count: columns.iter().filter(|column| column.is_foreign_key).count(),
            columns,
            primary_key: "Id",
            indexes_recommended,
            audit_columns: vec![
                ("CreatedOn", "Record creation timestamp"),
                ("ModifiedOn", "Last modification timestamp"),
                ("CreatedById", "User who created the record"),
                ("ModifiedById", "User who last modified the record"),
            ],
            notes: vec![
                "All timestamps are stored in UTC",
                "GUID columns use uniqueidentifier type",
                "Lookup references point to Id columns in related tables",
            ],
        }
    })
}

fn dictionary_column(column: &ColumnSpec) -> DictionaryColumn {
    let is_foreign_key = is_foreign_key(column);
    DictionaryColumn {
        column_name: column.name,
        data_type: column.data_type,
        description: column.description,
        nullable: column.name != "Id",
        is_primary_key: column.name == "Id",
        is_foreign_key,
        business_rules: business_rules(column),
        sample_values: sample_values(column),
        references: is_foreign_key.then(|| column_reference(column.name)),
    }
}

fn business_rules(column: &ColumnSpec) -> Vec<&'static str> {
    match column.name {
        "Id" => vec!["Auto-generated GUID primary key"],
        "Name" => vec!["Required field for record identification"],
        "Email" => vec!["Must be valid email format", "Should be unique for Contact records"],
        "OwnerId" => vec!["Must reference active system user", "Used for record ownership and security"],
        name if name.contains("Phone") => vec!["Phone number format validation recommended"],
        name if name.contains("Date") => vec!["Date validation - cannot be historical for future-dated fields"],
        "Amount" => vec!["Non-negative value constraint recommended"],
        _ if column.data_type == "decimal" => vec!["Non-negative value constraint recommended"],
        _ => Vec::new(),
    }
}

fn sample_values(column: &ColumnSpec) -> Vec<&'static str> {
    match column.data_type {
        "uniqueidentifier" => vec!["00000000-0000-0000-0000-000000000001"],
        text if text.starts_with("nvarchar") => {
            if column.name.contains("Email") {
                vec!["john.doe@example.com", "jane.smith@company.org"]
            } else if column.name.contains("Phone") {
                vec!["+1-555-123-4567", "(555) 987-6543"]
            } else if column.name.contains("Name") {
                vec!["Acme Corporation", "John Doe"]
            } else {
                vec!["Sample text value"]
            }
        }
        "datetime" => vec!["2026-01-15T10:30:00Z"],
        "decimal" => vec!["10000.00", "25000.50"],
        "int" => vec!["100", "500"],
        "bit" => vec!["1 (true)", "0 (false)"],
        _ => Vec::new(),
    }
}

fn column_reference(column: &'static str) -> ColumnReference {
    let table = match column {
        "AccountId" | "QualifiedAccountId" => "Account",
        "ContactId" | "OwnerId" | "PrimaryContactId" | "QualifiedContactId" => "Contact",
        "OpportunityId" => "Opportunity",
        "LeadId" => "Lead",
        "ActivityId" => "Activity",
        "StageId" => "OpportunityStage",
        "ParentRoleId" | "GroupId" => "SysAdminUnit",
        other => return ColumnReference { table: guess_reference_table(other), column: "Id" },
    };
    ColumnReference { table, column: "Id" }
}

/// Lookup table name implied by an `...Id` column.
fn guess_reference_table(column: &'static str) -> &'static str {
    let base = column.strip_suffix("Id").unwrap_or(column);
    match base {
        "Owner" => "Contact",
        "Stage" => "OpportunityStage",
        other => other,
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramFormat {
    #[default]
    Mermaid,
    PlantUml,
    Dbml,
}

impl FromStr for DiagramFormat {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mermaid" => Ok(Self::Mermaid),
            "plantuml" => Ok(Self::PlantUml),
            "dbml" => Ok(Self::Dbml),
            other => Err(AnalysisError::InvalidDiagramFormat(other.to_string())),
        }
    }
}

impl DiagramFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mermaid => "mermaid",
            Self::PlantUml => "plantuml",
            Self::Dbml => "dbml",
        }
    }

    pub fn usage_instructions(&self) -> &'static str {
        match self {
            Self::Mermaid => {
                "To render this Mermaid diagram:\n\
                 1. Use Mermaid Live Editor: https://mermaid.live\n\
                 2. Paste in GitHub/GitLab markdown with ```mermaid code block\n\
                 3. Use VS Code with Mermaid extension"
            }
            Self::PlantUml => {
                "To render this PlantUML diagram:\n\
                 1. Use PlantUML Online: http://www.plantuml.com/plantuml\n\
                 2. Use VS Code with PlantUML extension\n\
                 3. Install PlantUML locally with Java runtime"
            }
            Self::Dbml => {
                "To render this DBML diagram:\n\
                 1. Use dbdiagram.io: https://dbdiagram.io\n\
                 2. Use DBML CLI tool for programmatic rendering\n\
                 3. Export to various formats including SQL"
            }
        }
    }
}

/// Renders an entity-relationship diagram in the requested syntax.
pub fn render_erd(entities: &[&EntitySchema], format: DiagramFormat, show_columns: bool) -> String {
    match format {
        DiagramFormat::Mermaid => mermaid(entities, show_columns),
        DiagramFormat::PlantUml => plantuml(entities, show_columns),
        DiagramFormat::Dbml => dbml(entities),
    }
}

/// Relationships between selected entities, one per unordered pair.
fn diagram_edges(entities: &[&EntitySchema]) -> Vec<(&'static str, &'static str, Cardinality)> {
    let selected = entities.iter().map(|entity| entity.name).collect::<BTreeSet<_>>();
    let mut seen = BTreeSet::new();
    let mut edges = Vec::new();
    for entity in entities {
        for relationship in entity.relationships {
            let target = relationship.target_entity;
            if !selected.contains(target) || relationship.cardinality == Cardinality::SelfReferencing {
                continue;
            }
            let pair = if entity.name <= target { (entity.name, target) } else { (target, entity.name) };
            if seen.insert(pair) {
                edges.push((entity.name, target, relationship.cardinality));
            }
        }
    }
    edges
}

fn crow_foot(cardinality: Cardinality) -> &'static str {
    match cardinality {
        Cardinality::OneToMany => "||--o{",
        Cardinality::ManyToOne => "}o--||",
        Cardinality::ManyToMany => "}o--o{",
        Cardinality::OneToOne | Cardinality::SelfReferencing => "||--||",
    }
}

fn mermaid_label(cardinality: Cardinality) -> &'static str {
    match cardinality {
        Cardinality::OneToMany => "has",
        Cardinality::ManyToOne => "belongs_to",
        Cardinality::ManyToMany => "relates",
        Cardinality::OneToOne | Cardinality::SelfReferencing => "is",
    }
}

fn mermaid(entities: &[&EntitySchema], show_columns: bool) -> String {
    let mut lines = vec!["erDiagram".to_string()];
    for entity in entities {
        if !show_columns {
            lines.push(format!("    {}", entity.name));
            continue;
        }
        lines.push(format!("    {} {{", entity.name));
        for column in entity.columns.iter().take(MERMAID_MAX_COLUMNS) {
            let data_type = column.data_type.replace('(', "_").replace([')', ','], "");
            let marker = if column.name == "Id" {
                " PK"
            } else if is_foreign_key(column) {
                " FK"
            } else {
                ""
            };
            lines.push(format!("        {data_type} {}{marker}", column.name));
        }
        lines.push("    }".to_string());
    }
    for (from, to, cardinality) in diagram_edges(entities) {
        lines.push(format!("    {from} {} {to} : {}", crow_foot(cardinality), mermaid_label(cardinality)));
    }
    lines.join("\n")
}

fn plantuml(entities: &[&EntitySchema], show_columns: bool) -> String {
    let mut lines = vec!["@startuml".to_string(), "skinparam linetype ortho".to_string(), String::new()];
    for entity in entities {
        if !show_columns {
            lines.push(format!("entity {}", entity.name));
            continue;
        }
        lines.push(format!("entity {} {{", entity.name));
        lines.push("    * Id : uniqueidentifier <<PK>>".to_string());
        for column in entity.columns.iter().skip(1).take(PLANTUML_MAX_COLUMNS) {
            let marker = if column.name.ends_with("Id") { " <<FK>>" } else { "" };
            lines.push(format!("    {} : {}{marker}", column.name, column.data_type));
        }
        lines.push("}".to_string());
    }
    lines.push(String::new());
    for (from, to, cardinality) in diagram_edges(entities) {
        lines.push(format!("{from} {} {to}", crow_foot(cardinality)));
    }
    lines.push(String::new());
    lines.push("@enduml".to_string());
    lines.join("\n")
}

fn dbml(entities: &[&EntitySchema]) -> String {
    let mut lines = vec!["// Creatio CRM Schema - DBML Format".to_string(), String::new()];
    for entity in entities {
        lines.push(format!("Table {} {{", entity.table_name));
        for column in entity.columns {
            let settings = if column.name == "Id" {
                " [pk]".to_string()
            } else if column.name.ends_with("Id") {
                format!(" [ref: > {}.Id]", column_reference(column.name).table)
            } else {
                String::new()
            };
            lines.push(format!(
                "    {} {}{settings} // {}",
                column.name, column.data_type, column.description
            ));
        }
        lines.push("}".to_string());
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{data_dictionary, render_erd, schema_markdown, DiagramFormat};
    use crate::analysis::EntitySelection;
    use crate::knowledge::Lookup;

    #[test]
    fn markdown_documents_columns_relationships_and_examples() {
        let selection = EntitySelection::parse("Contact");
        let doc = schema_markdown(&selection.entities, true, true);

        assert!(doc.starts_with("# Creatio CRM Schema Documentation\n\n*Documentation for 1 entities*"));
        assert!(doc.contains("**Table Name:** `Contact`"));
        assert!(doc.contains("| Email | nvarchar(250) | Primary email address |"));
        assert!(doc.contains("- **Account** (many-to-one) via `AccountId`"));
        assert!(doc.contains("- **Activity** (one-to-many)\n"));
        assert!(doc.contains("SELECT Id, Name, AccountId, Email, Phone FROM [Contact]"));
    }

    #[test]
    fn markdown_can_skip_optional_sections() {
        let selection = EntitySelection::parse("Product");
        let doc = schema_markdown(&selection.entities, false, false);
        assert!(!doc.contains("### Relationships"));
        assert!(!doc.contains("```sql"));
    }

    #[test]
    fn data_dictionary_marks_keys_and_references() {
        let dictionary = data_dictionary("Opportunity").found().expect("Opportunity is cataloged");
        let id = &dictionary.columns[0];
        assert!(id.is_primary_key && !id.nullable);

        let stage = dictionary.columns.iter().find(|column| column.column_name == "StageId").expect("StageId");
        assert_eq!(stage.references.map(|reference| reference.table), Some("OpportunityStage"));

        let owner = dictionary.columns.iter().find(|column| column.column_name == "OwnerId").expect("OwnerId");
        assert_eq!(owner.business_rules.len(), 2);

        let amount = dictionary.columns.iter().find(|column| column.column_name == "Amount").expect("Amount");
        assert_eq!(amount.sample_values, vec!["10000.00", "25000.50"]);

        assert_eq!(dictionary.foreign_key_count, 4);
        assert!(dictionary.indexes_recommended.contains(&"IX_AccountId".to_string()));
    }

    #[test]
    fn data_dictionary_for_unknown_entity_misses() {
        assert!(matches!(data_dictionary("Invoice"), Lookup::NotFound(_)));
    }

    #[test]
    fn mermaid_dedups_relationship_pairs() {
        let selection = EntitySelection::parse("Contact,Account");
        let diagram = render_erd(&selection.entities, DiagramFormat::Mermaid, false);
        assert_eq!(diagram, "erDiagram\n    Contact\n    Account\n    Contact }o--|| Account : belongs_to");
    }

    #[test]
    fn mermaid_columns_are_capped_and_marked() {
        let selection = EntitySelection::parse("Account");
        let diagram = render_erd(&selection.entities, DiagramFormat::Mermaid, true);
        assert!(diagram.contains("        uniqueidentifier Id PK"));
        assert!(diagram.contains("        nvarchar_250 Name\n"));
        assert!(diagram.contains("        uniqueidentifier TypeId FK"));
        assert!(!diagram.contains("AnnualRevenue"));
    }

    #[test]
    fn plantuml_and_dbml_render_their_own_syntax() {
        let selection = EntitySelection::parse("Case,Contact");
        let plantuml = render_erd(&selection.entities, DiagramFormat::PlantUml, false);
        assert!(plantuml.starts_with("@startuml\nskinparam linetype ortho"));
        assert!(plantuml.contains("Case }o--|| Contact"));
        assert!(plantuml.ends_with("@enduml"));

        let dbml = render_erd(&selection.entities, DiagramFormat::Dbml, false);
        assert!(dbml.contains("Table Case {"));
        assert!(dbml.contains("    Id uniqueidentifier [pk] // Primary key"));
        assert!(dbml.contains("    OwnerId uniqueidentifier [ref: > Contact.Id]"));
        assert!(dbml.contains("    CategoryId uniqueidentifier [ref: > Category.Id]"));
    }

    #[test]
    fn diagram_format_parses_labels() {
        assert_eq!("PlantUML".parse::<DiagramFormat>(), Ok(DiagramFormat::PlantUml));
        assert!("graphviz".parse::<DiagramFormat>().is_err());
        assert!(DiagramFormat::Dbml.usage_instructions().contains("dbdiagram.io"));
    }
}
