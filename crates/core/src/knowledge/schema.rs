use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::{KnowledgeTable, Lookup};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub data_type: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
    SelfReferencing,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
            Self::SelfReferencing => "self-referencing",
        }
    }
}

/// How two entities are physically linked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Join {
    Column(&'static str),
    Junction(&'static str),
    Detail,
}

impl Join {
    pub fn describe(&self) -> Option<&'static str> {
        match self {
            Self::Column(name) | Self::Junction(name) => Some(name),
            Self::Detail => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub target_entity: &'static str,
    pub cardinality: Cardinality,
    pub join: Join,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct EntitySchema {
    pub name: &'static str,
    pub description: &'static str,
    pub table_name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub relationships: &'static [Relationship],
}

const fn col(name: &'static str, data_type: &'static str, description: &'static str) -> ColumnSpec {
    ColumnSpec { name, data_type, description }
}

const fn rel(target_entity: &'static str, cardinality: Cardinality, join: Join) -> Relationship {
    Relationship { target_entity, cardinality, join }
}

use Cardinality::{ManyToMany, ManyToOne, OneToMany, OneToOne, SelfReferencing};
use Join::{Column, Detail, Junction};

const GUID: &str = "uniqueidentifier";
const TEXT: &str = "nvarchar(250)";
const LONG_TEXT: &str = "nvarchar(500)";
const DATETIME: &str = "datetime";
const DECIMAL: &str = "decimal";

const CONTACT_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Name", TEXT, "Full name of the contact"),
    col("AccountId", GUID, "FK to Account - associated company"),
    col("Email", TEXT, "Primary email address"),
    col("Phone", TEXT, "Primary phone number"),
    col("MobilePhone", TEXT, "Mobile phone number"),
    col("JobTitle", TEXT, "Contact's job title"),
    col("DepartmentId", GUID, "FK to Department lookup"),
    col("OwnerId", GUID, "FK to Contact - record owner"),
    col("TypeId", GUID, "FK to ContactType lookup"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
    col("ModifiedOn", DATETIME, "Last modification timestamp"),
];

const CONTACT_RELATIONSHIPS: &[Relationship] = &[
    rel("Account", ManyToOne, Column("AccountId")),
    rel("Activity", OneToMany, Detail),
    rel("Opportunity", OneToMany, Junction("OpportunityContact")),
    rel("Lead", OneToOne, Column("QualifiedContactId")),
];

const ACCOUNT_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Name", TEXT, "Company name"),
    col("TypeId", GUID, "FK to AccountType lookup"),
    col("IndustryId", GUID, "FK to AccountIndustry lookup"),
    col("OwnerId", GUID, "FK to Contact - account owner"),
    col("PrimaryContactId", GUID, "FK to Contact - primary contact"),
    col("Phone", TEXT, "Main phone number"),
    col("Web", TEXT, "Website URL"),
    col("AnnualRevenue", DECIMAL, "Annual revenue amount"),
    col("EmployeesNumber", "int", "Number of employees"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
    col("ModifiedOn", DATETIME, "Last modification timestamp"),
];

const ACCOUNT_RELATIONSHIPS: &[Relationship] = &[
    rel("Contact", OneToMany, Column("AccountId")),
    rel("Opportunity", OneToMany, Column("AccountId")),
    rel("Activity", OneToMany, Detail),
    rel("Case", OneToMany, Column("AccountId")),
];

const OPPORTUNITY_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Title", TEXT, "Opportunity name/title"),
    col("AccountId", GUID, "FK to Account"),
    col("StageId", GUID, "FK to OpportunityStage lookup"),
    col("Amount", DECIMAL, "Deal value/amount"),
    col("Probability", "int", "Win probability percentage"),
    col("OwnerId", GUID, "FK to Contact - opportunity owner"),
    col("CloseDate", DATETIME, "Expected close date"),
    col("DueDate", DATETIME, "Due date"),
    col("LeadTypeId", GUID, "FK to LeadType - source type"),
    col("IsPrimary", "bit", "Primary opportunity flag"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
    col("ModifiedOn", DATETIME, "Last modification timestamp"),
];

const OPPORTUNITY_RELATIONSHIPS: &[Relationship] = &[
    rel("Account", ManyToOne, Column("AccountId")),
    rel("Contact", ManyToMany, Junction("OpportunityContact")),
    rel("OpportunityStage", ManyToOne, Column("StageId")),
    rel("Product", ManyToMany, Junction("OpportunityProductInterest")),
    rel("Activity", OneToMany, Detail),
];

const LEAD_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("LeadName", TEXT, "Lead name/title"),
    col("Contact", TEXT, "Contact person name"),
    col("Account", TEXT, "Company name (text)"),
    col("Email", TEXT, "Email address"),
    col("MobilePhone", TEXT, "Mobile phone"),
    col("QualifyStatusId", GUID, "FK to QualifyStatus lookup"),
    col("LeadSourceId", GUID, "FK to LeadSource lookup"),
    col("LeadTypeId", GUID, "FK to LeadType lookup"),
    col("OwnerId", GUID, "FK to Contact - lead owner"),
    col("QualifiedContactId", GUID, "FK to Contact - converted contact"),
    col("QualifiedAccountId", GUID, "FK to Account - converted account"),
    col("Budget", DECIMAL, "Estimated budget"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
];

const LEAD_RELATIONSHIPS: &[Relationship] = &[
    rel("Contact", OneToOne, Column("QualifiedContactId")),
    rel("Account", OneToOne, Column("QualifiedAccountId")),
    rel("Activity", OneToMany, Detail),
];

const ACTIVITY_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Title", LONG_TEXT, "Activity subject/title"),
    col("TypeId", GUID, "FK to ActivityType lookup"),
    col("StatusId", GUID, "FK to ActivityStatus lookup"),
    col("PriorityId", GUID, "FK to ActivityPriority lookup"),
    col("OwnerId", GUID, "FK to Contact - activity owner"),
    col("ContactId", GUID, "FK to Contact - related contact"),
    col("AccountId", GUID, "FK to Account - related account"),
    col("OpportunityId", GUID, "FK to Opportunity"),
    col("StartDate", DATETIME, "Activity start date/time"),
    col("DueDate", DATETIME, "Activity due date/time"),
    col("ResultId", GUID, "FK to ActivityResult lookup"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
];

const ACTIVITY_RELATIONSHIPS: &[Relationship] = &[
    rel("Contact", ManyToOne, Column("ContactId")),
    rel("Account", ManyToOne, Column("AccountId")),
    rel("Opportunity", ManyToOne, Column("OpportunityId")),
    rel("ActivityParticipant", OneToMany, Detail),
];

const CASE_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Number", TEXT, "Case number"),
    col("Subject", LONG_TEXT, "Case subject"),
    col("StatusId", GUID, "FK to CaseStatus lookup"),
    col("PriorityId", GUID, "FK to CasePriority lookup"),
    col("CategoryId", GUID, "FK to CaseCategory lookup"),
    col("ContactId", GUID, "FK to Contact - reporting contact"),
    col("AccountId", GUID, "FK to Account - associated account"),
    col("OwnerId", GUID, "FK to Contact - case owner"),
    col("GroupId", GUID, "FK to SysAdminUnit - assigned group"),
    col("RegisteredOn", DATETIME, "Registration timestamp"),
    col("SolutionDate", DATETIME, "Solution/resolution date"),
    col("SatisfactionLevelId", GUID, "FK to SatisfactionLevel lookup"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
];

const CASE_RELATIONSHIPS: &[Relationship] = &[
    rel("Contact", ManyToOne, Column("ContactId")),
    rel("Account", ManyToOne, Column("AccountId")),
    rel("Activity", OneToMany, Detail),
];

const PRODUCT_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Name", TEXT, "Product name"),
    col("Code", "nvarchar(50)", "Product code/SKU"),
    col("TypeId", GUID, "FK to ProductType lookup"),
    col("CategoryId", GUID, "FK to ProductCategory lookup"),
    col("Price", DECIMAL, "Unit price"),
    col("IsActive", "bit", "Active flag"),
    col("Description", "nvarchar(max)", "Product description"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
];

const PRODUCT_RELATIONSHIPS: &[Relationship] = &[
    rel("Opportunity", ManyToMany, Junction("OpportunityProductInterest")),
    rel("Order", OneToMany, Junction("OrderProduct")),
];

const ORDER_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Number", TEXT, "Order number"),
    col("AccountId", GUID, "FK to Account - customer"),
    col("ContactId", GUID, "FK to Contact - order contact"),
    col("OpportunityId", GUID, "FK to Opportunity - source opportunity"),
    col("StatusId", GUID, "FK to OrderStatus lookup"),
    col("Amount", DECIMAL, "Order total amount"),
    col("OwnerId", GUID, "FK to Contact - order owner"),
    col("Date", DATETIME, "Order date"),
    col("CreatedOn", DATETIME, "Record creation timestamp"),
];

const ORDER_RELATIONSHIPS: &[Relationship] = &[
    rel("Account", ManyToOne, Column("AccountId")),
    rel("Contact", ManyToOne, Column("ContactId")),
    rel("Opportunity", ManyToOne, Column("OpportunityId")),
    rel("OrderProduct", OneToMany, Detail),
];

const SYS_ADMIN_UNIT_COLUMNS: &[ColumnSpec] = &[
    col("Id", GUID, "Primary key"),
    col("Name", TEXT, "User/group name"),
    col("ContactId", GUID, "FK to Contact - linked contact"),
    col("SysAdminUnitTypeId", GUID, "FK - user type (user, role, org)"),
    col("ParentRoleId", GUID, "FK to parent role/group"),
    col("Active", "bit", "Active flag"),
    col("LoggedIn", "bit", "Currently logged in flag"),
];

const SYS_ADMIN_UNIT_RELATIONSHIPS: &[Relationship] = &[
    rel("Contact", OneToOne, Column("ContactId")),
    rel("SysAdminUnit", SelfReferencing, Column("ParentRoleId")),
];

static ENTITIES: &[EntitySchema] = &[
    EntitySchema {
        name: "Contact",
        description: "Core entity storing person/individual information",
        table_name: "Contact",
        columns: CONTACT_COLUMNS,
        relationships: CONTACT_RELATIONSHIPS,
    },
    EntitySchema {
        name: "Account",
        description: "Core entity storing company/organization information",
        table_name: "Account",
        columns: ACCOUNT_COLUMNS,
        relationships: ACCOUNT_RELATIONSHIPS,
    },
    EntitySchema {
        name: "Opportunity",
        description: "Sales opportunity/deal tracking entity",
        table_name: "Opportunity",
        columns: OPPORTUNITY_COLUMNS,
        relationships: OPPORTUNITY_RELATIONSHIPS,
    },
    EntitySchema {
        name: "Lead",
        description: "Sales lead entity - potential customers before qualification",
        table_name: "Lead",
        columns: LEAD_COLUMNS,
        relationships: LEAD_RELATIONSHIPS,
    },
    EntitySchema {
        name: "Activity",
        description: "Activities including calls, emails, tasks, meetings",
        table_name: "Activity",
        columns: ACTIVITY_COLUMNS,
        relationships: ACTIVITY_RELATIONSHIPS,
    },
    EntitySchema {
        name: "Case",
        description: "Customer service case/ticket entity",
        table_name: "Case",
        columns: CASE_COLUMNS,
        relationships: CASE_RELATIONSHIPS,
    },
    EntitySchema {
        name: "Product",
        description: "Product catalog entity",
        table_name: "Product",
        columns: PRODUCT_COLUMNS,
        relationships: PRODUCT_RELATIONSHIPS,
    },
    EntitySchema {
        name: "Order",
        description: "Sales order entity",
        table_name: "Order",
        columns: ORDER_COLUMNS,
        relationships: ORDER_RELATIONSHIPS,
    },
    EntitySchema {
        name: "SysAdminUnit",
        description: "System users and groups (security model)",
        table_name: "SysAdminUnit",
        columns: SYS_ADMIN_UNIT_COLUMNS,
        relationships: SYS_ADMIN_UNIT_RELATIONSHIPS,
    },
];

/// Audit and bookkeeping columns hidden from column analysis unless asked for.
pub const SYSTEM_COLUMNS: &[&str] =
    &["CreatedOn", "ModifiedOn", "CreatedById", "ModifiedById", "ProcessListeners"];

const MAX_SECONDARY_RELATIONSHIPS: usize = 3;

/// The entity schema table.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchemaCatalog;

impl KnowledgeTable for SchemaCatalog {
    type Record = EntitySchema;

    const NAME: &'static str = "entity_schema";

    fn lookup(&self, key: &str) -> Lookup<&'static EntitySchema> {
        match ENTITIES.iter().find(|entity| entity.name == key) {
            Some(entity) => Lookup::Found(entity),
            None => Lookup::NotFound(self.not_found(key)),
        }
    }

    fn keys(&self) -> Vec<String> {
        ENTITIES.iter().map(|entity| entity.name.to_string()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelationshipPath {
    pub path: String,
    pub via_relationship: Cardinality,
    pub secondary_relationship: Cardinality,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelationshipAnalysis {
    pub source_entity: &'static str,
    pub target_entity: Option<String>,
    pub direct_relationships: Vec<Relationship>,
    pub relationship_paths: Vec<RelationshipPath>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnAnalysis {
    pub entity: &'static str,
    pub total_columns: usize,
    pub primary_key: Vec<ColumnSpec>,
    pub foreign_keys: Vec<ColumnSpec>,
    pub lookup_references: Vec<ColumnSpec>,
    pub datetime_columns: Vec<ColumnSpec>,
    pub data_columns: Vec<ColumnSpec>,
    pub has_primary_key: bool,
    pub is_highly_relational: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    Entities,
    Columns,
    Relationships,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported search scope `{0}` (expected all|entities|columns|relationships)")]
pub struct InvalidSearchScope(String);

impl FromStr for SearchScope {
    type Err = InvalidSearchScope;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "entities" => Ok(Self::Entities),
            "columns" => Ok(Self::Columns),
            "relationships" => Ok(Self::Relationships),
            other => Err(InvalidSearchScope(other.to_string())),
        }
    }
}

impl SearchScope {
    fn includes(self, other: SearchScope) -> bool {
        self == SearchScope::All || self == other
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntityMatch {
    pub entity: &'static str,
    pub description: &'static str,
    pub table: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColumnMatch {
    pub entity: &'static str,
    pub column: &'static str,
    #[serde(rename = "type")]
    pub data_type: &'static str,
    pub description: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RelationshipMatch {
    pub from_entity: &'static str,
    pub to_entity: &'static str,
    pub cardinality: Cardinality,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSearchResult {
    pub search_term: String,
    pub entities: Vec<EntityMatch>,
    pub columns: Vec<ColumnMatch>,
    pub relationships: Vec<RelationshipMatch>,
}

impl SchemaSearchResult {
    pub fn total_matches(&self) -> usize {
        self.entities.len() + self.columns.len() + self.relationships.len()
    }
}

impl SchemaCatalog {
    pub fn entities(&self) -> &'static [EntitySchema] {
        ENTITIES
    }

    /// Direct relationships of `source`, optionally narrowed to one target,
    /// plus two-hop paths when `depth > 1`.
    pub fn analyze_relationships(
        &self,
        source: &str,
        target: Option<&str>,
        depth: u8,
    ) -> Lookup<RelationshipAnalysis> {
        let entity = match self.lookup(source) {
            Lookup::Found(entity) => entity,
            Lookup::NotFound(miss) => return Lookup::NotFound(miss),
        };

        let direct_relationships = entity
            .relationships
            .iter()
            .filter(|relationship| target.map_or(true, |name| relationship.target_entity == name))
            .copied()
            .collect::<Vec<_>>();

        let mut relationship_paths = Vec::new();
        if depth > 1 {
            for relationship in &direct_relationships {
                let Some(related) = self.lookup(relationship.target_entity).found() else {
                    continue;
                };
                for secondary in related.relationships.iter().take(MAX_SECONDARY_RELATIONSHIPS) {
                    if secondary.target_entity == entity.name {
                        continue;
                    }
                    relationship_paths.push(RelationshipPath {
                        path: format!(
                            "{} -> {} -> {}",
                            entity.name, related.name, secondary.target_entity
                        ),
                        via_relationship: relationship.cardinality,
                        secondary_relationship: secondary.cardinality,
                    });
                }
            }
        }

        Lookup::Found(RelationshipAnalysis {
            source_entity: entity.name,
            target_entity: target.map(str::to_string),
            direct_relationships,
            relationship_paths,
        })
    }

    pub fn analyze_columns(
        &self,
        entity_name: &str,
        name_filter: Option<&str>,
        include_system_columns: bool,
    ) -> Lookup<ColumnAnalysis> {
        let entity = match self.lookup(entity_name) {
            Lookup::Found(entity) => entity,
            Lookup::NotFound(miss) => return Lookup::NotFound(miss),
        };
        let filter = name_filter.map(str::to_ascii_lowercase);

        let columns = entity
            .columns
            .iter()
            .filter(|column| include_system_columns || !SYSTEM_COLUMNS.contains(&column.name))
            .filter(|column| {
                filter.as_ref().map_or(true, |filter| column.name.to_ascii_lowercase().contains(filter))
            })
            .copied()
            .collect::<Vec<_>>();

        let mut analysis = ColumnAnalysis {
            entity: entity.name,
            total_columns: columns.len(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            lookup_references: Vec::new(),
            datetime_columns: Vec::new(),
            data_columns: Vec::new(),
            has_primary_key: false,
            is_highly_relational: false,
        };

        for column in columns {
            if column.name == "Id" {
                analysis.primary_key.push(column);
            } else if column.name.ends_with("Id") && column.data_type == GUID {
                if column.description.contains("FK") {
                    analysis.foreign_keys.push(column);
                } else {
                    analysis.lookup_references.push(column);
                }
            } else if column.data_type.contains(DATETIME) {
                analysis.datetime_columns.push(column);
            } else {
                analysis.data_columns.push(column);
            }
        }

        analysis.has_primary_key = !analysis.primary_key.is_empty();
        analysis.is_highly_relational = analysis.foreign_keys.len() > 3;
        Lookup::Found(analysis)
    }

    /// Case-insensitive substring search across the whole catalog.
    pub fn search(&self, term: &str, scope: SearchScope) -> SchemaSearchResult {
        let needle = term.to_lowercase();
        let hit = |haystack: &str| haystack.to_lowercase().contains(&needle);
        let mut result = SchemaSearchResult { search_term: term.to_string(), ..Default::default() };

        for entity in ENTITIES {
            if scope.includes(SearchScope::Entities) && (hit(entity.name) || hit(entity.description))
            {
                result.entities.push(EntityMatch {
                    entity: entity.name,
                    description: entity.description,
                    table: entity.table_name,
                });
            }

            if scope.includes(SearchScope::Columns) {
                for column in entity.columns {
                    if hit(column.name) || hit(column.description) {
                        result.columns.push(ColumnMatch {
                            entity: entity.name,
                            column: column.name,
                            data_type: column.data_type,
                            description: column.description,
                        });
                    }
                }
            }

            if scope.includes(SearchScope::Relationships) {
                for relationship in entity.relationships {
                    if hit(relationship.target_entity) || hit(relationship.cardinality.as_str()) {
                        result.relationships.push(RelationshipMatch {
                            from_entity: entity.name,
                            to_entity: relationship.target_entity,
                            cardinality: relationship.cardinality,
                        });
                    }
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::{Cardinality, Join, SchemaCatalog, SearchScope};
    use crate::knowledge::{KnowledgeTable, Lookup};

    #[test]
    fn contact_maps_to_contact_table_and_references_account() {
        let contact = SchemaCatalog.lookup("Contact").found().expect("Contact is cataloged");
        assert_eq!(contact.table_name, "Contact");
        let account = contact
            .relationships
            .iter()
            .find(|relationship| relationship.target_entity == "Account")
            .expect("Contact should reference Account");
        assert_eq!(account.cardinality, Cardinality::ManyToOne);
        assert_eq!(account.join, Join::Column("AccountId"));
    }

    #[test]
    fn entity_names_are_unique() {
        let mut names = SchemaCatalog.keys();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn every_entity_has_a_primary_key_column() {
        for entity in SchemaCatalog.entities() {
            assert!(entity.columns.iter().any(|column| column.name == "Id"), "{} has no Id column", entity.name);
        }
    }

    #[test]
    fn relationship_analysis_builds_two_hop_paths_without_returning_to_source() {
        let analysis = SchemaCatalog
            .analyze_relationships("Contact", None, 2)
            .found()
            .expect("Contact is cataloged");

        assert_eq!(analysis.direct_relationships.len(), 4);
        assert!(analysis.relationship_paths.iter().any(|path| path.path == "Contact -> Account -> Opportunity"));
        assert!(analysis.relationship_paths.iter().all(|path| !path.path.ends_with("-> Contact")));
    }

    #[test]
    fn relationship_analysis_respects_target_and_depth() {
        let analysis = SchemaCatalog
            .analyze_relationships("Opportunity", Some("Account"), 1)
            .found()
            .expect("Opportunity is cataloged");

        assert_eq!(analysis.direct_relationships.len(), 1);
        assert_eq!(analysis.direct_relationships[0].target_entity, "Account");
        assert!(analysis.relationship_paths.is_empty());
    }

    #[test]
    fn relationship_analysis_of_unknown_source_is_not_found() {
        assert!(matches!(
            SchemaCatalog.analyze_relationships("Invoice", None, 2),
            Lookup::NotFound(_)
        ));
    }

    #[test]
    fn column_analysis_categorizes_and_hides_system_columns() {
        let analysis =
            SchemaCatalog.analyze_columns("Contact", None, false).found().expect("Contact");

        assert!(analysis.has_primary_key);
        assert!(analysis.datetime_columns.is_empty(), "audit columns are hidden by default");
        assert!(analysis.foreign_keys.iter().any(|column| column.name == "AccountId"));
        assert!(analysis.data_columns.iter().any(|column| column.name == "Email"));
        assert!(analysis.is_highly_relational);
        assert_eq!(analysis.total_columns, 10);
    }

    #[test]
    fn column_analysis_applies_name_filter() {
        let analysis =
            SchemaCatalog.analyze_columns("Case", Some("date"), true).found().expect("Case");
        let names: Vec<_> = analysis.datetime_columns.iter().map(|column| column.name).collect();
        assert_eq!(names, vec!["SolutionDate"]);
        assert_eq!(analysis.total_columns, 1);
    }

    #[test]
    fn search_scopes_limit_match_kinds() {
        let everything = SchemaCatalog.search("account", SearchScope::All);
        assert!(!everything.entities.is_empty());
        assert!(!everything.columns.is_empty());
        assert!(!everything.relationships.is_empty());

        let only_columns = SchemaCatalog.search("account", SearchScope::Columns);
        assert!(only_columns.entities.is_empty());
        assert!(only_columns.relationships.is_empty());
        assert_eq!(only_columns.columns.len(), everything.columns.len());
        assert!(everything.total_matches() > only_columns.total_matches());
    }

    #[test]
    fn search_scope_parses_labels() {
        assert_eq!("Relationships".parse::<SearchScope>(), Ok(SearchScope::Relationships));
        assert!("tables".parse::<SearchScope>().is_err());
    }
}
