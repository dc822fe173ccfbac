use std::collections::HashMap;

use async_trait::async_trait;
use crmcrew_core::analysis::{
    docs, metrics, query, Audience, DiagramFormat, EntitySelection, ODataRequest, QueryKind,
    SqlRequest, TimePeriod,
};
use crmcrew_core::knowledge::{
    KnowledgeTable, KpiCategory, KpiDefinition, KpiLibrary, Lookup, NotFound, SchemaCatalog,
    SearchScope,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("tool `{tool}` is not available to the {role} role")]
    NotPermitted { tool: String, role: &'static str },
    #[error("invalid input for `{tool}`: {message}")]
    InvalidInput { tool: &'static str, message: String },
    #[error("could not serialize output of `{tool}`: {source}")]
    Serialization {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A deterministic lookup over the knowledge tables.
///
/// Output is a JSON object that always carries `"success"`. A lookup miss is a
/// successful call with `"success": false` and the available keys, so the
/// model can still answer; `Err` is reserved for malformed input.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry holding every knowledge tool.
    pub fn standard() -> Self {
        let mut registry = Self::default();
        registry.register(SchemaExplorerTool);
        registry.register(EntityRelationshipTool);
        registry.register(ColumnAnalyzerTool);
        registry.register(SchemaSearchTool);
        registry.register(SqlQueryBuilderTool);
        registry.register(ODataQueryBuilderTool);
        registry.register(QueryOptimizerTool);
        registry.register(QueryValidatorTool);
        registry.register(MetricDefinitionTool);
        registry.register(MetricCalculatorTool);
        registry.register(KpiLibraryTool);
        registry.register(DashboardDesignerTool);
        registry.register(SchemaDocGeneratorTool);
        registry.register(DataDictionaryTool);
        registry.register(ErdGeneratorTool);
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(Box::as_ref)
    }

    pub fn describe(&self, name: &str) -> Option<&'static str> {
        self.get(name).map(|tool| tool.description())
    }

    pub async fn execute(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(input).await
    }
}

fn parse_input<T: DeserializeOwned>(tool: &'static str, input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input)
        .map_err(|error| ToolError::InvalidInput { tool, message: error.to_string() })
}

fn invalid(tool: &'static str, error: impl ToString) -> ToolError {
    ToolError::InvalidInput { tool, message: error.to_string() }
}

fn success<T: Serialize>(tool: &'static str, payload: &T) -> Result<Value, ToolError> {
    let value = serde_json::to_value(payload)
        .map_err(|source| ToolError::Serialization { tool, source })?;
    Ok(match value {
        Value::Object(mut map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Value::Object(map)
        }
        other => json!({ "success": true, "result": other }),
    })
}

fn not_found(miss: &NotFound) -> Value {
    json!({
        "success": false,
        "error": miss.message(),
        "table": miss.table,
        "key": miss.key,
        "available": miss.available,
        "suggestion": miss.suggestion(),
    })
}

fn from_lookup<T: Serialize>(tool: &'static str, lookup: Lookup<T>) -> Result<Value, ToolError> {
    match lookup {
        Lookup::Found(record) => success(tool, &record),
        Lookup::NotFound(miss) => Ok(not_found(&miss)),
    }
}

fn empty_selection(requested: &str, selection: &EntitySelection) -> Value {
    json!({
        "success": false,
        "error": format!("no known entities in `{requested}`"),
        "missing": selection.missing,
        "available": SchemaCatalog.keys(),
    })
}

fn yes() -> bool {
    true
}

fn default_query_type() -> String {
    "sql".to_string()
}

pub struct SchemaExplorerTool;

#[derive(Deserialize)]
struct SchemaExplorerInput {
    entity_name: String,
    #[serde(default = "yes")]
    include_relationships: bool,
}

#[derive(Serialize)]
struct EntityOverview {
    entity: &'static str,
    table_name: &'static str,
    description: &'static str,
    columns: &'static [crmcrew_core::knowledge::ColumnSpec],
    column_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    relationships: Option<&'static [crmcrew_core::knowledge::Relationship]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    relationship_count: Option<usize>,
}

#[async_trait]
impl Tool for SchemaExplorerTool {
    fn name(&self) -> &'static str {
        "schema_explorer"
    }

    fn description(&self) -> &'static str {
        "Explores the schema of one Creatio entity: table, columns, data types and relationships."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: SchemaExplorerInput = parse_input(self.name(), input)?;
        let lookup = SchemaCatalog.lookup(&input.entity_name).map(|entity| EntityOverview {
            entity: entity.name,
            table_name: entity.table_name,
            description: entity.description,
            columns: entity.columns,
            column_count: entity.columns.len(),
            relationships: input.include_relationships.then_some(entity.relationships),
            relationship_count: input.include_relationships.then_some(entity.relationships.len()),
        });
        from_lookup(self.name(), lookup)
    }
}

pub struct EntityRelationshipTool;

#[derive(Deserialize)]
struct EntityRelationshipInput {
    source_entity: String,
    #[serde(default)]
    target_entity: Option<String>,
    #[serde(default = "default_depth")]
    relationship_depth: u8,
}

fn default_depth() -> u8 {
    2
}

#[async_trait]
impl Tool for EntityRelationshipTool {
    fn name(&self) -> &'static str {
        "entity_relationship_analyzer"
    }

    fn description(&self) -> &'static str {
        "Lists direct relationships of an entity and the two-hop join paths reachable from it."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: EntityRelationshipInput = parse_input(self.name(), input)?;
        let lookup = SchemaCatalog.analyze_relationships(
            &input.source_entity,
            input.target_entity.as_deref(),
            input.relationship_depth,
        );
        from_lookup(self.name(), lookup)
    }
}

pub struct ColumnAnalyzerTool;

#[derive(Deserialize)]
struct ColumnAnalyzerInput {
    entity_name: String,
    #[serde(default)]
    column_filter: Option<String>,
    #[serde(default)]
    include_system_columns: bool,
}

#[async_trait]
impl Tool for ColumnAnalyzerTool {
    fn name(&self) -> &'static str {
        "column_analyzer"
    }

    fn description(&self) -> &'static str {
        "Categorizes an entity's columns into keys, lookups, dates and data columns."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: ColumnAnalyzerInput = parse_input(self.name(), input)?;
        let lookup = SchemaCatalog.analyze_columns(
            &input.entity_name,
            input.column_filter.as_deref(),
            input.include_system_columns,
        );
        from_lookup(self.name(), lookup)
    }
}

pub struct SchemaSearchTool;

#[derive(Deserialize)]
struct SchemaSearchInput {
    search_term: String,
    #[serde(default)]
    search_scope: Option<String>,
}

#[derive(Serialize)]
struct SearchOutput {
    #[serde(flatten)]
    result: crmcrew_core::knowledge::SchemaSearchResult,
    total_matches: usize,
}

#[async_trait]
impl Tool for SchemaSearchTool {
    fn name(&self) -> &'static str {
        "schema_search"
    }

    fn description(&self) -> &'static str {
        "Searches entity names, columns, descriptions and relationships for a term."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: SchemaSearchInput = parse_input(self.name(), input)?;
        let scope = match input.search_scope.as_deref() {
            Some(scope) => scope.parse::<SearchScope>().map_err(|e| invalid(self.name(), e))?,
            None => SearchScope::All,
        };
        let result = SchemaCatalog.search(&input.search_term, scope);
        let total_matches = result.total_matches();
        success(self.name(), &SearchOutput { result, total_matches })
    }
}

pub struct SqlQueryBuilderTool;

#[derive(Deserialize)]
struct SqlQueryInput {
    objective: String,
    entities: String,
    #[serde(default)]
    filters: Option<String>,
    #[serde(default)]
    aggregations: Option<String>,
    #[serde(default)]
    grouping: Option<String>,
    #[serde(default)]
    ordering: Option<String>,
}

#[async_trait]
impl Tool for SqlQueryBuilderTool {
    fn name(&self) -> &'static str {
        "sql_query_builder"
    }

    fn description(&self) -> &'static str {
        "Drafts a T-SQL query over Creatio tables from an objective and an entity list."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: SqlQueryInput = parse_input(self.name(), input)?;
        let request = SqlRequest {
            filters: input.filters,
            aggregations: input.aggregations,
            grouping: input.grouping,
            ordering: input.ordering,
            ..SqlRequest::new(input.objective, &input.entities)
        };
        match query::build_sql(&request) {
            Ok(built) => success(self.name(), &built),
            Err(error) => Ok(json!({ "success": false, "error": error.to_string() })),
        }
    }
}

pub struct ODataQueryBuilderTool;

#[derive(Deserialize)]
struct ODataQueryInput {
    entity: String,
    #[serde(default)]
    select_fields: Option<String>,
    #[serde(default)]
    filter_expression: Option<String>,
    #[serde(default)]
    expand_relations: Option<String>,
    #[serde(default)]
    top: Option<u32>,
}

#[async_trait]
impl Tool for ODataQueryBuilderTool {
    fn name(&self) -> &'static str {
        "odata_query_builder"
    }

    fn description(&self) -> &'static str {
        "Builds a Creatio OData v4 collection URL with a curl example."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: ODataQueryInput = parse_input(self.name(), input)?;
        let mut request = ODataRequest::new(input.entity);
        request.select_fields = input.select_fields;
        request.filter_expression = input.filter_expression;
        request.expand_relations = input.expand_relations;
        if let Some(top) = input.top {
            request.top = top;
        }
        success(self.name(), &query::build_odata(&request))
    }
}

#[derive(Deserialize)]
struct QueryInput {
    query: String,
    #[serde(default = "default_query_type")]
    query_type: String,
}

impl QueryInput {
    fn kind(&self, tool: &'static str) -> Result<QueryKind, ToolError> {
        self.query_type.parse().map_err(|error| invalid(tool, error))
    }
}

pub struct QueryOptimizerTool;

#[async_trait]
impl Tool for QueryOptimizerTool {
    fn name(&self) -> &'static str {
        "query_optimizer"
    }

    fn description(&self) -> &'static str {
        "Flags performance problems in a SQL or OData query and suggests fixes."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: QueryInput = parse_input(self.name(), input)?;
        let kind = input.kind(self.name())?;
        success(self.name(), &query::optimize(&input.query, kind))
    }
}

pub struct QueryValidatorTool;

#[async_trait]
impl Tool for QueryValidatorTool {
    fn name(&self) -> &'static str {
        "query_validator"
    }

    fn description(&self) -> &'static str {
        "Checks a query for syntax problems, unknown entities and risky patterns."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: QueryInput = parse_input(self.name(), input)?;
        let kind = input.kind(self.name())?;
        success(self.name(), &query::validate(&input.query, kind))
    }
}

pub struct MetricDefinitionTool;

#[derive(Deserialize)]
struct MetricDefinitionInput {
    metric_name: String,
    #[serde(default)]
    business_context: String,
    #[serde(default)]
    target_entity: Option<String>,
}

#[async_trait]
impl Tool for MetricDefinitionTool {
    fn name(&self) -> &'static str {
        "metric_definition"
    }

    fn description(&self) -> &'static str {
        "Drafts a metric definition and lists similar KPIs already in the library."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: MetricDefinitionInput = parse_input(self.name(), input)?;
        let draft = metrics::define_metric(
            &input.metric_name,
            &input.business_context,
            input.target_entity.as_deref(),
        );
        success(self.name(), &draft)
    }
}

pub struct MetricCalculatorTool;

#[derive(Deserialize)]
struct MetricCalculatorInput {
    metric_id: String,
    #[serde(default)]
    time_period: Option<String>,
    #[serde(default)]
    group_by: Option<String>,
}

#[async_trait]
impl Tool for MetricCalculatorTool {
    fn name(&self) -> &'static str {
        "metric_calculator"
    }

    fn description(&self) -> &'static str {
        "Produces the SQL that calculates a library KPI for a time period."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: MetricCalculatorInput = parse_input(self.name(), input)?;
        let period = input.time_period.as_deref().map(TimePeriod::parse_or_default).unwrap_or_default();
        let lookup = metrics::calculate(&input.metric_id, period, input.group_by.as_deref());
        from_lookup(self.name(), lookup)
    }
}

pub struct KpiLibraryTool;

#[derive(Deserialize)]
struct KpiLibraryInput {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    search_term: Option<String>,
}

#[derive(Serialize)]
struct KpiEntry {
    id: String,
    #[serde(flatten)]
    definition: KpiDefinition,
}

#[derive(Serialize)]
struct KpiListing {
    total_kpis: usize,
    kpis: Vec<KpiEntry>,
    categories: Vec<&'static str>,
}

#[async_trait]
impl Tool for KpiLibraryTool {
    fn name(&self) -> &'static str {
        "kpi_library"
    }

    fn description(&self) -> &'static str {
        "Browses the standard CRM KPI library by category or search term."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: KpiLibraryInput = parse_input(self.name(), input)?;
        let category = input
            .category
            .as_deref()
            .map(str::parse::<KpiCategory>)
            .transpose()
            .map_err(|error| invalid(self.name(), error))?;
        let kpis: Vec<KpiEntry> = KpiLibrary
            .browse(category, input.search_term.as_deref())
            .into_iter()
            .map(|kpi| KpiEntry { id: kpi.id(), definition: *kpi })
            .collect();
        let listing = KpiListing {
            total_kpis: kpis.len(),
            kpis,
            categories: KpiCategory::ALL.iter().map(KpiCategory::as_str).collect(),
        };
        success(self.name(), &listing)
    }
}

pub struct DashboardDesignerTool;

#[derive(Deserialize)]
struct DashboardDesignInput {
    dashboard_purpose: String,
    #[serde(default)]
    audience: String,
    #[serde(default)]
    key_questions: String,
}

#[async_trait]
impl Tool for DashboardDesignerTool {
    fn name(&self) -> &'static str {
        "dashboard_designer"
    }

    fn description(&self) -> &'static str {
        "Lays out dashboard widgets for a purpose and audience using library KPIs."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: DashboardDesignInput = parse_input(self.name(), input)?;
        let design = metrics::design_dashboard(
            &input.dashboard_purpose,
            Audience::parse_or_default(&input.audience),
            &input.key_questions,
        );
        success(self.name(), &design)
    }
}

pub struct SchemaDocGeneratorTool;

#[derive(Deserialize)]
struct SchemaDocInput {
    entities: String,
    #[serde(default = "yes")]
    include_relationships: bool,
    #[serde(default = "yes")]
    include_examples: bool,
}

#[async_trait]
impl Tool for SchemaDocGeneratorTool {
    fn name(&self) -> &'static str {
        "schema_doc_generator"
    }

    fn description(&self) -> &'static str {
        "Renders Markdown reference documentation for selected entities."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: SchemaDocInput = parse_input(self.name(), input)?;
        let selection = EntitySelection::parse(&input.entities);
        if selection.is_empty() {
            return Ok(empty_selection(&input.entities, &selection));
        }
        let documentation = docs::schema_markdown(
            &selection.entities,
            input.include_relationships,
            input.include_examples,
        );
        success(
            self.name(),
            &json!({
                "entities_documented": selection.names(),
                "missing": selection.missing,
                "documentation": documentation,
            }),
        )
    }
}

pub struct DataDictionaryTool;

#[derive(Deserialize)]
struct DataDictionaryInput {
    entity: String,
}

#[async_trait]
impl Tool for DataDictionaryTool {
    fn name(&self) -> &'static str {
        "data_dictionary"
    }

    fn description(&self) -> &'static str {
        "Builds a column-level data dictionary with keys, references and audit columns."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: DataDictionaryInput = parse_input(self.name(), input)?;
        from_lookup(self.name(), docs::data_dictionary(&input.entity))
    }
}

pub struct ErdGeneratorTool;

#[derive(Deserialize)]
struct ErdInput {
    entities: String,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    show_columns: bool,
}

#[async_trait]
impl Tool for ErdGeneratorTool {
    fn name(&self) -> &'static str {
        "erd_generator"
    }

    fn description(&self) -> &'static str {
        "Renders an entity-relationship diagram as Mermaid, PlantUML or DBML."
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: ErdInput = parse_input(self.name(), input)?;
        let format = match input.format.as_deref() {
            Some(format) => format.parse::<DiagramFormat>().map_err(|e| invalid(self.name(), e))?,
            None => DiagramFormat::default(),
        };
        let selection = EntitySelection::parse(&input.entities);
        if selection.is_empty() {
            return Ok(empty_selection(&input.entities, &selection));
        }
        success(
            self.name(),
            &json!({
                "format": format.as_str(),
                "diagram": docs::render_erd(&selection.entities, format, input.show_columns),
                "entities": selection.names(),
                "missing": selection.missing,
                "usage_instructions": format.usage_instructions(),
            }),
        )
    }
}
