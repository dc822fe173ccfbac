use std::collections::BTreeMap;
use std::error::Error as _;

use serde::Serialize;
use serde_json::Value;
use tera::{Context, Tera};
use thiserror::Error;

use crate::roles::AgentRole;

const SYSTEM_TEMPLATE: &str = "system";

const SYSTEM_SOURCE: &str = r#"You are the {{ role_title }}.

Goal: {{ goal }}

Background: {{ backstory }}

Knowledge tools whose output may appear in the request:
{% for tool in tools %}- {{ tool.name }}: {{ tool.description }}
{% endfor %}
Ground every answer in the embedded tool output. When a tool reports "success": false, say that the record is not in the knowledge base and point to the available keys instead of inventing one.
"#;

const TASK_FOOTER: &str = r#"

Expected output:
{{ expected_output }}
{% if previous %}
Context from previous steps:
{{ previous }}
{% endif %}{% if records %}
Knowledge base lookups:
{% for record in records %}
[{{ record.tool }}]
```json
{{ record.content }}
```
{% endfor %}{% endif %}"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt templates failed to load: {0}")]
    Build(String),
    #[error("prompt template `{template}` failed to render: {message}")]
    Render { template: &'static str, message: String },
    #[error("lookup output from `{tool}` could not be serialized: {source}")]
    Record {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One task prompt per supported operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskTemplate {
    ExploreEntity,
    AnalyzeRelationships,
    AnswerSchemaQuestion,
    CompareEntities,
    FullSchemaOverview,
    BuildQueryFromQuestion,
    BuildSqlReportQuery,
    BuildODataQuery,
    OptimizeQuery,
    CreateReusableQueryTemplate,
    ValidateAndFixQuery,
    DefineKpi,
    CalculateMetric,
    RecommendMetricsForRole,
    DesignDashboard,
    AnalyzeSalesPipeline,
    AnswerMetricsQuestion,
    GenerateEntityDocumentation,
    CreateDataDictionary,
    GenerateErd,
    CreateIntegrationGuide,
}

impl TaskTemplate {
    pub const ALL: [TaskTemplate; 21] = [
        Self::ExploreEntity,
        Self::AnalyzeRelationships,
        Self::AnswerSchemaQuestion,
        Self::CompareEntities,
        Self::FullSchemaOverview,
        Self::BuildQueryFromQuestion,
        Self::BuildSqlReportQuery,
        Self::BuildODataQuery,
        Self::OptimizeQuery,
        Self::CreateReusableQueryTemplate,
        Self::ValidateAndFixQuery,
        Self::DefineKpi,
        Self::CalculateMetric,
        Self::RecommendMetricsForRole,
        Self::DesignDashboard,
        Self::AnalyzeSalesPipeline,
        Self::AnswerMetricsQuestion,
        Self::GenerateEntityDocumentation,
        Self::CreateDataDictionary,
        Self::GenerateErd,
        Self::CreateIntegrationGuide,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ExploreEntity => "explore_entity",
            Self::AnalyzeRelationships => "analyze_relationships",
            Self::AnswerSchemaQuestion => "answer_schema_question",
            Self::CompareEntities => "compare_entities",
            Self::FullSchemaOverview => "full_schema_overview",
            Self::BuildQueryFromQuestion => "build_query_from_question",
            Self::BuildSqlReportQuery => "build_sql_report_query",
            Self::BuildODataQuery => "build_odata_query",
            Self::OptimizeQuery => "optimize_query",
            Self::CreateReusableQueryTemplate => "create_reusable_query_template",
            Self::ValidateAndFixQuery => "validate_and_fix_query",
            Self::DefineKpi => "define_kpi",
            Self::CalculateMetric => "calculate_metric",
            Self::RecommendMetricsForRole => "recommend_metrics_for_role",
            Self::DesignDashboard => "design_dashboard",
            Self::AnalyzeSalesPipeline => "analyze_sales_pipeline",
            Self::AnswerMetricsQuestion => "answer_metrics_question",
            Self::GenerateEntityDocumentation => "generate_entity_documentation",
            Self::CreateDataDictionary => "create_data_dictionary",
            Self::GenerateErd => "generate_erd",
            Self::CreateIntegrationGuide => "create_integration_guide",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Self::ExploreEntity => r#"Thoroughly explore and analyze the schema for the Creatio CRM entity: {{ entity_name }}

Your analysis should include:
1. Entity description and business purpose
2. Table name and physical structure
3. All key columns with their data types and purposes
4. Foreign key relationships to other entities
5. Common use cases for this entity
6. Best practices for querying this entity
7. Related lookup tables and their purposes

Present findings in a clear, organized format that would be useful for data architects and developers working with this entity."#,
            Self::AnalyzeRelationships => r#"Analyze the relationships between {{ source_entity }} {% if target_entity %}and {{ target_entity }}{% else %}and all related entities{% endif %} in the Creatio CRM schema.

Your analysis should cover:
1. Direct foreign key relationships
2. Junction/bridge table relationships
3. Detail relationships (parent-child patterns)
4. Lookup references
5. Cardinality of each relationship (1:1, 1:N, N:M)
6. Common join patterns used in queries
7. Relationship constraints and implications

Consider how these relationships affect query performance, data integrity, reporting capabilities and data extraction patterns."#,
            Self::AnswerSchemaQuestion => r#"Answer the following question about the Creatio CRM schema:

QUESTION: {{ question }}

Provide a thorough, accurate answer by:
1. Understanding the intent behind the question
2. Using the embedded schema lookups to find relevant information
3. Explaining the relevant parts of the schema
4. Providing examples where helpful
5. Noting any caveats or considerations

If the question requires information not in the schema knowledge base, explain what additional data sources or documentation might be needed."#,
            Self::CompareEntities => r#"Compare the Creatio CRM entities {{ entity1 }} and {{ entity2 }}.

Your comparison should include:
1. Purpose and business function of each entity
2. Structural similarities and differences
3. Common columns across both entities
4. Unique columns in each entity
5. Relationship patterns for each
6. When to use one vs the other
7. How they might be used together

This comparison should help users understand the role of each entity and how they fit into the overall CRM data model."#,
            Self::FullSchemaOverview => r#"Provide a comprehensive overview of the Creatio CRM schema.

Your overview should include:
1. Core entities and their purposes (Contact, Account, Opportunity, etc.)
2. Entity categories (master data, transactional, reference, system)
3. Key relationship patterns used throughout the system
4. Common design patterns in the schema
5. The role of lookup tables
6. How custom entities extend the base schema
7. Tips for navigating and understanding the schema

This overview should serve as an orientation for anyone new to the Creatio CRM data model."#,
            Self::BuildQueryFromQuestion => r#"Translate the following business question into an efficient query for Creatio CRM data:

QUESTION: {{ question }}

Your process should include:
1. Analyze the question to understand data requirements
2. Identify the relevant Creatio entities and columns
3. Determine necessary joins and relationships
4. Define appropriate filters and conditions
5. Consider aggregations if needed
6. Build both SQL and OData versions of the query
7. Validate the query for correctness
8. Optimize for performance

The query should be ready to execute against Creatio's database or API, with clear explanations of what each part does."#,
            Self::BuildSqlReportQuery => r#"Build a SQL query for the following report requirement:

REPORT: {{ report_description }}
ENTITIES: {{ entities }}
{% if time_range %}Time Range: {{ time_range }}
{% endif %}
Your query should:
1. Extract all necessary columns for the report
2. Include proper joins between entities
3. Apply appropriate filters and date ranges
4. Include aggregations and groupings as needed
5. Use efficient query patterns
6. Include comments explaining each section
7. Be formatted for readability

Also provide a sample output structure, estimated data volume considerations and index recommendations for performance."#,
            Self::BuildODataQuery => r#"Build an OData query for accessing {{ entity }} data via Creatio API.

REQUIREMENTS: {{ requirements }}

Your OData query should include:
1. Proper entity collection URL
2. $select for specific columns
3. $filter for conditions
4. $expand for related entities (if needed)
5. $orderby for sorting
6. $top and $skip for pagination
7. Any necessary query options

Also provide a complete URL example, a CURL command for testing, a response structure preview, pagination guidance and error handling considerations."#,
            Self::OptimizeQuery => r#"Optimize the following {{ query_type }} query for better performance:

QUERY:
{{ query }}

Your optimization should address:
1. Query structure efficiency
2. Join optimization
3. Filter placement and selectivity
4. Column selection (avoid SELECT *)
5. Index utilization
6. Subquery vs JOIN decisions
7. Aggregation efficiency
8. Pagination optimization

Provide both the optimized query and a detailed explanation of the changes made and their expected impact."#,
            Self::CreateReusableQueryTemplate => r#"Create a reusable query template for the following use case:

USE CASE: {{ use_case }}
PARAMETERS: {{ parameters }}

Your template should include:
1. Parameterized SQL query with placeholders
2. OData equivalent with parameter substitution
3. Clear parameter documentation
4. Default values where appropriate
5. Validation rules for parameters
6. Usage examples with different parameter values
7. Error handling for invalid parameters

The template should be production-ready and easy to integrate into applications or reporting tools."#,
            Self::ValidateAndFixQuery => r#"Validate the following query for correctness and fix any issues:

QUERY:
{{ query }}

Your validation should check:
1. Syntax correctness
2. Entity/table references
3. Column name accuracy
4. Join conditions
5. Filter logic
6. Aggregation correctness
7. Common anti-patterns
8. Security considerations (SQL injection risks)

If issues are found, provide corrected versions with explanations."#,
            Self::DefineKpi => r#"Define Key Performance Indicators (KPIs) for the following business goal:

BUSINESS GOAL: {{ business_goal }}
CONTEXT: {{ context }}

Your KPI definition should include:
1. Primary KPIs that directly measure the goal
2. Supporting KPIs that provide context
3. Leading indicators (predictive metrics)
4. Lagging indicators (outcome metrics)
5. For each KPI: a clear definition and formula, data sources in Creatio, calculation method, recommended targets or benchmarks, measurement frequency and visualization recommendations

Ensure all KPIs can be calculated from available Creatio CRM data."#,
            Self::CalculateMetric => r#"Calculate the following metric from Creatio CRM data:

METRIC: {{ metric_name }}
TIME PERIOD: {{ time_period }}
{% if dimensions %}DIMENSIONS: {{ dimensions }}
{% endif %}
Your calculation should include:
1. Identify the exact metric definition
2. Determine required data sources
3. Build the calculation query
4. Include appropriate time filters
5. Add dimensional breakdowns if specified
6. Provide calculation methodology
7. Note any data quality considerations

Provide the SQL query that would calculate this metric along with explanation of the calculation logic."#,
            Self::RecommendMetricsForRole => r#"Recommend key metrics for a {{ role }} focused on {{ focus_area }}.

Consider:
1. What decisions does this role need to make?
2. What information helps those decisions?
3. What level of detail is appropriate?
4. What time horizons matter?
5. What benchmarks are relevant?

For each recommended metric explain why it matters for this role, how often it should be reviewed, what actions it should trigger and how to present it effectively.

Use the KPI library to identify relevant metrics and suggest customizations for this specific use case."#,
            Self::DesignDashboard => r#"Design a metrics dashboard for Creatio CRM data:

PURPOSE: {{ dashboard_purpose }}
AUDIENCE: {{ audience }}

Your dashboard design should include:
1. Dashboard objectives and key questions answered
2. Selected KPIs and metrics
3. Widget layout and types
4. Time range controls
5. Filter/drill-down capabilities
6. Data refresh frequency
7. Color coding and alert thresholds
8. Mobile/responsive considerations

For each widget give the metric displayed, visualization type, data source query, size and position, and interaction capabilities."#,
            Self::AnalyzeSalesPipeline => r#"Perform a {{ analysis_depth }} analysis of sales pipeline metrics in Creatio CRM.

Your analysis should include:
1. Pipeline Value (total, by stage, by owner)
2. Pipeline Velocity
3. Stage Conversion Rates
4. Average Deal Size
5. Sales Cycle Length
6. Win/Loss Analysis
7. Pipeline Coverage Ratio
8. Forecast Accuracy (if historical data available)

For each metric cover the current value, trend analysis, comparison to targets or benchmarks, key insights and anomalies, and recommended actions.

Provide the queries needed to extract this data from Creatio."#,
            Self::AnswerMetricsQuestion => r#"Answer the following question about metrics and KPIs in Creatio CRM:

QUESTION: {{ question }}

Provide a thorough answer that:
1. Directly addresses the question
2. References relevant standard KPIs
3. Provides calculation formulas if applicable
4. Includes data sources and queries
5. Offers best practices and recommendations
6. Notes any caveats or considerations

If the question involves custom metrics, help define them based on Creatio's data model."#,
            Self::GenerateEntityDocumentation => r#"Generate comprehensive documentation for Creatio CRM entities: {{ entities }}

The documentation should include for each entity:
1. Entity overview and business purpose
2. Database table mapping
3. Complete column reference (name, data type, description, constraints, business rules)
4. Relationships with other entities
5. Common query patterns
6. Best practices for working with the entity
7. Example queries (SELECT, with JOINs)

Format the documentation for easy reference by data architects, database developers, report builders and integration specialists."#,
            Self::CreateDataDictionary => r#"Create a detailed data dictionary for the Creatio CRM entity: {{ entity }}

The data dictionary should include:
1. Entity metadata (name, table, description)
2. For each column: physical name, logical/business name, data type with precision, nullable flag, primary/foreign key indicator, referenced table for FKs, default value, business definition, valid values or ranges, data quality rules and sample values
3. Indexes (recommended)
4. Audit column documentation
5. Related lookup tables

This should serve as a complete reference for anyone working with this entity's data."#,
            Self::GenerateErd => r#"Generate an Entity-Relationship Diagram for Creatio CRM entities: {{ entities }}
Format: {{ detail_clause }}

The ERD should:
1. Show all specified entities
2. Display relationships between entities
3. Indicate relationship cardinality (1:1, 1:N, N:M)
4. Include column details if requested
5. Mark primary and foreign keys
6. Use standard ERD notation

Generate the diagram in Mermaid (for GitHub/GitLab rendering), PlantUML (for documentation tools) and DBML (for dbdiagram.io). Include rendering instructions for each format."#,
            Self::CreateIntegrationGuide => r#"Create an integration guide for connecting {{ source_system }} with Creatio CRM.
Target entities: {{ target_entities }}

The guide should include:
1. Integration overview and scope
2. Creatio entity details for target entities
3. Field mapping recommendations
4. Data type considerations
5. OData API endpoints for each entity
6. Authentication requirements
7. Sample API requests (CRUD operations)
8. Error handling guidance
9. Best practices for data synchronization
10. Common pitfalls and solutions

This should enable a developer to implement the integration without deep Creatio knowledge."#,
        }
    }

    fn expected_output(&self) -> &'static str {
        match self {
            Self::ExploreEntity => {
                "A comprehensive entity analysis report containing:\n\
                 - Entity Overview (name, purpose, table)\n\
                 - Column Catalog (name, type, description, constraints)\n\
                 - Relationship Map (related entities, relationship types)\n\
                 - Usage Patterns (common queries, joins)\n\
                 - Data Architecture Recommendations\n\
                 - Sample Queries for common operations"
            }
            Self::AnalyzeRelationships => {
                "A detailed relationship analysis including:\n\
                 - Relationship Diagram (text representation)\n\
                 - Relationship Details (type, cardinality, columns)\n\
                 - Join Path Recommendations\n\
                 - Query Pattern Examples\n\
                 - Performance Considerations\n\
                 - Data Integrity Notes"
            }
            Self::AnswerSchemaQuestion => {
                "A clear, comprehensive answer including:\n\
                 - Direct answer to the question\n\
                 - Supporting schema details\n\
                 - Relevant examples or queries\n\
                 - Additional context or considerations\n\
                 - References to related schema elements"
            }
            Self::CompareEntities => {
                "An entity comparison report containing:\n\
                 - Side-by-side Overview\n\
                 - Structural Comparison (columns, types)\n\
                 - Relationship Comparison\n\
                 - Use Case Guidance\n\
                 - Integration Patterns (when used together)\n\
                 - Recommendations"
            }
            Self::FullSchemaOverview => {
                "A complete schema overview document containing:\n\
                 - Executive Summary\n\
                 - Core Entity Catalog with descriptions\n\
                 - Entity Category Classification\n\
                 - Relationship Overview\n\
                 - Design Pattern Guide\n\
                 - Schema Navigation Tips\n\
                 - Glossary of Key Terms"
            }
            Self::BuildQueryFromQuestion => {
                "A complete query solution containing:\n\
                 - Interpreted Requirements (what data is needed)\n\
                 - Entities and Columns Used\n\
                 - SQL Query (with comments)\n\
                 - OData Query (API version)\n\
                 - Explanation of Query Logic\n\
                 - Performance Notes\n\
                 - Potential Variations"
            }
            Self::BuildSqlReportQuery => {
                "A complete report query package containing:\n\
                 - SQL Query (fully commented)\n\
                 - Output Column Descriptions\n\
                 - Query Execution Notes\n\
                 - Performance Optimization Tips\n\
                 - Index Recommendations\n\
                 - Sample Data Preview Structure"
            }
            Self::BuildODataQuery => {
                "A complete OData query solution containing:\n\
                 - OData URL with all parameters\n\
                 - CURL example command\n\
                 - JavaScript/Python fetch example\n\
                 - Expected response structure\n\
                 - Pagination strategy\n\
                 - Error handling notes"
            }
            Self::OptimizeQuery => {
                "A query optimization report containing:\n\
                 - Original Query Analysis\n\
                 - Identified Issues\n\
                 - Optimized Query\n\
                 - Changes Made (with explanations)\n\
                 - Expected Performance Improvement\n\
                 - Index Recommendations\n\
                 - Before/After Comparison"
            }
            Self::CreateReusableQueryTemplate => {
                "A reusable query template package containing:\n\
                 - SQL Template (with parameters)\n\
                 - OData Template\n\
                 - Parameter Documentation\n\
                 - Default Values\n\
                 - Usage Examples\n\
                 - Integration Guide\n\
                 - Testing Suggestions"
            }
            Self::ValidateAndFixQuery => {
                "A query validation report containing:\n\
                 - Validation Results (pass/fail for each check)\n\
                 - Issues Found (if any)\n\
                 - Corrected Query\n\
                 - Explanation of Fixes\n\
                 - Security Assessment\n\
                 - Best Practice Recommendations"
            }
            Self::DefineKpi => {
                "A comprehensive KPI definition document containing:\n\
                 - Executive Summary\n\
                 - Primary KPIs (3-5 key metrics)\n\
                 - Supporting KPIs\n\
                 - For each KPI: name and definition, formula, data source (entities, columns), \
                 SQL query, target or benchmark, frequency and visualization type\n\
                 - Implementation Roadmap\n\
                 - Dashboard Recommendations"
            }
            Self::CalculateMetric => {
                "A metric calculation package containing:\n\
                 - Metric Definition\n\
                 - SQL Calculation Query\n\
                 - Calculation Methodology\n\
                 - Sample Output Format\n\
                 - Data Quality Notes\n\
                 - Interpretation Guidance\n\
                 - Related Metrics to Consider"
            }
            Self::RecommendMetricsForRole => {
                "A role-specific metrics recommendation containing:\n\
                 - Role Overview and Key Decisions\n\
                 - Top 5-10 Recommended Metrics\n\
                 - For each metric: name and definition, why it matters for this role, \
                 review frequency, action triggers and presentation format\n\
                 - Dashboard Layout Suggestion\n\
                 - Alert/Notification Recommendations"
            }
            Self::DesignDashboard => {
                "A comprehensive dashboard design document containing:\n\
                 - Dashboard Overview\n\
                 - Key Questions Answered\n\
                 - Widget Specifications: layout diagram (text-based), widget details \
                 (metric, type, size) and the query for each widget\n\
                 - Interactivity Design\n\
                 - Filtering Options\n\
                 - Alert Configuration\n\
                 - Implementation Guide for Creatio"
            }
            Self::AnalyzeSalesPipeline => {
                "A sales pipeline analysis report containing:\n\
                 - Executive Summary\n\
                 - Key Metrics Dashboard\n\
                 - Pipeline Health Assessment\n\
                 - Stage-by-Stage Analysis\n\
                 - Owner/Team Performance\n\
                 - Trend Analysis\n\
                 - Risk Areas\n\
                 - Recommendations\n\
                 - Data Extraction Queries"
            }
            Self::AnswerMetricsQuestion => {
                "A comprehensive answer containing:\n\
                 - Direct Answer\n\
                 - Relevant KPIs/Metrics\n\
                 - Formulas and Calculations\n\
                 - SQL/OData Queries\n\
                 - Best Practices\n\
                 - Additional Considerations\n\
                 - Related Metrics to Explore"
            }
            Self::GenerateEntityDocumentation => {
                "Complete entity documentation containing:\n\
                 - Table of Contents\n\
                 - Entity Overview Sections\n\
                 - Column Reference Tables\n\
                 - Relationship Diagrams (text format)\n\
                 - Query Examples\n\
                 - Best Practices Guide\n\
                 - Glossary of Terms"
            }
            Self::CreateDataDictionary => {
                "A complete data dictionary containing:\n\
                 - Entity Header (name, table, description)\n\
                 - Column Catalog Table\n\
                 - Primary Key Documentation\n\
                 - Foreign Key References\n\
                 - Index Recommendations\n\
                 - Business Rules\n\
                 - Lookup Value References\n\
                 - Data Quality Guidelines\n\
                 - Audit Information"
            }
            Self::GenerateErd => {
                "An ERD package containing:\n\
                 - Mermaid Diagram Code\n\
                 - PlantUML Diagram Code\n\
                 - DBML Code\n\
                 - Rendering Instructions\n\
                 - Relationship Legend\n\
                 - Usage Notes"
            }
            Self::CreateIntegrationGuide => {
                "An integration guide containing:\n\
                 - Integration Overview\n\
                 - Entity Schema Reference\n\
                 - Field Mapping Table\n\
                 - API Endpoint Catalog\n\
                 - Authentication Guide\n\
                 - Sample API Requests (curl/code)\n\
                 - Error Handling\n\
                 - Sync Strategy Recommendations\n\
                 - Troubleshooting Guide"
            }
        }
    }
}

/// Named substitutions for a task template.
///
/// Optional values are stored as empty strings so templates can branch on them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskParams(BTreeMap<&'static str, String>);

impl TaskParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(key, value.into());
        self
    }

    pub fn with_optional(mut self, key: &'static str, value: Option<String>) -> Self {
        self.0.insert(key, value.unwrap_or_default());
        self
    }
}

/// Output of one lookup tool, embedded verbatim in the task prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddedRecord {
    pub tool: &'static str,
    pub payload: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ToolSummary {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Serialize)]
struct RenderedRecord<'a> {
    tool: &'a str,
    content: String,
}

pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());

        let mut sources = vec![(SYSTEM_TEMPLATE.to_string(), SYSTEM_SOURCE.to_string())];
        sources.extend(TaskTemplate::ALL.iter().map(|task| {
            (task.name().to_string(), format!("{}{}", task.description(), TASK_FOOTER))
        }));
        tera.add_raw_templates(sources).map_err(|error| PromptError::Build(chain(&error)))?;

        Ok(Self { tera })
    }

    pub fn render_system(
        &self,
        role: AgentRole,
        tools: &[ToolSummary],
    ) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("role_title", role.title());
        context.insert("goal", role.goal());
        context.insert("backstory", role.backstory());
        context.insert("tools", tools);
        self.render(SYSTEM_TEMPLATE, &context)
    }

    /// Renders a task prompt. `previous` carries the output of earlier steps
    /// in a multi-step analysis.
    pub fn render_task(
        &self,
        task: TaskTemplate,
        params: &TaskParams,
        records: &[EmbeddedRecord],
        previous: Option<&str>,
    ) -> Result<String, PromptError> {
        let rendered = records
            .iter()
            .map(|record| {
                serde_json::to_string_pretty(&record.payload)
                    .map(|content| RenderedRecord { tool: record.tool, content })
                    .map_err(|source| PromptError::Record { tool: record.tool, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut context = Context::new();
        for (key, value) in &params.0 {
            context.insert(*key, value);
        }
        context.insert("expected_output", task.expected_output());
        context.insert("previous", previous.unwrap_or_default());
        context.insert("records", &rendered);
        self.render(task.name(), &context)
    }

    fn render(&self, template: &'static str, context: &Context) -> Result<String, PromptError> {
        self.tera
            .render(template, context)
            .map_err(|error| PromptError::Render { template, message: chain(&error) })
    }
}

fn chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
