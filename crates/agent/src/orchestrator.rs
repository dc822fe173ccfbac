use crmcrew_core::analysis::{split_list, QueryKind};
use crmcrew_core::errors::ApplicationError;
use crmcrew_core::knowledge::{KpiCategory, SchemaCatalog};
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::llm::LlmClient;
use crate::prompts::{EmbeddedRecord, PromptError, PromptLibrary, TaskParams, TaskTemplate, ToolSummary};
use crate::roles::AgentRole;
use crate::tools::{ToolError, ToolRegistry};

const SCHEMA_WORDS: [&str; 6] = ["schema", "table", "column", "entity", "relationship", "structure"];
const QUERY_WORDS: [&str; 6] = ["query", "sql", "odata", "select", "join", "extract"];
const METRIC_WORDS: [&str; 6] = ["kpi", "metric", "measure", "dashboard", "report", "analytics"];

const ERD_FORMATS: [&str; 3] = ["mermaid", "plantuml", "dbml"];

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("{0:#}")]
    Provider(anyhow::Error),
}

impl From<OrchestratorError> for ApplicationError {
    fn from(value: OrchestratorError) -> Self {
        match value {
            OrchestratorError::Provider(error) => Self::Provider(format!("{error:#}")),
            OrchestratorError::Prompt(error) => Self::Template(error.to_string()),
            OrchestratorError::Tool(error @ ToolError::InvalidInput { .. }) => {
                Self::InvalidInput(error.to_string())
            }
            OrchestratorError::Tool(error) => Self::Internal(error.to_string()),
        }
    }
}

/// Topic of a free-form question, decided by keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Schema,
    Query,
    Metrics,
}

impl Category {
    /// Schema words win over query words, which win over metric words.
    /// Questions matching nothing are treated as schema questions.
    pub fn classify(question: &str) -> Self {
        let lowered = question.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|word| lowered.contains(word));

        if mentions(&SCHEMA_WORDS) {
            Self::Schema
        } else if mentions(&QUERY_WORDS) {
            Self::Query
        } else if mentions(&METRIC_WORDS) {
            Self::Metrics
        } else {
            Self::Schema
        }
    }

    pub fn role(&self) -> AgentRole {
        match self {
            Self::Schema => AgentRole::SchemaAnalyst,
            Self::Query => AgentRole::QueryBuilder,
            Self::Metrics => AgentRole::MetricsExpert,
        }
    }
}

/// One supported operation with its parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Ask { question: String },
    ExploreEntity { entity: String },
    AnalyzeRelationships { source: String, target: Option<String> },
    SchemaOverview,
    SchemaQuestion { question: String },
    CompareEntities { first: String, second: String },
    BuildQuery { question: String },
    ReportQuery { description: String, entities: String, time_range: Option<String> },
    ODataQuery { entity: String, requirements: String },
    OptimizeQuery { query: String, kind: QueryKind },
    ValidateQuery { query: String, kind: QueryKind },
    DefineKpis { goal: String, context: String },
    CalculateMetric { metric: String, period: String, dimensions: Option<String> },
    RecommendMetrics { role: String, focus: String },
    DesignDashboard { purpose: String, audience: String },
    AnalyzePipeline { depth: String },
    MetricsQuestion { question: String },
    GenerateDocs { entities: String },
    DataDictionary { entity: String },
    GenerateErd { entities: String, include_columns: bool },
    IntegrationGuide { source_system: String, entities: String },
    Analyze { entity: String },
    MetricsAnalysis { business_area: String, audience: String },
}

#[derive(Clone, Debug, PartialEq)]
struct ToolCall {
    tool: &'static str,
    input: Value,
}

impl ToolCall {
    fn new(tool: &'static str, input: Value) -> Self {
        Self { tool, input }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Step {
    heading: Option<&'static str>,
    role: AgentRole,
    task: TaskTemplate,
    params: TaskParams,
    lookups: Vec<ToolCall>,
}

impl Request {
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Ask { .. } => "ask",
            Self::ExploreEntity { .. } => "schema.explore",
            Self::AnalyzeRelationships { .. } => "schema.relationships",
            Self::SchemaOverview => "schema.overview",
            Self::SchemaQuestion { .. } => "schema.ask",
            Self::CompareEntities { .. } => "schema.compare",
            Self::BuildQuery { .. } => "query.build",
            Self::ReportQuery { .. } => "query.report",
            Self::ODataQuery { .. } => "query.odata",
            Self::OptimizeQuery { .. } => "query.optimize",
            Self::ValidateQuery { .. } => "query.validate",
            Self::DefineKpis { .. } => "metrics.define",
            Self::CalculateMetric { .. } => "metrics.calculate",
            Self::RecommendMetrics { .. } => "metrics.recommend",
            Self::DesignDashboard { .. } => "metrics.dashboard",
            Self::AnalyzePipeline { .. } => "metrics.pipeline",
            Self::MetricsQuestion { .. } => "metrics.ask",
            Self::GenerateDocs { .. } => "docs.generate",
            Self::DataDictionary { .. } => "docs.dictionary",
            Self::GenerateErd { .. } => "docs.erd",
            Self::IntegrationGuide { .. } => "docs.integration",
            Self::Analyze { .. } => "analyze",
            Self::MetricsAnalysis { .. } => "metrics.analyze",
        }
    }

    /// Role answering the request. Composite analysis reports its leading role.
    pub fn role(&self) -> AgentRole {
        match self {
            Self::Ask { question } => Category::classify(question).role(),
            Self::ExploreEntity { .. }
            | Self::AnalyzeRelationships { .. }
            | Self::SchemaOverview
            | Self::SchemaQuestion { .. }
            | Self::CompareEntities { .. }
            | Self::Analyze { .. } => AgentRole::SchemaAnalyst,
            Self::BuildQuery { .. }
            | Self::ReportQuery { .. }
            | Self::ODataQuery { .. }
            | Self::OptimizeQuery { .. }
            | Self::ValidateQuery { .. } => AgentRole::QueryBuilder,
            Self::DefineKpis { .. }
            | Self::CalculateMetric { .. }
            | Self::RecommendMetrics { .. }
            | Self::DesignDashboard { .. }
            | Self::AnalyzePipeline { .. }
            | Self::MetricsQuestion { .. }
            | Self::MetricsAnalysis { .. } => AgentRole::MetricsExpert,
            Self::GenerateDocs { .. }
            | Self::DataDictionary { .. }
            | Self::GenerateErd { .. }
            | Self::IntegrationGuide { .. } => AgentRole::DataArchitect,
        }
    }

    /// Question request of the category a free-form question falls into.
    fn classified(question: String) -> Self {
        match Category::classify(&question) {
            Category::Schema => Self::SchemaQuestion { question },
            Category::Query => Self::BuildQuery { question },
            Category::Metrics => Self::MetricsQuestion { question },
        }
    }

    fn into_steps(self) -> Vec<Step> {
        let role = self.role();
        let single = |task, params, lookups| {
            vec![Step { heading: None, role, task, params, lookups }]
        };

        match self {
            Self::Ask { question } => Self::classified(question).into_steps(),
            Self::ExploreEntity { entity } => single(
                TaskTemplate::ExploreEntity,
                TaskParams::new().with("entity_name", entity.as_str()),
                explore_lookups(&entity),
            ),
            Self::AnalyzeRelationships { source, target } => {
                let lookups = vec![ToolCall::new(
                    "entity_relationship_analyzer",
                    json!({"source_entity": source, "target_entity": target, "relationship_depth": 2}),
                )];
                single(
                    TaskTemplate::AnalyzeRelationships,
                    TaskParams::new().with("source_entity", source).with_optional("target_entity", target),
                    lookups,
                )
            }
            Self::SchemaOverview => single(
                TaskTemplate::FullSchemaOverview,
                TaskParams::new(),
                vec![ToolCall::new(
                    "schema_doc_generator",
                    json!({"entities": "all", "include_relationships": true, "include_examples": false}),
                )],
            ),
            Self::SchemaQuestion { question } => single(
                TaskTemplate::AnswerSchemaQuestion,
                TaskParams::new().with("question", question.as_str()),
                explorer_calls(&mentioned_entities(&question)),
            ),
            Self::CompareEntities { first, second } => single(
                TaskTemplate::CompareEntities,
                TaskParams::new().with("entity1", first.as_str()).with("entity2", second.as_str()),
                explorer_calls(&[first.as_str(), second.as_str()]),
            ),
            Self::BuildQuery { question } => {
                let mentioned = mentioned_entities(&question);
                let mut lookups = explorer_calls(&mentioned);
                if !mentioned.is_empty() {
                    lookups.push(ToolCall::new(
                        "sql_query_builder",
                        json!({"objective": question, "entities": mentioned.join(",")}),
                    ));
                }
                single(
                    TaskTemplate::BuildQueryFromQuestion,
                    TaskParams::new().with("question", question.as_str()),
                    lookups,
                )
            }
            Self::ReportQuery { description, entities, time_range } => {
                let lookups = vec![ToolCall::new(
                    "sql_query_builder",
                    json!({"objective": description, "entities": entities, "filters": time_range}),
                )];
                single(
                    TaskTemplate::BuildSqlReportQuery,
                    TaskParams::new()
                        .with("report_description", description)
                        .with("entities", entities)
                        .with_optional("time_range", time_range),
                    lookups,
                )
            }
            Self::ODataQuery { entity, requirements } => {
                let mut lookups = explorer_calls(&[entity.as_str()]);
                lookups.push(ToolCall::new(
                    "odata_query_builder",
                    json!({"entity": entity, "filter_expression": requirements}),
                ));
                single(
                    TaskTemplate::BuildODataQuery,
                    TaskParams::new().with("entity", entity).with("requirements", requirements),
                    lookups,
                )
            }
            Self::OptimizeQuery { query, kind } => single(
                TaskTemplate::OptimizeQuery,
                TaskParams::new()
                    .with("query", query.as_str())
                    .with("query_type", kind.as_str().to_uppercase()),
                vec![ToolCall::new(
                    "query_optimizer",
                    json!({"query": query, "query_type": kind.as_str()}),
                )],
            ),
            Self::ValidateQuery { query, kind } => single(
                TaskTemplate::ValidateAndFixQuery,
                TaskParams::new().with("query", query.as_str()),
                vec![ToolCall::new(
                    "query_validator",
                    json!({"query": query, "query_type": kind.as_str()}),
                )],
            ),
            Self::DefineKpis { goal, context } => single(
                TaskTemplate::DefineKpi,
                TaskParams::new().with("business_goal", goal.as_str()).with("context", context.as_str()),
                vec![ToolCall::new(
                    "metric_definition",
                    json!({"metric_name": goal, "business_context": context}),
                )],
            ),
            Self::CalculateMetric { metric, period, dimensions } => single(
                TaskTemplate::CalculateMetric,
                TaskParams::new()
                    .with("metric_name", metric.as_str())
                    .with("time_period", period.as_str())
                    .with_optional("dimensions", dimensions.clone()),
                vec![ToolCall::new(
                    "metric_calculator",
                    json!({"metric_id": metric, "time_period": period, "group_by": dimensions}),
                )],
            ),
            Self::RecommendMetrics { role: audience, focus } => {
                let library_input = match focus.parse::<KpiCategory>().ok() {
                    Some(category) => json!({"category": category.as_str()}),
                    None => json!({}),
                };
                single(
                    TaskTemplate::RecommendMetricsForRole,
                    TaskParams::new().with("role", audience.as_str()).with("focus_area", focus.as_str()),
                    vec![
                        ToolCall::new("kpi_library", library_input),
                        ToolCall::new(
                            "dashboard_designer",
                            json!({"dashboard_purpose": focus, "audience": audience}),
                        ),
                    ],
                )
            }
            Self::DesignDashboard { purpose, audience } => single(
                TaskTemplate::DesignDashboard,
                TaskParams::new()
                    .with("dashboard_purpose", purpose.as_str())
                    .with("audience", audience.as_str()),
                vec![ToolCall::new(
                    "dashboard_designer",
                    json!({"dashboard_purpose": purpose, "audience": audience}),
                )],
            ),
            Self::AnalyzePipeline { depth } => single(
                TaskTemplate::AnalyzeSalesPipeline,
                TaskParams::new().with("analysis_depth", depth),
                vec![
                    ToolCall::new("kpi_library", json!({"category": "sales"})),
                    ToolCall::new("metric_calculator", json!({"metric_id": "sales.pipeline_value"})),
                ],
            ),
            Self::MetricsQuestion { question } => single(
                TaskTemplate::AnswerMetricsQuestion,
                TaskParams::new().with("question", question),
                vec![ToolCall::new("kpi_library", json!({}))],
            ),
            Self::GenerateDocs { entities } => single(
                TaskTemplate::GenerateEntityDocumentation,
                TaskParams::new().with("entities", entities.as_str()),
                vec![ToolCall::new("schema_doc_generator", json!({"entities": entities}))],
            ),
            Self::DataDictionary { entity } => single(
                TaskTemplate::CreateDataDictionary,
                TaskParams::new().with("entity", entity.as_str()),
                vec![ToolCall::new("data_dictionary", json!({"entity": entity}))],
            ),
            Self::GenerateErd { entities, include_columns } => {
                let detail_clause =
                    if include_columns { "with column details" } else { "entity names only" };
                let lookups = ERD_FORMATS
                    .iter()
                    .map(|format| {
                        ToolCall::new(
                            "erd_generator",
                            json!({"entities": entities, "format": format, "show_columns": include_columns}),
                        )
                    })
                    .collect();
                single(
                    TaskTemplate::GenerateErd,
                    TaskParams::new().with("entities", entities.as_str()).with("detail_clause", detail_clause),
                    lookups,
                )
            }
            Self::IntegrationGuide { source_system, entities } => {
                let mut lookups = vec![ToolCall::new(
                    "schema_doc_generator",
                    json!({"entities": entities, "include_relationships": true, "include_examples": true}),
                )];
                lookups.extend(
                    split_list(&entities)
                        .into_iter()
                        .map(|entity| ToolCall::new("odata_query_builder", json!({"entity": entity}))),
                );
                single(
                    TaskTemplate::CreateIntegrationGuide,
                    TaskParams::new()
                        .with("source_system", source_system)
                        .with("target_entities", entities),
                    lookups,
                )
            }
            Self::Analyze { entity } => analysis_steps(&entity),
            Self::MetricsAnalysis { business_area, audience } => {
                metrics_analysis_steps(&business_area, &audience)
            }
        }
    }
}

fn explore_lookups(entity: &str) -> Vec<ToolCall> {
    vec![
        ToolCall::new("schema_explorer", json!({"entity_name": entity})),
        ToolCall::new(
            "entity_relationship_analyzer",
            json!({"source_entity": entity, "relationship_depth": 2}),
        ),
        ToolCall::new(
            "column_analyzer",
            json!({"entity_name": entity, "include_system_columns": true}),
        ),
    ]
}

fn explorer_calls(entities: &[&str]) -> Vec<ToolCall> {
    entities
        .iter()
        .map(|entity| ToolCall::new("schema_explorer", json!({"entity_name": entity})))
        .collect()
}

fn analysis_steps(entity: &str) -> Vec<Step> {
    let use_case = format!("Standard CRUD operations for {entity}");
    vec![
        Step {
            heading: Some("Entity Exploration"),
            role: AgentRole::SchemaAnalyst,
            task: TaskTemplate::ExploreEntity,
            params: TaskParams::new().with("entity_name", entity),
            lookups: explore_lookups(entity),
        },
        Step {
            heading: Some("Query Templates"),
            role: AgentRole::QueryBuilder,
            task: TaskTemplate::CreateReusableQueryTemplate,
            params: TaskParams::new()
                .with("use_case", use_case.as_str())
                .with("parameters", "id, filters, pagination"),
            lookups: vec![
                ToolCall::new("sql_query_builder", json!({"objective": use_case, "entities": entity})),
                ToolCall::new("odata_query_builder", json!({"entity": entity})),
            ],
        },
        Step {
            heading: Some("Data Dictionary"),
            role: AgentRole::DataArchitect,
            task: TaskTemplate::CreateDataDictionary,
            params: TaskParams::new().with("entity", entity),
            lookups: vec![ToolCall::new("data_dictionary", json!({"entity": entity}))],
        },
    ]
}

/// KPI definitions for a business area, then a dashboard built on them.
fn metrics_analysis_steps(business_area: &str, audience: &str) -> Vec<Step> {
    let goal = format!("Measure performance in {business_area}");
    let context = format!("For {audience} audience");
    let purpose = format!("{business_area} Performance Dashboard");
    vec![
        Step {
            heading: Some("KPI Definitions"),
            role: AgentRole::MetricsExpert,
            task: TaskTemplate::DefineKpi,
            params: TaskParams::new().with("business_goal", goal.as_str()).with("context", context.as_str()),
            lookups: vec![ToolCall::new(
                "metric_definition",
                json!({"metric_name": goal, "business_context": context}),
            )],
        },
        Step {
            heading: Some("Dashboard Design"),
            role: AgentRole::MetricsExpert,
            task: TaskTemplate::DesignDashboard,
            params: TaskParams::new()
                .with("dashboard_purpose", purpose.as_str())
                .with("audience", audience),
            lookups: vec![ToolCall::new(
                "dashboard_designer",
                json!({"dashboard_purpose": purpose, "audience": audience}),
            )],
        },
    ]
}

/// Catalog entities named in free text, matched as whole case-sensitive words.
fn mentioned_entities(text: &str) -> Vec<&'static str> {
    let words: Vec<&str> = text.split(|c: char| !c.is_ascii_alphanumeric()).collect();
    SchemaCatalog
        .entities()
        .iter()
        .map(|entity| entity.name)
        .filter(|name| words.contains(name))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Response {
    pub text: String,
    pub role: AgentRole,
    pub lookups: Vec<&'static str>,
}

/// Routes requests to a role, runs the role's lookups, renders the prompt and
/// makes exactly one provider call per step.
pub struct Orchestrator {
    client: Box<dyn LlmClient>,
    tools: ToolRegistry,
    prompts: PromptLibrary,
}

impl Orchestrator {
    pub fn new(client: Box<dyn LlmClient>) -> Result<Self, OrchestratorError> {
        Ok(Self { client, tools: ToolRegistry::standard(), prompts: PromptLibrary::new()? })
    }

    pub async fn execute(&self, request: Request) -> Result<Response, OrchestratorError> {
        let operation = request.operation();
        let role = request.role();
        let steps = request.into_steps();
        let composite = steps.len() > 1;

        info!(
            event_name = "orchestrator.request",
            operation,
            role = role.as_str(),
            provider = self.client.provider().as_str(),
            steps = steps.len(),
            "dispatching request"
        );

        let mut sections: Vec<String> = Vec::new();
        let mut lookups: Vec<&'static str> = Vec::new();

        for step in steps {
            let records = self.run_lookups(step.role, &step.lookups).await?;
            for record in &records {
                if !lookups.contains(&record.tool) {
                    lookups.push(record.tool);
                }
            }

            let system = self.prompts.render_system(step.role, &self.tool_summaries(step.role))?;
            let previous = sections.join("\n\n");
            let user = self.prompts.render_task(
                step.task,
                &step.params,
                &records,
                (!previous.is_empty()).then_some(previous.as_str()),
            )?;

            debug!(
                event_name = "orchestrator.provider_call",
                operation,
                task = step.task.name(),
                role = step.role.as_str(),
                prompt_chars = system.len() + user.len(),
                "calling model provider"
            );
            let text = self.client.complete(&system, &user).await.map_err(|error| {
                tracing::warn!(
                    event_name = "orchestrator.provider_failed",
                    operation,
                    task = step.task.name(),
                    error = %error,
                    "model provider call failed"
                );
                OrchestratorError::Provider(error)
            })?;

            sections.push(match step.heading {
                Some(heading) => format!("## {heading}\n\n{text}"),
                None => text,
            });
        }

        info!(event_name = "orchestrator.completed", operation, composite, "request completed");
        Ok(Response { text: sections.join("\n\n"), role, lookups })
    }

    async fn run_lookups(
        &self,
        role: AgentRole,
        calls: &[ToolCall],
    ) -> Result<Vec<EmbeddedRecord>, OrchestratorError> {
        let mut records = Vec::with_capacity(calls.len());
        for call in calls {
            role.authorize(call.tool)?;
            let payload = self.tools.execute(call.tool, call.input.clone()).await?;
            debug!(
                event_name = "orchestrator.lookup",
                tool = call.tool,
                found = payload["success"].as_bool().unwrap_or(false),
                "lookup embedded"
            );
            records.push(EmbeddedRecord { tool: call.tool, payload });
        }
        Ok(records)
    }

    fn tool_summaries(&self, role: AgentRole) -> Vec<ToolSummary> {
        role.permitted_tools()
            .into_iter()
            .filter_map(|name| {
                self.tools.describe(name).map(|description| ToolSummary { name, description })
            })
            .collect()
    }

    pub async fn ask(&self, question: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::Ask { question: question.to_string() }).await
    }

    pub async fn explore_entity(&self, entity: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::ExploreEntity { entity: entity.to_string() }).await
    }

    pub async fn analyze_relationships(
        &self,
        source: &str,
        target: Option<&str>,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::AnalyzeRelationships {
            source: source.to_string(),
            target: target.map(str::to_string),
        })
        .await
    }

    pub async fn schema_overview(&self) -> Result<Response, OrchestratorError> {
        self.execute(Request::SchemaOverview).await
    }

    pub async fn ask_schema_question(&self, question: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::SchemaQuestion { question: question.to_string() }).await
    }

    pub async fn compare_entities(
        &self,
        first: &str,
        second: &str,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::CompareEntities { first: first.to_string(), second: second.to_string() })
            .await
    }

    pub async fn build_query(&self, question: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::BuildQuery { question: question.to_string() }).await
    }

    pub async fn build_report_query(
        &self,
        description: &str,
        entities: &str,
        time_range: Option<&str>,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::ReportQuery {
            description: description.to_string(),
            entities: entities.to_string(),
            time_range: time_range.map(str::to_string),
        })
        .await
    }

    pub async fn build_odata_query(
        &self,
        entity: &str,
        requirements: &str,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::ODataQuery {
            entity: entity.to_string(),
            requirements: requirements.to_string(),
        })
        .await
    }

    pub async fn optimize_query(
        &self,
        query: &str,
        kind: QueryKind,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::OptimizeQuery { query: query.to_string(), kind }).await
    }

    pub async fn validate_query(
        &self,
        query: &str,
        kind: QueryKind,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::ValidateQuery { query: query.to_string(), kind }).await
    }

    pub async fn define_kpis(&self, goal: &str, context: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::DefineKpis { goal: goal.to_string(), context: context.to_string() })
            .await
    }

    pub async fn calculate_metric(
        &self,
        metric: &str,
        period: &str,
        dimensions: Option<&str>,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::CalculateMetric {
            metric: metric.to_string(),
            period: period.to_string(),
            dimensions: dimensions.map(str::to_string),
        })
        .await
    }

    pub async fn recommend_metrics(
        &self,
        role: &str,
        focus: &str,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::RecommendMetrics { role: role.to_string(), focus: focus.to_string() })
            .await
    }

    pub async fn design_dashboard(
        &self,
        purpose: &str,
        audience: &str,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::DesignDashboard {
            purpose: purpose.to_string(),
            audience: audience.to_string(),
        })
        .await
    }

    pub async fn analyze_sales_pipeline(&self, depth: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::AnalyzePipeline { depth: depth.to_string() }).await
    }

    pub async fn ask_metrics_question(&self, question: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::MetricsQuestion { question: question.to_string() }).await
    }

    pub async fn generate_documentation(&self, entities: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::GenerateDocs { entities: entities.to_string() }).await
    }

    pub async fn create_data_dictionary(&self, entity: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::DataDictionary { entity: entity.to_string() }).await
    }

    pub async fn generate_erd(
        &self,
        entities: &str,
        include_columns: bool,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::GenerateErd { entities: entities.to_string(), include_columns }).await
    }

    pub async fn create_integration_guide(
        &self,
        source_system: &str,
        entities: &str,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::IntegrationGuide {
            source_system: source_system.to_string(),
            entities: entities.to_string(),
        })
        .await
    }

    pub async fn analyze_entity(&self, entity: &str) -> Result<Response, OrchestratorError> {
        self.execute(Request::Analyze { entity: entity.to_string() }).await
    }

    pub async fn full_metrics_analysis(
        &self,
        business_area: &str,
        audience: &str,
    ) -> Result<Response, OrchestratorError> {
        self.execute(Request::MetricsAnalysis {
            business_area: business_area.to_string(),
            audience: audience.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use crmcrew_core::analysis::QueryKind;
    use crmcrew_core::config::LlmProvider;
    use crmcrew_core::errors::ApplicationError;

    use super::{mentioned_entities, Category, Orchestrator, OrchestratorError, Request};
    use crate::llm::LlmClient;
    use crate::roles::AgentRole;
    use crate::tools::ToolError;

    type Calls = Arc<Mutex<Vec<(String, String)>>>;

    struct ScriptedClient {
        replies: Mutex<VecDeque<anyhow::Result<String>>>,
        calls: Calls,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn provider(&self) -> LlmProvider {
            LlmProvider::Ollama
        }

        async fn complete(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
            self.calls.lock().expect("calls lock").push((system.to_string(), prompt.to_string()));
            self.replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("script exhausted")))
        }
    }

    fn orchestrator(replies: Vec<anyhow::Result<String>>) -> (Orchestrator, Calls) {
        let calls = Calls::default();
        let client = ScriptedClient { replies: Mutex::new(replies.into()), calls: Arc::clone(&calls) };
        (Orchestrator::new(Box::new(client)).expect("orchestrator builds"), calls)
    }

    fn every_request() -> Vec<Request> {
        vec![
            Request::Ask { question: "which table stores leads?".to_string() },
            Request::ExploreEntity { entity: "Contact".to_string() },
            Request::AnalyzeRelationships { source: "Contact".to_string(), target: None },
            Request::SchemaOverview,
            Request::SchemaQuestion { question: "What links Contact and Account?".to_string() },
            Request::CompareEntities { first: "Lead".to_string(), second: "Contact".to_string() },
            Request::BuildQuery { question: "Opportunity by Account".to_string() },
            Request::ReportQuery {
                description: "won deals".to_string(),
                entities: "Opportunity,Account".to_string(),
                time_range: Some("this quarter".to_string()),
            },
            Request::ODataQuery { entity: "Case".to_string(), requirements: "open cases".to_string() },
            Request::OptimizeQuery { query: "SELECT * FROM Contact".to_string(), kind: QueryKind::Sql },
            Request::ValidateQuery { query: "SELECT Id FROM Lead".to_string(), kind: QueryKind::Sql },
            Request::DefineKpis { goal: "grow revenue".to_string(), context: String::new() },
            Request::CalculateMetric {
                metric: "sales.win_rate".to_string(),
                period: "last_quarter".to_string(),
                dimensions: Some("OwnerId".to_string()),
            },
            Request::RecommendMetrics { role: "executive".to_string(), focus: "sales".to_string() },
            Request::DesignDashboard { purpose: "service".to_string(), audience: "manager".to_string() },
            Request::AnalyzePipeline { depth: "standard".to_string() },
            Request::MetricsQuestion { question: "what is churn?".to_string() },
            Request::GenerateDocs { entities: "all".to_string() },
            Request::DataDictionary { entity: "Account".to_string() },
            Request::GenerateErd { entities: "Contact,Account".to_string(), include_columns: true },
            Request::IntegrationGuide {
                source_system: "SAP".to_string(),
                entities: "Account,Order".to_string(),
            },
            Request::Analyze { entity: "Lead".to_string() },
            Request::MetricsAnalysis {
                business_area: "customer service".to_string(),
                audience: "executive".to_string(),
            },
        ]
    }

    #[test]
    fn classifies_questions_by_keyword() {
        assert_eq!(Category::classify("Which TABLE holds phone numbers?"), Category::Schema);
        assert_eq!(Category::classify("write sql for open deals"), Category::Query);
        assert_eq!(Category::classify("best KPI for support"), Category::Metrics);
        assert_eq!(Category::classify("hello there"), Category::Schema);
        assert_eq!(Category::classify("a query on the contact entity"), Category::Schema);
    }

    #[test]
    fn routes_operations_to_roles() {
        assert_eq!(Request::SchemaOverview.role(), AgentRole::SchemaAnalyst);
        assert_eq!(
            Request::ValidateQuery { query: String::new(), kind: QueryKind::OData }.role(),
            AgentRole::QueryBuilder
        );
        assert_eq!(Request::AnalyzePipeline { depth: "deep".to_string() }.role(), AgentRole::MetricsExpert);
        assert_eq!(
            Request::GenerateErd { entities: "all".to_string(), include_columns: false }.role(),
            AgentRole::DataArchitect
        );
        assert_eq!(
            Request::Ask { question: "show me a dashboard".to_string() }.role(),
            AgentRole::MetricsExpert
        );
    }

    #[test]
    fn every_planned_lookup_is_permitted_for_its_role() {
        for request in every_request() {
            let operation = request.operation();
            for step in request.into_steps() {
                for call in &step.lookups {
                    assert!(step.role.permits(call.tool), "{operation}: {} denied", call.tool);
                }
            }
        }
    }

    #[test]
    fn finds_entities_named_in_text() {
        assert_eq!(mentioned_entities("Join Contact to Account, please"), vec!["Contact", "Account"]);
        assert!(mentioned_entities("contacts and accounts").is_empty());
    }

    #[tokio::test]
    async fn returns_provider_text_unmodified() {
        let (orchestrator, calls) = orchestrator(vec![Ok("  Contact is a person.\n".to_string())]);

        let response = orchestrator.explore_entity("Contact").await.expect("response");

        assert_eq!(response.text, "  Contact is a person.\n");
        assert_eq!(response.role, AgentRole::SchemaAnalyst);
        assert_eq!(
            response.lookups,
            vec!["schema_explorer", "entity_relationship_analyzer", "column_analyzer"]
        );

        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.starts_with("You are the Creatio CRM Schema Analyst."));
        assert!(calls[0].1.contains("Creatio CRM entity: Contact"));
        assert!(calls[0].1.contains("\"table_name\": \"Contact\""));
    }

    #[tokio::test]
    async fn lookup_miss_is_embedded_for_the_model() {
        let (orchestrator, calls) = orchestrator(vec![Ok("not in the knowledge base".to_string())]);

        orchestrator.create_data_dictionary("Invoice").await.expect("miss still reaches the model");

        let calls = calls.lock().expect("calls lock");
        assert!(calls[0].1.contains("\"success\": false"));
        assert!(calls[0].1.contains("\"key\": \"Invoice\""));
    }

    #[tokio::test]
    async fn provider_failure_propagates_without_retry() {
        let (orchestrator, calls) =
            orchestrator(vec![Err(anyhow!("OpenAI API error 429 Too Many Requests: quota"))]);

        let error = orchestrator.schema_overview().await.expect_err("provider failed");

        assert!(matches!(error, OrchestratorError::Provider(_)));
        assert_eq!(error.to_string(), "OpenAI API error 429 Too Many Requests: quota");
        assert_eq!(calls.lock().expect("calls lock").len(), 1);
    }

    #[tokio::test]
    async fn ask_uses_the_classified_role() {
        let (orchestrator, calls) = orchestrator(vec![Ok("SELECT ...".to_string())]);

        let response = orchestrator.ask("Write SQL for Opportunity totals").await.expect("response");

        assert_eq!(response.role, AgentRole::QueryBuilder);
        assert!(response.lookups.contains(&"sql_query_builder"));
        let calls = calls.lock().expect("calls lock");
        assert!(calls[0].0.starts_with("You are the Creatio CRM Query Builder Specialist."));
        assert!(calls[0].1.contains("QUESTION: Write SQL for Opportunity totals"));
    }

    #[tokio::test]
    async fn composite_analysis_chains_step_outputs() {
        let (orchestrator, calls) = orchestrator(vec![
            Ok("explored".to_string()),
            Ok("templated".to_string()),
            Ok("dictionary".to_string()),
        ]);

        let response = orchestrator.analyze_entity("Lead").await.expect("response");

        assert_eq!(
            response.text,
            "## Entity Exploration\n\nexplored\n\n## Query Templates\n\ntemplated\n\n## Data Dictionary\n\ndictionary"
        );
        assert_eq!(response.role, AgentRole::SchemaAnalyst);

        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.len(), 3);
        assert!(!calls[0].1.contains("Context from previous steps"));
        assert!(calls[1].0.starts_with("You are the Creatio CRM Query Builder Specialist."));
        assert!(calls[1].1.contains("Context from previous steps:\n## Entity Exploration\n\nexplored"));
        assert!(calls[2].0.starts_with("You are the Creatio CRM Data Architect."));
        assert!(calls[2].1.contains("## Query Templates\n\ntemplated"));
    }

    #[tokio::test]
    async fn composite_analysis_aborts_on_failed_step() {
        let (orchestrator, calls) =
            orchestrator(vec![Ok("explored".to_string()), Err(anyhow!("connection reset"))]);

        let error = orchestrator.analyze_entity("Lead").await.expect_err("second step failed");

        assert_eq!(error.to_string(), "connection reset");
        assert_eq!(calls.lock().expect("calls lock").len(), 2);
    }

    #[tokio::test]
    async fn metrics_analysis_feeds_kpis_into_dashboard_design() {
        let (orchestrator, calls) =
            orchestrator(vec![Ok("kpis".to_string()), Ok("layout".to_string())]);

        let response =
            orchestrator.full_metrics_analysis("Sales", "executive").await.expect("response");

        assert_eq!(response.text, "## KPI Definitions\n\nkpis\n\n## Dashboard Design\n\nlayout");
        assert_eq!(response.role, AgentRole::MetricsExpert);
        assert_eq!(response.lookups, vec!["metric_definition", "dashboard_designer"]);

        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.len(), 2);
        assert!(calls[0].1.contains("Measure performance in Sales"));
        assert!(calls[0].1.contains("For executive audience"));
        assert!(!calls[0].1.contains("Context from previous steps"));
        assert!(calls[1].1.contains("Sales Performance Dashboard"));
        assert!(calls[1].1.contains("Context from previous steps:\n## KPI Definitions\n\nkpis"));
    }

    #[tokio::test]
    async fn erd_request_embeds_all_three_formats_once_listed() {
        let (orchestrator, calls) = orchestrator(vec![Ok("diagram".to_string())]);

        let response = orchestrator.generate_erd("Contact,Account", false).await.expect("response");

        assert_eq!(response.lookups, vec!["erd_generator"]);
        let calls = calls.lock().expect("calls lock");
        assert!(calls[0].1.contains("\"format\": \"plantuml\""));
        assert!(calls[0].1.contains("Format: entity names only"));
    }

    #[test]
    fn orchestrator_errors_map_to_application_errors() {
        let provider = ApplicationError::from(OrchestratorError::Provider(anyhow!("quota exceeded")));
        assert_eq!(provider, ApplicationError::Provider("quota exceeded".to_string()));

        let denied = ApplicationError::from(OrchestratorError::Tool(ToolError::NotPermitted {
            tool: "kpi_library".to_string(),
            role: "schema_analyst",
        }));
        assert!(matches!(denied, ApplicationError::Internal(_)));

        let invalid = ApplicationError::from(OrchestratorError::Tool(ToolError::InvalidInput {
            tool: "query_validator",
            message: "missing field `query`".to_string(),
        }));
        assert!(matches!(invalid, ApplicationError::InvalidInput(_)));
    }
}
