use std::fmt;

use serde::Serialize;

use crate::tools::ToolError;

/// Groups of lookup tools handed to a role together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSet {
    Schema,
    Query,
    Metrics,
    Documentation,
}

impl ToolSet {
    pub fn tool_names(&self) -> &'static [&'static str] {
        match self {
            Self::Schema => {
                &["schema_explorer", "entity_relationship_analyzer", "column_analyzer", "schema_search"]
            }
            Self::Query => {
                &["sql_query_builder", "odata_query_builder", "query_optimizer", "query_validator"]
            }
            Self::Metrics => {
                &["metric_definition", "metric_calculator", "kpi_library", "dashboard_designer"]
            }
            Self::Documentation => &["schema_doc_generator", "data_dictionary", "erd_generator"],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    SchemaAnalyst,
    DataArchitect,
    MetricsExpert,
    QueryBuilder,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] =
        [Self::SchemaAnalyst, Self::DataArchitect, Self::MetricsExpert, Self::QueryBuilder];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaAnalyst => "schema_analyst",
            Self::DataArchitect => "data_architect",
            Self::MetricsExpert => "metrics_expert",
            Self::QueryBuilder => "query_builder",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::SchemaAnalyst => "Creatio CRM Schema Analyst",
            Self::DataArchitect => "Creatio CRM Data Architect",
            Self::MetricsExpert => "Creatio CRM Metrics & Analytics Expert",
            Self::QueryBuilder => "Creatio CRM Query Builder Specialist",
        }
    }

    pub fn goal(&self) -> &'static str {
        match self {
            Self::SchemaAnalyst => {
                "Provide comprehensive understanding of the Creatio CRM database schema, \
                 making complex data structures accessible to data architects and staff. \
                 Help users understand entity relationships, data flows, and how business \
                 concepts map to the underlying database structure."
            }
            Self::DataArchitect => {
                "Guide data architecture decisions for Creatio CRM implementations, \
                 ensuring optimal data models that support business objectives, \
                 maintain data integrity, and enable efficient querying and reporting. \
                 Help organizations make the most of their Creatio data investment."
            }
            Self::MetricsExpert => {
                "Help organizations extract maximum value from their Creatio CRM data \
                 by defining, calculating, and visualizing meaningful KPIs and metrics. \
                 Enable data-driven decision making across sales, marketing, and customer \
                 service functions."
            }
            Self::QueryBuilder => {
                "Help users extract the exact data they need from Creatio CRM through \
                 well-crafted, efficient queries. Translate business questions into \
                 technical queries that return accurate, complete results while \
                 maintaining good performance."
            }
        }
    }

    pub fn backstory(&self) -> &'static str {
        match self {
            Self::SchemaAnalyst => {
                "You are an expert database analyst with deep knowledge of Creatio CRM's \
                 architecture and data model. You've spent years working with Creatio \
                 implementations across various industries, understanding how the platform \
                 structures data for contacts, accounts, opportunities, activities, and \
                 custom objects. You're familiar with Creatio's object model, including \
                 the base entity schema, lookup patterns, and detail relationships. \
                 You excel at translating technical database structures into business-\
                 friendly explanations, helping both technical and non-technical users \
                 understand how their data is organized. You know the common tables like \
                 Contact, Account, Activity, Opportunity, Lead, Case, and how they \
                 interconnect through the CRM's relationship model."
            }
            Self::DataArchitect => {
                "You are a senior data architect with extensive experience in CRM \
                 platforms, particularly Creatio (formerly bpm'online). You've designed \
                 data models for enterprise-scale Creatio deployments, understanding \
                 the nuances of extending the base schema while maintaining upgrade \
                 compatibility. You're well-versed in Creatio's Section, Detail, and \
                 Lookup patterns, and you know how to leverage the Freedom UI and \
                 Classic UI data binding requirements. Your expertise spans data \
                 warehousing, analytics integration, and building efficient reporting \
                 structures on top of Creatio's transactional data. You understand \
                 the implications of decisions on system performance, scalability, \
                 and maintainability. You've helped organizations migrate from other \
                 CRMs to Creatio and understand common pitfalls and best practices."
            }
            Self::MetricsExpert => {
                "You are a CRM analytics specialist with deep expertise in measuring \
                 business performance through data. You've implemented analytics solutions \
                 across dozens of Creatio deployments, helping organizations track \
                 everything from basic pipeline metrics to sophisticated customer lifetime \
                 value calculations. You understand the full spectrum of CRM metrics: \
                 lead conversion rates, opportunity win rates, sales cycle duration, \
                 average deal size, customer acquisition cost, churn rates, NPS scores, \
                 case resolution times, and SLA compliance. You're skilled at identifying \
                 which metrics matter most for different business contexts and how to \
                 calculate them accurately from Creatio's data model. You know how to \
                 leverage Creatio's built-in analytics as well as external BI tools. \
                 Your recommendations are always grounded in what's actually measurable \
                 and actionable."
            }
            Self::QueryBuilder => {
                "You are a database query specialist with extensive experience in \
                 Creatio CRM's data layer. You're proficient in both SQL (for direct \
                 database access) and OData (for API-based queries). You understand \
                 Creatio's entity structure, including how base entities like Contact, \
                 Account, Activity, and Opportunity are organized, and how custom \
                 entities extend this model. You're an expert at writing efficient \
                 queries that leverage proper indexing, avoid N+1 problems, and \
                 handle Creatio's specific patterns like SysAdminUnit lookups, \
                 MultiLookup columns, and Detail relationships. You can translate \
                 business questions like 'Show me all opportunities closing this \
                 quarter by account industry' into precise SQL or OData queries. \
                 You always consider query performance and suggest appropriate \
                 filtering, pagination, and caching strategies."
            }
        }
    }

    pub fn tool_sets(&self) -> &'static [ToolSet] {
        match self {
            Self::SchemaAnalyst => &[ToolSet::Schema, ToolSet::Documentation],
            Self::DataArchitect => &[ToolSet::Schema, ToolSet::Query, ToolSet::Documentation],
            Self::MetricsExpert => &[ToolSet::Metrics, ToolSet::Query],
            Self::QueryBuilder => &[ToolSet::Query, ToolSet::Schema],
        }
    }

    pub fn permitted_tools(&self) -> Vec<&'static str> {
        self.tool_sets().iter().flat_map(|set| set.tool_names().iter().copied()).collect()
    }

    pub fn permits(&self, tool: &str) -> bool {
        self.tool_sets().iter().any(|set| set.tool_names().contains(&tool))
    }

    /// Refuses a lookup the role was not given.
    pub fn authorize(&self, tool: &str) -> Result<(), ToolError> {
        if self.permits(tool) {
            Ok(())
        } else {
            Err(ToolError::NotPermitted { tool: tool.to_string(), role: self.as_str() })
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentRole, ToolSet};
    use crate::tools::ToolError;

    #[test]
    fn every_role_has_a_distinct_title() {
        let mut titles: Vec<_> = AgentRole::ALL.iter().map(AgentRole::title).collect();
        titles.sort_unstable();
        titles.dedup();
        assert_eq!(titles.len(), AgentRole::ALL.len());
        assert_eq!(AgentRole::MetricsExpert.title(), "Creatio CRM Metrics & Analytics Expert");
    }

    #[test]
    fn schema_analyst_gets_schema_and_documentation_tools() {
        let role = AgentRole::SchemaAnalyst;
        assert!(role.permits("schema_explorer"));
        assert!(role.permits("erd_generator"));
        assert!(!role.permits("sql_query_builder"));
        assert!(!role.permits("kpi_library"));
    }

    #[test]
    fn metrics_expert_cannot_reach_schema_tools() {
        let role = AgentRole::MetricsExpert;
        assert!(role.permits("metric_calculator"));
        assert!(role.permits("query_validator"));

        match role.authorize("schema_explorer") {
            Err(ToolError::NotPermitted { tool, role }) => {
                assert_eq!(tool, "schema_explorer");
                assert_eq!(role, "metrics_expert");
            }
            other => panic!("expected denial, got {other:?}"),
        }
    }

    #[test]
    fn data_architect_spans_three_tool_sets() {
        let tools = AgentRole::DataArchitect.permitted_tools();
        assert_eq!(
            tools.len(),
            ToolSet::Schema.tool_names().len()
                + ToolSet::Query.tool_names().len()
                + ToolSet::Documentation.tool_names().len()
        );
        assert_eq!(tools.first(), Some(&"schema_explorer"));
    }

    #[test]
    fn backstories_name_the_platform() {
        for role in AgentRole::ALL {
            assert!(role.backstory().contains("Creatio"), "{role} backstory");
            assert!(!role.goal().is_empty());
        }
    }
}
