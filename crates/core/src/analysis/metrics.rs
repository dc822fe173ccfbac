use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::knowledge::{KnowledgeTable, KpiDefinition, KpiLibrary, Lookup, Unit};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    Today,
    LastWeek,
    #[default]
    LastMonth,
    LastQuarter,
    Ytd,
    LastYear,
}

impl TimePeriod {
    /// Unrecognized labels fall back to the last month.
    pub fn parse_or_default(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "today" => Self::Today,
            "last_week" => Self::LastWeek,
            "last_quarter" => Self::LastQuarter,
            "ytd" => Self::Ytd,
            "last_year" => Self::LastYear,
            _ => Self::LastMonth,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::LastWeek => "last_week",
            Self::LastMonth => "last_month",
            Self::LastQuarter => "last_quarter",
            Self::Ytd => "ytd",
            Self::LastYear => "last_year",
        }
    }

    /// T-SQL predicate on `CreatedOn`.
    pub fn date_filter(&self) -> &'static str {
        match self {
            Self::Today => "CAST(CreatedOn AS DATE) = CAST(GETDATE() AS DATE)",
            Self::LastWeek => "CreatedOn >= DATEADD(WEEK, -1, GETDATE())",
            Self::LastMonth => "CreatedOn >= DATEADD(MONTH, -1, GETDATE())",
            Self::LastQuarter => "CreatedOn >= DATEADD(QUARTER, -1, GETDATE())",
            Self::Ytd => "YEAR(CreatedOn) = YEAR(GETDATE())",
            Self::LastYear => "CreatedOn >= DATEADD(YEAR, -1, GETDATE())",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricSummary {
    pub id: String,
    pub name: &'static str,
    pub description: &'static str,
    pub unit: Unit,
}

impl From<&KpiDefinition> for MetricSummary {
    fn from(kpi: &KpiDefinition) -> Self {
        Self { id: kpi.id(), name: kpi.name, description: kpi.description, unit: kpi.unit }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricCalculation {
    pub metric: MetricSummary,
    pub formula: &'static str,
    pub sql_query: String,
    pub time_period: TimePeriod,
    pub date_filter: &'static str,
    pub group_by: Option<String>,
    pub entities_required: &'static [&'static str],
    pub notes: Vec<String>,
}

/// Resolves `category.key` and produces the SQL that computes it.
pub fn calculate(metric_id: &str, period: TimePeriod, group_by: Option<&str>) -> Lookup<MetricCalculation> {
    KpiLibrary.lookup(metric_id).map(|kpi| MetricCalculation {
        metric: MetricSummary::from(kpi),
        formula: kpi.formula,
        sql_query: calculation_sql(kpi, period),
        time_period: period,
        date_filter: period.date_filter(),
        group_by: group_by.map(str::to_string),
        entities_required: kpi.related_entities,
        notes: vec![
            format!("Recommended calculation frequency: {}", kpi.frequency.as_str()),
            "Ensure appropriate indexes exist for date columns".to_string(),
            "Consider caching results for dashboard performance".to_string(),
        ],
    })
}

fn sql_alias(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

fn calculation_sql(kpi: &KpiDefinition, period: TimePeriod) -> String {
    let name = kpi.name.to_lowercase();
    let filter = period.date_filter();
    let primary = kpi.related_entities.first().copied().unwrap_or("Opportunity");

    match kpi.unit {
        Unit::Percentage if name.contains("win") && name.contains("rate") => format!(
            "SELECT\n    CAST(SUM(CASE WHEN s.Name = 'Closed won' THEN 1 ELSE 0 END) AS FLOAT) /\n    \
             NULLIF(COUNT(*), 0) * 100 AS WinRate\nFROM [Opportunity] o\n\
             JOIN [OpportunityStage] s ON o.StageId = s.Id\nWHERE s.IsFinal = 1\n    AND {filter}"
        ),
        Unit::Percentage if name.contains("conversion") && name.contains("rate") => format!(
            "SELECT\n    CAST(SUM(CASE WHEN QualifiedContactId IS NOT NULL THEN 1 ELSE 0 END) AS FLOAT) /\n    \
             NULLIF(COUNT(*), 0) * 100 AS ConversionRate\nFROM [Lead]\nWHERE {filter}"
        ),
        Unit::Currency if name.contains("pipeline") => "SELECT SUM(o.Amount) AS PipelineValue\n\
             FROM [Opportunity] o\nJOIN [OpportunityStage] s ON o.StageId = s.Id\nWHERE s.IsFinal = 0"
            .to_string(),
        Unit::Currency if name.contains("average") => format!(
            "SELECT AVG(o.Amount) AS AverageDealSize\nFROM [Opportunity] o\n\
             JOIN [OpportunityStage] s ON o.StageId = s.Id\nWHERE s.Name = 'Closed won'\n    AND {filter}"
        ),
        Unit::Days | Unit::Hours => {
            let datepart = if kpi.unit == Unit::Days { "day" } else { "hour" };
            format!(
                "SELECT AVG(DATEDIFF({datepart}, CreatedOn, CloseDate)) AS {}\nFROM [{primary}]\nWHERE {filter}",
                sql_alias(kpi.name)
            )
        }
        _ => format!("SELECT COUNT(*) AS {}\nFROM [{primary}]\nWHERE {filter}", sql_alias(kpi.name)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DataRequirements {
    pub primary_entity: String,
    pub required_columns: Vec<&'static str>,
    pub related_entities: Vec<&'static str>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MetricDefinitionDraft {
    pub name: String,
    pub business_context: String,
    pub similar_existing_kpis: Vec<MetricSummary>,
    pub suggested_formula: &'static str,
    pub data_requirements: DataRequirements,
    pub calculation_frequency: &'static str,
    pub visualization_type: &'static str,
    pub implementation_steps: Vec<&'static str>,
}

const MAX_SIMILAR_KPIS: usize = 5;

/// Sketches a custom metric from its name, reusing library KPIs where they overlap.
pub fn define_metric(name: &str, business_context: &str, target_entity: Option<&str>) -> MetricDefinitionDraft {
    let lower = name.to_lowercase();
    let similar_existing_kpis = KpiLibrary
        .browse(None, Some(name))
        .into_iter()
        .take(MAX_SIMILAR_KPIS)
        .map(MetricSummary::from)
        .collect();

    MetricDefinitionDraft {
        name: name.to_string(),
        business_context: business_context.to_string(),
        similar_existing_kpis,
        suggested_formula: suggest_formula(&lower),
        data_requirements: data_requirements(&lower, target_entity),
        calculation_frequency: suggest_frequency(&lower),
        visualization_type: suggest_visualization(&lower),
        implementation_steps: vec![
            "1. Validate data availability in Creatio schema",
            "2. Create SQL query for data extraction",
            "3. Set up calculation schedule (if recurring)",
            "4. Add to dashboard or reporting system",
            "5. Define thresholds and alerts if needed",
        ],
    }
}

fn any_of(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

fn suggest_formula(name: &str) -> &'static str {
    if any_of(name, &["rate", "percentage"]) {
        "(COUNT(matching_records) / COUNT(total_records)) * 100"
    } else if any_of(name, &["average", "avg"]) {
        "AVG(column_name)"
    } else if any_of(name, &["total", "sum"]) {
        "SUM(column_name)"
    } else if any_of(name, &["count", "number"]) {
        "COUNT(records)"
    } else if any_of(name, &["time", "duration"]) {
        "AVG(DATEDIFF(unit, start_date, end_date))"
    } else {
        "Define based on specific requirements"
    }
}

impl DataRequirements {
    fn new(primary: &str, required_columns: &[&'static str], related_entities: &[&'static str]) -> Self {
        Self {
            primary_entity: primary.to_string(),
            required_columns: required_columns.to_vec(),
            related_entities: related_entities.to_vec(),
        }
    }
}

fn data_requirements(name: &str, target_entity: Option<&str>) -> DataRequirements {
    if any_of(name, &["opportunity", "deal", "pipeline"]) {
        DataRequirements::new(
            "Opportunity",
            &["Amount", "StageId", "CloseDate", "OwnerId"],
            &["OpportunityStage", "Account"],
        )
    } else if name.contains("lead") {
        DataRequirements::new(
            "Lead",
            &["QualifyStatusId", "LeadSourceId", "CreatedOn"],
            &["QualifyStatus", "LeadSource"],
        )
    } else if any_of(name, &["case", "ticket", "support"]) {
        DataRequirements::new(
            "Case",
            &["StatusId", "RegisteredOn", "SolutionDate"],
            &["CaseStatus", "SatisfactionLevel"],
        )
    } else if any_of(name, &["activity", "call", "meeting"]) {
        DataRequirements::new(
            "Activity",
            &["TypeId", "StatusId", "StartDate", "OwnerId"],
            &["ActivityType", "ActivityStatus"],
        )
    } else {
        DataRequirements::new(target_entity.unwrap_or("To be determined"), &[], &[])
    }
}

fn suggest_frequency(name: &str) -> &'static str {
    if any_of(name, &["daily", "today"]) {
        "daily"
    } else if name.contains("weekly") {
        "weekly"
    } else if name.contains("monthly") {
        "monthly"
    } else if name.contains("quarterly") {
        "quarterly"
    } else if any_of(name, &["year", "annual"]) {
        "yearly"
    } else if any_of(name, &["rate", "percentage"]) {
        "monthly"
    } else {
        "weekly"
    }
}

fn suggest_visualization(name: &str) -> &'static str {
    if any_of(name, &["trend", "over time"]) {
        "line_chart"
    } else if any_of(name, &["by", "breakdown"]) {
        "bar_chart"
    } else if name.contains("distribution") {
        "pie_chart"
    } else if any_of(name, &["rate", "percentage"]) {
        "gauge"
    } else if name.contains("comparison") {
        "bar_chart"
    } else {
        "single_value_card"
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Executive,
    #[default]
    Manager,
    Analyst,
    Rep,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardLayout {
    pub layout_style: &'static str,
    pub recommended_widget_count: usize,
    pub widget_types: &'static [&'static str],
    pub refresh_frequency: &'static str,
}

impl Audience {
    /// Unrecognized audiences get the manager layout.
    pub fn parse_or_default(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "executive" => Self::Executive,
            "analyst" => Self::Analyst,
            "rep" => Self::Rep,
            _ => Self::Manager,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executive => "executive",
            Self::Manager => "manager",
            Self::Analyst => "analyst",
            Self::Rep => "rep",
        }
    }

    pub fn layout(&self) -> DashboardLayout {
        match self {
            Self::Executive => DashboardLayout {
                layout_style: "high-level summary",
                recommended_widget_count: 6,
                widget_types: &["scorecard", "trend_line", "gauge"],
                refresh_frequency: "daily",
            },
            Self::Manager => DashboardLayout {
                layout_style: "operational overview",
                recommended_widget_count: 10,
                widget_types: &["scorecard", "bar_chart", "table", "trend_line"],
                refresh_frequency: "hourly",
            },
            Self::Analyst => DashboardLayout {
                layout_style: "detailed analysis",
                recommended_widget_count: 15,
                widget_types: &["table", "pivot", "scatter", "heatmap", "drill-down"],
                refresh_frequency: "real-time",
            },
            Self::Rep => DashboardLayout {
                layout_style: "personal performance",
                recommended_widget_count: 8,
                widget_types: &["scorecard", "progress_bar", "activity_feed", "leaderboard"],
                refresh_frequency: "real-time",
            },
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Widget {
    pub position: usize,
    pub kpi_id: String,
    pub kpi_name: &'static str,
    pub widget_type: &'static str,
    pub size: &'static str,
    pub show_trend: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DashboardDesign {
    pub dashboard_purpose: String,
    pub target_audience: Audience,
    pub key_questions: String,
    pub design: DashboardLayout,
    pub recommended_kpis: Vec<String>,
    pub widgets: Vec<Widget>,
    pub entities_needed: BTreeSet<&'static str>,
    pub estimated_query_complexity: &'static str,
}

const MAX_RECOMMENDED_KPIS: usize = 8;
const MAX_WIDGETS: usize = 6;

const SALES_KPIS: &[&str] = &[
    "sales.pipeline_value",
    "sales.win_rate",
    "sales.average_deal_size",
    "sales.sales_cycle_length",
    "sales.revenue_by_rep",
];
const MARKETING_KPIS: &[&str] = &[
    "marketing.lead_volume",
    "sales.lead_conversion_rate",
    "marketing.lead_source_effectiveness",
    "marketing.marketing_qualified_leads",
];
const SERVICE_KPIS: &[&str] = &[
    "customer_service.case_volume",
    "customer_service.average_resolution_time",
    "customer_service.customer_satisfaction",
    "customer_service.sla_compliance",
];
const EXECUTIVE_KPIS: &[&str] = &[
    "sales.pipeline_value",
    "sales.win_rate",
    "sales.lead_conversion_rate",
    "customer_service.customer_satisfaction",
    "customer_health.revenue_retention",
];

/// Picks library KPIs matching the dashboard's purpose.
pub fn recommend_kpis(purpose: &str) -> Vec<&'static str> {
    let purpose = purpose.to_lowercase();
    if any_of(&purpose, &["executive", "overview"]) {
        return EXECUTIVE_KPIS.to_vec();
    }

    let mut kpis = Vec::new();
    if any_of(&purpose, &["sales", "revenue"]) {
        kpis.extend_from_slice(SALES_KPIS);
    }
    if any_of(&purpose, &["marketing", "lead"]) {
        kpis.extend_from_slice(MARKETING_KPIS);
    }
    if any_of(&purpose, &["service", "support", "case"]) {
        kpis.extend_from_slice(SERVICE_KPIS);
    }
    kpis
}

pub fn design_dashboard(purpose: &str, audience: Audience, key_questions: &str) -> DashboardDesign {
    let kpis = recommend_kpis(purpose);
    let recommended = kpis
        .iter()
        .take(MAX_RECOMMENDED_KPIS)
        .filter_map(|id| KpiLibrary.lookup(id).found())
        .collect::<Vec<_>>();

    let widgets = recommended
        .iter()
        .take(MAX_WIDGETS)
        .enumerate()
        .map(|(index, kpi)| widget(index, kpi))
        .collect();

    DashboardDesign {
        dashboard_purpose: purpose.to_string(),
        target_audience: audience,
        key_questions: key_questions.to_string(),
        design: audience.layout(),
        recommended_kpis: recommended.iter().map(|kpi| kpi.id()).collect(),
        widgets,
        entities_needed: recommended.iter().flat_map(|kpi| kpi.related_entities.iter().copied()).collect(),
        estimated_query_complexity: if kpis.len() > 5 { "medium" } else { "low" },
    }
}

fn widget(index: usize, kpi: &KpiDefinition) -> Widget {
    let widget_type = match kpi.unit {
        Unit::Percentage => "gauge",
        Unit::Currency => "scorecard",
        Unit::Count if index % 2 == 0 => "bar_chart",
        Unit::Count => "scorecard",
        _ => "trend_line",
    };
    Widget {
        position: index + 1,
        kpi_id: kpi.id(),
        kpi_name: kpi.name,
        widget_type,
        size: if matches!(widget_type, "bar_chart" | "trend_line") { "medium" } else { "small" },
        show_trend: matches!(kpi.unit, Unit::Percentage | Unit::Currency | Unit::Count),
    }
}

#[cfg(test)]
mod tests {
    use super::{calculate, define_metric, design_dashboard, recommend_kpis, Audience, TimePeriod};
    use crate::knowledge::{KnowledgeTable, KpiLibrary, Lookup};

    #[test]
    fn unknown_periods_fall_back_to_last_month() {
        assert_eq!(TimePeriod::parse_or_default("ytd"), TimePeriod::Ytd);
        assert_eq!(TimePeriod::parse_or_default("fortnight"), TimePeriod::LastMonth);
        assert_eq!(TimePeriod::LastWeek.date_filter(), "CreatedOn >= DATEADD(WEEK, -1, GETDATE())");
    }

    #[test]
    fn win_rate_calculation_uses_stage_join_and_period() {
        let calculation = calculate("sales.win_rate", TimePeriod::LastQuarter, Some("OwnerId"))
            .found()
            .expect("win rate exists");
        assert!(calculation.sql_query.contains("AS WinRate"));
        assert!(calculation.sql_query.contains("JOIN [OpportunityStage] s ON o.StageId = s.Id"));
        assert!(calculation.sql_query.ends_with("AND CreatedOn >= DATEADD(QUARTER, -1, GETDATE())"));
        assert_eq!(calculation.group_by.as_deref(), Some("OwnerId"));
        assert_eq!(calculation.notes[0], "Recommended calculation frequency: monthly");
    }

    #[test]
    fn calculation_templates_follow_unit() {
        let conversion = calculate("sales.lead_conversion_rate", TimePeriod::Today, None).found().expect("kpi");
        assert!(conversion.sql_query.contains("FROM [Lead]"));

        let pipeline = calculate("sales.pipeline_value", TimePeriod::Today, None).found().expect("kpi");
        assert!(pipeline.sql_query.ends_with("WHERE s.IsFinal = 0"));

        let cycle = calculate("sales.sales_cycle_length", TimePeriod::Ytd, None).found().expect("kpi");
        assert!(cycle.sql_query.starts_with("SELECT AVG(DATEDIFF(day, CreatedOn, CloseDate)) AS SalesCycleLength"));

        let csat = calculate("customer_service.customer_satisfaction", TimePeriod::Today, None)
            .found()
            .expect("kpi");
        assert!(csat.sql_query.starts_with("SELECT COUNT(*) AS CustomerSatisfactionCSAT\nFROM [Case]"));
    }

    #[test]
    fn calculating_unknown_metric_is_not_found() {
        match calculate("sales.unicorns", TimePeriod::LastMonth, None) {
            Lookup::NotFound(miss) => assert!(miss.available.contains(&"sales.win_rate".to_string())),
            Lookup::Found(_) => panic!("unexpected metric"),
        }
    }

    #[test]
    fn metric_draft_suggests_from_keywords() {
        let draft = define_metric("Deal win rate", "Quarterly board review", None);
        assert_eq!(draft.suggested_formula, "(COUNT(matching_records) / COUNT(total_records)) * 100");
        assert_eq!(draft.data_requirements.primary_entity, "Opportunity");
        assert_eq!(draft.calculation_frequency, "monthly");
        assert_eq!(draft.visualization_type, "gauge");

        let fallback = define_metric("Happiness", "team morale", Some("Contact"));
        assert_eq!(fallback.data_requirements.primary_entity, "Contact");
        assert_eq!(fallback.visualization_type, "single_value_card");
    }

    #[test]
    fn metric_draft_lists_at_most_five_similar_kpis() {
        let draft = define_metric("rate", "anything", None);
        assert_eq!(draft.similar_existing_kpis.len(), 5);
        assert_eq!(draft.similar_existing_kpis[0].id, "sales.win_rate");
    }

    #[test]
    fn recommended_kpis_exist_in_library() {
        for purpose in ["sales and marketing", "support desk", "executive overview"] {
            for id in recommend_kpis(purpose) {
                assert!(KpiLibrary.lookup(id).is_found(), "{id} missing for {purpose}");
            }
        }
    }

    #[test]
    fn executive_overview_replaces_other_recommendations() {
        let kpis = recommend_kpis("Executive sales overview");
        assert_eq!(kpis.len(), 5);
        assert_eq!(kpis[4], "customer_health.revenue_retention");
    }

    #[test]
    fn dashboard_widgets_follow_kpi_units() {
        let design = design_dashboard("Sales performance", Audience::parse_or_default("coach"), "Are we on track?");
        assert_eq!(design.target_audience, Audience::Manager);
        assert_eq!(design.design.recommended_widget_count, 10);
        assert_eq!(design.widgets.len(), 5);
        assert_eq!(design.widgets[0].widget_type, "scorecard");
        assert_eq!(design.widgets[1].widget_type, "gauge");
        assert_eq!(design.widgets[3].widget_type, "trend_line");
        assert_eq!(design.widgets[3].size, "medium");
        assert!(design.entities_needed.contains("OpportunityStage"));
        assert_eq!(design.estimated_query_complexity, "low");
    }

    #[test]
    fn dashboard_caps_recommendations() {
        let design = design_dashboard("sales, marketing and support", Audience::Analyst, "");
        assert_eq!(design.recommended_kpis.len(), 8);
        assert_eq!(design.widgets.len(), 6);
        assert_eq!(design.estimated_query_complexity, "medium");
    }
}
