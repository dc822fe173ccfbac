use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use super::{KnowledgeTable, Lookup};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiCategory {
    Sales,
    Marketing,
    CustomerService,
    CustomerHealth,
    ActivityMetrics,
}

impl KpiCategory {
    pub const ALL: [KpiCategory; 5] = [
        Self::Sales,
        Self::Marketing,
        Self::CustomerService,
        Self::CustomerHealth,
        Self::ActivityMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Marketing => "marketing",
            Self::CustomerService => "customer_service",
            Self::CustomerHealth => "customer_health",
            Self::ActivityMetrics => "activity_metrics",
        }
    }
}

impl fmt::Display for KpiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown KPI category `{0}` (expected sales|marketing|customer_service|customer_health|activity_metrics)")]
pub struct InvalidKpiCategory(String);

impl FromStr for KpiCategory {
    type Err = InvalidKpiCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == value)
            .ok_or_else(|| InvalidKpiCategory(value.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Unit {
    #[serde(rename = "currency")]
    Currency,
    #[serde(rename = "percentage")]
    Percentage,
    #[serde(rename = "days")]
    Days,
    #[serde(rename = "hours")]
    Hours,
    #[serde(rename = "minutes")]
    Minutes,
    #[serde(rename = "count")]
    Count,
    #[serde(rename = "score")]
    Score,
    #[serde(rename = "currency/day")]
    CurrencyPerDay,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Percentage => "percentage",
            Self::Days => "days",
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Count => "count",
            Self::Score => "score",
            Self::CurrencyPerDay => "currency/day",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    PerCampaign,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::PerCampaign => "per_campaign",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct KpiDefinition {
    pub category: KpiCategory,
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub formula: &'static str,
    pub unit: Unit,
    pub frequency: Frequency,
    pub related_entities: &'static [&'static str],
}

impl KpiDefinition {
    /// Path form `category.key`.
    pub fn id(&self) -> String {
        format!("{}.{}", self.category.as_str(), self.key)
    }

    fn matches_term(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.description.to_lowercase().contains(needle)
    }
}

use Frequency::{Daily, Monthly, PerCampaign, Quarterly, Weekly};
use KpiCategory::{ActivityMetrics, CustomerHealth, CustomerService, Marketing, Sales};

#[allow(clippy::too_many_arguments)]
const fn kpi(
    category: KpiCategory,
    key: &'static str,
    name: &'static str,
    description: &'static str,
    formula: &'static str,
    unit: Unit,
    frequency: Frequency,
    related_entities: &'static [&'static str],
) -> KpiDefinition {
    KpiDefinition { category, key, name, description, formula, unit, frequency, related_entities }
}

static KPIS: &[KpiDefinition] = &[
    kpi(
        Sales,
        "pipeline_value",
        "Pipeline Value",
        "Total value of open opportunities in the sales pipeline",
        "SUM(Opportunity.Amount) WHERE Opportunity.Stage.IsFinal = 0",
        Unit::Currency,
        Daily,
        &["Opportunity", "OpportunityStage"],
    ),
    kpi(
        Sales,
        "win_rate",
        "Win Rate",
        "Percentage of opportunities closed as won",
        "(COUNT(Won Opportunities) / COUNT(All Closed Opportunities)) * 100",
        Unit::Percentage,
        Monthly,
        &["Opportunity", "OpportunityStage"],
    ),
    kpi(
        Sales,
        "average_deal_size",
        "Average Deal Size",
        "Average value of closed-won opportunities",
        "AVG(Opportunity.Amount) WHERE Stage.Name = 'Closed won'",
        Unit::Currency,
        Monthly,
        &["Opportunity"],
    ),
    kpi(
        Sales,
        "sales_cycle_length",
        "Sales Cycle Length",
        "Average days from opportunity creation to close",
        "AVG(DATEDIFF(day, Opportunity.CreatedOn, Opportunity.CloseDate))",
        Unit::Days,
        Monthly,
        &["Opportunity"],
    ),
    kpi(
        Sales,
        "lead_conversion_rate",
        "Lead Conversion Rate",
        "Percentage of leads converted to opportunities",
        "(COUNT(Converted Leads) / COUNT(All Leads)) * 100",
        Unit::Percentage,
        Monthly,
        &["Lead"],
    ),
    kpi(
        Sales,
        "revenue_by_rep",
        "Revenue by Sales Rep",
        "Total closed revenue per sales representative",
        "SUM(Opportunity.Amount) GROUP BY OwnerId WHERE Stage = 'Closed won'",
        Unit::Currency,
        Monthly,
        &["Opportunity", "Contact"],
    ),
    kpi(
        Sales,
        "quota_attainment",
        "Quota Attainment",
        "Percentage of sales quota achieved",
        "(Actual Revenue / Target Quota) * 100",
        Unit::Percentage,
        Monthly,
        &["Opportunity", "SalesTarget"],
    ),
    kpi(
        Sales,
        "opportunity_velocity",
        "Opportunity Velocity",
        "Rate at which opportunities move through pipeline",
        "(# Opportunities * Win Rate * Avg Deal) / Sales Cycle",
        Unit::CurrencyPerDay,
        Monthly,
        &["Opportunity"],
    ),
    kpi(
        Marketing,
        "lead_volume",
        "Lead Volume",
        "Number of new leads created in period",
        "COUNT(Lead) WHERE CreatedOn IN period",
        Unit::Count,
        Weekly,
        &["Lead"],
    ),
    kpi(
        Marketing,
        "lead_source_effectiveness",
        "Lead Source Effectiveness",
        "Leads and conversions by source",
        "COUNT(Lead) GROUP BY LeadSourceId",
        Unit::Count,
        Monthly,
        &["Lead", "LeadSource"],
    ),
    kpi(
        Marketing,
        "marketing_qualified_leads",
        "Marketing Qualified Leads (MQL)",
        "Leads meeting marketing qualification criteria",
        "COUNT(Lead) WHERE QualifyStatus = 'Marketing Qualified'",
        Unit::Count,
        Weekly,
        &["Lead", "QualifyStatus"],
    ),
    kpi(
        Marketing,
        "cost_per_lead",
        "Cost Per Lead",
        "Marketing spend divided by leads generated",
        "Marketing Spend / COUNT(Leads)",
        Unit::Currency,
        Monthly,
        &["Lead", "Campaign"],
    ),
    kpi(
        Marketing,
        "campaign_roi",
        "Campaign ROI",
        "Return on investment for marketing campaigns",
        "((Revenue - Cost) / Cost) * 100",
        Unit::Percentage,
        PerCampaign,
        &["Campaign", "Opportunity"],
    ),
    kpi(
        CustomerService,
        "case_volume",
        "Case Volume",
        "Total number of support cases",
        "COUNT(Case)",
        Unit::Count,
        Daily,
        &["Case"],
    ),
    kpi(
        CustomerService,
        "average_resolution_time",
        "Average Resolution Time",
        "Average time to resolve cases",
        "AVG(DATEDIFF(hour, Case.RegisteredOn, Case.SolutionDate))",
        Unit::Hours,
        Weekly,
        &["Case"],
    ),
    kpi(
        CustomerService,
        "first_response_time",
        "First Response Time",
        "Average time to first response on cases",
        "AVG(DATEDIFF(minute, Case.RegisteredOn, FirstActivity.StartDate))",
        Unit::Minutes,
        Daily,
        &["Case", "Activity"],
    ),
    kpi(
        CustomerService,
        "customer_satisfaction",
        "Customer Satisfaction (CSAT)",
        "Average satisfaction score from case surveys",
        "AVG(Case.SatisfactionLevel.Score)",
        Unit::Score,
        Weekly,
        &["Case", "SatisfactionLevel"],
    ),
    kpi(
        CustomerService,
        "sla_compliance",
        "SLA Compliance Rate",
        "Percentage of cases resolved within SLA",
        "(COUNT(Cases within SLA) / COUNT(All Cases)) * 100",
        Unit::Percentage,
        Weekly,
        &["Case", "ServicePact"],
    ),
    kpi(
        CustomerService,
        "case_backlog",
        "Case Backlog",
        "Number of open unresolved cases",
        "COUNT(Case) WHERE Status.IsFinal = 0",
        Unit::Count,
        Daily,
        &["Case", "CaseStatus"],
    ),
    kpi(
        CustomerService,
        "escalation_rate",
        "Escalation Rate",
        "Percentage of cases that required escalation",
        "(COUNT(Escalated Cases) / COUNT(All Cases)) * 100",
        Unit::Percentage,
        Weekly,
        &["Case"],
    ),
    kpi(
        CustomerHealth,
        "customer_lifetime_value",
        "Customer Lifetime Value (CLV)",
        "Total revenue expected from a customer relationship",
        "AVG Revenue per Period * Customer Lifespan",
        Unit::Currency,
        Quarterly,
        &["Account", "Order", "Opportunity"],
    ),
    kpi(
        CustomerHealth,
        "churn_rate",
        "Churn Rate",
        "Percentage of customers lost in period",
        "(Lost Customers / Total Customers at Start) * 100",
        Unit::Percentage,
        Monthly,
        &["Account"],
    ),
    kpi(
        CustomerHealth,
        "net_promoter_score",
        "Net Promoter Score (NPS)",
        "Customer loyalty and satisfaction metric",
        "% Promoters - % Detractors",
        Unit::Score,
        Quarterly,
        &["Contact", "Survey"],
    ),
    kpi(
        CustomerHealth,
        "customer_engagement_score",
        "Customer Engagement Score",
        "Composite score of customer interaction levels",
        "Weighted sum of activities, responses, purchases",
        Unit::Score,
        Monthly,
        &["Account", "Activity", "Opportunity"],
    ),
    kpi(
        CustomerHealth,
        "revenue_retention",
        "Revenue Retention Rate",
        "Percentage of revenue retained from existing customers",
        "((End Revenue - New Revenue) / Start Revenue) * 100",
        Unit::Percentage,
        Monthly,
        &["Account", "Order"],
    ),
    kpi(
        ActivityMetrics,
        "activities_per_rep",
        "Activities per Rep",
        "Number of activities logged per sales rep",
        "COUNT(Activity) GROUP BY OwnerId",
        Unit::Count,
        Weekly,
        &["Activity", "Contact"],
    ),
    kpi(
        ActivityMetrics,
        "calls_made",
        "Calls Made",
        "Number of call activities completed",
        "COUNT(Activity) WHERE Type = 'Call'",
        Unit::Count,
        Daily,
        &["Activity", "ActivityType"],
    ),
    kpi(
        ActivityMetrics,
        "emails_sent",
        "Emails Sent",
        "Number of email activities",
        "COUNT(Activity) WHERE Type = 'Email'",
        Unit::Count,
        Daily,
        &["Activity", "ActivityType"],
    ),
    kpi(
        ActivityMetrics,
        "meetings_held",
        "Meetings Held",
        "Number of meeting activities completed",
        "COUNT(Activity) WHERE Type = 'Meeting' AND Status = 'Completed'",
        Unit::Count,
        Weekly,
        &["Activity", "ActivityType", "ActivityStatus"],
    ),
];

/// The KPI library, keyed by `category.key`.
#[derive(Clone, Copy, Debug, Default)]
pub struct KpiLibrary;

impl KnowledgeTable for KpiLibrary {
    type Record = KpiDefinition;

    const NAME: &'static str = "kpi_library";

    fn lookup(&self, key: &str) -> Lookup<&'static KpiDefinition> {
        let found = key.split_once('.').and_then(|(category, kpi_key)| {
            let category = category.parse::<KpiCategory>().ok()?;
            self.get(category, kpi_key)
        });
        match found {
            Some(kpi) => Lookup::Found(kpi),
            None => Lookup::NotFound(self.not_found(key)),
        }
    }

    fn keys(&self) -> Vec<String> {
        KPIS.iter().map(KpiDefinition::id).collect()
    }
}

impl KpiLibrary {
    pub fn all(&self) -> &'static [KpiDefinition] {
        KPIS
    }

    pub fn get(&self, category: KpiCategory, key: &str) -> Option<&'static KpiDefinition> {
        KPIS.iter().find(|kpi| kpi.category == category && kpi.key == key)
    }

    pub fn in_category(&self, category: KpiCategory) -> impl Iterator<Item = &'static KpiDefinition> {
        KPIS.iter().filter(move |kpi| kpi.category == category)
    }

    /// Lists KPIs, optionally narrowed to a category and a case-insensitive
    /// term matched against name and description.
    pub fn browse(
        &self,
        category: Option<KpiCategory>,
        search_term: Option<&str>,
    ) -> Vec<&'static KpiDefinition> {
        let needle = search_term.map(str::to_lowercase);
        KPIS.iter()
            .filter(|kpi| category.map_or(true, |category| kpi.category == category))
            .filter(|kpi| needle.as_deref().map_or(true, |needle| kpi.matches_term(needle)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Frequency, KpiCategory, KpiLibrary, Unit};
    use crate::knowledge::{KnowledgeTable, SchemaCatalog};

    #[test]
    fn win_rate_is_a_percentage() {
        let win_rate = KpiLibrary.lookup("sales.win_rate").found().expect("win rate exists");
        assert_eq!(win_rate.unit, Unit::Percentage);
        assert_eq!(win_rate.frequency, Frequency::Monthly);
        assert_eq!(win_rate.name, "Win Rate");
    }

    #[test]
    fn every_kpi_has_formula_and_unit() {
        for kpi in KpiLibrary.all() {
            assert!(!kpi.formula.trim().is_empty(), "{} has an empty formula", kpi.id());
            assert!(!kpi.unit.as_str().is_empty(), "{} has an empty unit", kpi.id());
            assert!(!kpi.related_entities.is_empty(), "{} lists no entities", kpi.id());
        }
    }

    #[test]
    fn every_category_has_kpis() {
        for category in KpiCategory::ALL {
            assert!(KpiLibrary.in_category(category).next().is_some(), "{category} is empty");
        }
        assert_eq!(KpiLibrary.in_category(KpiCategory::Sales).count(), 8);
    }

    #[test]
    fn malformed_and_unknown_paths_miss() {
        for key in ["win_rate", "sales.", "finance.win_rate", "sales.win_rate.extra", ""] {
            assert!(!KpiLibrary.lookup(key).is_found(), "{key:?} should miss");
        }
    }

    #[test]
    fn browse_filters_by_category_and_term() {
        let service = KpiLibrary.browse(Some(KpiCategory::CustomerService), None);
        assert_eq!(service.len(), 7);

        let rates = KpiLibrary.browse(None, Some("RATE"));
        assert!(rates.iter().any(|kpi| kpi.key == "win_rate"));
        assert!(rates.iter().any(|kpi| kpi.key == "churn_rate"));

        let sales_leads = KpiLibrary.browse(Some(KpiCategory::Sales), Some("lead"));
        let keys: Vec<_> = sales_leads.iter().map(|kpi| kpi.key).collect();
        assert_eq!(keys, vec!["lead_conversion_rate"]);
    }

    #[test]
    fn categories_parse_exact_labels_only() {
        assert_eq!("customer_health".parse::<KpiCategory>(), Ok(KpiCategory::CustomerHealth));
        assert!("Sales".parse::<KpiCategory>().is_err());
    }

    #[test]
    fn most_related_entities_are_cataloged() {
        let catalog = SchemaCatalog;
        let win_rate = KpiLibrary.lookup("sales.win_rate").found().expect("win rate");
        assert!(catalog.lookup(win_rate.related_entities[0]).is_found());
    }
}
