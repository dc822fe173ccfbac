use serde::Serialize;

use super::{split_list, AnalysisError, QueryKind};
use crate::knowledge::SchemaCatalog;

const SQL_PERFORMANCE_NOTES: [&str; 3] = [
    "Consider adding indexes on filter columns",
    "Use date range filters to limit result set",
    "Add TOP clause for testing with large datasets",
];

const ODATA_USAGE_NOTES: [&str; 3] = [
    "Add authentication headers (BPMCSRF token)",
    "Use $skip for pagination",
    "Add $count=true to get total count",
];

const DEFAULT_ODATA_TOP: u32 = 100;

fn alias(entity: &str) -> String {
    match entity {
        "Contact" => "c".to_string(),
        "Account" => "a".to_string(),
        "Opportunity" => "o".to_string(),
        "Lead" => "l".to_string(),
        "Activity" => "act".to_string(),
        "Case" => "cs".to_string(),
        "Product" => "p".to_string(),
        "Order" => "ord".to_string(),
        other => other.chars().next().map(|c| c.to_ascii_lowercase().to_string()).unwrap_or_default(),
    }
}

fn default_columns(entity: &str) -> Vec<String> {
    let columns: &[&str] = match entity {
        "Contact" => &["c.Id", "c.Name", "c.Email", "c.Phone", "c.AccountId"],
        "Account" => &["a.Id", "a.Name", "a.Phone", "a.Web", "a.IndustryId"],
        "Opportunity" => &["o.Id", "o.Title", "o.Amount", "o.StageId", "o.CloseDate"],
        "Lead" => &["l.Id", "l.LeadName", "l.Email", "l.QualifyStatusId"],
        "Activity" => &["act.Id", "act.Title", "act.TypeId", "act.StartDate"],
        "Case" => &["cs.Id", "cs.Number", "cs.Subject", "cs.StatusId"],
        other => {
            let alias = alias(other);
            return vec![format!("{alias}.Id"), format!("{alias}.Name")];
        }
    };
    columns.iter().map(|column| column.to_string()).collect()
}

fn join_template(from: &str, to: &str) -> Option<&'static str> {
    let join = match (from, to) {
        ("Contact", "Account") => "LEFT JOIN [Account] a ON c.AccountId = a.Id",
        ("Account", "Contact") => "LEFT JOIN [Contact] c ON c.AccountId = a.Id",
        ("Opportunity", "Account") => "LEFT JOIN [Account] a ON o.AccountId = a.Id",
        ("Activity", "Contact") => "LEFT JOIN [Contact] c ON act.ContactId = c.Id",
        ("Activity", "Account") => "LEFT JOIN [Account] a ON act.AccountId = a.Id",
        ("Case", "Contact") => "LEFT JOIN [Contact] c ON cs.ContactId = c.Id",
        ("Case", "Account") => "LEFT JOIN [Account] a ON cs.AccountId = a.Id",
        ("Lead", "Contact") => "LEFT JOIN [Contact] c ON l.QualifiedContactId = c.Id",
        _ => return None,
    };
    Some(join)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SqlRequest {
    pub objective: String,
    /// First entity is the primary (FROM) entity.
    pub entities: Vec<String>,
    pub filters: Option<String>,
    pub aggregations: Option<String>,
    pub grouping: Option<String>,
    pub ordering: Option<String>,
}

impl SqlRequest {
    pub fn new(objective: impl Into<String>, entities: &str) -> Self {
        Self { objective: objective.into(), entities: split_list(entities), ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SqlQuery {
    pub objective: String,
    pub query: String,
    pub entities_used: Vec<String>,
    pub has_aggregation: bool,
    pub has_grouping: bool,
    pub explanation: String,
    pub performance_notes: Vec<&'static str>,
}

/// Assembles a T-SQL statement from the request's natural-language hints.
pub fn build_sql(request: &SqlRequest) -> Result<SqlQuery, AnalysisError> {
    let primary = request.entities.first().ok_or(AnalysisError::NoEntities)?;

    let mut parts = vec![select_clause(primary, request.aggregations.as_deref())];
    parts.push(from_clause(primary, &request.entities[1..]));
    if let Some(filters) = request.filters.as_deref() {
        parts.push(where_clause(filters));
    }
    if let Some(grouping) = request.grouping.as_deref() {
        parts.push(format!("GROUP BY {grouping}"));
    }
    if let Some(ordering) = request.ordering.as_deref() {
        parts.push(order_clause(ordering));
    }

    Ok(SqlQuery {
        objective: request.objective.clone(),
        query: format!("{};", parts.join("\n")),
        entities_used: request.entities.clone(),
        has_aggregation: request.aggregations.is_some(),
        has_grouping: request.grouping.is_some(),
        explanation: explain(request),
        performance_notes: SQL_PERFORMANCE_NOTES.to_vec(),
    })
}

fn select_clause(primary: &str, aggregations: Option<&str>) -> String {
    if let Some(aggregations) = aggregations {
        let wanted = aggregations.to_lowercase();
        let columns = [
            ("count", format!("COUNT({primary}.Id) AS RecordCount")),
            ("sum", format!("SUM({primary}.Amount) AS TotalAmount")),
            ("avg", format!("AVG({primary}.Amount) AS AvgAmount")),
        ]
        .into_iter()
        .filter(|(keyword, _)| wanted.contains(keyword))
        .map(|(_, column)| column)
        .collect::<Vec<_>>();
        if !columns.is_empty() {
            return format!("SELECT\n    {}", columns.join(", "));
        }
    }
    format!("SELECT\n    {}", default_columns(primary).join(",\n    "))
}

fn from_clause(primary: &str, joined: &[String]) -> String {
    let mut clause = format!("FROM [{primary}] {}", alias(primary));
    for entity in joined {
        match join_template(primary, entity).or_else(|| join_template(entity, primary)) {
            Some(join) => {
                clause.push('\n');
                clause.push_str(join);
            }
            None => clause.push_str(&format!("\n-- Add JOIN for [{entity}] based on your relationship")),
        }
    }
    clause
}

fn where_clause(filters: &str) -> String {
    let wanted = filters.to_lowercase();
    let conditions = [
        ("this month", "CreatedOn >= DATEADD(MONTH, DATEDIFF(MONTH, 0, GETDATE()), 0)"),
        ("this quarter", "CreatedOn >= DATEADD(QUARTER, DATEDIFF(QUARTER, 0, GETDATE()), 0)"),
        ("this year", "YEAR(CreatedOn) = YEAR(GETDATE())"),
        ("active", "IsActive = 1"),
        ("closed", "StatusId IN (SELECT Id FROM [OpportunityStatus] WHERE IsFinal = 1)"),
        ("won", "StageId = (SELECT Id FROM [OpportunityStage] WHERE Name = 'Closed won')"),
    ]
    .into_iter()
    .filter(|(keyword, _)| wanted.contains(keyword))
    .map(|(_, condition)| condition)
    .collect::<Vec<_>>();

    if conditions.is_empty() {
        format!("WHERE -- Add conditions based on: {filters}")
    } else {
        format!("WHERE\n    {}", conditions.join("\n    AND "))
    }
}

fn order_clause(ordering: &str) -> String {
    let wanted = ordering.to_lowercase();
    if wanted.contains("newest") || wanted.contains("recent") {
        "ORDER BY CreatedOn DESC".to_string()
    } else if wanted.contains("oldest") {
        "ORDER BY CreatedOn ASC".to_string()
    } else if wanted.contains("amount") {
        "ORDER BY Amount DESC".to_string()
    } else {
        format!("ORDER BY {ordering}")
    }
}

fn explain(request: &SqlRequest) -> String {
    let mut explanation = format!("This query retrieves data from {}", request.entities[0]);
    if request.entities.len() > 1 {
        explanation.push_str(&format!(" joined with {}", request.entities[1..].join(", ")));
    }
    if let Some(filters) = &request.filters {
        explanation.push_str(&format!(" filtered by: {filters}"));
    }
    if let Some(aggregations) = &request.aggregations {
        explanation.push_str(&format!(" with aggregations: {aggregations}"));
    }
    explanation
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ODataRequest {
    pub entity: String,
    pub select_fields: Option<String>,
    pub filter_expression: Option<String>,
    pub expand_relations: Option<String>,
    pub top: u32,
}

impl ODataRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            select_fields: None,
            filter_expression: None,
            expand_relations: None,
            top: DEFAULT_ODATA_TOP,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ODataQuery {
    pub entity: String,
    pub odata_url: String,
    pub base: String,
    pub filter: Option<String>,
    pub top: u32,
    pub curl_example: String,
    pub usage_notes: Vec<&'static str>,
}

/// Builds a Creatio OData v4 collection URL.
pub fn build_odata(request: &ODataRequest) -> ODataQuery {
    let base = format!("/0/odata/{}Collection", request.entity);
    let mut params = Vec::new();

    if let Some(select) = request.select_fields.as_deref() {
        params.push(format!("$select={}", split_list(select).join(",")));
    }
    let filter = request
        .filter_expression
        .as_deref()
        .map(|expression| odata_filter(expression, &request.entity));
    if let Some(filter) = &filter {
        params.push(format!("$filter={filter}"));
    }
    if let Some(expand) = request.expand_relations.as_deref() {
        params.push(format!("$expand={}", split_list(expand).join(",")));
    }
    params.push(format!("$top={}", request.top));

    let odata_url = format!("{base}?{}", params.join("&"));
    ODataQuery {
        entity: request.entity.clone(),
        curl_example: curl_example(&odata_url),
        odata_url,
        base,
        filter,
        top: request.top,
        usage_notes: ODATA_USAGE_NOTES.to_vec(),
    }
}

fn odata_filter(expression: &str, entity: &str) -> String {
    let wanted = expression.to_lowercase();
    let mut conditions = Vec::new();
    if wanted.contains("today") {
        conditions.push("CreatedOn ge cast(now(), Edm.DateTimeOffset)");
    }
    if wanted.contains("this month") {
        conditions.push("month(CreatedOn) eq month(now()) and year(CreatedOn) eq year(now())");
    }
    if wanted.contains("active") {
        conditions.push("IsActive eq true");
    }
    if wanted.contains("open") {
        match entity.to_lowercase().as_str() {
            "opportunity" => conditions.push("Stage/IsFinal eq false"),
            "case" => conditions.push("Status/IsFinal eq false"),
            _ => {}
        }
    }

    if conditions.is_empty() {
        format!("/* Add filter for: {expression} */")
    } else {
        conditions.join(" and ")
    }
}

fn curl_example(url: &str) -> String {
    format!(
        "curl -X GET \"{{CREATIO_URL}}{url}\" \\\n  \
         -H \"Accept: application/json\" \\\n  \
         -H \"Content-Type: application/json\" \\\n  \
         -H \"BPMCSRF: {{csrf_token}}\" \\\n  \
         --cookie \"BPMCSRF={{csrf_token}};.ASPXAUTH={{auth_cookie}}\""
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryIssue {
    pub severity: Severity,
    pub issue: String,
    pub fix: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptimizationReport {
    pub original_query: String,
    pub query_type: QueryKind,
    pub issues_found: Vec<QueryIssue>,
    pub recommendations: Vec<String>,
    pub critical_issues: usize,
}

impl OptimizationReport {
    fn issue(&mut self, severity: Severity, issue: impl Into<String>, fix: &'static str) {
        self.issues_found.push(QueryIssue { severity, issue: issue.into(), fix });
    }

    fn recommend(&mut self, recommendation: impl Into<String>) {
        self.recommendations.push(recommendation.into());
    }
}

/// Heuristic performance review of a SQL statement or OData URL.
pub fn optimize(query: &str, kind: QueryKind) -> OptimizationReport {
    let lower = query.to_lowercase();
    let mut report = OptimizationReport {
        original_query: query.to_string(),
        query_type: kind,
        issues_found: Vec::new(),
        recommendations: Vec::new(),
        critical_issues: 0,
    };

    match kind {
        QueryKind::Sql => {
            if lower.contains("select *") {
                report.issue(
                    Severity::High,
                    "Using SELECT * returns unnecessary columns",
                    "Specify only needed columns",
                );
                report.recommend("Replace SELECT * with specific columns");
            }
            if !lower.contains("where") && !lower.contains("group by") {
                report.issue(
                    Severity::High,
                    "Query has no WHERE clause - will scan entire table",
                    "Add appropriate filter conditions",
                );
            }
            if !lower.contains("top") && !lower.contains("limit") {
                report.issue(Severity::Medium, "No row limit specified", "Add TOP or LIMIT clause for testing");
                report.recommend("Add TOP 1000 during development");
            }
            if lower.contains("createdon") && !lower.contains("between") && !lower.contains(">=") {
                report.recommend("Consider adding date range filter on CreatedOn for better index usage");
            }
            if lower.contains("join") {
                report.recommend("Ensure join columns have appropriate indexes");
                report.recommend("Consider the order of joins - put most restrictive first");
            }
            for function in ["year(", "month(", "day(", "datepart("] {
                if lower.contains(function) {
                    report.issue(
                        Severity::Medium,
                        format!("Function {} on column prevents index usage", function.to_uppercase()),
                        "Use range comparison instead of function extraction",
                    );
                }
            }
        }
        QueryKind::OData => {
            if !lower.contains("$select") {
                report.issue(
                    Severity::Medium,
                    "No $select - returning all columns",
                    "Add $select with only needed fields",
                );
            }
            if !lower.contains("$top") {
                report.recommend("Add $top for pagination");
            }
            if lower.contains("$expand") && lower.contains("$select") {
                report.recommend("Consider using $select within $expand to limit expanded data");
            }
        }
    }

    for column in ["AccountId", "CreatedOn", "OwnerId"] {
        if lower.contains(&column.to_lowercase()) {
            report.recommend(format!("Ensure index exists on {column} column"));
        }
    }

    report.critical_issues =
        report.issues_found.iter().filter(|issue| issue.severity == Severity::High).count();
    report
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub query: String,
    pub query_type: QueryKind,
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub entities_referenced: Vec<&'static str>,
}

impl ValidationReport {
    fn error(&mut self, message: impl Into<String>) {
        self.is_valid = false;
        self.errors.push(message.into());
    }
}

const SQL_TYPOS: [(&str, &str); 5] =
    [("slect", "SELECT"), ("frmo", "FROM"), ("wehre", "WHERE"), ("gruop", "GROUP"), ("ordre", "ORDER")];

const ODATA_PARAMS: [&str; 6] = ["$select", "$filter", "$expand", "$orderby", "$top", "$skip"];

/// Static syntax checks. Never executes anything.
pub fn validate(query: &str, kind: QueryKind) -> ValidationReport {
    let lower = query.to_lowercase();
    let mut report = ValidationReport {
        query: query.to_string(),
        query_type: kind,
        is_valid: true,
        errors: Vec::new(),
        warnings: Vec::new(),
        entities_referenced: SchemaCatalog
            .entities()
            .iter()
            .map(|entity| entity.name)
            .chain(std::iter::once("SysLookup"))
            .filter(|name| lower.contains(&name.to_lowercase()))
            .collect(),
    };

    match kind {
        QueryKind::Sql => {
            if !lower.contains("select") {
                report.error("Missing required keyword: SELECT");
            }
            if query.matches('[').count() != query.matches(']').count() {
                report.error("Unbalanced square brackets");
            }
            if query.matches('(').count() != query.matches(')').count() {
                report.error("Unbalanced parentheses");
            }
            for (typo, keyword) in SQL_TYPOS {
                if lower.contains(typo) {
                    report.error(format!("Possible typo: '{typo}' should be '{keyword}'"));
                }
            }
            if ["delete", "drop", "truncate"].iter().any(|word| lower.contains(word)) {
                report.warnings.push("Query contains destructive operation - use with caution!".to_string());
            }
            if lower.contains("update") && !lower.contains("where") {
                report.warnings.push("UPDATE without WHERE will affect all rows!".to_string());
            }
        }
        QueryKind::OData => {
            if !query.contains("/odata/") && !query.contains("Collection") {
                report
                    .warnings
                    .push("OData URL should include /odata/ path and Collection suffix".to_string());
            }
            for param in ODATA_PARAMS {
                if lower.contains(param) && !lower.contains(&format!("{param}=")) && !lower.contains(&format!("{param} =")) {
                    report.warnings.push(format!("{param} should be followed by = and value"));
                }
            }
        }
    }

    report
}

/// The entity a query is most likely about, if any cataloged entity is named.
pub fn primary_entity(query: &str) -> Option<&'static str> {
    let lower = query.to_lowercase();
    SchemaCatalog
        .entities()
        .iter()
        .filter_map(|entity| lower.find(&entity.name.to_lowercase()).map(|position| (position, entity.name)))
        .min_by_key(|(position, _)| *position)
        .map(|(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::{build_odata, build_sql, optimize, primary_entity, validate, ODataRequest, Severity, SqlRequest};
    use crate::analysis::{AnalysisError, QueryKind};

    #[test]
    fn sql_builder_joins_known_pairs_and_translates_hints() {
        let mut request = SqlRequest::new("Contacts at accounts created this month", "Contact, Account");
        request.filters = Some("created this month".to_string());
        request.ordering = Some("newest first".to_string());

        let built = build_sql(&request).expect("entities given");
        assert!(built.query.starts_with("SELECT\n    c.Id,\n    c.Name"));
        assert!(built.query.contains("FROM [Contact] c\nLEFT JOIN [Account] a ON c.AccountId = a.Id"));
        assert!(built.query.contains("DATEADD(MONTH, DATEDIFF(MONTH, 0, GETDATE()), 0)"));
        assert!(built.query.ends_with("ORDER BY CreatedOn DESC;"));
        assert_eq!(
            built.explanation,
            "This query retrieves data from Contact joined with Account filtered by: created this month"
        );
    }

    #[test]
    fn sql_builder_uses_reverse_join_and_aggregations() {
        let mut request = SqlRequest::new("Revenue per account", "Account,Opportunity,Product");
        request.aggregations = Some("Sum and COUNT".to_string());
        request.grouping = Some("a.Name".to_string());

        let built = build_sql(&request).expect("entities given");
        assert!(built.query.contains("COUNT(Account.Id) AS RecordCount, SUM(Account.Amount) AS TotalAmount"));
        assert!(built.query.contains("LEFT JOIN [Account] a ON o.AccountId = a.Id"));
        assert!(built.query.contains("-- Add JOIN for [Product] based on your relationship"));
        assert!(built.query.contains("GROUP BY a.Name"));
        assert!(built.has_aggregation && built.has_grouping);
    }

    #[test]
    fn sql_builder_requires_an_entity() {
        assert_eq!(build_sql(&SqlRequest::new("anything", " , ")), Err(AnalysisError::NoEntities));
    }

    #[test]
    fn unmatched_filter_is_left_as_a_comment() {
        let mut request = SqlRequest::new("x", "Lead");
        request.filters = Some("from Europe".to_string());
        let built = build_sql(&request).expect("entities given");
        assert!(built.query.contains("WHERE -- Add conditions based on: from Europe"));
    }

    #[test]
    fn odata_builder_assembles_collection_url() {
        let mut request = ODataRequest::new("Opportunity");
        request.select_fields = Some("Title, Amount".to_string());
        request.filter_expression = Some("open deals".to_string());
        request.expand_relations = Some("Account".to_string());
        request.top = 50;

        let built = build_odata(&request);
        assert_eq!(
            built.odata_url,
            "/0/odata/OpportunityCollection?$select=Title,Amount&$filter=Stage/IsFinal eq false&$expand=Account&$top=50"
        );
        assert!(built.curl_example.contains("{CREATIO_URL}/0/odata/OpportunityCollection"));
    }

    #[test]
    fn odata_builder_defaults_to_top_hundred() {
        let built = build_odata(&ODataRequest::new("Contact"));
        assert_eq!(built.odata_url, "/0/odata/ContactCollection?$top=100");
    }

    #[test]
    fn optimizer_flags_select_star_without_filter() {
        let report = optimize("SELECT * FROM [Contact] WHERE YEAR(CreatedOn) = 2025", QueryKind::Sql);
        assert_eq!(report.critical_issues, 1);
        assert!(report.issues_found.iter().any(|issue| issue.issue.contains("YEAR(")));
        assert!(report.issues_found.iter().any(|issue| issue.severity == Severity::Medium));
        assert!(report.recommendations.iter().any(|r| r == "Ensure index exists on CreatedOn column"));

        let unfiltered = optimize("SELECT TOP 10 Id FROM [Account]", QueryKind::Sql);
        assert_eq!(unfiltered.critical_issues, 1);
    }

    #[test]
    fn optimizer_checks_odata_parameters() {
        let report = optimize("/0/odata/ContactCollection?$expand=Account", QueryKind::OData);
        assert_eq!(report.issues_found.len(), 1);
        assert!(report.recommendations.contains(&"Add $top for pagination".to_string()));
    }

    #[test]
    fn validator_reports_typos_and_imbalance() {
        let report = validate("SELECT Id frmo [Contact WHERE (Name = 'x'", QueryKind::Sql);
        assert!(!report.is_valid);
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.entities_referenced, vec!["Contact"]);
    }

    #[test]
    fn validator_warns_on_destructive_statements() {
        let report = validate("SELECT 1; UPDATE [Lead] SET Budget = 0", QueryKind::Sql);
        assert!(report.is_valid);
        assert_eq!(report.warnings, vec!["UPDATE without WHERE will affect all rows!".to_string()]);

        let dropped = validate("SELECT 1; DROP TABLE [Case]", QueryKind::Sql);
        assert!(dropped.warnings[0].contains("destructive"));
    }

    #[test]
    fn validator_checks_odata_shape() {
        let report = validate("/0/odata/ContactCollection?$top 5", QueryKind::OData);
        assert!(report.is_valid);
        assert_eq!(report.warnings, vec!["$top should be followed by = and value".to_string()]);
    }

    #[test]
    fn primary_entity_is_the_first_mentioned() {
        assert_eq!(primary_entity("select * from [Opportunity] join [Account]"), Some("Opportunity"));
        assert_eq!(primary_entity("select 1"), None);
    }
}
