//! Offline knowledge-base access. Nothing here loads configuration or calls a
//! model provider.

use crmcrew_core::analysis::docs::{render_erd, schema_markdown, DiagramFormat};
use crmcrew_core::analysis::EntitySelection;
use crmcrew_core::errors::ApplicationError;
use crmcrew_core::knowledge::{
    KnowledgeTable, KpiCategory, KpiDefinition, KpiLibrary, NotFound, SchemaCatalog,
    SchemaSearchResult, SearchScope,
};
use serde::Serialize;

use crate::commands::{to_json, CommandResult};

pub fn entity(name: &str, json: bool) -> CommandResult {
    let command = "kb entity";
    match SchemaCatalog.lookup(name).into_result() {
        Ok(entity) if json => to_json(command, entity),
        Ok(entity) => CommandResult::text(schema_markdown(&[entity], true, true).trim_end()),
        Err(miss) => miss_result(command, miss, json),
    }
}

pub fn kpi(id: &str, json: bool) -> CommandResult {
    let command = "kb kpi";
    match KpiLibrary.lookup(id).into_result() {
        Ok(kpi) if json => to_json(command, &KpiView::from(kpi)),
        Ok(kpi) => CommandResult::text(render_kpi(kpi)),
        Err(miss) => miss_result(command, miss, json),
    }
}

pub fn kpis(category: Option<KpiCategory>, search: Option<&str>, json: bool) -> CommandResult {
    let matches = KpiLibrary.browse(category, search);

    if json {
        let views: Vec<KpiView> = matches.into_iter().map(KpiView::from).collect();
        return to_json("kb kpis", &views);
    }

    if matches.is_empty() {
        return CommandResult::text("no KPIs matched");
    }

    let mut lines = vec![format!("{} KPIs", matches.len())];
    lines.extend(
        matches
            .iter()
            .map(|kpi| format!("- {}: {} ({}, {})", kpi.id(), kpi.name, kpi.unit.as_str(), kpi.frequency.as_str())),
    );
    CommandResult::text(lines.join("\n"))
}

pub fn search(term: &str, scope: SearchScope, json: bool) -> CommandResult {
    if term.trim().is_empty() {
        return CommandResult::from_error(
            "kb search",
            ApplicationError::InvalidInput("search term must not be empty".to_string()),
            json,
        );
    }

    let result = SchemaCatalog.search(term, scope);
    if json {
        return to_json("kb search", &result);
    }
    CommandResult::text(render_search(&result))
}

#[derive(Serialize)]
struct ErdView<'a> {
    format: &'static str,
    entities: Vec<&'static str>,
    missing: &'a [String],
    diagram: String,
}

pub fn erd(entities: &str, format: DiagramFormat, columns: bool, json: bool) -> CommandResult {
    let command = "kb erd";
    let selection = EntitySelection::parse(entities);

    if selection.is_empty() {
        return miss_result(command, SchemaCatalog.not_found(entities), json);
    }
    if !selection.missing.is_empty() {
        tracing::warn!(
            event_name = "kb.erd.unknown_entities",
            missing = %selection.missing.join(","),
            "skipping entities that are not in the schema catalog"
        );
    }

    let diagram = render_erd(&selection.entities, format, columns);
    if json {
        return to_json(
            command,
            &ErdView {
                format: format.as_str(),
                entities: selection.names(),
                missing: &selection.missing,
                diagram,
            },
        );
    }
    CommandResult::text(diagram.trim_end())
}

/// KPI record with its `category.key` id spelled out.
#[derive(Serialize)]
struct KpiView {
    id: String,
    #[serde(flatten)]
    definition: KpiDefinition,
}

impl From<&KpiDefinition> for KpiView {
    fn from(definition: &KpiDefinition) -> Self {
        Self { id: definition.id(), definition: *definition }
    }
}

fn miss_result(command: &str, miss: NotFound, json: bool) -> CommandResult {
    tracing::debug!(event_name = "kb.lookup_miss", table = miss.table, key = %miss.key, "lookup miss");
    CommandResult::from_error(command, ApplicationError::from(miss), json)
}

fn render_kpi(kpi: &KpiDefinition) -> String {
    [
        format!("{} - {}", kpi.id(), kpi.name),
        kpi.description.to_string(),
        format!("formula: {}", kpi.formula),
        format!("unit: {}", kpi.unit.as_str()),
        format!("frequency: {}", kpi.frequency.as_str()),
        format!("related entities: {}", kpi.related_entities.join(", ")),
    ]
    .join("\n")
}

fn render_search(result: &SchemaSearchResult) -> String {
    let mut lines = vec![format!("{} matches for `{}`", result.total_matches(), result.search_term)];

    if !result.entities.is_empty() {
        lines.push("entities:".to_string());
        lines.extend(
            result.entities.iter().map(|hit| format!("- {} ({}): {}", hit.entity, hit.table, hit.description)),
        );
    }
    if !result.columns.is_empty() {
        lines.push("columns:".to_string());
        lines.extend(result.columns.iter().map(|hit| {
            format!("- {}.{} [{}]: {}", hit.entity, hit.column, hit.data_type, hit.description)
        }));
    }
    if !result.relationships.is_empty() {
        lines.push("relationships:".to_string());
        lines.extend(result.relationships.iter().map(|hit| {
            format!("- {} -> {} ({})", hit.from_entity, hit.to_entity, hit.cardinality.as_str())
        }));
    }

    lines.join("\n")
}
