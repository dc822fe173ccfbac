pub mod commands;
pub mod logging;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use crmcrew_agent::{client_from_config, LlmClient, Request};
use crmcrew_core::analysis::docs::DiagramFormat;
use crmcrew_core::analysis::QueryKind;
use crmcrew_core::config::{LlmConfig, LoadOptions};
use crmcrew_core::knowledge::{KpiCategory, SearchScope};

use crate::commands::CommandResult;
use crate::logging::Verbosity;

/// Builds the model-provider client for a loaded configuration.
pub type ClientFactory = dyn Fn(&LlmConfig) -> anyhow::Result<Box<dyn LlmClient>>;

#[derive(Debug, Parser)]
#[command(
    name = "crmcrew",
    version,
    about = "Creatio CRM data-model assistant",
    long_about = "Answer questions about the Creatio CRM schema, queries, KPIs and documentation. \
                  Each request is routed to a specialist role, grounded in the built-in knowledge \
                  base and answered by the configured model provider.",
    after_help = "Examples:\n  crmcrew schema explore Contact\n  crmcrew query build \"open opportunities by account\"\n  crmcrew metrics calculate sales.win_rate --period last_quarter\n  crmcrew metrics analyze \"customer service\" --audience executive\n  crmcrew kb kpi sales.win_rate\n  crmcrew doctor --json"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Emit machine-readable JSON output")]
    pub json: bool,
    #[arg(short, long, global = true, conflicts_with = "verbose", help = "Only log warnings and errors")]
    pub quiet: bool,
    #[arg(short, long, global = true, help = "Log debug detail to stderr")]
    pub verbose: bool,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Config file (default: crmcrew.toml or config/crmcrew.toml)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(about = "Ask a free-form question; it is routed to a specialist by keyword")]
    Ask { question: String },
    #[command(about = "Explore entities, relationships and the overall schema")]
    Schema {
        #[command(subcommand)]
        command: SchemaCommand,
    },
    #[command(about = "Build, optimize and validate SQL and OData queries")]
    Query {
        #[command(subcommand)]
        command: QueryCommand,
    },
    #[command(about = "Define, calculate and recommend KPIs and dashboards")]
    Metrics {
        #[command(subcommand)]
        command: MetricsCommand,
    },
    #[command(about = "Generate schema documentation, data dictionaries and ERDs")]
    Docs {
        #[command(subcommand)]
        command: DocsCommand,
    },
    #[command(about = "Read questions from stdin and answer each one")]
    Interactive,
    #[command(about = "Explore an entity, draft query templates and write its data dictionary")]
    Analyze { entity: String },
    #[command(about = "Offline knowledge-base lookups; no model provider involved")]
    Kb {
        #[command(subcommand)]
        command: KbCommand,
    },
    #[command(about = "Show the effective configuration with source attribution and redaction")]
    Config,
    #[command(about = "Check configuration, credentials, templates and the knowledge base")]
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum SchemaCommand {
    #[command(about = "Explain one entity: columns, relationships, usage")]
    Explore { entity: String },
    #[command(about = "Analyze relationships from a source entity")]
    Relationships {
        source: String,
        #[arg(long)]
        target: Option<String>,
    },
    #[command(about = "Overview of the whole schema")]
    Overview,
    #[command(about = "Answer a schema question")]
    Ask { question: String },
    #[command(about = "Compare two entities")]
    Compare { first: String, second: String },
}

#[derive(Debug, Subcommand)]
pub enum QueryCommand {
    #[command(about = "Translate a business question into SQL and OData")]
    Build { question: String },
    #[command(about = "Build a SQL report query")]
    Report {
        description: String,
        #[arg(long, help = "Comma separated entity names")]
        entities: String,
        #[arg(long)]
        time_range: Option<String>,
    },
    #[command(about = "Build an OData query for one entity")]
    Odata {
        entity: String,
        #[arg(long)]
        requirements: String,
    },
    #[command(about = "Optimize a query")]
    Optimize {
        query: String,
        #[arg(long = "type", value_name = "sql|odata", default_value = "sql")]
        kind: QueryKind,
    },
    #[command(about = "Validate a query and propose fixes")]
    Validate {
        query: String,
        #[arg(long = "type", value_name = "sql|odata", default_value = "sql")]
        kind: QueryKind,
    },
}

#[derive(Debug, Subcommand)]
pub enum MetricsCommand {
    #[command(about = "Define KPIs for a business goal")]
    Define {
        goal: String,
        #[arg(long, default_value = "")]
        context: String,
    },
    #[command(about = "Calculate a KPI such as sales.win_rate")]
    Calculate {
        metric: String,
        #[arg(long, default_value = "last_month")]
        period: String,
        #[arg(long)]
        dimensions: Option<String>,
    },
    #[command(about = "Recommend metrics for a role")]
    Recommend {
        #[arg(long)]
        role: String,
        #[arg(long)]
        focus: String,
    },
    #[command(about = "Design a dashboard")]
    Dashboard {
        purpose: String,
        #[arg(long, default_value = "manager")]
        audience: String,
    },
    #[command(about = "Analyze sales pipeline metrics")]
    Pipeline {
        #[arg(long, default_value = "standard")]
        depth: String,
    },
    #[command(about = "Answer a metrics question")]
    Ask { question: String },
    #[command(about = "Define KPIs for a business area, then design their dashboard")]
    Analyze {
        business_area: String,
        #[arg(long, default_value = "manager")]
        audience: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum DocsCommand {
    #[command(about = "Generate entity documentation")]
    Generate {
        #[arg(long, default_value = "all")]
        entities: String,
    },
    #[command(about = "Create a data dictionary for one entity")]
    Dictionary { entity: String },
    #[command(about = "Generate an entity-relationship diagram")]
    Erd {
        #[arg(long, default_value = "all")]
        entities: String,
        #[arg(long, help = "Entity names only")]
        no_columns: bool,
    },
    #[command(about = "Write an integration guide for an external system")]
    Integration {
        source_system: String,
        #[arg(long)]
        entities: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum KbCommand {
    #[command(about = "Print one entity schema")]
    Entity { name: String },
    #[command(about = "Print one KPI by `category.key`")]
    Kpi { id: String },
    #[command(about = "List KPIs, optionally filtered")]
    Kpis {
        #[arg(long)]
        category: Option<KpiCategory>,
        #[arg(long)]
        search: Option<String>,
    },
    #[command(about = "Search entities, columns and relationships")]
    Search {
        term: String,
        #[arg(long, value_name = "all|entities|columns|relationships", default_value = "all")]
        scope: SearchScope,
    },
    #[command(about = "Render an ERD without a model call")]
    Erd {
        #[arg(long, default_value = "all")]
        entities: String,
        #[arg(long, value_name = "mermaid|plantuml|dbml", default_value = "mermaid")]
        format: DiagramFormat,
        #[arg(long, help = "Include columns")]
        columns: bool,
    },
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions { config_path: self.config.clone(), ..LoadOptions::default() }
    }
}

impl SchemaCommand {
    pub fn request(&self) -> Request {
        match self {
            Self::Explore { entity } => Request::ExploreEntity { entity: entity.clone() },
            Self::Relationships { source, target } => {
                Request::AnalyzeRelationships { source: source.clone(), target: target.clone() }
            }
            Self::Overview => Request::SchemaOverview,
            Self::Ask { question } => Request::SchemaQuestion { question: question.clone() },
            Self::Compare { first, second } => {
                Request::CompareEntities { first: first.clone(), second: second.clone() }
            }
        }
    }
}

impl QueryCommand {
    pub fn request(&self) -> Request {
        match self {
            Self::Build { question } => Request::BuildQuery { question: question.clone() },
            Self::Report { description, entities, time_range } => Request::ReportQuery {
                description: description.clone(),
                entities: entities.clone(),
                time_range: time_range.clone(),
            },
            Self::Odata { entity, requirements } => Request::ODataQuery {
                entity: entity.clone(),
                requirements: requirements.clone(),
            },
            Self::Optimize { query, kind } => Request::OptimizeQuery { query: query.clone(), kind: *kind },
            Self::Validate { query, kind } => Request::ValidateQuery { query: query.clone(), kind: *kind },
        }
    }
}

impl MetricsCommand {
    pub fn request(&self) -> Request {
        match self {
            Self::Define { goal, context } => {
                Request::DefineKpis { goal: goal.clone(), context: context.clone() }
            }
            Self::Calculate { metric, period, dimensions } => Request::CalculateMetric {
                metric: metric.clone(),
                period: period.clone(),
                dimensions: dimensions.clone(),
            },
            Self::Recommend { role, focus } => {
                Request::RecommendMetrics { role: role.clone(), focus: focus.clone() }
            }
            Self::Dashboard { purpose, audience } => {
                Request::DesignDashboard { purpose: purpose.clone(), audience: audience.clone() }
            }
            Self::Pipeline { depth } => Request::AnalyzePipeline { depth: depth.clone() },
            Self::Ask { question } => Request::MetricsQuestion { question: question.clone() },
            Self::Analyze { business_area, audience } => Request::MetricsAnalysis {
                business_area: business_area.clone(),
                audience: audience.clone(),
            },
        }
    }
}

impl DocsCommand {
    pub fn request(&self) -> Request {
        match self {
            Self::Generate { entities } => Request::GenerateDocs { entities: entities.clone() },
            Self::Dictionary { entity } => Request::DataDictionary { entity: entity.clone() },
            Self::Erd { entities, no_columns } => {
                Request::GenerateErd { entities: entities.clone(), include_columns: !no_columns }
            }
            Self::Integration { source_system, entities } => Request::IntegrationGuide {
                source_system: source_system.clone(),
                entities: entities.clone(),
            },
        }
    }
}

/// Runs a parsed command. Stdin and stdout are only used by interactive mode;
/// every other command returns its output in the result.
pub fn execute(
    cli: Cli,
    factory: &ClientFactory,
    input: impl BufRead,
    output: impl Write,
) -> CommandResult {
    let json = cli.json;
    let options = cli.load_options();
    let agent = |request: Request| commands::agent::run(request, options.clone(), factory, json);

    match cli.command {
        Command::Ask { question } => agent(Request::Ask { question }),
        Command::Schema { command } => agent(command.request()),
        Command::Query { command } => agent(command.request()),
        Command::Metrics { command } => agent(command.request()),
        Command::Docs { command } => agent(command.request()),
        Command::Analyze { entity } => agent(Request::Analyze { entity }),
        Command::Interactive => {
            commands::interactive::run(options.clone(), factory, input, output, json)
        }
        Command::Kb { command } => match command {
            KbCommand::Entity { name } => commands::kb::entity(&name, json),
            KbCommand::Kpi { id } => commands::kb::kpi(&id, json),
            KbCommand::Kpis { category, search } => {
                commands::kb::kpis(category, search.as_deref(), json)
            }
            KbCommand::Search { term, scope } => commands::kb::search(&term, scope, json),
            KbCommand::Erd { entities, format, columns } => {
                commands::kb::erd(&entities, format, columns, json)
            }
        },
        Command::Config => commands::config::run(options.clone(), json),
        Command::Doctor => {
            CommandResult::text(commands::doctor::run(options.clone(), factory, json))
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&logging::settings(&cli.load_options()), cli.verbosity());

    let json = cli.json;
    let stdin = io::stdin();
    let result = execute(cli, &client_from_config, stdin.lock(), io::stdout());

    if !result.output.is_empty() {
        if result.is_success() || json {
            println!("{}", result.output);
        } else {
            eprintln!("{}", result.output);
        }
    }
    ExitCode::from(result.exit_code)
}
