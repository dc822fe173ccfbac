use clap::error::ErrorKind;
use clap::Parser;
use crmcrew_agent::Request;
use crmcrew_cli::logging::Verbosity;
use crmcrew_cli::{Cli, Command, DocsCommand, KbCommand, MetricsCommand, QueryCommand};
use crmcrew_core::analysis::docs::DiagramFormat;
use crmcrew_core::analysis::QueryKind;
use crmcrew_core::knowledge::{KpiCategory, SearchScope};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args.iter().copied()).expect("arguments parse")
}

#[test]
fn unknown_subcommand_is_rejected_before_anything_runs() {
    let error = Cli::try_parse_from(["crmcrew", "forecast", "Q3"]).expect_err("unknown subcommand");
    assert_eq!(error.kind(), ErrorKind::InvalidSubcommand);
    assert_eq!(error.exit_code(), 2);
}

#[test]
fn missing_required_flag_is_rejected() {
    let error = Cli::try_parse_from(["crmcrew", "query", "odata", "Case"]).expect_err("requirements missing");
    assert_eq!(error.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn invalid_query_type_is_rejected() {
    let error = Cli::try_parse_from(["crmcrew", "query", "optimize", "SELECT 1", "--type", "graphql"])
        .expect_err("unknown query type");
    assert_eq!(error.kind(), ErrorKind::ValueValidation);
}

#[test]
fn metrics_defaults_match_documented_values() {
    let cli = parse(&["crmcrew", "metrics", "calculate", "sales.win_rate"]);
    let Command::Metrics { command } = cli.command else { panic!("metrics command expected") };

    assert_eq!(
        command.request(),
        Request::CalculateMetric {
            metric: "sales.win_rate".to_string(),
            period: "last_month".to_string(),
            dimensions: None,
        }
    );

    let cli = parse(&["crmcrew", "metrics", "dashboard", "service health"]);
    let Command::Metrics { command: MetricsCommand::Dashboard { audience, .. } } = cli.command else {
        panic!("dashboard command expected")
    };
    assert_eq!(audience, "manager");

    let cli = parse(&["crmcrew", "metrics", "analyze", "Sales"]);
    let Command::Metrics { command } = cli.command else { panic!("metrics command expected") };
    assert_eq!(
        command.request(),
        Request::MetricsAnalysis { business_area: "Sales".to_string(), audience: "manager".to_string() }
    );
}

#[test]
fn erd_no_columns_flag_turns_columns_off() {
    let cli = parse(&["crmcrew", "docs", "erd", "--no-columns"]);
    let Command::Docs { command } = cli.command else { panic!("docs command expected") };

    assert!(matches!(command, DocsCommand::Erd { .. }));
    assert_eq!(
        command.request(),
        Request::GenerateErd { entities: "all".to_string(), include_columns: false }
    );
}

#[test]
fn query_type_flag_parses_case_insensitively() {
    let cli = parse(&["crmcrew", "query", "validate", "Contact?$top=5", "--type", "OData"]);
    let Command::Query { command } = cli.command else { panic!("query command expected") };

    assert!(matches!(command, QueryCommand::Validate { kind: QueryKind::OData, .. }));
}

#[test]
fn kb_flags_parse_into_typed_values() {
    let cli = parse(&["crmcrew", "kb", "kpis", "--category", "customer_service"]);
    assert!(matches!(
        cli.command,
        Command::Kb { command: KbCommand::Kpis { category: Some(KpiCategory::CustomerService), search: None } }
    ));

    let cli = parse(&["crmcrew", "kb", "search", "Owner", "--scope", "columns"]);
    assert!(matches!(
        cli.command,
        Command::Kb { command: KbCommand::Search { scope: SearchScope::Columns, .. } }
    ));

    let cli = parse(&["crmcrew", "kb", "erd", "--format", "dbml", "--columns"]);
    assert!(matches!(
        cli.command,
        Command::Kb { command: KbCommand::Erd { format: DiagramFormat::Dbml, columns: true, .. } }
    ));
}

#[test]
fn global_flags_work_after_the_subcommand() {
    let cli = parse(&["crmcrew", "schema", "overview", "--json", "-v", "--config", "custom.toml"]);

    assert!(cli.json);
    assert_eq!(cli.verbosity(), Verbosity::Verbose);
    assert_eq!(cli.load_options().config_path.as_deref(), Some(std::path::Path::new("custom.toml")));
}

#[test]
fn quiet_and_verbose_conflict() {
    let error = Cli::try_parse_from(["crmcrew", "-q", "-v", "doctor"]).expect_err("conflicting flags");
    assert_eq!(error.kind(), ErrorKind::ArgumentConflict);
}
