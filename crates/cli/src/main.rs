use std::process::ExitCode;

fn main() -> ExitCode {
    crmcrew_cli::run()
}
