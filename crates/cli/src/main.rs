use std::process::ExitCode;

fn main() -> ExitCode {
    deploydesk_cli::run()
}
