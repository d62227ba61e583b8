use std::process::ExitCode;

fn main() -> ExitCode {
    supportdesk_cli::run()
}
