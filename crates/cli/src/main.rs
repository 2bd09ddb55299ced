use std::process::ExitCode;

fn main() -> ExitCode {
    qabot_cli::run()
}
