use std::process::ExitCode;

fn main() -> ExitCode {
    coverwise_cli::run()
}
