use std::process::ExitCode;

fn main() -> ExitCode {
    csvship_lib::run()
}
