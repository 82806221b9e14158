use std::{
    io::{self, IsTerminal},
    process::ExitCode,
};

use gimmecert::{
    Error,
    commands::CommandTable,
    logging::{LOG_ENV, initialize_logging},
};
use gimmecert_certs::ErrorKind;

fn main() -> ExitCode {
    if let Err(error) = initialize_logging(LOG_ENV, "gimmecert") {
        eprintln!("{}", snafu::Report::from_error(error));
    }

    let table = CommandTable::standard();
    let matches = match table.cli().try_get_matches() {
        Ok(matches) => matches,
        // Prints help, version or usage errors with clap's exit code
        Err(error) => error.exit(),
    };

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let result = table.execute(
        &matches,
        &mut stdin.lock(),
        &mut io::stdout().lock(),
        interactive,
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report(&error),
    }
}

fn report(error: &Error) -> ExitCode {
    if error.kind() == ErrorKind::AlreadyInitialized {
        println!("{error}");
    } else {
        eprintln!("{}", snafu::Report::from_error(error));
    }

    ExitCode::from(error.exit_code())
}
