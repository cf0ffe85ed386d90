mod convert;
mod report;
mod runner;

use specinv_core::{FitError, LineShape};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{BufRead, Write};
use std::path::Path;

/// Runs the command line taken from the environment, with standard
/// input/output attached, and returns the process exit code.
pub fn run_from_env() -> i32 {
    let mut args = std::env::args();
    let program_name = args.next().unwrap_or_else(|| "specinv".to_string());

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();

    match run_with_program_name(&program_name, args, &mut input, &mut output) {
        Ok(code) => code,
        Err(error) => {
            let fit_error = error.as_fit_error();
            eprintln!("{}", fit_error.diagnostic_line());
            fit_error.exit_code()
        }
    }
}

/// Runs a command line against the streams supplied.
pub fn run<I, S>(
    args: I,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    run_with_program_name("specinv", args, input, output)
}

fn run_with_program_name<I, S>(
    program_name: &str,
    args: I,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args: Vec<String> = args.into_iter().map(Into::into).collect();

    if let Some(alias) = command_alias_from_program_name(program_name) {
        return dispatch_command(alias, args, input, output);
    }

    if args.is_empty() {
        writeln!(output, "{}", usage_text()).map_err(stream_error)?;
        return Ok(0);
    }

    // A leading numeric argument selects the default line shape, keeping
    // the bare seven-argument invocation working.
    if args[0].parse::<f64>().is_ok() {
        return runner::run_inversion(LineShape::Doppler, &args, input, output);
    }

    let command = args.remove(0);
    dispatch_command(&command, args, input, output)
}

fn dispatch_command(
    command: &str,
    args: Vec<String>,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<i32, CliError> {
    if let Some(shape) = line_shape_for_command(command) {
        return runner::run_inversion(shape, &args, input, output);
    }

    match command {
        "airtovac" => convert::run_air_to_vacuum(&args, input, output),
        "vactoair" => convert::run_vacuum_to_air(&args, input, output),
        "helicorr" => convert::run_radial_velocity(&args, input, output),
        "help" | "--help" | "-h" => {
            writeln!(output, "{}", usage_text()).map_err(stream_error)?;
            Ok(0)
        }
        other => Err(CliError::Usage(format!(
            "unknown command '{}'\n{}",
            other,
            usage_text()
        ))),
    }
}

pub(crate) fn line_shape_for_command(command: &str) -> Option<LineShape> {
    match command {
        "doppler" => Some(LineShape::Doppler),
        "voigt" => Some(LineShape::Voigt),
        "extended-voigt" => Some(LineShape::ExtendedVoigt),
        "many-multiplet" => Some(LineShape::ManyMultiplet),
        _ => None,
    }
}

/// A binary invoked through a hard link named after a command dispatches
/// to that command.
fn command_alias_from_program_name(program_name: &str) -> Option<&'static str> {
    let executable = Path::new(program_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(program_name);
    let normalized = executable.strip_suffix(".exe").unwrap_or(executable);

    match normalized {
        "doppler" => Some("doppler"),
        "voigt" => Some("voigt"),
        "extended-voigt" => Some("extended-voigt"),
        "many-multiplet" => Some("many-multiplet"),
        "airtovac" => Some("airtovac"),
        "vactoair" => Some("vactoair"),
        "helicorr" => Some("helicorr"),
        _ => None,
    }
}

pub(crate) fn usage_text() -> &'static str {
    "Usage: specinv [COMMAND] SEED PARENTS POPULATION SIGMA0 EPSILON STOP_GEN TRACE_MOD < model.in > report.html\n\
     \n\
     Commands:\n\
     \x20 doppler         Gaussian Doppler line shape (default)\n\
     \x20 voigt           Voigt line shape, pseudo-Voigt approximation\n\
     \x20 extended-voigt  Voigt line shape, extended pseudo-Voigt approximation\n\
     \x20 many-multiplet  Doppler line shape with variable fine-structure constant\n\
     \x20 airtovac [SKIP]           convert the first data column from air to vacuum\n\
     \x20 vactoair [SKIP]           convert the first data column from vacuum to air\n\
     \x20 helicorr VELOCITY [SKIP]  apply a radial-velocity shift (km/s) to the first column\n\
     \x20 help            print this message\n\
     \n\
     Exit codes: 0 optimized, 1 stop generation reached, 10 invalid argument,\n\
     20 runtime error, 30 unexpected error."
}

pub(crate) fn stream_error(source: std::io::Error) -> CliError {
    CliError::Compute(FitError::io_system(
        "IO.CLI_STREAM",
        format!("stream failure: {source}"),
    ))
}

/// The command-line error: a usage problem or a computation failure.
#[derive(Debug)]
pub enum CliError {
    Usage(String),
    Compute(FitError),
}

impl CliError {
    pub fn as_fit_error(&self) -> FitError {
        match self {
            Self::Usage(message) => FitError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
        }
    }
}

impl From<FitError> for CliError {
    fn from(error: FitError) -> Self {
        Self::Compute(error)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        Self::Compute(FitError::io_system("IO.CLI_STREAM", format!("{error:#}")))
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(message) => f.write_str(message),
            Self::Compute(source) => write!(f, "{}", source),
        }
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Usage(_) => None,
            Self::Compute(source) => Some(source),
        }
    }
}
