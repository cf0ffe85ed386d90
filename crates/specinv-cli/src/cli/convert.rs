//! Stream utilities converting the first data column of whitespace
//! separated rows: air to vacuum, vacuum to air, and the radial-velocity
//! shift.

use super::{stream_error, usage_text, CliError};
use specinv_core::equations::{air_to_vacuum, radial_velocity_shift, vacuum_to_air};
use specinv_core::{ComputeResult, FitError};
use std::io::{BufRead, Write};

pub(super) fn run_air_to_vacuum(
    args: &[String],
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<i32, CliError> {
    let skip = parse_skip(args, 0)?;
    convert_stream(input, output, skip, air_to_vacuum)
}

pub(super) fn run_vacuum_to_air(
    args: &[String],
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<i32, CliError> {
    let skip = parse_skip(args, 0)?;
    convert_stream(input, output, skip, |wavelength| Ok(vacuum_to_air(wavelength)))
}

pub(super) fn run_radial_velocity(
    args: &[String],
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<i32, CliError> {
    if args.is_empty() {
        return Err(CliError::Usage(format!(
            "helicorr requires a VELOCITY argument (km/s)\n{}",
            usage_text()
        )));
    }
    let velocity: f64 = args[0].parse().map_err(|_| {
        CliError::Compute(FitError::input_validation(
            "INPUT.CLI_ARGUMENT",
            format!("argument VELOCITY '{}' is not valid", args[0]),
        ))
    })?;
    let skip = parse_skip(args, 1)?;

    convert_stream(input, output, skip, |wavelength| {
        Ok(radial_velocity_shift(wavelength, velocity))
    })
}

fn parse_skip(args: &[String], position: usize) -> Result<usize, CliError> {
    match args.get(position) {
        None => Ok(0),
        Some(argument) => argument.parse::<usize>().map_err(|_| {
            CliError::Compute(FitError::input_validation(
                "INPUT.CLI_ARGUMENT",
                format!("argument SKIP '{argument}' is not valid"),
            ))
        }),
    }
}

/// Converts the first column of every data row, copying the skipped
/// header lines, blank lines and `%` comments through unchanged.
fn convert_stream<F>(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    skip: usize,
    convert: F,
) -> Result<i32, CliError>
where
    F: Fn(f64) -> ComputeResult<f64>,
{
    for (index, line) in input.lines().enumerate() {
        let line = line.map_err(stream_error)?;

        let trimmed = line.trim_start();
        if index < skip || trimmed.is_empty() || trimmed.starts_with('%') {
            writeln!(output, "{line}").map_err(stream_error)?;
            continue;
        }

        let mut parts = line.split_whitespace();
        let first = parts.next().expect("non-empty line has a first token");
        let wavelength: f64 = first.parse().map_err(|_| {
            CliError::Compute(FitError::input_validation(
                "INPUT.CONVERT_COLUMN",
                format!("line {}: '{}' is not a wavelength", index + 1, first),
            ))
        })?;

        let converted = convert(wavelength)?;
        write!(output, "{converted:.6}").map_err(stream_error)?;
        for part in parts {
            write!(output, " {part}").map_err(stream_error)?;
        }
        writeln!(output).map_err(stream_error)?;
    }

    Ok(0)
}
