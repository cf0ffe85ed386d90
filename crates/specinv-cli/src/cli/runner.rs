//! The inversion run driver: argument parsing, model input, optimization
//! and report output.

use super::report;
use super::{stream_error, usage_text, CliError};
use anyhow::Context;
use specinv_core::{
    parse_model, FitError, LineShape, Model, OptimizerBuilder, OptimizerResult, Tracer,
};
use std::io::{BufRead, Write};
use std::path::Path;

/// The parsed positional arguments of an inversion run.
#[derive(Debug, Clone, Copy)]
struct RunArguments {
    random_seed: u64,
    parent_number: usize,
    population_size: usize,
    global_step_size: f64,
    accuracy_goal: f64,
    stop_generation: u64,
    trace_modulus: u64,
}

pub(super) fn run_inversion(
    shape: LineShape,
    args: &[String],
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<i32, CliError> {
    if args.is_empty() {
        writeln!(output, "{}", usage_text()).map_err(stream_error)?;
        return Ok(0);
    }
    let arguments = parse_arguments(args)?;

    let mut model_text = String::new();
    input
        .read_to_string(&mut model_text)
        .context("failed to read the model definition from standard input")
        .map_err(CliError::from)?;

    let mut model = parse_model(&model_text, shape, Path::new("."))?;

    let optimizer = OptimizerBuilder::new()
        .with_problem_dimension(model.parameter_count())
        .with_parent_number(arguments.parent_number)
        .with_population_size(arguments.population_size)
        .with_accuracy_goal(arguments.accuracy_goal)
        .with_stop_generation(arguments.stop_generation)
        .with_random_seed(arguments.random_seed)
        .build()?;

    // From here on the document is open; it is closed on every path.
    report::write_document_head(output).map_err(stream_error)?;
    report::write_model_block(output, &model_text).map_err(stream_error)?;
    report::write_log_open(output, &command_line_echo(shape, &arguments)).map_err(stream_error)?;

    let outcome = {
        let mut tracer = StreamTracer {
            out: &mut *output,
            modulus: arguments.trace_modulus,
        };
        optimizer.minimize(
            |x| model.evaluate(x),
            &model.initial_values(),
            &model.initial_step_sizes(),
            arguments.global_step_size,
            &model.constraint(),
            &mut tracer,
        )
    };

    report::write_log_close(output).map_err(stream_error)?;

    let result = match outcome {
        Ok(result) => result,
        Err(error) => {
            report::write_message_block(output, &[error.diagnostic_line()])
                .map_err(stream_error)?;
            report::write_document_close(output).map_err(stream_error)?;
            return Err(error.into());
        }
    };

    report::write_message_block(output, &result_messages(&result)).map_err(stream_error)?;

    if result.is_underflow() && !result.is_optimized() {
        report::write_document_close(output).map_err(stream_error)?;
        return Err(underflow_error(&result).into());
    }

    let values = result.parameter_values().to_vec();
    let uncertainties = result.parameter_uncertainties().to_vec();
    model.apply_optimum(&values, &uncertainties);

    write_report(output, shape, &model)?;

    Ok(if result.is_optimized() { 0 } else { 1 })
}

fn write_report(output: &mut dyn Write, shape: LineShape, model: &Model) -> Result<(), CliError> {
    report::write_data_block(output, model).map_err(stream_error)?;
    report::write_report_body(
        output,
        shape,
        &model.section_summaries(),
        &model.line_summaries(),
    )
    .map_err(stream_error)?;
    report::write_document_close(output).map_err(stream_error)?;
    Ok(())
}

fn parse_arguments(args: &[String]) -> Result<RunArguments, CliError> {
    if args.len() != 7 {
        return Err(CliError::Usage(format!(
            "expected 7 arguments (SEED PARENTS POPULATION SIGMA0 EPSILON STOP_GEN TRACE_MOD), got {}\n{}",
            args.len(),
            usage_text()
        )));
    }

    Ok(RunArguments {
        random_seed: parse_argument(&args[0], "SEED")?,
        parent_number: parse_argument(&args[1], "PARENTS")?,
        population_size: parse_argument(&args[2], "POPULATION")?,
        global_step_size: parse_argument(&args[3], "SIGMA0")?,
        accuracy_goal: parse_argument(&args[4], "EPSILON")?,
        stop_generation: parse_argument(&args[5], "STOP_GEN")?,
        trace_modulus: parse_argument(&args[6], "TRACE_MOD")?,
    })
}

fn parse_argument<T: std::str::FromStr>(argument: &str, name: &str) -> Result<T, CliError> {
    argument.parse::<T>().map_err(|_| {
        CliError::Compute(FitError::input_validation(
            "INPUT.CLI_ARGUMENT",
            format!("argument {name} '{argument}' is not valid"),
        ))
    })
}

fn command_line_echo(shape: LineShape, arguments: &RunArguments) -> String {
    let command = match shape {
        LineShape::Doppler => "doppler",
        LineShape::Voigt => "voigt",
        LineShape::ExtendedVoigt => "extended-voigt",
        LineShape::ManyMultiplet => "many-multiplet",
    };
    format!(
        "specinv {command} {} {} {} {} {} {} {}",
        arguments.random_seed,
        arguments.parent_number,
        arguments.population_size,
        arguments.global_step_size,
        arguments.accuracy_goal,
        arguments.stop_generation,
        arguments.trace_modulus
    )
}

fn result_messages(result: &OptimizerResult) -> Vec<String> {
    let mut messages = Vec::new();
    if result.is_optimized() {
        messages.push("the optimization has converged".to_string());
    } else {
        messages.push(format!(
            "the optimization stopped at generation {}",
            result.generation_number()
        ));
    }
    if result.is_step_size_underflow() {
        messages.push("the mutation variance has underflowed".to_string());
    }
    if result.is_constraint_exhausted() {
        messages.push("the offspring resampling exhausted the constraint".to_string());
    }
    messages.push(format!(
        "final fitness {} after {} generations",
        report::format_scientific(result.fitness(), 6),
        result.generation_number()
    ));
    messages
}

fn underflow_error(result: &OptimizerResult) -> FitError {
    if result.is_constraint_exhausted() {
        FitError::computation(
            "RUN.CONSTRAINT_EXHAUSTED",
            "every offspring violated the constraint for a full generation",
        )
    } else {
        FitError::computation(
            "RUN.MUTATION_UNDERFLOW",
            "the mutation variance underflowed before the accuracy goal was met",
        )
    }
}

/// Streams trace lines straight into the open log block.
struct StreamTracer<'a> {
    out: &'a mut dyn Write,
    modulus: u64,
}

impl Tracer for StreamTracer<'_> {
    fn is_enabled(&self, generation: u64) -> bool {
        self.modulus > 0 && generation % self.modulus == 0
    }

    fn trace(&mut self, generation: u64, fitness: f64, min_step: f64, max_step: f64) {
        let _ = writeln!(
            self.out,
            "{:>8} {:>14.6e} {:>14.6e} {:>14.6e}",
            generation, fitness, min_step, max_step
        );
    }
}
