//! End-to-end invocations of the command-line surface.

use specinv_cli::run;
use specinv_core::profiles::Superposition;
use specinv_core::LineShape;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

const REST_WAVELENGTH: f64 = 1215.67;
const OSCILLATOR_STRENGTH: f64 = 0.4164;

fn write_synthetic_spectrum(directory: &Path) {
    let q = [REST_WAVELENGTH, OSCILLATOR_STRENGTH, 1.0, 0.0, 5.0, 13.0];
    let line = Superposition::new(LineShape::Doppler, &q);

    let mut contents = String::new();
    let count = 601;
    let step = 12.0 / (count - 1) as f64;
    for index in 0..count {
        let wavelength = 2425.0 + step * index as f64;
        let flux = (-line.value(wavelength)).exp();
        contents.push_str(&format!("{wavelength:.6} {flux:.12} 0.001\n"));
    }
    fs::write(directory.join("synthetic.dat"), contents).expect("spectrum file");
}

fn model_source(directory: &Path) -> String {
    let data_path = directory.join("synthetic.dat");
    format!(
        "% single-line inversion test\n\
         {{ lya {} 2425.0 2437.0 0\n\
         0.0 0.0 0.0 0\n\
         lya_1\n\
         {REST_WAVELENGTH} {REST_WAVELENGTH} {REST_WAVELENGTH} 0\n\
         {OSCILLATOR_STRENGTH} {OSCILLATOR_STRENGTH} {OSCILLATOR_STRENGTH} 0\n\
         1.0 0.995 1.003 1\n\
         0.0 0.0 0.0 0\n\
         6.0 1.0 11.0 1\n\
         12.75 11.5 14.0 1\n\
         }}\n",
        data_path.display()
    )
}

fn run_report(args: &[&str], model: &str) -> (Result<i32, specinv_cli::CliError>, String) {
    let mut input = Cursor::new(model.as_bytes().to_vec());
    let mut output = Vec::new();
    let outcome = run(args.to_vec(), &mut input, &mut output);
    (outcome, String::from_utf8(output).expect("utf8 report"))
}

#[test]
fn a_full_run_emits_a_complete_report_and_exit_zero() {
    let directory = TempDir::new().expect("tempdir");
    write_synthetic_spectrum(directory.path());
    let model = model_source(directory.path());

    let (outcome, report) = run_report(
        &["doppler", "31415", "5", "20", "1.0", "1e-8", "1500", "200"],
        &model,
    );
    assert_eq!(outcome.expect("run"), 0);

    assert!(report.starts_with("<!DOCTYPE html"));
    assert!(report.contains("<model>"));
    assert!(report.contains("single-line inversion test"));
    assert!(report.contains("<log>"));
    assert!(report.contains("<data>"));
    assert!(report.contains("<section id=\"lya\" points=\"601\">"));
    assert!(report.contains("the optimization has converged"));
    assert!(report.contains("Parameter Table"));
    assert!(report.contains("lya_1"));
    assert!(report.trim_end().ends_with("</html>"));

    // The line table reports the recovered redshift near 1.0.
    assert!(
        report.contains("<td>1.00000") || report.contains("<td>0.99999"),
        "no recovered redshift in the line table"
    );
}

#[test]
fn a_bare_numeric_invocation_defaults_to_the_doppler_shape() {
    let directory = TempDir::new().expect("tempdir");
    write_synthetic_spectrum(directory.path());
    let model = model_source(directory.path());

    let (outcome, report) = run_report(&["31415", "5", "20", "1.0", "1e-8", "1500", "0"], &model);
    assert_eq!(outcome.expect("run"), 0);
    assert!(report.contains("specinv doppler 31415"));
}

#[test]
fn an_unconverged_run_still_emits_a_closed_report_and_exit_one() {
    let directory = TempDir::new().expect("tempdir");
    write_synthetic_spectrum(directory.path());
    let model = model_source(directory.path());

    let (outcome, report) = run_report(
        &["doppler", "31415", "5", "20", "1.0", "1e-12", "3", "1"],
        &model,
    );
    assert_eq!(outcome.expect("run"), 1);
    assert!(report.contains("the optimization stopped at generation 3"));
    assert!(report.trim_end().ends_with("</html>"));
}

#[test]
fn a_malformed_model_fails_without_partial_output() {
    let (outcome, report) = run_report(
        &["doppler", "31415", "5", "20", "1.0", "1e-8", "100", "0"],
        "{ broken\n",
    );
    let error = outcome.unwrap_err();
    assert_eq!(error.as_fit_error().exit_code(), 10);
    assert!(report.is_empty(), "no output expected, got {report:?}");
}

#[test]
fn unparsable_arguments_fail_with_exit_ten() {
    let (outcome, _) = run_report(
        &["doppler", "not-a-seed", "5", "20", "1.0", "1e-8", "100", "0"],
        "",
    );
    let error = outcome.unwrap_err();
    assert_eq!(error.as_fit_error().exit_code(), 10);
    assert_eq!(error.as_fit_error().placeholder(), "INPUT.CLI_ARGUMENT");
}

#[test]
fn voigt_models_accept_the_damping_parameter() {
    let directory = TempDir::new().expect("tempdir");
    write_synthetic_spectrum(directory.path());

    // The Voigt shape takes a seventh, pinned damping constant.
    let model = model_source(directory.path()).replace(
        "12.75 11.5 14.0 1\n",
        "12.75 11.5 14.0 1\n5.0e6 5.0e6 5.0e6 0\n",
    );

    let (outcome, report) = run_report(
        &["voigt", "31415", "5", "20", "1.0", "1e-8", "1500", "0"],
        &model,
    );
    assert_eq!(outcome.expect("run"), 0);
    assert!(report.contains("specinv voigt 31415"));
}
