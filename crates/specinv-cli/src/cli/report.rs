//! HTML report rendering. The document carries the literal model
//! definition and the section data in comment blocks, the optimizer log,
//! and the section and line tables.

use specinv_core::{LineShape, LineSummary, Model, SectionSummary, TableEntry};
use std::io::{self, Write};

pub(super) fn format_fixed(value: f64, precision: usize) -> String {
    format!("{value:.precision$}")
}

pub(super) fn format_scientific(value: f64, precision: usize) -> String {
    format!("{value:.precision$e}")
}

fn fixed_cell(entry: &TableEntry, precision: usize) -> String {
    if entry.fitted {
        format!(
            "{} &plusmn; {}",
            format_fixed(entry.value, precision),
            format_fixed(entry.error, precision)
        )
    } else {
        format_fixed(entry.value, precision)
    }
}

fn scientific_cell(entry: &TableEntry, precision: usize) -> String {
    if entry.fitted {
        format!(
            "{} &plusmn; {}",
            format_scientific(entry.value, precision),
            format_scientific(entry.error, precision)
        )
    } else {
        format_scientific(entry.value, precision)
    }
}

pub(super) fn write_document_head(out: &mut dyn Write) -> io::Result<()> {
    writeln!(
        out,
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\">"
    )?;
    writeln!(out, "<html>")
}

pub(super) fn write_model_block(out: &mut dyn Write, model_text: &str) -> io::Result<()> {
    writeln!(out, "<!--")?;
    writeln!(out, "<model>")?;
    out.write_all(model_text.as_bytes())?;
    if !model_text.ends_with('\n') {
        writeln!(out)?;
    }
    writeln!(out, "</model>")?;
    writeln!(out, "-->")
}

pub(super) fn write_log_open(out: &mut dyn Write, command_line: &str) -> io::Result<()> {
    writeln!(out, "<!--")?;
    writeln!(out, "<log>")?;
    writeln!(out, "{command_line}")
}

pub(super) fn write_log_close(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "</log>")?;
    writeln!(out, "-->")
}

pub(super) fn write_message_block(out: &mut dyn Write, messages: &[String]) -> io::Result<()> {
    writeln!(out, "<!--")?;
    writeln!(out, "<message>")?;
    for message in messages {
        writeln!(out, "{message}")?;
    }
    writeln!(out, "</message>")?;
    writeln!(out, "-->")
}

pub(super) fn write_document_close(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "</html>")
}

/// Writes the section data as `wavelength flux uncertainty valid model`
/// rows inside a comment block; the model column appears once a fit has
/// been applied.
pub(super) fn write_data_block(out: &mut dyn Write, model: &Model) -> io::Result<()> {
    writeln!(out, "<!--")?;
    writeln!(out, "<data>")?;
    for (index, section) in model.sections().iter().enumerate() {
        writeln!(
            out,
            "<section id=\"{}\" points=\"{}\">",
            model.section_ids()[index],
            section.sample_count()
        )?;
        let fit = section.fit();
        for (row, (wavelength, flux, uncertainty, valid)) in section.data_rows().enumerate() {
            let flag = if valid { 1 } else { 0 };
            match fit {
                Some(fit) => writeln!(
                    out,
                    "{} {} {} {} {}",
                    format_fixed(wavelength, 6),
                    format_scientific(flux, 6),
                    format_scientific(uncertainty, 6),
                    flag,
                    format_scientific(fit.model[row], 6)
                )?,
                None => writeln!(
                    out,
                    "{} {} {} {}",
                    format_fixed(wavelength, 6),
                    format_scientific(flux, 6),
                    format_scientific(uncertainty, 6),
                    flag
                )?,
            }
        }
        writeln!(out, "</section>")?;
    }
    writeln!(out, "</data>")?;
    writeln!(out, "-->")
}

pub(super) fn write_report_body(
    out: &mut dyn Write,
    shape: LineShape,
    sections: &[SectionSummary],
    lines: &[LineSummary],
) -> io::Result<()> {
    writeln!(out, "<head>")?;
    writeln!(out, "  <title>Parameter Table</title>")?;
    writeln!(out, "</head>")?;
    writeln!(out, "<body>")?;
    write_section_table(out, sections)?;
    writeln!(out, "<br>")?;
    write_line_table(out, shape, lines)?;
    write_footer(out)?;
    writeln!(out, "</body>")
}

fn write_section_table(out: &mut dyn Write, sections: &[SectionSummary]) -> io::Result<()> {
    writeln!(
        out,
        "<table border=\"1\" cellspacing=\"2\" cellpadding=\"2\" width=\"100%\">"
    )?;
    writeln!(out, "  <thead align=\"center\" valign=\"middle\">")?;
    writeln!(out, "    <tr>")?;
    writeln!(out, "      <td>Section</td>")?;
    writeln!(out, "      <td>Start<br>Wavelength<br>(&Aring;)</td>")?;
    writeln!(out, "      <td>End<br>Wavelength<br>(&Aring;)</td>")?;
    writeln!(out, "      <td>Legendre Basis<br>Polynomials</td>")?;
    writeln!(out, "      <td>Resolution<br>(10<sup>3</sup>)</td>")?;
    writeln!(out, "      <td>Data Points</td>")?;
    writeln!(out, "      <td>Cost</td>")?;
    writeln!(out, "      <td>Cost per<br>Data Point</td>")?;
    writeln!(out, "    </tr>")?;
    writeln!(out, "  </thead>")?;
    writeln!(out, "  <tbody align=\"left\">")?;

    for section in sections {
        let per_point = section.cost / section.valid_count.max(1) as f64;
        writeln!(out, "    <tr>")?;
        writeln!(out, "      <td>{}</td>", section.id)?;
        writeln!(out, "      <td>{}</td>", format_fixed(section.lower_bound, 2))?;
        writeln!(out, "      <td>{}</td>", format_fixed(section.upper_bound, 2))?;
        writeln!(out, "      <td>{}</td>", section.legendre_order)?;
        writeln!(out, "      <td>{}</td>", fixed_cell(&section.resolution, 2))?;
        writeln!(out, "      <td>{}</td>", section.valid_count)?;
        writeln!(
            out,
            "      <td><strong>{}</strong></td>",
            format_fixed(section.cost, 2)
        )?;
        writeln!(out, "      <td>{}</td>", format_fixed(per_point, 2))?;
        writeln!(out, "    </tr>")?;
    }

    writeln!(out, "  </tbody>")?;
    writeln!(out, "</table>")
}

fn write_line_table(
    out: &mut dyn Write,
    shape: LineShape,
    lines: &[LineSummary],
) -> io::Result<()> {
    let with_alpha = shape == LineShape::ManyMultiplet;

    writeln!(
        out,
        "<table border=\"1\" cellspacing=\"2\" cellpadding=\"2\" width=\"100%\">"
    )?;
    writeln!(out, "  <thead align=\"center\" valign=\"middle\">")?;
    writeln!(out, "    <tr>")?;
    writeln!(out, "      <td>Line</td>")?;
    writeln!(out, "      <td>Observed<br>Wavelength<br>(&Aring;)</td>")?;
    writeln!(out, "      <td>Rest<br>Wavelength<br>(&Aring;)</td>")?;
    writeln!(out, "      <td>Oscillator<br>Strength</td>")?;
    writeln!(out, "      <td>Redshift</td>")?;
    writeln!(out, "      <td>Radial<br>Velocity<br>(km s<sup>-1</sup>)</td>")?;
    writeln!(
        out,
        "      <td>Broadening<br>Velocity<br>(km s<sup>-1</sup>)</td>"
    )?;
    writeln!(
        out,
        "      <td>Log. Column<br>Density<br>(cm<sup>-2</sup>)</td>"
    )?;
    if with_alpha {
        writeln!(
            out,
            "      <td>&Delta;&alpha;/&alpha;<br>(10<sup>-6</sup>)</td>"
        )?;
    }
    writeln!(out, "    </tr>")?;
    writeln!(out, "  </thead>")?;
    writeln!(out, "  <tbody align=\"left\">")?;

    for line in lines {
        writeln!(out, "    <tr>")?;
        writeln!(out, "      <td>{}</td>", line.id)?;
        writeln!(
            out,
            "      <td>{} &plusmn; {}</td>",
            format_fixed(line.observed_wavelength, 4),
            format_fixed(line.observed_uncertainty, 4)
        )?;
        writeln!(out, "      <td>{}</td>", fixed_cell(&line.rest_wavelength, 4))?;
        writeln!(
            out,
            "      <td>{}</td>",
            scientific_cell(&line.oscillator_strength, 3)
        )?;
        writeln!(out, "      <td>{}</td>", fixed_cell(&line.redshift, 7))?;
        writeln!(out, "      <td>{}</td>", fixed_cell(&line.radial_velocity, 3))?;
        writeln!(
            out,
            "      <td>{}</td>",
            fixed_cell(&line.broadening_velocity, 3)
        )?;
        writeln!(out, "      <td>{}</td>", fixed_cell(&line.column_density, 3))?;
        if with_alpha {
            let alpha = line.alpha_variation.unwrap_or(TableEntry {
                value: 0.0,
                error: 0.0,
                fitted: false,
            });
            writeln!(out, "      <td>{}</td>", fixed_cell(&alpha, 3))?;
        }
        writeln!(out, "    </tr>")?;
    }

    writeln!(out, "  </tbody>")?;
    writeln!(out, "</table>")
}

fn write_footer(out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "<address>")?;
    writeln!(out, " Created by specinv, spectrum inversion and analysis.<br>")?;
    writeln!(
        out,
        " specinv {} <br>",
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out, "</address>")
}

#[cfg(test)]
mod tests {
    use super::{fixed_cell, format_fixed, format_scientific, scientific_cell};
    use specinv_core::TableEntry;

    #[test]
    fn fixed_formatting_controls_precision() {
        assert_eq!(format_fixed(1.23456, 2), "1.23");
        assert_eq!(format_fixed(-0.5, 3), "-0.500");
    }

    #[test]
    fn scientific_formatting_uses_the_exponent_form() {
        assert_eq!(format_scientific(1250.0, 2), "1.25e3");
        assert_eq!(format_scientific(0.00042, 2), "4.20e-4");
    }

    #[test]
    fn fitted_entries_carry_their_uncertainty() {
        let fitted = TableEntry {
            value: 2.33,
            error: 0.01,
            fitted: true,
        };
        assert_eq!(fixed_cell(&fitted, 2), "2.33 &plusmn; 0.01");

        let pinned = TableEntry {
            value: 2.33,
            error: 0.0,
            fitted: false,
        };
        assert_eq!(fixed_cell(&pinned, 2), "2.33");
        assert_eq!(scientific_cell(&pinned, 2), "2.33e0");
    }
}
