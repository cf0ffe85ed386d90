//! Parsing of the model-definition text.
//!
//! A model is a sequence of sections delimited by `{ … }` with
//! `%`-initiated line comments. Each section head names an id, a data
//! file, the wavelength window, the Legendre order and optional masked
//! intervals; the body holds one resolving-power specification followed
//! by the absorption-line specifications. Every parameter specification
//! reads `value lower upper mask_flag [ref]`, the optional reference
//! linking the parameter to the same parameter of another line (or, for
//! the resolving power, to another section).

use super::section::{parse_data_source, Section};
use super::table::{ParameterSpec, ParameterTable};
use super::Model;
use crate::domain::{FitError, ParseResult};
use crate::profiles::LineShape;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// The comment mark of the model-definition syntax.
const COMMENT_MARK: char = '%';

/// Parses a model definition, loading section data files relative to
/// `data_dir` (absolute paths pass through unchanged).
pub fn parse_model(source: &str, shape: LineShape, data_dir: &Path) -> ParseResult<Model> {
    let stripped = strip_comments(source);
    let blocks = split_section_blocks(&stripped)?;
    if blocks.is_empty() {
        return Err(FitError::input_validation(
            "INPUT.MODEL_EMPTY",
            "the model definition contains no section",
        ));
    }

    let mut declarations = Vec::with_capacity(blocks.len());
    for block in &blocks {
        declarations.push(parse_section_block(block, shape)?);
    }

    assemble_model(declarations, shape, data_dir)
}

/// One raw parameter specification with its symbolic reference.
#[derive(Debug, Clone)]
struct RawSpec {
    value: f64,
    lower: f64,
    upper: f64,
    masked: bool,
    reference: Option<String>,
}

/// One parsed section block, before cross-section resolution.
#[derive(Debug, Clone)]
struct SectionDecl {
    id: String,
    data_file: String,
    lower: f64,
    upper: f64,
    order: usize,
    mask_intervals: Vec<(f64, f64)>,
    resolution: RawSpec,
    lines: Vec<(String, Vec<RawSpec>)>,
}

fn strip_comments(source: &str) -> String {
    let mut stripped = String::with_capacity(source.len());
    for line in source.lines() {
        match line.find(COMMENT_MARK) {
            Some(position) => stripped.push_str(&line[..position]),
            None => stripped.push_str(line),
        }
        stripped.push('\n');
    }
    stripped
}

/// Splits the comment-stripped text into the contents of the `{ … }`
/// blocks. Text between blocks is ignored, as is anything after the
/// final closing brace.
fn split_section_blocks(text: &str) -> ParseResult<Vec<String>> {
    let mut blocks = Vec::new();
    let mut remainder = text;

    while let Some(close) = remainder.find('}') {
        let chunk = &remainder[..close];
        let open = chunk.find('{').ok_or_else(|| {
            FitError::input_validation(
                "INPUT.MODEL_SYNTAX",
                "found '}' without a matching '{'",
            )
        })?;
        blocks.push(chunk[open + 1..].to_string());
        remainder = &remainder[close + 1..];
    }

    if remainder.contains('{') {
        return Err(FitError::input_validation(
            "INPUT.MODEL_SYNTAX",
            "found '{' without a matching '}'",
        ));
    }

    Ok(blocks)
}

/// A cursor over whitespace-separated tokens that remembers line
/// boundaries, so the optional trailing reference of a specification can
/// be restricted to the line of its mask flag.
struct TokenCursor {
    lines: Vec<Vec<String>>,
    line: usize,
    token: usize,
}

impl TokenCursor {
    fn new(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .collect();
        Self {
            lines,
            line: 0,
            token: 0,
        }
    }

    /// The next token, skipping line breaks, plus the line it came from.
    fn next_token(&mut self) -> Option<(String, usize)> {
        while self.line < self.lines.len() {
            if self.token < self.lines[self.line].len() {
                let token = self.lines[self.line][self.token].clone();
                let line = self.line;
                self.token += 1;
                return Some((token, line));
            }
            self.line += 1;
            self.token = 0;
        }
        None
    }

    /// The first remaining token on `line`, if the cursor still points
    /// into it; the rest of that line is discarded.
    fn take_reference_on(&mut self, line: usize) -> Option<String> {
        if self.line == line && self.token < self.lines[self.line].len() {
            let token = self.lines[self.line][self.token].clone();
            self.line += 1;
            self.token = 0;
            return Some(token);
        }
        None
    }

    /// All remaining tokens on `line`; the cursor moves past the line.
    fn drain_line(&mut self, line: usize) -> Vec<String> {
        let mut tokens = Vec::new();
        if self.line == line {
            while self.token < self.lines[self.line].len() {
                tokens.push(self.lines[self.line][self.token].clone());
                self.token += 1;
            }
        }
        tokens
    }

    fn is_exhausted(&mut self) -> bool {
        while self.line < self.lines.len() {
            if self.token < self.lines[self.line].len() {
                return false;
            }
            self.line += 1;
            self.token = 0;
        }
        true
    }
}

fn parse_section_block(block: &str, shape: LineShape) -> ParseResult<SectionDecl> {
    let mut cursor = TokenCursor::new(block);

    let (id, _) = expect_token(&mut cursor, "section id")?;
    let (data_file, _) = expect_token(&mut cursor, "data file")?;
    let lower = expect_number(&mut cursor, "window start")?;
    let upper = expect_number(&mut cursor, "window end")?;
    let (order_token, order_line) = expect_token(&mut cursor, "Legendre order")?;
    let order = order_token.parse::<usize>().map_err(|_| {
        FitError::input_validation(
            "INPUT.MODEL_SYNTAX",
            format!("section '{id}': Legendre order '{order_token}' is not a non-negative integer"),
        )
    })?;

    // Masked intervals share the head line with the Legendre order.
    let mask_tokens = cursor.drain_line(order_line);
    if mask_tokens.len() % 2 != 0 {
        return Err(FitError::input_validation(
            "INPUT.MODEL_MASK",
            format!(
                "section '{id}': masked intervals require an even number of bounds, got {}",
                mask_tokens.len()
            ),
        ));
    }
    let mut mask_intervals = Vec::with_capacity(mask_tokens.len() / 2);
    for pair in mask_tokens.chunks_exact(2) {
        let a = parse_number(&pair[0], &id, "mask bound")?;
        let b = parse_number(&pair[1], &id, "mask bound")?;
        mask_intervals.push((a, b));
    }

    let resolution = parse_spec(&mut cursor, &id, "resolving power")?;

    let mut lines = Vec::new();
    while !cursor.is_exhausted() {
        let (line_id, _) = expect_token(&mut cursor, "line id")?;
        let mut specs = Vec::with_capacity(shape.arity());
        for position in 0..shape.arity() {
            let field = format!("line '{line_id}' parameter {position}");
            specs.push(parse_spec(&mut cursor, &id, &field)?);
        }
        lines.push((line_id, specs));
    }

    if lines.is_empty() {
        return Err(FitError::input_validation(
            "INPUT.MODEL_SECTION_LINES",
            format!("section '{id}' declares no absorption line"),
        ));
    }

    Ok(SectionDecl {
        id,
        data_file,
        lower,
        upper,
        order,
        mask_intervals,
        resolution,
        lines,
    })
}

fn parse_spec(cursor: &mut TokenCursor, section_id: &str, field: &str) -> ParseResult<RawSpec> {
    let value = expect_number_for(cursor, section_id, field)?;
    let lower = expect_number_for(cursor, section_id, field)?;
    let upper = expect_number_for(cursor, section_id, field)?;
    let (mask_token, mask_line) = expect_token(cursor, field)?;
    let masked = match mask_token.as_str() {
        "0" => false,
        "1" => true,
        other => {
            return Err(FitError::input_validation(
                "INPUT.MODEL_SYNTAX",
                format!("section '{section_id}': {field}: mask flag '{other}' must be 0 or 1"),
            ));
        }
    };
    let reference = cursor.take_reference_on(mask_line);

    Ok(RawSpec {
        value,
        lower,
        upper,
        masked,
        reference,
    })
}

fn expect_token(cursor: &mut TokenCursor, field: &str) -> ParseResult<(String, usize)> {
    cursor.next_token().ok_or_else(|| {
        FitError::input_validation(
            "INPUT.MODEL_SYNTAX",
            format!("unexpected end of section while reading {field}"),
        )
    })
}

fn expect_number(cursor: &mut TokenCursor, field: &str) -> ParseResult<f64> {
    let (token, _) = expect_token(cursor, field)?;
    token.parse::<f64>().map_err(|_| {
        FitError::input_validation(
            "INPUT.MODEL_SYNTAX",
            format!("{field} '{token}' is not a number"),
        )
    })
}

fn expect_number_for(cursor: &mut TokenCursor, section_id: &str, field: &str) -> ParseResult<f64> {
    let (token, _) = expect_token(cursor, field)?;
    parse_number(&token, section_id, field)
}

fn parse_number(token: &str, section_id: &str, field: &str) -> ParseResult<f64> {
    token.parse::<f64>().map_err(|_| {
        FitError::input_validation(
            "INPUT.MODEL_SYNTAX",
            format!("section '{section_id}': {field} '{token}' is not a number"),
        )
    })
}

fn assemble_model(
    declarations: Vec<SectionDecl>,
    shape: LineShape,
    data_dir: &Path,
) -> ParseResult<Model> {
    let arity = shape.arity();

    // First pass: lay out the flat entry table and the id maps.
    let mut section_index: HashMap<String, usize> = HashMap::new();
    let mut line_start: HashMap<String, usize> = HashMap::new();
    let mut entry_start = Vec::with_capacity(declarations.len());
    let mut line_ids = Vec::new();
    let mut next_entry = 0_usize;

    for (ordinal, decl) in declarations.iter().enumerate() {
        if section_index.insert(decl.id.clone(), ordinal).is_some() {
            return Err(FitError::input_validation(
                "INPUT.MODEL_DUPLICATE_ID",
                format!("duplicate section identifier '{}'", decl.id),
            ));
        }
        entry_start.push(next_entry);
        next_entry += 1;

        for (line_id, _) in &decl.lines {
            if line_start.insert(line_id.clone(), next_entry).is_some() {
                return Err(FitError::input_validation(
                    "INPUT.MODEL_DUPLICATE_ID",
                    format!("duplicate line identifier '{line_id}'"),
                ));
            }
            line_ids.push((line_id.clone(), next_entry));
            next_entry += arity;
        }
    }

    // Second pass: resolve symbolic references into entry links.
    let mut specs: Vec<ParameterSpec> = Vec::with_capacity(next_entry);
    for decl in &declarations {
        let link = match &decl.resolution.reference {
            Some(reference) => {
                let target = section_index.get(reference).ok_or_else(|| {
                    FitError::input_validation(
                        "INPUT.MODEL_UNKNOWN_REFERENCE",
                        format!(
                            "section '{}': resolving-power reference '{reference}' names no section",
                            decl.id
                        ),
                    )
                })?;
                Some(entry_start[*target])
            }
            None => None,
        };
        specs.push(to_spec(&decl.resolution, link));

        for (line_id, line_specs) in &decl.lines {
            for (position, raw) in line_specs.iter().enumerate() {
                let link = match &raw.reference {
                    Some(reference) => {
                        let target = line_start.get(reference).ok_or_else(|| {
                            FitError::input_validation(
                                "INPUT.MODEL_UNKNOWN_REFERENCE",
                                format!(
                                    "line '{line_id}': reference '{reference}' names no line"
                                ),
                            )
                        })?;
                        Some(target + position)
                    }
                    None => None,
                };
                specs.push(to_spec(raw, link));
            }
        }
    }

    let table = ParameterTable::resolve(specs)?;

    // Third pass: load the section data.
    let mut sections = Vec::with_capacity(declarations.len());
    let mut section_ids = Vec::with_capacity(declarations.len());
    let mut line_counts = Vec::with_capacity(declarations.len());
    let mut orders = Vec::with_capacity(declarations.len());

    for decl in &declarations {
        let path = if Path::new(&decl.data_file).is_absolute() {
            Path::new(&decl.data_file).to_path_buf()
        } else {
            data_dir.join(&decl.data_file)
        };
        let source = fs::read_to_string(&path).map_err(|source| {
            FitError::input_validation(
                "INPUT.DATA_FILE",
                format!(
                    "section '{}': data file '{}' cannot be read: {source}",
                    decl.id,
                    path.display()
                ),
            )
        })?;
        let samples = parse_data_source(&source)?;
        let mut section = Section::from_samples(decl.lower, decl.upper, &samples)?;
        for &(a, b) in &decl.mask_intervals {
            section.mask_interval(a, b);
        }

        sections.push(section);
        section_ids.push(decl.id.clone());
        line_counts.push(decl.lines.len());
        orders.push(decl.order);
    }

    Ok(Model::from_parts(
        shape,
        sections,
        section_ids,
        entry_start,
        line_counts,
        orders,
        line_ids,
        table,
    ))
}

fn to_spec(raw: &RawSpec, link: Option<usize>) -> ParameterSpec {
    ParameterSpec {
        value: raw.value,
        lower: raw.lower,
        upper: raw.upper,
        masked: raw.masked,
        link,
        link_id: raw.reference.clone(),
    }
}
