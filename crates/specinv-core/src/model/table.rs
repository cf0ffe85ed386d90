//! The parameter table: values, bounds, mask flags and equality links,
//! resolved into an immutable index map onto the free-parameter vector
//! seen by the optimizer.

use crate::domain::{FitError, ParseResult};

/// One collected parameter specification, before link resolution.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
    /// `true` marks the parameter as free ("masked in"); `false` pins it
    /// to its value.
    pub masked: bool,
    /// The table index of the entry this one is linked to, if any. Link
    /// targets are resolved from symbolic ids by the model parser.
    pub link: Option<usize>,
    /// The symbolic id of the link, kept for error reporting.
    pub link_id: Option<String>,
}

impl ParameterSpec {
    pub fn fixed(value: f64) -> Self {
        Self {
            value,
            lower: value,
            upper: value,
            masked: false,
            link: None,
            link_id: None,
        }
    }
}

/// The resolved parameter table. Every entry knows its value, bounds,
/// mask flag and the free-slot index shared with its link root; only
/// free, unlinked roots are visible to the optimizer.
#[derive(Debug, Clone)]
pub struct ParameterTable {
    values: Vec<f64>,
    errors: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    masked: Vec<bool>,
    slot: Vec<usize>,
    /// Table index of the root entry owning each free slot.
    roots: Vec<usize>,
}

impl ParameterTable {
    /// Resolves a collected specification list into a table. Reference
    /// chains are followed to their roots with explicit self-reference
    /// and cycle detection; linked entries inherit everything from their
    /// roots.
    pub fn resolve(specs: Vec<ParameterSpec>) -> ParseResult<Self> {
        let count = specs.len();
        let mut root_of = vec![0_usize; count];

        for index in 0..count {
            let mut seen = vec![index];
            let mut cursor = index;
            while let Some(target) = specs[cursor].link {
                if target == cursor {
                    return Err(FitError::input_validation(
                        "INPUT.PARAMETER_SELF_REFERENCE",
                        format!(
                            "parameter '{}' references itself",
                            specs[cursor].link_id.as_deref().unwrap_or("?")
                        ),
                    ));
                }
                if seen.contains(&target) {
                    return Err(FitError::input_validation(
                        "INPUT.PARAMETER_REFERENCE_CYCLE",
                        format!(
                            "parameter reference '{}' closes a cycle",
                            specs[cursor].link_id.as_deref().unwrap_or("?")
                        ),
                    ));
                }
                seen.push(target);
                cursor = target;
            }
            root_of[index] = cursor;
        }

        let mut values = Vec::with_capacity(count);
        let mut lower = Vec::with_capacity(count);
        let mut upper = Vec::with_capacity(count);
        let mut masked = Vec::with_capacity(count);
        let mut slot = vec![0_usize; count];
        let mut roots = Vec::new();

        // Allocate free slots to masked, unlinked roots in table order.
        for (index, spec) in specs.iter().enumerate() {
            if spec.link.is_none() && spec.masked {
                slot[index] = roots.len();
                roots.push(index);
            }
        }

        for index in 0..count {
            let root = root_of[index];
            let spec = &specs[root];
            masked.push(spec.masked);
            slot[index] = slot[root];

            if spec.masked {
                let (lo, up) = if spec.lower <= spec.upper {
                    (spec.lower, spec.upper)
                } else {
                    (spec.upper, spec.lower)
                };
                values.push(spec.value);
                lower.push(lo);
                upper.push(up);
            } else {
                values.push(spec.value);
                lower.push(0.0);
                upper.push(0.0);
            }
        }

        Ok(Self {
            values,
            errors: vec![0.0; count],
            lower,
            upper,
            masked,
            slot,
            roots,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The number of free parameters visible to the optimizer.
    pub fn free_parameter_count(&self) -> usize {
        self.roots.len()
    }

    /// Midpoints of the free-parameter bounds: the optimizer start point.
    pub fn initial_values(&self) -> Vec<f64> {
        self.roots
            .iter()
            .map(|&root| 0.5 * (self.lower[root] + self.upper[root]))
            .collect()
    }

    /// Half-widths of the free-parameter bounds: the initial local step
    /// sizes.
    pub fn initial_step_sizes(&self) -> Vec<f64> {
        self.roots
            .iter()
            .map(|&root| 0.5 * (self.upper[root] - self.lower[root]))
            .collect()
    }

    /// Lower and upper bounds of the free parameters, slot by slot.
    pub fn free_bounds(&self) -> (Vec<f64>, Vec<f64>) {
        let lower = self.roots.iter().map(|&root| self.lower[root]).collect();
        let upper = self.roots.iter().map(|&root| self.upper[root]).collect();
        (lower, upper)
    }

    /// The full value vector with the free slots replaced by `x`.
    pub fn splice(&self, x: &[f64]) -> Vec<f64> {
        debug_assert_eq!(x.len(), self.roots.len());
        let mut values = self.values.clone();
        for index in 0..values.len() {
            if self.masked[index] {
                values[index] = x[self.slot[index]];
            }
        }
        values
    }

    /// Writes optimized values and uncertainties back into the table.
    pub fn apply_optimum(&mut self, x: &[f64], z: &[f64]) {
        for index in 0..self.values.len() {
            if self.masked[index] {
                self.values[index] = x[self.slot[index]];
                self.errors[index] = z[self.slot[index]];
            } else {
                self.errors[index] = 0.0;
            }
        }
    }

    pub fn value(&self, index: usize) -> f64 {
        self.values[index]
    }

    pub fn error(&self, index: usize) -> f64 {
        self.errors[index]
    }

    /// Whether the entry took part in the fit (free, or linked to a free
    /// root).
    pub fn is_fitted(&self, index: usize) -> bool {
        self.masked[index]
    }
}

#[cfg(test)]
mod tests {
    use super::{ParameterSpec, ParameterTable};

    fn free(value: f64, lower: f64, upper: f64) -> ParameterSpec {
        ParameterSpec {
            value,
            lower,
            upper,
            masked: true,
            link: None,
            link_id: None,
        }
    }

    fn linked(target: usize, id: &str) -> ParameterSpec {
        ParameterSpec {
            value: 0.0,
            lower: 0.0,
            upper: 0.0,
            masked: false,
            link: Some(target),
            link_id: Some(id.to_string()),
        }
    }

    #[test]
    fn free_parameters_are_indexed_in_table_order() {
        let table = ParameterTable::resolve(vec![
            free(1.0, 0.0, 2.0),
            ParameterSpec::fixed(7.0),
            free(5.0, 4.0, 8.0),
        ])
        .expect("table");

        assert_eq!(table.free_parameter_count(), 2);
        assert_eq!(table.initial_values(), vec![1.0, 6.0]);
        assert_eq!(table.initial_step_sizes(), vec![1.0, 2.0]);
    }

    #[test]
    fn swapped_bounds_are_normalized() {
        let table = ParameterTable::resolve(vec![free(1.0, 2.0, 0.0)]).expect("table");
        let (lower, upper) = table.free_bounds();
        assert_eq!(lower, vec![0.0]);
        assert_eq!(upper, vec![2.0]);
    }

    #[test]
    fn linked_entries_inherit_root_slot_and_bounds() {
        let table = ParameterTable::resolve(vec![
            free(1.0, 0.0, 2.0),
            linked(0, "a"),
        ])
        .expect("table");

        assert_eq!(table.free_parameter_count(), 1);
        let spliced = table.splice(&[1.5]);
        assert_eq!(spliced, vec![1.5, 1.5]);
        assert!(table.is_fitted(1));
    }

    #[test]
    fn link_chains_resolve_to_the_transitive_root() {
        let table = ParameterTable::resolve(vec![
            free(1.0, 0.0, 2.0),
            linked(0, "a"),
            linked(1, "b"),
        ])
        .expect("table");

        let spliced = table.splice(&[0.25]);
        assert_eq!(spliced, vec![0.25, 0.25, 0.25]);
    }

    #[test]
    fn links_to_pinned_roots_stay_pinned() {
        let table = ParameterTable::resolve(vec![
            ParameterSpec::fixed(3.0),
            linked(0, "a"),
        ])
        .expect("table");

        assert_eq!(table.free_parameter_count(), 0);
        let spliced = table.splice(&[]);
        assert_eq!(spliced, vec![3.0, 3.0]);
        assert!(!table.is_fitted(1));
    }

    #[test]
    fn self_reference_is_rejected() {
        let error = ParameterTable::resolve(vec![linked(0, "loop")]).unwrap_err();
        assert_eq!(error.placeholder(), "INPUT.PARAMETER_SELF_REFERENCE");
    }

    #[test]
    fn reference_cycles_are_rejected() {
        let error =
            ParameterTable::resolve(vec![linked(1, "a"), linked(0, "b")]).unwrap_err();
        assert_eq!(error.placeholder(), "INPUT.PARAMETER_REFERENCE_CYCLE");
    }

    #[test]
    fn apply_optimum_writes_values_and_uncertainties_through_links() {
        let mut table = ParameterTable::resolve(vec![
            free(1.0, 0.0, 2.0),
            linked(0, "a"),
            ParameterSpec::fixed(9.0),
        ])
        .expect("table");

        table.apply_optimum(&[1.75], &[0.03]);
        assert_eq!(table.value(0), 1.75);
        assert_eq!(table.value(1), 1.75);
        assert_eq!(table.error(1), 0.03);
        assert_eq!(table.value(2), 9.0);
        assert_eq!(table.error(2), 0.0);
    }
}
