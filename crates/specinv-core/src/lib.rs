//! Inverse modelling of QSO absorption-line regions: the forward model
//! (line profiles, spectral sections, the parameter table) and the CMA-ES
//! optimizer estimating the model parameters and their uncertainties.

pub mod common;
pub mod domain;
pub mod equations;
pub mod model;
pub mod numerics;
pub mod optimizer;
pub mod profiles;
pub mod random;

pub use domain::{ComputeResult, FitError, FitErrorCategory, FitResult, ParseResult};
pub use model::{parse_model, LineSummary, Model, SectionSummary, TableEntry};
pub use optimizer::{
    BoundedConstraint, BufferedTracer, Constraint, NoConstraint, NoTracing, Optimizer,
    OptimizerBuilder, OptimizerResult, StrategyParameters, Tracer,
};
pub use profiles::LineShape;
