//! Plumbing shared by compartmental model runs: the run [`Environment`],
//! the adaptive ODE integrator in [`ode`] and time-series rendering in
//! [`plot`].

pub mod environment;
pub mod error;
pub mod ode;
pub mod plot;

pub use environment::Environment;
pub use error::{EnvironmentError, PlotError, SolverError};
pub use ode::{OdeSystem, Solution, SolverSettings, SolverStats, linspace, solve};
pub use plot::{Rgb, Series, TimeSeriesPlot, YScale};
