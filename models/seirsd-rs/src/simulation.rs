use mrp::{Rgb, Series, SolverError, TimeSeriesPlot, YScale};

use crate::{
    model::{Compartment, SeirsdModel},
    output::SeirsdOutput,
    parameters::{ParameterError, Parameters},
};

pub const TITLE: &str = "SEIRSD model";

/// Relative drift of the total population above which a run is reported.
const CONSERVATION_WARNING: f64 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("invalid parameters: {0}")]
    Parameters(#[from] ParameterError),
    #[error("integration failed: {0}")]
    Solver(#[from] SolverError),
}

/// Integrates the model over the parameterised time grid.
pub fn simulate(parameters: &Parameters) -> Result<SeirsdOutput, SimulationError> {
    parameters.check()?;
    let model = SeirsdModel::new(parameters);
    let grid = parameters.time_grid();

    tracing::info!(
        population = parameters.population,
        r0_start = parameters.r0_start(),
        alpha_avg = parameters.average_fatality_rate(),
        t_end = parameters.t_end,
        points = grid.len(),
        "integrating"
    );
    let solution = mrp::solve(&model, &grid, parameters.initial_state(), &parameters.solver)?;
    let output = SeirsdOutput::from_solution(&solution);

    let drift = output.max_conservation_error(parameters.population);
    if drift > CONSERVATION_WARNING {
        tracing::warn!(drift, "total population drifted from N");
    }
    if let (Some(last), Some((peak_t, peak_i))) = (output.final_state(), output.peak_infected()) {
        tracing::info!(
            susceptible = last[0],
            exposed = last[1],
            infected = last[2],
            recovered = last[3],
            dead = last[4],
            peak_t,
            peak_i,
            drift,
            "finished"
        );
    }
    Ok(output)
}

fn color(compartment: Compartment) -> Rgb {
    match compartment {
        Compartment::Susceptible => Rgb::BLUE,
        Compartment::Exposed => Rgb::YELLOW,
        Compartment::Infected => Rgb::RED,
        Compartment::Recovered => Rgb::GREEN,
        Compartment::Dead => Rgb::BLACK,
    }
}

fn trajectories(plot: TimeSeriesPlot, output: &SeirsdOutput) -> TimeSeriesPlot {
    let plot = Compartment::ALL.iter().fold(plot, |plot, &c| {
        plot.series(Series::new(
            c.label(),
            color(c),
            output.compartment(c).to_vec(),
        ))
    });
    plot.series(Series::new("Total", Rgb::CYAN, output.total()).dashed())
}

/// The linear and log-scale views of a run, keyed by output file name.
pub fn plots(output: &SeirsdOutput, population: f64) -> Vec<(&'static str, TimeSeriesPlot)> {
    let linear = trajectories(TimeSeriesPlot::new(TITLE).x_label("Time (days)"), output);
    let log = trajectories(
        TimeSeriesPlot::new(TITLE)
            .x_label("Time (days)")
            .scale(YScale::Log {
                min: 1.0,
                max: 1.1 * population,
            })
            .grid(true),
        output,
    );
    vec![("seirsd_linear.svg", linear), ("seirsd_log.svg", log)]
}
