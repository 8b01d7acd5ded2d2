use mrp::SolverSettings;
use nalgebra::Vector5;
use serde::Deserialize;

/// Every field defaults to the reference scenario: a population of 80 million
/// with 10 initial infections, integrated over ten years.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub population: f64,
    pub initial_infected: f64,
    /// gamma, inverse mean duration of illness (per day)
    pub recovery_rate: f64,
    /// delta, inverse latent period (per day)
    pub progression_rate: f64,
    /// rho, inverse mean time to death among fatal cases (per day)
    pub death_rate: f64,
    /// Recovered -> Susceptible (per day)
    pub immunity_loss_rate: f64,
    /// Contacts per day
    pub contact_rate: f64,
    /// Infection probability per contact
    pub infection_probability: f64,
    pub r0_schedule: R0Schedule,
    pub age_groups: Vec<AgeGroup>,
    pub icu_beds: f64,
    /// Share of current infections needing intensive care
    pub icu_fraction: f64,
    /// Extra fatality per unit of infected share while over capacity
    pub overflow_fatality_slope: f64,
    pub t_end: f64,
    pub n_points: usize,
    pub solver: SolverSettings,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            population: 80e6,
            initial_infected: 10.0,
            recovery_rate: 1.0 / 20.0,
            progression_rate: 1.0 / 7.0,
            death_rate: 1.0 / 10.0,
            immunity_loss_rate: 1.0 / 365.0,
            contact_rate: 5.0 / 7.0,
            infection_probability: 0.1,
            r0_schedule: R0Schedule::Constant,
            age_groups: vec![
                AgeGroup::new(0.0001, 0.1),
                AgeGroup::new(0.005, 0.3),
                AgeGroup::new(0.05, 0.4),
                AgeGroup::new(0.2, 0.2),
            ],
            icu_beds: 50_000.0,
            icu_fraction: 0.2,
            overflow_fatality_slope: 0.5,
            t_end: 10.0 * 365.0,
            n_points: 100_000,
            solver: SolverSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AgeGroup {
    pub fatality_rate: f64,
    pub population_fraction: f64,
}

impl AgeGroup {
    pub fn new(fatality_rate: f64, population_fraction: f64) -> Self {
        Self {
            fatality_rate,
            population_fraction,
        }
    }
}

/// How the basic reproduction number evolves over time.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub enum R0Schedule {
    #[default]
    Constant,
    /// Smooth transition from the starting value to `r0_end` around `midpoint`.
    Logistic { r0_end: f64, k: f64, midpoint: f64 },
    Oscillatory { amplitude: f64, period: f64 },
}

impl R0Schedule {
    pub fn at(&self, r0_start: f64, t: f64) -> f64 {
        match *self {
            R0Schedule::Constant => r0_start,
            R0Schedule::Logistic {
                r0_end,
                k,
                midpoint,
            } => (r0_start - r0_end) / (1.0 + f64::exp(-k * (midpoint - t))) + r0_end,
            R0Schedule::Oscillatory { amplitude, period } => {
                (amplitude * r0_start * f64::cos(t / period)).powi(2)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("population must be positive and finite, got {0}")]
    Population(f64),
    #[error("initial_infected must lie in [0, population], got {0}")]
    InitialInfected(f64),
    #[error("{name} must be finite and non-negative, got {value}")]
    Negative { name: &'static str, value: f64 },
    #[error("time grid needs t_end > 0 and at least two points (t_end={t_end}, n_points={n_points})")]
    TimeGrid { t_end: f64, n_points: usize },
}

impl Parameters {
    /// `R0` at the start of the run, from the contact rate and per-contact
    /// infection probability.
    pub fn r0_start(&self) -> f64 {
        self.contact_rate * self.infection_probability / self.recovery_rate
    }

    /// Population-weighted fatality rate across age groups.
    pub fn average_fatality_rate(&self) -> f64 {
        self.age_groups
            .iter()
            .map(|g| g.fatality_rate * g.population_fraction)
            .sum()
    }

    pub fn initial_state(&self) -> Vector5<f64> {
        Vector5::new(
            self.population - self.initial_infected,
            0.0,
            self.initial_infected,
            0.0,
            0.0,
        )
    }

    pub fn time_grid(&self) -> Vec<f64> {
        mrp::linspace(0.0, self.t_end, self.n_points)
    }

    pub fn check(&self) -> Result<(), ParameterError> {
        if !(self.population.is_finite() && self.population > 0.0) {
            return Err(ParameterError::Population(self.population));
        }
        if !(0.0..=self.population).contains(&self.initial_infected) {
            return Err(ParameterError::InitialInfected(self.initial_infected));
        }
        let rates = [
            ("recovery_rate", self.recovery_rate),
            ("progression_rate", self.progression_rate),
            ("death_rate", self.death_rate),
            ("immunity_loss_rate", self.immunity_loss_rate),
            ("contact_rate", self.contact_rate),
            ("infection_probability", self.infection_probability),
            ("icu_beds", self.icu_beds),
            ("icu_fraction", self.icu_fraction),
            ("overflow_fatality_slope", self.overflow_fatality_slope),
        ];
        let groups = self.age_groups.iter().flat_map(|g| {
            [
                ("age_groups.fatality_rate", g.fatality_rate),
                ("age_groups.population_fraction", g.population_fraction),
            ]
        });
        for (name, value) in rates.into_iter().chain(groups) {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ParameterError::Negative { name, value });
            }
        }
        if !(self.t_end.is_finite() && self.t_end > 0.0) || self.n_points < 2 {
            return Err(ParameterError::TimeGrid {
                t_end: self.t_end,
                n_points: self.n_points,
            });
        }
        Ok(())
    }
}
