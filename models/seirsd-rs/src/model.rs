use mrp::OdeSystem;
use nalgebra::Vector5;

use crate::parameters::{Parameters, R0Schedule};

/// Compartment populations in `S, E, I, R, D` order.
pub type State = Vector5<f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compartment {
    Susceptible,
    Exposed,
    Infected,
    Recovered,
    Dead,
}

impl Compartment {
    pub const ALL: [Compartment; 5] = [
        Compartment::Susceptible,
        Compartment::Exposed,
        Compartment::Infected,
        Compartment::Recovered,
        Compartment::Dead,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Compartment::Susceptible => "Susceptible",
            Compartment::Exposed => "Exposed",
            Compartment::Infected => "Infected",
            Compartment::Recovered => "Recovered",
            Compartment::Dead => "Dead",
        }
    }
}

/// SEIRSD dynamics with waning immunity and a fatality rate that rises once
/// intensive-care demand exceeds the available beds.
#[derive(Debug, Clone)]
pub struct SeirsdModel {
    population: f64,
    recovery_rate: f64,
    progression_rate: f64,
    death_rate: f64,
    immunity_loss_rate: f64,
    r0_start: f64,
    r0_schedule: R0Schedule,
    average_fatality_rate: f64,
    icu_beds: f64,
    icu_fraction: f64,
    overflow_fatality_slope: f64,
}

impl SeirsdModel {
    pub fn new(parameters: &Parameters) -> Self {
        Self {
            population: parameters.population,
            recovery_rate: parameters.recovery_rate,
            progression_rate: parameters.progression_rate,
            death_rate: parameters.death_rate,
            immunity_loss_rate: parameters.immunity_loss_rate,
            r0_start: parameters.r0_start(),
            r0_schedule: parameters.r0_schedule,
            average_fatality_rate: parameters.average_fatality_rate(),
            icu_beds: parameters.icu_beds,
            icu_fraction: parameters.icu_fraction,
            overflow_fatality_slope: parameters.overflow_fatality_slope,
        }
    }

    pub fn r0(&self, t: f64) -> f64 {
        self.r0_schedule.at(self.r0_start, t)
    }

    pub fn is_over_capacity(&self, infected: f64) -> bool {
        self.icu_fraction * infected > self.icu_beds
    }

    /// Share of infections that end in death given the current number of
    /// infected.
    pub fn fatality_rate(&self, infected: f64) -> f64 {
        if self.is_over_capacity(infected) {
            self.average_fatality_rate + self.overflow_fatality_slope * infected / self.population
        } else {
            self.average_fatality_rate
        }
    }
}

impl OdeSystem<5> for SeirsdModel {
    fn derivative(&self, t: f64, y: &State) -> State {
        let (s, e, i, r) = (y[0], y[1], y[2], y[3]);

        let alpha = self.fatality_rate(i);
        // Capacity overflow only changes alpha; transmission follows the
        // schedule in both regimes.
        let beta = self.r0(t) * self.recovery_rate / self.population;

        let infection = beta * s * i;
        let waning = self.immunity_loss_rate * r;
        let onset = self.progression_rate * e;
        let recovery = (1.0 - alpha) * self.recovery_rate * i;
        let death = alpha * self.death_rate * i;

        State::new(
            -infection + waning,
            infection - onset,
            onset - recovery - death,
            recovery - waning,
            death,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> SeirsdModel {
        SeirsdModel::new(&Parameters::default())
    }

    #[test]
    fn test_derivative_sums_to_zero() {
        let model = model();
        let states = [
            State::new(80e6 - 10.0, 0.0, 10.0, 0.0, 0.0),
            State::new(4e7, 1e6, 3e6, 3.5e7, 1e6),
            State::new(1e3, 2e3, 5e5, 7.9e7, 4e5),
        ];
        for (t, y) in [0.0, 500.0, 3000.0].into_iter().zip(states) {
            let dy = model.derivative(t, &y);
            let scale = dy.iter().map(|v| v.abs()).fold(1.0, f64::max);
            assert!(f64::abs(dy.sum()) < 1e-12 * scale, "t={t}: {}", dy.sum());
        }
    }

    #[test]
    fn test_disease_free_state_is_fixed() {
        let dy = model().derivative(0.0, &State::new(80e6, 0.0, 0.0, 0.0, 0.0));
        assert_eq!(dy, State::zeros());
    }

    #[test]
    fn test_capacity_threshold() {
        let parameters = Parameters::default();
        let model = model();
        let alpha_avg = parameters.average_fatality_rate();
        let threshold = parameters.icu_beds / parameters.icu_fraction;

        let below = threshold - 1.0;
        assert!(!model.is_over_capacity(below));
        assert_eq!(model.fatality_rate(below), alpha_avg);

        let above = threshold + 1.0;
        assert!(model.is_over_capacity(above));
        let expected = alpha_avg + 0.5 * above / parameters.population;
        assert!(f64::abs(model.fatality_rate(above) - expected) < 1e-15);

        // The death flow is alpha * rho * I on both sides of the threshold.
        for (infected, alpha) in [(below, alpha_avg), (above, expected)] {
            let y = State::new(parameters.population - infected, 0.0, infected, 0.0, 0.0);
            let dy = model.derivative(0.0, &y);
            let death = alpha * parameters.death_rate * infected;
            assert!(f64::abs(dy[Compartment::Dead.index()] - death) < 1e-9 * death);
        }
    }

    #[test]
    fn test_overflow_leaves_transmission_unchanged() {
        let parameters = Parameters::default();
        let model = model();
        let threshold = parameters.icu_beds / parameters.icu_fraction;
        let beta = parameters.r0_start() * parameters.recovery_rate / parameters.population;

        for infected in [threshold - 1.0, threshold + 1.0, 10.0 * threshold] {
            let s = parameters.population - infected;
            let dy = model.derivative(0.0, &State::new(s, 0.0, infected, 0.0, 0.0));
            let implied_beta = -dy[Compartment::Susceptible.index()] / (s * infected);
            assert!(f64::abs(implied_beta - beta) < 1e-12 * beta);
        }
    }

    #[test]
    fn test_flows() {
        let model = model();
        let y = State::new(0.0, 700.0, 0.0, 3650.0, 5.0);
        let dy = model.derivative(0.0, &y);
        // No infected: only latent progression and waning immunity move people.
        assert!(f64::abs(dy[0] - 10.0) < 1e-12);
        assert!(f64::abs(dy[1] + 100.0) < 1e-12);
        assert!(f64::abs(dy[2] - 100.0) < 1e-12);
        assert!(f64::abs(dy[3] + 10.0) < 1e-12);
        assert_eq!(dy[4], 0.0);
    }

    #[test]
    fn test_time_varying_r0() {
        let parameters = Parameters {
            r0_schedule: R0Schedule::Logistic {
                r0_end: 1.0,
                k: 0.5,
                midpoint: 1000.0,
            },
            ..Default::default()
        };
        let model = SeirsdModel::new(&parameters);
        assert!(f64::abs(model.r0(0.0) - parameters.r0_start()) < 1e-9);
        assert!(f64::abs(model.r0(3000.0) - 1.0) < 1e-9);

        let y = State::new(parameters.population - 100.0, 0.0, 100.0, 0.0, 0.0);
        let early = model.derivative(0.0, &y);
        let late = model.derivative(3000.0, &y);
        assert!(late[1] < early[1]);
    }

    #[test]
    fn test_compartment_order() {
        let labels: Vec<_> = Compartment::ALL.iter().map(|c| c.label()).collect();
        assert_eq!(
            labels,
            vec!["Susceptible", "Exposed", "Infected", "Recovered", "Dead"]
        );
        for (i, c) in Compartment::ALL.iter().enumerate() {
            assert_eq!(c.index(), i);
        }
    }
}
