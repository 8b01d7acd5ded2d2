use mrp::Solution;

use crate::model::{Compartment, State};

#[derive(Debug, Default)]
pub struct SeirsdOutput {
    pub times: Vec<f64>,
    pub susceptible: Vec<f64>,
    pub exposed: Vec<f64>,
    pub infected: Vec<f64>,
    pub recovered: Vec<f64>,
    pub dead: Vec<f64>,
}

impl SeirsdOutput {
    pub fn with_capacity(len: usize) -> SeirsdOutput {
        SeirsdOutput {
            times: Vec::with_capacity(len),
            susceptible: Vec::with_capacity(len),
            exposed: Vec::with_capacity(len),
            infected: Vec::with_capacity(len),
            recovered: Vec::with_capacity(len),
            dead: Vec::with_capacity(len),
        }
    }

    pub fn from_solution(solution: &Solution<5>) -> SeirsdOutput {
        let mut output = SeirsdOutput::with_capacity(solution.times.len());
        for (t, y) in solution.times.iter().zip(&solution.states) {
            output.push(*t, y);
        }
        output
    }

    pub fn push(&mut self, t: f64, y: &State) {
        self.times.push(t);
        self.susceptible.push(y[0]);
        self.exposed.push(y[1]);
        self.infected.push(y[2]);
        self.recovered.push(y[3]);
        self.dead.push(y[4]);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn compartment(&self, compartment: Compartment) -> &[f64] {
        match compartment {
            Compartment::Susceptible => &self.susceptible,
            Compartment::Exposed => &self.exposed,
            Compartment::Infected => &self.infected,
            Compartment::Recovered => &self.recovered,
            Compartment::Dead => &self.dead,
        }
    }

    fn state(&self, index: usize) -> Option<State> {
        if index >= self.len() {
            return None;
        }
        Some(State::new(
            self.susceptible[index],
            self.exposed[index],
            self.infected[index],
            self.recovered[index],
            self.dead[index],
        ))
    }

    pub fn final_state(&self) -> Option<State> {
        if self.is_empty() {
            return None;
        }
        self.state(self.len() - 1)
    }

    /// Sum of all compartments at every time point.
    pub fn total(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| {
                self.susceptible[i]
                    + self.exposed[i]
                    + self.infected[i]
                    + self.recovered[i]
                    + self.dead[i]
            })
            .collect()
    }

    /// Time and size of the largest infected count.
    pub fn peak_infected(&self) -> Option<(f64, f64)> {
        self.times
            .iter()
            .copied()
            .zip(self.infected.iter().copied())
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Largest relative deviation of the total from `population`.
    pub fn max_conservation_error(&self, population: f64) -> f64 {
        self.total()
            .iter()
            .map(|total| f64::abs(total - population) / population)
            .fold(0.0, f64::max)
    }
}
