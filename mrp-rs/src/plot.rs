use plotters::coord::ranged1d::{Ranged, ValueFormatter};
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;

use crate::error::PlotError;

const LINE_OPACITY: f64 = 0.7;
const LINE_WIDTH: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLUE: Rgb = Rgb(0, 0, 255);
    pub const YELLOW: Rgb = Rgb(191, 191, 0);
    pub const RED: Rgb = Rgb(255, 0, 0);
    pub const GREEN: Rgb = Rgb(0, 128, 0);
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const CYAN: Rgb = Rgb(0, 191, 191);

    fn style(self) -> ShapeStyle {
        RGBColor(self.0, self.1, self.2)
            .mix(LINE_OPACITY)
            .stroke_width(LINE_WIDTH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YScale {
    Linear,
    /// Logarithmic axis over `[min, max]`; values outside are clipped to it.
    Log { min: f64, max: f64 },
}

impl YScale {
    pub fn clip(&self, value: f64) -> f64 {
        match *self {
            YScale::Linear => value,
            YScale::Log { min, max } => value.clamp(min, max),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Series {
    pub label: String,
    pub color: Rgb,
    pub dashed: bool,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(label: impl Into<String>, color: Rgb, values: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            color,
            dashed: false,
            values,
        }
    }

    pub fn dashed(mut self) -> Self {
        self.dashed = true;
        self
    }
}

/// Several series sharing one time axis.
#[derive(Debug, Clone)]
pub struct TimeSeriesPlot {
    pub title: String,
    pub x_label: String,
    pub scale: YScale,
    pub grid: bool,
    pub size: (u32, u32),
    pub max_points: usize,
    pub series: Vec<Series>,
}

impl TimeSeriesPlot {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            x_label: String::new(),
            scale: YScale::Linear,
            grid: false,
            size: (1000, 400),
            max_points: 4000,
            series: Vec::new(),
        }
    }

    pub fn x_label(mut self, label: impl Into<String>) -> Self {
        self.x_label = label.into();
        self
    }

    pub fn scale(mut self, scale: YScale) -> Self {
        self.scale = scale;
        self
    }

    pub fn grid(mut self, grid: bool) -> Self {
        self.grid = grid;
        self
    }

    pub fn series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    fn check(&self, times: &[f64]) -> Result<(), PlotError> {
        if times.is_empty() || self.series.is_empty() {
            return Err(PlotError::Empty);
        }
        if let YScale::Log { min, max } = self.scale {
            if !(min.is_finite() && max.is_finite() && min > 0.0 && min < max) {
                return Err(PlotError::InvalidLogRange { min, max });
            }
        }
        for series in &self.series {
            if series.values.len() != times.len() {
                return Err(PlotError::LengthMismatch {
                    label: series.label.clone(),
                    expected: times.len(),
                    got: series.values.len(),
                });
            }
        }
        Ok(())
    }

    fn y_max(&self) -> f64 {
        let max = self
            .series
            .iter()
            .flat_map(|s| s.values.iter().copied())
            .filter(|v| v.is_finite())
            .fold(0.0, f64::max);
        if max > 0.0 { max * 1.05 } else { 1.0 }
    }

    /// Renders the plot as an SVG document.
    pub fn render_svg(&self, times: &[f64]) -> Result<String, PlotError> {
        self.check(times)?;
        let indices = sample_indices(times.len(), self.max_points);
        let x_start = times[0];
        let x_end = if times[times.len() - 1] > x_start {
            times[times.len() - 1]
        } else {
            x_start + 1.0
        };

        let mut buffer = String::new();
        {
            let root = SVGBackend::with_string(&mut buffer, self.size).into_drawing_area();
            root.fill(&WHITE).map_err(render_error)?;

            let mut builder = ChartBuilder::on(&root);
            builder
                .caption(&self.title, ("sans-serif", 20))
                .margin(10)
                .x_label_area_size(40)
                .y_label_area_size(80);

            match self.scale {
                YScale::Linear => {
                    let mut chart = builder
                        .build_cartesian_2d(x_start..x_end, 0f64..self.y_max())
                        .map_err(render_error)?;
                    self.draw(&mut chart, times, &indices)?;
                }
                YScale::Log { min, max } => {
                    let mut chart = builder
                        .build_cartesian_2d(x_start..x_end, (min..max).log_scale())
                        .map_err(render_error)?;
                    self.draw(&mut chart, times, &indices)?;
                }
            }
            root.present().map_err(render_error)?;
        }
        Ok(buffer)
    }

    fn draw<'a, Y>(
        &self,
        chart: &mut ChartContext<'a, SVGBackend<'a>, Cartesian2d<RangedCoordf64, Y>>,
        times: &[f64],
        indices: &[usize],
    ) -> Result<(), PlotError>
    where
        Y: Ranged<ValueType = f64> + ValueFormatter<f64>,
    {
        let mut mesh = chart.configure_mesh();
        mesh.x_desc(self.x_label.as_str());
        if !self.grid {
            mesh.disable_mesh();
        }
        mesh.draw().map_err(render_error)?;

        for series in &self.series {
            let style = series.color.style();
            let points = indices
                .iter()
                .map(|&i| (times[i], self.scale.clip(series.values[i])));
            let anno = if series.dashed {
                chart.draw_series(DashedLineSeries::new(points, 10, 6, style))
            } else {
                chart.draw_series(LineSeries::new(points, style))
            }
            .map_err(render_error)?;
            anno.label(series.label.as_str())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.5))
            .border_style(BLACK)
            .margin(20)
            .draw()
            .map_err(render_error)?;
        Ok(())
    }
}

fn render_error(err: impl std::fmt::Display) -> PlotError {
    PlotError::Render(err.to_string())
}

/// Evenly strided indices into a series of `len` samples, at most
/// `max_points` of them (never fewer than two), always keeping the last one.
pub fn sample_indices(len: usize, max_points: usize) -> Vec<usize> {
    let max_points = max_points.max(2);
    if len <= max_points {
        return (0..len).collect();
    }
    let stride = (len - 1).div_ceil(max_points - 1);
    let mut indices: Vec<usize> = (0..len).step_by(stride).collect();
    if indices.last() != Some(&(len - 1)) {
        indices.push(len - 1);
    }
    indices
}
