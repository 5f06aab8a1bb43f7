//! Plotting of closed-loop tracking runs using gnuplot.
//!
//! Series are collected first and rendered onto a single set of axes when the
//! plot is saved or shown.

use gnuplot::{AutoOption, AxesCommon, Caption, Color, Figure, LineWidth, PointSize, PointSymbol};
use crate::common::{Point2D, Pose2D, TrackingError, TrackingResult};

/// Color palette for consistent styling
pub mod colors {
    pub const DRIVEN: &str = "#0000FF";
    pub const PREDICTION: &str = "#35C788";
    pub const WAYPOINT: &str = "#DD3355";
    pub const VEHICLE: &str = "#00FFFF";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeriesKind {
    Line,
    Points,
}

#[derive(Debug, Clone)]
struct Series {
    kind: SeriesKind,
    x: Vec<f64>,
    y: Vec<f64>,
    caption: String,
    color: &'static str,
}

/// Plot of a tracking run in world coordinates
#[derive(Debug, Clone)]
pub struct TrackingPlot {
    title: String,
    series: Vec<Series>,
    aspect_ratio: Option<f64>,
}

impl TrackingPlot {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            series: Vec::new(),
            aspect_ratio: Some(1.0),
        }
    }

    /// Set aspect ratio (None for auto)
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> &mut Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Add a polyline
    pub fn add_path(&mut self, points: &[Point2D], caption: &str, color: &'static str) -> &mut Self {
        self.push(SeriesKind::Line, points, caption, color)
    }

    /// Add a set of markers
    pub fn add_points(&mut self, points: &[Point2D], caption: &str, color: &'static str) -> &mut Self {
        self.push(SeriesKind::Points, points, caption, color)
    }

    /// Add the vehicle pose as a marker with a heading tick
    pub fn add_pose(&mut self, pose: &Pose2D, length: f64) -> &mut Self {
        let tip = Point2D::new(pose.x + length * pose.yaw.cos(), pose.y + length * pose.yaw.sin());
        self.push(SeriesKind::Points, &[pose.position()], "Vehicle", colors::VEHICLE);
        self.push(SeriesKind::Line, &[pose.position(), tip], "", colors::VEHICLE)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Save plot to SVG file
    pub fn save_svg(&self, path: &str, width: u32, height: u32) -> TrackingResult<()> {
        self.render()
            .save_to_svg(path, width, height)
            .map_err(|e| TrackingError::Plot(e.to_string()))
    }

    /// Open an interactive gnuplot window
    pub fn show(&self) -> TrackingResult<()> {
        self.render()
            .show()
            .map(|_| ())
            .map_err(|e| TrackingError::Plot(e.to_string()))
    }

    fn push(&mut self, kind: SeriesKind, points: &[Point2D], caption: &str, color: &'static str) -> &mut Self {
        self.series.push(Series {
            kind,
            x: points.iter().map(|p| p.x).collect(),
            y: points.iter().map(|p| p.y).collect(),
            caption: caption.to_string(),
            color,
        });
        self
    }

    fn render(&self) -> Figure {
        let mut figure = Figure::new();
        let axes = figure.axes2d();

        for s in &self.series {
            match s.kind {
                SeriesKind::Line => {
                    axes.lines(&s.x, &s.y, &[Caption(&s.caption), Color(s.color), LineWidth(2.0)]);
                }
                SeriesKind::Points => {
                    axes.points(
                        &s.x,
                        &s.y,
                        &[Caption(&s.caption), Color(s.color), PointSymbol('O'), PointSize(0.8)],
                    );
                }
            }
        }

        if !self.title.is_empty() {
            axes.set_title(&self.title, &[]);
        }
        axes.set_x_label("X [m]", &[]);
        axes.set_y_label("Y [m]", &[]);
        if let Some(ratio) = self.aspect_ratio {
            axes.set_aspect_ratio(AutoOption::Fix(ratio));
        }

        figure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_collection() {
        let mut plot = TrackingPlot::new("run");
        assert!(plot.is_empty());

        let path = vec![Point2D::new(0.0, 0.0), Point2D::new(1.0, 0.5)];
        plot.add_path(&path, "Driven", colors::DRIVEN)
            .add_points(&path, "Waypoints", colors::WAYPOINT)
            .add_pose(&Pose2D::new(1.0, 0.5, 0.3), 2.0);

        assert_eq!(plot.len(), 4);
        assert_eq!(plot.series[0].x, vec![0.0, 1.0]);
        assert_eq!(plot.series[3].kind, SeriesKind::Line);
    }
}
