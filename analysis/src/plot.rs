//! Averages plot: one line per field, averaged over every record sharing a key

use crate::ExportError;
use plotters::prelude::*;
use std::{fmt::Display, ops::Range, path::Path};
use tracing::debug;
use ycsb_ingest::{Aggregate, Field, MetricSet};

const PLOT_SIZE: (u32, u32) = (1024, 768);

type Series = (Field, Vec<(f64, f64)>);

fn plot_error(error: impl Display) -> ExportError {
    ExportError::Plot(error.to_string())
}

/// collect (key, mean) points for each plotted field
fn series(stats: &MetricSet, key: Field, fields: &[Field]) -> Vec<Series> {
    let groups = stats.grouped_by(key);

    fields
        .iter()
        .filter(|field| **field != key)
        .map(|field| {
            let points = groups
                .iter()
                .filter_map(|(key_value, group)| {
                    Some((
                        key_value.as_f64()?,
                        group.aggregate(Aggregate::Avg, *field).ok()?,
                    ))
                })
                .collect();

            (*field, points)
        })
        .collect()
}

/// ranges covering all points, widened when degenerate so the chart stays drawable
fn bounds(series: &[Series]) -> (Range<f64>, Range<f64>) {
    let points = series.iter().flat_map(|(_, points)| points.iter());
    let (mut x_min, mut x_max, mut y_min, mut y_max) = (f64::MAX, f64::MIN, 0f64, f64::MIN);

    for (x, y) in points {
        x_min = x_min.min(*x);
        x_max = x_max.max(*x);
        y_min = y_min.min(*y);
        y_max = y_max.max(*y);
    }

    if x_min > x_max {
        (x_min, x_max) = (0.0, 1.0);
    } else if x_min == x_max {
        (x_min, x_max) = (x_min - 1.0, x_max + 1.0);
    }

    if y_max <= y_min {
        y_max = y_min + 1.0;
    } else {
        y_max *= 1.1;
    }

    (x_min..x_max, y_min..y_max)
}

pub fn averages(
    stats: &MetricSet,
    path: &Path,
    title: &str,
    key: Field,
    fields: &[Field],
) -> Result<(), ExportError> {
    let series = series(stats, key, fields);
    let (x_range, y_range) = bounds(&series);

    let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc(key.name())
        .y_desc("average")
        .draw()
        .map_err(plot_error)?;

    for (index, (field, points)) in series.into_iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();

        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))
            .map_err(plot_error)?
            .label(field.name())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_error)?;

    root.present().map_err(plot_error)?;

    debug!(path = ?path, "Rendered averages plot");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_of_nothing_are_usable() {
        let (x, y) = bounds(&[]);

        assert_eq!(x, 0.0..1.0);
        assert_eq!(y, 0.0..1.0);
    }

    #[test]
    fn single_key_is_widened() {
        let (x, y) = bounds(&[(Field::Runtime, vec![(4.0, 10.0)])]);

        assert_eq!(x, 3.0..5.0);
        assert_eq!(y.start, 0.0);
        assert!(y.end > 10.0);
    }
}
