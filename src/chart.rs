//! Renders the cumulative issue series as a filled-area chart.
//!
//! Text (title, axis labels, legend) needs a TrueType font registered with plotters. The
//! service loads it at startup; an unlabelled renderer exists for callers that draw without it.

use crate::metrics::MonthlyPoint;
use crate::workbook::Picture;
use anyhow::{anyhow, Context};
use image::{ImageFormat, RgbImage};
use plotters::prelude::*;
use std::io::Cursor;
use std::path::Path;

pub const CHART_TITLE: &str = "Total vs. Closed Issues";

const FONT_FAMILY: &str = "sans-serif";

const TOTAL_COLOR: RGBColor = RGBColor(0x41, 0x85, 0xf4);
const CLOSED_COLOR: RGBColor = RGBColor(0xea, 0x44, 0x35);
const BACKGROUND: RGBColor = RGBColor(0xf0, 0xf0, 0xf0);
const GRID_COLOR: RGBColor = RGBColor(0xcb, 0xcb, 0xcb);

/// Figure size in inches.
const FIGURE_SIZE: (u32, u32) = (9, 6);
/// Resolution the figure is exported at.
pub const EXPORT_DPI: u32 = 80;

const MAX_X_LABELS: usize = 12;

#[derive(Debug, Clone)]
pub struct ChartRenderer {
    labelled: bool,
}

impl ChartRenderer {
    /// A renderer that draws the chart without any text.
    pub fn unlabelled() -> Self {
        Self { labelled: false }
    }

    /// Registers the font at `font_path` with plotters and returns a renderer that uses it.
    pub fn with_font(font_path: &Path) -> anyhow::Result<Self> {
        register_font(font_path)?;
        tracing::debug!(path = %font_path.display(), "Registered chart font");
        Ok(Self { labelled: true })
    }

    pub fn is_labelled(&self) -> bool {
        self.labelled
    }

    /// Draws the `Total Issues` and `Closed Issues` areas, unstacked, and encodes them as PNG.
    pub fn render(&self, series: &[MonthlyPoint], name: &str) -> anyhow::Result<Picture> {
        let (width, height) = (FIGURE_SIZE.0 * EXPORT_DPI, FIGURE_SIZE.1 * EXPORT_DPI);
        let mut buffer = vec![0u8; (width * height * 3) as usize];

        self.draw(&mut buffer, (width, height), series)?;

        let image = RgbImage::from_raw(width, height, buffer)
            .ok_or_else(|| anyhow!("chart buffer does not match {width}x{height}"))?;
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .context("Failed to encode chart as PNG")?;

        Ok(Picture {
            name: name.to_string(),
            png: png.into_inner(),
            width,
            height,
        })
    }

    fn draw(
        &self,
        buffer: &mut [u8],
        size: (u32, u32),
        series: &[MonthlyPoint],
    ) -> anyhow::Result<()> {
        let root = BitMapBackend::with_buffer(buffer, size).into_drawing_area();
        root.fill(&BACKGROUND).map_err(render_error)?;

        let x_end = series.len().saturating_sub(1).max(1);
        let y_peak = series
            .iter()
            .filter_map(|point| point.total.max(point.closed))
            .max()
            .unwrap_or(0);
        let y_end = (y_peak + y_peak / 10).max(1);

        let mut builder = ChartBuilder::on(&root);
        builder.margin(16);
        if self.labelled {
            builder
                .caption(
                    CHART_TITLE,
                    (FONT_FAMILY, 28).into_font().style(FontStyle::Bold),
                )
                .x_label_area_size(40)
                .y_label_area_size(56);
        }
        let mut chart = builder
            .build_cartesian_2d(0usize..x_end, 0u64..y_end)
            .map_err(render_error)?;

        let month_label = |index: &usize| {
            series
                .get(*index)
                .map(|point| point.month.to_string())
                .unwrap_or_default()
        };
        let mut mesh = chart.configure_mesh();
        mesh.light_line_style(BACKGROUND.stroke_width(0))
            .bold_line_style(GRID_COLOR.stroke_width(1));
        if self.labelled {
            mesh.x_labels(series.len().clamp(1, MAX_X_LABELS))
                .x_label_formatter(&month_label)
                .label_style((FONT_FAMILY, 14));
        } else {
            mesh.x_labels(0).y_labels(0);
        }
        mesh.draw().map_err(render_error)?;

        for (label, color, column) in [
            ("Total Issues", TOTAL_COLOR, total_of as fn(&MonthlyPoint) -> Option<u64>),
            ("Closed Issues", CLOSED_COLOR, closed_of),
        ] {
            let points: Vec<(usize, u64)> = series
                .iter()
                .enumerate()
                .filter_map(|(index, point)| column(point).map(|value| (index, value)))
                .collect();
            if points.is_empty() {
                continue;
            }

            chart
                .draw_series(
                    AreaSeries::new(points, 0, color.mix(0.5).filled())
                        .border_style(color.stroke_width(2)),
                )
                .map_err(render_error)?
                .label(label)
                .legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 12, y + 5)], color.filled())
                });
        }

        if self.labelled && !series.is_empty() {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::UpperLeft)
                .label_font((FONT_FAMILY, 14))
                .background_style(WHITE.mix(0.8).filled())
                .border_style(GRID_COLOR.stroke_width(1))
                .draw()
                .map_err(render_error)?;
        }

        root.present().map_err(render_error)?;
        Ok(())
    }
}

fn register_font(font_path: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(font_path)
        .with_context(|| format!("Failed to read font file {}", font_path.display()))?;
    // plotters keeps registered fonts for the life of the process.
    let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());

    for style in [FontStyle::Normal, FontStyle::Bold] {
        plotters::style::register_font(FONT_FAMILY, style, bytes)
            .map_err(|_| anyhow!("{} is not a valid TrueType font", font_path.display()))?;
    }
    Ok(())
}

fn total_of(point: &MonthlyPoint) -> Option<u64> {
    point.total
}

fn closed_of(point: &MonthlyPoint) -> Option<u64> {
    point.closed
}

fn render_error<E: std::fmt::Display>(err: E) -> anyhow::Error {
    anyhow!("Failed to render chart: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::YearMonth;

    const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
    const SYSTEM_FONT: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";

    fn series() -> Vec<MonthlyPoint> {
        vec![
            MonthlyPoint {
                month: YearMonth { year: 2024, month: 1 },
                total: Some(3),
                closed: None,
            },
            MonthlyPoint {
                month: YearMonth { year: 2024, month: 2 },
                total: Some(5),
                closed: Some(1),
            },
            MonthlyPoint {
                month: YearMonth { year: 2024, month: 3 },
                total: Some(5),
                closed: Some(4),
            },
        ]
    }

    #[test]
    fn test_render_produces_png_of_figure_size() {
        let picture = ChartRenderer::unlabelled()
            .render(&series(), "time_series")
            .unwrap();

        assert_eq!(picture.name, "time_series");
        assert_eq!((picture.width, picture.height), (720, 480));
        assert_eq!(picture.png[..8], PNG_SIGNATURE);
    }

    #[test]
    fn test_render_empty_series() {
        let picture = ChartRenderer::unlabelled().render(&[], "time_series").unwrap();
        assert_eq!(picture.png[..8], PNG_SIGNATURE);
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let err = ChartRenderer::with_font(Path::new("/nonexistent/font.ttf")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/font.ttf"));
    }

    #[test]
    fn test_invalid_font_is_an_error() {
        let path = std::env::temp_dir().join("issue-dashboard-not-a-font.ttf");
        std::fs::write(&path, b"not a font").unwrap();

        let result = ChartRenderer::with_font(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_render_with_system_font() {
        if !Path::new(SYSTEM_FONT).exists() {
            eprintln!("Skipping test: font {SYSTEM_FONT} not found");
            return;
        }

        let renderer = ChartRenderer::with_font(Path::new(SYSTEM_FONT)).unwrap();
        assert!(renderer.is_labelled());
        let picture = renderer.render(&series(), "time_series").unwrap();
        assert_eq!(picture.png[..8], PNG_SIGNATURE);
    }
}
