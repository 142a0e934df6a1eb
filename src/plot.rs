use std::ops::Range;
use std::path::Path;

use ndarray::{s, Array2, Axis};
use ndarray_stats::QuantileExt;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::embedding::Embeddings;
use crate::error::{Error, Result};
use crate::projection::Projector;
use crate::reduce::symmetric_eigen;

const SIZE: (u32, u32) = (640, 640);
const MARGIN: u32 = 15;
const FONT_STYLE: (&str, i32) = ("sans-serif", 15);
const LABEL_STYLE: (&str, i32) = ("sans-serif", 18);

/// How embeddings wider than two dimensions are laid out on the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TwoDimProjection {
    /// the first two embedding dimensions as they are
    #[default]
    FirstTwo,
    /// the two principal components of the plotted rows
    Pca,
}

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Scatter plot of `words` in two dimensions, saved as svg. Words missing
/// from the vocabulary are skipped.
pub fn draw_tokens_2d(embeddings: &Embeddings, words: &[String], projection: TwoDimProjection, save_to: &Path) -> Result<()> {
    let mut tokens: Vec<&str> = Vec::new();
    let mut rows: Vec<usize> = Vec::new();
    for word in words {
        match embeddings.index_of(word) {
            Ok(i) => {
                tokens.push(word);
                rows.push(i);
            }
            Err(e) => warn!("not plotting '{}': {}", word, e),
        }
    }
    if tokens.is_empty() {
        return Err(Error::Plot("none of the words to plot are in the vocabulary".to_string()));
    }

    let w = embeddings.vectors().select(Axis(0), &rows);
    let points = two_dim_projection(projection, &w)?;

    let x_spec = padded_range(points.column(0).min().map_err(plot_err)?, points.column(0).max().map_err(plot_err)?);
    let y_spec = padded_range(points.column(1).min().map_err(plot_err)?, points.column(1).max().map_err(plot_err)?);

    let root_area = SVGBackend::new(save_to, SIZE).into_drawing_area();
    root_area.fill(&WHITE).map_err(plot_err)?;

    let chart = ChartBuilder::on(&root_area)
        .margin(MARGIN)
        .build_cartesian_2d(x_spec, y_spec)
        .map_err(plot_err)?;

    let text_style = TextStyle::from(FONT_STYLE).color(&BLACK).pos(Pos::new(HPos::Left, VPos::Center));
    for (token, point) in tokens.iter().zip(points.outer_iter()) {
        let marker = EmptyElement::at((point[0], point[1]))
            + Cross::new((0, 0), 4, RED.stroke_width(2))
            + Text::new(token.to_string(), (8, 0), text_style.clone());
        chart.plotting_area().draw(&marker).map_err(plot_err)?;
    }

    root_area.present().map_err(plot_err)?;
    info!("plotted {} words to {}", tokens.len(), save_to.display());
    Ok(())
}

/// Places the saved projections along the axis, the axis words sit on the
/// middle line at their own projections.
pub fn draw_projections(projector: &Projector, save_to: &Path) -> Result<()> {
    let (words, projections) = projector
        .saved()
        .ok_or_else(|| Error::Plot("no saved projections, call project_words with save first".to_string()))?;
    let (first, second) = projector.axis_labels().ok_or(Error::AxisNotSet)?;
    let (first_end, second_end) = projector.endpoints()?;

    let lo = projections.iter().copied().fold(first_end.min(second_end), f32::min);
    let hi = projections.iter().copied().fold(first_end.max(second_end), f32::max);

    let root_area = SVGBackend::new(save_to, (960, 480)).into_drawing_area();
    root_area.fill(&WHITE).map_err(plot_err)?;

    let chart = ChartBuilder::on(&root_area)
        .margin(MARGIN)
        .build_cartesian_2d(padded_range(&lo, &hi), 0.0_f32..1.0_f32)
        .map_err(plot_err)?;

    let text_style = TextStyle::from(FONT_STYLE).color(&BLACK).pos(Pos::new(HPos::Center, VPos::Bottom));
    let label_style = TextStyle::from(LABEL_STYLE).color(&BLUE).pos(Pos::new(HPos::Center, VPos::Top));

    chart
        .plotting_area()
        .draw(&PathElement::new(vec![(second_end, 0.5), (first_end, 0.5)], BLUE.stroke_width(1)))
        .map_err(plot_err)?;
    for (label, x) in [(first, first_end), (second, second_end)] {
        let marker = EmptyElement::at((x, 0.5_f32))
            + Circle::new((0, 0), 4, BLUE.filled())
            + Text::new(label.to_string(), (0, 8), label_style.clone());
        chart.plotting_area().draw(&marker).map_err(plot_err)?;
    }

    let n = words.len();
    for (i, (word, &x)) in words.iter().zip(projections.iter()).enumerate() {
        let y = (i + 1) as f32 / (n + 2) as f32;
        let marker = EmptyElement::at((x, y))
            + Circle::new((0, 0), 3, BLACK.filled())
            + Text::new(word.to_string(), (0, -6), text_style.clone());
        chart.plotting_area().draw(&marker).map_err(plot_err)?;
    }

    root_area.present().map_err(plot_err)?;
    info!("plotted {} projections onto {} - {} to {}", n, first, second, save_to.display());
    Ok(())
}

/// Reduces the rows of `w` to two columns for plotting.
pub fn two_dim_projection(p_type: TwoDimProjection, w: &Array2<f32>) -> Result<Array2<f32>> {
    if w.ncols() < 2 {
        return Err(Error::Plot(format!("need at least two dimensions to plot, got {}", w.ncols())));
    }

    match p_type {
        TwoDimProjection::FirstTwo => Ok(w.slice(s![.., 0..2]).to_owned()),
        TwoDimProjection::Pca => {
            // centralizing the rows
            let mut x = w.mapv(f64::from);
            if let Some(means) = x.mean_axis(Axis(0)) {
                x -= &means;
            }

            // the two largest eigenvectors of the covariance
            let cov = x.t().dot(&x) / x.nrows().max(1) as f64;
            let (eigs, vecs) = symmetric_eigen(&cov)?;
            let mut order: Vec<usize> = (0..eigs.len()).collect();
            order.sort_by(|&a, &b| eigs[b].total_cmp(&eigs[a]));
            let largest_vecs = vecs.select(Axis(1), &order[..2]);

            Ok(x.dot(&largest_vecs).mapv(|v| v as f32))
        }
    }
}

fn padded_range(min: &f32, max: &f32) -> Range<f32> {
    let pad = ((max - min) * 0.1).max(0.05);
    (min - pad)..(max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cooccurrence::CooccurrenceMatrix;
    use crate::corpus::{Corpus, SentinelTokenizer};
    use crate::reduce::{DegeneratePolicy, TruncatedSvd};
    use ndarray::array;
    use std::fs;

    fn embeddings(rank: usize) -> Embeddings {
        let corpus = Corpus::from_lines(
            ["i love you", "you love me", "i miss you my love", "sorry for everything"],
            &SentinelTokenizer::default(),
        );
        let matrix = CooccurrenceMatrix::build(&corpus, 4, 1).unwrap();
        Embeddings::from_cooccurrence(&matrix, &TruncatedSvd::new(rank), DegeneratePolicy::Flag).unwrap()
    }

    #[test]
    fn first_two_keeps_leading_columns() {
        let w = array![[1.0_f32, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(two_dim_projection(TwoDimProjection::FirstTwo, &w).unwrap(), array![[1.0_f32, 2.0], [4.0, 5.0]]);
        assert!(two_dim_projection(TwoDimProjection::Pca, &array![[1.0_f32], [2.0]]).is_err());
    }

    #[test]
    fn pca_output_is_centered() {
        let w = array![[1.0_f32, 0.0, 2.0], [0.0, 1.0, 1.0], [3.0, 1.0, 0.0], [2.0, 2.0, 2.0]];
        let p = two_dim_projection(TwoDimProjection::Pca, &w).unwrap();
        assert_eq!(p.dim(), (4, 2));
        for mean in p.mean_axis(Axis(0)).unwrap().iter() {
            assert!(mean.abs() < 1e-5);
        }
    }

    #[test]
    fn pca_keeps_the_dominant_direction_first() {
        // points on a line: all variance lands on the first component
        let w = array![[1.0_f32, 2.0, 0.0], [2.0, 4.0, 0.0], [-1.0, -2.0, 0.0], [3.0, 6.0, 0.0]];
        let p = two_dim_projection(TwoDimProjection::Pca, &w).unwrap();

        // squared deviations of t from its mean 1.25, times |(1, 2, 0)|^2
        let total: f32 = (0.0625 + 0.5625 + 5.0625 + 3.0625) * 5.0;
        let first: f32 = p.column(0).iter().map(|x| x * x).sum();
        let second: f32 = p.column(1).iter().map(|x| x * x).sum();
        assert!((first - total).abs() < 1e-3);
        assert!(second < 1e-6);
    }

    #[test]
    fn writes_token_and_projection_plots() {
        let dir = tempfile::tempdir().unwrap();
        let e = embeddings(3);

        let words: Vec<String> = ["love", "you", "sorry", "not-a-word"].iter().map(|w| w.to_string()).collect();
        let scatter = dir.path().join("tokens.svg");
        draw_tokens_2d(&e, &words, TwoDimProjection::Pca, &scatter).unwrap();
        let svg = fs::read_to_string(&scatter).unwrap();
        assert!(svg.contains("sorry"));
        assert!(!svg.contains("not-a-word"));

        let mut projector = Projector::new(e);
        projector.set_axis("love", "sorry").unwrap();
        projector.project_words(&["i", "you", "me"], true).unwrap();
        let axis_plot = dir.path().join("axis.svg");
        draw_projections(&projector, &axis_plot).unwrap();
        assert!(fs::read_to_string(&axis_plot).unwrap().contains("me"));
    }

    #[test]
    fn projection_plot_needs_saved_projections() {
        let dir = tempfile::tempdir().unwrap();
        let mut projector = Projector::new(embeddings(2));
        projector.set_axis("love", "me").unwrap();
        assert!(matches!(draw_projections(&projector, &dir.path().join("x.svg")), Err(Error::Plot(_))));
    }
}
