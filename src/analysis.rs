//! Numbers behind the error, Gaussian and histogram charts: linear fits,
//! rescaling, truncation and per-distance statistics.

use crate::config::{PlotInfo, TestInfo};
use crate::distance_map::{mean, DistanceKey, DistanceMap};

use chrono::{DateTime, Local};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

/// Least squares fit of mean measured distance against actual distance,
/// `measured = m * actual + b`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearFit {
    /// Slope
    pub m: f64,
    /// Intercept, in cm
    pub b: f64,
    /// One standard deviation of `m` and `b`, when there are enough points
    /// to estimate it
    pub sigma: Option<(f64, f64)>,
    /// Actual distances the fit went through
    pub actual_dist: Vec<f64>,
    /// The fit line evaluated at `actual_dist`
    pub ref_dist: Vec<f64>,
}

impl LinearFit {
    /// Where the fit line says `actual` should have been measured.
    pub fn predict(&self, actual: f64) -> f64 {
        self.m * actual + self.b
    }
}

/// Fit a line through the per-distance averages. A distance of 0 cm is
/// nudged to 0.1 cm. Returns `None` with fewer than two distinct distances.
pub fn linear_curve_fit(dist_map: &DistanceMap) -> Option<LinearFit> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = dist_map
        .iter()
        .filter_map(|(key, samples)| {
            let x = match key.cm() {
                0 => 0.1,
                cm => cm as f64,
            };
            mean(samples).map(|y| (x, y))
        })
        .unzip();

    let n = xs.len() as f64;
    if xs.len() < 2 {
        return None;
    }

    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(&ys)
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();

    if sxx == 0.0 {
        return None;
    }

    let m = sxy / sxx;
    let b = y_mean - m * x_mean;

    let sigma = if xs.len() > 2 {
        let ssr: f64 = xs
            .iter()
            .zip(&ys)
            .map(|(x, y)| (y - (m * x + b)).powi(2))
            .sum();
        let s2 = ssr / (n - 2.0);
        let sum_x2: f64 = xs.iter().map(|x| x * x).sum();
        Some(((s2 / sxx).sqrt(), (s2 * sum_x2 / (n * sxx)).sqrt()))
    } else {
        None
    };

    let ref_dist = xs.iter().map(|x| m * x + b).collect();

    Some(LinearFit {
        m,
        b,
        sigma,
        actual_dist: xs,
        ref_dist,
    })
}

/// Map a value measured on `y = mx + b` back onto `y = x`.
pub fn scale_linear_value(value: f64, m: f64, b: f64) -> f64 {
    (value - b) / m
}

/// [`scale_linear_value`] over every sample.
pub fn scale_linear_data(dist_map: &DistanceMap, m: f64, b: f64) -> DistanceMap {
    dist_map
        .iter()
        .map(|(key, samples)| {
            let scaled = samples
                .iter()
                .map(|&s| scale_linear_value(s, m, b))
                .collect();
            (*key, scaled)
        })
        .collect()
}

/// Which way [`base_round`] rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Halves away from zero
    Nearest,
    /// Up
    Ceil,
    /// Down
    Floor,
}

/// Round `value` to a multiple of `base`.
pub fn base_round(value: f64, base: u32, method: Rounding) -> i64 {
    let base = base.max(1) as f64;
    let q = value / base;
    let q = match method {
        Rounding::Nearest => q.round(),
        Rounding::Ceil => q.ceil(),
        Rounding::Floor => q.floor(),
    };
    (base * q) as i64
}

/// Keep only the distances inside the truncation window, rounded inwards to
/// the step size. The returned settings carry the narrowed start and stop.
pub fn truncate_data(
    dist_map: &DistanceMap,
    info: &TestInfo,
    plot: &PlotInfo,
) -> (DistanceMap, TestInfo) {
    let start = base_round(plot.min_trunc_dist as f64, info.step_dist, Rounding::Ceil);
    let stop = base_round(plot.max_trunc_dist as f64, info.step_dist, Rounding::Floor);

    let truncated = dist_map
        .iter()
        .filter(|(key, _)| (start..=stop).contains(&(key.cm() as i64)))
        .map(|(key, samples)| (*key, samples.clone()))
        .collect();

    let narrowed = TestInfo {
        start_dist: start.max(0) as u32,
        stop_dist: stop.max(0) as u32,
        ..info.clone()
    };

    (truncated, narrowed)
}

/// Mean and population standard deviation of a set of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalFit {
    /// Mean
    pub mu: f64,
    /// Standard deviation
    pub sigma: f64,
}

/// Fit a normal distribution, `None` for no samples.
pub fn normal_fit(samples: &[f64]) -> Option<NormalFit> {
    let mu = mean(samples)?;
    let var = samples.iter().map(|s| (s - mu).powi(2)).sum::<f64>() / samples.len() as f64;
    Some(NormalFit {
        mu,
        sigma: var.sqrt(),
    })
}

/// Counts per bin. Bins start at the smallest sample and are `width` wide;
/// every bin is half open except the last, which includes its right edge.
/// Samples beyond the last edge are not counted.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Left edge of every bin, then the right edge of the last
    pub edges: Vec<f64>,
    /// Samples per bin
    pub counts: Vec<usize>,
}

/// Bin `samples`, `None` when fewer than two edges come out.
pub fn histogram(samples: &[f64], width: f64) -> Option<Histogram> {
    if !(width > 0.0) || samples.is_empty() {
        return None;
    }

    let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    let n_edges = ((max - min) / width).ceil() as usize;
    let edges: Vec<f64> = (0..n_edges).map(|i| min + i as f64 * width).collect();
    if edges.len() < 2 {
        return None;
    }

    let last_edge = edges[edges.len() - 1];
    let mut counts = vec![0; edges.len() - 1];
    for &s in samples {
        if s > last_edge {
            continue;
        }
        let idx = (((s - min) / width) as usize).min(counts.len() - 1);
        counts[idx] += 1;
    }

    Some(Histogram { edges, counts })
}

/// Split milliseconds into hours, minutes, seconds and milliseconds.
pub fn convert_time(millis: f64) -> (u64, u64, u64, u64) {
    let millis = millis.max(0.0) as u64;
    let hours = (millis / 3_600_000) % 24;
    let minutes = (millis / 60_000) % 60;
    let seconds = (millis / 1000) % 60;
    (hours, minutes, seconds, millis % 1000)
}

/// `HH:MM:SS.mmm`
pub fn format_remaining(millis: f64) -> String {
    let (h, m, s, ms) = convert_time(millis);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

/// One distance worth of statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    /// Actual distance, in cm
    pub actual: u32,
    /// Average measured distance, in cm
    pub mean: f64,
    /// `mean - actual`
    pub error: f64,
    /// Left out when every sample was identical
    pub normal: Option<NormalFit>,
    /// Left out when histograms were not asked for
    pub histogram: Option<Histogram>,
}

/// Everything that goes into the error and Gaussian charts of one device.
#[derive(Debug, Clone)]
pub struct DistanceReport {
    /// Chart title naming the step size, device and any rescaling
    pub title: String,
    /// Settings of the run, narrowed when truncated
    pub info: TestInfo,
    /// Fit through the averages, before any rescaling
    pub fit: Option<LinearFit>,
    /// Whether the rows were mapped onto `y = x` with `fit`
    pub scaled: bool,
    /// One row per distance, in order
    pub rows: Vec<ReportRow>,
}

impl DistanceReport {
    /// Run the whole analysis the way `plot` asks for it.
    pub fn build(dist_map: &DistanceMap, info: &TestInfo, plot: &PlotInfo) -> Self {
        let (dist_map, info) = if plot.truncate_data {
            truncate_data(dist_map, info, plot)
        } else {
            (dist_map.clone(), info.clone())
        };

        let fit = if plot.make_ref_plot {
            linear_curve_fit(&dist_map)
        } else {
            None
        };

        let mut bin_width = plot.hist_bin_width;
        let (dist_map, scaled) = match (&fit, plot.scale_data) {
            (Some(fit), true) => {
                bin_width = plot.hist_bin_width / fit.m;
                if bin_width < 0.0 {
                    bin_width = 1.0;
                }
                (scale_linear_data(&dist_map, fit.m, fit.b), true)
            }
            _ => (dist_map, false),
        };

        let rows = dist_map
            .iter()
            .filter_map(|(key, samples)| {
                let avg = mean(samples)?;
                let normal = normal_fit(samples).filter(|n| n.sigma != 0.0 && plot.make_gauss_plot);
                let histogram = if plot.make_hist_plot {
                    histogram(samples, bin_width)
                } else {
                    None
                };
                Some(ReportRow {
                    actual: key.cm(),
                    mean: avg,
                    error: avg - key.cm() as f64,
                    normal,
                    histogram,
                })
            })
            .collect();

        let device = info
            .device
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown device".to_owned());
        let mut title = format!(
            "Calculated distance vs. actual distance moving in {} cm steps for {}",
            info.step_dist, device
        );
        if let (true, Some(fit)) = (scaled, &fit) {
            title.push_str(&format!(" scaled to y={:.2}x{:+.2}", fit.m, fit.b));
        }

        Self {
            title,
            info,
            fit,
            scaled,
            rows,
        }
    }

    /// The row for `distance`, if it survived truncation.
    pub fn get(&self, distance: DistanceKey) -> Option<&ReportRow> {
        self.rows.iter().find(|r| r.actual == distance.cm())
    }

    /// Stem for files produced from this report, e.g.
    /// `DW1000_anchor_distMeas_errorPlot_scaled_(2017-08-09_14-57-00)`.
    pub fn file_stem(&self, kind: &str, timestamp: &DateTime<Local>) -> String {
        let device = self
            .info
            .device
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".to_owned());
        let scaled = if self.scaled { "_scaled" } else { "" };
        format!(
            "DW1000_{}_{}_{}{}_{}",
            device,
            self.info.test_type,
            kind,
            scaled,
            timestamp.format("(%Y-%m-%d_%H-%M-%S)")
        )
    }

    /// Write the text report to `<stem>.txt` in `dir`, returning the path.
    pub fn save_in(&self, dir: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = dir
            .as_ref()
            .join(format!("{}.txt", self.file_stem("errorReport", &Local::now())));
        fs::write(&path, self.to_string())?;
        Ok(path)
    }
}

impl fmt::Display for DistanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        if let Some(fit) = &self.fit {
            writeln!(f, "curve fit: y={:.2}x{:+.2}", fit.m, fit.b)?;
        }
        writeln!(
            f,
            "{:>8} {:>10} {:>9} {:>9} {:>9}",
            "actual", "measured", "error", "mu", "sigma"
        )?;
        for row in &self.rows {
            let (mu, sigma) = row
                .normal
                .map(|n| (format!("{:.2}", n.mu), format!("{:.2}", n.sigma)))
                .unwrap_or_else(|| ("-".to_owned(), "-".to_owned()));
            writeln!(
                f,
                "{:>8} {:>10.2} {:>9.2} {:>9} {:>9}",
                row.actual, row.mean, row.error, mu, sigma
            )?;
        }
        for row in &self.rows {
            if let Some(hist) = &row.histogram {
                let counts: Vec<String> = hist.counts.iter().map(|c| c.to_string()).collect();
                let width = hist.edges.get(1).map(|e| e - hist.edges[0]).unwrap_or_default();
                writeln!(
                    f,
                    "{:>6} cm histogram from {:.2} by {:.2}: [{}]",
                    row.actual,
                    hist.edges[0],
                    width,
                    counts.join(" ")
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_map(m: f64, b: f64) -> DistanceMap {
        [10, 20, 30, 40]
            .into_iter()
            .map(|d| {
                let y = m * d as f64 + b;
                (DistanceKey(d), vec![y - 1.0, y, y + 1.0])
            })
            .collect()
    }

    #[test]
    fn fit_recovers_a_line() {
        let fit = linear_curve_fit(&linear_map(1.2, -3.0)).unwrap();
        assert!((fit.m - 1.2).abs() < 1e-9);
        assert!((fit.b + 3.0).abs() < 1e-9);
        let (sm, sb) = fit.sigma.unwrap();
        assert!(sm < 1e-6 && sb < 1e-6);
        assert!((fit.ref_dist[0] - 9.0).abs() < 1e-9);
    }

    #[test]
    fn fit_needs_two_distances() {
        let mut map = DistanceMap::new();
        map.insert(DistanceKey(10), vec![10.0]);
        assert!(linear_curve_fit(&map).is_none());
    }

    #[test]
    fn zero_distance_is_nudged() {
        let mut map = DistanceMap::new();
        map.insert(DistanceKey(0), vec![0.1]);
        map.insert(DistanceKey(10), vec![10.0]);
        let fit = linear_curve_fit(&map).unwrap();
        assert_eq!(fit.actual_dist, vec![0.1, 10.0]);
        assert!((fit.m - 1.0).abs() < 1e-9);
        assert!(fit.sigma.is_none());
    }

    #[test]
    fn scaling_undoes_the_fit() {
        let map = linear_map(2.0, 5.0);
        let scaled = scale_linear_data(&map, 2.0, 5.0);
        assert_eq!(mean(&scaled[&DistanceKey(20)]), Some(20.0));
    }

    #[test]
    fn rounding_to_steps() {
        assert_eq!(base_round(7.0, 5, Rounding::Ceil), 10);
        assert_eq!(base_round(7.0, 5, Rounding::Floor), 5);
        assert_eq!(base_round(7.0, 5, Rounding::Nearest), 5);
        assert_eq!(base_round(8.0, 5, Rounding::Nearest), 10);
    }

    #[test]
    fn truncation_narrows_the_window() {
        let info = TestInfo {
            start_dist: 10,
            stop_dist: 40,
            step_dist: 10,
            ..Default::default()
        };
        let plot = PlotInfo {
            min_trunc_dist: 15,
            max_trunc_dist: 35,
            ..Default::default()
        };
        let (map, info) = truncate_data(&linear_map(1.0, 0.0), &info, &plot);
        assert_eq!(map.keys().map(|k| k.cm()).collect::<Vec<_>>(), vec![20, 30]);
        assert_eq!((info.start_dist, info.stop_dist), (20, 30));
    }

    #[test]
    fn normal_fit_is_population() {
        let n = normal_fit(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(n.mu, 5.0);
        assert_eq!(n.sigma, 2.0);
        assert!(normal_fit(&[]).is_none());
    }

    #[test]
    fn histogram_drops_the_tail_past_the_last_edge() {
        let h = histogram(&[1.0, 1.5, 2.0, 2.5, 3.0, 3.5], 1.0).unwrap();
        assert_eq!(h.edges, vec![1.0, 2.0, 3.0]);
        assert_eq!(h.counts, vec![2, 3]);
    }

    #[test]
    fn histogram_of_a_flat_run_is_none() {
        assert!(histogram(&[4.0, 4.0], 1.0).is_none());
        assert!(histogram(&[1.0, 5.0], 0.0).is_none());
    }

    #[test]
    fn remaining_time_format() {
        assert_eq!(format_remaining(3_723_004.0), "01:02:03.004");
        assert_eq!(format_remaining(-5.0), "00:00:00.000");
    }

    #[test]
    fn report_lists_every_distance() {
        let info = TestInfo {
            start_dist: 10,
            stop_dist: 40,
            step_dist: 10,
            device: Some(crate::config::Device::Tag),
            ..Default::default()
        };
        let plot = PlotInfo {
            scale_data: true,
            ..Default::default()
        };
        let report = DistanceReport::build(&linear_map(1.1, 2.0), &info, &plot);
        assert!(report.scaled);
        assert_eq!(report.rows.len(), 4);
        let row = report.get(DistanceKey(30)).unwrap();
        assert!(row.error.abs() < 1e-9);
        assert!(report.title.contains("for tag scaled to y=1.10x+2.00"));
        assert!(report.to_string().contains("curve fit"));
        assert!(report.to_string().contains("30 cm histogram from"));
    }

    fn tag_report(scale_data: bool) -> DistanceReport {
        let info = TestInfo {
            test_type: crate::config::TestType::DistMeas,
            start_dist: 10,
            stop_dist: 40,
            step_dist: 10,
            device: Some(crate::config::Device::Tag),
            ..Default::default()
        };
        let plot = PlotInfo {
            scale_data,
            ..Default::default()
        };
        DistanceReport::build(&linear_map(1.1, 2.0), &info, &plot)
    }

    #[test]
    fn stems_name_device_type_kind_and_time() {
        use chrono::TimeZone;
        let ts = Local.with_ymd_and_hms(2017, 8, 9, 14, 57, 0).unwrap();
        assert_eq!(
            tag_report(true).file_stem("errorPlot", &ts),
            "DW1000_tag_distMeas_errorPlot_scaled_(2017-08-09_14-57-00)"
        );
        assert_eq!(
            tag_report(false).file_stem("gaussPlot", &ts),
            "DW1000_tag_distMeas_gaussPlot_(2017-08-09_14-57-00)"
        );
    }

    #[test]
    fn report_is_saved_under_its_stem() {
        let dir = tempfile::tempdir().unwrap();
        let report = tag_report(false);
        let path = report.save_in(dir.path()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("DW1000_tag_distMeas_errorReport_("));
        assert!(name.ends_with(").txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), report.to_string());
    }
}
