#![forbid(unsafe_code)]

use crate::domain::Pid;
use crate::series::SeriesSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Process(Pid),
    Total,
    /// Total minus the first total.
    Delta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartLine {
    pub kind: LineKind,
    pub label: String,
    /// `(seconds since the earliest sample, MB)` pairs.
    pub points: Vec<(f64, f64)>,
}

/// Renderer-independent chart of a series set.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartModel {
    pub title: String,
    pub lines: Vec<ChartLine>,
    pub duration_secs: f64,
    pub y_bounds: (f64, f64),
}

impl ChartModel {
    /// Build the chart for `series`. `None` when nothing has been sampled.
    ///
    /// With more than one process, a total line (nearest-sample sum at every
    /// distinct timestamp) and its delta from the first total are added once
    /// there are at least two points.
    pub fn build(series: &SeriesSet, title: &str) -> Option<Self> {
        let origin = series.earliest()?;
        let end = series.latest().unwrap_or(origin);

        let mut lines: Vec<ChartLine> = series
            .recorded()
            .map(|(pid, s)| ChartLine {
                kind: LineKind::Process(pid),
                label: format!("{} (pid {pid})", s.name()),
                points: s
                    .samples()
                    .iter()
                    .map(|sample| (sample.timestamp - origin, sample.memory_mb))
                    .collect(),
            })
            .collect();

        if lines.len() > 1 {
            let totals: Vec<(f64, f64)> = series
                .merged_rows()
                .iter()
                .map(|row| (row.timestamp - origin, row.total()))
                .collect();
            if totals.len() > 1 {
                let base = totals[0].1;
                let deltas = totals.iter().map(|(t, total)| (*t, total - base)).collect();
                lines.push(ChartLine {
                    kind: LineKind::Total,
                    label: "total".to_string(),
                    points: totals,
                });
                lines.push(ChartLine {
                    kind: LineKind::Delta,
                    label: "change".to_string(),
                    points: deltas,
                });
            }
        }

        let (lo, hi) = lines
            .iter()
            .flat_map(|line| line.points.iter().map(|(_, y)| *y))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| {
                (lo.min(y), hi.max(y))
            });
        let pad = ((hi - lo) * 0.05).max(1.0);
        let floor = if lo < 0.0 { lo - pad } else { 0.0 };

        Some(Self {
            title: title.to_string(),
            lines,
            duration_secs: end - origin,
            y_bounds: (floor, hi + pad),
        })
    }

    /// `count` evenly spaced x-axis labels from 0 to the duration.
    pub fn x_labels(&self, count: usize) -> Vec<String> {
        let count = count.max(2);
        let span = self.duration_secs;
        (0..count)
            .map(|i| format_tick(span * i as f64 / (count - 1) as f64, span))
            .collect()
    }
}

/// Axis tick text: one decimal for windows shorter than ten seconds, whole
/// seconds otherwise.
pub fn format_tick(seconds: f64, duration: f64) -> String {
    if duration < 10.0 {
        format!("{seconds:.1}")
    } else {
        format!("{seconds:.0}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Sample;

    fn set(data: Vec<(Pid, Vec<(f64, f64)>)>) -> SeriesSet {
        let mut set = SeriesSet::default();
        for (pid, points) in data {
            let series = set.open(pid, &format!("p{pid}"));
            for (t, mb) in points {
                series.push(Sample::new(pid, t, mb));
            }
        }
        set
    }

    #[test]
    fn empty_series_has_no_chart() {
        assert!(ChartModel::build(&SeriesSet::default(), "op").is_none());
    }

    #[test]
    fn single_process_has_no_total_line() {
        let chart = ChartModel::build(&set(vec![(1, vec![(100.0, 5.0), (101.0, 6.0)])]), "op")
            .unwrap();
        assert_eq!(chart.lines.len(), 1);
        assert_eq!(chart.lines[0].points, vec![(0.0, 5.0), (1.0, 6.0)]);
        assert_eq!(chart.duration_secs, 1.0);
    }

    #[test]
    fn multiple_processes_add_total_and_delta() {
        let chart = ChartModel::build(
            &set(vec![
                (1, vec![(10.0, 50.0), (11.0, 55.0)]),
                (2, vec![(10.0, 20.0), (11.0, 22.0)]),
            ]),
            "op",
        )
        .unwrap();

        let total = chart.lines.iter().find(|l| l.kind == LineKind::Total).unwrap();
        assert_eq!(total.points, vec![(0.0, 70.0), (1.0, 77.0)]);
        let delta = chart.lines.iter().find(|l| l.kind == LineKind::Delta).unwrap();
        assert_eq!(delta.points, vec![(0.0, 0.0), (1.0, 7.0)]);
    }

    #[test]
    fn tick_precision_depends_on_duration() {
        assert_eq!(format_tick(2.24, 9.9), "2.2");
        assert_eq!(format_tick(12.6, 30.0), "13");

        let chart = ChartModel::build(&set(vec![(1, vec![(0.0, 1.0), (4.0, 1.0)])]), "op")
            .unwrap();
        assert_eq!(chart.x_labels(3), vec!["0.0", "2.0", "4.0"]);
    }
}
