//! C5: Aggregator. Per-thread sample histograms and the final human-readable
//! report, per spec.md §4.5.

use std::collections::HashMap;

/// One resolved function's share of a thread's samples in the final report.
pub struct FunctionReport {
    pub function_name: String,
    pub sample_count: u64,
    pub cycles: u64,
    pub percentage: f64,
}

/// One thread's report: its id and its functions sorted by sample count
/// descending, ties broken by name ascending for determinism.
pub struct ThreadReport {
    pub tid: u32,
    pub total_samples: u64,
    pub functions: Vec<FunctionReport>,
}

/// The full report across every thread that was sampled.
pub struct Report {
    pub threads: Vec<ThreadReport>,
    pub global_total: u64,
}

#[derive(Default)]
struct ThreadHistogram {
    counts: HashMap<String, u64>,
    total: u64,
}

/// Accumulates `(tid, function_name)` samples and renders them into a
/// [`Report`] at the end of a profiling run.
pub struct Aggregator {
    sample_period: u64,
    histograms: HashMap<u32, ThreadHistogram>,
    global_total: u64,
}

impl Aggregator {
    pub fn new(sample_period: u64) -> Self {
        Aggregator { sample_period, histograms: HashMap::new(), global_total: 0 }
    }

    pub fn record_sample(&mut self, tid: u32, function_name: &str) {
        let histogram = self.histograms.entry(tid).or_default();
        *histogram.counts.entry(function_name.to_owned()).or_insert(0) += 1;
        histogram.total += 1;
        self.global_total += 1;
    }

    /// Renders the accumulated histograms into a sorted [`Report`]. Consumes
    /// nothing; callers may keep sampling after calling this.
    pub fn report(&self) -> Report {
        let mut threads: Vec<ThreadReport> = self
            .histograms
            .iter()
            .map(|(&tid, histogram)| {
                let mut functions: Vec<FunctionReport> = histogram
                    .counts
                    .iter()
                    .map(|(name, &count)| FunctionReport {
                        function_name: name.clone(),
                        sample_count: count,
                        cycles: count * self.sample_period,
                        percentage: if histogram.total == 0 {
                            0.0
                        } else {
                            100.0 * count as f64 / histogram.total as f64
                        },
                    })
                    .collect();
                functions.sort_by(|a, b| {
                    b.sample_count
                        .cmp(&a.sample_count)
                        .then_with(|| a.function_name.cmp(&b.function_name))
                });
                ThreadReport { tid, total_samples: histogram.total, functions }
            })
            .collect();
        threads.sort_by_key(|t| t.tid);

        Report { threads, global_total: self.global_total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_by_count_descending_then_name_ascending() {
        let mut agg = Aggregator::new(1000);
        agg.record_sample(1, "b");
        agg.record_sample(1, "a");
        agg.record_sample(1, "a");
        agg.record_sample(1, "c");
        agg.record_sample(1, "c");

        let report = agg.report();
        let names: Vec<&str> =
            report.threads[0].functions.iter().map(|f| f.function_name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
    }

    #[test]
    fn invariant_sums_match_totals_and_global() {
        let mut agg = Aggregator::new(500);
        agg.record_sample(1, "f");
        agg.record_sample(1, "g");
        agg.record_sample(2, "h");

        let report = agg.report();
        for thread in &report.threads {
            let sum: u64 = thread.functions.iter().map(|f| f.sample_count).sum();
            assert_eq!(sum, thread.total_samples);
        }
        let global_sum: u64 = report.threads.iter().map(|t| t.total_samples).sum();
        assert_eq!(global_sum, report.global_total);
    }

    #[test]
    fn cycles_and_percentage_are_derived_correctly() {
        let mut agg = Aggregator::new(2000);
        agg.record_sample(1, "f");
        agg.record_sample(1, "f");
        agg.record_sample(1, "g");

        let report = agg.report();
        let f = report.threads[0].functions.iter().find(|x| x.function_name == "f").unwrap();
        assert_eq!(f.sample_count, 2);
        assert_eq!(f.cycles, 4000);
        assert!((f.percentage - (200.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn empty_aggregator_reports_no_threads() {
        let agg = Aggregator::new(1000);
        let report = agg.report();
        assert!(report.threads.is_empty());
        assert_eq!(report.global_total, 0);
    }
}
