//! Streaming reduction of throughput samples into running figures.

/// Running throughput figures after one sample
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpeedReading {
    /// Average over every sample seen so far
    pub average: i64,
    /// Largest sample seen so far
    pub maximum: i64,
    /// The sample that produced this reading
    pub current: i64,
}

/// Per-link reducer over bytes-per-second samples
///
/// The average is recomputed from the full history on every sample as
/// `Σ (sample / n)`, truncating each term. Subscribers compare these exact
/// values, so the per-term truncation is part of the output format.
#[derive(Debug, Default)]
pub struct SpeedAggregator {
    samples: Vec<i64>,
    maximum: i64,
    finished: bool,
}

impl SpeedAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample
    ///
    /// Returns `None` once a negative sample has been seen; the aggregator
    /// stays finished afterwards.
    ///
    /// # Examples
    ///
    /// ```
    /// use linkspeed::aggregator::SpeedAggregator;
    ///
    /// let mut agg = SpeedAggregator::new();
    /// let r = agg.push(100).unwrap();
    /// assert_eq!((r.average, r.maximum, r.current), (100, 100, 100));
    /// let r = agg.push(50).unwrap();
    /// assert_eq!((r.average, r.maximum, r.current), (75, 100, 50));
    /// assert!(agg.push(-1).is_none());
    /// ```
    pub fn push(&mut self, sample: i64) -> Option<SpeedReading> {
        if self.finished || sample < 0 {
            self.finished = true;
            return None;
        }

        self.samples.push(sample);
        if sample > self.maximum {
            self.maximum = sample;
        }

        let n = self.samples.len() as i64;
        let average = self.samples.iter().map(|s| s / n).sum::<i64>();

        Some(SpeedReading {
            average,
            maximum: self.maximum,
            current: sample,
        })
    }

    /// Whether a negative sample terminated this aggregator
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of accepted samples
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_truncates_each_term() {
        let mut agg = SpeedAggregator::new();
        agg.push(5).unwrap();
        agg.push(5).unwrap();
        // 5/3 + 5/3 + 5/3 = 1 + 1 + 1
        let r = agg.push(5).unwrap();
        assert_eq!(r.average, 3);
        assert_eq!(r.maximum, 5);
    }

    #[test]
    fn maximum_is_non_decreasing_and_average_bounded() {
        let samples = [300, 1200, 40, 0, 999, 1200, 7, 50_000, 3];
        let mut agg = SpeedAggregator::new();
        let mut last_max = 0;
        for sample in samples {
            let r = agg.push(sample).unwrap();
            assert!(r.maximum >= last_max);
            assert!(r.average >= 0 && r.average <= r.maximum);
            assert_eq!(r.current, sample);
            last_max = r.maximum;
        }
        assert_eq!(agg.sample_count(), samples.len());
    }

    #[test]
    fn negative_sample_terminates() {
        let mut agg = SpeedAggregator::new();
        agg.push(10).unwrap();
        assert!(agg.push(-5).is_none());
        assert!(agg.is_finished());
        assert!(agg.push(10).is_none());
        assert_eq!(agg.sample_count(), 1);
    }

    #[test]
    fn zero_samples_keep_zero_average() {
        let mut agg = SpeedAggregator::new();
        let r = agg.push(0).unwrap();
        assert_eq!(r, SpeedReading { average: 0, maximum: 0, current: 0 });
    }
}
