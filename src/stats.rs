/// Collects finite samples and reports their mean and median.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    vals: Vec<f64>,
}

impl Sample {
    pub fn new() -> Self {
        Self { vals: Vec::new() }
    }

    pub fn add(&mut self, v: f64) {
        if v.is_finite() {
            self.vals.push(v);
        }
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.vals.is_empty() {
            None
        } else {
            Some(self.vals.iter().sum::<f64>() / self.vals.len() as f64)
        }
    }

    /// Even-sized samples average the two middle values.
    pub fn median(&self) -> Option<f64> {
        if self.vals.is_empty() {
            return None;
        }
        let mut sorted = self.vals.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }
}

impl FromIterator<f64> for Sample {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut s = Sample::new();
        for v in iter {
            s.add(v);
        }
        s
    }
}

/// Percent change from `prev` to `cur`; undefined for a zero or missing base.
pub fn pct_change(cur: f64, prev: f64) -> Option<f64> {
    if !cur.is_finite() || !prev.is_finite() || prev == 0.0 {
        None
    } else {
        Some((cur - prev) / prev * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_even() {
        let s: Sample = vec![3.0, 1.0, 2.0].into_iter().collect();
        assert_eq!(s.median(), Some(2.0));
        let s: Sample = vec![4.0, 1.0, 3.0, 2.0].into_iter().collect();
        assert_eq!(s.median(), Some(2.5));
    }

    #[test]
    fn skips_non_finite() {
        let s: Sample = vec![1.0, f64::NAN, 3.0, f64::INFINITY].into_iter().collect();
        assert_eq!(s.len(), 2);
        assert_eq!(s.mean(), Some(2.0));
    }

    #[test]
    fn empty_has_no_stats() {
        let s = Sample::new();
        assert!(s.is_empty());
        assert_eq!(s.mean(), None);
        assert_eq!(s.median(), None);
    }

    #[test]
    fn change() {
        let up = pct_change(110.0, 100.0).unwrap();
        assert!((up - 10.0).abs() < 1e-9);
        let down = pct_change(90.0, 100.0).unwrap();
        assert!((down + 10.0).abs() < 1e-9);
        assert_eq!(pct_change(5.0, 0.0), None);
        assert_eq!(pct_change(5.0, f64::NAN), None);
    }
}
