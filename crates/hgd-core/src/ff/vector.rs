use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

/// Named feature values. Keys are unique; `add` sums.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: f64) {
        match self.0.get_mut(name) {
            Some(v) => *v += value,
            None => {
                self.0.insert(name.to_string(), value);
            }
        }
    }

    pub fn add_all(&mut self, other: &FeatureVector) {
        for (name, &value) in &other.0 {
            self.add(name, value);
        }
    }

    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> BTreeMap<String, f64> {
        self.0
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut fv = FeatureVector::new();
        for (name, value) in iter {
            fv.add(&name, value);
        }
        fv
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WeightsError {
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Feature weights. Unlisted features weigh zero.
#[derive(Debug, Clone, Default)]
pub struct Weights(HashMap<String, f64>);

impl Weights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `name value` lines; blank lines and `#` comments are skipped.
    pub fn from_text(text: &str) -> Result<Self, WeightsError> {
        let mut weights = Self::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(name), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(WeightsError::Parse {
                    line: n + 1,
                    reason: format!("expected 'name value', got '{line}'"),
                });
            };
            let value: f64 = value.parse().map_err(|e| WeightsError::Parse {
                line: n + 1,
                reason: format!("weight for {name}: {e}"),
            })?;
            weights.set(name, value);
        }
        Ok(weights)
    }

    pub fn with(mut self, name: &str, weight: f64) -> Self {
        self.set(name, weight);
        self
    }

    pub fn set(&mut self, name: &str, weight: f64) {
        self.0.insert(name.to_string(), weight);
    }

    pub fn get(&self, name: &str) -> f64 {
        self.0.get(name).copied().unwrap_or(0.0)
    }

    pub fn dot(&self, features: &FeatureVector) -> f64 {
        features.iter().map(|(name, v)| self.get(name) * v).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sums_values() {
        let mut fv = FeatureVector::new();
        fv.add("a", 1.5);
        fv.add("a", 2.0);
        fv.add("b", -1.0);
        assert_eq!(fv.len(), 2);
        assert!((fv.get("a") - 3.5).abs() < 1e-12);
        assert_eq!(fv.get("missing"), 0.0);
    }

    #[test]
    fn dot_ignores_unweighted() {
        let weights = Weights::new().with("a", 2.0);
        let fv: FeatureVector = vec![("a".to_string(), 1.5), ("b".to_string(), 100.0)]
            .into_iter()
            .collect();
        assert!((weights.dot(&fv) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn weights_from_text() {
        let w = Weights::from_text("# comment\ntm_pt_0 1\n\nlm_0 0.5\n").unwrap();
        assert_eq!(w.get("tm_pt_0"), 1.0);
        assert_eq!(w.get("lm_0"), 0.5);
    }

    #[test]
    fn weights_from_text_rejects_garbage() {
        let err = Weights::from_text("tm_pt_0 one").unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(Weights::from_text("a 1 2").is_err());
    }
}
