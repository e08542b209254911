use serde::Deserialize;

use crate::error::MiningError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiningConfig {
    /// Field positions used when folding raw batches into the pivot table.
    /// Only required for accumulation.
    #[serde(default)]
    pub layout: Option<PivotLayout>,
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Size of the pair-mining pool. `None` uses rayon's default.
    #[serde(default)]
    pub workers: Option<usize>,
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Which raw-row positions form the entity key, the cell data and the
/// instance identifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PivotLayout {
    pub key_fields: Vec<usize>,
    pub data_fields: Vec<usize>,
    #[serde(default)]
    pub instance_field: usize,
}

impl PivotLayout {
    pub fn new(key_fields: Vec<usize>, data_fields: Vec<usize>, instance_field: usize) -> Self {
        Self { key_fields, data_fields, instance_field }
    }

    /// Highest raw-row position the layout reads.
    pub fn max_index(&self) -> usize {
        self.key_fields
            .iter()
            .chain(self.data_fields.iter())
            .copied()
            .chain(std::iter::once(self.instance_field))
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), MiningError> {
        if self.key_fields.is_empty() {
            return Err(MiningError::ConfigValidation(
                "at least one key field is required".into(),
            ));
        }
        if self.data_fields.is_empty() {
            return Err(MiningError::ConfigValidation(
                "at least one data field is required".into(),
            ));
        }
        if self.key_fields.contains(&self.instance_field) {
            return Err(MiningError::ConfigValidation(format!(
                "instance field {} is also a key field",
                self.instance_field
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Every tunable used by classification, golden-value extraction, pruning and
/// pair mining.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Share of non-missing values a candidate type must parse.
    pub type_thresh: f64,
    /// Share above which a value is golden / part of a column's majority set.
    pub cat_thresh: f64,
    /// Additive smoothing for co-occurrence scores. Below 1 it is a fraction
    /// of the row count.
    pub cat_margin: f64,
    /// Minimum confidence to report a relation.
    pub min_corr: f64,
    /// Columns whose top value exceeds this share are not pair-mined.
    pub corr_thresh: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            type_thresh: 0.9,
            cat_thresh: 0.3,
            cat_margin: 3.0,
            min_corr: 0.75,
            corr_thresh: 0.99,
        }
    }
}

impl Thresholds {
    /// Absolute smoothing margin for a column pair of `rows` rows.
    pub fn margin_for(&self, rows: usize) -> f64 {
        if self.cat_margin < 1.0 {
            (self.cat_margin * rows as f64).floor()
        } else {
            self.cat_margin
        }
    }

    pub fn validate(&self) -> Result<(), MiningError> {
        let unit = |name: &str, v: f64| -> Result<(), MiningError> {
            if !(0.0..=1.0).contains(&v) {
                return Err(MiningError::ConfigValidation(format!(
                    "{name} must be within [0, 1], got {v}"
                )));
            }
            Ok(())
        };
        unit("type_thresh", self.type_thresh)?;
        unit("cat_thresh", self.cat_thresh)?;
        unit("min_corr", self.min_corr)?;
        if self.cat_thresh == 0.0 {
            return Err(MiningError::ConfigValidation("cat_thresh must be positive".into()));
        }
        if !self.cat_margin.is_finite() || self.cat_margin < 0.0 {
            return Err(MiningError::ConfigValidation(format!(
                "cat_margin must be non-negative, got {}",
                self.cat_margin
            )));
        }
        if !self.corr_thresh.is_finite() || self.corr_thresh <= 0.0 {
            return Err(MiningError::ConfigValidation(format!(
                "corr_thresh must be positive, got {}",
                self.corr_thresh
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl MiningConfig {
    pub fn from_toml(input: &str) -> Result<Self, MiningError> {
        let config: MiningConfig =
            toml::from_str(input).map_err(|e| MiningError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MiningError> {
        if let Some(ref layout) = self.layout {
            layout.validate()?;
        }
        self.thresholds.validate()?;
        if self.workers == Some(0) {
            return Err(MiningError::ConfigValidation("workers must be at least 1".into()));
        }
        Ok(())
    }

    /// Layout or a validation error naming what is missing.
    pub fn require_layout(&self) -> Result<&PivotLayout, MiningError> {
        self.layout.as_ref().ok_or_else(|| {
            MiningError::ConfigValidation(
                "no [layout] configured (key_fields, data_fields, instance_field)".into(),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
workers = 4

[layout]
key_fields = [0, 1]
data_fields = [3, 4]
instance_field = 2

[thresholds]
type_thresh = 0.8
cat_thresh = 0.25
cat_margin = 0.1
min_corr = 0.7
corr_thresh = 1.1
"#;

    #[test]
    fn parse_full_config() {
        let config = MiningConfig::from_toml(FULL).unwrap();
        let layout = config.layout.as_ref().unwrap();
        assert_eq!(layout.key_fields, vec![0, 1]);
        assert_eq!(layout.data_fields, vec![3, 4]);
        assert_eq!(layout.instance_field, 2);
        assert_eq!(layout.max_index(), 4);
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.thresholds.type_thresh, 0.8);
        assert_eq!(config.thresholds.corr_thresh, 1.1);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = MiningConfig::from_toml("").unwrap();
        assert!(config.layout.is_none());
        assert_eq!(config.thresholds, Thresholds::default());
        assert!(config.require_layout().is_err());
    }

    #[test]
    fn partial_thresholds_keep_other_defaults() {
        let config = MiningConfig::from_toml("[thresholds]\nmin_corr = 0.9\n").unwrap();
        assert_eq!(config.thresholds.min_corr, 0.9);
        assert_eq!(config.thresholds.cat_thresh, 0.3);
        assert_eq!(config.thresholds.cat_margin, 3.0);
    }

    #[test]
    fn fractional_margin_scales_with_rows() {
        let t = Thresholds { cat_margin: 0.1, ..Thresholds::default() };
        assert_eq!(t.margin_for(25), 2.0);
        assert_eq!(Thresholds::default().margin_for(25), 3.0);
    }

    #[test]
    fn reject_unknown_threshold() {
        let err = MiningConfig::from_toml("[thresholds]\nmin_cor = 0.9\n");
        assert!(err.is_err(), "typo in threshold name should fail deserialization");
    }

    #[test]
    fn reject_empty_data_fields() {
        let input = "[layout]\nkey_fields = [0]\ndata_fields = []\ninstance_field = 1\n";
        let err = MiningConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("data field"));
    }

    #[test]
    fn reject_instance_field_in_keys() {
        let input = "[layout]\nkey_fields = [0, 2]\ndata_fields = [3]\ninstance_field = 2\n";
        let err = MiningConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("instance field 2"));
    }

    #[test]
    fn reject_out_of_range_min_corr() {
        let err = MiningConfig::from_toml("[thresholds]\nmin_corr = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("min_corr"));
    }

    #[test]
    fn reject_zero_workers() {
        let err = MiningConfig::from_toml("workers = 0\n").unwrap_err();
        assert!(err.to_string().contains("workers"));
    }
}
