//! Land classification variants.
//!
//! The model either reports managed pasture and rangeland separately
//! (`GrassSplit`) or a single `past` category (`NoGrass`) that has to be split
//! with regional fractions. The variant only decides which crosswalk is used;
//! both produce the same external label set.

use serde::{Deserialize, Serialize};

use super::Crosswalk;

pub const INTERNAL_SCHEME: &str = "model";
pub const EXTERNAL_SCHEME: &str = "land";

/// Categories shared by both variants.
const COMMON: [&str; 6] = ["crop", "forestry", "primforest", "secdforest", "urban", "other"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandScheme {
    #[default]
    GrassSplit,
    NoGrass,
}

impl LandScheme {
    /// Crosswalk from the model's land categories to the external land
    /// categories for this variant.
    pub fn crosswalk(self) -> Crosswalk {
        let mut pairs: Vec<(&str, &str)> = COMMON.iter().map(|&c| (c, c)).collect();
        match self {
            LandScheme::GrassSplit => {
                pairs.insert(1, ("pastr", "pastr"));
                pairs.insert(2, ("range", "range"));
            }
            LandScheme::NoGrass => {
                pairs.insert(1, ("past", "pastr"));
                pairs.insert(2, ("past", "range"));
            }
        }
        Crosswalk::new(INTERNAL_SCHEME, EXTERNAL_SCHEME, &pairs)
    }

    /// Model-side land categories of this variant.
    pub fn internal_categories(self) -> Vec<String> {
        let cw = self.crosswalk();
        let mut out: Vec<String> = Vec::new();
        for r in cw.rows {
            if !out.contains(&r.internal) {
                out.push(r.internal);
            }
        }
        out
    }
}

impl std::str::FromStr for LandScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "grass_split" => Ok(LandScheme::GrassSplit),
            "no_grass" => Ok(LandScheme::NoGrass),
            other => Err(format!("unknown land scheme '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crosswalk::{Direction, SplitWeights};
    use crate::field::{tests::labels, PhysicalUnit, QuantityField};
    use approx::assert_relative_eq;

    #[test]
    fn variants_share_external_labels() {
        let ext = |s: LandScheme| {
            let mut v: Vec<String> = s.crosswalk().rows.into_iter().map(|r| r.external).collect();
            v.dedup();
            v
        };
        assert_eq!(ext(LandScheme::GrassSplit), ext(LandScheme::NoGrass));
        assert_eq!(
            LandScheme::NoGrass.internal_categories(),
            labels(&["crop", "past", "forestry", "primforest", "secdforest", "urban", "other"])
        );
    }

    #[test]
    fn only_no_grass_splits() {
        assert!(!LandScheme::GrassSplit.crosswalk().has_splits(Direction::ToExternal));
        assert!(LandScheme::NoGrass.crosswalk().has_splits(Direction::ToExternal));
    }

    #[test]
    fn no_grass_splits_pasture_by_regional_fraction() {
        let cats = LandScheme::NoGrass.internal_categories();
        let land = QuantityField::from_fn(labels(&["f1"]), cats, vec![2020], PhysicalUnit::MhaPerCell, |_, c, _| {
            if c == "past" { 10.0 } else { 1.0 }
        })
        .unwrap();
        let fractions = QuantityField::from_data(
            labels(&["f1"]),
            labels(&["pastr", "range"]),
            vec![2020],
            PhysicalUnit::Fraction,
            vec![0.3, 0.7],
        )
        .unwrap();
        let out = LandScheme::NoGrass
            .crosswalk()
            .apply_with(&land, Direction::ToExternal, Some(SplitWeights::Layer(&fractions)))
            .unwrap();
        assert_relative_eq!(out.get("f1", "pastr", 2020).unwrap(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(out.get("f1", "range", 2020).unwrap(), 7.0, epsilon = 1e-12);
        assert_eq!(out.get("f1", "urban", 2020), Some(1.0));
    }

    #[test]
    fn parse_accepts_both_spellings() {
        assert_eq!("no-grass".parse::<LandScheme>(), Ok(LandScheme::NoGrass));
        assert_eq!("grass_split".parse::<LandScheme>(), Ok(LandScheme::GrassSplit));
        assert!("both".parse::<LandScheme>().is_err());
    }
}
