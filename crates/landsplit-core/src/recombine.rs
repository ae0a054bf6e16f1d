//! Swap a parent category for its disaggregated children.

use crate::error::{DisaggError, Result};
use crate::field::QuantityField;

/// Replace `parent_label` in `tensor` with the categories of `children_fine`.
///
/// Children take the parent's position on the category axis. Every other
/// category is copied unchanged. `tensor` is only read; the result is a new
/// field, so concurrent passes never alias one another's output.
pub fn replace(
    tensor: &QuantityField,
    parent_label: &str,
    children_fine: &QuantityField,
) -> Result<QuantityField> {
    let parent = tensor
        .category_axis()
        .position(parent_label)
        .ok_or_else(|| DisaggError::UnknownCategory(parent_label.to_string()))?;
    tensor.ensure_aligned(children_fine, "recombination")?;
    for child in children_fine.categories() {
        if child != parent_label && tensor.has_category(child) {
            return Err(DisaggError::DuplicateCategory(child.clone()));
        }
    }

    let mut categories: Vec<String> = Vec::with_capacity(
        tensor.categories().len() - 1 + children_fine.categories().len(),
    );
    categories.extend_from_slice(&tensor.categories()[..parent]);
    categories.extend_from_slice(children_fine.categories());
    categories.extend_from_slice(&tensor.categories()[parent + 1..]);

    let (nc_old, nc_child, nt) = (
        tensor.categories().len(),
        children_fine.categories().len(),
        tensor.times().len(),
    );
    let mut data = Vec::with_capacity(tensor.units().len() * categories.len() * nt);
    for u in 0..tensor.units().len() {
        for c in 0..nc_old {
            if c == parent {
                for k in 0..nc_child {
                    data.extend((0..nt).map(|t| children_fine.at(u, k, t)));
                }
            } else {
                data.extend((0..nt).map(|t| tensor.at(u, c, t)));
            }
        }
    }

    QuantityField::from_data(
        tensor.units().to_vec(),
        categories,
        tensor.times().to_vec(),
        tensor.physical_unit(),
        data,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{tests::labels, PhysicalUnit};

    fn land() -> QuantityField {
        QuantityField::from_fn(
            labels(&["f1", "f2"]),
            labels(&["crop", "past", "urban"]),
            vec![2020, 2030],
            PhysicalUnit::MhaPerCell,
            |u, c, t| (u.len() * 7 + c.len() * 3) as f64 + t as f64 * 1e-3 + 0.1,
        )
        .unwrap()
    }

    fn children() -> QuantityField {
        QuantityField::from_data(
            labels(&["f1", "f2"]),
            labels(&["maiz", "rice"]),
            vec![2020, 2030],
            PhysicalUnit::MhaPerCell,
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0],
        )
        .unwrap()
    }

    #[test]
    fn children_take_parent_position() {
        let out = replace(&land(), "crop", &children()).unwrap();
        assert_eq!(out.categories(), &labels(&["maiz", "rice", "past", "urban"])[..]);
        assert_eq!(out.get("f2", "rice", 2030), Some(8.0));
    }

    #[test]
    fn other_categories_bit_identical() {
        let before = land();
        let out = replace(&before, "past", &children()).unwrap();
        for u in before.units() {
            for c in ["crop", "urban"] {
                for &t in before.times() {
                    let a = before.get(u, c, t).unwrap();
                    let b = out.get(u, c, t).unwrap();
                    assert_eq!(a.to_bits(), b.to_bits());
                }
            }
        }
        assert!(!out.has_category("past"));
    }

    #[test]
    fn duplicate_child_label_rejected() {
        let clash = QuantityField::zeros(labels(&["f1", "f2"]), labels(&["urban"]), vec![2020, 2030], PhysicalUnit::MhaPerCell)
            .unwrap();
        assert_eq!(
            replace(&land(), "crop", &clash).unwrap_err(),
            DisaggError::DuplicateCategory("urban".into())
        );
    }

    #[test]
    fn child_named_like_parent_is_allowed() {
        let same = QuantityField::zeros(labels(&["f1", "f2"]), labels(&["crop", "crop_fallow"]), vec![2020, 2030], PhysicalUnit::MhaPerCell)
            .unwrap();
        let out = replace(&land(), "crop", &same).unwrap();
        assert_eq!(out.categories(), &labels(&["crop", "crop_fallow", "past", "urban"])[..]);
    }

    #[test]
    fn missing_parent_or_misaligned_children_rejected() {
        assert_eq!(
            replace(&land(), "forestry", &children()).unwrap_err(),
            DisaggError::UnknownCategory("forestry".into())
        );
        let short = QuantityField::zeros(labels(&["f1"]), labels(&["maiz"]), vec![2020, 2030], PhysicalUnit::MhaPerCell).unwrap();
        assert!(matches!(replace(&land(), "crop", &short).unwrap_err(), DisaggError::AxisMismatch(_)));
    }
}
