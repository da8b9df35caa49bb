//! Post-copy content verification.

use serde::Serialize;

use crate::buffer::Element;

/// Outcome of comparing a destination against its source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Verification {
    /// Every element matched.
    Match,
    /// First differing element. Comparison stopped here.
    Mismatch {
        /// Element index.
        index: usize,
        /// Source value (`None` past the end of the source).
        expected: Option<Element>,
        /// Destination value (`None` past the end of the destination).
        actual: Option<Element>,
    },
}

impl Verification {
    /// Whether the copy was faithful.
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Match)
    }
}

/// Compare `dst` against `src`, stopping at the first difference.
///
/// Values are compared bit-for-bit so that NaN payloads behave
/// deterministically.
pub fn verify_copy(src: &[Element], dst: &[Element]) -> Verification {
    if let Some(index) = src
        .iter()
        .zip(dst)
        .position(|(a, b)| a.to_bits() != b.to_bits())
    {
        return Verification::Mismatch {
            index,
            expected: Some(src[index]),
            actual: Some(dst[index]),
        };
    }

    if src.len() != dst.len() {
        let index = src.len().min(dst.len());
        return Verification::Mismatch {
            index,
            expected: src.get(index).copied(),
            actual: dst.get(index).copied(),
        };
    }

    Verification::Match
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        let a: Vec<f32> = (0..1000).map(|i| i as f32).collect();
        assert_eq!(verify_copy(&a, &a.clone()), Verification::Match);
        assert!(verify_copy(&[], &[]).is_match());
    }

    #[test]
    fn test_first_mismatch_reported() {
        let a: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let mut b = a.clone();
        b[17] = -1.0;
        b[42] = -2.0;

        match verify_copy(&a, &b) {
            Verification::Mismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 17);
                assert_eq!(expected, Some(17.0));
                assert_eq!(actual, Some(-1.0));
            }
            Verification::Match => panic!("expected mismatch"),
        }
    }

    #[test]
    fn test_length_mismatch() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [1.0f32, 2.0];
        assert_eq!(
            verify_copy(&a, &b),
            Verification::Mismatch {
                index: 2,
                expected: Some(3.0),
                actual: None,
            }
        );
    }

    #[test]
    fn test_bitwise_comparison() {
        let a = [f32::NAN];
        assert!(verify_copy(&a, &a).is_match());

        let pos = [0.0f32];
        let neg = [-0.0f32];
        assert!(!verify_copy(&pos, &neg).is_match());
    }
}
