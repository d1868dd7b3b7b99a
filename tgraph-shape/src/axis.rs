//! Normalization of axis-like operator attributes.

use crate::AxisError;

/// Declares the legal range of an axis attribute relative to the rank of an
/// operator's input.
///
/// Negative values are interpreted relative to the rank. After that, the
/// value must lie in `[0, rank]`, with each end included only if the
/// corresponding flag is set. An axis that names an existing dimension
/// excludes `rank`, whereas an axis that names a split point may equal it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AxisRule {
    pub include_min: bool,
    pub include_max: bool,
}

impl AxisRule {
    /// Rule for axes which refer to an existing dimension (`[0, rank)`).
    pub const DIMENSION: AxisRule = AxisRule {
        include_min: true,
        include_max: false,
    };

    /// Rule for axes which refer to a position between dimensions (`[0, rank]`).
    pub const SPLIT_POINT: AxisRule = AxisRule {
        include_min: true,
        include_max: true,
    };

    fn bounds(&self, rank: usize) -> (i64, i64) {
        let rank = rank as i64;
        let min = if self.include_min { 0 } else { 1 };
        let max = if self.include_max { rank } else { rank - 1 };
        (min, max)
    }
}

/// Resolve a possibly-negative axis against `rank` and check it against
/// `rule`.
pub fn normalize_axis(axis: i64, rank: usize, rule: AxisRule) -> Result<usize, AxisError> {
    let (min, max) = rule.bounds(rank);
    let resolved = if axis < 0 { axis + rank as i64 } else { axis };
    if resolved < min || resolved > max {
        return Err(AxisError {
            value: axis,
            rank,
            min,
            max,
        });
    }
    Ok(resolved as usize)
}

/// Normalize each axis in `axes`. See [`normalize_axis`].
pub fn normalize_axes(axes: &[i64], rank: usize, rule: AxisRule) -> Result<Vec<usize>, AxisError> {
    axes.iter()
        .map(|&axis| normalize_axis(axis, rank, rule))
        .collect()
}

#[cfg(test)]
mod tests {
    use tgraph_testing::TestCases;

    use super::{normalize_axes, normalize_axis, AxisRule};

    #[test]
    fn test_normalize_axis() {
        #[derive(Debug)]
        struct Case {
            axis: i64,
            rank: usize,
            rule: AxisRule,
            expected: Option<usize>,
        }

        let cases = [
            Case {
                axis: 1,
                rank: 4,
                rule: AxisRule::DIMENSION,
                expected: Some(1),
            },
            Case {
                axis: -1,
                rank: 4,
                rule: AxisRule::DIMENSION,
                expected: Some(3),
            },
            Case {
                axis: 4,
                rank: 4,
                rule: AxisRule::DIMENSION,
                expected: None,
            },
            Case {
                axis: 4,
                rank: 4,
                rule: AxisRule::SPLIT_POINT,
                expected: Some(4),
            },
            Case {
                axis: -5,
                rank: 4,
                rule: AxisRule::SPLIT_POINT,
                expected: None,
            },
            Case {
                axis: 0,
                rank: 3,
                rule: AxisRule {
                    include_min: false,
                    include_max: true,
                },
                expected: None,
            },
        ];

        cases.test_each(|case| {
            let result = normalize_axis(case.axis, case.rank, case.rule);
            assert_eq!(result.ok(), case.expected);
        })
    }

    #[test]
    fn test_normalize_axes_reports_original_value() {
        let err = normalize_axes(&[0, -7], 3, AxisRule::DIMENSION).err().unwrap();
        assert_eq!(err.value, -7);
        assert_eq!(err.max, 2);
    }
}
