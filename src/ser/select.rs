//! Slice-range selection over the valid elements of a series.

use crate::error::{Error, Result};

/// A validated, ascending, 1-based inclusive slice selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSelection {
    pub start: u32,
    pub end: u32,
    /// Step between selected indices. Zero is accepted and yields exactly
    /// the start index; a non-positive step cannot advance the iteration.
    pub increment: u32,
}

impl SliceSelection {
    /// The default selection: every valid element.
    pub fn full(valid_elements: u32) -> Self {
        Self {
            start: 1,
            end: valid_elements,
            increment: 1,
        }
    }

    /// Resolve raw user-supplied start/end/increment against the number of
    /// valid elements.
    ///
    /// Negative start/end count from the end of the stack: -1 is the last
    /// valid element, -2 the one before it. After normalization both bounds
    /// must land inside `1..=valid_elements` with start <= end.
    pub fn resolve(start: i64, end: i64, increment: i64, valid_elements: u32) -> Result<Self> {
        let valid = i64::from(valid_elements);
        let start = if start < 0 { start + valid + 1 } else { start };
        let end = if end < 0 { end + valid + 1 } else { end };

        if start < 1 || start > valid || end < 1 || end > valid || start > end {
            return Err(Error::InvalidRange {
                start,
                end,
                valid: valid_elements,
            });
        }
        if increment < 0 {
            return Err(Error::InvalidIncrement(increment));
        }

        Ok(Self {
            start: start as u32,
            end: end as u32,
            increment: increment as u32,
        })
    }

    /// Iterator over the selected 1-based indices, in ascending order.
    pub fn indices(&self) -> SelectionIter {
        SelectionIter {
            next: Some(self.start),
            end: self.end,
            increment: self.increment,
        }
    }

    /// Number of indices the selection yields.
    pub fn len(&self) -> usize {
        if self.increment == 0 {
            1
        } else {
            ((self.end - self.start) / self.increment) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Iterator produced by [`SliceSelection::indices`]. Terminates after the
/// first index when the increment is zero.
#[derive(Debug, Clone)]
pub struct SelectionIter {
    next: Option<u32>,
    end: u32,
    increment: u32,
}

impl Iterator for SelectionIter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let current = self.next?;
        self.next = if self.increment == 0 {
            None
        } else {
            current
                .checked_add(self.increment)
                .filter(|&n| n <= self.end)
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = match self.next {
            None => 0,
            Some(_) if self.increment == 0 => 1,
            Some(next) => ((self.end - next) / self.increment) as usize + 1,
        };
        (n, Some(n))
    }
}

impl ExactSizeIterator for SelectionIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_selection() {
        let sel = SliceSelection::full(7);
        assert_eq!(sel, SliceSelection { start: 1, end: 7, increment: 1 });
        assert_eq!(sel.indices().collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_negative_indices_count_from_end() {
        // -1 is the last valid element.
        let sel = SliceSelection::resolve(-1, -1, 1, 10).unwrap();
        assert_eq!(sel.indices().collect::<Vec<_>>(), vec![10]);

        // -2..-1 are the last two.
        let sel = SliceSelection::resolve(-2, -1, 1, 10).unwrap();
        assert_eq!(sel.indices().collect::<Vec<_>>(), vec![9, 10]);
    }

    #[test]
    fn test_start_after_end_rejected() {
        let err = SliceSelection::resolve(5, 3, 1, 10).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidRange { start: 5, end: 3, valid: 10 }
        ));
    }

    #[test]
    fn test_bounds_rejected() {
        assert!(SliceSelection::resolve(0, 3, 1, 10).is_err());
        assert!(SliceSelection::resolve(1, 11, 1, 10).is_err());
        assert!(SliceSelection::resolve(-11, 5, 1, 10).is_err());
        assert!(SliceSelection::resolve(1, -11, 1, 10).is_err());
    }

    #[test]
    fn test_negative_increment_rejected() {
        let err = SliceSelection::resolve(1, 10, -1, 10).unwrap_err();
        assert!(matches!(err, Error::InvalidIncrement(-1)));
    }

    #[test]
    fn test_zero_increment_yields_start_only() {
        let sel = SliceSelection::resolve(2, 10, 0, 10).unwrap();
        assert_eq!(sel.indices().collect::<Vec<_>>(), vec![2]);
        assert_eq!(sel.len(), 1);
    }

    #[test]
    fn test_stride_and_len() {
        let sel = SliceSelection::resolve(1, 10, 3, 10).unwrap();
        assert_eq!(sel.indices().collect::<Vec<_>>(), vec![1, 4, 7, 10]);
        assert_eq!(sel.len(), 4);
        assert_eq!(sel.indices().len(), 4);
    }

    #[test]
    fn test_oversize_increment_yields_single_index() {
        let sel = SliceSelection::resolve(3, 5, 100, 10).unwrap();
        assert_eq!(sel.indices().collect::<Vec<_>>(), vec![3]);
    }
}
