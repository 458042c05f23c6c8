//! Grouping of strip-sorted digits into runs of adjacent strips.

use std::ops::Range;

/// Splits strip-sorted items into maximal runs of consecutive strips.
///
/// An item extends the current run only if its strip is exactly one above
/// the previous item's strip; a gap, a repeated strip or a decrease starts
/// a new run. Runs are returned as index ranges into `items` and are never
/// empty. Sorting is the caller's job.
pub fn group_strips<T, F>(items: &[T], strip: F) -> Vec<Range<usize>>
where
    F: Fn(&T) -> u16,
{
    let mut groups = Vec::new();
    let Some(first) = items.first() else {
        return groups;
    };

    let mut start = 0;
    let mut last_strip = strip(first);
    for (i, item) in items.iter().enumerate().skip(1) {
        let current = strip(item);
        if current.checked_sub(last_strip) != Some(1) {
            groups.push(start..i);
            start = i;
        }
        last_strip = current;
    }
    groups.push(start..items.len());
    groups
}
