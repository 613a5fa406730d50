/// Skip checkpoint construction shared by position-level skips (within one
/// `Posting`) and doc-level skips (within one `TermPosting`).
///
/// Spec §3: skips are generated only when the list has more than 3 entries;
/// `skip_count = floor(sqrt(len))`, a checkpoint is inserted every
/// `floor(len / skip_count)` entries, and each checkpoint records the value
/// at that index together with the index itself. This is a pure function of
/// `len`, so serializing then deserializing a posting always regenerates
/// identical skips (spec §4.2's idempotence requirement).
const MIN_LEN_FOR_SKIPS: usize = 3;

pub fn skip_checkpoint_indices(len: usize) -> Vec<usize> {
    if len <= MIN_LEN_FOR_SKIPS {
        return Vec::new();
    }
    let skip_count = (len as f64).sqrt().floor() as usize;
    if skip_count < 1 {
        return Vec::new();
    }
    let interval = len / skip_count;
    if interval < 1 {
        return Vec::new();
    }
    let mut indices = Vec::new();
    let mut idx = interval;
    while idx < len {
        indices.push(idx);
        idx += interval;
    }
    indices
}

/// Build `(value, index)` skip entries over an ordered slice.
pub fn build_skips<T: Copy>(values: &[T]) -> Vec<(T, usize)> {
    skip_checkpoint_indices(values.len())
        .into_iter()
        .map(|i| (values[i], i))
        .collect()
}
