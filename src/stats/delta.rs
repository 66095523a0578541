/// Signed percentage change of `current` relative to `baseline`.
///
/// Undefined (`None`) for a zero baseline. The result is not rounded.
pub fn percent_change(current: i64, baseline: i64) -> Option<f64> {
    if baseline == 0 {
        return None;
    }
    Some((current as f64 - baseline as f64) / baseline as f64 * 100.0)
}
