use dynamiq_core::message::{MessageId, MAX_ID};

/// Approximate number of messages in a queue, extrapolated from the ids one range
/// scan returned.
///
/// Ids are uniformly distributed, so `n` ids spread over `max - min` of the id space
/// imply `n / (max - min) * MAX_ID` messages in total. With fewer than two distinct
/// ids there is no spread to measure and the sample size is scaled by the number of
/// partitions and members instead.
pub fn estimate_depth(ids: &[MessageId], partition_count: u32, member_count: usize) -> i64 {
    let min = ids.iter().map(MessageId::as_u64).min();
    let max = ids.iter().map(MessageId::as_u64).max();

    match (min, max) {
        (Some(min), Some(max)) if ids.len() >= 2 && max > min => {
            let spread = (max - min) as f64;
            (ids.len() as f64 / spread * MAX_ID as f64) as i64
        }
        _ => ids.len() as i64 * partition_count as i64 * member_count as i64,
    }
}

/// How full a batch came back, as a floored percentage of what was asked for.
pub fn fill_ratio(batch_size: usize, message_count: usize) -> i64 {
    if batch_size == 0 {
        return 0;
    }
    (message_count * 100 / batch_size) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<MessageId> {
        raw.iter().copied().map(MessageId::new).collect()
    }

    #[test]
    fn depth_extrapolates_from_id_spread() {
        let sample = ids(&[100, 250, 400, 900]);
        let expected = (4.0 / 800.0 * MAX_ID as f64) as i64;
        assert_eq!(estimate_depth(&sample, 5, 3), expected);
    }

    #[test]
    fn depth_without_spread_scales_by_partitions_and_members() {
        assert_eq!(estimate_depth(&ids(&[42]), 4, 3), 12);
        assert_eq!(estimate_depth(&[], 4, 3), 0);
        // identical ids carry no spread either
        assert_eq!(estimate_depth(&ids(&[7, 7]), 2, 1), 4);
    }

    #[test]
    fn fill_ratio_is_a_floored_percentage() {
        assert_eq!(fill_ratio(10, 3), 30);
        assert_eq!(fill_ratio(3, 1), 33);
        assert_eq!(fill_ratio(5, 5), 100);
        assert_eq!(fill_ratio(0, 0), 0);
    }
}
