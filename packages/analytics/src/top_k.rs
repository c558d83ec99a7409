//! Bounded top-K selection without a sort or a heap.
//!
//! Maintains a fixed buffer of K slots and shift-inserts each incoming
//! record at the first slot holding a smaller key (or no record at all),
//! discarding whatever falls off the bottom. O(n * K) time, O(K) space.

/// Selects the `k` records with the largest keys, in descending key order.
///
/// The buffer starts as `k` empty slots. For each record, slots are
/// scanned from the top; the record is inserted at the first slot that is
/// empty or holds a strictly smaller key, shifting lower-ranked entries
/// down by one and dropping the excess. A record whose key only ties an
/// occupied slot does not displace it, so ties keep the earlier-seen
/// record ranked at or above later equals. `NaN` keys never compare
/// greater, so they only ever occupy otherwise-empty slots.
///
/// `k = 0` returns an empty result without pulling a single record; an
/// input shorter than `k` yields a short result with no placeholders.
#[must_use]
pub fn select_top_k<'a, T, F>(
    records: impl IntoIterator<Item = &'a T>,
    key: F,
    k: usize,
) -> Vec<&'a T>
where
    F: Fn(&T) -> f64,
{
    if k == 0 {
        return Vec::new();
    }

    let mut buffer: Vec<Option<(&'a T, f64)>> = vec![None; k];

    for record in records {
        let candidate = key(record);

        for slot in 0..k {
            let wins = match buffer[slot] {
                None => true,
                Some((_, held)) => candidate > held,
            };
            if wins {
                // Pop the bottom first so the insert never grows the buffer.
                buffer.pop();
                buffer.insert(slot, Some((record, candidate)));
                break;
            }
        }
    }

    buffer
        .into_iter()
        .flatten()
        .map(|(record, _)| record)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Trip {
        id: &'static str,
        duration: f64,
    }

    const fn trip(id: &'static str, duration: f64) -> Trip {
        Trip { id, duration }
    }

    fn durations(selected: &[&Trip]) -> Vec<f64> {
        selected.iter().map(|t| t.duration).collect()
    }

    #[test]
    fn selects_top_three_by_duration() {
        let trips = [
            trip("a", 50.0),
            trip("b", 200.0),
            trip("c", 10.0),
            trip("d", 999.0),
            trip("e", 5.0),
            trip("f", 700.0),
        ];

        let top = select_top_k(&trips, |t| t.duration, 3);
        assert_eq!(durations(&top), vec![999.0, 700.0, 200.0]);
    }

    #[test]
    fn result_is_descending_and_a_subset() {
        let trips = [
            trip("a", 3.0),
            trip("b", 9.0),
            trip("c", 1.0),
            trip("d", 7.0),
        ];

        let top = select_top_k(&trips, |t| t.duration, 2);
        assert_eq!(top.len(), 2);
        assert!(top[0].duration >= top[1].duration);
        for selected in &top {
            assert!(trips.iter().any(|t| std::ptr::eq(t, *selected)));
        }
    }

    #[test]
    fn zero_k_returns_empty_without_pulling_records() {
        let mut pulled = 0;
        let trips = [trip("a", 1.0), trip("b", 2.0)];
        let counting = trips.iter().inspect(|_| pulled += 1);

        let top: Vec<&Trip> = select_top_k(counting, |t| t.duration, 0);
        assert!(top.is_empty());
        assert_eq!(pulled, 0);
    }

    #[test]
    fn short_input_yields_short_result() {
        let trips = [trip("a", 4.0), trip("b", 6.0)];
        let top = select_top_k(&trips, |t| t.duration, 5);
        assert_eq!(durations(&top), vec![6.0, 4.0]);
    }

    #[test]
    fn ties_keep_the_earlier_record_first() {
        let trips = [
            trip("first", 100.0),
            trip("second", 100.0),
            trip("third", 100.0),
        ];

        let top = select_top_k(&trips, |t| t.duration, 2);
        assert_eq!(top[0].id, "first");
        assert_eq!(top[1].id, "second");
    }

    #[test]
    fn late_large_key_displaces_the_bottom() {
        let trips = [
            trip("a", 10.0),
            trip("b", 20.0),
            trip("c", 30.0),
            trip("d", 25.0),
        ];

        let top = select_top_k(&trips, |t| t.duration, 3);
        assert_eq!(durations(&top), vec![30.0, 25.0, 20.0]);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let trips: [Trip; 0] = [];
        let top = select_top_k(&trips, |t| t.duration, 3);
        assert!(top.is_empty());
    }
}
