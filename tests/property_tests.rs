// Property-based tests using proptest for the ordering invariants
//
// These generate random batch sizes, swap positions and permutations to
// check that generated batches are strictly ordered, that the order check
// finds exactly the inversions it should, and that the completion signal
// fires exactly once.

#[cfg(test)]
mod property_tests {
    use kafka_order_check::coordinator::CompletionSignal;
    use kafka_order_check::producer::BatchGenerator;
    use kafka_order_check::record::{Payload, PublishClock, Record};
    use kafka_order_check::verifier::check_order;
    use proptest::prelude::*;

    fn record(number: i64, published_at: i64) -> Record {
        let mut record = Record::new(
            number,
            published_at,
            Payload {
                email: "p@example.com".to_string(),
                first_name: "P".to_string(),
                last_name: "Q".to_string(),
            },
        );
        record.mark_consumed(number);
        record
    }

    fn ordered(n: usize) -> Vec<Record> {
        (0..n as i64).map(|i| record(i, 10 * i)).collect()
    }

    proptest! {
        #[test]
        fn test_generated_batch_is_strictly_ordered(size in 0u64..400) {
            // Property: numbers are the indices and published_at never repeats
            let records: Vec<Record> = BatchGenerator::new(size).collect();
            prop_assert_eq!(records.len() as u64, size);

            for (i, r) in records.iter().enumerate() {
                prop_assert_eq!(r.number, i as i64);
            }
            for pair in records.windows(2) {
                prop_assert!(pair[0].published_at < pair[1].published_at);
            }
        }

        #[test]
        fn test_publish_clock_is_strictly_increasing(readings in prop::collection::vec(0i64..1_000, 1..200)) {
            // Property: any sequence of wall-clock readings, including repeats
            // and backwards steps, yields strictly increasing timestamps
            let clock = PublishClock::new();
            let stamps: Vec<i64> = readings.iter().map(|&now| clock.advance(now)).collect();

            for (stamp, &now) in stamps.iter().zip(readings.iter()) {
                prop_assert!(*stamp >= now);
            }
            for pair in stamps.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }

        #[test]
        fn test_single_swap_is_found_at_its_position((n, i) in (2usize..300).prop_flat_map(|n| (Just(n), 1..n))) {
            // Property: swapping positions i-1 and i is reported at index i
            let mut records = ordered(n);
            records.swap(i - 1, i);

            let violation = check_order(&records).unwrap_err();
            prop_assert_eq!(violation.index, i);
            prop_assert_eq!(violation.total_inversions, 1);
            prop_assert_eq!(violation.later.number, (i - 1) as i64);
            prop_assert_eq!(violation.earlier.number, i as i64);
        }

        #[test]
        fn test_only_identity_permutation_passes(perm in Just((0..12i64).collect::<Vec<_>>()).prop_shuffle()) {
            // Property: with distinct publish times, only the sorted order passes
            let records: Vec<Record> = perm.iter().map(|&n| record(n, n)).collect();
            let is_identity = perm.iter().enumerate().all(|(i, &n)| n == i as i64);

            prop_assert_eq!(check_order(&records).is_ok(), is_identity);
        }

        #[test]
        fn test_non_decreasing_timestamps_pass(steps in prop::collection::vec(0i64..3, 0..200)) {
            // Property: equal adjacent publish times are not violations
            let mut published_at = 0;
            let records: Vec<Record> = steps
                .iter()
                .enumerate()
                .map(|(i, step)| {
                    published_at += step;
                    record(i as i64, published_at)
                })
                .collect();

            prop_assert!(check_order(&records).is_ok());
        }

        #[test]
        fn test_completion_signal_fires_once(expected in 1u64..500, extra in 0u64..100) {
            // Property: exactly one call fires, and it is the expected-th call
            let (signal, mut rx) = CompletionSignal::new(expected);
            let fired_at: Vec<u64> = (1..=expected + extra)
                .filter(|_| signal.record_persisted())
                .collect();

            prop_assert_eq!(fired_at, vec![expected]);
            prop_assert_eq!(signal.fired(), 1);
            prop_assert_eq!(signal.persisted(), expected + extra);
            prop_assert_eq!(rx.try_recv().unwrap(), expected);
        }
    }
}
