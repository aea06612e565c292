/// Think-time bounds over a sweep of clock states.
use bot_worker::clock::{TimePolicy, TimeTier};

fn policies() -> Vec<TimePolicy> {
    vec![
        TimePolicy::default(),
        TimePolicy {
            tiers: vec![TimeTier { min_remaining_ms: 0, fraction: 0.05 }],
            opening_moves: 0,
            ..TimePolicy::default()
        },
        TimePolicy {
            floor_secs: 0.1,
            ceiling_secs: 5.0,
            safety_buffer_ms: 2_000,
            ..TimePolicy::default()
        },
    ]
}

#[test]
fn test_allocation_stays_within_bounds() {
    for policy in policies() {
        policy.validate().unwrap();
        for remaining_ms in (0..600_000u64).step_by(1_337).chain([0, 1, 499, 500, 501]) {
            for increment in [0.0, 1.0, 5.0] {
                for move_number in [1, 8, 9, 40] {
                    let think = policy.allocate(remaining_ms, increment, move_number);
                    assert!(think >= policy.floor_secs, "{think} below floor at {remaining_ms}");
                    assert!(think <= policy.ceiling_secs, "{think} above ceiling at {remaining_ms}");
                    let spendable = remaining_ms.saturating_sub(policy.safety_buffer_ms) as f64 / 1000.0;
                    if spendable > policy.floor_secs {
                        assert!(think <= spendable, "{think} eats the buffer at {remaining_ms}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_empty_clock_gets_exactly_the_floor() {
    for policy in policies() {
        assert_eq!(policy.allocate(0, 0.0, 1), policy.floor_secs);
        assert_eq!(policy.allocate(0, 10.0, 50), policy.floor_secs);
    }
}

#[test]
fn test_more_time_never_means_less_thinking() {
    for policy in policies() {
        let mut previous = 0.0;
        for remaining_ms in (0..900_000u64).step_by(250) {
            let think = policy.allocate(remaining_ms, 0.0, 20);
            assert!(think >= previous, "allocation dropped at {remaining_ms}");
            previous = think;
        }
    }
}

#[test]
fn test_increment_adds_time_when_not_capped() {
    let policy = TimePolicy::default();
    for remaining_ms in [5_000u64, 30_000, 120_000] {
        let without = policy.allocate(remaining_ms, 0.0, 20);
        let with = policy.allocate(remaining_ms, 2.0, 20);
        assert!(with > without, "no bonus at {remaining_ms}");
    }
}
