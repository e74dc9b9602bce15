//! Property tests for exploration schedules.

use super::*;

mod spread_tests {
    use super::*;

    #[test]
    fn test_default_spread_matches_flipped_logspace() {
        let epsilons = EpsilonSpread::default().epsilons(8);
        assert_eq!(epsilons.len(), 8);
        assert!((epsilons[0] - 0.4f64.powi(8)).abs() < 1e-15);
        assert!((epsilons[7] - 0.4).abs() < 1e-15);
        assert!((epsilons[6] - 0.4f64.powi(2)).abs() < 1e-15);
    }

    #[test]
    fn test_descending_is_non_increasing_and_bounded() {
        let spread = EpsilonSpread::default().with_order(SpreadOrder::Descending);
        let epsilons = spread.epsilons(8);

        for pair in epsilons.windows(2) {
            assert!(pair[0] >= pair[1], "{:?} not non-increasing", epsilons);
        }
        for &e in &epsilons {
            assert!(e >= spread.low() - 1e-15 && e <= spread.high() + 1e-15);
        }
    }

    #[test]
    fn test_ascending_is_non_decreasing_and_bounded() {
        let spread = EpsilonSpread::default();
        let epsilons = spread.epsilons(8);

        for pair in epsilons.windows(2) {
            assert!(pair[0] <= pair[1], "{:?} not non-decreasing", epsilons);
        }
        for &e in &epsilons {
            assert!(e >= spread.low() - 1e-15 && e <= spread.high() + 1e-15);
        }
    }

    #[test]
    fn test_orders_are_mirrors() {
        let asc = EpsilonSpread::default().epsilons(5);
        let mut desc = EpsilonSpread::default()
            .with_order(SpreadOrder::Descending)
            .epsilons(5);
        desc.reverse();
        assert_eq!(asc, desc);
    }

    #[test]
    fn test_log_spacing_has_constant_ratio() {
        let epsilons = EpsilonSpread::default().epsilons(8);
        let ratio = epsilons[1] / epsilons[0];
        for pair in epsilons.windows(2) {
            assert!((pair[1] / pair[0] - ratio).abs() < 1e-9);
        }
    }

    #[test]
    fn test_validate() {
        assert!(EpsilonSpread::default().validate().is_ok());

        let mut bad = EpsilonSpread::default();
        bad.base = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = EpsilonSpread::default();
        bad.min_exponent = 9.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_serde_defaults() {
        let spread: EpsilonSpread = serde_json::from_str(r#"{"order":"Descending"}"#).unwrap();
        assert_eq!(spread.base, 0.4);
        assert_eq!(spread.order, SpreadOrder::Descending);
    }
}

mod schedule_tests {
    use super::*;

    #[test]
    fn test_schedules_stay_in_unit_interval() {
        let schedules: Vec<Box<dyn ExplorationSchedule>> = vec![
            Box::new(ConstantEpsilon::new(0.0)),
            Box::new(ConstantEpsilon::new(1.0)),
            Box::new(LinearDecayEpsilon::atari(0.01, 1_000)),
            Box::new(LinearDecayEpsilon::new(0.0, 1.0, 10)),
        ];
        for schedule in &schedules {
            for step in [0u64, 1, 5, 10, 999, 1_000, 1_000_000, u64::MAX] {
                let e = schedule.epsilon(step);
                assert!((0.0..=1.0).contains(&e), "epsilon {} out of range", e);
            }
        }
    }

    #[test]
    fn test_decay_is_monotone() {
        let schedule = LinearDecayEpsilon::atari(0.05, 500);
        let mut prev = schedule.epsilon(0);
        for step in 1..1_000 {
            let e = schedule.epsilon(step);
            assert!(e <= prev);
            prev = e;
        }
    }
}
