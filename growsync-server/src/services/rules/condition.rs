use growsync_api::models::{Condition, ConditionKind, Day, Logic, SensorSample, parse_time_of_day};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionEvaluation {
    pub met: bool,
    /// Result of each condition in list order
    pub results: Vec<bool>,
}

/// Evaluates one condition. Missing readings and reserved kinds are false.
pub fn evaluate_condition(condition: &Condition, sample: &SensorSample, now: OffsetDateTime) -> bool {
    match &condition.kind {
        ConditionKind::Sensor(sensor) => sample
            .field(&sensor.sensor)
            .is_some_and(|reading| sensor.operator.holds(reading, sensor.value, sensor.value_max)),
        ConditionKind::Time(window) => {
            let minute_of_day = u16::from(now.hour()) * 60 + u16::from(now.minute());
            match (parse_time_of_day(&window.start), parse_time_of_day(&window.end)) {
                // inclusive, no wrap past midnight
                (Ok(start), Ok(end)) => start <= minute_of_day && minute_of_day <= end,
                _ => false,
            }
        }
        ConditionKind::Schedule(schedule) => schedule.days.contains(&Day::from(now.weekday())),
        ConditionKind::Manual | ConditionKind::State => false,
    }
}

/// Folds the conditions strictly left to right: each condition's `logic`
/// joins the running result with the next condition, with no precedence
/// between AND and OR. An empty list is never met.
pub fn evaluate_conditions(conditions: &[Condition], sample: &SensorSample, now: OffsetDateTime) -> ConditionEvaluation {
    let results: Vec<bool> = conditions
        .iter()
        .map(|condition| evaluate_condition(condition, sample, now))
        .collect();

    let met = match results.split_first() {
        None => false,
        Some((first, rest)) => rest
            .iter()
            .zip(conditions.iter().map(|condition| condition.logic))
            .fold(*first, |acc, (result, logic)| match logic {
                Logic::And => acc && *result,
                Logic::Or => acc || *result,
            }),
    };

    ConditionEvaluation { met, results }
}

#[cfg(test)]
mod tests {
    use growsync_api::models::{Comparison, Schedule, TimeWindow};
    use time::macros::datetime;

    use super::*;

    fn sample() -> SensorSample {
        let mut sample = SensorSample::new(datetime!(2024-05-01 12:00 UTC));
        sample.temp_top = Some(31.0);
        sample.humidity_top = Some(45.0);
        sample
    }

    // 2024-05-01 is a Wednesday
    const NOON: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    #[test]
    fn test_sensor_conditions() {
        let sample = sample();
        assert!(evaluate_condition(&Condition::sensor("temp_top", Comparison::GreaterThan, 30.0), &sample, NOON));
        assert!(!evaluate_condition(&Condition::sensor("temp_top", Comparison::LessThan, 30.0), &sample, NOON));
        // missing reading
        assert!(!evaluate_condition(&Condition::sensor("gas", Comparison::LessThan, 1000.0), &sample, NOON));
    }

    #[test]
    fn test_time_and_schedule_conditions() {
        let window = |start: &str, end: &str| {
            Condition::new(ConditionKind::Time(TimeWindow { start: start.into(), end: end.into() }))
        };
        assert!(evaluate_condition(&window("06:00", "12:00"), &sample(), NOON));
        assert!(!evaluate_condition(&window("12:01", "18:00"), &sample(), NOON));
        // no wraparound
        assert!(!evaluate_condition(&window("22:00", "06:00"), &sample(), datetime!(2024-05-01 23:00 UTC)));

        let weekdays = Condition::new(ConditionKind::Schedule(Schedule {
            days: vec![Day::Monday, Day::Wednesday],
        }));
        assert!(evaluate_condition(&weekdays, &sample(), NOON));
        assert!(!evaluate_condition(&weekdays, &sample(), datetime!(2024-05-02 12:00 UTC)));
    }

    #[test]
    fn test_reserved_kinds_are_false() {
        assert!(!evaluate_condition(&Condition::new(ConditionKind::Manual), &sample(), NOON));
        assert!(!evaluate_condition(&Condition::new(ConditionKind::State), &sample(), NOON));
    }

    #[test]
    fn test_left_to_right_fold() {
        let t = || Condition::sensor("temp_top", Comparison::GreaterThan, 30.0);
        let f = || Condition::sensor("temp_top", Comparison::LessThan, 30.0);

        // (false OR true) AND false = false; precedence would give true
        let conditions = vec![f().with_logic(Logic::Or), t(), f()];
        let evaluation = evaluate_conditions(&conditions, &sample(), NOON);
        assert_eq!(evaluation.results, vec![false, true, false]);
        assert!(!evaluation.met);

        // (true AND false) OR true = true
        let conditions = vec![t(), f().with_logic(Logic::Or), t()];
        assert!(evaluate_conditions(&conditions, &sample(), NOON).met);

        assert!(!evaluate_conditions(&[], &sample(), NOON).met);
    }
}
