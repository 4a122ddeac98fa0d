use landed_core::models::{BuildMetrics, BuildRecord};

pub const COMPILE_STEP: &str = "compile";
pub const TEST_STEP: &str = "test";

/// Whole seconds spent in the named step. Step order does not matter.
/// Missing or unfinished steps are logged and reported as `None`.
pub fn step_duration(record: &BuildRecord, name: &str) -> Option<i64> {
    let Some(step) = record.step(name) else {
        tracing::warn!(
            "{} build {}: no {} step found",
            record.platform,
            record.number,
            name
        );
        return None;
    };
    let (Some(start), Some(end)) = (step.start, step.end) else {
        tracing::warn!(
            "{} build {}: {} step has no start or end time",
            record.platform,
            record.number,
            name
        );
        return None;
    };
    let duration = (end - start).trunc() as i64;
    if duration < 0 {
        tracing::warn!(
            "{} build {}: {} step ends before it starts",
            record.platform,
            record.number,
            name
        );
        return None;
    }
    Some(duration)
}

pub fn extract_metrics(record: &BuildRecord) -> BuildMetrics {
    BuildMetrics {
        platform: record.platform.clone(),
        build_num: record.number,
        compile_time: step_duration(record, COMPILE_STEP),
        test_time: step_duration(record, TEST_STEP),
        slave: record.slave.clone(),
    }
}
