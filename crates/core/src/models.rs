use serde::Serialize;

/// One successful-or-not build of a platform builder, as reported by the CI server.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRecord {
    pub platform: String,
    pub changeset: Option<String>,
    pub successful: bool,
    pub steps: Vec<BuildStep>,
    /// Source changes attached to the build's first source stamp.
    pub changes: Vec<SourceChange>,
    pub number: u64,
    pub slave: Option<String>,
}

impl BuildRecord {
    pub fn step(&self, name: &str) -> Option<&BuildStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Start time of the first step, used to approximate when the build began.
    pub fn started_at(&self) -> Option<f64> { self.steps.first().and_then(|s| s.start) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildStep {
    pub name: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceChange {
    pub comments: String,
    pub when: Option<f64>,
}

/// Attribution of a landed changeset, ready to be stored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Landing {
    pub changeset: String,
    pub pull_request: Option<u64>,
    /// Unix timestamp in seconds.
    pub time: i64,
}

/// Per-platform metrics for a landed changeset, ready to be stored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BuildMetrics {
    pub platform: String,
    pub build_num: u64,
    pub compile_time: Option<i64>,
    pub test_time: Option<i64>,
    pub slave: Option<String>,
}

/// A stored `change` row.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Change {
    pub id: i64,
    pub changeset: String,
    pub pull_request: Option<u64>,
    pub time: i64,
}

/// A stored `build` row.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Build {
    pub change_id: i64,
    pub build_num: u64,
    pub platform: String,
    pub compile_time: Option<i64>,
    pub test_time: Option<i64>,
    pub slave: Option<String>,
}

/// A build joined with the change it belongs to, as used by the perf plots.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct PerfPoint {
    pub time: i64,
    pub changeset: String,
    pub pull_request: Option<u64>,
    pub build_num: u64,
    pub compile_time: Option<i64>,
    pub test_time: Option<i64>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PullRequestInfo {
    pub number: u64,
    pub title: String,
    pub merge_commit: Option<String>,
}
