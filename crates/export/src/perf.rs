use std::collections::BTreeMap;

use anyhow::Result;
use landed_db::Database;
use serde::Serialize;

/// Rows per platform in the plot data.
pub const PERF_LIMIT: u32 = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformPerf {
    pub plat: String,
    /// `[time in ms, seconds]` pairs.
    pub compile: Vec<(i64, Option<i64>)>,
    pub test: Vec<(i64, Option<i64>)>,
    pub info: Vec<PerfInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfInfo {
    pub changeset: String,
    pub pull_request: Option<u64>,
    pub build_num: u64,
}

/// Collect compile and test times per platform for the last `age_days` days
/// (plus one day of margin so the plot does not start on its first point).
pub async fn perf_data(
    db: &Database,
    all: bool,
    age_days: u32,
    now: i64,
) -> Result<BTreeMap<String, PlatformPerf>> {
    let since = now - (age_days as i64 + 1) * 86400;
    let mut out = BTreeMap::new();
    for plat in db.get_platforms(all).await? {
        let points = db.get_perf_points(&plat, Some(since), PERF_LIMIT).await?;
        let mut perf = PlatformPerf {
            plat: plat.clone(),
            compile: Vec::with_capacity(points.len()),
            test: Vec::with_capacity(points.len()),
            info: Vec::with_capacity(points.len()),
        };
        for point in points {
            // Milliseconds for javascript
            let time = point.time * 1000;
            perf.compile.push((time, point.compile_time));
            perf.test.push((time, point.test_time));
            perf.info.push(PerfInfo {
                changeset: point.changeset,
                pull_request: point.pull_request,
                build_num: point.build_num,
            });
        }
        tracing::debug!("{}: {} points", plat, perf.info.len());
        out.insert(plat, perf);
    }
    Ok(out)
}

pub fn render_perf_js(data: &BTreeMap<String, PlatformPerf>) -> Result<String> {
    Ok(format!("window.PERF_DATA =\n{}\n;", serde_json::to_string(data)?))
}

#[cfg(test)]
mod tests {
    use landed_core::{
        config::DbConfig,
        models::{BuildMetrics, Landing},
    };

    use super::*;

    const DAY: i64 = 86400;

    #[tokio::test]
    async fn test_perf_data() {
        let db = Database::new(&DbConfig { url: "sqlite::memory:".to_string() }).await.unwrap();
        let now = 100 * DAY;
        let build = |plat: &str, compile_time: Option<i64>| BuildMetrics {
            platform: plat.to_string(),
            build_num: 5,
            compile_time,
            test_time: Some(3),
            slave: None,
        };
        for (changeset, time, pull_request) in
            [("old", now - 30 * DAY, Some(1)), ("new", now - DAY, None)]
        {
            let landing = Landing { changeset: changeset.to_string(), pull_request, time };
            let builds = [build("linux-64-opt", Some(60)), build("win-32-nopt-t", None)];
            db.insert_landing(&landing, &builds).await.unwrap();
        }

        let data = perf_data(&db, false, 10, now).await.unwrap();
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["linux-64-opt"]);
        let linux = &data["linux-64-opt"];
        assert_eq!(linux.compile, vec![((now - DAY) * 1000, Some(60))]);
        assert_eq!(linux.info, vec![PerfInfo {
            changeset: "new".to_string(),
            pull_request: None,
            build_num: 5
        }]);

        let data = perf_data(&db, true, 40, now).await.unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["win-32-nopt-t"].compile.len(), 2);
        assert_eq!(data["win-32-nopt-t"].compile[0].1, None);

        let js = render_perf_js(&data).unwrap();
        assert!(js.starts_with("window.PERF_DATA =\n{\"linux-64-opt\":{\"plat\":\"linux-64-opt\""));
        assert!(js.ends_with("\n;"));
    }
}
