#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use engine_config::settings::PipelineSettings;
use engine_core::retry::RetryPolicy;
use std::{fs, path::Path, time::Duration};

pub mod utils;

/// Fixed wall-clock instant the scenarios run at.
pub fn scenario_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
}

/// Small, fast settings: millisecond backoff, short poll and drain windows.
pub fn test_settings() -> PipelineSettings {
    let mut settings = PipelineSettings::default();
    settings.runtime.workers = 3;
    settings.runtime.shards = 2;
    settings.runtime.poll_interval = Duration::from_millis(5);
    settings.runtime.tick_interval = Duration::from_millis(10);
    settings.runtime.write_timeout = Duration::from_millis(500);
    settings.runtime.drain_timeout = Duration::from_secs(10);
    settings.transform.lookup_timeout = Duration::from_millis(200);
    settings.retry = RetryPolicy::new(3, Duration::from_millis(2), Duration::from_millis(10), 0.1);
    settings
}

/// Writes newline-delimited payloads into `dir/name`.
pub fn write_input(dir: &Path, name: &str, payloads: &[String]) {
    let mut body = payloads.join("\n");
    body.push('\n');
    fs::write(dir.join(name), body).unwrap();
}

/// Every `*.jsonl` object below `root`, keyed by its path relative to root.
pub fn written_objects(root: &Path) -> Vec<(String, Vec<serde_json::Value>)> {
    let mut objects = Vec::new();
    collect_objects(root, root, &mut objects);
    objects.sort_by(|a, b| a.0.cmp(&b.0));
    objects
}

fn collect_objects(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<serde_json::Value>)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_objects(root, &path, out);
        } else if path.extension().is_some_and(|e| e == "jsonl") {
            let rows = fs::read_to_string(&path)
                .unwrap()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect();
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
            out.push((rel, rows));
        }
    }
}
