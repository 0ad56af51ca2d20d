use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::thread;

use hsperf_core::collector::{JvmCollector, JvmPoller, MockFs, PerfDataBuilder, RealFs};
use hsperf_core::config::CollectorConfig;
use hsperf_core::event::FieldValue;
use hsperf_core::perfdata::{Endian, Variability};

fn two_counter_file(endian: Endian, loaded_classes: i64) -> Vec<u8> {
    started_at_file(endian, "1714564800000", loaded_classes)
}

fn started_at_file(endian: Endian, vm_begin: &str, loaded_classes: i64) -> Vec<u8> {
    PerfDataBuilder::new(endian)
        .text("sun.rt.createVmBeginTime", vm_begin, Variability::Constant)
        .long("java.cls.loadedClasses", loaded_classes, Variability::Variable)
        .build()
}

#[test]
fn two_polls_emit_constants_once_and_diffs_after() {
    for endian in [Endian::Big, Endian::Little] {
        let fs = MockFs::new();
        fs.add_perfdata("/tmp", "app", "1234", two_counter_file(endian, 120));
        let config = CollectorConfig {
            tmp_dir: "/tmp".into(),
            pid: Some("1234".to_string()),
            ..Default::default()
        };
        let mut collector = JvmCollector::new(fs.clone(), config);

        let first = collector.fetch().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].pid, "1234");
        assert_eq!(
            first[0].get("sun/rt/createVmBeginTime"),
            Some(&FieldValue::Text("1714564800000".to_string()))
        );
        assert_eq!(first[0].long("java/cls/loadedClasses"), Some(120));
        assert_eq!(first[0].len(), 2);

        fs.add_perfdata("/tmp", "app", "1234", two_counter_file(endian, 135));
        let second = collector.fetch().unwrap();
        assert_eq!(second[0].long("java/cls/loadedClasses"), Some(135));
        assert_eq!(second[0].diff("java/cls/loadedClasses"), Some(15));
        assert!(!second[0].contains("sun/rt/createVmBeginTime"));
        assert_eq!(second[0].len(), 2);
    }
}

#[test]
fn events_serialize_to_flat_json() {
    let fs = MockFs::new();
    fs.add_perfdata("/tmp", "app", "1234", two_counter_file(Endian::Big, 7));
    let config = CollectorConfig {
        tmp_dir: "/tmp".into(),
        ..Default::default()
    };
    let mut collector = JvmCollector::new(fs, config);
    let events = collector.fetch().unwrap();

    let json: serde_json::Value = serde_json::from_str(&events[0].to_json().unwrap()).unwrap();
    assert_eq!(json["pid"], "1234");
    assert!(json["@timestamp"].is_string());
    assert_eq!(json["java/cls/loadedClasses"], 7);
    assert_eq!(json["sun/rt/createVmBeginTime"], "1714564800000");
}

#[test]
fn pollers_run_independently_on_threads() {
    let dir = tempfile::tempdir().unwrap();
    let user_dir = dir.path().join("hsperfdata_app");
    fs::create_dir(&user_dir).unwrap();

    let handles: Vec<_> = (0..4i64)
        .map(|n| {
            let path = user_dir.join(format!("{}", 100 + n));
            fs::write(&path, two_counter_file(Endian::native(), n * 10)).unwrap();
            let mut poller = JvmPoller::new(
                RealFs::new(),
                format!("{}", 100 + n),
                path.clone(),
                Arc::new(HashSet::new()),
            );
            thread::spawn(move || {
                poller.poll().unwrap();
                fs::write(&path, two_counter_file(Endian::native(), n * 10 + n)).unwrap();
                poller.poll().unwrap().diff("java/cls/loadedClasses")
            })
        })
        .collect();

    let diffs: Vec<Option<i64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(diffs, vec![Some(0), Some(1), Some(2), Some(3)]);
}

#[test]
fn restarted_jvm_under_same_pid_starts_over() {
    let dir = tempfile::tempdir().unwrap();
    let user_dir = dir.path().join("hsperfdata_app");
    fs::create_dir(&user_dir).unwrap();
    let path = user_dir.join("77");
    fs::write(&path, started_at_file(Endian::native(), "1714564800000", 900)).unwrap();

    let config = CollectorConfig {
        tmp_dir: dir.path().to_path_buf(),
        pid: Some("77".to_string()),
        ..Default::default()
    };
    let mut collector = JvmCollector::new(RealFs::new(), config);
    collector.fetch().unwrap();

    fs::write(&path, started_at_file(Endian::native(), "1714564999000", 40)).unwrap();
    let err = collector.fetch().unwrap_err();
    assert!(err.errors()[0].is_layout_changed());

    let events = collector.fetch().unwrap();
    assert_eq!(events[0].long("java/cls/loadedClasses"), Some(40));
    assert_eq!(events[0].diff("java/cls/loadedClasses"), None);
    assert_eq!(
        events[0].get("sun/rt/createVmBeginTime"),
        Some(&FieldValue::Text("1714564999000".to_string()))
    );
}

#[test]
fn discovery_on_real_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    for (user, pid) in [("app", "41"), ("batch", "42")] {
        let user_dir = dir.path().join(format!("hsperfdata_{}", user));
        fs::create_dir(&user_dir).unwrap();
        fs::write(user_dir.join(pid), two_counter_file(Endian::native(), 1)).unwrap();
    }
    fs::create_dir(dir.path().join("unrelated")).unwrap();

    let config = CollectorConfig {
        tmp_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let mut collector = JvmCollector::new(RealFs::new(), config);
    let events = collector.fetch().unwrap();
    let pids: Vec<&str> = events.iter().map(|e| e.pid.as_str()).collect();
    assert_eq!(pids, vec!["41", "42"]);
}
