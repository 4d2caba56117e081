use pgas_bench::harness::{BandwidthSettings, LatencySettings};
use pgas_bench::{
    ArgStyle, ComparisonHarness, HarnessConfig, Implementation, Primitive, ScriptedLauncher,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn config(dir: &Path) -> HarnessConfig {
    HarnessConfig {
        report_dir: dir.to_path_buf(),
        median_n: 3,
        latency: LatencySettings {
            ntimes: 1000,
            primitives: vec![Primitive::Barrier, Primitive::AtomicInc],
        },
        bandwidth: BandwidthSettings {
            ntimes: 100,
            msg_size_max: 4,
            primitives: vec![Primitive::Put],
        },
        launcher: vec![],
        implementations: vec![
            Implementation::new("C", &["cdrv"], ArgStyle::Legacy),
            Implementation::new("RS", &["rsdrv"], ArgStyle::Standard),
        ],
    }
}

fn scripted() -> ScriptedLauncher {
    let launcher = ScriptedLauncher::new();
    launcher.respond(
        "cdrv --bench shmem_barrier_all --benchtype latency --ntimes 1000",
        "Avg Time per Barrier (us): 10.00\n",
    );
    launcher.respond(
        "rsdrv --bench barrier --ntimes 1000",
        "Avg Time per Barrier (us): 12.00000000 (12000.00 total us)\n",
    );

    // Three trials each; the median is the middle value.
    for out in ["0.30", "0.10", "0.20"] {
        launcher.respond(
            "cdrv --bench shmem_atomic_inc --benchtype latency --ntimes 1000",
            format!("Avg Time per Increment (us): {}\n", out),
        );
    }
    for out in ["0.50", "0.40", "0.60"] {
        launcher.respond(
            "rsdrv --bench atomic-inc --ntimes 1000",
            format!("Avg Time per Increment (us): {}\n", out),
        );
    }

    launcher.respond(
        "cdrv --bench shmem_put --benchtype latency --ntimes 100 --min 1 --max 4",
        "size (b)\t\tlatency (us)\t\t\tbandwidth (MiB/s)\n\
         1\t\t\t      0.25\t\t\t           3.81\n\
         2\t\t\t      0.25\t\t\t           7.63\n\
         4\t\t\t      0.50\t\t\t           7.63\n",
    );
    launcher.respond(
        "rsdrv --bench put --ntimes 100 --msg-size-max 4",
        "1\t0.50\t1.91\n2\t0.50\t3.81\n4\t0.25\t15.26\n",
    );
    launcher
}

#[tokio::test]
async fn full_run_writes_normalized_reports() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("results");

    let harness = ComparisonHarness::new(config(&dir), scripted());
    let report = harness.run().await.unwrap();
    assert_eq!(report.latency.len(), 2);
    assert_eq!(report.bandwidth.len(), 1);

    let latency = fs::read_to_string(dir.join("latency.csv")).unwrap();
    assert!(latency.ends_with("\r\n"));
    let lines: Vec<&str> = latency.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Routine,C (baseline),RS (normalized),\"C (raw, us)\",\"RS (raw, us)\"",
            "barrier,1.0,1.2000000000,10.0000000000,12.0000000000",
            "atomic-inc,1.0,2.5000000000,0.2000000000,0.5000000000",
        ]
    );

    let put = fs::read_to_string(dir.join("bw_put.csv")).unwrap();
    let lines: Vec<&str> = put.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[1], "1,1.0000000000,2.0000000000,0.2500000000,0.5000000000");
    assert_eq!(lines[3], "4,1.0000000000,0.5000000000,0.5000000000,0.2500000000");

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["metadata"]["version"], pgas_bench::VERSION);
    assert_eq!(summary["config"]["median_n"], 3);
    assert_eq!(summary["report"]["latency"][0]["primitive"], "barrier");
}

#[tokio::test]
async fn identical_measurements_give_identical_csv_bytes() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    ComparisonHarness::new(config(first.path()), scripted())
        .run()
        .await
        .unwrap();
    ComparisonHarness::new(config(second.path()), scripted())
        .run()
        .await
        .unwrap();

    for name in ["latency.csv", "bw_put.csv"] {
        let a = fs::read(first.path().join(name)).unwrap();
        let b = fs::read(second.path().join(name)).unwrap();
        assert_eq!(a, b, "{} differs between runs", name);
    }
}

#[tokio::test]
async fn every_trial_is_launched_in_order() {
    let tmp = TempDir::new().unwrap();
    let harness = ComparisonHarness::new(config(tmp.path()), scripted());
    harness.run().await.unwrap();

    let calls = harness.launcher().calls();
    // 2 latency primitives + 1 sweep, 2 implementations, 3 trials each.
    assert_eq!(calls.len(), 18);
    assert!(calls[..3].iter().all(|c| c.starts_with("cdrv --bench shmem_barrier_all")));
    assert!(calls[3..6].iter().all(|c| c == "rsdrv --bench barrier --ntimes 1000"));
    assert!(calls[12..15].iter().all(|c| c.starts_with("cdrv --bench shmem_put")));
}

#[tokio::test]
async fn unparseable_output_aborts_without_reports() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("results");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("latency.csv"), "stale").unwrap();

    let launcher = scripted();
    launcher.respond("rsdrv --bench barrier --ntimes 1000", "Segmentation fault\n");
    // The first scripted entry is consumed by trial one; the rest see garbage.
    let harness = ComparisonHarness::new(config(&dir), launcher);
    assert!(harness.run().await.is_err());

    assert!(dir.exists());
    assert!(!dir.join("latency.csv").exists());
}
