//! Integration tests for Lyra

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use lyra::config::{CacheBackend, Config};
    use lyra::metrics::{MetricRow, SqliteStore};
    use predicates::prelude::*;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const TOPOLOGY: &str = "CatchIDN,DwnCatchIDN,Watershed,rep_x,rep_y\n\
        10,24,Aliso,-117.70,33.50\n\
        23,10,Aliso,-117.71,33.55\n\
        16,23,Aliso,-117.72,33.60\n\
        216,23,Aliso,-117.73,33.61\n\
        24,0,Aliso,-117.69,33.45\n";

    /// Workspace with a memory-backed config pointing at fixture files
    struct Fixture {
        dir: TempDir,
        config: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let rsb = dir.path().join("rsb.csv");
            std::fs::write(&rsb, TOPOLOGY).unwrap();
            let layer = dir.path().join("catchments.geojson");
            std::fs::write(&layer, serde_json::to_vec(&layer_fixture()).unwrap()).unwrap();

            let mut config = Config::default();
            config.cache.backend = CacheBackend::Memory;
            config.rsb.source = Some(rsb);
            config.spatial.source = Some(layer);
            config.metrics.database = Some(dir.path().join("metrics.db"));

            let path = dir.path().join("config.toml");
            std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
            Self { dir, config: path }
        }

        fn lyra(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("lyra");
            cmd.env_remove("LYRA_CONFIG").arg("--config").arg(&self.config);
            cmd
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn seed_metrics(&self) {
            let store = SqliteStore::open(&self.path("metrics.db")).unwrap();
            store.insert_category(1, "runoff").unwrap();
            let row = |catchidn, year, month, value| MetricRow {
                catchidn,
                variable: 1,
                year,
                month,
                value,
            };
            store
                .insert_rows(&[
                    row(10, 2019, 10, 1.5),
                    row(10, 2019, 11, 2.5),
                    row(23, 2019, 10, 4.0),
                    row(24, 2019, 10, 100.0),
                ])
                .unwrap();
        }
    }

    fn square(id: i64, downstream: i64, x: f64, y: f64) -> Value {
        json!({
            "type": "Feature",
            "properties": { "CatchIDN": id, "DwnCatchIDN": downstream, "Watershed": "Aliso" },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, y], [x + 0.01, y], [x + 0.01, y + 0.01], [x, y + 0.01], [x, y]]]
            }
        })
    }

    fn layer_fixture() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                square(10, 24, -117.70, 33.50),
                square(23, 10, -117.69, 33.50),
                square(24, 0, -117.68, 33.50),
            ]
        })
    }

    fn stdout_json(output: &[u8]) -> Value {
        serde_json::from_slice(output).unwrap()
    }

    fn ids(collection: &Value) -> Vec<i64> {
        let mut ids: Vec<i64> = collection["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["properties"]["CatchIDN"].as_i64().unwrap())
            .collect();
        ids.sort();
        ids
    }

    fn assert_exists(path: &Path) {
        assert!(path.exists(), "{} should exist", path.display());
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("lyra")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("watershed catchment"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("lyra")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("lyra"));
    }

    #[test]
    fn config_path_follows_flag() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]").and(predicate::str::contains("memory")));
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--force"));

        let fresh = fx.path("fresh.toml");
        cargo_bin_cmd!("lyra")
            .env_remove("LYRA_CONFIG")
            .arg("--config")
            .arg(&fresh)
            .args(["config", "init"])
            .assert()
            .success();
        assert_exists(&fresh);
    }

    #[test]
    fn trace_upstream() {
        let fx = Fixture::new();
        let out = fx
            .lyra()
            .args(["trace", "upstream", "10"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert_eq!(stdout_json(&out), json!([10, 16, 23, 216]));
    }

    #[test]
    fn trace_downstream_plain() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["trace", "downstream", "16", "--format", "plain"])
            .assert()
            .success()
            .stdout("0\n10\n16\n23\n24\n");
    }

    #[test]
    fn trace_envelope_reports_cache_state() {
        let fx = Fixture::new();
        let out = fx
            .lyra()
            .args(["trace", "upstream", "23", "--envelope"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let envelope = stdout_json(&out);
        assert_eq!(envelope["status"], "SUCCESS");
        assert_eq!(envelope["data"], json!([16, 23, 216]));
    }

    #[test]
    fn trace_without_source_fails_with_hint() {
        let dir = TempDir::new().unwrap();
        cargo_bin_cmd!("lyra")
            .env_remove("LYRA_CONFIG")
            .arg("--config")
            .arg(dir.path().join("none.toml"))
            .args(["trace", "upstream", "10"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No rsb source configured"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn spatial_geojson_filters_by_catchment() {
        let fx = Fixture::new();
        let out = fx
            .lyra()
            .args([
                "spatial", "--format", "geojson", "--catchidn", "10", "--catchidn", "24",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert_eq!(ids(&stdout_json(&out)), vec![10, 24]);
    }

    #[test]
    fn spatial_upstream_of() {
        let fx = Fixture::new();
        let out = fx
            .lyra()
            .args(["spatial", "--format", "geojson", "--upstream-of", "10"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert_eq!(ids(&stdout_json(&out)), vec![10, 23]);
    }

    #[test]
    fn spatial_defaults_to_topojson() {
        let fx = Fixture::new();
        let out = fx
            .lyra()
            .args(["spatial"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let topology = stdout_json(&out);
        assert_eq!(topology["type"], "Topology");
        assert_eq!(
            topology["objects"]["data"]["geometries"]
                .as_array()
                .unwrap()
                .len(),
            3
        );
    }

    #[test]
    fn spatial_unsupported_format() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["spatial", "--format", "shp"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unsupported output format"))
            .stderr(predicate::str::contains("geojson, topojson"));
    }

    #[test]
    fn spatial_table_drops_geometry() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["spatial", "--table", "--catchidn", "23"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"CatchIDN\":23"))
            .stdout(predicate::str::contains("coordinates").not());
    }

    #[test]
    fn metrics_list_variables() {
        let fx = Fixture::new();
        fx.seed_metrics();
        fx.lyra()
            .args(["metrics", "--list-variables"])
            .assert()
            .success()
            .stdout(predicate::str::contains("runoff"));
    }

    #[test]
    fn metrics_yearly_sum() {
        let fx = Fixture::new();
        fx.seed_metrics();
        let out = fx
            .lyra()
            .args([
                "metrics", "--catchidn", "10", "--variable", "runoff", "--agg", "sum", "--by",
                "year",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert_eq!(
            stdout_json(&out),
            json!([{ "variable": "runoff", "year": 2019, "value": 4.0 }])
        );
    }

    #[test]
    fn metrics_upstream_expansion() {
        let fx = Fixture::new();
        fx.seed_metrics();
        let out = fx
            .lyra()
            .args([
                "metrics", "--catchidn", "10", "--variable", "runoff", "--start", "2019-10", "--end",
                "2019-10", "--upstream",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let records = stdout_json(&out);
        let catchments: Vec<i64> = records
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["catchidn"].as_i64().unwrap())
            .collect();
        assert_eq!(catchments, vec![10, 23]);
    }

    #[test]
    fn metrics_unknown_variable() {
        let fx = Fixture::new();
        fx.seed_metrics();
        fx.lyra()
            .args(["metrics", "--variable", "snowpack"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown variable"))
            .stderr(predicate::str::contains("--list-variables"));
    }

    #[test]
    fn metrics_empty_result_reports_filters() {
        let fx = Fixture::new();
        fx.seed_metrics();
        fx.lyra()
            .args(["metrics", "--catchidn", "999", "--variable", "runoff"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Bad Query Filters"))
            .stderr(predicate::str::contains("999"));
    }

    #[test]
    fn metrics_invalid_date() {
        let fx = Fixture::new();
        fx.seed_metrics();
        fx.lyra()
            .args(["metrics", "--variable", "runoff", "--start", "2019-13"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected YYYY-MM"));
    }

    #[test]
    fn hydstra_without_endpoint_fails_with_hint() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["hydstra", "212250", "100"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No hydstra source configured"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn hydstra_unreachable_endpoint_reports_failure_envelope() {
        let fx = Fixture::new();
        let out = fx
            .lyra()
            .args([
                "hydstra",
                "212250",
                "100",
                "--base-url",
                "http://127.0.0.1:1/cgi/webservice.exe",
                "--wait-ms",
                "0",
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let envelope = stdout_json(&out);
        assert_eq!(envelope["status"], "FAILURE");
        assert_eq!(envelope["process_type"], "async_background");
        assert!(envelope["result_route"]
            .as_str()
            .unwrap()
            .starts_with("/tasks/"));
    }

    #[test]
    fn cache_status() {
        let fx = Fixture::new();
        fx.lyra()
            .args(["cache", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("memory"));
    }

    #[test]
    fn cache_disable_persists() {
        let fx = Fixture::new();
        fx.lyra().args(["cache", "disable"]).assert().success();
        fx.lyra()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("enabled = false"));
    }
}
