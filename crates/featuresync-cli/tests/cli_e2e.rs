use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use featuresync_engine::{Entity, EntityCollection, EntityKey, GraphSnapshot, MemoryGraph};
use featuresync_model::{AssociationValue, AttributeMap, AttributeValue, PrimitiveAttribute, Scalar};
use tempfile::{tempdir, TempDir};

const SCHEMA: &str = r#"{
    "name": "parcel",
    "identifier": {"name": "fid", "kind": "long"},
    "attributes": [
        {"type": "primitive", "name": "label", "kind": "string", "editable": true},
        {
            "type": "association",
            "name": "owners",
            "kind": "one_to_many",
            "editable": true,
            "schema": {
                "name": "owner",
                "identifier": {"name": "id", "kind": "long"},
                "attributes": [
                    {"type": "primitive", "name": "name", "kind": "string", "editable": true}
                ]
            }
        }
    ]
}"#;

fn featuresync_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_featuresync"))
}

struct Workspace {
    dir: TempDir,
    parcel: EntityKey,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempdir().expect("create temp dir");
        fs::write(dir.path().join("schema.json"), SCHEMA).expect("write schema");

        let graph = MemoryGraph::new();
        graph.register_datasource("parcel", "fid");
        graph.register_datasource("owner", "id");
        let parcel = graph.insert("parcel", [("fid", Scalar::Long(10)), ("label", Scalar::from("north"))]).unwrap();
        let owners = graph.handle(parcel).attach_child_collection("owners").unwrap();
        for id in [1, 2, 3] {
            let owner = graph.insert("owner", [("id", Scalar::Long(id)), ("name", Scalar::from(format!("o{id}")))]).unwrap();
            owners.add_entity(&graph.handle(owner)).unwrap();
        }
        let snapshot = serde_json::to_string_pretty(&graph.snapshot()).unwrap();
        fs::write(dir.path().join("graph.json"), snapshot).expect("write graph");

        Self { dir, parcel }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_input(&self, attributes: &AttributeMap) -> PathBuf {
        let path = self.path("input.json");
        fs::write(&path, serde_json::to_string(attributes).unwrap()).expect("write input");
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        let entity = self.parcel.get().to_string();
        let schema = self.path("schema.json");
        let graph = self.path("graph.json");
        Command::new(featuresync_bin())
            .args(args)
            .arg("--schema")
            .arg(&schema)
            .arg("--graph")
            .arg(&graph)
            .arg("--entity")
            .arg(&entity)
            .env("NO_COLOR", "1")
            .env_remove("FEATURESYNC_LOG")
            .output()
            .expect("run featuresync")
    }
}

fn load_graph(path: &Path) -> MemoryGraph {
    let snapshot: GraphSnapshot = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    MemoryGraph::from_snapshot(snapshot).unwrap()
}

fn owners_input(ids: &[i64]) -> AttributeMap {
    let members = ids
        .iter()
        .map(|id| {
            let mut attributes = AttributeMap::new();
            attributes.insert("name".to_string(), AttributeValue::primitive(format!("renamed{id}")));
            AssociationValue::new(Some(PrimitiveAttribute::of(*id)), attributes)
        })
        .collect();
    let mut input = AttributeMap::new();
    input.insert("owners".to_string(), AttributeValue::one_to_many(Some(members)));
    input.insert("label".to_string(), AttributeValue::primitive("south"));
    input
}

#[test]
fn plan_prints_tree_without_writing() {
    let ws = Workspace::new();
    let input = ws.write_input(&owners_input(&[1, 2]));
    let before = fs::read_to_string(ws.path("graph.json")).unwrap();

    let output = ws.run(&["plan", "--input", input.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("update_entity label=south"), "{stdout}");
    assert!(stdout.contains("update_many_value owners #1"), "{stdout}");
    assert!(stdout.contains("remove_many_value owners #3"), "{stdout}");
    assert_eq!(fs::read_to_string(ws.path("graph.json")).unwrap(), before);
}

#[test]
fn apply_writes_reconciled_snapshot() {
    let ws = Workspace::new();
    let input = ws.write_input(&owners_input(&[1, 2, 7]));
    let out = ws.path("out.json");

    let output = ws.run(&["apply", "--input", input.to_str().unwrap(), "--out", out.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Applied"));

    let graph = load_graph(&out);
    let parcel = graph.handle(ws.parcel);
    assert_eq!(parcel.attribute("label").unwrap(), Some(Scalar::from("south")));

    let mut ids: Vec<_> = parcel
        .child_collection("owners")
        .unwrap()
        .unwrap()
        .entities()
        .unwrap()
        .iter()
        .filter_map(|owner| owner.id("id").unwrap().and_then(|id| id.as_i64()))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 7]);
}

#[test]
fn get_prints_value_as_json() {
    let ws = Workspace::new();

    let output = ws.run(&["get", "--path", "owners"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let value: AttributeValue = serde_json::from_slice(&output.stdout).unwrap();
    let owners = value.as_one_to_many().unwrap();
    assert_eq!(owners.len(), 3);
    assert_eq!(owners[0].attribute_value("name"), Some(&Scalar::from("o1")));
}

#[test]
fn get_unknown_attribute_fails_with_valid_names() {
    let ws = Workspace::new();

    let output = ws.run(&["get", "--path", "missing"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unknown attribute `missing`"), "{stderr}");
    assert!(stderr.contains("label, owners"), "{stderr}");
}

#[test]
fn config_file_changes_id_alias() {
    let ws = Workspace::new();
    let config = ws.path("config.json");
    fs::write(&config, r#"{"id_alias": "@fid"}"#).unwrap();

    let output = ws.run(&["--config", config.to_str().unwrap(), "get", "--path", "@fid"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let value: AttributeValue = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value.scalar(), Some(&Scalar::Long(10)));
}

#[test]
fn verbose_flag_logs_loaded_inputs() {
    let ws = Workspace::new();

    let quiet = ws.run(&["get", "--path", "label"]);
    assert!(quiet.status.success(), "{}", String::from_utf8_lossy(&quiet.stderr));
    assert!(!String::from_utf8_lossy(&quiet.stderr).contains("loaded schema and graph"));

    let verbose = ws.run(&["-v", "get", "--path", "label"]);
    assert!(verbose.status.success(), "{}", String::from_utf8_lossy(&verbose.stderr));
    let stderr = String::from_utf8_lossy(&verbose.stderr);
    assert!(stderr.contains("loaded schema and graph"), "{stderr}");
    assert!(stderr.contains("engine config"), "{stderr}");
}
