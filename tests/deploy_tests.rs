//! Deployment pipeline: bundle unpacking and per-unit fault containment.

mod common;

use common::apps::write_app;
use common::setup_may_runtime;
use std::path::Path;
use std::sync::Arc;
use tenement::app::{AppRegistry, Application, DeployContext, LifecycleState};
use tenement::deploy::{deploy, deploy_all, discover_bundles, discover_roots, unpack};
use tenement::dispatch::{HandlerRequest, Response};
use tenement::error::DeployError;
use tenement::loader::HandlerTable;
use tenement::pool::Pool;
use tenement::worker_pool::WorkerPoolConfig;
use tenement::{builtin, ActionHandler};

fn ctx() -> DeployContext {
    DeployContext {
        shared: Arc::new(builtin::shared_table()),
        shared_resources: None,
        worker: WorkerPoolConfig::default(),
        sessions: Arc::new(Pool::new()),
        responses: Arc::new(Pool::new()),
    }
}

/// Pack a directory into `<name>.tar` next to it, entries relative to the
/// directory root.
fn pack(dir: &Path, out: &Path) {
    let file = std::fs::File::create(out).unwrap();
    let mut builder = tar::Builder::new(file);
    builder.append_dir_all(".", dir).unwrap();
    builder.finish().unwrap();
}

#[test]
fn test_unpack_names_directory_after_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let stage = write_app(
        &dir.path().join("stage"),
        "shop",
        "actions: []\n",
        &[("public/index.html", "<h1>shop</h1>")],
    );
    let bundle = dir.path().join("shop.tar");
    pack(&stage, &bundle);

    let apps_dir = dir.path().join("apps");
    std::fs::create_dir_all(&apps_dir).unwrap();
    let target = unpack(&bundle, &apps_dir).unwrap();

    assert_eq!(target, apps_dir.join("shop"));
    assert!(target.join("app.yaml").is_file());
    assert!(target.join("public/index.html").is_file());
}

#[test]
fn test_unpack_replaces_previous_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let stage = write_app(&dir.path().join("stage"), "shop", "actions: []\n", &[]);
    let bundle = dir.path().join("shop.tar");
    pack(&stage, &bundle);

    let apps_dir = dir.path().join("apps");
    std::fs::create_dir_all(&apps_dir).unwrap();
    let target = unpack(&bundle, &apps_dir).unwrap();
    std::fs::write(target.join("stale.txt"), "left over").unwrap();

    let target = unpack(&bundle, &apps_dir).unwrap();
    assert!(!target.join("stale.txt").exists());
    assert!(target.join("app.yaml").is_file());
}

#[test]
fn test_unpack_malformed_archive_is_extract_error() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("broken.tar");
    std::fs::write(&bundle, [0xDEu8; 1024]).unwrap();

    let err = unpack(&bundle, dir.path()).unwrap_err();
    assert!(matches!(err, DeployError::Extract { .. }));
}

#[test]
fn test_discovery_separates_bundles_and_roots() {
    let dir = tempfile::tempdir().unwrap();
    write_app(dir.path(), "unpacked", "actions: []\n", &[]);
    std::fs::write(dir.path().join("packed.tar"), b"").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignore me").unwrap();

    let bundles: Vec<_> = discover_bundles(dir.path()).unwrap().collect();
    assert_eq!(bundles.len(), 1);
    assert!(bundles[0].ends_with("packed.tar"));

    let roots: Vec<_> = discover_roots(dir.path()).unwrap().collect();
    assert_eq!(roots.len(), 1);
    assert!(roots[0].ends_with("unpacked"));
}

#[test]
fn test_one_bad_unit_leaves_the_rest_running() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    write_app(dir.path(), "good-one", common::apps::echo_manifest(), &[]);
    write_app(dir.path(), "good-two", common::apps::echo_manifest(), &[]);
    // references a handler nobody provides
    write_app(
        dir.path(),
        "broken",
        "actions:\n  - route: /x\n    handler: no_such_handler\n",
        &[],
    );
    // not even valid YAML
    write_app(dir.path(), "mangled", "actions: [;;;\n", &[]);

    let registry = AppRegistry::new();
    let deployed = deploy_all(
        dir.path(),
        &registry,
        &ctx(),
        &mut std::collections::HashMap::new(),
    )
    .unwrap();

    assert_eq!(deployed, 2);
    assert_eq!(registry.len(), 2);
    assert!(registry.lookup("good-one").is_some());
    assert!(registry.lookup("good-two").is_some());
    assert!(registry.lookup("broken").is_none());
}

struct PanicsOnInit;

impl ActionHandler for PanicsOnInit {
    fn init(&self, _app: &str) -> anyhow::Result<()> {
        panic!("application start code gone wrong");
    }

    fn handle(&self, _req: &HandlerRequest, _res: &mut Response) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn test_panicking_start_code_is_contained() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    write_app(dir.path(), "steady", common::apps::echo_manifest(), &[]);
    write_app(
        dir.path(),
        "volatile",
        "actions:\n  - route: /x\n    handler: exploding\n",
        &[],
    );

    let mut own_tables = std::collections::HashMap::new();
    let mut volatile_table = HandlerTable::new();
    volatile_table.register_handler("exploding", Arc::new(PanicsOnInit));
    own_tables.insert("volatile".to_string(), volatile_table);

    let registry = AppRegistry::new();
    let deployed = deploy_all(dir.path(), &registry, &ctx(), &mut own_tables).unwrap();

    assert_eq!(deployed, 1);
    assert!(registry.lookup("steady").is_some());
    assert!(registry.lookup("volatile").is_none());
}

#[test]
fn test_lifecycle_transitions() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    let root = write_app(dir.path(), "lifecycle", common::apps::echo_manifest(), &[]);

    let ctx = ctx();
    let fresh = Application::new(&root, &ctx);
    assert_eq!(fresh.state(), LifecycleState::Stopped);

    let app = deploy(&root, &ctx, HandlerTable::new()).unwrap();
    assert_eq!(app.state(), LifecycleState::Running);

    app.stop();
    assert_eq!(app.state(), LifecycleState::Stopped);
}

#[test]
fn test_registry_collision_keeps_last_registration() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    // both claim the same routing host
    let manifest = "host: same.example.com\nactions: []\n";
    write_app(dir.path(), "first", manifest, &[]);
    write_app(dir.path(), "second", manifest, &[]);

    let registry = AppRegistry::new();
    let deployed = deploy_all(
        dir.path(),
        &registry,
        &ctx(),
        &mut std::collections::HashMap::new(),
    )
    .unwrap();

    assert_eq!(deployed, 2);
    // one routing key, both units reachable for shutdown iteration
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.all().len(), 2);
    assert!(registry.lookup("Same.Example.Com").is_some());
}
