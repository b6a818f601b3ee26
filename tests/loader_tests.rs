//! Application isolation through the loader.
//!
//! Two applications sharing a host must never see each other's private
//! handlers or resources, while both fall back to the host's shared stock.

mod common;

use common::apps::write_app;
use common::setup_may_runtime;
use http::Method;
use std::sync::Arc;
use tenement::app::{Application, DeployContext, LifecycleState};
use tenement::deploy::deploy;
use tenement::dispatch::{HandlerRequest, HeaderVec, ParamVec, Response};
use tenement::error::{DeployError, StartError};
use tenement::ids::RequestId;
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

fn text_handler(body: &'static str) -> Arc<dyn ActionHandler> {
    Arc::new(move |_: &HandlerRequest, res: &mut Response| {
        res.write(body.as_bytes());
        Ok(())
    })
}

fn do_request(app: &Arc<Application>, method: Method, path: &str) -> Response {
    let session = app.sessions().resolve(None, "");
    let request = HandlerRequest {
        request_id: RequestId::new(),
        app: Arc::clone(app.name()),
        method,
        path: path.to_string(),
        path_params: ParamVec::new(),
        query_params: ParamVec::new(),
        headers: HeaderVec::new(),
        cookies: HeaderVec::new(),
        body: None,
        session,
        remote_addr: String::new(),
    };
    app.dispatch(request, Response::default())
}

const SECRET_MANIFEST: &str = "actions:\n  - route: /secret\n    handler: secret\n";

#[test]
fn test_private_handler_not_resolvable_from_other_app() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    let root_a = write_app(dir.path(), "alpha", SECRET_MANIFEST, &[]);
    let root_b = write_app(dir.path(), "beta", SECRET_MANIFEST, &[]);

    let ctx = ctx();
    let mut own_a = HandlerTable::new();
    own_a.register_handler("secret", text_handler("alpha-private"));

    let alpha = deploy(&root_a, &ctx, own_a).expect("alpha deploys");
    assert_eq!(alpha.state(), LifecycleState::Running);

    // beta declares the same handler name but was never given the code
    let err = deploy(&root_b, &ctx, HandlerTable::new()).unwrap_err();
    match err {
        DeployError::Start {
            source: StartError::UnresolvedHandler(name),
            ..
        } => assert_eq!(name, "secret"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_child_table_overrides_shared_handler() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    let manifest = "actions:\n  - route: /echo\n    handler: echo\n";
    let root_a = write_app(dir.path(), "alpha", manifest, &[]);
    let root_b = write_app(dir.path(), "beta", manifest, &[]);

    let ctx = ctx();
    let mut own_a = HandlerTable::new();
    own_a.register_handler("echo", text_handler("alpha-override"));

    let alpha = deploy(&root_a, &ctx, own_a).unwrap();
    let beta = deploy(&root_b, &ctx, HandlerTable::new()).unwrap();

    let res = do_request(&alpha, Method::GET, "/echo");
    assert_eq!(res.status(), 200);
    assert_eq!(res.body(), b"alpha-override");

    // beta still gets the shared echo, untouched by alpha's override
    let res = do_request(&beta, Method::GET, "/echo");
    assert_eq!(res.status(), 200);
    let json: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
    assert_eq!(json["app"], "beta");
}

#[test]
fn test_static_resources_are_per_app() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    let root_a = write_app(
        dir.path(),
        "alpha",
        "actions: []\n",
        &[("public/secret.txt", "alpha eyes only")],
    );
    let root_b = write_app(dir.path(), "beta", "actions: []\n", &[]);

    let ctx = ctx();
    let alpha = deploy(&root_a, &ctx, HandlerTable::new()).unwrap();
    let beta = deploy(&root_b, &ctx, HandlerTable::new()).unwrap();

    let res = do_request(&alpha, Method::GET, "/secret.txt");
    assert_eq!(res.status(), 200);
    let file = res.file().expect("static file resolved");
    assert!(file.starts_with(&root_a));

    let res = do_request(&beta, Method::GET, "/secret.txt");
    assert_eq!(res.status(), 404);
    assert!(res.file().is_none());
}

#[test]
fn test_shared_resources_fall_back_child_first() {
    setup_may_runtime();
    let dir = tempfile::tempdir().unwrap();
    let shared_dir = dir.path().join("shared");
    std::fs::create_dir_all(&shared_dir).unwrap();
    std::fs::write(shared_dir.join("common.css"), "shared-css").unwrap();

    let root_a = write_app(
        dir.path(),
        "alpha",
        "actions: []\n",
        &[("public/common.css", "alpha-css")],
    );
    let root_b = write_app(dir.path(), "beta", "actions: []\n", &[]);

    let mut ctx = ctx();
    ctx.shared_resources = Some(shared_dir.clone());

    let alpha = deploy(&root_a, &ctx, HandlerTable::new()).unwrap();
    let beta = deploy(&root_b, &ctx, HandlerTable::new()).unwrap();

    // own copy wins
    let res = do_request(&alpha, Method::GET, "/common.css");
    assert!(res.file().unwrap().starts_with(&root_a));

    // no own copy: falls through to the host's shared directory
    let res = do_request(&beta, Method::GET, "/common.css");
    assert!(res.file().unwrap().starts_with(&shared_dir));
}
