use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tsumiki::kind::{FILE, OUTCOME, Type};
use tsumiki::producer::from_fn;
use tsumiki::{
    Blueprint, Kind, NodeId, Options, Outcome, Policies, Policy, ResolveError, Resource, Setting,
    Workspace,
};

static SOURCE: Type = Type::new("source", &FILE);

static OUTPUT_DIR: Setting<String> = Setting::new("output.dir", || "dist".into());
static JOBS: Setting<u32> = Setting::new("jobs", || 1);

fn names(items: &[Resource]) -> HashSet<String> {
    items
        .iter()
        .filter_map(|item| item.name().map(str::to_string))
        .collect()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// A producer of `kind` returning `items`, counting how often it runs for
/// anything but cleanliness.
fn counted(
    name: &'static str,
    kind: Kind,
    items: &'static [&'static str],
    calls: Arc<AtomicUsize>,
) -> tsumiki::producer::FnProducer {
    from_fn(name, [kind], move |_, query| {
        if !query.is_cleanliness() {
            calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
        }

        Ok(items
            .iter()
            .map(|item| Resource::named(kind, item))
            .collect())
    })
}

fn small_pool() -> Options {
    Options {
        threads: Some(2),
        ..Options::default()
    }
}

struct Nested {
    workspace: Workspace,
    root: NodeId,
    g1: NodeId,
    g2: NodeId,
    g1_calls: Arc<AtomicUsize>,
    g2_calls: Arc<AtomicUsize>,
}

/// R supplies G1 {a, b} and forwards S, which supplies G2 {c}.
fn nested() -> Nested {
    let g1_calls = Arc::new(AtomicUsize::new(0));
    let g2_calls = Arc::new(AtomicUsize::new(0));
    let kind = Kind::of(&SOURCE);

    let mut config = Blueprint::new();
    let root = config.project("R").register().unwrap();
    let sub = config.project("S").register().unwrap();

    let g1 = config
        .producer(root, counted("G1", kind, &["a", "b"], g1_calls.clone()))
        .unwrap();
    let g2 = config
        .producer(sub, counted("G2", kind, &["c"], g2_calls.clone()))
        .unwrap();

    config.edge(root, g1, Policy::Supply).unwrap();
    config.edge(root, sub, Policy::Forward).unwrap();
    config.edge(sub, g2, Policy::Supply).unwrap();

    Nested {
        workspace: config.finish_with(small_pool()).unwrap(),
        root,
        g1,
        g2,
        g1_calls,
        g2_calls,
    }
}

#[test]
fn test_nested_projects_concurrent_queries() {
    let nested = nested();
    let workspace = &nested.workspace;
    let query = workspace
        .node(nested.root)
        .of(Kind::of(&SOURCE))
        .using([Policy::Supply, Policy::Forward, Policy::Expose]);

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| s.spawn(|| workspace.resources(nested.root, &query).collect()))
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    for result in results {
        assert_eq!(names(&result.unwrap()), set(&["a", "b", "c"]));
    }

    assert_eq!(nested.g1_calls.load(Ordering::SeqCst), 1);
    assert_eq!(nested.g2_calls.load(Ordering::SeqCst), 1);

    let diagnostics = workspace.diagnostics();
    assert_eq!(diagnostics.count(nested.g1), 1);
    assert_eq!(diagnostics.count(nested.g2), 1);
}

#[test]
fn test_many_identical_queries_compute_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let kind = Kind::of(&SOURCE);

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let sources = config
        .producer(app, counted("sources", kind, &["main.rs"], calls.clone()))
        .unwrap();
    config.edge(app, sources, Policy::Supply).unwrap();
    let workspace = config.finish_with(small_pool()).unwrap();

    let query = workspace.node(app).of(kind).using(Policy::Supply);

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let found = workspace.resources(app, &query).collect().unwrap();
                assert_eq!(names(&found), set(&["main.rs"]));
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(workspace.diagnostics().hits >= 7);
}

#[test]
fn test_cycle_between_projects_terminates() {
    let kind = Kind::of(&SOURCE);
    let calls = Arc::new(AtomicUsize::new(0));

    let mut config = Blueprint::new();
    let a = config.project("a").register().unwrap();
    let b = config.project("b").register().unwrap();
    let c = config.project("c").register().unwrap();

    let pa = config
        .producer(a, counted("pa", kind, &["from-a"], calls.clone()))
        .unwrap();
    let pb = config
        .producer(b, counted("pb", kind, &["from-b"], calls.clone()))
        .unwrap();
    let pc = config
        .producer(c, counted("pc", kind, &["from-c"], calls.clone()))
        .unwrap();

    config.edge(a, pa, Policy::Expose).unwrap();
    config.edge(a, b, Policy::Expose).unwrap();
    config.edge(a, c, Policy::Forward).unwrap();
    config.edge(b, pb, Policy::Expose).unwrap();
    config.edge(b, a, Policy::Expose).unwrap();
    config.edge(c, pc, Policy::Supply).unwrap();
    config.edge(c, b, Policy::Forward).unwrap();

    let workspace = config.finish_with(small_pool()).unwrap();
    let query = workspace.node(a).of(kind).exposed();
    let found = workspace.resources(a, &query).collect().unwrap();

    // Both b and c reach b's producer, through sibling branches.
    assert_eq!(names(&found), set(&["from-a", "from-b", "from-c"]));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_query_rewritten_when_crossing_into_project() {
    let kind = Kind::of(&SOURCE);

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let lib = config.project("lib").register().unwrap();
    let generator = config
        .producer(app, from_fn("gen", [kind], |_, _| Ok(vec![])))
        .unwrap();

    config.edge(app, generator, Policy::Consume).unwrap();
    config.edge(app, lib, Policy::Consume).unwrap();
    let workspace = config.finish().unwrap();

    let seen = Mutex::new(Vec::new());
    let query = workspace.node(app).of(kind).using(Policy::Consume);

    workspace
        .providers(app)
        .unwrap()
        .on_before_use(|edge, query| {
            seen.lock()
                .unwrap()
                .push((edge.name().to_string(), query.policies()));
        })
        .resources(&query)
        .collect()
        .unwrap();

    let seen = seen.into_inner().unwrap();
    assert_eq!(
        seen,
        vec![
            ("gen".to_string(), Policies::empty()),
            (
                "lib".to_string(),
                Policies::from([Policy::Supply, Policy::Expose])
            ),
        ]
    );
}

#[test]
fn test_unselected_edges_are_never_requested() {
    let kind = Kind::of(&SOURCE);
    let supplied = Arc::new(AtomicUsize::new(0));
    let runtime = Arc::new(AtomicUsize::new(0));

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let own = config
        .producer(app, counted("own", kind, &["x"], supplied.clone()))
        .unwrap();
    let agent = config
        .producer(app, counted("agent", kind, &["agent.jar"], runtime.clone()))
        .unwrap();

    config.edge(app, own, Policy::Supply).unwrap();
    config.edge(app, agent, Policy::Runtime).unwrap();
    let workspace = config.finish().unwrap();

    let query = workspace.node(app).of(kind).using(Policy::Supply);
    let found = workspace.resources(app, &query).collect().unwrap();

    assert_eq!(names(&found), set(&["x"]));
    assert_eq!(supplied.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.load(Ordering::SeqCst), 0);
    assert_eq!(workspace.diagnostics().count(agent), 0);

    let with_runtime = query.using([Policy::Supply, Policy::Runtime]);
    let found = workspace.resources(app, &with_runtime).collect().unwrap();
    assert_eq!(names(&found), set(&["x", "agent.jar"]));
}

#[test]
fn test_error_names_failing_producer() {
    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let lib = config.project("lib").register().unwrap();
    let compiler = config
        .producer(
            lib,
            from_fn("compiler", [Kind::of(&FILE)], |_, _| {
                anyhow::bail!("syntax error in lib.rs")
            }),
        )
        .unwrap();
    let panicky = config
        .producer(
            lib,
            from_fn("panicky", [Kind::of(&OUTCOME)], |_, _| -> anyhow::Result<_> {
                panic!("index out of bounds")
            }),
        )
        .unwrap();

    config.edge(app, lib, Policy::Consume).unwrap();
    config.edge(lib, compiler, Policy::Expose).unwrap();
    config.edge(lib, panicky, Policy::Expose).unwrap();
    let workspace = config.finish().unwrap();

    let files = workspace
        .node(app)
        .of(Kind::of(&FILE))
        .using(Policy::Consume);
    let err = workspace.resources(app, &files).collect().unwrap_err();

    assert!(matches!(err, ResolveError::Computation { .. }));
    assert_eq!(err.origin().name(), Some("compiler"));
    assert!(err.to_string().contains("syntax error in lib.rs"));

    let outcomes = workspace
        .node(app)
        .of(Kind::of(&OUTCOME))
        .using(Policy::Consume);
    let err = workspace.resources(app, &outcomes).collect().unwrap_err();

    assert_eq!(err.origin().name(), Some("panicky"));
    assert!(err.to_string().contains("index out of bounds"));
}

#[test]
fn test_resolve_all_reports_each_request() {
    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let tests = config
        .producer(
            app,
            from_fn("tests", [Kind::of(&OUTCOME)], |_, query| {
                Ok(vec![
                    Resource::named(query.kind(), "unit"),
                    Resource::named(query.kind(), "integration").faulty("1 test failed"),
                ])
            }),
        )
        .unwrap();
    let docs = config
        .producer(
            app,
            from_fn("docs", [Kind::of(&FILE)], |_, _| {
                Err(ResolveError::unavailable("a rustdoc binary").into())
            }),
        )
        .unwrap();
    config.edge(app, tests, Policy::Supply).unwrap();
    config.edge(app, docs, Policy::Supply).unwrap();
    let workspace = config.finish().unwrap();

    let node = workspace.node(app);
    let report = workspace.resolve_all([
        (app, node.of(Kind::of(&OUTCOME)).using(Policy::Supply)),
        (app, node.of(Kind::of(&FILE)).using(Policy::Supply)),
        (app, node.of(Kind::of(&SOURCE)).using(Policy::Consume)),
    ]);

    let entries = report.entries();
    assert_eq!(entries.len(), 3);
    assert!(matches!(&entries[0].1, Outcome::Faulty(items) if items.len() == 2));
    assert!(matches!(
        &entries[1].1,
        Outcome::Failed(ResolveError::Unavailable { origin, .. }) if origin.name() == Some("docs")
    ));
    assert!(entries[2].1.is_passed());
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_settings_inherited_from_parent_project() {
    let mut config = Blueprint::new();
    let root = config
        .project("root")
        .property("output.dir", "out")
        .property("jobs", 4)
        .register()
        .unwrap();
    let app = config
        .project("app")
        .parent(root)
        .property("jobs", 8)
        .register()
        .unwrap();
    let other = config.project("other").register().unwrap();

    let report = |name: &'static str| {
        from_fn(name, [Kind::of(&FILE)], |scope, query| {
            let dir = scope.setting(&OUTPUT_DIR)?;
            let jobs = scope.setting(&JOBS)?;
            Ok(vec![Resource::named(query.kind(), format!("{dir}/{jobs}"))])
        })
    };

    let in_app = config.producer(app, report("in-app")).unwrap();
    let in_other = config.producer(other, report("in-other")).unwrap();
    let strict = config
        .producer(
            other,
            from_fn("strict", [Kind::of(&OUTCOME)], |scope, _| {
                let token: String = scope.require("token")?;
                Ok(vec![Resource::named(Kind::of(&OUTCOME), token)])
            }),
        )
        .unwrap();

    config.edge(app, in_app, Policy::Supply).unwrap();
    config.edge(other, in_other, Policy::Supply).unwrap();
    config.edge(other, strict, Policy::Supply).unwrap();
    let workspace = config.finish().unwrap();

    let files = |node| workspace.node(node).of(Kind::of(&FILE)).using(Policy::Supply);

    let found = workspace.resources(app, &files(app)).collect().unwrap();
    assert_eq!(names(&found), set(&["out/8"]));

    let found = workspace.resources(other, &files(other)).collect().unwrap();
    assert_eq!(names(&found), set(&["dist/1"]));

    let outcomes = workspace
        .node(other)
        .of(Kind::of(&OUTCOME))
        .using(Policy::Supply);
    let err = workspace.resources(other, &outcomes).collect().unwrap_err();
    assert!(matches!(err, ResolveError::Configuration { .. }));
    assert_eq!(err.origin().name(), Some("strict"));
}

#[test]
fn test_cleanliness_resets_cache() {
    let kind = Kind::of(&SOURCE);
    let calls = Arc::new(AtomicUsize::new(0));
    let cleaned = Arc::new(AtomicUsize::new(0));

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let counter = calls.clone();
    let sweeper = cleaned.clone();
    let generator = config
        .producer(
            app,
            from_fn("gen", [kind], move |_, query| {
                if query.is_cleanliness() {
                    sweeper.fetch_add(1, Ordering::SeqCst);
                    return Ok(vec![]);
                }

                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![Resource::named(kind, "generated.rs")])
            }),
        )
        .unwrap();
    config.edge(app, generator, Policy::Supply).unwrap();
    let workspace = config.finish().unwrap();

    let query = workspace.node(app).of(kind).using(Policy::Supply);

    workspace.resources(app, &query).collect().unwrap();
    workspace.resources(app, &query).collect().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    workspace.clean(app).unwrap();
    assert_eq!(cleaned.load(Ordering::SeqCst), 1);

    workspace.resources(app, &query).collect().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_producer_answers_narrow_query_from_broad_one() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let listing = config
        .producer(
            app,
            from_fn("listing", [Kind::of(&FILE)], move |scope, query| {
                if query.name().is_some() {
                    let broad = scope.node(scope.current()).of(query.kind());
                    return Ok(scope.resources(&broad).collect()?);
                }

                counter.fetch_add(1, Ordering::SeqCst);
                Ok(vec![
                    Resource::named(query.kind(), "a.txt"),
                    Resource::named(query.kind(), "b.txt"),
                ])
            }),
        )
        .unwrap();
    config.edge(app, listing, Policy::Supply).unwrap();
    let workspace = config.finish().unwrap();

    let query = workspace.node(app).of(Kind::of(&FILE)).using(Policy::Supply);
    let all = workspace.resources(app, &query).collect().unwrap();
    let one = workspace
        .resources(app, &query.with_name("b.txt"))
        .collect()
        .unwrap();

    assert_eq!(all.len(), 2);
    assert_eq!(names(&one), set(&["b.txt"]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_coverage_follows_re_exposed_edges() {
    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let lib = config.project("lib").register().unwrap();
    let internal = config.project("internal").register().unwrap();

    let sources = config
        .producer(app, from_fn("sources", [Kind::of(&SOURCE)], |_, _| Ok(vec![])))
        .unwrap();
    let archive = config
        .producer(lib, from_fn("archive", [Kind::of(&FILE)], |_, _| Ok(vec![])))
        .unwrap();
    let tests = config
        .producer(internal, from_fn("tests", [Kind::of(&OUTCOME)], |_, _| Ok(vec![])))
        .unwrap();

    config.edge(app, sources, Policy::Supply).unwrap();
    config.edge(app, lib, Policy::Forward).unwrap();
    config.edge(app, internal, Policy::Consume).unwrap();
    config.edge(lib, archive, Policy::Expose).unwrap();
    config.edge(internal, tests, Policy::Supply).unwrap();
    let workspace = config.finish().unwrap();

    assert_eq!(
        workspace.coverage(app),
        vec![Kind::of(&SOURCE), Kind::of(&FILE)]
    );
    assert_eq!(workspace.coverage(tests), vec![Kind::of(&OUTCOME)]);
}

#[test]
fn test_providers_of_producer_rejected() {
    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let generator = config
        .producer(app, from_fn("gen", [Kind::any()], |_, _| Ok(vec![])))
        .unwrap();
    let workspace = config.finish().unwrap();

    assert!(workspace.providers(app).is_ok());
    assert!(matches!(
        workspace.providers(generator),
        Err(ResolveError::Configuration { .. })
    ));
}

#[test]
fn test_filtered_out_edge_does_not_block() {
    let kind = Kind::of(&SOURCE);
    let slow_calls = Arc::new(AtomicUsize::new(0));
    let counter = slow_calls.clone();

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let first = config
        .producer(
            app,
            from_fn("first", [kind], move |_, _| Ok(vec![Resource::named(kind, "1")])),
        )
        .unwrap();
    let slow = config
        .producer(
            app,
            from_fn("slow", [kind], move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_secs(5));
                Ok(vec![Resource::named(kind, "2")])
            }),
        )
        .unwrap();
    let third = config
        .producer(
            app,
            from_fn("third", [kind], move |_, _| Ok(vec![Resource::named(kind, "3")])),
        )
        .unwrap();

    for edge in [first, slow, third] {
        config.edge(app, edge, Policy::Supply).unwrap();
    }
    let workspace = config.finish().unwrap();

    let query = workspace.node(app).of(kind).using(Policy::Supply);
    let started = std::time::Instant::now();
    let found = workspace
        .providers(app)
        .unwrap()
        .without(slow)
        .resources(&query)
        .collect()
        .unwrap();

    assert_eq!(names(&found), set(&["1", "3"]));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(slow_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_selected_edges_run_concurrently() {
    let kind = Kind::of(&SOURCE);
    let arrived = Arc::new(AtomicUsize::new(0));

    // Waits until both producers are running, or gives up.
    let rendezvous = |name: &'static str| {
        let arrived = arrived.clone();
        from_fn(name, [kind], move |_, _| {
            arrived.fetch_add(1, Ordering::SeqCst);
            let deadline = std::time::Instant::now() + Duration::from_secs(2);

            while arrived.load(Ordering::SeqCst) < 2 {
                if std::time::Instant::now() > deadline {
                    return Ok(vec![Resource::named(kind, "alone")]);
                }
                thread::sleep(Duration::from_millis(1));
            }

            Ok(vec![Resource::named(kind, "met")])
        })
    };

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let left = config.producer(app, rendezvous("left")).unwrap();
    let right = config.producer(app, rendezvous("right")).unwrap();
    config.edge(app, left, Policy::Supply).unwrap();
    config.edge(app, right, Policy::Supply).unwrap();
    let workspace = config.finish_with(small_pool()).unwrap();

    let query = workspace.node(app).of(kind).using(Policy::Supply);
    let found = workspace.resources(app, &query).collect().unwrap();

    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|item| item.name() == Some("met")));
}

#[test]
fn test_projects_exposing_each_other_read_from_outside() {
    let kind = Kind::of(&SOURCE);

    let mut config = Blueprint::new();
    let busy = config.project("busy").register().unwrap();
    let sleeper = config
        .producer(
            busy,
            from_fn("sleeper", [kind], move |_, _| {
                thread::sleep(Duration::from_millis(200));
                Ok(vec![])
            }),
        )
        .unwrap();

    let r = config.project("r").register().unwrap();
    let s = config.project("s").register().unwrap();
    let pr = config
        .producer(
            r,
            from_fn("pr", [kind], move |_, _| Ok(vec![Resource::named(kind, "from-r")])),
        )
        .unwrap();
    let ps = config
        .producer(
            s,
            from_fn("ps", [kind], move |_, _| Ok(vec![Resource::named(kind, "from-s")])),
        )
        .unwrap();

    config.edge(r, pr, Policy::Expose).unwrap();
    config.edge(r, s, Policy::Expose).unwrap();
    config.edge(s, ps, Policy::Expose).unwrap();
    config.edge(s, r, Policy::Expose).unwrap();

    let workspace = config
        .finish_with(Options {
            threads: Some(1),
            ..Options::default()
        })
        .unwrap();

    // Keeps the only worker busy, so both projects are routed by this
    // thread and each one's result ends up containing the other's.
    let blocker = workspace.node(sleeper).of(kind);
    let blocked = workspace.resources(sleeper, &blocker);

    let query = workspace.node(r).of(kind).exposed();
    let from_r = workspace.resources(r, &query);
    let from_s = workspace.resources(s, &query);

    assert_eq!(names(&from_r.collect().unwrap()), set(&["from-r", "from-s"]));
    assert_eq!(names(&from_s.collect().unwrap()), set(&["from-r", "from-s"]));
    assert_eq!(from_r.collect().unwrap(), from_r.collect().unwrap());
    assert!(blocked.collect().unwrap().is_empty());
}

#[test]
fn test_producer_without_kinds_covers_everything() {
    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let anything = config
        .producer(app, from_fn("anything", Vec::new(), |_, _| Ok(vec![])))
        .unwrap();
    config.edge(app, anything, Policy::Supply).unwrap();
    let workspace = config.finish().unwrap();

    assert_eq!(workspace.coverage(app), vec![Kind::any()]);
}

#[test]
fn test_foreign_node_id_is_a_configuration_error() {
    let mut other = Blueprint::new();
    other.project("a").register().unwrap();
    let foreign = other.project("b").register().unwrap();

    let mut config = Blueprint::new();
    let app = config.project("app").register().unwrap();
    let workspace = config.finish().unwrap();

    let query = workspace.node(app).of(Kind::any()).exposed();
    let err = workspace.resources(foreign, &query).collect().unwrap_err();

    assert!(matches!(err, ResolveError::Configuration { .. }));
    assert!(workspace.providers(foreign).is_err());
    assert!(workspace.coverage(foreign).is_empty());
    assert_eq!(workspace.node(foreign).name(), None);
    assert_eq!(workspace.node(app).name(), Some("app"));
}
