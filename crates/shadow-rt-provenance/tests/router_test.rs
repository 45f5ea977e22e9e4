//! Category rules of the event router.

use shadow_rt_core::{
    ArgumentCount, Category, ClassVarName, GlobalName, LocalId, PropertyName, ShadowError,
    SiteId, SiteLabel, SyntaxSite,
};
use shadow_rt_provenance::{Creator, EventRouter, NodeValue, ProvenanceNode, ShadowRegistry};
use std::sync::Arc;
use test_support::common::{Expr, Program, ProgramBuilder, Run, ToyFrame, ToyHost, ToyValue};
use tracing_test::traced_test;

type Node = ProvenanceNode<ToyValue>;

fn router() -> (Arc<ShadowRegistry<ToyHost>>, EventRouter<ToyHost>) {
    let registry = Arc::new(ShadowRegistry::with_sweep_interval(0));
    let router = EventRouter::new(Arc::new(ToyHost), Arc::clone(&registry));
    (registry, router)
}

fn run(program: &Program) -> (Arc<ShadowRegistry<ToyHost>>, Run) {
    let (registry, router) = router();
    let run = program.run(&router).expect("program runs");
    (registry, run)
}

fn site(id: u64, label: &str, category: Category) -> SyntaxSite<ToyHost> {
    SyntaxSite::builder(SiteId::new(id), label)
        .category(category)
        .build()
        .expect("valid site")
}

fn label(node: &Node) -> String {
    match node.creator() {
        Creator::Unknown => "<unknown>".to_string(),
        Creator::Site { label, .. } => label.to_string(),
    }
}

fn stack(registry: &ShadowRegistry<ToyHost>, frame: &Arc<ToyFrame>) -> Vec<Node> {
    let record = registry
        .find_frame(frame)
        .expect("frames table")
        .expect("frame is traced");
    let record = record.lock().expect("record lock");
    record.stack().to_vec()
}

fn history(registry: &ShadowRegistry<ToyHost>, frame: &Arc<ToyFrame>, local: &str) -> Vec<Node> {
    let record = registry
        .find_frame(frame)
        .expect("frames table")
        .expect("frame is traced");
    let record = record.lock().expect("record lock");
    record.history_of(&LocalId::new(local)).to_vec()
}

fn int(value: i64) -> ToyValue {
    ToyValue::Int(value)
}

#[test]
fn literal_is_a_leaf() {
    let program = ProgramBuilder::new()
        .main(vec![Expr::int(7)])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let body = stack(&registry, &run.frame);
    assert_eq!(body.len(), 1);
    let literal = &body[0].origins()[0];
    assert_eq!(label(literal), "7");
    assert!(literal.origins().is_empty());
    assert_eq!(literal.value(), &NodeValue::Known(int(7)));
}

#[test]
fn operands_are_popped_most_recent_first() {
    let (registry, router) = router();
    let frame = ToyFrame::root("main");
    let literal = site(1, "lit", Category::NoUseDefStack);
    let op = site(2, "op", Category::UseStackDefStack);

    router.on_return_value(&literal, &frame, &int(1)).expect("A");
    router.on_enter(&op, &frame).expect("enter op");
    router.on_return_value(&literal, &frame, &int(2)).expect("B");
    router.on_return_value(&literal, &frame, &int(3)).expect("C");
    let before = stack(&registry, &frame);
    let (a, b, c) = (before[0].clone(), before[1].clone(), before[2].clone());

    router.on_return_value(&op, &frame, &int(5)).expect("op");

    let after = stack(&registry, &frame);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0], a);
    assert_eq!(after[1].origins(), &[c, b]);
}

#[test]
fn local_history_keeps_every_write() {
    let program = ProgramBuilder::new()
        .main(vec![
            Expr::set_local("x", Expr::int(1)),
            Expr::set_local("x", Expr::int(2)),
            Expr::set_local("y", Expr::local("x")),
        ])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let x = history(&registry, &run.frame, "x");
    assert_eq!(x.len(), 2);
    assert_eq!(x[0].value(), &NodeValue::Known(int(1)));
    assert_eq!(x[1].value(), &NodeValue::Known(int(2)));

    let y = history(&registry, &run.frame, "y");
    let read = &y[0].origins()[0];
    assert_eq!(read.origins(), &[x[1].clone()]);
}

#[test]
fn unwritten_local_reads_as_unknown() {
    let program = ProgramBuilder::new()
        .main(vec![Expr::set_local("y", Expr::local("ghost"))])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let y = history(&registry, &run.frame, "y");
    let read = &y[0].origins()[0];
    let origin = &read.origins()[0];
    assert!(origin.is_unknown());
    assert!(origin.creator().is_unknown());
    assert!(origin.value().is_unknown());
    assert_eq!(history(&registry, &run.frame, "ghost"), vec![origin.clone()]);
}

#[test]
fn single_result_crosses_the_call_boundary() {
    let (registry, router) = router();
    let boundary = site(1, "def f", Category::FunctionBoundary);
    let literal = site(2, "1", Category::NoUseDefStack);
    let caller = ToyFrame::root("main");
    router.on_enter(&boundary, &caller).expect("caller");

    let callee = ToyFrame::called_from(&caller, "f", Vec::new());
    router.on_enter(&boundary, &callee).expect("callee");
    router.on_return_value(&literal, &callee, &int(1)).expect("result");
    let result = stack(&registry, &callee)[0].clone();
    router.on_return_value(&boundary, &callee, &int(1)).expect("return");

    assert_eq!(stack(&registry, &caller), vec![result]);
    assert!(stack(&registry, &callee).is_empty());
}

#[test]
fn boundary_ignores_stacks_without_exactly_one_entry() {
    let (registry, router) = router();
    let boundary = site(1, "def f", Category::FunctionBoundary);
    let literal = site(2, "1", Category::NoUseDefStack);
    let caller = ToyFrame::root("main");
    router.on_enter(&boundary, &caller).expect("caller");

    let empty = ToyFrame::called_from(&caller, "f", Vec::new());
    router.on_enter(&boundary, &empty).expect("enter");
    router.on_return_value(&boundary, &empty, &ToyValue::Nil).expect("empty return");
    assert!(stack(&registry, &caller).is_empty());

    let crowded = ToyFrame::called_from(&caller, "f", Vec::new());
    router.on_enter(&boundary, &crowded).expect("enter");
    router.on_return_value(&literal, &crowded, &int(1)).expect("first");
    router.on_return_value(&literal, &crowded, &int(2)).expect("second");
    router.on_return_value(&boundary, &crowded, &int(2)).expect("crowded return");
    assert!(stack(&registry, &caller).is_empty());
    assert_eq!(stack(&registry, &crowded).len(), 2);
}

#[traced_test]
#[test]
fn untraced_caller_keeps_the_result() {
    let (registry, router) = router();
    let boundary = site(1, "def f", Category::FunctionBoundary);
    let literal = site(2, "1", Category::NoUseDefStack);
    let caller = ToyFrame::root("main");

    let callee = ToyFrame::called_from(&caller, "f", Vec::new());
    router.on_enter(&boundary, &callee).expect("enter");
    router.on_return_value(&literal, &callee, &int(1)).expect("result");
    router.on_return_value(&boundary, &callee, &int(1)).expect("return");

    assert_eq!(stack(&registry, &callee).len(), 1);
    assert!(registry.find_frame(&caller).expect("frames").is_none());
    assert!(logs_contain("Caller is not traced"));
}

#[test]
fn arguments_are_peeked_from_the_caller_stack() {
    let (registry, router) = router();
    let literal = site(1, "lit", Category::NoUseDefStack);
    let caller = ToyFrame::root("main");
    for value in 1..=3 {
        router.on_return_value(&literal, &caller, &int(value)).expect("arg");
    }
    let pushed = stack(&registry, &caller);

    let callee = ToyFrame::called_from(&caller, "f", vec![int(1), int(2), int(3)]);
    for index in 0..3 {
        let binding = SyntaxSite::builder(SiteId::new(10 + index as u64), "arg")
            .category(Category::UseArgDefStack)
            .argument(index, ArgumentCount::FromFrame)
            .build()
            .expect("arg site");
        router
            .on_return_value(&binding, &callee, &int(index as i64 + 1))
            .expect("bind");
    }

    let bound = stack(&registry, &callee);
    for index in 0..3 {
        assert_eq!(bound[index].origins(), &[pushed[index].clone()]);
    }
    assert_eq!(stack(&registry, &caller), pushed);
}

#[test]
fn declared_zero_count_binds_the_caller_top() {
    let (registry, router) = router();
    let literal = site(1, "receiver", Category::NoUseDefStack);
    let caller = ToyFrame::root("main");
    router.on_return_value(&literal, &caller, &int(9)).expect("receiver");
    let receiver = stack(&registry, &caller)[0].clone();

    let callee = ToyFrame::called_from(&caller, "m", Vec::new());
    let binding = SyntaxSite::builder(SiteId::new(2), "self")
        .category(Category::UseArgDefStack)
        .argument(0, ArgumentCount::Declared(0))
        .build()
        .expect("self site");
    router.on_return_value(&binding, &callee, &int(9)).expect("bind self");

    assert_eq!(stack(&registry, &callee)[0].origins(), &[receiver]);
}

#[traced_test]
#[test]
fn untraced_call_site_binds_unknown() {
    let (registry, router) = router();
    let caller = ToyFrame::root("main");
    let callee = ToyFrame::called_from(&caller, "f", vec![int(4)]);
    let binding = SyntaxSite::builder(SiteId::new(1), "arg[0]")
        .category(Category::UseArgDefStack)
        .argument(0, ArgumentCount::FromFrame)
        .build()
        .expect("arg site");

    router.on_return_value(&binding, &callee, &int(4)).expect("bind");

    let bound = stack(&registry, &callee);
    assert_eq!(bound[0].value(), &NodeValue::Known(int(4)));
    assert!(bound[0].origins()[0].is_unknown());
    assert!(logs_contain("Argument bound from an untraced call site"));
}

#[test]
fn untraced_main_can_call_traced_function() {
    let program = ProgramBuilder::new()
        .function("id", &["a"], vec![Expr::local("a")])
        .untraced_main(vec![Expr::set_local("r", Expr::call("id", vec![Expr::int(7)]))])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    assert_eq!(run.value, int(7));
    assert!(registry.find_frame(&run.frame).expect("frames").is_none());
}

#[test]
fn call_links_arguments_and_result() {
    let program = ProgramBuilder::new()
        .function(
            "add",
            &["a", "b"],
            vec![Expr::add(Expr::local("a"), Expr::local("b"))],
        )
        .main(vec![Expr::set_local(
            "s",
            Expr::call("add", vec![Expr::int(1), Expr::int(2)]),
        )])
        .build()
        .expect("program");
    let (registry, run) = run(&program);
    assert_eq!(run.value, int(3));

    let s = history(&registry, &run.frame, "s");
    let call = &s[0].origins()[0];
    assert_eq!(label(call), "add()");
    let [body, two, one] = call.origins() else {
        panic!("call should have three origins, got {:?}", call.origins());
    };
    assert_eq!(label(body), "add body");
    assert_eq!(label(two), "2");
    assert_eq!(label(one), "1");

    let [sum, write_b, write_a] = body.origins() else {
        panic!("body should have three origins, got {:?}", body.origins());
    };
    assert_eq!(label(sum), "+");
    assert_eq!(label(write_a), "set a");
    assert_eq!(label(write_b), "set b");
    let bind_a = &write_a.origins()[0];
    assert_eq!(label(bind_a), "arg[0]");
    assert_eq!(bind_a.origins(), &[one.clone()]);
    assert_eq!(write_b.origins()[0].origins(), &[two.clone()]);

    let [read_b, read_a] = sum.origins() else {
        panic!("sum should have two origins, got {:?}", sum.origins());
    };
    assert_eq!(read_a.origins(), &[write_a.clone()]);
    assert_eq!(read_b.origins(), &[write_b.clone()]);
}

#[test]
fn property_write_then_read() {
    let program = ProgramBuilder::new()
        .main(vec![
            Expr::set_local("o", Expr::new_object("Point")),
            Expr::set_prop(Expr::local("o"), "x", Expr::int(1)),
            Expr::set_local("v", Expr::get_prop(Expr::local("o"), "x")),
        ])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let v = history(&registry, &run.frame, "v");
    let read = &v[0].origins()[0];
    assert_eq!(label(read), ".x");
    let [receiver, write] = read.origins() else {
        panic!("read should have two origins, got {:?}", read.origins());
    };
    assert_eq!(label(receiver), "o");
    assert_eq!(label(write), "set .x");
    assert_eq!(write.value(), &NodeValue::Known(int(1)));

    let write_origins: Vec<String> = write.origins().iter().map(label).collect();
    assert_eq!(write_origins, vec!["o", "1"]);

    let Some(ToyValue::Object(object)) = write.origins()[0].value().known() else {
        panic!("receiver should be an object");
    };
    let shadow = registry
        .find_object(object)
        .expect("objects table")
        .expect("object is shadowed");
    let stored = shadow.lock().expect("object lock").read(&PropertyName::new("x"));
    assert_eq!(stored.as_ref(), Some(write));
}

#[traced_test]
#[test]
fn property_access_on_non_object_degrades() {
    let program = ProgramBuilder::new()
        .main(vec![
            Expr::set_prop(Expr::int(3), "x", Expr::int(1)),
            Expr::set_local("v", Expr::get_prop(Expr::int(3), "x")),
        ])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let v = history(&registry, &run.frame, "v");
    let read = &v[0].origins()[0];
    assert_eq!(label(&read.origins()[0]), "3");
    assert!(read.origins()[1].is_unknown());
    assert_eq!(registry.stats().expect("stats").objects, 0);
    assert!(logs_contain("Property write on a receiver that is not a known object"));
}

#[test]
fn class_variables_overwrite() {
    let program = ProgramBuilder::new()
        .main(vec![
            Expr::set_class_var("count", Expr::int(1)),
            Expr::set_class_var("count", Expr::int(2)),
            Expr::set_local("c", Expr::class_var("count")),
        ])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let c = history(&registry, &run.frame, "c");
    let read = &c[0].origins()[0];
    let latest = &read.origins()[0];
    assert_eq!(label(latest), "set @@count");
    assert_eq!(latest.value(), &NodeValue::Known(int(2)));

    let scope = registry
        .find_scope(program.scope())
        .expect("scopes table")
        .expect("scope is shadowed");
    let scope = scope.lock().expect("scope lock");
    assert_eq!(scope.read(&ClassVarName::new("count")).as_ref(), Some(latest));
    assert_eq!(scope.len(), 1);
}

#[test]
fn globals_overwrite_and_materialize_unknown() {
    let program = ProgramBuilder::new()
        .main(vec![
            Expr::set_global("g", Expr::int(1)),
            Expr::set_local("a", Expr::global("g")),
            Expr::set_local("b", Expr::global("missing")),
        ])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let a = history(&registry, &run.frame, "a");
    let stored = registry
        .find_global(&GlobalName::new("g"))
        .expect("globals table")
        .expect("global written");
    assert_eq!(label(&stored), "set $g");
    assert_eq!(a[0].origins()[0].origins(), &[stored]);

    let b = history(&registry, &run.frame, "b");
    let missing = &b[0].origins()[0].origins()[0];
    assert!(missing.is_unknown());
    assert_eq!(
        registry.find_global(&GlobalName::new("missing")).expect("globals table").as_ref(),
        Some(missing)
    );
}

#[test]
fn return_unwinds_into_the_caller() {
    let program = ProgramBuilder::new()
        .function(
            "f",
            &[],
            vec![
                Expr::set_local("t", Expr::int(4)),
                Expr::ret(Expr::local("t")),
                Expr::int(99),
            ],
        )
        .main(vec![Expr::set_local("r", Expr::call("f", Vec::new()))])
        .build()
        .expect("program");
    let (registry, run) = run(&program);
    assert_eq!(run.value, int(4));

    let r = history(&registry, &run.frame, "r");
    let call = &r[0].origins()[0];
    let body = &call.origins()[0];
    assert_eq!(label(body), "f body");
    let returned = &body.origins()[0];
    assert_eq!(label(returned), "return");
    assert_eq!(returned.value(), &NodeValue::Known(int(4)));
    assert_eq!(label(&returned.origins()[0]), "t");
    assert_eq!(label(&body.origins()[1]), "set t");
}

#[test]
fn unwinding_discards_depth_marks() {
    let program = ProgramBuilder::new()
        .main(vec![Expr::add(Expr::int(1), Expr::ret(Expr::int(2)))])
        .build()
        .expect("program");
    let (registry, run) = run(&program);
    assert_eq!(run.value, int(2));

    let record = registry
        .find_frame(&run.frame)
        .expect("frames table")
        .expect("main is traced");
    let record = record.lock().expect("record lock");
    assert_eq!(record.pending_depth_marks(), 0);
    let body = record.peek().expect("body result");
    let origins: Vec<String> = body.origins().iter().map(label).collect();
    assert_eq!(origins, vec!["return", "1"]);
    assert_eq!(
        record.return_value().map(label),
        Some("return".to_string())
    );
}

#[test]
fn write_on_empty_stack_underflows_at_its_site() {
    let (_registry, router) = router();
    let frame = ToyFrame::root("main");
    let write = SyntaxSite::builder(SiteId::new(3), "set x")
        .category(Category::UseStackDefLocalStack)
        .local("x")
        .build()
        .expect("write site");

    let err = router
        .on_return_value(&write, &frame, &int(1))
        .expect_err("nothing to pop");
    match err {
        ShadowError::Underflow {
            site,
            requested,
            available,
        } => {
            assert_eq!(site, SiteLabel::Site(SiteId::new(3)));
            assert_eq!((requested, available), (1, 0));
        }
        other => panic!("expected underflow, got {other:?}"),
    }
}

#[test]
fn return_without_enter_is_invalid_state() {
    let (_registry, router) = router();
    let frame = ToyFrame::root("main");
    let op = site(1, "op", Category::UseStackDefStack);
    let err = router
        .on_return_value(&op, &frame, &int(1))
        .expect_err("no depth mark");
    assert!(matches!(err, ShadowError::InvalidState(_)));
}

#[test]
fn property_write_requires_a_receiver() {
    let (_registry, router) = router();
    let frame = ToyFrame::root("main");
    let write = SyntaxSite::builder(SiteId::new(1), "set .x")
        .category(Category::UseStackDefPropertyStack)
        .property("x")
        .build()
        .expect("property site");
    router.on_enter(&write, &frame).expect("enter");
    let err = router
        .on_return_value(&write, &frame, &int(1))
        .expect_err("no operands");
    assert!(matches!(err, ShadowError::InvalidState(_)));
}

#[test]
fn stack_shrinking_below_the_mark_is_invalid_state() {
    let (registry, router) = router();
    let boundary = site(1, "def f", Category::FunctionBoundary);
    let literal = site(2, "1", Category::NoUseDefStack);
    let op = site(3, "op", Category::UseStackDefStack);
    let caller = ToyFrame::root("main");
    router.on_enter(&boundary, &caller).expect("caller");
    let callee = ToyFrame::called_from(&caller, "f", Vec::new());
    router.on_enter(&boundary, &callee).expect("callee");
    router.on_return_value(&literal, &callee, &int(1)).expect("push");
    router.on_enter(&op, &callee).expect("mark at depth 1");
    router.on_return_value(&boundary, &callee, &int(1)).expect("handed to caller");
    assert!(stack(&registry, &callee).is_empty());

    let err = router
        .on_return_value(&op, &callee, &int(1))
        .expect_err("depth below mark");
    assert!(matches!(err, ShadowError::InvalidState(_)));
}

#[traced_test]
#[test]
fn writes_are_dumped_when_enabled() {
    let registry = Arc::new(ShadowRegistry::with_sweep_interval(0));
    let router =
        EventRouter::new(Arc::new(ToyHost), Arc::clone(&registry)).with_dump_on_write(true);
    let program = ProgramBuilder::new()
        .main(vec![Expr::set_local("x", Expr::int(1))])
        .build()
        .expect("program");
    program.run(&router).expect("program runs");
    assert!(logs_contain("Wrote shadow tree"));
}

#[traced_test]
#[test]
fn argument_index_past_the_frame_count_is_logged() {
    let (registry, router) = router();
    let literal = site(1, "lit", Category::NoUseDefStack);
    let caller = ToyFrame::root("main");
    router.on_return_value(&literal, &caller, &int(5)).expect("arg");
    let top = stack(&registry, &caller)[0].clone();

    let callee = ToyFrame::called_from(&caller, "f", vec![int(5)]);
    let binding = SyntaxSite::builder(SiteId::new(2), "arg[1]")
        .category(Category::UseArgDefStack)
        .argument(1, ArgumentCount::FromFrame)
        .build()
        .expect("arg site");
    router.on_return_value(&binding, &callee, &ToyValue::Nil).expect("bind");

    assert_eq!(stack(&registry, &callee)[0].origins(), &[top]);
    assert!(logs_contain("Argument index is past the frame's argument count"));
}

#[test]
fn traced_caller_survives_an_untraced_callee() {
    let program = ProgramBuilder::new()
        .untraced_function(
            "sum",
            &["a", "b"],
            vec![Expr::add(Expr::local("a"), Expr::local("b"))],
        )
        .main(vec![Expr::set_local(
            "r",
            Expr::call("sum", vec![Expr::int(3), Expr::int(4)]),
        )])
        .build()
        .expect("program");
    let (registry, run) = run(&program);
    assert_eq!(run.value.as_int(), Some(7));

    let r = history(&registry, &run.frame, "r");
    let call = &r[0].origins()[0];
    assert_eq!(label(call), "sum()");
    assert_eq!(call.value(), &NodeValue::Known(int(7)));
    let origins: Vec<String> = call.origins().iter().map(label).collect();
    assert_eq!(origins, vec!["4", "3"]);

    // Only main ever had a record; the callee's frame is gone and left nothing to sweep.
    assert_eq!(registry.sweep().expect("sweep").frames, 0);
    assert_eq!(registry.stats().expect("stats").frames, 1);
}

#[test]
fn string_literals_are_labelled_by_their_source() {
    let program = ProgramBuilder::new()
        .main(vec![Expr::set_local(
            "s",
            Expr::add(Expr::str("a"), Expr::str("b")),
        )])
        .build()
        .expect("program");
    let (registry, run) = run(&program);

    let s = history(&registry, &run.frame, "s");
    assert_eq!(s[0].value(), &NodeValue::Known(ToyValue::Str("ab".to_string())));
    let sum = &s[0].origins()[0];
    let operands: Vec<String> = sum.origins().iter().map(label).collect();
    assert_eq!(operands, vec!["\"b\"", "\"a\""]);
}

#[test]
fn long_rewrite_chain_of_one_local_drops_cleanly() {
    let (registry, router) = router();
    let frame = ToyFrame::root("main");
    let statement = site(1, "x = x + 1", Category::UseStackDefStack);
    let read = SyntaxSite::builder(SiteId::new(2), "x")
        .category(Category::UseLocalDefStack)
        .local("x")
        .build()
        .expect("read site");
    let one = site(3, "1", Category::NoUseDefStack);
    let add = site(4, "+", Category::UseStackDefStack);
    let write = SyntaxSite::builder(SiteId::new(5), "set x")
        .category(Category::UseStackDefLocalStack)
        .local("x")
        .build()
        .expect("write site");

    let iterations: i64 = 50_000;
    for value in 1..=iterations {
        router.on_enter(&statement, &frame).expect("enter statement");
        router.on_enter(&add, &frame).expect("enter add");
        router.on_return_value(&read, &frame, &int(value - 1)).expect("read x");
        router.on_return_value(&one, &frame, &int(1)).expect("literal");
        router.on_return_value(&add, &frame, &int(value)).expect("add");
        router.on_return_value(&write, &frame, &int(value)).expect("write x");
        router.on_return_value(&statement, &frame, &int(value)).expect("statement");
    }

    let x = history(&registry, &frame, "x");
    // The first read materialized an UNKNOWN entry ahead of the writes.
    assert_eq!(x.len() as i64, iterations + 1);
    assert_eq!(x[x.len() - 1].value(), &NodeValue::Known(int(iterations)));
    drop(x);

    drop(router);
    drop(registry);
}
