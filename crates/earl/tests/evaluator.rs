//! End-to-end scenarios and invariants, run through the public
//! `parse_source`/`run_program` surface the way a file invocation would
//! use them.

use std::rc::Rc;

use earl::{parse_source, run_program, CollectStringPrint, ErrorKind, ModuleLoader, RuntimeConfig};

fn run(src: &str) -> String {
    let file: Rc<str> = Rc::from("<test>");
    let program = parse_source(src, &file).unwrap();
    let mut out = CollectStringPrint::new();
    let mut cfg = RuntimeConfig::default();
    let mut loader = ModuleLoader::new(vec![]);
    run_program(&mut out, &mut cfg, &mut loader, file, &program).unwrap();
    out.into_output()
}

fn run_err(src: &str) -> earl::EarlError {
    let file: Rc<str> = Rc::from("<test>");
    let program = parse_source(src, &file).unwrap();
    let mut out = CollectStringPrint::new();
    let mut cfg = RuntimeConfig::default();
    let mut loader = ModuleLoader::new(vec![]);
    run_program(&mut out, &mut cfg, &mut loader, file, &program).unwrap_err()
}

#[test]
fn scenario_arithmetic_print() {
    assert_eq!(run("let x = 3; println(x + 4);"), "7\n");
}

#[test]
fn scenario_list_filter() {
    assert_eq!(run("let l = [1,2,3,4]; println(l.filter(|e| e % 2 == 0));"), "[2, 4]\n");
}

#[test]
fn scenario_recursive_factorial() {
    assert_eq!(run("fn fact(n) { if n <= 1 { return 1; } return n * fact(n-1); } println(fact(5));"), "120\n");
}

#[test]
fn scenario_string_substr() {
    assert_eq!(run(r#"let s = "hello"; println(s.substr(0, 4));"#), "hell\n");
}

#[test]
fn scenario_class_method() {
    assert_eq!(run("class Pt(x, y) { fn sum() { return this.x + this.y; } } let p = Pt(3, 4); println(p.sum());"), "7\n");
}

#[test]
fn option_some_and_none_semantics() {
    assert_eq!(run("let o = some(9); println(o.unwrap());"), "9\n");
    assert_eq!(run("let o = none; println(o.is_none());"), "true\n");
    assert_eq!(run("let o = none; println(o.unwrap_or(5));"), "5\n");
}

#[test]
fn const_mutation_is_a_type_error() {
    let err = run_err("const let x = 1; x = 2;");
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn copy_produces_an_independent_equal_value() {
    assert_eq!(run("let a = [1, 2, 3]; let b = copy(a); b.append(4); println(a); println(b);"), "[1, 2, 3]\n[1, 2, 3, 4]\n");
}

#[test]
fn list_nth_preserves_insertion_order() {
    assert_eq!(run("let l = [10, 20, 30]; println(l.nth(0)); println(l.nth(1)); println(l.nth(2));"), "10\n20\n30\n");
}

#[test]
fn observe_fires_exactly_once_per_mutation() {
    let out = run(
        "let count = 0;
         let x = 1;
         observe(x, |v| { count += 1; });
         x = 2;
         x = 3;
         x = 4;
         println(count);",
    );
    assert_eq!(out, "3\n");
}

#[test]
fn int_str_round_trips() {
    assert_eq!(run(r#"println(int(str(42)) == 42);"#), "true\n");
}

#[test]
fn foreach_visits_a_list_in_insertion_order() {
    assert_eq!(run("let out = []; foreach v in [1,2,3] { out.append(v); } println(out);"), "[1, 2, 3]\n");
}

#[test]
fn import_is_idempotent_for_the_same_path() {
    let dir = std::env::temp_dir().join(format!("earl-import-idempotence-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let module_path = dir.join("counter.earl");
    std::fs::write(&module_path, "@pub let hits = 0; hits = hits + 1;").unwrap();

    let file: Rc<str> = Rc::from("<test>");
    let src = r#"import "counter.earl" as a; import "counter.earl" as b; println(a.hits); println(b.hits);"#;
    let program = parse_source(src, &file).unwrap();
    let mut out = CollectStringPrint::new();
    let mut cfg = RuntimeConfig::default();
    let mut loader = ModuleLoader::new(vec![dir.clone()]);
    run_program(&mut out, &mut cfg, &mut loader, file, &program).unwrap();
    assert_eq!(out.into_output(), "1\n1\n");

    std::fs::remove_dir_all(&dir).ok();
}
