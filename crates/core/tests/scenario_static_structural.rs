//! End-to-end coverage for the scenarios that don't need commit history:
//! an orphaned file, a hollowed-out file, and a module that skips a layer
//! (spec §8 scenarios 1, 3, 5).

use std::fs;

use shannon_insight_core::finders::{run_finders, Target};
use shannon_insight_core::{analyze, AnalysisConfig};

fn write(root: &std::path::Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn orphan_and_hollow_and_layer_violation_fire_together() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    write(root, "main.rs", "use util;\n\nfn main() {}\n");
    write(root, "util.rs", "fn helper() {}\n");
    write(root, "stranded.rs", "fn unused() {}\n");

    write(
        root,
        "handlers.rs",
        "fn handle_a() { unimplemented!() }\n\
         fn handle_b() { unimplemented!() }\n\
         fn handle_c() { unimplemented!() }\n\
         fn handle_d() { unimplemented!() }\n\
         fn handle_real(n: i32) -> i32 {\n\
         \x20   let mut total = 0;\n\
         \x20   let mut i = 0;\n\
         \x20   while i < n {\n\
         \x20       if i % 2 == 0 {\n\
         \x20           total += i * 2;\n\
         \x20       } else {\n\
         \x20           total += i;\n\
         \x20       }\n\
         \x20       i += 1;\n\
         \x20   }\n\
         \x20   total\n\
         }\n",
    );

    // core -> domain -> api is a clean chain; core also reaches straight
    // into api, skipping the domain layer in between.
    write(root, "core/a.rs", "use b;\nuse c;\nfn a() {}\n");
    write(root, "domain/b.rs", "use c;\nfn b() {}\n");
    write(root, "api/c.rs", "fn c() {}\n");

    let mut cfg = AnalysisConfig::new(root.to_path_buf());
    cfg.explicit_modules.insert("core/a.rs".to_string(), "core".to_string());
    cfg.explicit_modules.insert("domain/b.rs".to_string(), "domain".to_string());
    cfg.explicit_modules.insert("api/c.rs".to_string(), "api".to_string());

    let (store, report) = analyze(&cfg).expect("analyze should not hit a fatal error");
    assert!(report.fatal.is_none());

    let findings = run_finders(&store, &cfg);

    let orphan_targets: Vec<&str> = findings
        .iter()
        .filter(|f| f.pattern == "ORPHAN_CODE")
        .filter_map(|f| match &f.target {
            Target::File(p) => Some(p.as_str()),
            _ => None,
        })
        .collect();
    assert!(orphan_targets.contains(&"stranded.rs"), "stranded.rs should be flagged orphan: {orphan_targets:?}");
    assert!(!orphan_targets.contains(&"main.rs"), "main.rs is an entry point, not an orphan");
    assert!(!orphan_targets.contains(&"util.rs"), "util.rs is imported by main.rs");

    let hollow = findings.iter().find(|f| f.pattern == "HOLLOW_CODE" && matches!(&f.target, Target::File(p) if p == "handlers.rs"));
    let hollow = hollow.expect("HOLLOW_CODE should fire on handlers.rs");
    assert!(hollow.confidence > 0.5, "confidence should exceed 0.5, got {}", hollow.confidence);

    let layer_violation = findings.iter().find(|f| f.pattern == "LAYER_VIOLATION" && matches!(&f.target, Target::Module(m) if m == "core"));
    assert!(layer_violation.is_some(), "core should be flagged for skipping the domain layer: {findings:?}");
}
